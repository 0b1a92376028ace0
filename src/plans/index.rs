use super::record::{PlanMatcher, PlanRecord};
use crate::error::Result;
use crate::storage::{self, KeyValueStore, keys};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Most recent plans kept locally.
pub const MAX_RECENT_PLANS: usize = 20;

/// Recently created plans, newest first, for listing and search without an
/// API round trip.
///
/// The list is always replaced as a whole; writers are serialized so two
/// concurrent saves cannot drop each other's record.
pub struct PlanIndex {
    store: Arc<dyn KeyValueStore>,
    write: Mutex<()>,
}

impl PlanIndex {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<PlanRecord>> {
        Ok(storage::load(self.store.as_ref(), keys::RECENT_PLANS)
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, record: PlanRecord) -> Result<()> {
        let _guard = self.write.lock().await;

        let mut plans = vec![record];
        for existing in self.list().await? {
            if !plans.iter().any(|kept| kept.same_plan(&existing)) {
                plans.push(existing);
            }
        }
        plans.truncate(MAX_RECENT_PLANS);

        debug!(plans = plans.len(), "Saving plan index");
        storage::save(self.store.as_ref(), keys::RECENT_PLANS, &plans).await
    }

    /// Drop matching records, returning how many went.
    pub async fn remove(&self, matcher: &PlanMatcher) -> Result<usize> {
        let _guard = self.write.lock().await;

        let plans = self.list().await?;
        let before = plans.len();
        let plans: Vec<PlanRecord> = plans.into_iter().filter(|p| !matcher.matches(p)).collect();
        let removed = before - plans.len();

        if removed > 0 {
            storage::save(self.store.as_ref(), keys::RECENT_PLANS, &plans).await?;
        }
        Ok(removed)
    }

    /// Case-insensitive substring match on names. A blank query matches all.
    pub async fn search(&self, query: &str) -> Result<Vec<PlanRecord>> {
        let plans = self.list().await?;
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(plans);
        }

        Ok(plans
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&query))
            .collect())
    }

    /// Newest record with exactly this name.
    pub async fn find(&self, name: &str) -> Result<Option<PlanRecord>> {
        Ok(self.list().await?.into_iter().find(|p| p.name == name))
    }
}
