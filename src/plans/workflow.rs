use super::index::PlanIndex;
use super::record::{PlanKind, PlanMatcher, PlanRecord};
use crate::error::{AppError, Result};
use crate::notify::user_message;
use crate::sheets::ranges::sanitize_sheet_title;
use crate::sheets::template::plan_rows;
use crate::sheets::{CreatedPlanSheet, DeleteOutcome, PlanSheets, SpreadsheetRef, spreadsheet_link};
use crate::storage::{self, KeyValueStore, keys};
use chrono::{DateTime, Duration, Local, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How long a live listing is reused before the API is asked again.
const PLANS_CACHE_TTL_MINUTES: i64 = 5;

/// Progress of a plan creation. `Done` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum CreationStage {
    Preparing,
    Creating,
    Formatting,
    Finishing,
    Done,
    Error(String),
}

impl CreationStage {
    /// Steps completed when this stage is entered, out of [`Self::STEPS`].
    pub const STEPS: u64 = 4;

    pub fn position(&self) -> u64 {
        match self {
            CreationStage::Preparing | CreationStage::Error(_) => 0,
            CreationStage::Creating => 1,
            CreationStage::Formatting => 2,
            CreationStage::Finishing => 3,
            CreationStage::Done => 4,
        }
    }
}

impl fmt::Display for CreationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreationStage::Preparing => write!(f, "Preparing spreadsheet"),
            CreationStage::Creating => write!(f, "Creating account plan"),
            CreationStage::Formatting => write!(f, "Formatting account plan"),
            CreationStage::Finishing => write!(f, "Finishing up"),
            CreationStage::Done => write!(f, "Done"),
            CreationStage::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: &CreationStage);
}

impl<F> StageObserver for F
where
    F: Fn(&CreationStage) + Send + Sync,
{
    fn on_stage(&self, stage: &CreationStage) {
        self(stage)
    }
}

/// User-level plan operations over the spreadsheet service and local index.
pub struct PlanWorkflow<S> {
    sheets: S,
    index: PlanIndex,
    store: Arc<dyn KeyValueStore>,
}

impl<S> PlanWorkflow<S>
where
    S: PlanSheets,
{
    pub fn new(sheets: S, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sheets,
            index: PlanIndex::new(store.clone()),
            store,
        }
    }

    #[cfg(test)]
    pub fn index(&self) -> &PlanIndex {
        &self.index
    }

    /// Add a plan tab, fill and format it, then record it locally. Any
    /// failed step stops the run and is reported as [`CreationStage::Error`].
    #[instrument(name = "Creating plan", skip(self, current_tab, observer))]
    pub async fn create_plan(
        &self,
        name: &str,
        current_tab: Option<&str>,
        observer: &dyn StageObserver,
    ) -> Result<CreatedPlanSheet> {
        let result = self.run_creation(name, current_tab, observer).await;
        if let Err(e) = &result {
            observer.on_stage(&CreationStage::Error(user_message(e.kind(), e)));
        }
        result
    }

    async fn run_creation(
        &self,
        name: &str,
        current_tab: Option<&str>,
        observer: &dyn StageObserver,
    ) -> Result<CreatedPlanSheet> {
        observer.on_stage(&CreationStage::Preparing);
        sanitize_sheet_title(name)?;
        let master = self.sheets.get_or_create_master_spreadsheet().await?;
        debug!(master = %master.id, "Master spreadsheet ready");

        observer.on_stage(&CreationStage::Creating);
        let created = self
            .sheets
            .create_account_plan_sheet(name, current_tab)
            .await?;

        observer.on_stage(&CreationStage::Formatting);
        let rows = plan_rows(&created.sheet_title, Local::now().date_naive());
        self.sheets
            .update_sheet_data(&created.spreadsheet_id, &created.sheet_title, &rows)
            .await?;
        self.sheets
            .apply_plan_formatting(&created.spreadsheet_id, created.sheet_gid)
            .await;

        observer.on_stage(&CreationStage::Finishing);
        if !self
            .sheets
            .refresh_overview_content(&created.spreadsheet_id)
            .await
        {
            warn!("Plan created but the overview was not updated");
        }
        self.index
            .save(PlanRecord::sheet(
                &created.sheet_title,
                &created.spreadsheet_id,
                created.sheet_gid,
                &created.spreadsheet_url,
            ))
            .await?;
        self.forget_listing().await?;

        observer.on_stage(&CreationStage::Done);
        info!(url = %created.spreadsheet_url, "Account plan created");
        Ok(created)
    }

    /// Create a plan as a copy of a template file instead of a new tab.
    #[instrument(name = "Creating plan from template", skip(self, observer))]
    pub async fn create_plan_from_template(
        &self,
        name: &str,
        template_id: &str,
        observer: &dyn StageObserver,
    ) -> Result<SpreadsheetRef> {
        let result = async {
            observer.on_stage(&CreationStage::Preparing);
            let title = sanitize_sheet_title(name)?;

            observer.on_stage(&CreationStage::Creating);
            let copied = self.sheets.copy_template(template_id, &title).await?;

            observer.on_stage(&CreationStage::Finishing);
            self.index
                .save(PlanRecord::copy(&title, &copied.id, &copied.url))
                .await?;

            observer.on_stage(&CreationStage::Done);
            Ok::<_, AppError>(copied)
        }
        .await;

        if let Err(e) = &result {
            observer.on_stage(&CreationStage::Error(user_message(e.kind(), e)));
        }
        result
    }

    /// Recent plans from the index; when there are none (or `force`), the
    /// tabs of the master spreadsheet, reused for a few minutes.
    #[instrument(name = "Listing plans", skip(self))]
    pub async fn list_plans(&self, force: bool) -> Result<Vec<PlanRecord>> {
        if !force {
            let recent = self.index.list().await?;
            if !recent.is_empty() {
                return Ok(recent);
            }
            if let Some(cached) = self.cached_listing().await? {
                debug!("Using cached plan listing");
                return Ok(cached);
            }
        }

        let Some(master) = self.master().await? else {
            debug!("No master spreadsheet yet");
            return Ok(Vec::new());
        };

        let plans: Vec<PlanRecord> = self
            .sheets
            .list_plan_sheets(&master.id, force)
            .await?
            .into_iter()
            .map(|tab| {
                let url = spreadsheet_link(&master.id, Some(tab.gid));
                PlanRecord::sheet(&tab.title, &master.id, tab.gid, &url)
            })
            .collect();

        let expiry = Utc::now() + Duration::minutes(PLANS_CACHE_TTL_MINUTES);
        storage::save(self.store.as_ref(), keys::PLANS_CACHE, &plans).await?;
        storage::save(self.store.as_ref(), keys::PLANS_CACHE_EXPIRY, &expiry).await?;

        Ok(plans)
    }

    /// Delete a plan's tab and drop it from the index.
    #[instrument(name = "Deleting plan", skip(self))]
    pub async fn delete_plan(&self, name: &str) -> Result<DeleteOutcome> {
        let local = self.index.find(name).await?;

        if let Some(record) = local.as_ref().filter(|r| r.kind == PlanKind::Copy) {
            // Standalone copies live in Drive; only the local entry goes
            self.index.remove(&PlanMatcher::for_record(record)).await?;
            info!("Forgot copied plan");
            return Ok(DeleteOutcome {
                success: true,
                overview_updated: false,
            });
        }

        let master = self.master().await?.ok_or_else(|| {
            AppError::NotFound("No account plan spreadsheet has been created yet".to_string())
        })?;
        let matcher = match &local {
            Some(record) => PlanMatcher::for_record(record),
            None => PlanMatcher::Name {
                name: sanitize_sheet_title(name)?,
                spreadsheet_id: master.id.clone(),
            },
        };

        let outcome = match self.sheets.delete_account_plan_sheet(&master.id, name).await {
            Ok(outcome) => outcome,
            Err(e @ AppError::NotFound(_)) => {
                // The tab is already gone, the local entry is stale
                if self.index.remove(&matcher).await? > 0 {
                    warn!("Removed stale local entry");
                }
                self.forget_listing().await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.index.remove(&matcher).await?;
        self.forget_listing().await?;
        Ok(outcome)
    }

    /// Rebuild the overview of the master spreadsheet, if there is one.
    pub async fn refresh_overview(&self) -> Result<bool> {
        let master = self.master().await?.ok_or_else(|| {
            AppError::NotFound("No account plan spreadsheet has been created yet".to_string())
        })?;
        Ok(self.sheets.refresh_overview_content(&master.id).await)
    }

    async fn master(&self) -> Result<Option<SpreadsheetRef>> {
        storage::load(self.store.as_ref(), keys::MASTER_SHEET).await
    }

    async fn cached_listing(&self) -> Result<Option<Vec<PlanRecord>>> {
        let expiry: Option<DateTime<Utc>> =
            storage::load(self.store.as_ref(), keys::PLANS_CACHE_EXPIRY).await?;
        match expiry {
            Some(expiry) if expiry > Utc::now() => {
                storage::load(self.store.as_ref(), keys::PLANS_CACHE).await
            }
            _ => Ok(None),
        }
    }

    async fn forget_listing(&self) -> Result<()> {
        self.store
            .remove(&[keys::PLANS_CACHE, keys::PLANS_CACHE_EXPIRY])
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::{MockSheets, Stages};
    use super::*;
    use crate::sheets::SheetTab;
    use crate::storage::MemoryStore;

    fn workflow(sheets: MockSheets) -> (PlanWorkflow<MockSheets>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PlanWorkflow::new(sheets, store.clone()), store)
    }

    async fn store_master(store: &MemoryStore) {
        let master = SpreadsheetRef {
            id: "master-1".to_string(),
            url: "https://docs.google.com/spreadsheets/d/master-1/edit".to_string(),
        };
        storage::save(store, keys::MASTER_SHEET, &master).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_plan_walks_every_stage() {
        let (workflow, _store) = workflow(MockSheets::new());
        let stages = Stages::default();

        let created = workflow
            .create_plan("Acme Inc.", None, &stages)
            .await
            .unwrap();

        assert_eq!(
            *stages.0.lock().unwrap(),
            vec![
                CreationStage::Preparing,
                CreationStage::Creating,
                CreationStage::Formatting,
                CreationStage::Finishing,
                CreationStage::Done,
            ]
        );
        assert_eq!(
            workflow.sheets.calls(),
            vec!["master", "create", "write", "format_plan", "overview"]
        );

        let plans = workflow.index().list().await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].name, "Acme Inc.");
        assert_eq!(plans[0].sheet_gid, Some(created.sheet_gid));
        assert!(plans[0].url.contains("gid=42"));
    }

    #[tokio::test]
    async fn test_create_plan_stops_at_first_failure() {
        let sheets = MockSheets::failing(
            "create",
            AppError::Conflict("An account plan named 'Acme' already exists".to_string()),
        );
        let (workflow, _store) = workflow(sheets);
        let stages = Stages::default();

        let err = workflow.create_plan("Acme", None, &stages).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            *stages.0.lock().unwrap(),
            vec![
                CreationStage::Preparing,
                CreationStage::Creating,
                CreationStage::Error(
                    "Conflict: An account plan named 'Acme' already exists".to_string()
                ),
            ]
        );
        assert!(workflow.index().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_plan_rejects_blank_name_before_any_call() {
        let (workflow, _store) = workflow(MockSheets::new());
        let stages = Stages::default();

        let err = workflow.create_plan(" :/ ", None, &stages).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(workflow.sheets.calls().is_empty());
    }

    #[tokio::test]
    async fn test_overview_failure_does_not_fail_creation() {
        let sheets = MockSheets {
            overview_ok: false,
            ..MockSheets::new()
        };
        let (workflow, _store) = workflow(sheets);
        let stages = Stages::default();

        workflow.create_plan("Acme", None, &stages).await.unwrap();
        assert_eq!(stages.0.lock().unwrap().last(), Some(&CreationStage::Done));
    }

    #[tokio::test]
    async fn test_create_from_template_records_copy() {
        let (workflow, _store) = workflow(MockSheets::new());
        let stages = Stages::default();

        let copied = workflow
            .create_plan_from_template("Acme", "template-9", &stages)
            .await
            .unwrap();

        assert_eq!(copied.id, "copy-1");
        let plans = workflow.index().list().await.unwrap();
        assert_eq!(plans[0].kind, PlanKind::Copy);
        assert_eq!(plans[0].sheet_gid, None);
    }

    #[tokio::test]
    async fn test_list_plans_falls_back_to_live_listing_then_cache() {
        let sheets = MockSheets {
            tabs: vec![
                SheetTab {
                    title: "Acme".to_string(),
                    gid: 7,
                },
                SheetTab {
                    title: "Globex".to_string(),
                    gid: 8,
                },
            ],
            ..MockSheets::new()
        };
        let (workflow, store) = workflow(sheets);
        store_master(&store).await;

        let live = workflow.list_plans(false).await.unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[1].url, "https://docs.google.com/spreadsheets/d/master-1/edit#gid=8");

        let cached = workflow.list_plans(false).await.unwrap();
        assert_eq!(cached, live);
        assert_eq!(workflow.sheets.calls(), vec!["list"]);

        workflow.list_plans(true).await.unwrap();
        assert_eq!(workflow.sheets.calls(), vec!["list", "list"]);
    }

    #[tokio::test]
    async fn test_list_plans_without_master_is_empty() {
        let (workflow, _store) = workflow(MockSheets::new());
        assert!(workflow.list_plans(false).await.unwrap().is_empty());
        assert!(workflow.sheets.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_plan_removes_local_record() {
        let (workflow, store) = workflow(MockSheets::new());
        store_master(&store).await;
        workflow
            .create_plan("Acme", None, &Stages::default())
            .await
            .unwrap();

        let outcome = workflow.delete_plan("Acme").await.unwrap();

        assert!(outcome.success);
        assert!(workflow.index().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_plan_drops_stale_record_when_tab_is_gone() {
        let sheets = MockSheets::failing("delete", AppError::NotFound("gone".to_string()));
        let (workflow, store) = workflow(sheets);
        store_master(&store).await;
        workflow
            .create_plan("Acme", None, &Stages::default())
            .await
            .unwrap();

        let err = workflow.delete_plan("Acme").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(workflow.index().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_master_is_not_found() {
        let (workflow, _store) = workflow(MockSheets::new());
        let err = workflow.delete_plan("Acme").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
