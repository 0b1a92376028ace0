use super::{Credential, IdentityProvider, is_valid_token};
use crate::error::{AppError, Result};
use crate::http::SingleFlight;
use crate::storage::{self, KeyValueStore, keys};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct CredentialSettings {
    /// Silent calls inside this window reuse the last credential outright.
    pub cooldown: Duration,
    /// Remaining lifetime below which a background refresh is started.
    pub refresh_threshold: chrono::Duration,
    /// Upper bound on a single identity provider call.
    pub acquire_timeout: Duration,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            refresh_threshold: chrono::Duration::minutes(30),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    last: Option<Credential>,
    last_acquired: Option<Instant>,
    last_refreshed: Option<Instant>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn KeyValueStore>,
    settings: CredentialSettings,
    flights: SingleFlight<(), Result<Fetched>>,
    state: Mutex<State>,
}

#[derive(Debug, Clone)]
struct Fetched {
    credential: Credential,
    refresh_soon: bool,
}

/// Issues bearer tokens to the request layer.
///
/// At most one identity provider call is outstanding at a time; callers
/// arriving meanwhile share its result.
#[derive(Clone)]
pub struct CredentialProvider {
    inner: Arc<Inner>,
}

impl CredentialProvider {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_settings(identity, store, CredentialSettings::default())
    }

    pub fn with_settings(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
        settings: CredentialSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                store,
                settings,
                flights: SingleFlight::new(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a usable credential, acquiring one if needed.
    pub async fn acquire(&self, interactive: bool) -> Result<Credential> {
        if !interactive {
            if let Some(credential) = self.within_cooldown() {
                debug!("Reusing credential acquired within cooldown");
                return Ok(credential);
            }
        }

        let this = self.clone();
        let fetched = self
            .inner
            .flights
            .run((), move || async move { this.load_or_fetch(interactive).await })
            .await?;

        if fetched.refresh_soon {
            self.spawn_background_refresh();
        }

        Ok(fetched.credential)
    }

    /// Like [`acquire`](Self::acquire) without prompting; failures mean "not
    /// signed in".
    pub async fn current(&self) -> Option<Credential> {
        match self.acquire(false).await {
            Ok(credential) => Some(credential),
            Err(e) => {
                debug!(error = %e, "No usable credential");
                None
            }
        }
    }

    /// Replace the current credential with a freshly issued one.
    ///
    /// Repeated calls inside the cooldown window return the credential the
    /// previous refresh produced.
    #[instrument(name = "Refreshing credential", skip_all)]
    pub async fn refresh(&self) -> Result<Credential> {
        if let Some(credential) = self.refreshed_within_cooldown() {
            debug!("Credential was refreshed moments ago, reusing it");
            return Ok(credential);
        }

        let this = self.clone();
        let fetched = self
            .inner
            .flights
            .run((), move || async move { this.fetch(Fetch::Refresh).await })
            .await?;

        self.state().last_refreshed = Some(Instant::now());
        Ok(fetched.credential)
    }

    /// Revoke and forget the current credential. Succeeds when nothing is
    /// held.
    #[instrument(name = "Signing out", skip_all)]
    pub async fn invalidate(&self) -> Result<bool> {
        let stored = storage::load::<Credential>(self.inner.store.as_ref(), keys::AUTH_CREDENTIAL)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring unreadable stored credential");
                None
            });
        let held = self.state().last.take();

        let token = held.or(stored).map(|c| c.token);
        // Expired tokens fail to revoke; local sign-out goes ahead regardless
        if let Some(token) = &token {
            if let Err(e) = self.inner.identity.invalidate_token(token).await {
                warn!(error = %e, "Could not revoke credential");
            }
        }

        self.inner.store.remove(&[keys::AUTH_CREDENTIAL]).await?;
        *self.state() = State::default();

        match token {
            Some(_) => info!("Signed out"),
            None => debug!("No credential held"),
        }
        Ok(true)
    }

    pub fn is_valid(token: &str) -> bool {
        is_valid_token(token)
    }

    fn within_cooldown(&self) -> Option<Credential> {
        let state = self.state();
        let acquired = state.last_acquired?;
        if acquired.elapsed() < self.inner.settings.cooldown {
            state.last.clone().filter(|c| !c.is_expired())
        } else {
            None
        }
    }

    fn refreshed_within_cooldown(&self) -> Option<Credential> {
        let state = self.state();
        let refreshed = state.last_refreshed?;
        if refreshed.elapsed() < self.inner.settings.cooldown {
            state.last.clone()
        } else {
            None
        }
    }

    fn remember(&self, credential: &Credential) {
        let mut state = self.state();
        state.last = Some(credential.clone());
        state.last_acquired = Some(Instant::now());
    }

    async fn load_or_fetch(&self, interactive: bool) -> Result<Fetched> {
        let stored = storage::load::<Credential>(self.inner.store.as_ref(), keys::AUTH_CREDENTIAL)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring unreadable stored credential");
                None
            });

        if let Some(credential) = stored.filter(|c| !c.is_expired()) {
            let refresh_soon = credential.expires_within(self.inner.settings.refresh_threshold);
            debug!(refresh_soon, "Using stored credential");
            self.remember(&credential);
            return Ok(Fetched {
                credential,
                refresh_soon,
            });
        }

        self.fetch(Fetch::Acquire { interactive }).await
    }

    async fn fetch(&self, mode: Fetch) -> Result<Fetched> {
        let identity = &self.inner.identity;
        let (interactive, call) = match mode {
            Fetch::Acquire { interactive } => (interactive, identity.acquire_token(interactive)),
            Fetch::Refresh => (false, identity.refresh_token()),
        };

        let token = tokio::time::timeout(self.inner.settings.acquire_timeout, call)
            .await
            .map_err(|_| {
                AppError::Auth(format!(
                    "Token acquisition timed out after {:?}",
                    self.inner.settings.acquire_timeout
                ))
            })?
            .map_err(|e| match e {
                AppError::Auth(_) => e,
                other => AppError::Auth(other.to_string()),
            })?;

        if !Self::is_valid(&token) {
            return Err(AppError::Auth(
                "Identity provider returned a malformed token".to_string(),
            ));
        }

        let credential = Credential::issued(token, interactive);
        storage::save(self.inner.store.as_ref(), keys::AUTH_CREDENTIAL, &credential).await?;
        self.remember(&credential);
        debug!(expires_at = %credential.expires_at, "Acquired credential");

        Ok(Fetched {
            credential,
            refresh_soon: false,
        })
    }

    fn spawn_background_refresh(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.refresh().await {
                warn!(error = %e, "Background credential refresh failed");
            }
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum Fetch {
    Acquire { interactive: bool },
    Refresh,
}
