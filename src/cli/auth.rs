use super::Services;
use crate::auth::clear_google_tokens;
use crate::error::Result;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Sign in with Google, prompting if needed
    Login {
        /// Forget cached tokens first
        #[arg(long)]
        reset: bool,
    },
    /// Revoke and forget the current credential
    Logout,
    /// Show whether a usable credential is held
    Status,
}

impl AuthAction {
    pub async fn execute(&self) -> Result<()> {
        match self {
            AuthAction::Login { reset } => login(*reset).await,
            AuthAction::Logout => logout().await,
            AuthAction::Status => status().await,
        }
    }
}

async fn login(reset: bool) -> Result<()> {
    if reset {
        clear_google_tokens()?;
    }

    let services = Services::connect(false).await?;
    let credential = services.credentials.acquire(true).await?;

    info!(expires_at = %credential.expires_at, "Signed in to Google");
    Ok(())
}

async fn logout() -> Result<()> {
    let services = Services::connect(false).await?;
    services.credentials.invalidate().await?;
    clear_google_tokens()?;
    Ok(())
}

async fn status() -> Result<()> {
    let services = Services::connect(false).await?;

    match services.credentials.current().await {
        Some(credential) => info!(expires_at = %credential.expires_at, "Signed in"),
        None => info!("Not signed in"),
    }
    Ok(())
}
