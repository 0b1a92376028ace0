mod auth;
mod plans;
mod settings;
mod show;

use crate::auth::{CredentialProvider, GoogleIdentity};
use crate::config::Config;
use crate::error::Result;
use crate::http::{NetworkStatus, RequestEngine};
use crate::plans::PlanWorkflow;
use crate::sheets::SheetsService;
use crate::storage::{self, FileStore, KeyValueStore};
use clap::{Parser, Subcommand};
use std::sync::Arc;

pub use auth::AuthAction;
pub use plans::PlansCommand;
pub use settings::SettingsCommand;
pub use show::ShowResource;

const STORE_FILE: &str = "store.json";

#[derive(Parser, Debug)]
#[command(name = "account-plans")]
#[command(about = "Create and manage account plans in Google Sheets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Answer from cached data only and never contact Google
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Auth { action } => action.execute().await,
            Commands::Plans { command } => command.execute(self.offline).await,
            Commands::Settings { setting } => setting.execute().await,
            Commands::Show { resource } => resource.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in to or out of Google
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Create, list, search and delete account plans
    Plans {
        #[command(subcommand)]
        command: PlansCommand,
    },
    /// Change local preferences
    Settings {
        #[command(subcommand)]
        setting: SettingsCommand,
    },
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}

pub(crate) fn open_store() -> Result<Arc<dyn KeyValueStore>> {
    let store = FileStore::open(Config::data_file(STORE_FILE)?)?;
    Ok(Arc::new(store))
}

/// The connected service stack shared by commands that talk to Google.
pub(crate) struct Services {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub credentials: CredentialProvider,
    pub engine: RequestEngine,
}

impl Services {
    pub async fn connect(offline: bool) -> Result<Self> {
        let config = Config::load()?;
        let store = open_store()?;
        storage::log_changes(store.as_ref());
        let identity = GoogleIdentity::new(&config.google).await?;
        let credentials = CredentialProvider::new(Arc::new(identity), store.clone());

        let network = Arc::new(NetworkStatus::new());
        if offline {
            network.set_online(false);
        }
        let engine = RequestEngine::new(credentials.clone(), config.requests.clone(), network)?;
        engine.spawn_sweeper();

        Ok(Self {
            config,
            store,
            credentials,
            engine,
        })
    }

    pub fn workflow(&self) -> Result<PlanWorkflow<SheetsService>> {
        let sheets = SheetsService::new(self.engine.clone(), self.store.clone(), &self.config.sheets)?;
        Ok(PlanWorkflow::new(sheets, self.store.clone()))
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}
