use super::{STORE_FILE, open_store};
use crate::config::Config;
use crate::error::Result;
use crate::storage::keys;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum ShowResource {
    /// Show configuration, cache and data paths
    Paths,
    /// Show what is kept in the local store
    Store,
}

impl ShowResource {
    pub async fn execute(&self) -> Result<()> {
        match self {
            ShowResource::Paths => show_paths(),
            ShowResource::Store => show_store().await,
        }
    }
}

fn show_paths() -> Result<()> {
    let config_path = Config::config_file()?;
    let cache_dir = Config::cache_dir()?;
    let store_path = Config::data_file(STORE_FILE)?;

    info!(path = ?config_path, "Config path");
    info!(path = ?cache_dir, "Cache path");
    info!(path = ?store_path, "Data path");

    Ok(())
}

async fn show_store() -> Result<()> {
    let store = open_store()?;
    let mut entries: Vec<_> = store.get_all().await?.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if entries.is_empty() {
        info!("Local store is empty");
    }
    for (key, value) in entries {
        // Never print the access token
        if key == keys::AUTH_CREDENTIAL {
            info!(key = %key, "Stored (hidden)");
        } else {
            info!(key = %key, value = %value, "Stored");
        }
    }
    Ok(())
}
