use super::open_store;
use crate::error::Result;
use crate::storage::{self, keys};
use clap::{Subcommand, ValueEnum};
use tracing::info;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show or change the dark mode preference
    DarkMode { value: Option<Toggle> },
}

impl SettingsCommand {
    pub async fn execute(&self) -> Result<()> {
        match self {
            SettingsCommand::DarkMode { value } => dark_mode(*value).await,
        }
    }
}

async fn dark_mode(value: Option<Toggle>) -> Result<()> {
    let store = open_store()?;

    if let Some(value) = value {
        storage::save(store.as_ref(), keys::DARK_MODE, &(value == Toggle::On)).await?;
    }

    let enabled: bool = storage::load(store.as_ref(), keys::DARK_MODE)
        .await?
        .unwrap_or(false);
    info!(enabled, "Dark mode");
    Ok(())
}
