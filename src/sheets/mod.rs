mod client;
mod formatting;
pub mod ranges;
pub mod template;

pub use client::{SheetsService, spreadsheet_link};

use crate::error::Result;
use async_trait::async_trait;
use google_sheets4::api::UpdateValuesResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The per-installation spreadsheet holding the overview and every plan tab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpreadsheetRef {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPlanSheet {
    pub spreadsheet_id: String,
    pub spreadsheet_url: String,
    /// Title after sanitization, which may differ from the requested name.
    pub sheet_title: String,
    pub sheet_gid: i32,
    /// The caller is already looking at the master spreadsheet.
    pub is_inline_navigation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeleteOutcome {
    pub success: bool,
    pub overview_updated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetTab {
    pub title: String,
    pub gid: i32,
}

#[async_trait]
pub trait PlanSheets: Send + Sync {
    async fn get_or_create_master_spreadsheet(&self) -> Result<SpreadsheetRef>;

    async fn create_account_plan_sheet(
        &self,
        account_name: &str,
        current_tab: Option<&str>,
    ) -> Result<CreatedPlanSheet>;

    /// Write `rows` starting at A1, split into bounded writes when large.
    async fn update_sheet_data(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        rows: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse>;

    /// Cosmetic; failures are logged, never returned.
    async fn apply_overview_formatting(&self, spreadsheet_id: &str);

    /// Cosmetic; failures are logged, never returned.
    async fn apply_plan_formatting(&self, spreadsheet_id: &str, sheet_gid: i32);

    /// Rebuild the overview table from the current tabs. Returns whether it
    /// worked.
    async fn refresh_overview_content(&self, spreadsheet_id: &str) -> bool;

    async fn delete_account_plan_sheet(
        &self,
        spreadsheet_id: &str,
        account_name: &str,
    ) -> Result<DeleteOutcome>;

    /// Every tab except the overview.
    async fn list_plan_sheets(
        &self,
        spreadsheet_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<SheetTab>>;

    /// Duplicate a template file in Drive under `name`.
    async fn copy_template(&self, template_id: &str, name: &str) -> Result<SpreadsheetRef>;
}
