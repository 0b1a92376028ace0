//! Static sheet layouts.

use chrono::NaiveDate;
use serde_json::{Value, json};

pub const OVERVIEW_SHEET: &str = "Overview";
pub const OVERVIEW_TITLE: &str = "Account Plans Overview";
pub const OVERVIEW_HEADERS: &[&str] = &[
    "Account Name",
    "Created",
    "Last Updated",
    "Status",
    "Priority",
];
/// Rows above the first overview data row (title and headers).
pub const OVERVIEW_HEADER_ROWS: usize = 2;

const DEFAULT_STATUS: &str = "Active";
const DEFAULT_PRIORITY: &str = "Medium";

pub const PLAN_COLUMNS: usize = 4;

/// Overview table with one row per account plan tab.
pub fn overview_rows(plan_names: &[String], today: NaiveDate) -> Vec<Vec<Value>> {
    let date = today.format("%Y-%m-%d").to_string();
    let mut title = vec![json!(OVERVIEW_TITLE)];
    title.resize(OVERVIEW_HEADERS.len(), json!(""));

    let mut rows = vec![title, OVERVIEW_HEADERS.iter().map(|h| json!(h)).collect()];
    rows.extend(plan_names.iter().map(|name| {
        vec![
            json!(name),
            json!(date),
            json!(date),
            json!(DEFAULT_STATUS),
            json!(DEFAULT_PRIORITY),
        ]
    }));
    rows
}

/// Starting content of a new account plan tab.
pub fn plan_rows(account_name: &str, today: NaiveDate) -> Vec<Vec<Value>> {
    let date = today.format("%Y-%m-%d").to_string();
    let row = |cells: &[&str]| -> Vec<Value> {
        let mut row: Vec<Value> = cells.iter().map(|c| json!(c)).collect();
        row.resize(PLAN_COLUMNS, Value::Null);
        row
    };

    vec![
        row(&[&format!("Account Plan: {}", account_name)]),
        row(&["Created", &date]),
        row(&[]),
        row(&["Account Summary"]),
        row(&["Industry", ""]),
        row(&["Annual Revenue", ""]),
        row(&["Account Owner", ""]),
        row(&[]),
        row(&["Key Stakeholders"]),
        row(&["Name", "Role", "Influence", "Notes"]),
        row(&[]),
        row(&[]),
        row(&["Goals"]),
        row(&["Goal", "Metric", "Target Date", "Status"]),
        row(&[]),
        row(&[]),
        row(&["Action Items"]),
        row(&["Action", "Owner", "Due", "Status"]),
        row(&[]),
        row(&[]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_rows() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let rows = overview_rows(&["Acme Inc.".to_string()], today);

        assert_eq!(rows.len(), OVERVIEW_HEADER_ROWS + 1);
        assert_eq!(rows[0][0], json!(OVERVIEW_TITLE));
        assert_eq!(rows[1].len(), OVERVIEW_HEADERS.len());
        assert_eq!(
            rows[2],
            vec![
                json!("Acme Inc."),
                json!("2026-10-19"),
                json!("2026-10-19"),
                json!("Active"),
                json!("Medium"),
            ]
        );
    }

    #[test]
    fn test_plan_rows_are_rectangular() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let rows = plan_rows("Acme Inc.", today);

        assert_eq!(rows[0][0], json!("Account Plan: Acme Inc."));
        assert!(rows.iter().all(|r| r.len() == PLAN_COLUMNS));
    }
}
