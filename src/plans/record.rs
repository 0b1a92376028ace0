use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    /// A tab in the master spreadsheet.
    Sheet,
    /// A standalone copy of a template file.
    Copy,
}

/// One account plan as remembered locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub name: String,
    pub spreadsheet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_gid: Option<i32>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: PlanKind,
}

impl PlanRecord {
    pub fn sheet(name: &str, spreadsheet_id: &str, sheet_gid: i32, url: &str) -> Self {
        Self {
            name: name.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_gid: Some(sheet_gid),
            url: url.to_string(),
            created_at: Utc::now(),
            kind: PlanKind::Sheet,
        }
    }

    pub fn copy(name: &str, spreadsheet_id: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_gid: None,
            url: url.to_string(),
            created_at: Utc::now(),
            kind: PlanKind::Copy,
        }
    }

    /// When both records carry a tab id, the ids decide. Otherwise two
    /// records are the same plan if they share name and spreadsheet.
    pub fn same_plan(&self, other: &PlanRecord) -> bool {
        match (self.sheet_gid, other.sheet_gid) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name && self.spreadsheet_id == other.spreadsheet_id,
        }
    }
}

/// Selects records to drop from the index.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanMatcher {
    Gid(i32),
    Name {
        name: String,
        spreadsheet_id: String,
    },
}

impl PlanMatcher {
    /// Match by tab id when the record has one.
    pub fn for_record(record: &PlanRecord) -> Self {
        match record.sheet_gid {
            Some(gid) => PlanMatcher::Gid(gid),
            None => PlanMatcher::Name {
                name: record.name.clone(),
                spreadsheet_id: record.spreadsheet_id.clone(),
            },
        }
    }

    pub fn matches(&self, record: &PlanRecord) -> bool {
        match self {
            PlanMatcher::Gid(gid) => record.sheet_gid == Some(*gid),
            PlanMatcher::Name {
                name,
                spreadsheet_id,
            } => &record.name == name && &record.spreadsheet_id == spreadsheet_id,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    pub(crate) fn mock_plan(name: &str, gid: i32) -> PlanRecord {
        PlanRecord::sheet(
            name,
            "master-1",
            gid,
            &format!("https://docs.google.com/spreadsheets/d/master-1/edit#gid={}", gid),
        )
    }
}
