//! Sheet titles, A1 notation and write chunking.

use crate::error::{AppError, Result};
use serde_json::Value;

/// Longest title accepted for a sheet tab.
pub const MAX_TITLE_LEN: usize = 100;

/// Upper bound on cells sent in one values write.
pub const BATCH_CELL_LIMIT: usize = 1000;

const FORBIDDEN_TITLE_CHARS: &[char] = &['[', ']', '*', '?', '/', '\\', ':'];

/// Turn a user-supplied account name into a valid sheet title.
pub fn sanitize_sheet_title(name: &str) -> Result<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN_TITLE_CHARS.contains(c) && !c.is_control())
        .collect();
    let title: String = cleaned.trim().chars().take(MAX_TITLE_LEN).collect();
    let title = title.trim_end().to_string();

    if title.is_empty() {
        return Err(AppError::Validation(
            "Account name must not be empty".to_string(),
        ));
    }
    Ok(title)
}

/// Column letters for a 1-based column number (1 → A, 27 → AA).
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Sheet name quoted for A1 notation.
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Range covering `rows` rows of `columns` columns starting at 1-based
/// `start_row`.
pub fn a1_range(sheet: &str, start_row: usize, columns: usize, rows: usize) -> String {
    let end_row = start_row + rows.max(1) - 1;
    format!(
        "{}!A{}:{}{}",
        quote_sheet(sheet),
        start_row,
        column_letter(columns.max(1)),
        end_row
    )
}

/// Range covering every column of the sheet, for clears.
pub fn whole_sheet_range(sheet: &str) -> String {
    format!("{}!A:Z", quote_sheet(sheet))
}

/// Replace nulls with empty strings so every cell is written.
pub fn sanitize_rows(rows: &[Vec<Value>]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Value::Null => Value::String(String::new()),
                    other => other.clone(),
                })
                .collect()
        })
        .collect()
}

/// One range-scoped write of a larger table.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<'a> {
    pub range: String,
    pub rows: &'a [Vec<Value>],
}

/// Split `rows` into consecutive writes that each stay within
/// [`BATCH_CELL_LIMIT`] cells. A table under the limit is one write.
pub fn chunk_rows<'a>(sheet: &str, rows: &'a [Vec<Value>]) -> Vec<Chunk<'a>> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);

    if rows.len() * columns <= BATCH_CELL_LIMIT {
        return vec![Chunk {
            range: a1_range(sheet, 1, columns, rows.len()),
            rows,
        }];
    }

    let rows_per_chunk = (BATCH_CELL_LIMIT / columns).max(1);
    rows.chunks(rows_per_chunk)
        .enumerate()
        .map(|(i, chunk)| Chunk {
            range: a1_range(sheet, i * rows_per_chunk + 1, columns, chunk.len()),
            rows: chunk,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_sheet_title() {
        assert_eq!(sanitize_sheet_title("  Acme Inc.  ").unwrap(), "Acme Inc.");
        assert_eq!(sanitize_sheet_title("Acme/West: [EU]").unwrap(), "AcmeWest EU");
        assert_eq!(sanitize_sheet_title(&"x".repeat(150)).unwrap().len(), 100);
        assert!(matches!(
            sanitize_sheet_title(" /*? "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_a1_range_quotes_sheet_names() {
        assert_eq!(a1_range("Acme Inc.", 1, 3, 2), "'Acme Inc.'!A1:C2");
        assert_eq!(a1_range("O'Brien", 5, 1, 1), "'O''Brien'!A5:A5");
    }

    #[test]
    fn test_small_table_is_one_write() {
        let rows = vec![vec![json!("a"), json!("b")]; 10];
        let chunks = chunk_rows("Plan", &rows);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].range, "'Plan'!A1:B10");
    }

    #[test]
    fn test_large_table_chunks_partition_rows() {
        let rows: Vec<Vec<Value>> = (0..1500).map(|i| vec![json!(i)]).collect();
        let chunks = chunk_rows("Plan", &rows);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].range, "'Plan'!A1:A1000");
        assert_eq!(chunks[1].range, "'Plan'!A1001:A1500");

        let rejoined: Vec<Vec<Value>> = chunks.iter().flat_map(|c| c.rows.to_vec()).collect();
        assert_eq!(rejoined, rows);
    }

    #[test]
    fn test_chunks_respect_cell_limit_for_wide_rows() {
        let rows = vec![vec![json!("x"); 7]; 400];
        let chunks = chunk_rows("Plan", &rows);

        assert!(chunks.iter().all(|c| c.rows.len() * 7 <= BATCH_CELL_LIMIT));
        assert_eq!(chunks[0].range, "'Plan'!A1:G142");
        assert_eq!(chunks[1].range, "'Plan'!A143:G284");
        assert_eq!(chunks[2].range, "'Plan'!A285:G400");
    }

    #[test]
    fn test_sanitize_rows_replaces_nulls() {
        let rows = vec![vec![json!(null), json!("a"), json!(3)]];
        assert_eq!(sanitize_rows(&rows), vec![vec![json!(""), json!("a"), json!(3)]]);
    }
}
