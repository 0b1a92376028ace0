use super::template::{OVERVIEW_HEADER_ROWS, OVERVIEW_HEADERS, PLAN_COLUMNS};
use google_sheets4::FieldMask;
use google_sheets4::api::{
    Border, CellData, CellFormat, Color, DimensionProperties, DimensionRange, GridProperties,
    GridRange, MergeCellsRequest, RepeatCellRequest, Request, SheetProperties, TextFormat,
    UpdateBordersRequest, UpdateDimensionPropertiesRequest, UpdateSheetPropertiesRequest,
};

fn rgb(red: f32, green: f32, blue: f32) -> Color {
    Color {
        red: Some(red),
        green: Some(green),
        blue: Some(blue),
        alpha: Some(1.0),
    }
}

fn rows_range(sheet_id: i32, start_row: i32, end_row: i32, columns: i32) -> GridRange {
    GridRange {
        sheet_id: Some(sheet_id),
        start_row_index: Some(start_row),
        end_row_index: Some(end_row),
        start_column_index: Some(0),
        end_column_index: Some(columns),
    }
}

/// Make rows `[start_row, end_row)` bold.
pub(super) fn bold_rows_rule(sheet_id: i32, start_row: i32, end_row: i32) -> Request {
    Request {
        repeat_cell: Some(RepeatCellRequest {
            range: Some(GridRange {
                sheet_id: Some(sheet_id),
                start_row_index: Some(start_row),
                end_row_index: Some(end_row),
                start_column_index: None,
                end_column_index: None,
            }),
            cell: Some(CellData {
                user_entered_format: Some(CellFormat {
                    text_format: Some(TextFormat {
                        bold: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            fields: Some(FieldMask::new(&["userEnteredFormat.textFormat.bold"])),
        }),
        ..Default::default()
    }
}

/// Shaded, bold, centered header row.
pub(super) fn header_fill_rule(sheet_id: i32, row: i32, columns: i32) -> Request {
    Request {
        repeat_cell: Some(RepeatCellRequest {
            range: Some(rows_range(sheet_id, row, row + 1, columns)),
            cell: Some(CellData {
                user_entered_format: Some(CellFormat {
                    background_color: Some(rgb(0.235, 0.471, 0.847)),
                    horizontal_alignment: Some("CENTER".to_string()),
                    text_format: Some(TextFormat {
                        bold: Some(true),
                        foreground_color: Some(rgb(1.0, 1.0, 1.0)),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            fields: Some(FieldMask::new(&[
                "userEnteredFormat.backgroundColor",
                "userEnteredFormat.horizontalAlignment",
                "userEnteredFormat.textFormat",
            ])),
        }),
        ..Default::default()
    }
}

/// Freeze the first `rows` rows.
pub(super) fn freeze_rows_rule(sheet_id: i32, rows: i32) -> Request {
    Request {
        update_sheet_properties: Some(UpdateSheetPropertiesRequest {
            properties: Some(SheetProperties {
                sheet_id: Some(sheet_id),
                grid_properties: Some(GridProperties {
                    frozen_row_count: Some(rows),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            fields: Some(FieldMask::new(&["gridProperties.frozenRowCount"])),
        }),
        ..Default::default()
    }
}

/// Merge the title row across the table width.
pub(super) fn merge_title_rule(sheet_id: i32, columns: i32) -> Request {
    Request {
        merge_cells: Some(MergeCellsRequest {
            range: Some(rows_range(sheet_id, 0, 1, columns)),
            merge_type: Some("MERGE_ALL".to_string()),
        }),
        ..Default::default()
    }
}

/// Thin borders around and inside a block of rows.
pub(super) fn borders_rule(sheet_id: i32, start_row: i32, end_row: i32, columns: i32) -> Request {
    let border = Border {
        style: Some("SOLID".to_string()),
        color: Some(rgb(0.8, 0.8, 0.8)),
        ..Default::default()
    };

    Request {
        update_borders: Some(UpdateBordersRequest {
            range: Some(rows_range(sheet_id, start_row, end_row, columns)),
            top: Some(border.clone()),
            bottom: Some(border.clone()),
            left: Some(border.clone()),
            right: Some(border.clone()),
            inner_horizontal: Some(border.clone()),
            inner_vertical: Some(border),
        }),
        ..Default::default()
    }
}

/// Set the width of columns `[start, end)` in pixels.
pub(super) fn column_width_rule(sheet_id: i32, start: i32, end: i32, pixels: i32) -> Request {
    Request {
        update_dimension_properties: Some(UpdateDimensionPropertiesRequest {
            range: Some(DimensionRange {
                sheet_id: Some(sheet_id),
                dimension: Some("COLUMNS".to_string()),
                start_index: Some(start),
                end_index: Some(end),
            }),
            properties: Some(DimensionProperties {
                pixel_size: Some(pixels),
                ..Default::default()
            }),
            fields: Some(FieldMask::new(&["pixelSize"])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Full overview styling for a table with `plan_rows` data rows.
pub(super) fn overview_rules(sheet_id: i32, plan_rows: usize) -> Vec<Request> {
    let columns = OVERVIEW_HEADERS.len() as i32;
    let header_rows = OVERVIEW_HEADER_ROWS as i32;
    let table_end = header_rows + plan_rows as i32;

    let mut requests = vec![
        merge_title_rule(sheet_id, columns),
        bold_rows_rule(sheet_id, 0, 1),
        header_fill_rule(sheet_id, header_rows - 1, columns),
        freeze_rows_rule(sheet_id, header_rows),
        column_width_rule(sheet_id, 0, 1, 240),
        column_width_rule(sheet_id, 1, columns, 120),
    ];
    if plan_rows > 0 {
        requests.push(borders_rule(sheet_id, header_rows - 1, table_end, columns));
    }
    requests
}

/// Styling for a new account plan tab.
pub(super) fn plan_rules(sheet_id: i32) -> Vec<Request> {
    vec![
        bold_rows_rule(sheet_id, 0, 1),
        freeze_rows_rule(sheet_id, 1),
        column_width_rule(sheet_id, 0, PLAN_COLUMNS as i32, 180),
    ]
}
