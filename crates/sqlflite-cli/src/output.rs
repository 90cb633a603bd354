//! Result formatting for terminal output

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Table};
use sqlflite_client::{ResultSet, TableSchema};

/// Format a result set as a table, with a row count footer and any
/// engine warnings. Column and row order are exactly as returned.
pub fn render_result(result: &ResultSet) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(result.columns.iter().map(|c| Cell::new(&c.name)));

    for (i, column) in result.columns.iter().enumerate() {
        if column.data_type.is_numeric() {
            if let Some(col) = table.column_mut(i) {
                col.set_cell_alignment(CellAlignment::Right);
            }
        }
    }

    for row in &result.rows {
        table.add_row(row.values.iter().map(|v| v.to_string()));
    }

    let mut output = table.to_string();
    output.push('\n');
    output.push_str(&format!(
        "{} rows ({} ms)\n",
        result.row_count(),
        result.execution_time_ms
    ));

    if !result.warnings.is_empty() {
        output.push_str("warnings:\n");
        for warning in &result.warnings {
            output.push_str(&format!("  {warning}\n"));
        }
    }

    output
}

/// Format a table schema as name/type/nullable rows
pub fn render_schema(schema: &TableSchema) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["column", "type", "nullable"]);

    for column in &schema.columns {
        table.add_row([
            column.name.clone(),
            column.data_type.to_string(),
            column.nullable.to_string(),
        ]);
    }

    let mut output = table.to_string();
    output.push('\n');
    output
}
