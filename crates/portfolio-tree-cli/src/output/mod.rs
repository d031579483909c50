pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The rows worth tabulating in a result: per-security rows for reports,
/// entity weights for optimizations.
pub(crate) fn primary_rows(result: &Value) -> Option<&Vec<Value>> {
    result
        .pointer("/report/securities")
        .or_else(|| result.get("weights"))
        .and_then(|v| v.as_array())
}
