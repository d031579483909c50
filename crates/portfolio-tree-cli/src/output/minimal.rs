use serde_json::Value;

use super::primary_rows;

/// Print just the answer: `name weight` per line for weight results,
/// otherwise the first well-known scalar of the result.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(rows) = primary_rows(result) {
        for row in rows {
            let name = row
                .get("ticker")
                .or_else(|| row.get("name"))
                .map(format_minimal)
                .unwrap_or_default();
            let weight = row
                .get("portfolio_asset_weight")
                .or_else(|| row.get("weight"))
                .map(format_minimal)
                .unwrap_or_default();
            println!("{} {}", name, weight);
        }
        return;
    }

    let priority_keys = [
        "sharpe_ratio",
        "adjusted_geometric_mean_5y",
        "standard_deviation_5y",
        "var_95",
        "imputed_cells",
    ];
    if let Value::Object(map) = result {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }
    println!("{}", format_minimal(result));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
