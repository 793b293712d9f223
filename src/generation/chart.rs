//! Chart Data Preparation - Project result rows onto a chart config's axes

use super::heuristics::{as_number, classify_columns, ColumnKind};
use crate::execution::{DataShape, Row, TransformationMetadata};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

pub const CHART_DATA_OPERATION: &str = "chart_data_preparation";

/// Axis field from a config entry: `"col"`, `{"field": "col"}` or `["col", ...]`
fn axis_field(config: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match config.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("field")
            .or_else(|| obj.get("column"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

fn chart_type(config: &Value) -> &str {
    config
        .get("chart_type")
        .or_else(|| config.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("bar")
}

/// Derive the series a renderer needs from `config` and `rows`
///
/// KPI configs produce `{field, value}`; axis charts produce
/// `{x_field, y_field, x, y}`. Configs whose axes do not name a result
/// column fall back to the first two columns.
pub fn build_chart_data(config: &Value, rows: &[Row]) -> (Value, TransformationMetadata) {
    let started = Instant::now();
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    let has_column = |name: &str| columns.iter().any(|c| c == name);
    let info = classify_columns(&columns, rows);

    let mut applied = Vec::new();
    let (data, output_shape) = if chart_type(config).eq_ignore_ascii_case("kpi") {
        let field = axis_field(config, &["value_field", "y_axis", "metric"])
            .filter(|f| has_column(f.as_str()))
            .or_else(|| {
                info.iter()
                    .find(|c| c.kind == ColumnKind::Numeric)
                    .map(|c| c.name.clone())
            });
        let value = field
            .as_deref()
            .and_then(|f| rows.first().and_then(|row| row.get(f)))
            .cloned()
            .unwrap_or(Value::Null);
        applied.push("kpi_extraction".to_string());
        (
            json!({ "field": field, "value": value }),
            DataShape {
                rows: usize::from(!value.is_null()),
                columns: 1,
            },
        )
    } else {
        let mut x_field = axis_field(config, &["x_axis", "x", "x_field"]).filter(|f| has_column(f.as_str()));
        let mut y_field = axis_field(config, &["y_axis", "y", "y_field"]).filter(|f| has_column(f.as_str()));
        if x_field.is_none() || y_field.is_none() {
            applied.push("default_axes".to_string());
        }
        if x_field.is_none() {
            x_field = columns.first().cloned();
        }
        if y_field.is_none() {
            y_field = columns
                .iter()
                .find(|c| Some(*c) != x_field.as_ref())
                .or(x_field.as_ref())
                .cloned();
        }

        let project = |field: &Option<String>, numeric: bool| -> Vec<Value> {
            let Some(field) = field else {
                return Vec::new();
            };
            rows.iter()
                .map(|row| match row.get(field) {
                    Some(v @ Value::Number(_)) => v.clone(),
                    Some(v) if numeric => as_number(v).map(|n| json!(n)).unwrap_or(Value::Null),
                    Some(v) => v.clone(),
                    None => Value::Null,
                })
                .collect()
        };
        let y_numeric = info
            .iter()
            .any(|c| Some(&c.name) == y_field.as_ref() && c.kind == ColumnKind::Numeric);
        let x = project(&x_field, false);
        let y = project(&y_field, y_numeric);
        applied.push("axis_projection".to_string());

        (
            json!({ "x_field": x_field, "y_field": y_field, "x": x, "y": y }),
            DataShape {
                rows: rows.len(),
                columns: 2,
            },
        )
    };

    let mut metadata = HashMap::new();
    metadata.insert("chart_type".to_string(), json!(chart_type(config)));

    let transformation = TransformationMetadata {
        operation: CHART_DATA_OPERATION.to_string(),
        input_shape: DataShape {
            rows: rows.len(),
            columns: columns.len(),
        },
        output_shape,
        execution_time_ms: started.elapsed().as_millis() as u64,
        engine_used: "in_process".to_string(),
        rows_processed: rows.len(),
        columns_processed: columns.len(),
        transformations_applied: applied,
        metadata,
    };
    (data, transformation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(value: Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_axis_projection() {
        let data = rows(json!([
            {"region": "EU", "sales": "12.5"},
            {"region": "US", "sales": 40}
        ]));
        let config = json!({"chart_type": "bar", "x_axis": "region", "y_axis": {"field": "sales"}});
        let (series, meta) = build_chart_data(&config, &data);
        assert_eq!(series["x"], json!(["EU", "US"]));
        assert_eq!(series["y"], json!([12.5, 40]));
        assert_eq!(meta.operation, CHART_DATA_OPERATION);
        assert_eq!(meta.input_shape, DataShape { rows: 2, columns: 2 });
        assert_eq!(meta.transformations_applied, vec!["axis_projection"]);
    }

    #[test]
    fn test_unknown_axes_fall_back() {
        let data = rows(json!([{"a": "x", "b": 1}]));
        let config = json!({"type": "line", "x_axis": "missing", "y_axis": "also_missing"});
        let (series, meta) = build_chart_data(&config, &data);
        assert_eq!(series["x_field"], "a");
        assert_eq!(series["y_field"], "b");
        assert!(meta.transformations_applied.contains(&"default_axes".to_string()));
    }

    #[test]
    fn test_kpi_value() {
        let data = rows(json!([{"label": "all", "total": 99}]));
        let (series, meta) = build_chart_data(&json!({"chart_type": "kpi"}), &data);
        assert_eq!(series["field"], "total");
        assert_eq!(series["value"], json!(99));
        assert_eq!(meta.output_shape, DataShape { rows: 1, columns: 1 });
    }
}
