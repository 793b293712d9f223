//! Heuristic Generation - Deterministic charts and insights, no LLM
//!
//! Last fallback tier. Column kinds are inferred from names and values,
//! then fixed rules pick a chart and compute a handful of statistics.

use crate::execution::Row;
use crate::intent::QueryIntent;
use crate::normalizer::{Impact, Insight, Recommendation};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

lazy_static! {
    static ref DATE_COLUMN: Regex = Regex::new(
        r"(?i)(^|_)(date|datetime|time|timestamp|day|week|month|quarter|year|period)($|_)|_at$|^created|^updated"
    )
    .expect("date column pattern");

    /// Names whose last segment is a calendar unit, e.g. `order_year` or `created_at`
    static ref CALENDAR_SUFFIX: Regex = Regex::new(
        r"(?i)(^|_)(date|datetime|timestamp|day|week|month|quarter|year|period|at)$"
    )
    .expect("calendar suffix pattern");
}

/// Variability threshold as a fraction of the mean of category averages
const VARIABILITY_RATIO: f64 = 0.3;

/// A maximum this many times the average is reported as an outlier
const OUTLIER_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Date,
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

/// Classify columns in order. Numeric means every non-null value is a
/// number or a numeric string. Numeric values win over a date-like name
/// unless the name ends in a calendar unit (`order_year`, `created_at`).
/// Date names are matched on `_`-separated segments, so `lifetime_value`
/// stays a measure.
pub fn classify_columns(columns: &[String], rows: &[Row]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|name| {
            let kind = if is_numeric_column(name, rows) {
                if CALENDAR_SUFFIX.is_match(name) {
                    ColumnKind::Date
                } else {
                    ColumnKind::Numeric
                }
            } else if DATE_COLUMN.is_match(name) {
                ColumnKind::Date
            } else {
                ColumnKind::Categorical
            };
            ColumnInfo {
                name: name.clone(),
                kind,
            }
        })
        .collect()
}

fn is_numeric_column(name: &str, rows: &[Row]) -> bool {
    let mut seen = false;
    for value in rows.iter().filter_map(|row| row.get(name)) {
        if value.is_null() {
            continue;
        }
        if as_number(value).is_none() {
            return false;
        }
        seen = true;
    }
    seen
}

/// Numbers and numeric strings as f64
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn first_of(info: &[ColumnInfo], kind: ColumnKind) -> Option<&str> {
    info.iter().find(|c| c.kind == kind).map(|c| c.name.as_str())
}

fn count_of(info: &[ColumnInfo], kind: ColumnKind) -> usize {
    info.iter().filter(|c| c.kind == kind).count()
}

fn humanize(column: &str) -> String {
    let spaced = column.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn series(rows: &[Row], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Numeric series: numbers kept as-is, numeric strings converted
fn numeric_series(rows: &[Row], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| match row.get(column) {
            Some(Value::Number(n)) => Value::Number(n.clone()),
            Some(other) => as_number(other).map(|v| json!(v)).unwrap_or(Value::Null),
            None => Value::Null,
        })
        .collect()
}

fn axis_chart(chart_type: &str, rows: &[Row], x: &str, y: &str, info: &[ColumnInfo]) -> Value {
    let y_is_numeric = info.iter().any(|c| c.name == y && c.kind == ColumnKind::Numeric);
    let y_values = if y_is_numeric {
        numeric_series(rows, y)
    } else {
        series(rows, y)
    };
    json!({
        "chart_type": chart_type,
        "title": format!("{} by {}", humanize(y), humanize(x)),
        "x_axis": x,
        "y_axis": y,
        "data": {
            "x": series(rows, x),
            "y": y_values,
        },
    })
}

/// Pick a chart from the result shape and the query intent
///
/// 1. One row with one numeric column: KPI gauge
/// 2. A date-like column or a time-series intent: line over the first date column
/// 3. Grouped aggregation intent, or exactly one categorical + one numeric column: bar
/// 4. Anything else: bar over the first two columns
pub fn heuristic_chart(rows: &[Row], columns: &[String], intent: &QueryIntent) -> Value {
    let info = classify_columns(columns, rows);
    let numeric = count_of(&info, ColumnKind::Numeric);
    let categorical = count_of(&info, ColumnKind::Categorical);

    if rows.len() == 1 && numeric == 1 {
        if let Some(field) = first_of(&info, ColumnKind::Numeric) {
            let value = rows[0].get(field).cloned().unwrap_or(Value::Null);
            return json!({
                "chart_type": "kpi",
                "display": "gauge",
                "title": humanize(field),
                "value_field": field,
                "value": value,
                "data": { "value": value },
            });
        }
    }

    let date_column = first_of(&info, ColumnKind::Date);
    if date_column.is_some() || intent.is_time_series {
        if let Some(x) = date_column.or_else(|| columns.first().map(String::as_str)) {
            let y = info
                .iter()
                .find(|c| c.kind == ColumnKind::Numeric && c.name != x)
                .or_else(|| info.iter().find(|c| c.name != x))
                .map(|c| c.name.as_str())
                .unwrap_or(x);
            return axis_chart("line", rows, x, y, &info);
        }
    }

    let simple_pair = categorical == 1 && numeric == 1;
    if intent.signals_grouped_aggregation() || simple_pair {
        if let (Some(x), Some(y)) = (
            first_of(&info, ColumnKind::Categorical),
            first_of(&info, ColumnKind::Numeric),
        ) {
            return axis_chart("bar", rows, x, y, &info);
        }
    }

    match columns {
        [] => json!({ "chart_type": "table", "title": "Query result", "data": { "x": [], "y": [] } }),
        [only] => axis_chart("bar", rows, only, only, &info),
        [x, y, ..] => axis_chart("bar", rows, x, y, &info),
    }
}

/// Insights and recommendations computed from the rows
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicInsights {
    pub insights: Vec<Value>,
    pub recommendations: Vec<Value>,
}

/// Rule-based insights. Always yields at least one insight and one
/// recommendation.
pub fn heuristic_insights(rows: &[Row], columns: &[String]) -> HeuristicInsights {
    let info = classify_columns(columns, rows);
    let categorical = first_of(&info, ColumnKind::Categorical);
    let numeric = first_of(&info, ColumnKind::Numeric);

    let (insights, recommendations) = match (categorical, numeric) {
        (Some(category), Some(measure)) => category_insights(rows, category, measure),
        (None, Some(measure)) => measure_insights(rows, measure),
        _ => overview_insights(rows.len(), columns.len()),
    };

    HeuristicInsights {
        insights: insights.into_iter().map(Value::from).collect(),
        recommendations: recommendations.into_iter().map(Value::from).collect(),
    }
}

fn category_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "(none)".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Per-category averages in first-seen order
fn category_averages(rows: &[Row], category: &str, measure: &str) -> Vec<(String, f64)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut totals: Vec<(String, f64, usize)> = Vec::new();

    for row in rows {
        let Some(value) = row.get(measure).and_then(as_number) else {
            continue;
        };
        let key = category_key(row.get(category));
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            totals.push((key, 0.0, 0));
            totals.len() - 1
        });
        totals[slot].1 += value;
        totals[slot].2 += 1;
    }

    totals
        .into_iter()
        .map(|(key, sum, count)| (key, sum / count as f64))
        .collect()
}

fn population_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn category_insights(
    rows: &[Row],
    category: &str,
    measure: &str,
) -> (Vec<Insight>, Vec<Recommendation>) {
    let averages = category_averages(rows, category, measure);
    if averages.is_empty() {
        return overview_insights(rows.len(), 2);
    }

    let measure_name = humanize(measure).to_lowercase();
    let category_name = humanize(category).to_lowercase();

    // First-seen order breaks ties
    let mut highest = &averages[0];
    let mut lowest = &averages[0];
    for entry in &averages[1..] {
        if entry.1 > highest.1 {
            highest = entry;
        }
        if entry.1 < lowest.1 {
            lowest = entry;
        }
    }

    let mut insights = vec![Insight::new(
        "comparison",
        format!("Highest {}: {}", measure_name, highest.0),
        format!(
            "{} has the highest average {} ({:.2}) across {} {} values.",
            highest.0,
            measure_name,
            highest.1,
            averages.len(),
            category_name
        ),
        0.9,
        Impact::High,
    )];
    if averages.len() > 1 {
        insights.push(Insight::new(
            "comparison",
            format!("Lowest {}: {}", measure_name, lowest.0),
            format!(
                "{} has the lowest average {} ({:.2}).",
                lowest.0, measure_name, lowest.1
            ),
            0.9,
            Impact::Medium,
        ));
    }

    let values: Vec<f64> = averages.iter().map(|(_, avg)| *avg).collect();
    let (mean, stddev) = population_stddev(&values);
    let high_variability = stddev > VARIABILITY_RATIO * mean;

    let recommendations = if high_variability {
        insights.push(Insight::new(
            "variability",
            format!("High variability across {}", category_name),
            format!(
                "Standard deviation of average {} ({:.2}) exceeds 30% of the mean ({:.2}).",
                measure_name, stddev, mean
            ),
            0.8,
            Impact::High,
        ));
        vec![Recommendation::new(
            "investigation",
            format!("Investigate {} differences", category_name),
            format!(
                "Look into why {} trails {} on {}.",
                lowest.0, highest.0, measure_name
            ),
            Impact::High,
            Impact::High,
        )]
    } else {
        insights.push(Insight::new(
            "distribution",
            format!("Consistent {} across {}", measure_name, category_name),
            format!(
                "Average {} stays within 30% of the mean ({:.2}) for every {}.",
                measure_name, mean, category_name
            ),
            0.7,
            Impact::Low,
        ));
        vec![Recommendation::new(
            "monitoring",
            format!("Monitor {} by {}", measure_name, category_name),
            format!(
                "Track {} per {} to catch changes early.",
                measure_name, category_name
            ),
            Impact::Medium,
            Impact::Medium,
        )]
    };

    (insights, recommendations)
}

fn measure_insights(rows: &[Row], measure: &str) -> (Vec<Insight>, Vec<Recommendation>) {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(measure).and_then(as_number))
        .collect();
    if values.is_empty() {
        return overview_insights(rows.len(), 1);
    }

    let measure_name = humanize(measure).to_lowercase();
    let average = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut insights = vec![Insight::new(
        "summary",
        format!("Average {}", measure_name),
        format!(
            "Average {} is {:.2} (min {:.2}, max {:.2}) across {} rows.",
            measure_name,
            average,
            min,
            max,
            values.len()
        ),
        0.9,
        Impact::Medium,
    )];

    let recommendation = if max > OUTLIER_RATIO * average {
        insights.push(Insight::new(
            "outlier",
            format!("Possible outlier in {}", measure_name),
            format!(
                "The maximum {} ({:.2}) is more than 1.5x the average ({:.2}).",
                measure_name, max, average
            ),
            0.75,
            Impact::High,
        ));
        Recommendation::new(
            "investigation",
            format!("Review the largest {} values", measure_name),
            "Check whether the top values are genuine or data-quality issues.".to_string(),
            Impact::High,
            Impact::Medium,
        )
    } else {
        Recommendation::new(
            "monitoring",
            format!("Track {} over time", measure_name),
            format!("Compare {} against previous periods to spot trends.", measure_name),
            Impact::Medium,
            Impact::Medium,
        )
    };

    (insights, vec![recommendation])
}

fn overview_insights(rows: usize, columns: usize) -> (Vec<Insight>, Vec<Recommendation>) {
    (
        vec![Insight::new(
            "summary",
            "Result overview".to_string(),
            format!("The query returned {} rows across {} columns.", rows, columns),
            0.7,
            Impact::Low,
        )],
        vec![Recommendation::new(
            "refinement",
            "Add a measure".to_string(),
            "Ask for a count, total or average to enable quantitative analysis.".to_string(),
            Impact::Low,
            Impact::Low,
        )],
    )
}
