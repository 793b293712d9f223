//! Prompt templates for chart, insight and narration generation
//!
//! Every generation prompt embeds the same data context (question, SQL,
//! column kinds, sample rows) followed by the response schema for its
//! purpose.

use super::heuristics::{classify_columns, ColumnKind};
use super::selector::GenerationRequest;
use itertools::Itertools;
use serde_json::Value;

pub const SYSTEM_CONTEXT: &str = "You are a senior data analyst. You receive the result of a SQL \
query and answer with a single JSON object that follows the requested schema exactly. \
Do not wrap the JSON in prose.";

pub const NARRATION_SYSTEM_CONTEXT: &str = "You are a senior data analyst writing for business \
stakeholders. Answer in plain prose, without JSON or markdown.";

/// Fixed response schema for the single-call tier
pub const UNIFIED_SCHEMA: &str = r#"{
  "chart_config": {
    "chart_type": "bar | line | pie | scatter | area | kpi | table",
    "title": "short chart title",
    "x_axis": "<column name>",
    "y_axis": "<column name>"
  },
  "insights": [
    {"type": "trend | comparison | anomaly | distribution | summary", "title": "...", "description": "...", "confidence": 0.0, "impact": "low | medium | high"}
  ],
  "recommendations": [
    {"type": "...", "title": "...", "description": "...", "priority": "low | medium | high", "impact": "low | medium | high"}
  ],
  "executive_summary": "two or three sentences answering the question"
}"#;

pub const CHART_SCHEMA: &str = r#"{
  "chart_config": {
    "chart_type": "bar | line | pie | scatter | area | kpi | table",
    "title": "short chart title",
    "x_axis": "<column name>",
    "y_axis": "<column name>"
  }
}"#;

pub const INSIGHTS_SCHEMA: &str = r#"{
  "insights": [
    {"type": "trend | comparison | anomaly | distribution | summary", "title": "...", "description": "...", "confidence": 0.0, "impact": "low | medium | high"}
  ],
  "recommendations": [
    {"type": "...", "title": "...", "description": "...", "priority": "low | medium | high", "impact": "low | medium | high"}
  ],
  "executive_summary": "two or three sentences answering the question"
}"#;

fn kind_label(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Date => "date",
        ColumnKind::Numeric => "numeric",
        ColumnKind::Categorical => "categorical",
    }
}

/// Question, SQL, column kinds, intent hints and the first `sample_rows` rows
pub fn data_context(request: &GenerationRequest<'_>, sample_rows: usize) -> String {
    let columns = classify_columns(request.columns, request.rows)
        .into_iter()
        .map(|c| format!("{} ({})", c.name, kind_label(c.kind)))
        .join(", ");

    let intent = request.intent;
    let mut hints = Vec::new();
    if intent.is_time_series {
        hints.push("time series".to_string());
    }
    if intent.is_kpi {
        hints.push("single headline number".to_string());
    }
    if intent.signals_grouped_aggregation() {
        hints.push("grouped aggregation".to_string());
    }
    if let Some(chart) = &intent.suggested_chart_type {
        hints.push(format!("user asked for a {} chart", chart));
    }

    let sample: Vec<&crate::execution::Row> = request.rows.iter().take(sample_rows).collect();
    let sample_json = serde_json::to_string_pretty(&sample).unwrap_or_else(|_| "[]".to_string());

    let mut context = format!(
        "Question: {}\nSQL: {}\nRows returned: {}\nColumns: {}\n",
        request.query,
        request.sql,
        request.rows.len(),
        columns
    );
    if !hints.is_empty() {
        context.push_str(&format!("Intent: {}\n", hints.join(", ")));
    }
    context.push_str(&format!(
        "Sample rows (first {}):\n{}\n",
        sample.len(),
        sample_json
    ));
    context
}

pub fn unified_prompt(request: &GenerationRequest<'_>, sample_rows: usize) -> String {
    format!(
        "{}\nProduce a chart configuration, insights, recommendations and an executive summary \
for this result. Use only column names listed above for the chart axes.\n\
Respond with JSON matching this schema:\n{}",
        data_context(request, sample_rows),
        UNIFIED_SCHEMA
    )
}

pub fn chart_prompt(request: &GenerationRequest<'_>, sample_rows: usize) -> String {
    format!(
        "{}\nChoose the single chart that best answers the question. Use only column names \
listed above for the axes.\nRespond with JSON matching this schema:\n{}",
        data_context(request, sample_rows),
        CHART_SCHEMA
    )
}

pub fn insights_prompt(request: &GenerationRequest<'_>, sample_rows: usize) -> String {
    format!(
        "{}\nList the most important insights and concrete recommendations for this result.\n\
Respond with JSON matching this schema:\n{}",
        data_context(request, sample_rows),
        INSIGHTS_SCHEMA
    )
}

fn bullet_lines(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
            let description = item.get("description").and_then(Value::as_str).unwrap_or_default();
            if title.is_empty() && description.is_empty() {
                None
            } else {
                Some(format!("- {}: {}", title, description))
            }
        })
        .join("\n")
}

pub fn narration_prompt(
    query: &str,
    row_count: usize,
    insights: &[Value],
    recommendations: &[Value],
) -> String {
    format!(
        "Question: {}\nRows analysed: {}\n\nInsights:\n{}\n\nRecommendations:\n{}\n\n\
Write a short narrative (two to four sentences) that answers the question using these \
findings.",
        query,
        row_count,
        bullet_lines(insights),
        bullet_lines(recommendations)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Row;
    use crate::intent::QueryIntent;
    use serde_json::json;

    #[test]
    fn test_context_lists_columns_and_limits_sample() {
        let rows: Vec<Row> = (0..30)
            .map(|i| json!({"region": format!("r{}", i), "sales": i}).as_object().cloned().unwrap())
            .collect();
        let columns = vec!["region".to_string(), "sales".to_string()];
        let intent = QueryIntent::infer("total sales by region");
        let request = GenerationRequest {
            query: "total sales by region",
            sql: "SELECT region, SUM(sales) FROM t GROUP BY region",
            rows: &rows,
            columns: &columns,
            intent: &intent,
        };
        let context = data_context(&request, 5);
        assert!(context.contains("Columns: region (categorical), sales (numeric)"));
        assert!(context.contains("Rows returned: 30"));
        assert!(context.contains("Sample rows (first 5)"));
        assert!(context.contains("grouped aggregation"));
        assert!(!context.contains("\"r5\""));
    }

    #[test]
    fn test_narration_prompt_skips_empty_items() {
        let prompt = narration_prompt(
            "q",
            3,
            &[json!({"title": "Up", "description": "Sales rose"}), json!({})],
            &[],
        );
        assert!(prompt.contains("- Up: Sales rose"));
        assert_eq!(prompt.matches("- ").count(), 1);
    }
}
