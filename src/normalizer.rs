//! Result Normalizer
//!
//! LLM output lists insights and recommendations either as bare strings or
//! as objects. Everything leaving the crate goes through here once so the
//! rest of the pipeline can rely on the object shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Confidence given to an insight that arrived as a bare string
pub const DEFAULT_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_IMPACT: &str = "medium";
pub const DEFAULT_PRIORITY: &str = "medium";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// Insight built by the crate itself (heuristics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub insight_type: String,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub impact: Impact,
}

/// Recommendation built by the crate itself (heuristics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub recommendation_type: String,
    pub title: String,
    pub description: String,
    pub priority: Impact,
    pub impact: Impact,
}

impl Insight {
    pub fn new(
        insight_type: &str,
        title: String,
        description: String,
        confidence: f64,
        impact: Impact,
    ) -> Self {
        Self {
            insight_type: insight_type.to_string(),
            title,
            description,
            confidence,
            impact,
        }
    }
}

impl Recommendation {
    pub fn new(
        recommendation_type: &str,
        title: String,
        description: String,
        priority: Impact,
        impact: Impact,
    ) -> Self {
        Self {
            recommendation_type: recommendation_type.to_string(),
            title,
            description,
            priority,
            impact,
        }
    }
}

impl From<Insight> for Value {
    fn from(insight: Insight) -> Self {
        json!({
            "type": insight.insight_type,
            "title": insight.title,
            "description": insight.description,
            "confidence": insight.confidence,
            "impact": insight.impact,
        })
    }
}

impl From<Recommendation> for Value {
    fn from(recommendation: Recommendation) -> Self {
        json!({
            "type": recommendation.recommendation_type,
            "title": recommendation.title,
            "description": recommendation.description,
            "priority": recommendation.priority,
            "impact": recommendation.impact,
        })
    }
}

pub fn normalize_insights(items: &Value) -> Vec<Value> {
    normalize_with(items, |index, text| {
        json!({
            "type": "general",
            "title": format!("Insight {}", index),
            "description": text,
            "confidence": DEFAULT_CONFIDENCE,
            "impact": DEFAULT_IMPACT,
        })
    })
}

pub fn normalize_recommendations(items: &Value) -> Vec<Value> {
    normalize_with(items, |index, text| {
        json!({
            "type": "general",
            "title": format!("Recommendation {}", index),
            "description": text,
            "priority": DEFAULT_PRIORITY,
            "impact": DEFAULT_IMPACT,
        })
    })
}

/// Objects pass through untouched, strings are wrapped with their 1-based
/// position, everything else is dropped (but still consumes its position).
fn normalize_with<F>(items: &Value, wrap: F) -> Vec<Value>
where
    F: Fn(usize, &str) -> Value,
{
    let Some(list) = items.as_array() else {
        return Vec::new();
    };

    list.iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::Object(_) => Some(item.clone()),
            Value::String(text) => Some(wrap(i + 1, text)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_are_wrapped_with_defaults() {
        let items = json!(["Revenue grew 12%", "Churn is flat"]);
        let normalized = normalize_insights(&items);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0]["type"], "general");
        assert_eq!(normalized[0]["title"], "Insight 1");
        assert_eq!(normalized[0]["description"], "Revenue grew 12%");
        assert_eq!(normalized[0]["confidence"], 0.7);
        assert_eq!(normalized[0]["impact"], "medium");
        assert_eq!(normalized[1]["title"], "Insight 2");
    }

    #[test]
    fn test_recommendation_variant_uses_priority() {
        let normalized = normalize_recommendations(&json!(["Review pricing"]));
        assert_eq!(normalized[0]["title"], "Recommendation 1");
        assert_eq!(normalized[0]["priority"], "medium");
        assert!(normalized[0].get("confidence").is_none());
    }

    #[test]
    fn test_objects_pass_through_and_others_are_dropped() {
        let object = json!({"title": "Peak in March", "impact": "high"});
        let items = json!([object.clone(), 42, null, ["nested"], "Plain text"]);
        let normalized = normalize_insights(&items);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0], object);
        assert_eq!(normalized[1]["title"], "Insight 5");
    }

    #[test]
    fn test_non_list_input_is_empty() {
        assert!(normalize_insights(&json!("just a string")).is_empty());
        assert!(normalize_insights(&json!({"insights": []})).is_empty());
        assert!(normalize_recommendations(&Value::Null).is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = vec![
            json!(["a", {"b": 1}, 3, true, "c"]),
            json!([]),
            json!(null),
            json!({"not": "a list"}),
            json!([[1], {"title": "x"}]),
        ];
        for input in inputs {
            let once = normalize_insights(&input);
            let twice = normalize_insights(&Value::Array(once.clone()));
            assert_eq!(once, twice);

            let once = normalize_recommendations(&input);
            let twice = normalize_recommendations(&Value::Array(once.clone()));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_typed_insight_serializes_to_canonical_shape() {
        let value: Value = Insight {
            insight_type: "trend".to_string(),
            title: "Highest status".to_string(),
            description: "B leads".to_string(),
            confidence: 0.8,
            impact: Impact::High,
        }
        .into();
        assert_eq!(value["type"], "trend");
        assert_eq!(value["impact"], "high");
    }
}
