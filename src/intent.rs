//! Query intent - Signals that steer chart and insight generation
//!
//! Normally inferred upstream and passed in through `AgentContext`. When the
//! caller has none, a keyword pass over the question fills in.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref TIME_SERIES: Regex = Regex::new(
        r"(?i)\b(over time|trends?|time series|timeline|monthly|weekly|daily|yearly|annually|quarterly|(?:per|by|each) (?:day|week|month|quarter|year))\b"
    )
    .expect("time series pattern");
    static ref AGGREGATION: Regex = Regex::new(
        r"(?i)\b(total|sum|average|avg|mean|count|number of|how many|how much|maximum|minimum|max|min|median)\b"
    )
    .expect("aggregation pattern");
    static ref GROUPING: Regex =
        Regex::new(r"(?i)\b(by|per|each|breakdown|broken down|split|grouped|across|distribution)\b")
            .expect("grouping pattern");
    static ref CHART_TYPE: Regex =
        Regex::new(r"(?i)\b(pie|donut|bar|line|scatter|area|histogram|gauge)\s+(?:chart|graph|plot)\b")
            .expect("chart type pattern");
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryIntent {
    /// Chart type named or implied by the question
    #[serde(default)]
    pub suggested_chart_type: Option<String>,

    /// Question asks for a single headline number
    #[serde(default)]
    pub is_kpi: bool,

    #[serde(default)]
    pub is_time_series: bool,

    #[serde(default)]
    pub has_aggregation: bool,

    #[serde(default)]
    pub has_grouping: bool,
}

impl QueryIntent {
    /// Keyword-based inference from the natural-language question
    pub fn infer(query: &str) -> Self {
        let is_time_series = TIME_SERIES.is_match(query);
        let has_aggregation = AGGREGATION.is_match(query);
        let has_grouping = GROUPING.is_match(query);
        let suggested_chart_type = CHART_TYPE
            .captures(query)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase());

        Self {
            is_kpi: has_aggregation && !has_grouping && !is_time_series,
            suggested_chart_type,
            is_time_series,
            has_aggregation,
            has_grouping,
        }
    }

    pub fn signals_grouped_aggregation(&self) -> bool {
        self.has_aggregation && self.has_grouping
    }
}
