//! Pipeline configuration
//!
//! Defaults cover production use. `from_env` reads `INSIGHTS_*` overrides,
//! including `INSIGHTS_<PURPOSE>_MAX_TOKENS` and `INSIGHTS_<PURPOSE>_TEMPERATURE`
//! for each LLM purpose. `from_json_file` loads a full or partial config file.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompletionSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Schema cache TTL in seconds (24h)
    pub schema_cache_ttl_secs: u64,

    /// Query-result cache TTL in seconds (30 min)
    pub query_cache_ttl_secs: u64,

    /// Rows included in generation prompts
    pub prompt_sample_rows: usize,

    /// Row limit passed to the executor (None = engine default)
    pub max_result_rows: Option<usize>,

    pub unified: CompletionSettings,
    pub chart: CompletionSettings,
    pub insights: CompletionSettings,
    pub narration: CompletionSettings,

    /// An executive summary longer than this is reused as the narration
    pub narration_reuse_min_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_cache_ttl_secs: 24 * 60 * 60,
            query_cache_ttl_secs: 30 * 60,
            prompt_sample_rows: 20,
            max_result_rows: Some(10_000),
            unified: CompletionSettings {
                max_tokens: 2000,
                temperature: 0.3,
            },
            chart: CompletionSettings {
                max_tokens: 800,
                temperature: 0.2,
            },
            insights: CompletionSettings {
                max_tokens: 1500,
                temperature: 0.4,
            },
            narration: CompletionSettings {
                max_tokens: 400,
                temperature: 0.5,
            },
            narration_reuse_min_chars: 50,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by any `INSIGHTS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parse("INSIGHTS_SCHEMA_CACHE_TTL_SECS")? {
            config.schema_cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("INSIGHTS_QUERY_CACHE_TTL_SECS")? {
            config.query_cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("INSIGHTS_PROMPT_SAMPLE_ROWS")? {
            config.prompt_sample_rows = v;
        }
        if let Some(v) = env_parse::<usize>("INSIGHTS_MAX_RESULT_ROWS")? {
            config.max_result_rows = if v == 0 { None } else { Some(v) };
        }
        for (purpose, settings) in [
            ("UNIFIED", &mut config.unified),
            ("CHART", &mut config.chart),
            ("INSIGHTS", &mut config.insights),
            ("NARRATION", &mut config.narration),
        ] {
            if let Some(v) = env_parse(&format!("INSIGHTS_{}_MAX_TOKENS", purpose))? {
                settings.max_tokens = v;
            }
            if let Some(v) = env_parse(&format!("INSIGHTS_{}_TEMPERATURE", purpose))? {
                settings.temperature = v;
            }
        }
        if let Some(v) = env_parse("INSIGHTS_NARRATION_REUSE_MIN_CHARS")? {
            config.narration_reuse_min_chars = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt_sample_rows == 0 {
            return Err(PipelineError::Config(
                "prompt_sample_rows must be at least 1".to_string(),
            ));
        }
        for (name, settings) in [
            ("unified", &self.unified),
            ("chart", &self.chart),
            ("insights", &self.insights),
            ("narration", &self.narration),
        ] {
            if settings.max_tokens == 0 {
                return Err(PipelineError::Config(format!("{}.max_tokens must be positive", name)));
            }
            if !(0.0..=2.0).contains(&settings.temperature) {
                return Err(PipelineError::Config(format!(
                    "{}.temperature must be within 0.0..=2.0",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_secs)
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_secs)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PipelineError::Config(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.schema_cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.query_cache_ttl(), Duration::from_secs(1_800));
        assert_eq!(config.narration_reuse_min_chars, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"query_cache_ttl_secs": 60}"#).unwrap();
        assert_eq!(config.query_cache_ttl_secs, 60);
        assert_eq!(config.prompt_sample_rows, 20);
    }

    #[test]
    fn test_env_override_and_rejection() {
        std::env::set_var("INSIGHTS_QUERY_CACHE_TTL_SECS", "120");
        assert_eq!(PipelineConfig::from_env().unwrap().query_cache_ttl_secs, 120);

        std::env::set_var("INSIGHTS_QUERY_CACHE_TTL_SECS", "soon");
        assert!(matches!(PipelineConfig::from_env(), Err(PipelineError::Config(_))));
        std::env::remove_var("INSIGHTS_QUERY_CACHE_TTL_SECS");

        std::env::set_var("INSIGHTS_CHART_MAX_TOKENS", "600");
        std::env::set_var("INSIGHTS_INSIGHTS_TEMPERATURE", "0.1");
        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.chart.max_tokens, 600);
        assert_eq!(config.insights.temperature, 0.1);
        assert_eq!(config.unified, PipelineConfig::default().unified);

        std::env::set_var("INSIGHTS_INSIGHTS_TEMPERATURE", "9");
        assert!(matches!(PipelineConfig::from_env(), Err(PipelineError::Config(_))));
        std::env::remove_var("INSIGHTS_CHART_MAX_TOKENS");
        std::env::remove_var("INSIGHTS_INSIGHTS_TEMPERATURE");
    }

    #[test]
    fn test_invalid_temperature() {
        let mut config = PipelineConfig::default();
        config.narration.temperature = 3.5;
        assert!(config.validate().is_err());
    }
}
