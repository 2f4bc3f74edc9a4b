use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// OpenRouter model id used by each stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageModels {
    pub symptom_intake: String,
    pub vision: String,
    pub medical: String,
    pub triage: String,
    pub careplan: String,
    pub reviewer: String,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            symptom_intake: "google/gemini-2.0-flash-001".to_string(),
            vision: "openai/gpt-4o".to_string(),
            medical: "openai/gpt-4o-mini".to_string(),
            triage: "openai/gpt-4o-mini".to_string(),
            careplan: "google/gemini-2.0-flash-001".to_string(),
            reviewer: "anthropic/claude-sonnet-4".to_string(),
        }
    }
}

/// Configuration for the triage service, read once at start-up.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub openrouter_api_key: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub report_dir: Option<PathBuf>,
    pub llm_timeout: Duration,
    pub models: StageModels,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let openrouter_api_key =
            get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let port = match get("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let timeout_secs = match get("LLM_TIMEOUT_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LLM_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };

        let defaults = StageModels::default();
        let model = |key: &str, default: String| get(key).unwrap_or(default);
        let models = StageModels {
            symptom_intake: model("MODEL_SYMPTOM_INTAKE", defaults.symptom_intake),
            vision: model("MODEL_VISION", defaults.vision),
            medical: model("MODEL_MEDICAL", defaults.medical),
            triage: model("MODEL_TRIAGE", defaults.triage),
            careplan: model("MODEL_CAREPLAN", defaults.careplan),
            reviewer: model("MODEL_REVIEWER", defaults.reviewer),
        };

        Ok(Self {
            openrouter_api_key,
            port,
            database_url: get("DATABASE_URL"),
            report_dir: get("REPORT_DIR").map(PathBuf::from),
            llm_timeout: Duration::from_secs(timeout_secs),
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = ServiceConfig::from_lookup(lookup(&[("OPENROUTER_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.openrouter_api_key, "sk-test");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.llm_timeout, Duration::from_secs(60));
        assert_eq!(config.database_url, None);
        assert_eq!(config.report_dir, None);
        assert_eq!(config.models, StageModels::default());
    }

    #[test]
    fn api_key_is_required() {
        let err = ServiceConfig::from_lookup(lookup(&[("OPENROUTER_API_KEY", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENROUTER_API_KEY"));
    }

    #[test]
    fn overrides_are_read() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("PORT", "9100"),
            ("LLM_TIMEOUT_SECS", "15"),
            ("REPORT_DIR", "/tmp/reports"),
            ("MODEL_REVIEWER", "openai/gpt-4o"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.llm_timeout, Duration::from_secs(15));
        assert_eq!(config.report_dir, Some(PathBuf::from("/tmp/reports")));
        assert_eq!(config.models.reviewer, "openai/gpt-4o");
        assert_eq!(config.models.triage, StageModels::default().triage);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = ServiceConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LLM_TIMEOUT_SECS", .. }));
    }
}
