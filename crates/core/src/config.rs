use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::call::DEFAULT_MAX_NEGOTIATION_ATTEMPTS;
use crate::policy::DEFAULT_CLARIFICATION_THRESHOLD;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub call: CallConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CallConfig {
    pub max_negotiation_attempts: u32,
    pub clarification_threshold: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    /// Hard deadline for one classify/extract call. The conversation never
    /// stalls on a slow model; past this the rule fallback is used.
    pub timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// Terminal call states older than this are eligible for eviction; the
    /// durable record lives downstream.
    pub state_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            call: CallConfig {
                max_negotiation_attempts: DEFAULT_MAX_NEGOTIATION_ATTEMPTS,
                clarification_threshold: DEFAULT_CLARIFICATION_THRESHOLD,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_ms: 1_500,
                max_retries: 1,
            },
            store: StoreConfig {
                url: "sqlite://partline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                state_ttl_secs: 86_400,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_timeout_ms: Option<u64>,
    pub max_negotiation_attempts: Option<u32>,
    pub clarification_threshold: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    call: Option<RawCallConfig>,
    llm: Option<RawLlmConfig>,
    store: Option<RawStoreConfig>,
    logging: Option<RawLoggingConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCallConfig {
    max_negotiation_attempts: Option<u32>,
    clarification_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLlmConfig {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStoreConfig {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    state_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLoggingConfig {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = options
            .config_path
            .or_else(|| env::var("PARTLINE_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("partline.toml"));

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
            let raw: RawConfig = toml::from_str(&contents)
                .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
            config.apply_raw(raw);
        } else if options.require_file {
            return Err(ConfigError::MissingConfigFile(path));
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_raw(&mut self, raw: RawConfig) {
        if let Some(call) = raw.call {
            if let Some(value) = call.max_negotiation_attempts {
                self.call.max_negotiation_attempts = value;
            }
            if let Some(value) = call.clarification_threshold {
                self.call.clarification_threshold = value;
            }
        }
        if let Some(llm) = raw.llm {
            if let Some(value) = llm.provider {
                self.llm.provider = value;
            }
            if let Some(value) = llm.api_key {
                self.llm.api_key = Some(value.into());
            }
            if let Some(value) = llm.base_url {
                self.llm.base_url = Some(value);
            }
            if let Some(value) = llm.model {
                self.llm.model = value;
            }
            if let Some(value) = llm.timeout_ms {
                self.llm.timeout_ms = value;
            }
            if let Some(value) = llm.max_retries {
                self.llm.max_retries = value;
            }
        }
        if let Some(store) = raw.store {
            if let Some(value) = store.url {
                self.store.url = value;
            }
            if let Some(value) = store.max_connections {
                self.store.max_connections = value;
            }
            if let Some(value) = store.timeout_secs {
                self.store.timeout_secs = value;
            }
            if let Some(value) = store.state_ttl_secs {
                self.store.state_ttl_secs = value;
            }
        }
        if let Some(logging) = raw.logging {
            if let Some(value) = logging.level {
                self.logging.level = value;
            }
            if let Some(value) = logging.format {
                self.logging.format = value;
            }
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("PARTLINE_STORE_URL") {
            self.store.url = value;
        }
        if let Ok(value) = env::var("PARTLINE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Ok(value) = env::var("PARTLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Ok(value) = env::var("PARTLINE_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Ok(value) = env::var("PARTLINE_LLM_TIMEOUT_MS") {
            self.llm.timeout_ms = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "PARTLINE_LLM_TIMEOUT_MS".to_string(),
                value,
            })?;
        }
        if let Ok(value) = env::var("PARTLINE_LLM_PROVIDER") {
            self.llm.provider = match value.as_str() {
                "open_ai" | "openai" => LlmProvider::OpenAi,
                "anthropic" => LlmProvider::Anthropic,
                "ollama" => LlmProvider::Ollama,
                _ => {
                    return Err(ConfigError::InvalidEnvOverride {
                        key: "PARTLINE_LLM_PROVIDER".to_string(),
                        value,
                    })
                }
            };
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(value) = overrides.store_url {
            self.store.url = value;
        }
        if let Some(value) = overrides.log_level {
            self.logging.level = value;
        }
        if let Some(value) = overrides.llm_provider {
            self.llm.provider = value;
        }
        if let Some(value) = overrides.llm_model {
            self.llm.model = value;
        }
        if let Some(value) = overrides.llm_api_key {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = overrides.llm_timeout_ms {
            self.llm.timeout_ms = value;
        }
        if let Some(value) = overrides.max_negotiation_attempts {
            self.call.max_negotiation_attempts = value;
        }
        if let Some(value) = overrides.clarification_threshold {
            self.call.clarification_threshold = value;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.call.max_negotiation_attempts == 0 {
            return Err(ConfigError::Validation(
                "call.max_negotiation_attempts must be at least 1".to_string(),
            ));
        }
        if self.call.clarification_threshold == 0 {
            return Err(ConfigError::Validation(
                "call.clarification_threshold must be at least 1".to_string(),
            ));
        }
        if self.llm.timeout_ms == 0 {
            return Err(ConfigError::Validation("llm.timeout_ms must be non-zero".to_string()));
        }
        if self.store.url.is_empty() {
            return Err(ConfigError::Validation("store.url must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions};

    #[test]
    fn defaults_match_the_documented_call_policy() {
        let config = AppConfig::default();
        assert_eq!(config.call.max_negotiation_attempts, 2);
        assert_eq!(config.call.clarification_threshold, 3);
        assert_eq!(config.llm.timeout_ms, 1_500);
    }

    #[test]
    fn toml_file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[call]
max_negotiation_attempts = 3

[llm]
provider = "anthropic"
model = "claude-sonnet"
timeout_ms = 900

[store]
url = "sqlite://calls.db"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("config loads");

        assert_eq!(config.call.max_negotiation_attempts, 3);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.model, "claude-sonnet");
        assert_eq!(config.llm.timeout_ms, 900);
        assert_eq!(config.store.url, "sqlite://calls.db");
        // untouched sections keep defaults
        assert_eq!(config.call.clarification_threshold, 3);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/partline.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect_err("file is required");
        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn explicit_overrides_win_over_defaults() {
        let config = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/partline.toml".into()),
            require_file: false,
            overrides: ConfigOverrides {
                max_negotiation_attempts: Some(4),
                llm_timeout_ms: Some(2_000),
                store_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
        })
        .expect("config loads");

        assert_eq!(config.call.max_negotiation_attempts, 4);
        assert_eq!(config.llm.timeout_ms, 2_000);
        assert_eq!(config.store.url, "sqlite::memory:");
    }

    #[test]
    fn zero_attempt_budget_fails_validation() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/partline.toml".into()),
            require_file: false,
            overrides: ConfigOverrides {
                max_negotiation_attempts: Some(0),
                ..ConfigOverrides::default()
            },
        })
        .expect_err("zero attempts rejected");
        assert!(matches!(error, ConfigError::Validation(_)));
    }
}
