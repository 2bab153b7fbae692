use crate::errors::{CompletionError, CompletionResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_GENERATE_MAX_TOKENS: u32 = 150;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the completion API
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
    /// Output budget for analysis and chat calls
    pub max_tokens: Option<u32>,
    /// Output budget for the free-text generate endpoint
    pub generate_max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl CompletionConfig {
    pub fn model_name(&self) -> &str {
        self.model_name.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn generate_max_tokens(&self) -> u32 {
        self.generate_max_tokens.unwrap_or(DEFAULT_GENERATE_MAX_TOKENS)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Merges this config with another config, preferring values from the other config if present
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            api_key: other.api_key.clone().or_else(|| self.api_key.clone()),
            model_name: other.model_name.clone().or_else(|| self.model_name.clone()),
            base_url: other.base_url.clone().or_else(|| self.base_url.clone()),
            max_tokens: other.max_tokens.or(self.max_tokens),
            generate_max_tokens: other.generate_max_tokens.or(self.generate_max_tokens),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
        }
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> CompletionResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        CompletionError::ConfigError("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> CompletionResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let config = CompletionConfig::default();
        assert_eq!(config.model_name(), "gpt-4o-mini");
        assert_eq!(config.base_url(), "https://api.openai.com");
        assert_eq!(config.max_tokens(), 500);
        assert_eq!(config.generate_max_tokens(), 150);
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = CompletionConfig {
            api_key: Some("file-key".to_string()),
            model_name: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        let env = CompletionConfig {
            api_key: Some("env-key".to_string()),
            ..Default::default()
        };

        let merged = base.merge(&env);
        assert_eq!(merged.api_key.as_deref(), Some("env-key"));
        assert_eq!(merged.model_name(), "gpt-4o");
    }

    #[test]
    fn test_empty_base_url_falls_back() {
        let config = CompletionConfig {
            base_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_parse_from_toml() {
        let config: CompletionConfig = toml::from_str(
            r#"
            model_name = "gpt-4o"
            max_tokens = 800
            "#,
        )
        .unwrap();
        assert_eq!(config.model_name(), "gpt-4o");
        assert_eq!(config.max_tokens(), 800);
        assert!(config.api_key.is_none());
    }
}
