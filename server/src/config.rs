use chatlens_core::config::CompletionConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const APP_NAME: &str = "chatlens";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Credentials and location of the bucket raw uploads are copied to
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom S3-compatible endpoint; defaults to the regional AWS endpoint
    pub endpoint: Option<String>,
}

impl StorageConfig {
    /// Storage is enabled only when every required field is present
    pub fn is_complete(&self) -> bool {
        [
            &self.bucket,
            &self.region,
            &self.access_key_id,
            &self.secret_access_key,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            bucket: other.bucket.clone().or_else(|| self.bucket.clone()),
            region: other.region.clone().or_else(|| self.region.clone()),
            access_key_id: other
                .access_key_id
                .clone()
                .or_else(|| self.access_key_id.clone()),
            secret_access_key: other
                .secret_access_key
                .clone()
                .or_else(|| self.secret_access_key.clone()),
            endpoint: other.endpoint.clone().or_else(|| self.endpoint.clone()),
        }
    }
}

/// Configuration for the HTTP service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub uploads_dir: PathBuf,
    /// Maximum number of archive entries analyzed at once
    pub analysis_concurrency: usize,
    pub session_ttl_secs: u64,
    pub max_upload_bytes: usize,
    pub storage: StorageConfig,
    pub mailgun_signing_key: Option<String>,
    pub completion: CompletionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            uploads_dir: PathBuf::from("public/uploads"),
            analysis_concurrency: 4,
            session_ttl_secs: 3600,
            max_upload_bytes: 25 * 1024 * 1024,
            storage: StorageConfig::default(),
            mailgun_signing_key: None,
            completion: CompletionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `~/.config/chatlens/config.toml`, falling back to defaults
    pub fn load_from_default() -> Result<Self, ConfigError> {
        match chatlens_core::config::get_default_config_file(APP_NAME) {
            Ok(path) => Self::load_from_file(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Overlays values from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| env::var(name).ok())
    }

    /// Overlays values from `lookup`; empty values are treated as unset
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let completion_env = CompletionConfig {
            api_key: get("OPENAI_API_KEY"),
            model_name: get("OPENAI_MODEL"),
            base_url: get("OPENAI_BASE_URL"),
            ..Default::default()
        };
        self.completion = self.completion.merge(&completion_env);

        let storage_env = StorageConfig {
            bucket: get("AWS_S3_BUCKET_NAME"),
            region: get("AWS_REGION"),
            access_key_id: get("AWS_ACCESS_KEY_ID"),
            secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            endpoint: get("AWS_S3_ENDPOINT"),
        };
        self.storage = self.storage.merge(&storage_env);

        if let Some(key) = get("MAILGUN_SIGNING_KEY") {
            self.mailgun_signing_key = Some(key);
        }
        if let Some(dir) = get("CHATLENS_UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(addr) = get("CHATLENS_HTTP_ADDR") {
            self.http_addr = addr.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "CHATLENS_HTTP_ADDR",
                value: addr,
            })?;
        }

        Ok(())
    }
}
