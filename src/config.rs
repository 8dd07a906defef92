//! Environment-driven configuration for the ingestion service.
//!
//! This module loads and validates settings once at startup (via `init_config`) and exposes
//! a global, read-only view through `get_config`. The configuration powers the HTTP surface,
//! the processing pipeline, and the sinks, and includes:
//!
//! - Application identity (`APP_NAME`, `VERSION`, `DEBUG`).
//! - Full-text sink connectivity (`SOLR_URL`, `SOLR_COLLECTION`).
//! - Vector sink connectivity (`VECTOR_URL`, `VECTOR_COLLECTION`).
//! - Extractor service (`TIKA_SERVICE_URL`, `TIKA_SERVICE_TIMEOUT`).
//! - Provider credentials and default models (`OPENAI_API_KEY`, `OPENAI_EMBEDDING_MODEL`,
//!   `ALI_QWEN_API_KEY`, `ALI_EMBEDDING_MODEL`, `GOOGLE_API_KEY`, `GOOGLE_EMBEDDING_MODEL`).
//! - Pipeline tuning (`MAX_WORKERS`, `CHUNK_SIZE`, `CHUNK_OVERLAP`, `NAMESPACE_SEED`,
//!   `SOURCE_SYSTEM`, `CLEAN_SEMANTIC_DEDUP`, `LOCAL_MODEL_PATH`, `EMAIL_STATE_FILE`).
//! - Async queue gating (`REDIS_BROKER_URL`, `REDIS_BACKEND_URL`).
//! - HTTP server port and CORS (`SERVER_PORT`, `SERVER_PORT_RANGE`, `ALLOWED_ORIGINS`).
//! - Log file routing (`INGESTD_LOG_FILE`).
//!
//! Every field is optional with sensible defaults so the service boots bare; invalid values
//! are flagged early with descriptive errors so misconfiguration is easy to diagnose.

use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Human-readable application name reported by the health endpoint.
    pub app_name: String,
    /// Application version reported by the health endpoint.
    pub version: String,
    /// Debug flag surfaced in startup logs.
    pub debug: bool,
    /// Base URL of the Solr instance backing the full-text sink, when configured.
    pub solr_url: Option<String>,
    /// Solr collection receiving assembled documents.
    pub solr_collection: String,
    /// Base URL of the vector store backing the vector sink, when configured.
    pub vector_url: Option<String>,
    /// Vector store collection receiving chunk records.
    pub vector_collection: String,
    /// Base URL of the text/metadata extractor service.
    pub tika_url: String,
    /// Extractor request timeout in seconds.
    pub tika_timeout_secs: u64,
    /// OpenAI API key enabling the `openai` provider.
    pub openai_api_key: Option<String>,
    /// Default OpenAI embedding model.
    pub openai_embedding_model: Option<String>,
    /// DashScope API key enabling the `ali` provider.
    pub ali_api_key: Option<String>,
    /// Default DashScope embedding model.
    pub ali_embedding_model: Option<String>,
    /// Google API key enabling the `google` provider.
    pub google_api_key: Option<String>,
    /// Default Google embedding model.
    pub google_embedding_model: Option<String>,
    /// Path to the local sentence-embedding model used by the clean-stage dedup.
    pub local_model_path: Option<String>,
    /// Broker URL gating the asynchronous ingestion queue.
    pub redis_broker_url: Option<String>,
    /// Result backend URL for the asynchronous queue.
    pub redis_backend_url: Option<String>,
    /// Comma-separated list of origins allowed by the CORS layer.
    pub allowed_origins: Option<String>,
    /// Default source-system tag used for document identity.
    pub source_system: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Inclusive port range scanned when no explicit port is set.
    pub server_port_range: (u16, u16),
    /// Log file appended to by the file layer; `logs/ingestd.log` when unset.
    pub log_file: Option<String>,
    /// Namespace seed for deterministic UUIDv5 record identifiers.
    pub namespace_seed: String,
    /// Bound on concurrently processed items for multi-item sources.
    pub max_workers: usize,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Path of the persisted seen-UID state for the IMAP source.
    pub email_state_file: String,
    /// Opt-in flag for the semantic paragraph dedup stage of the cleaner.
    pub clean_semantic_dedup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "ingestd".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            debug: false,
            solr_url: None,
            solr_collection: "documents".into(),
            vector_url: None,
            vector_collection: "documents".into(),
            tika_url: "http://localhost:9998".into(),
            tika_timeout_secs: 120,
            openai_api_key: None,
            openai_embedding_model: None,
            ali_api_key: None,
            ali_embedding_model: None,
            google_api_key: None,
            google_embedding_model: None,
            local_model_path: None,
            redis_broker_url: None,
            redis_backend_url: None,
            allowed_origins: None,
            source_system: None,
            server_port: None,
            server_port_range: (8100, 8199),
            log_file: None,
            namespace_seed: "com.geelink.2025".into(),
            max_workers: 10,
            chunk_size: 500,
            chunk_overlap: 50,
            email_state_file: "email_source_state.json".into(),
            clean_semantic_dedup: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let chunk_size = load_usize_with_default("CHUNK_SIZE", defaults.chunk_size)?;
        let chunk_overlap = load_usize_with_default("CHUNK_OVERLAP", defaults.chunk_overlap)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_SIZE must be at least 1".into(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue(
                "CHUNK_OVERLAP must be smaller than CHUNK_SIZE".into(),
            ));
        }
        let max_workers = load_usize_with_default("MAX_WORKERS", defaults.max_workers)?;
        if max_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_WORKERS must be at least 1".into(),
            ));
        }

        Ok(Self {
            app_name: load_env_optional("APP_NAME").unwrap_or(defaults.app_name),
            version: load_env_optional("VERSION").unwrap_or(defaults.version),
            debug: load_bool_with_default("DEBUG", defaults.debug)?,
            solr_url: load_env_optional("SOLR_URL"),
            solr_collection: load_env_optional("SOLR_COLLECTION").unwrap_or(defaults.solr_collection),
            vector_url: load_env_optional("VECTOR_URL"),
            vector_collection: load_env_optional("VECTOR_COLLECTION")
                .unwrap_or(defaults.vector_collection),
            tika_url: load_env_optional("TIKA_SERVICE_URL").unwrap_or(defaults.tika_url),
            tika_timeout_secs: load_u64_with_default(
                "TIKA_SERVICE_TIMEOUT",
                defaults.tika_timeout_secs,
            )?,
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_embedding_model: load_env_optional("OPENAI_EMBEDDING_MODEL"),
            ali_api_key: load_env_optional("ALI_QWEN_API_KEY"),
            ali_embedding_model: load_env_optional("ALI_EMBEDDING_MODEL"),
            google_api_key: load_env_optional("GOOGLE_API_KEY"),
            google_embedding_model: load_env_optional("GOOGLE_EMBEDDING_MODEL"),
            local_model_path: load_env_optional("LOCAL_MODEL_PATH"),
            redis_broker_url: load_env_optional("REDIS_BROKER_URL"),
            redis_backend_url: load_env_optional("REDIS_BACKEND_URL"),
            allowed_origins: load_env_optional("ALLOWED_ORIGINS"),
            source_system: load_env_optional("SOURCE_SYSTEM"),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            server_port_range: load_env_optional("SERVER_PORT_RANGE")
                .map(|value| parse_port_range(&value))
                .transpose()?
                .unwrap_or(defaults.server_port_range),
            log_file: load_env_optional("INGESTD_LOG_FILE"),
            namespace_seed: load_env_optional("NAMESPACE_SEED").unwrap_or(defaults.namespace_seed),
            max_workers,
            chunk_size,
            chunk_overlap,
            email_state_file: load_env_optional("EMAIL_STATE_FILE")
                .unwrap_or(defaults.email_state_file),
            clean_semantic_dedup: load_bool_with_default(
                "CLEAN_SEMANTIC_DEDUP",
                defaults.clean_semantic_dedup,
            )?,
        })
    }
}

fn load_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_bool_with_default(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(default),
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a `first-last` port range, requiring `first <= last`.
fn parse_port_range(value: &str) -> Result<(u16, u16), ConfigError> {
    let invalid = || ConfigError::InvalidValue("SERVER_PORT_RANGE".into());
    let (first, last) = value.split_once('-').ok_or_else(invalid)?;
    let first: u16 = first.trim().parse().map_err(|_| invalid())?;
    let last: u16 = last.trim().parse().map_err(|_| invalid())?;
    if first > last {
        return Err(invalid());
    }
    Ok((first, last))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        app_name = %config.app_name,
        version = %config.version,
        debug = config.debug,
        solr_url = ?config.solr_url,
        solr_collection = %config.solr_collection,
        vector_url = ?config.vector_url,
        tika_url = %config.tika_url,
        tika_timeout_secs = config.tika_timeout_secs,
        server_port = ?config.server_port,
        server_port_range = ?config.server_port_range,
        log_file = ?config.log_file,
        max_workers = config.max_workers,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bootable() {
        let config = Config::default();
        assert_eq!(config.tika_url, "http://localhost:9998");
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.server_port_range, (8100, 8199));
        assert!(config.solr_url.is_none());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn port_ranges_parse_and_validate() {
        assert_eq!(parse_port_range("8100-8199").unwrap(), (8100, 8199));
        assert_eq!(parse_port_range(" 9000 - 9000 ").unwrap(), (9000, 9000));
        assert!(parse_port_range("8199-8100").is_err());
        assert!(parse_port_range("8100").is_err());
        assert!(parse_port_range("a-b").is_err());
    }
}
