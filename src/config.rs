use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Service allowed to signal collaborator changes
    #[serde(default = "default_api_service_name")]
    pub api_service_name: String,

    /// JWT secret key
    pub jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// How long resolved access facts may be reused
    #[serde(default = "default_access_cache_ttl_secs")]
    pub access_cache_ttl_secs: u64,

    #[serde(default = "default_access_cache_capacity")]
    pub access_cache_capacity: u64,

    /// How long audit records of closed sessions are kept
    #[serde(default = "default_session_audit_ttl_secs")]
    pub session_audit_ttl_secs: u64,

    #[serde(default = "default_ws_ping_interval_secs")]
    pub ws_ping_interval_secs: u64,

    /// Base URL of the translation provider
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,

    #[serde(default = "default_translate_cache_ttl_secs")]
    pub translate_cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Tracing filter used when `RUST_LOG` is not set. Development also
    /// traces every HTTP request.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.trim().to_lowercase();
        let http_level = if self.is_development() { "debug" } else { level.as_str() };
        format!("pathcolab_sync={},tower_http={},info", level, http_level)
    }

    pub fn access_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.access_cache_ttl_secs)
    }

    pub fn session_audit_ttl(&self) -> Duration {
        Duration::from_secs(self.session_audit_ttl_secs)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs.max(1))
    }

    pub fn translate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.translate_cache_ttl_secs)
    }

    /// Parsed list of CORS origins, empty when unset.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            api_service_name: default_api_service_name(),
            jwt_secret: None,
            db_url: None,
            access_cache_ttl_secs: default_access_cache_ttl_secs(),
            access_cache_capacity: default_access_cache_capacity(),
            session_audit_ttl_secs: default_session_audit_ttl_secs(),
            ws_ping_interval_secs: default_ws_ping_interval_secs(),
            translate_url: None,
            translate_api_key: None,
            translate_cache_ttl_secs: default_translate_cache_ttl_secs(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "pathcolab-sync".to_string()
}

fn default_api_service_name() -> String {
    "pathcolab-api".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_access_cache_ttl_secs() -> u64 {
    30
}

fn default_access_cache_capacity() -> u64 {
    10_000
}

fn default_session_audit_ttl_secs() -> u64 {
    60 * 60
}

fn default_ws_ping_interval_secs() -> u64 {
    30
}

fn default_translate_cache_ttl_secs() -> u64 {
    60 * 60
}
