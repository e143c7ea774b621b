use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COOKIE_NAME: &str = "auth_token";
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: u64 = 60 * 60;
pub const MAX_TOKEN_LIFETIME_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub cors: CorsConfig,
    pub environment: Environment,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret. There is no default: startup fails without it.
    pub jwt_secret: Option<String>,
    pub token_lifetime_seconds: u64,
    pub cookie_name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Idle time after which a session is rejected. Required.
    pub inactivity_timeout_ms: Option<u64>,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Deployment mode. Any value other than `production`/`prod` or `test`
/// runs as development, so arbitrary `NODE_ENV` values never block startup.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl From<String> for Environment {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_lifetime_seconds: DEFAULT_TOKEN_LIFETIME_SECONDS,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            username: "user".to_string(),
            password: "password".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: None,
            sweep_interval_seconds: 60,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
            cors: CorsConfig::default(),
            environment: Environment::default(),
        }
    }
}

/// Startup-only failures. None of these surface per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("failed to build CORS fairing: {0}")]
    Cors(#[from] rocket_cors::Error),
}

/// Values checked once at startup and shared with the request path.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub token_lifetime: Duration,
    pub inactivity_timeout: Duration,
    pub sweep_interval: Duration,
    pub cookie_name: String,
    pub secure_cookies: bool,
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Compiled-in defaults
    /// 2. Gateway.toml (if present)
    /// 3. Environment variables (prefixed with GATEWAY_, sections split on `__`)
    /// 4. The legacy flat variables JWT_SECRET_KEY, PORT, IN_ACTIVE_TIME_TIMEOUT and NODE_ENV
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("Gateway.toml"))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .merge(Env::raw().only(&["JWT_SECRET_KEY"]).map(|_| "auth.jwt_secret".into()))
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
            .merge(Env::raw().only(&["IN_ACTIVE_TIME_TIMEOUT"]).map(|_| "session.inactivity_timeout_ms".into()))
            .merge(Env::raw().only(&["NODE_ENV"]).map(|_| "environment".into()));

        Ok(figment.extract()?)
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let jwt_secret = match self.auth.jwt_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => return Err(ConfigError::ConfigurationMissing("auth.jwt_secret (JWT_SECRET_KEY)")),
        };

        let inactivity_timeout = match self.session.inactivity_timeout_ms {
            Some(0) => return Err(ConfigError::Invalid("session.inactivity_timeout_ms must be greater than zero".to_string())),
            Some(ms) => Duration::from_millis(ms),
            None => {
                return Err(ConfigError::ConfigurationMissing(
                    "session.inactivity_timeout_ms (IN_ACTIVE_TIME_TIMEOUT)",
                ));
            }
        };

        if self.auth.token_lifetime_seconds == 0 || self.auth.token_lifetime_seconds > MAX_TOKEN_LIFETIME_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "auth.token_lifetime_seconds must be between 1 and {MAX_TOKEN_LIFETIME_SECONDS}"
            )));
        }

        if self.auth.cookie_name.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.cookie_name must not be empty".to_string()));
        }

        let is_wildcard = self.cors.allowed_origins.iter().any(|origin| origin == "*");
        if is_wildcard && self.cors.allow_credentials {
            return Err(ConfigError::Invalid(
                "cannot use wildcard CORS origins (*) with credentials enabled".to_string(),
            ));
        }

        Ok(Settings {
            jwt_secret,
            token_lifetime: Duration::from_secs(self.auth.token_lifetime_seconds),
            inactivity_timeout,
            sweep_interval: Duration::from_secs(self.session.sweep_interval_seconds.max(1)),
            cookie_name: self.auth.cookie_name.clone(),
            secure_cookies: self.environment.is_production(),
        })
    }
}
