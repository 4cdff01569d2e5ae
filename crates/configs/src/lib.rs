//! # configs
//!
//! Layered settings: built-in defaults, then an optional `config/dialect.*`
//! file, then `DIALECT__SECTION__KEY` environment variables (a `.env` file is
//! loaded first if present). Settings are read once at start-up; changing
//! them requires a restart.

use std::collections::HashMap;

use config::{Config, ConfigBuilder, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "DIALECT";
pub const DEFAULT_CONFIG_FILE: &str = "config/dialect";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub trust: TrustSettings,
    pub reputation: ReputationSettings,
    pub captcha: CaptchaSettings,
    pub remote: RemoteSettings,
    pub content: ContentSettings,
    pub identity: IdentitySettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// Postgres URL. Without one the board runs on the in-memory store.
    pub url: Option<SecretString>,
    pub max_connections: u32,
    /// Pool acquire timeout and per-transaction statement timeout.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct TrustSettings {
    pub post_cooldown_secs: u32,
    pub captcha_probability: f64,
    pub reputation_deny_above: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReputationSettings {
    pub url: String,
    /// Contact address the reputation service requires on every query.
    pub contact: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptchaSettings {
    pub verify_url: String,
    pub secret: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct RemoteSettings {
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ContentSettings {
    pub blacklist: Vec<String>,
    pub anonymous_marker: String,
    pub anonymous_identity: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentitySettings {
    /// Header carrying the caller address when running behind a proxy.
    /// Leave unset when clients connect directly, or they can spoof it.
    pub forwarded_header: Option<String>,
    pub loopback_alias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    pub json: bool,
    /// Used when `RUST_LOG` is not set.
    pub level: String,
}

impl Settings {
    /// Loads `.env`, the optional config file and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let builder = defaults()?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(environment(None));
        Self::build(builder)
    }

    /// Defaults overlaid with the given variables only; the process
    /// environment is not consulted.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, SettingsError> {
        Self::build(defaults()?.add_source(environment(Some(vars))))
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.trust.captcha_probability) {
            return Err(SettingsError::Invalid {
                key: "trust.captcha_probability",
                reason: format!("{} is outside [0, 1]", self.trust.captcha_probability),
            });
        }
        if !(0.0..=1.0).contains(&self.trust.reputation_deny_above) {
            return Err(SettingsError::Invalid {
                key: "trust.reputation_deny_above",
                reason: format!("{} is outside [0, 1]", self.trust.reputation_deny_above),
            });
        }
        if self.remote.timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "remote.timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if self.database.timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "database.timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if self.content.anonymous_identity.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "content.anonymous_identity",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.max_connections", 10)?
        .set_default("database.timeout_secs", 5)?
        .set_default("trust.post_cooldown_secs", 15)?
        .set_default("trust.captcha_probability", 0.10)?
        .set_default("trust.reputation_deny_above", 0.90)?
        .set_default("reputation.url", "http://check.getipintel.net/check.php")?
        .set_default("reputation.contact", "admin@example.com")?
        .set_default("captcha.verify_url", "https://www.google.com/recaptcha/api/siteverify")?
        .set_default("captcha.secret", "")?
        .set_default("remote.timeout_secs", 5)?
        .set_default("content.blacklist", Vec::<String>::new())?
        .set_default("content.anonymous_marker", "££")?
        .set_default("content.anonymous_identity", "1.1.1.1")?
        .set_default("identity.loopback_alias", "1.2.3.4")?
        .set_default("log.json", false)?
        .set_default("log.level", "info")
}

fn environment(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(" ")
        .with_list_parse_key("content.blacklist")
        .source(vars)
}
