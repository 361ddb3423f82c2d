use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    /// Provider name recorded in the communications log.
    #[serde(default = "default_provider")]
    pub provider: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub smtp: SmtpConfig,
    /// Base URL for dashboard links and tracking pixels, e.g.
    /// "https://app.example.com". No trailing slash.
    pub dashboard_url: String,
    /// "production" enables the inactivity and campaign schedulers;
    /// anything else makes their ticks log-only no-ops. The WhatsApp
    /// expiry scanner runs regardless.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Default program name used when a trigger context supplies none.
    #[serde(default = "default_program_name")]
    pub default_program_name: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn default_provider() -> String {
    "smtp".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_program_name() -> String {
    "your program".to_string()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `SMTP__PORT`) overrides the file
/// value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.smtp.port == 0 {
        return Err(ConfigError::Validation("smtp.port must be > 0".into()));
    }
    if !app.dashboard_url.starts_with("http") {
        return Err(ConfigError::Validation(
            "dashboard_url must be an absolute http(s) URL".into(),
        ));
    }
    if app.dashboard_url.ends_with('/') {
        return Err(ConfigError::Validation(
            "dashboard_url must not end with '/'".into(),
        ));
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            smtp: SmtpConfig {
                server: "smtp.example.com".into(),
                port: 587,
                username: "mailer".into(),
                password: "secret".into(),
                from: "Membership <no-reply@example.com>".into(),
                provider: default_provider(),
            },
            dashboard_url: "https://app.example.com".into(),
            environment: default_environment(),
            default_program_name: default_program_name(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_zero_smtp_port() {
        let mut cfg = base_config();
        cfg.smtp.port = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_relative_dashboard_url() {
        let mut cfg = base_config();
        cfg.dashboard_url = "app.example.com".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_trailing_slash_dashboard_url() {
        let mut cfg = base_config();
        cfg.dashboard_url = "https://app.example.com/".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn production_flag() {
        let mut cfg = base_config();
        assert!(!cfg.is_production());
        cfg.environment = "production".into();
        assert!(cfg.is_production());
    }
}
