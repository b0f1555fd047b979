//! Application configuration
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Certificate storage root
    pub upload_dir: String,
    /// Maximum certificate file size in bytes
    pub max_certificate_size: usize,
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
    /// Environment (development/production)
    pub environment: Environment,
    /// Send e-mails through the mailer; when off, fan-out only writes notifications
    pub mail_enabled: bool,
    /// Sender address for outgoing e-mail
    pub mail_from: String,
    /// Recipient of admin-facing e-mails (registry submissions)
    pub admin_notification_email: Option<String>,
    /// Interval between deadline/expiry sweeps; `None` disables the background task
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

const DEFAULT_MAX_CERTIFICATE_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match var("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        // DATABASE_URL, then DATABASE_SERVER_FULL, then individual components
        let database_url = var("DATABASE_URL")
            .or_else(|| var("DATABASE_SERVER_FULL"))
            .or_else(|| {
                let host = var("DATABASE_SERVER_HOST")?;
                let port = var("DATABASE_SERVER_PORT").unwrap_or_else(|| "5432".to_string());
                let user = var("DATABASE_SERVER_USER")?;
                let password = var("DATABASE_PASSWORD")?;
                let db = var("DATABASE_DB")?;
                Some(format!(
                    "postgres://{}:{}@{}:{}/{}",
                    user, password, host, port, db
                ))
            })
            .ok_or_else(|| {
                ConfigError::Missing(
                    "DATABASE_URL, DATABASE_SERVER_FULL, or DATABASE_SERVER_HOST + DATABASE_SERVER_USER + DATABASE_PASSWORD + DATABASE_DB is required".to_string(),
                )
            })?;

        let port = match var("PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT must be a port number, got '{}'", p)))?,
            None => 8080,
        };

        let max_certificate_size = match var("MAX_CERTIFICATE_SIZE") {
            Some(s) => s.parse().map_err(|_| {
                ConfigError::Invalid(format!("MAX_CERTIFICATE_SIZE must be a byte count, got '{}'", s))
            })?,
            None => DEFAULT_MAX_CERTIFICATE_SIZE,
        };

        let sweep_secs = match var("SWEEP_INTERVAL_SECS") {
            Some(s) => s.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!("SWEEP_INTERVAL_SECS must be a number of seconds, got '{}'", s))
            })?,
            None => DEFAULT_SWEEP_INTERVAL_SECS,
        };

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url,
            upload_dir: var("UPLOAD_DIR")
                .or_else(|| var("DATA_PATH").map(|p| format!("{}/certificates", p.trim_end_matches('/'))))
                .unwrap_or_else(|| "/app/certificates".to_string()),
            max_certificate_size,
            cors_origins: var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["http://localhost:8080".to_string()]),
            environment,
            mail_enabled: var("MAIL_ENABLED")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            mail_from: var("MAIL_FROM").unwrap_or_else(|| "noreply@training-portal.local".to_string()),
            admin_notification_email: var("ADMIN_NOTIFICATION_EMAIL").filter(|e| !e.trim().is_empty()),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/portal")]).unwrap();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.max_certificate_size, 10 * 1024 * 1024);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(3600)));
        assert!(!config.mail_enabled);
        assert!(!config.is_production());
        assert_eq!(config.admin_notification_email, None);
    }

    #[test]
    fn test_database_url_from_components() {
        let config = load(&[
            ("DATABASE_SERVER_HOST", "db"),
            ("DATABASE_SERVER_USER", "portal"),
            ("DATABASE_PASSWORD", "secret"),
            ("DATABASE_DB", "training"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "postgres://portal:secret@db:5432/training");
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_zero_interval_disables_sweeps() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("SWEEP_INTERVAL_SECS", "0"),
            ("MAIL_ENABLED", "true"),
            ("ENVIRONMENT", "prod"),
        ])
        .unwrap();
        assert_eq!(config.sweep_interval, None);
        assert!(config.mail_enabled);
        assert!(config.is_production());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("MAX_CERTIFICATE_SIZE", "ten megabytes"),
        ]);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
