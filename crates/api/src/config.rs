//! Application configuration

use litemaas_analytics::UsageCalendar;
use litemaas_litellm::LiteLlmConfig;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub cors_origins: Vec<String>,

    // Database. Only optional in LiteLLM mock mode, where usage analytics run
    // on in-memory storage.
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub enable_dev_login: bool,

    // LiteLLM
    pub litellm: LiteLlmConfig,

    // Usage analytics
    pub usage_cache_ttl: Duration,
    pub usage_cache_retention_days: u32,
    pub usage_calendar: UsageCalendar,

    // Rate limiting
    pub rate_limit_per_minute: u32,

    // Scheduled jobs (worker)
    pub model_sync_cron: String,
    pub usage_refresh_cron: String,
    pub usage_cleanup_cron: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let litellm = LiteLlmConfig::from_env();
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(url),
            _ if litellm.mock_mode => None,
            _ => return Err(ConfigError::Missing("DATABASE_URL")),
        };

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),

            // Database
            database_url,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            enable_dev_login: env::var("ENABLE_DEV_LOGIN")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            // LiteLLM
            litellm,

            // Usage analytics
            usage_cache_ttl: Duration::from_secs(
                60 * env::var("USAGE_CACHE_TTL_MINUTES")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse::<u64>()
                    .unwrap_or(5),
            ),
            usage_cache_retention_days: env::var("USAGE_CACHE_RETENTION_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .unwrap_or(365),
            usage_calendar: {
                let offset = env::var("USAGE_UTC_OFFSET").unwrap_or_else(|_| "+00:00".to_string());
                UsageCalendar::from_offset_str(&offset)
                    .map_err(|_| ConfigError::Invalid("USAGE_UTC_OFFSET", offset))?
            },

            // Rate limiting
            rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),

            // Scheduled jobs (sec min hour day month weekday)
            model_sync_cron: env::var("MODEL_SYNC_CRON")
                .unwrap_or_else(|_| "0 */30 * * * *".to_string()),
            usage_refresh_cron: env::var("USAGE_REFRESH_CRON")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            usage_cleanup_cron: env::var("USAGE_CLEANUP_CRON")
                .unwrap_or_else(|_| "0 15 3 * * *".to_string()),
        })
    }
}

impl Config {
    pub fn has_database(&self) -> bool {
        self.database_url.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        for var in [
            "DATABASE_URL",
            "JWT_SECRET",
            "USAGE_UTC_OFFSET",
            "USAGE_CACHE_TTL_MINUTES",
            "CORS_ORIGINS",
            "LITELLM_MOCK_MODE",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        cleanup_config();
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.usage_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.usage_cache_retention_days, 365);
        assert_eq!(config.rate_limit_per_minute, 120);
        assert_eq!(config.usage_calendar, UsageCalendar::utc());
        assert!(!config.enable_dev_login);
        assert!(!config.litellm.mock_mode);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_required_and_weak_secrets() {
        cleanup_config();
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("JWT_SECRET", "short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("USAGE_UTC_OFFSET", "-05:00");
        env::set_var("USAGE_CACHE_TTL_MINUTES", "1");
        env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        env::set_var("LITELLM_MOCK_MODE", "true");

        let config = Config::from_env().unwrap();
        assert_eq!(config.usage_calendar.offset().whole_hours(), -5);
        assert_eq!(config.usage_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert!(config.litellm.mock_mode);
        assert!(config.has_database());

        env::set_var("USAGE_UTC_OFFSET", "Europe/Paris");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("USAGE_UTC_OFFSET", _))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_database_optional_in_mock_mode() {
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        env::set_var("LITELLM_MOCK_MODE", "true");
        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, None);
        assert!(!config.has_database());

        cleanup_config();
    }
}
