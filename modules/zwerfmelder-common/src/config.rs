use std::env;

use chrono_tz::Tz;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret used for tracking tokens and reporter-hash derivation.
    pub signing_secret: String,

    /// Base URL used when building citizen-facing tracking links.
    pub public_base_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Operator access
    pub operator_email: String,
    pub operator_password: String,

    /// Civil timezone for export period boundaries.
    pub export_timezone: Tz,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            signing_secret: required_env("APP_SIGNING_SECRET"),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            operator_email: env::var("OPERATOR_EMAIL")
                .unwrap_or_else(|_| "operator@example.org".to_string()),
            operator_password: required_env("OPERATOR_PASSWORD"),
            export_timezone: env::var("EXPORT_TIMEZONE")
                .unwrap_or_else(|_| "Europe/Amsterdam".to_string())
                .parse()
                .expect("EXPORT_TIMEZONE must be a valid IANA timezone"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
