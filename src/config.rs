use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub session_idle_minutes: i64,
    pub session_secure: bool,
    pub email_domain: String,
    pub admin_emails: Vec<String>,
    pub otp_ttl_secs: i64,
    pub otp_cooldown_secs: i64,
    pub catalog_api_base: String,
    pub mail_webhook_url: Option<String>,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parsed<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &'static str,
            default: T,
        ) -> Result<T, ConfigError> {
            match lookup(name) {
                Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
                None => Ok(default),
            }
        }

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let admin_emails = lookup("ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Settings {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 16)?,
            session_idle_minutes: parsed(&lookup, "SESSION_IDLE_MINUTES", 60)?,
            session_secure: parsed(&lookup, "SESSION_SECURE", false)?,
            email_domain: lookup("EMAIL_DOMAIN").unwrap_or_else(|| "nus.edu".to_owned()).to_lowercase(),
            admin_emails,
            otp_ttl_secs: parsed(&lookup, "OTP_TTL_SECS", 300)?,
            otp_cooldown_secs: parsed(&lookup, "OTP_COOLDOWN_SECS", 60)?,
            catalog_api_base: lookup("CATALOG_API_BASE")
                .unwrap_or_else(|| "https://api.nusmods.com/v2".to_owned()),
            mail_webhook_url: lookup("MAIL_WEBHOOK_URL").filter(|url| !url.is_empty()),
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|admin| admin.eq_ignore_ascii_case(email))
    }
}
