use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub clinic_api_url: String,
    pub clinic_api_key: String,
    pub clinic_api_timeout_seconds: u64,
    pub late_grace_minutes: i64,
    pub late_check_interval_seconds: u64,
    pub flow_api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            clinic_api_url: env::var("CLINIC_API_URL")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_API_URL not set, using empty value");
                    String::new()
                }),
            clinic_api_key: env::var("CLINIC_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_API_KEY not set, requests will carry no apikey header");
                    String::new()
                }),
            clinic_api_timeout_seconds: parse_or("CLINIC_API_TIMEOUT_SECONDS", 10),
            late_grace_minutes: parse_or("LATE_GRACE_MINUTES", 15),
            late_check_interval_seconds: parse_or("LATE_CHECK_INTERVAL_SECONDS", 60),
            flow_api_port: parse_or("FLOW_API_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.clinic_api_url.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clinic_api_url: String::new(),
            clinic_api_key: String::new(),
            clinic_api_timeout_seconds: 10,
            late_grace_minutes: 15,
            late_check_interval_seconds: 60,
            flow_api_port: 3000,
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}
