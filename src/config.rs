//! Centralized configuration, constructed once in `main` and carried
//! explicitly through `AppContext`. No global mutable singleton.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub log_level: String,
    pub emergency_webhook_url: Option<String>,
    pub emergency_webhook_token: Option<String>,
    pub training_interval: Duration,
    pub training_hard_deadline: Duration,
    pub detector_soft_deadline: Duration,
    pub webhook_timeout: Duration,
    pub ingress_high_water_mark: usize,
    pub api_key: Option<String>,
    pub zone_refresh_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            log_level: env_or("LOG_LEVEL", "info"),
            emergency_webhook_url: std::env::var("EMERGENCY_WEBHOOK_URL").ok(),
            emergency_webhook_token: std::env::var("EMERGENCY_WEBHOOK_TOKEN").ok(),
            training_interval: Duration::from_secs(env_parse("TRAINING_INTERVAL_SECS", 60)),
            training_hard_deadline: Duration::from_secs(env_parse(
                "TRAINING_HARD_DEADLINE_SECS",
                30,
            )),
            detector_soft_deadline: Duration::from_millis(env_parse(
                "DETECTOR_SOFT_DEADLINE_MS",
                100,
            )),
            webhook_timeout: Duration::from_secs(env_parse("WEBHOOK_TIMEOUT_SECS", 10)),
            ingress_high_water_mark: env_parse("INGRESS_HIGH_WATER_MARK", 1024),
            api_key: std::env::var("API_KEY").ok(),
            zone_refresh_interval: Duration::from_secs(env_parse("ZONE_REFRESH_INTERVAL_SECS", 30)),
        }
    }

    /// Config used by unit/integration tests: short deadlines, no webhook,
    /// no API key gate. Never reads environment variables.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            log_level: "info".to_string(),
            emergency_webhook_url: None,
            emergency_webhook_token: None,
            training_interval: Duration::from_secs(60),
            training_hard_deadline: Duration::from_secs(30),
            detector_soft_deadline: Duration::from_millis(100),
            webhook_timeout: Duration::from_secs(10),
            ingress_high_water_mark: 1024,
            api_key: None,
            zone_refresh_interval: Duration::from_secs(30),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
