// Configuration chargée depuis l'environnement (.env supporté via dotenv)

use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;
use crate::models::users::PlanType;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub cors_allowed_origins: Vec<String>,
    pub admin_emails: Vec<String>,
    pub free_feed_limit: u64,
    pub premium_price_cents: i64,
    pub vip_price_cents: i64,
    pub plan_currency: String,
    pub inbound_webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub webhook: WebhookConfig,
    pub signal_stream_capacity: usize,
    pub proxy_upstream_url: Option<String>,
    pub rust_log: String,
}

/// Réglages du dispatcher de webhooks sortants.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
    pub retry_schedule_secs: Vec<i64>,
    pub disable_after_failures: i32,
    pub poll_interval_secs: u64,
    pub max_concurrent: usize,
    pub batch_size: u64,
}

impl WebhookConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construit la config à partir d'une fonction de lookup (testable sans toucher l'env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let require = |key: &str| {
            get(key).ok_or_else(|| AppError::Config(format!("{key} must be set")))
        };

        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            host: get_or("HOST", "127.0.0.1"),
            port: parse_num(&get, "PORT", 8080)?,
            jwt_secret: require("JWT_SECRET")?,
            jwt_ttl_hours: parse_num(&get, "JWT_TTL_HOURS", 24)?,
            cors_allowed_origins: split_list(&get_or("CORS_ALLOWED_ORIGINS", "*")),
            admin_emails: split_list(&get("ADMIN_EMAILS").unwrap_or_default())
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            free_feed_limit: parse_num(&get, "FREE_FEED_LIMIT", 3)?,
            premium_price_cents: parse_num(&get, "PREMIUM_PRICE_CENTS", 4900)?,
            vip_price_cents: parse_num(&get, "VIP_PRICE_CENTS", 9900)?,
            plan_currency: get_or("PLAN_CURRENCY", "USD").to_uppercase(),
            inbound_webhook_secret: get("INBOUND_WEBHOOK_SECRET"),
            webhook_tolerance_secs: parse_num(&get, "WEBHOOK_TOLERANCE_SECS", 300)?,
            webhook: WebhookConfig {
                timeout_secs: parse_num(&get, "WEBHOOK_TIMEOUT_SECS", 10)?,
                retry_schedule_secs: parse_schedule(&get_or(
                    "WEBHOOK_RETRY_SCHEDULE_SECS",
                    "10,60,300,1800",
                ))?,
                disable_after_failures: parse_num(&get, "WEBHOOK_DISABLE_AFTER_FAILURES", 10)?,
                poll_interval_secs: parse_num(&get, "WEBHOOK_POLL_INTERVAL_SECS", 5)?,
                max_concurrent: parse_num(&get, "WEBHOOK_MAX_CONCURRENT", 8)?,
                batch_size: parse_num(&get, "WEBHOOK_BATCH_SIZE", 50)?,
            },
            signal_stream_capacity: parse_num(&get, "SIGNAL_STREAM_CAPACITY", 256)?,
            proxy_upstream_url: get("PROXY_UPSTREAM_URL").map(|u| u.trim_end_matches('/').to_string()),
            rust_log: get_or("RUST_LOG", "info"),
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    pub fn plan_price_cents(&self, plan: &PlanType) -> i64 {
        match plan {
            PlanType::Free => 0,
            PlanType::Premium => self.premium_price_cents,
            PlanType::Vip => self.vip_price_cents,
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_num<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_schedule(raw: &str) -> Result<Vec<i64>, AppError> {
    let schedule = split_list(raw)
        .iter()
        .map(|s| s.parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AppError::Config(format!("WEBHOOK_RETRY_SCHEDULE_SECS is invalid: {raw}")))?;

    if schedule.iter().any(|d| *d < 0) {
        return Err(AppError::Config(
            "WEBHOOK_RETRY_SCHEDULE_SECS cannot contain negative delays".to_string(),
        ));
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.free_feed_limit, 3);
        assert_eq!(config.webhook.retry_schedule_secs, vec![10, 60, 300, 1800]);
        assert!(config.allows_any_origin());
        assert!(config.inbound_webhook_secret.is_none());
        assert_eq!(config.plan_price_cents(&PlanType::Free), 0);
        assert_eq!(config.plan_price_cents(&PlanType::Vip), 9900);
    }

    #[test]
    fn test_missing_required_variable() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "secret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_admin_emails_case_insensitive() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "secret"),
            ("ADMIN_EMAILS", "Boss@Example.com, ops@example.com"),
            ("PROXY_UPSTREAM_URL", "https://api.example.com/"),
        ]))
        .unwrap();

        assert!(config.is_admin_email(" boss@example.COM"));
        assert!(!config.is_admin_email("someone@example.com"));
        assert_eq!(config.proxy_upstream_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn test_negative_retry_delay_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "secret"),
            ("WEBHOOK_RETRY_SCHEDULE_SECS", "10,-5"),
        ]));
        assert!(result.is_err());
    }
}
