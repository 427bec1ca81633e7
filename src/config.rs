use std::env;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    fn from_env(value: Option<String>) -> Self {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => Self::Memory,
            _ => Self::Postgres,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub agency_timezone: String,
    pub slot_horizon_days: u32,
    pub job_retention_seconds: u64,
    pub job_max_entries: u64,
    pub app_public_url: String,
    pub embed_script_path: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Turnos API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/api")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            storage_backend: StorageBackend::from_env(env_opt("STORAGE_BACKEND")),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            agency_timezone: env_or("AGENCY_TIMEZONE", "America/Argentina/Buenos_Aires"),
            slot_horizon_days: env_parse_or("SLOT_HORIZON_DAYS", 90),
            job_retention_seconds: env_parse_or("JOB_RETENTION_SECONDS", 3600),
            job_max_entries: env_parse_or("JOB_MAX_ENTRIES", 10_000),
            app_public_url: env_or("APP_PUBLIC_URL", "http://localhost:3000"),
            embed_script_path: env_or("EMBED_SCRIPT_PATH", "/integracion/reservas.js"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn timezone(&self) -> Tz {
        self.agency_timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(
                timezone = %self.agency_timezone,
                "Unknown AGENCY_TIMEZONE, falling back to UTC"
            );
            chrono_tz::UTC
        })
    }

    /// Calendar date "now" for the agencies served by this instance.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone()).date_naive()
    }

    pub fn slot_horizon(&self) -> u32 {
        self.slot_horizon_days.clamp(1, 730)
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            app_name: "Turnos API".to_string(),
            environment: "test".to_string(),
            api_prefix: "/api".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            storage_backend: StorageBackend::Memory,
            database_url: None,
            db_pool_max_connections: 1,
            db_pool_min_connections: 1,
            db_pool_acquire_timeout_seconds: 1,
            db_pool_idle_timeout_seconds: 60,
            agency_timezone: "UTC".to_string(),
            slot_horizon_days: 28,
            job_retention_seconds: 60,
            job_max_entries: 100,
            app_public_url: "https://reservas.example.com".to_string(),
            embed_script_path: "/integracion/reservas.js".to_string(),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/api".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_csv, StorageBackend};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix(""), "/api");
    }

    #[test]
    fn storage_backend_defaults_to_postgres() {
        assert_eq!(StorageBackend::from_env(None), StorageBackend::Postgres);
        assert_eq!(
            StorageBackend::from_env(Some(" Memory ".to_string())),
            StorageBackend::Memory
        );
        assert_eq!(
            StorageBackend::from_env(Some("sqlite".to_string())),
            StorageBackend::Postgres
        );
    }

    #[test]
    fn csv_skips_blank_entries() {
        assert_eq!(
            parse_csv(" http://a.test, ,http://b.test "),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
