use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, StorageBackend};
use crate::db::create_pool;
use crate::error::AppError;
use crate::repository::memory_store::MemoryStore;
use crate::repository::postgres_store::PgStore;
use crate::repository::Store;
use crate::services::jobs::JobRegistry;
use crate::services::schedule_sync::Calendar;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, AppError> {
        let store: Arc<dyn Store> = match config.storage_backend {
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::Postgres => {
                let pool = create_pool(&config)
                    .map_err(|error| AppError::Dependency(format!("Invalid database settings: {error}")))?
                    .ok_or_else(|| {
                        AppError::Dependency(
                            "Database is not configured. Set DATABASE_URL or STORAGE_BACKEND=memory."
                                .to_string(),
                        )
                    })?;
                Arc::new(PgStore::new(pool))
            }
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let jobs = JobRegistry::new(
            Duration::from_secs(config.job_retention_seconds.max(1)),
            config.job_max_entries.max(1),
        );
        Self {
            config: Arc::new(config),
            store,
            jobs,
        }
    }

    pub fn calendar(&self) -> Calendar {
        Calendar {
            today: self.config.today(),
            horizon_days: self.config.slot_horizon(),
        }
    }
}
