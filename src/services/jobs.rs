use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-process registry of background jobs. Records expire after the
/// configured retention so the cache stays bounded.
#[derive(Clone)]
pub struct JobRegistry {
    records: Cache<Uuid, JobRecord>,
}

/// Returned by [`JobRegistry::spawn`]. Dropping it detaches the job.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    join: JoinHandle<JobRecord>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn wait(self) -> AppResult<JobRecord> {
        self.join
            .await
            .map_err(|error| AppError::Internal(format!("Job {} panicked: {error}", self.id)))
    }
}

impl JobRegistry {
    pub fn new(retention: Duration, max_entries: u64) -> Self {
        Self {
            records: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(retention)
                .build(),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.records.get(&id).await
    }

    /// Register `task` as a job and run it on the runtime.
    pub async fn spawn<F>(&self, kind: &'static str, task: F) -> JobHandle
    where
        F: Future<Output = AppResult<Value>> + Send + 'static,
    {
        let mut record = JobRecord {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            status: JobStatus::Pending,
            error: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let id = record.id;
        self.records.insert(id, record.clone()).await;

        let records = self.records.clone();
        let span = info_span!("background_job", job_id = %id, job_kind = kind);
        let join = tokio::spawn(
            async move {
                record.status = JobStatus::Running;
                record.started_at = Some(Utc::now());
                records.insert(id, record.clone()).await;

                match task.await {
                    Ok(result) => {
                        record.status = JobStatus::Succeeded;
                        record.result = Some(result);
                        tracing::info!("Job completed");
                    }
                    Err(error) => {
                        record.status = JobStatus::Failed;
                        record.error = Some(error.to_string());
                        tracing::error!(error = %error, "Job failed");
                    }
                }
                record.finished_at = Some(Utc::now());
                records.insert(id, record.clone()).await;
                record
            }
            .instrument(span),
        );

        JobHandle { id, join }
    }
}
