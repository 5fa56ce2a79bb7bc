//! Author report jobs
//!
//! Requests are acknowledged immediately and pushed onto a bounded channel;
//! a single background worker drains it and retries failed runs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    config::ReportsConfig,
    error::{AppError, AppResult},
    repository::Repository,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    pub id: Uuid,
    pub author_id: Uuid,
}

/// Result of one report run
#[derive(Debug, Clone, Serialize)]
pub struct AuthorReport {
    pub job_id: Uuid,
    pub author_id: Uuid,
    pub full_name: String,
    pub book_count: i64,
    pub generated_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a report for the author; returns the job id
    async fn enqueue(&self, author_id: Uuid) -> AppResult<Uuid>;
}

#[derive(Clone)]
pub struct ReportQueue {
    sender: mpsc::Sender<ReportJob>,
}

impl ReportQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReportJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobQueue for ReportQueue {
    async fn enqueue(&self, author_id: Uuid) -> AppResult<Uuid> {
        let job = ReportJob {
            id: Uuid::new_v4(),
            author_id,
        };
        let id = job.id;

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AppError::Internal("Report queue is full".to_string()),
            mpsc::error::TrySendError::Closed(_) => AppError::Internal("Report worker is not running".to_string()),
        })?;

        tracing::info!("Queued report job {} for author {}", id, author_id);
        Ok(id)
    }
}

pub struct ReportWorker {
    repository: Repository,
    receiver: mpsc::Receiver<ReportJob>,
    work: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl ReportWorker {
    pub fn new(repository: Repository, receiver: mpsc::Receiver<ReportJob>, config: &ReportsConfig) -> Self {
        Self {
            repository,
            receiver,
            work: Duration::from_secs(config.work_seconds),
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Process jobs until every queue handle is dropped
    pub async fn run(mut self) {
        tracing::info!("Report worker started");
        while let Some(job) = self.receiver.recv().await {
            self.process(&job).await;
        }
        tracing::info!("Report worker stopped");
    }

    pub async fn process(&self, job: &ReportJob) -> Option<AuthorReport> {
        for attempt in 1..=self.max_attempts {
            match self.generate(job).await {
                Ok(report) => {
                    tracing::info!(
                        "Report job {} done: {} has {} book(s)",
                        job.id,
                        report.full_name,
                        report.book_count
                    );
                    return Some(report);
                }
                Err(AppError::NotFound(_)) => {
                    tracing::warn!("Report job {} dropped: author {} no longer exists", job.id, job.author_id);
                    return None;
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!("Report job {} attempt {} failed: {}", job.id, attempt, e);
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!("Report job {} failed after {} attempts: {}", job.id, attempt, e);
                }
            }
        }
        None
    }

    async fn generate(&self, job: &ReportJob) -> AppResult<AuthorReport> {
        let author = self.repository.authors_get(job.author_id).await?;
        tokio::time::sleep(self.work).await;

        Ok(AuthorReport {
            job_id: job.id,
            author_id: author.id,
            full_name: author.full_name,
            book_count: author.book_count,
            generated_at: Utc::now(),
        })
    }
}
