//! Priority work queue adapter (spec §4.5).
//!
//! Ordering: strictly by priority band, FIFO within a band (spec §5). The
//! trait is the cross-worker synchronization seam — the only one this spec
//! requires (spec §5 "Queue is the only cross-worker synchronization
//! channel for dispatch").

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::crawl_types::{CrawlEngineError, Job, JobId};

/// Progress payload a job reports back through `update_progress` (spec §4.6).
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub status: JobStatus,
    pub current_document_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
}

/// Priority queue contract. `enqueue`/`enqueue_bulk` are the only way a job
/// becomes visible to workers; `move_to_failed` routes permanently-failed
/// jobs out of the active rotation without losing the failure context.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), CrawlEngineError>;

    async fn enqueue_bulk(&self, jobs: Vec<Job>) -> Result<(), CrawlEngineError> {
        for job in jobs {
            self.enqueue(job).await?;
        }
        Ok(())
    }

    /// Dequeue the next job in priority/FIFO order, if any is ready.
    async fn dequeue(&self) -> Result<Option<Job>, CrawlEngineError>;

    async fn update_progress(
        &self,
        job_id: JobId,
        payload: ProgressUpdate,
    ) -> Result<(), CrawlEngineError>;

    async fn move_to_failed(
        &self,
        job_id: JobId,
        err: &CrawlEngineError,
        retryable: bool,
    ) -> Result<(), CrawlEngineError>;
}

#[derive(Eq, PartialEq)]
struct QueueEntry {
    priority: i32,
    sequence: u64,
    job: Job,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want lowest priority (and earliest
        // sequence within a band) to come out first, so compare reversed.
        (Reverse(self.priority), Reverse(self.sequence))
            .cmp(&(Reverse(other.priority), Reverse(other.sequence)))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A permanently-failed job's last known state, recorded by `move_to_failed`.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub message: String,
    pub retryable: bool,
}

/// In-process `JobQueue` ordered by `(priority asc, sequence asc)`, giving
/// strict priority-band ordering with FIFO within a band. Also owns each
/// job's last reported progress and, once failed permanently, its failure
/// record (spec §4.5's `updateProgress`/`moveToFailed` contract).
pub struct InMemoryJobQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    sequence: AtomicU64,
    progress: DashMap<JobId, ProgressUpdate>,
    failed: DashMap<JobId, FailedJob>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            sequence: AtomicU64::new(0),
            progress: DashMap::new(),
            failed: DashMap::new(),
        }
    }
}

impl InMemoryJobQueue {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Last progress reported for `job_id`, if `update_progress` has been
    /// called for it.
    #[must_use]
    pub fn last_progress(&self, job_id: JobId) -> Option<ProgressUpdate> {
        self.progress.get(&job_id).map(|e| e.clone())
    }

    /// The failure record for `job_id`, if `move_to_failed` has been called
    /// for it.
    #[must_use]
    pub fn failure(&self, job_id: JobId) -> Option<FailedJob> {
        self.failed.get(&job_id).map(|e| e.clone())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), CrawlEngineError> {
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = job.priority;
        self.heap.lock().await.push(QueueEntry {
            priority,
            sequence,
            job,
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>, CrawlEngineError> {
        Ok(self.heap.lock().await.pop().map(|entry| entry.job))
    }

    async fn update_progress(
        &self,
        job_id: JobId,
        payload: ProgressUpdate,
    ) -> Result<(), CrawlEngineError> {
        self.progress.insert(job_id, payload);
        Ok(())
    }

    async fn move_to_failed(
        &self,
        job_id: JobId,
        err: &CrawlEngineError,
        retryable: bool,
    ) -> Result<(), CrawlEngineError> {
        self.progress.remove(&job_id);
        self.failed.insert(
            job_id,
            FailedJob {
                message: err.to_string(),
                retryable,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl_engine::crawl_types::{CrawlId, CrawlerOptions, JobMode, PageOptions};

    fn job_with(priority: i32, url: &str) -> Job {
        Job {
            id: JobId::new(),
            crawl_id: CrawlId::new(),
            url: url.to_string(),
            mode: JobMode::SingleUrls,
            priority,
            sitemapped: false,
            crawler_options: CrawlerOptions::default(),
            page_options: PageOptions::default(),
            sitemap_entry: None,
        }
    }

    #[tokio::test]
    async fn dequeues_by_priority_then_fifo() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(job_with(20, "b")).await.unwrap();
        queue.enqueue(job_with(15, "a")).await.unwrap();
        queue.enqueue(job_with(20, "c")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.url, "a");
        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.url, "b");
        let third = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(third.url, "c");
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_progress_is_retrievable() {
        let queue = InMemoryJobQueue::new();
        let job = job_with(20, "a");
        let job_id = job.id;
        queue.enqueue(job).await.unwrap();
        queue
            .update_progress(
                job_id,
                ProgressUpdate {
                    current: 3,
                    total: 5,
                    status: JobStatus::Active,
                    current_document_url: Some("a".into()),
                },
            )
            .await
            .unwrap();

        let progress = queue.last_progress(job_id).unwrap();
        assert_eq!((progress.current, progress.total), (3, 5));
    }

    #[tokio::test]
    async fn move_to_failed_records_failure_and_clears_progress() {
        let queue = InMemoryJobQueue::new();
        let job_id = JobId::new();
        queue
            .update_progress(
                job_id,
                ProgressUpdate {
                    current: 0,
                    total: 1,
                    status: JobStatus::Active,
                    current_document_url: None,
                },
            )
            .await
            .unwrap();

        queue
            .move_to_failed(job_id, &CrawlEngineError::PermanentFetch("404".into()), false)
            .await
            .unwrap();

        assert!(queue.last_progress(job_id).is_none());
        let failure = queue.failure(job_id).unwrap();
        assert_eq!(failure.message, "permanent fetch error: 404");
        assert!(!failure.retryable);
    }
}
