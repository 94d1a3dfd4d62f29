//! Progress reporting: workers publish updates, a per-crawl aggregator
//! tracks `{current, total, status, currentDocumentUrl, currentDocument}`
//! and callers subscribe to it (spec §4.6, §9 "re-architect as a message
//! channel from workers to a per-crawl progress aggregator").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::crawl_types::Document;
use super::queue::JobStatus;

/// A progress update broadcast to subscribers of a single crawl.
#[derive(Debug, Clone)]
pub struct CrawlProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub status: JobStatus,
    pub current_document_url: Option<String>,
    pub current_document: Option<Document>,
}

/// Per-crawl progress aggregator. `total` grows monotonically as link
/// discovery enqueues more URLs (spec §4.6); `current` counts completed
/// jobs (emitted or permanently failed).
pub struct ProgressAggregator {
    current: AtomicUsize,
    total: AtomicUsize,
    sender: broadcast::Sender<CrawlProgressUpdate>,
}

impl ProgressAggregator {
    #[must_use]
    pub fn new(initial_total: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(256);
        Arc::new(Self {
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(initial_total),
            sender,
        })
    }

    /// Subscribe to this crawl's progress updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlProgressUpdate> {
        self.sender.subscribe()
    }

    /// Called by link discovery each time it enqueues a new job; `total`
    /// only ever grows (spec §4.6).
    pub fn grow_total(&self, by: usize) {
        if by == 0 {
            return;
        }
        self.total.fetch_add(by, Ordering::SeqCst);
    }

    /// Called by a worker after a job completes (emitted or permanently
    /// failed); advances `current` and broadcasts the update.
    pub fn report(
        &self,
        status: JobStatus,
        current_document_url: Option<String>,
        current_document: Option<Document>,
    ) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        // A broadcast channel with no subscribers is a legitimate state
        // (no one has called `subscribe()` yet); the send failing is not an
        // error for the worker that produced the update.
        let _ = self.sender.send(CrawlProgressUpdate {
            current,
            total,
            status,
            current_document_url,
            current_document,
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.current.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn total_grows_monotonically_and_subscribers_receive_updates() {
        let aggregator = ProgressAggregator::new(1);
        let mut rx = aggregator.subscribe();

        aggregator.grow_total(2);
        assert_eq!(aggregator.snapshot(), (0, 3));

        aggregator.report(JobStatus::Completed, Some("https://example.com/a".into()), None);
        let update = rx.recv().await.unwrap();
        assert_eq!(update.current, 1);
        assert_eq!(update.total, 3);
    }
}
