//! Resume Orchestrator (C9): same walk as C8, entered through the
//! checkpoint-aware path so a `COMPLETED` space is skipped entirely and a
//! `RUNNING`/`PAUSED`/`FAILED` space picks up from its recorded cursor.

use std::sync::Arc;

use crate::detector::PiiDetector;
use crate::error::OrchestratorError;
use crate::orchestrator::ScanOrchestrator;
use crate::ports::{AttachmentTextExtractor, DocumentationClient};
use crate::types::ScanId;

pub struct ResumeOrchestrator<C, X, D> {
    inner: Arc<ScanOrchestrator<C, X, D>>,
}

impl<C, X, D> ResumeOrchestrator<C, X, D>
where
    C: DocumentationClient + 'static,
    X: AttachmentTextExtractor + 'static,
    D: PiiDetector + 'static,
{
    pub fn new(orchestrator: Arc<ScanOrchestrator<C, X, D>>) -> Self {
        Self { inner: orchestrator }
    }

    /// Resumes `scan_id`, reusing the original scan id and continuing
    /// `eventSeq` from `maxSeq(scanId) + 1` (handled transparently by the
    /// event store's `append`).
    pub async fn resume(&self, scan_id: ScanId) -> Result<(), OrchestratorError> {
        Arc::clone(&self.inner).run_resume(scan_id).await
    }

    /// Runs [`Self::resume`] in the background, cancellable through
    /// `ScanTaskManager::pause_scan` the same way a fresh scan is.
    pub async fn spawn_resume(&self, scan_id: ScanId) {
        Arc::clone(&self.inner).spawn_resume(scan_id).await
    }
}
