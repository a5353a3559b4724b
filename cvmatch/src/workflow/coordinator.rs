//! Batch coordinator
//!
//! Drives parse → search → select for every filename in a batch with a fixed
//! pool of worker tasks pulling from one shared queue. Each item yields
//! exactly one result on the sink; a failing item never stops the batch.

use super::progress::{spawn_reporter, ProgressTracker};
use crate::error::ItemError;
use crate::models::{BatchProgress, ItemState, MatchResult, ParsedItem, ProcessingResult};
use crate::parser::FilenameParser;
use crate::selector::Selector;
use crate::services::IssueSearch;
use cvmatch_common::time::elapsed_millis;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// The three per-item stages, cheap to clone into worker tasks
#[derive(Clone)]
struct Pipeline {
    parser: Arc<dyn FilenameParser>,
    search: Arc<dyn IssueSearch>,
    selector: Arc<dyn Selector>,
}

fn advance(state: &mut ItemState, next: ItemState, filename: &str) {
    debug_assert!(state.can_advance_to(next), "illegal transition {:?} -> {:?}", state, next);
    debug!(filename, from = ?state, to = ?next, "Item state change");
    *state = next;
}

impl Pipeline {
    async fn run(&self, filename: &str, state: &mut ItemState) -> Result<MatchResult, ItemError> {
        let candidate = self.parser.parse(filename).await?;
        advance(state, ItemState::Parsed, filename);

        let issues = self
            .search
            .search_issues(&candidate.series, &candidate.issue_number)
            .await?;
        advance(state, ItemState::Searched, filename);

        let result = self.selector.select(&candidate, &issues).await?;
        advance(state, ItemState::Matched, filename);
        Ok(result)
    }

    async fn process(&self, filename: &str) -> ProcessingResult {
        let started = Instant::now();
        let mut state = ItemState::Pending;

        let result = match self.run(filename, &mut state).await {
            Ok(matched) => {
                info!(
                    filename,
                    catalog_id = ?matched.catalog_id,
                    confidence = %matched.confidence,
                    "Item resolved"
                );
                ProcessingResult::succeeded(filename, matched, elapsed_millis(started.elapsed()))
            }
            Err(e) => {
                advance(&mut state, ItemState::Failed(e.stage()), filename);
                error!(filename, stage = %e.stage(), error = %e, "Item failed");
                ProcessingResult::failed(filename, &e, elapsed_millis(started.elapsed()))
            }
        };

        advance(&mut state, ItemState::Done, filename);
        result
    }

    async fn parse_only(&self, filename: &str) -> ParsedItem {
        let parser = self.parser.name().to_string();
        match self.parser.parse(filename).await {
            Ok(candidate) => ParsedItem {
                filename: filename.to_string(),
                parser,
                candidate: Some(candidate),
                error: None,
            },
            Err(e) => {
                warn!(filename, error = %e, "Parse failed");
                ParsedItem {
                    filename: filename.to_string(),
                    parser,
                    candidate: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

struct NoCatalog;

#[async_trait::async_trait]
impl IssueSearch for NoCatalog {
    async fn search_issues(
        &self,
        _title: &str,
        _issue_number: &str,
    ) -> Result<Vec<crate::models::CandidateIssue>, crate::error::SearchError> {
        Err(crate::error::SearchError::Exhausted(
            "catalog access not configured".to_string(),
        ))
    }
}

/// Worker pool over the parse → search → select pipeline
///
/// Cancellation is permanent: once [`cancel`](Self::cancel) is called, every
/// later batch on this coordinator ends without processing any item. Build a
/// new coordinator to run again.
pub struct BatchCoordinator {
    pipeline: Pipeline,
    workers: usize,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
    report_interval: Duration,
}

impl BatchCoordinator {
    pub fn new(
        parser: Arc<dyn FilenameParser>,
        search: Arc<dyn IssueSearch>,
        selector: Arc<dyn Selector>,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                parser,
                search,
                selector,
            },
            workers: 1,
            progress: Arc::new(ProgressTracker::new()),
            cancel: CancellationToken::new(),
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    /// Coordinator for [`parse_batch`](Self::parse_batch) runs, without
    /// catalog access; a resolve through it fails at the search stage.
    pub fn for_parsing(parser: Arc<dyn FilenameParser>) -> Self {
        Self::new(
            parser,
            Arc::new(NoCatalog),
            Arc::new(crate::selector::AutoSelector::default()),
        )
    }

    /// Worker count, clamped to at least one
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress.snapshot()
    }

    /// Stop pulling new items; in-flight items still finish and are reported
    pub fn cancel(&self) {
        info!("Batch cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one filename through the pipeline outside of any batch
    pub async fn process_file(&self, filename: &str) -> ProcessingResult {
        self.pipeline.process(filename).await
    }

    /// Resolve every filename, sending one [`ProcessingResult`] per item to `sink`
    pub async fn process_batch(
        &self,
        filenames: Vec<String>,
        sink: mpsc::Sender<ProcessingResult>,
    ) -> BatchProgress {
        let pipeline = self.pipeline.clone();
        self.run_pool("resolve", filenames, sink, move |filename| {
            let pipeline = pipeline.clone();
            async move {
                let result = pipeline.process(&filename).await;
                let success = result.success;
                (result, success)
            }
        })
        .await
    }

    /// Parse-only mode: one [`ParsedItem`] per filename, no catalog traffic
    pub async fn parse_batch(
        &self,
        filenames: Vec<String>,
        sink: mpsc::Sender<ParsedItem>,
    ) -> BatchProgress {
        let pipeline = self.pipeline.clone();
        self.run_pool("parse", filenames, sink, move |filename| {
            let pipeline = pipeline.clone();
            async move {
                let item = pipeline.parse_only(&filename).await;
                let success = item.error.is_none();
                (item, success)
            }
        })
        .await
    }

    async fn run_pool<T, F, Fut>(
        &self,
        mode: &'static str,
        filenames: Vec<String>,
        sink: mpsc::Sender<T>,
        work: F,
    ) -> BatchProgress
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = (T, bool)> + Send + 'static,
    {
        let batch_id = Uuid::new_v4();
        let total = filenames.len();
        self.progress.reset(total);

        if total == 0 {
            info!(%batch_id, mode, "Empty batch, nothing to do");
            return self.progress.snapshot();
        }
        if self.cancel.is_cancelled() {
            warn!(%batch_id, mode, total, "Coordinator already cancelled, no items will be processed");
            return self.progress.snapshot();
        }

        let worker_count = self.workers.min(total);
        info!(%batch_id, mode, total, workers = worker_count, "Starting batch");

        let queue = Arc::new(Mutex::new(VecDeque::from(filenames)));
        let reporter_stop = self.cancel.child_token();
        let reporter = spawn_reporter(self.progress.clone(), self.report_interval, reporter_stop.clone());

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let sink = sink.clone();
            let progress = self.progress.clone();
            let cancel = self.cancel.clone();
            let work = work.clone();

            workers.spawn(
                async move {
                    loop {
                        if cancel.is_cancelled() {
                            debug!("Cancelled, worker exiting");
                            break;
                        }
                        let next = queue.lock().await.pop_front();
                        let Some(filename) = next else {
                            break;
                        };

                        let (output, success) = work(filename.clone()).await;
                        progress.record(success);

                        if sink.send(output).await.is_err() {
                            warn!(filename = %filename, "Result sink closed, dropping result");
                        }
                    }
                }
                .instrument(tracing::debug_span!("worker", %batch_id, worker_id)),
            );
        }
        drop(sink);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(%batch_id, error = %e, "Worker task failed");
            }
        }

        reporter_stop.cancel();
        if let Err(e) = reporter.await {
            warn!(error = %e, "Progress reporter task failed");
        }

        let progress = self.progress.snapshot();
        let elapsed = self.progress.elapsed();
        if self.cancel.is_cancelled() {
            info!(
                %batch_id,
                processed = progress.processed,
                total,
                "Batch cancelled after {:.1}s",
                elapsed.as_secs_f64()
            );
        } else {
            info!(
                %batch_id,
                processed = progress.processed,
                successful = progress.successful,
                failed = progress.failed,
                "Batch complete in {:.1}s",
                elapsed.as_secs_f64()
            );
        }
        progress
    }
}
