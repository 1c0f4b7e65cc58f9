// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The in-memory job spooler: the one component every other piece of the
// agent talks to. Owns scheduling, retry, and the lifecycle event bus.
// Holds no queue state on disk — a restart starts with an empty queue.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_core::config::ConfigStore;
use agent_core::error::{AgentError, Result};
use agent_core::types::{Job, JobId, JobStatus, Priority};
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::materialize::{self, MaterializedFile};

/// Lifecycle events broadcast to anyone subscribed to the spooler.
#[derive(Debug, Clone)]
pub enum SpoolerEvent {
    Added(Job),
    Updated(Job),
    Completed(Job),
    Failed(Job, String),
}

/// A point-in-time view of the spooler, cheap to clone for HTTP responses.
#[derive(Debug, Clone, Default)]
pub struct SpoolerSnapshot {
    pub active: Vec<Job>,
    pub default_printer: Option<String>,
}

const EVENT_CHANNEL_CAPACITY: usize = 256;
/// Upper bound on how long `shutdown` waits for the dispatch loop to drain
/// its current job before returning anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct State {
    /// Jobs not yet in a terminal state, ordered by insertion; the
    /// dispatcher re-evaluates priority on every pop rather than keeping
    /// this sorted.
    active: Vec<Job>,
    /// Terminal jobs, most recent first.
    history: Vec<Job>,
    /// Server-assigned ids currently represented by a job in `active`,
    /// used by the remote client to avoid double-enqueuing a job the
    /// server has already handed over.
    server_ids_in_flight: HashSet<String>,
    /// Ids whose job is `processing`/`printing` and has been asked to
    /// cancel. The in-flight print is not interrupted; its result is
    /// discarded once the dispatch loop notices the id here.
    cancel_requested: HashSet<JobId>,
    default_printer: Option<String>,
    shutting_down: bool,
}

pub struct Spooler {
    state: Mutex<State>,
    events: broadcast::Sender<SpoolerEvent>,
    snapshot_tx: watch::Sender<SpoolerSnapshot>,
    wake: Notify,
    config: Arc<ConfigStore>,
    http: reqwest::Client,
    temp_dir: PathBuf,
    max_queue_size: usize,
}

impl Spooler {
    pub fn new(config: Arc<ConfigStore>, temp_dir: PathBuf) -> Arc<Self> {
        let snapshot = config.snapshot();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, _) = watch::channel(SpoolerSnapshot {
            active: Vec::new(),
            default_printer: snapshot.default_printer.clone(),
        });
        Arc::new(Self {
            state: Mutex::new(State {
                active: Vec::new(),
                history: Vec::new(),
                server_ids_in_flight: HashSet::new(),
                cancel_requested: HashSet::new(),
                default_printer: snapshot.default_printer,
                shutting_down: false,
            }),
            events,
            snapshot_tx,
            wake: Notify::new(),
            max_queue_size: snapshot.max_queue_size,
            config,
            http: reqwest::Client::new(),
            temp_dir,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpoolerEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<SpoolerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Start the dispatch loop on the current tokio runtime.
    pub fn spawn_dispatch_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let spooler = Arc::clone(self);
        tokio::spawn(async move { spooler.dispatch_loop().await })
    }

    #[instrument(skip_all)]
    async fn dispatch_loop(self: Arc<Self>) {
        loop {
            {
                let state = self.state.lock().await;
                if state.shutting_down {
                    return;
                }
            }

            let popped = {
                let state = self.state.lock().await;
                pop_next(&state.active)
            };

            let Some(mut job) = popped else {
                self.wake.notified().await;
                continue;
            };

            job.status = JobStatus::Processing;
            self.publish_update(job.clone()).await;

            let outcome = self.run_job(&mut job).await;

            if self.take_cancel_requested(job.id).await {
                warn!(
                    job_id = %job.id,
                    reason = %AgentError::CancelledDuringPrint,
                    "print outcome discarded, job was cancelled while in flight"
                );
                job.status = JobStatus::Cancelled;
                self.finish_job(job, SpoolerEvent::Updated).await;
                continue;
            }

            match outcome {
                Ok(()) => {
                    job.status = JobStatus::Completed;
                    self.finish_job(job, SpoolerEvent::Completed).await;
                }
                Err(e) => {
                    let max_retries = self.config.snapshot().max_retries;
                    match retry_decision(job.retry_count, max_retries) {
                        RetryDecision::Retry => {
                            job.retry_count += 1;
                            job.last_error = Some(e.to_string());
                            job.status = JobStatus::Queued;
                            warn!(job_id = %job.id, attempt = job.retry_count, error = %e, "job failed, retrying");
                            self.requeue_at_head(job.clone()).await;
                            self.publish_update(job).await;
                            let delay_ms = self.config.snapshot().retry_delay_ms;
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        }
                        RetryDecision::GiveUp => {
                            job.last_error = Some(e.to_string());
                            job.status = JobStatus::Failed;
                            let message = e.to_string();
                            self.finish_job(job, move |j| SpoolerEvent::Failed(j, message))
                                .await;
                        }
                    }
                }
            }
        }
    }

    async fn run_job(&self, job: &mut Job) -> Result<()> {
        let file = materialize::materialize(&job.payload, &self.temp_dir, &self.http).await?;
        job.temp_path = Some(file.path.display().to_string());
        job.status = JobStatus::Printing;
        self.publish_update(job.clone()).await;

        let printer = job
            .options
            .printer_name
            .clone()
            .or_else(|| self.config.snapshot().default_printer)
            .ok_or(AgentError::InvalidPayload(
                "no printer specified and no default printer configured".into(),
            ));

        let result = match printer {
            Ok(printer) => {
                let sumatra_path = self.config.snapshot().sumatra_path;
                agent_print::print_file(
                    &printer,
                    &file.path,
                    job.options.copies,
                    sumatra_path.as_deref(),
                )
                .await
            }
            Err(e) => Err(e),
        };

        materialize::cleanup(&file);
        result
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn enqueue(&self, mut job: Job) -> Result<Job> {
        validate_payload(&job)?;

        let mut state = self.state.lock().await;
        if state.active.len() >= self.max_queue_size {
            return Err(AgentError::QueueFull);
        }
        if let Some(server_id) = &job.server_job_id {
            if state.server_ids_in_flight.contains(server_id) {
                return Err(AgentError::DuplicateServerJob(server_id.clone()));
            }
            state.server_ids_in_flight.insert(server_id.clone());
        }
        if job.options.printer_name.is_none() {
            job.options.printer_name = state.default_printer.clone();
        }
        state.active.push(job.clone());
        drop(state);

        self.refresh_snapshot().await;
        let _ = self.events.send(SpoolerEvent::Added(job.clone()));
        self.wake.notify_one();
        Ok(job)
    }

    /// The configured upper bound on the active queue's length.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Cancel a job. A queued job is removed immediately. A job already
    /// processing or printing is flagged for deferred cancellation: the
    /// in-flight print is not interrupted, but its result is discarded and
    /// the job is finalized as `cancelled` once it returns (see
    /// `dispatch_loop`). Returns `false`, not an error, if `job_id` names
    /// no active job — cancelling an already-cancelled or unknown job is a
    /// no-op.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: JobId) -> bool {
        let mut state = self.state.lock().await;
        let Some(idx) = state.active.iter().position(|j| j.id == job_id) else {
            return false;
        };

        if matches!(state.active[idx].status, JobStatus::Queued) {
            let mut job = state.active.remove(idx);
            if let Some(server_id) = &job.server_job_id {
                state.server_ids_in_flight.remove(server_id);
            }
            job.status = JobStatus::Cancelled;
            state.history.insert(0, job.clone());
            drop(state);

            self.refresh_snapshot().await;
            let _ = self.events.send(SpoolerEvent::Updated(job));
            return true;
        }

        // Processing or printing: defer. The dispatch loop discards the
        // print outcome and finalizes the job once it returns.
        state.cancel_requested.insert(job_id);
        true
    }

    /// Re-enqueue a job from history. Only `Failed` jobs may be retried;
    /// retrying resets the retry counter and places the job at the tail of
    /// the active queue — a manual retry is not the automatic
    /// retry-to-head behavior the dispatcher uses for transient failures.
    /// Returns `false`, not an error, for a job that isn't in history with
    /// status `Failed`.
    #[instrument(skip(self))]
    pub async fn retry(&self, job_id: JobId) -> bool {
        let mut state = self.state.lock().await;
        let Some(idx) = state
            .history
            .iter()
            .position(|j| j.id == job_id && j.status == JobStatus::Failed)
        else {
            return false;
        };

        let mut job = state.history.remove(idx);
        job.status = JobStatus::Queued;
        job.retry_count = 0;
        job.last_error = None;
        if let Some(server_id) = &job.server_job_id {
            state.server_ids_in_flight.insert(server_id.clone());
        }
        state.active.push(job.clone());
        drop(state);

        self.refresh_snapshot().await;
        let _ = self.events.send(SpoolerEvent::Updated(job));
        self.wake.notify_one();
        true
    }

    async fn take_cancel_requested(&self, job_id: JobId) -> bool {
        self.state.lock().await.cancel_requested.remove(&job_id)
    }

    pub async fn clear_completed(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|j| j.status != JobStatus::Completed);
        before - state.history.len()
    }

    pub async fn list_active(&self) -> Vec<Job> {
        self.state.lock().await.active.clone()
    }

    /// Active jobs plus history, deduplicated by id, newest first.
    pub async fn list_all(&self) -> Vec<Job> {
        let state = self.state.lock().await;
        let mut seen = HashSet::new();
        let mut jobs: Vec<Job> = state
            .active
            .iter()
            .chain(state.history.iter())
            .filter(|j| seen.insert(j.id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn get_job(&self, job_id: JobId) -> Option<Job> {
        let state = self.state.lock().await;
        state
            .active
            .iter()
            .chain(state.history.iter())
            .find(|j| j.id == job_id)
            .cloned()
    }

    pub async fn status(&self) -> SpoolerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub async fn set_default_printer(&self, name: String) {
        self.config.set_default_printer(&name);
        let mut state = self.state.lock().await;
        state.default_printer = Some(name);
        drop(state);
        self.refresh_snapshot().await;
    }

    /// Stop accepting dispatch and wait up to five seconds for the
    /// in-flight job (if any) to finish.
    pub async fn shutdown(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            state.shutting_down = true;
        }
        self.wake.notify_one();
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while tokio::time::Instant::now() < deadline {
            let still_printing = self
                .state
                .lock()
                .await
                .active
                .iter()
                .any(|j| matches!(j.status, JobStatus::Printing));
            if !still_printing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("spooler shut down");
    }

    async fn requeue_at_head(&self, job: Job) {
        let mut state = self.state.lock().await;
        state.active.retain(|j| j.id != job.id);
        state.active.insert(0, job);
        drop(state);
        self.refresh_snapshot().await;
        self.wake.notify_one();
    }

    async fn finish_job(&self, job: Job, event: impl FnOnce(Job) -> SpoolerEvent) {
        let mut state = self.state.lock().await;
        state.active.retain(|j| j.id != job.id);
        if let Some(server_id) = &job.server_job_id {
            state.server_ids_in_flight.remove(server_id);
        }
        state.history.insert(0, job.clone());
        drop(state);
        self.refresh_snapshot().await;
        let _ = self.events.send(event(job));
    }

    async fn publish_update(&self, job: Job) {
        {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.active.iter_mut().find(|j| j.id == job.id) {
                *existing = job.clone();
            }
        }
        self.refresh_snapshot().await;
        let _ = self.events.send(SpoolerEvent::Updated(job));
    }

    async fn refresh_snapshot(&self) {
        let state = self.state.lock().await;
        let _ = self.snapshot_tx.send(SpoolerSnapshot {
            active: state.active.clone(),
            default_printer: state.default_printer.clone(),
        });
    }
}

/// Pick the next job to dispatch: highest priority first, FIFO within a
/// priority tier, re-evaluated on every pop so a high-priority job added
/// after a normal one still jumps the queue.
fn pop_next(active: &[Job]) -> Option<Job> {
    let idx = active
        .iter()
        .enumerate()
        .filter(|(_, j)| j.status == JobStatus::Queued)
        .max_by_key(|(i, j)| (priority_rank(j.priority), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)?;
    Some(active[idx].clone())
}

/// Outcome of evaluating whether a failed job should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retry,
    GiveUp,
}

/// Decide whether a job that has failed `retry_count` times (not counting
/// this attempt) should be retried again, given the configured cap.
fn retry_decision(retry_count: u32, max_retries: u32) -> RetryDecision {
    if retry_count < max_retries {
        RetryDecision::Retry
    } else {
        RetryDecision::GiveUp
    }
}

fn priority_rank(p: Priority) -> u8 {
    match p {
        Priority::High => 2,
        Priority::Normal => 1,
        Priority::Low => 0,
    }
}

fn validate_payload(job: &Job) -> Result<()> {
    use agent_core::types::Payload::*;
    match &job.payload {
        PdfBytes(b) if b.is_empty() => Err(AgentError::InvalidPayload("pdfBytes is empty".into())),
        PdfPath(p) if p.trim().is_empty() => {
            Err(AgentError::InvalidPayload("pdfPath is empty".into()))
        }
        PdfUrl(u) | HtmlUrl(u) if u.trim().is_empty() => {
            Err(AgentError::InvalidPayload("url is empty".into()))
        }
        Html(h) if h.trim().is_empty() => Err(AgentError::InvalidPayload("html is empty".into())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::types::{Payload, PrintOptions};

    fn test_config() -> Arc<ConfigStore> {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        // keep the tempdir alive for the life of the test by leaking it;
        // these are short-lived process-local tests.
        std::mem::forget(dir);
        Arc::new(store)
    }

    fn sample_job(priority: Priority) -> Job {
        Job::new(
            Payload::PdfBytes(b"%PDF-1.4".to_vec()),
            priority,
            PrintOptions {
                printer_name: Some("Office_Laser".into()),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn enqueue_rejects_empty_payload() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        let mut job = sample_job(Priority::Normal);
        job.payload = Payload::PdfBytes(vec![]);
        let err = spooler.enqueue(job).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn enqueue_respects_max_queue_size() {
        let config = test_config();
        config.set("maxQueueSize", 1u32);
        let spooler = Spooler::new(config, std::env::temp_dir());
        spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        let err = spooler
            .enqueue(sample_job(Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::QueueFull));
    }

    #[tokio::test]
    async fn pop_next_prefers_higher_priority() {
        let jobs = vec![sample_job(Priority::Normal), sample_job(Priority::High)];
        let popped = pop_next(&jobs).unwrap();
        assert_eq!(popped.priority, Priority::High);
    }

    #[tokio::test]
    async fn pop_next_is_fifo_within_a_priority() {
        let first = sample_job(Priority::Normal);
        let second = sample_job(Priority::Normal);
        let first_id = first.id;
        let jobs = vec![first, second];
        let popped = pop_next(&jobs).unwrap();
        assert_eq!(popped.id, first_id);
    }

    #[tokio::test]
    async fn cancel_queued_job_moves_it_to_history() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        let job = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        assert!(spooler.cancel(job.id).await);
        assert!(spooler.list_active().await.is_empty());
        let stored = spooler.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_unknown_job_is_a_no_op() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        assert!(!spooler.cancel(JobId::new()).await);

        let job = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        assert!(spooler.cancel(job.id).await);
        assert!(!spooler.cancel(job.id).await);
    }

    #[tokio::test]
    async fn cancel_while_printing_defers_to_the_dispatch_loop() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        let job = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        {
            let mut state = spooler.state.lock().await;
            state.active[0].status = JobStatus::Printing;
        }
        assert!(spooler.cancel(job.id).await);
        // still active: the print is not interrupted, only flagged.
        assert_eq!(spooler.list_active().await.len(), 1);
        assert!(spooler.take_cancel_requested(job.id).await);
    }

    #[test]
    fn retry_decision_retries_below_the_cap() {
        assert_eq!(retry_decision(0, 3), RetryDecision::Retry);
        assert_eq!(retry_decision(2, 3), RetryDecision::Retry);
    }

    #[test]
    fn retry_decision_gives_up_at_the_cap() {
        assert_eq!(retry_decision(3, 3), RetryDecision::GiveUp);
        assert_eq!(retry_decision(4, 3), RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn retry_requires_failed_status() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        let job = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        spooler.cancel(job.id).await;
        assert!(!spooler.retry(job.id).await);
    }

    #[tokio::test]
    async fn retry_requeues_a_failed_job_at_the_tail_with_reset_counters() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        let mut job = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        job.status = JobStatus::Failed;
        job.retry_count = 3;
        job.last_error = Some("boom".into());
        {
            let mut state = spooler.state.lock().await;
            state.active.clear();
            state.history.insert(0, job.clone());
        }
        assert!(spooler.retry(job.id).await);
        let requeued = spooler.get_job(job.id).await.unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert_eq!(requeued.retry_count, 0);
        assert!(requeued.last_error.is_none());
    }

    #[tokio::test]
    async fn set_default_printer_applies_to_new_jobs() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        spooler.set_default_printer("Kitchen_Inkjet".into()).await;
        let mut job = sample_job(Priority::Normal);
        job.options.printer_name = None;
        let job = spooler.enqueue(job).await.unwrap();
        let stored = spooler.get_job(job.id).await.unwrap();
        assert_eq!(stored.options.printer_name.as_deref(), Some("Kitchen_Inkjet"));
    }

    #[tokio::test]
    async fn dispatch_loop_retries_then_fails_a_job_whose_payload_never_materializes() {
        let config = test_config();
        config.set("maxRetries", 1u32);
        config.set("retryDelay", 1u64);
        let spooler = Spooler::new(config, std::env::temp_dir());
        let handle = spooler.spawn_dispatch_loop();

        let mut job = sample_job(Priority::Normal);
        job.payload = Payload::PdfPath("/nonexistent/does-not-exist.pdf".into());
        let job = spooler.enqueue(job).await.unwrap();

        let mut events = spooler.subscribe();
        let outcome = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SpoolerEvent::Failed(j, _)) = events.recv().await {
                    if j.id == job.id {
                        return j;
                    }
                }
            }
        })
        .await
        .expect("job should reach a terminal failed state");

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.retry_count, 1);
        handle.abort();
    }

    #[tokio::test]
    async fn list_all_is_sorted_newest_first_and_deduplicated() {
        let spooler = Spooler::new(test_config(), std::env::temp_dir());
        let first = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = spooler.enqueue(sample_job(Priority::Normal)).await.unwrap();
        let all = spooler.list_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);
    }
}
