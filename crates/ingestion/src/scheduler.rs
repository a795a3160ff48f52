//! Cron-driven and manual fetch runs
//!
//! The [`Scheduler`] owns the cancellation token of every live run. A
//! run is admitted only when the shared progress slot is free, so cron
//! fires and manual triggers follow the same overlap rule. Each
//! admitted run executes on its own task with a child of the shutdown
//! token.

use futures::future::join_all;
use robodigest_common::config::{cron_with_seconds, FetchConfig};
use robodigest_common::metrics::{record_run, record_run_started};
use robodigest_common::{AppError, ProgressHub, ProgressSnapshot, RunStatus, SharedStore, SourceKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::enricher::Enricher;
use crate::fetcher::Fetcher;
use crate::sources::FetchContext;

/// Why a trigger was not admitted
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("a fetch is already running")]
    AlreadyRunning(ProgressSnapshot),

    #[error("no pipeline configured for {0}")]
    NotConfigured(SourceKind),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Everything a run needs, keyed by source kind
pub struct Pipeline {
    fetchers: HashMap<SourceKind, Fetcher>,
    enricher: Option<Enricher>,
    progress: Arc<ProgressHub>,
    fetch_config: FetchConfig,
    store: SharedStore,
}

impl Pipeline {
    pub fn new(
        fetchers: Vec<Fetcher>,
        enricher: Option<Enricher>,
        progress: Arc<ProgressHub>,
        fetch_config: FetchConfig,
        store: SharedStore,
    ) -> Self {
        Self {
            fetchers: fetchers.into_iter().map(|f| (f.kind(), f)).collect(),
            enricher,
            progress,
            fetch_config,
            store,
        }
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Supplement => self.enricher.is_some(),
            _ => self.fetchers.contains_key(&kind),
        }
    }

    /// Execute one admitted run. The progress slot must already be held
    /// for `kind`; it is released before this returns.
    pub async fn run(&self, kind: SourceKind, cancel: &CancellationToken) {
        match kind {
            SourceKind::Supplement => self.run_supplement(cancel, None).await,
            _ => {
                let Some(fetcher) = self.fetchers.get(&kind) else {
                    self.progress.finish(kind, RunStatus::Error, format!("no sources for {kind}"));
                    return;
                };
                let ctx = FetchContext::new(cancel.clone(), self.fetch_config.clone(), self.store.clone());
                let summary = fetcher.run(&ctx).await;

                if kind == SourceKind::Papers
                    && self.fetch_config.fetch_supplement
                    && summary.status == RunStatus::Ok
                    && self.enricher.is_some()
                {
                    match self.progress.try_begin(SourceKind::Supplement) {
                        Ok(_) => {
                            self.run_supplement(cancel, Some(self.fetch_config.days_back))
                                .await
                        }
                        Err(_) => info!("Progress slot taken, skipping follow-up enrichment"),
                    }
                }
            }
        }
    }

    async fn run_supplement(&self, cancel: &CancellationToken, recent_days: Option<u32>) {
        let kind = SourceKind::Supplement;
        let Some(enricher) = &self.enricher else {
            self.progress.finish(kind, RunStatus::Error, "enrichment not configured");
            return;
        };
        let started = Instant::now();
        record_run_started(kind.as_str());
        let summary = enricher.run_pass(cancel, &self.progress, recent_days).await;
        let status = if summary.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Ok
        };
        record_run(kind.as_str(), status.as_str(), started.elapsed().as_secs_f64());
    }
}

struct RunHandle {
    id: u64,
    cancel: CancellationToken,
    /// Cancelled once the run's task has ended
    done: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    pipeline: Pipeline,
    progress: Arc<ProgressHub>,
    runs: Mutex<HashMap<SourceKind, RunHandle>>,
    next_run: AtomicU64,
    shutdown: CancellationToken,
    cron: tokio::sync::Mutex<Option<JobScheduler>>,
}

impl Inner {
    fn runs(&self) -> MutexGuard<'_, HashMap<SourceKind, RunHandle>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The live run serving `kind`. A chained enrichment stays registered
    /// under its papers run while the progress slot reports it as its own
    /// kind, so a lookup by the reported kind resolves to the parent run.
    fn live_run<'a>(
        &self,
        runs: &'a HashMap<SourceKind, RunHandle>,
        kind: SourceKind,
    ) -> Option<&'a RunHandle> {
        runs.get(&kind).or_else(|| {
            let snapshot = self.progress.snapshot();
            if snapshot.running && snapshot.kind == Some(kind) {
                runs.values().next()
            } else {
                None
            }
        })
    }
}

/// Deregisters a run when its task ends, and releases the progress
/// slot if the task was aborted or panicked before the run finished
struct RunGuard {
    inner: Arc<Inner>,
    kind: SourceKind,
    id: u64,
    done: CancellationToken,
    completed: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.completed {
            let snapshot = self.inner.progress.snapshot();
            if let Some(kind) = snapshot.kind.filter(|_| snapshot.running) {
                let status = if self.inner.shutdown.is_cancelled() {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Error
                };
                self.inner
                    .progress
                    .finish(kind, status, format!("{} run aborted", self.kind));
            }
        }
        {
            let mut runs = self.inner.runs();
            if runs.get(&self.kind).is_some_and(|run| run.id == self.id) {
                runs.remove(&self.kind);
            }
        }
        self.done.cancel();
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, progress: Arc<ProgressHub>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                progress,
                runs: Mutex::new(HashMap::new()),
                next_run: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                cron: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressHub> {
        &self.inner.progress
    }

    /// Start a run of `kind` now, unless any run is in flight
    pub fn trigger_now(&self, kind: SourceKind) -> Result<ProgressSnapshot, TriggerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TriggerError::ShuttingDown);
        }
        if !self.inner.pipeline.supports(kind) {
            return Err(TriggerError::NotConfigured(kind));
        }
        let snapshot = self
            .inner
            .progress
            .try_begin(kind)
            .map_err(TriggerError::AlreadyRunning)?;

        let id = self.inner.next_run.fetch_add(1, Ordering::Relaxed);
        let cancel = self.inner.shutdown.child_token();
        let token = cancel.clone();
        let done = CancellationToken::new();
        let guard = RunGuard {
            inner: self.inner.clone(),
            kind,
            id,
            done: done.clone(),
            completed: false,
        };

        // Held across spawn so the task cannot deregister before it is registered
        let mut runs = self.inner.runs();
        let task = tokio::spawn(async move {
            let mut guard = guard;
            guard.inner.pipeline.run(kind, &token).await;
            guard.completed = true;
        });
        runs.insert(kind, RunHandle { id, cancel, done, task });
        info!(%kind, "Run started");
        Ok(snapshot)
    }

    /// Signal the run of `kind` to stop. Returns false when none is live.
    pub fn cancel(&self, kind: SourceKind) -> bool {
        let runs = self.inner.runs();
        match self.inner.live_run(&runs, kind) {
            Some(handle) => {
                info!(%kind, "Cancelling run");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, kind: SourceKind) -> bool {
        let runs = self.inner.runs();
        self.inner.live_run(&runs, kind).is_some()
    }

    /// Wait for the live run of `kind`, if any, to finish. The run stays
    /// registered, and so cancellable, until its task ends.
    pub async fn join(&self, kind: SourceKind) {
        let done = {
            let runs = self.inner.runs();
            self.inner.live_run(&runs, kind).map(|run| run.done.clone())
        };
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Register one cron job per configured kind and start firing them
    pub async fn start(&self, crons: &BTreeMap<SourceKind, String>) -> Result<(), AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::config(format!("failed to create job scheduler: {e}")))?;

        for (kind, spec) in crons {
            let kind = *kind;
            let cron = cron_with_seconds(spec)?;
            let this = self.clone();
            let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
                let this = this.clone();
                Box::pin(async move {
                    this.fire(kind);
                })
            })
            .map_err(|e| AppError::config(format!("invalid cron '{spec}' for {kind}: {e}")))?;
            scheduler
                .add(job)
                .await
                .map_err(|e| AppError::config(format!("failed to register {kind} job: {e}")))?;
            info!(%kind, cron = %spec, "Scheduled");
        }

        scheduler
            .start()
            .await
            .map_err(|e| AppError::config(format!("failed to start job scheduler: {e}")))?;
        *self.inner.cron.lock().await = Some(scheduler);
        Ok(())
    }

    fn fire(&self, kind: SourceKind) {
        match self.trigger_now(kind) {
            Ok(_) => info!(%kind, "Cron run admitted"),
            Err(TriggerError::AlreadyRunning(snapshot)) => info!(
                %kind,
                running = ?snapshot.kind,
                "Cron fire skipped, a run is in progress"
            ),
            Err(e) => warn!(%kind, error = %e, "Cron fire rejected"),
        }
    }

    /// Stop cron fires, cancel live runs and wait up to `grace` for them
    pub async fn shutdown(&self, grace: Duration) {
        info!("Scheduler shutting down");
        self.inner.shutdown.cancel();

        if let Some(mut scheduler) = self.inner.cron.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "Job scheduler shutdown failed");
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.inner.runs().drain().map(|(_, run)| run.task).collect();
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        if tokio::time::timeout(grace, join_all(tasks)).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "Runs did not stop within grace period, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}
