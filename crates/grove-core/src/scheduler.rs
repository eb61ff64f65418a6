//! In-process sync scheduler.
//!
//! Every `interval` a sweep enqueues one [`SyncJob`] per active integration.
//! A dispatcher drains the queue, throttled by a [`SyncBudget`], and runs each
//! job as its own task with a small retry policy. The OAuth callback pushes
//! jobs onto the same queue through a [`SchedulerHandle`].

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use grove_auth::Provider;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::intake::SyncOutcome;
use crate::{Grove, Result};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to sweep active integrations (default: 1 hour).
    pub interval: Duration,

    /// Maximum jobs started per budget window.
    pub jobs_per_window: u32,

    /// Length of the budget window (default: 1 minute).
    pub budget_window: Duration,

    pub retry: RetryPolicy,

    /// Whether the periodic sweep runs. Enqueued jobs are processed either way.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            jobs_per_window: 100,
            budget_window: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): 1s, 2s, 4s with the defaults.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub user_id: String,
    pub provider: Provider,
    pub scheduled_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(user_id: &str, provider: Provider) -> Self {
        Self {
            user_id: user_id.to_string(),
            provider,
            scheduled_at: Utc::now(),
        }
    }
}

/// Counts job starts in a fixed window.
#[derive(Debug)]
pub struct SyncBudget {
    limit: u32,
    window: Duration,
    window_start: Instant,
    used: u32,
}

impl SyncBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_start: Instant::now(),
            used: 0,
        }
    }

    pub fn record(&mut self, count: u32) {
        self.maybe_reset(Instant::now());
        self.used = self.used.saturating_add(count);
    }

    pub fn has_budget(&mut self) -> bool {
        self.maybe_reset(Instant::now());
        self.used < self.limit
    }

    pub fn remaining(&mut self) -> u32 {
        self.maybe_reset(Instant::now());
        self.limit.saturating_sub(self.used)
    }

    pub fn time_until_reset(&self) -> Duration {
        self.window.saturating_sub(self.window_start.elapsed())
    }

    fn maybe_reset(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.used = 0;
            self.window_start = now;
        }
    }
}

/// Sender side of the job queue.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SyncJob>,
}

impl SchedulerHandle {
    /// Queue a sync to run as soon as the budget allows. Returns `false` once
    /// the dispatcher has stopped.
    pub fn enqueue(&self, user_id: &str, provider: Provider) -> bool {
        self.tx.send(SyncJob::new(user_id, provider)).is_ok()
    }
}

impl Grove {
    /// One job per active integration.
    pub async fn sweep(&self) -> Result<Vec<SyncJob>> {
        let jobs: Vec<SyncJob> = self
            .store
            .list_active_integrations()
            .await?
            .into_iter()
            .map(|(user_id, provider)| SyncJob::new(&user_id, provider))
            .collect();
        Ok(jobs)
    }
}

pub struct SyncScheduler {
    grove: Grove,
    config: SchedulerConfig,
}

impl SyncScheduler {
    pub fn new(grove: Grove, config: SchedulerConfig) -> Self {
        Self { grove, config }
    }

    /// Start the sweep and dispatch loops on the current runtime.
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle { tx };

        if self.config.enabled {
            tokio::spawn(sweep_loop(
                self.grove.clone(),
                self.config.interval,
                handle.clone(),
            ));
        } else {
            info!("[SCHEDULER] periodic sweep disabled");
        }

        let task = tokio::spawn(dispatch_loop(self.grove, self.config, rx));
        (handle, task)
    }
}

async fn sweep_loop(grove: Grove, every: Duration, handle: SchedulerHandle) {
    let mut ticker = interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match grove.sweep().await {
            Ok(jobs) => {
                info!("[SCHEDULER] sweep queued {} syncs", jobs.len());
                for job in jobs {
                    if handle.tx.send(job).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!("[SCHEDULER] sweep failed: {}", e),
        }
    }
}

async fn dispatch_loop(
    grove: Grove,
    config: SchedulerConfig,
    mut rx: mpsc::UnboundedReceiver<SyncJob>,
) {
    let mut budget = SyncBudget::new(config.jobs_per_window, config.budget_window);

    while let Some(job) = rx.recv().await {
        while !budget.has_budget() {
            let wait = budget.time_until_reset();
            debug!("[SCHEDULER] budget exhausted, waiting {:?}", wait);
            sleep(wait).await;
        }
        budget.record(1);

        let grove = grove.clone();
        let retry = config.retry.clone();
        tokio::spawn(async move {
            if let Err(e) = run_job(&grove, &job, &retry).await {
                debug!(user = %job.user_id, provider = %job.provider, "[SCHEDULER] job gave up: {}", e);
            }
        });
    }
    debug!("[SCHEDULER] queue closed");
}

/// Run one job, retrying failures that another attempt might fix.
pub async fn run_job(grove: &Grove, job: &SyncJob, retry: &RetryPolicy) -> Result<SyncOutcome> {
    let mut attempt = 0;
    loop {
        match grove.sync_integration(&job.user_id, job.provider).await {
            Ok(outcome) => {
                info!(
                    "[SCHEDULER] synced {} for {} ({} records)",
                    job.provider, job.user_id, outcome.records_processed
                );
                return Ok(outcome);
            }
            Err(e) if e.is_terminal() => {
                info!("[SCHEDULER] skipping {} for {}: {}", job.provider, job.user_id, e);
                return Err(e);
            }
            Err(e) if attempt < retry.max_retries => {
                let delay = retry.delay(attempt);
                warn!(
                    "[SCHEDULER] {} sync for {} failed (attempt {}), retrying in {:?}: {}",
                    job.provider,
                    job.user_id,
                    attempt + 1,
                    delay,
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    "[SCHEDULER] giving up on {} sync for {}: {}",
                    job.provider, job.user_id, e
                );
                return Err(e);
            }
        }
    }
}
