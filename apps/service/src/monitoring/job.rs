use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prober::Prober;
use super::types::{JobSnapshot, JobStatus, format_period};
use crate::error::JobError;
use crate::pipeline::ObservationSender;
use crate::validation::validate_period;

/// The ticker currently driving a job
struct Timer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct JobState {
    url: String,
    period: Duration,
    status: JobStatus,
    timer: Option<Timer>,
    /// Stopped ticker that may still be finishing its last probe
    draining: Option<JoinHandle<()>>,
    /// Removed from the registry, never starts again
    retired: bool,
}

/// A periodic probe against one URL
///
/// Status and timer live behind the same lock, so `running` is never
/// visible without a live ticker and vice versa.
pub struct ProbeJob {
    id: String,
    prober: Arc<dyn Prober>,
    runtime: Handle,
    state: Mutex<JobState>,
}

impl ProbeJob {
    /// Create a stopped job; tickers are spawned on `runtime`
    pub fn new(id: impl Into<String>, prober: Arc<dyn Prober>, runtime: Handle) -> Self {
        Self {
            id: id.into(),
            prober,
            runtime,
            state: Mutex::new(JobState {
                url: String::new(),
                period: Duration::ZERO,
                status: JobStatus::Stopped,
                timer: None,
                draining: None,
                retired: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start probing `url` every `period`, replacing any running ticker
    pub async fn start(
        &self,
        output: ObservationSender,
        period: Duration,
        url: String,
    ) -> Result<(), JobError> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state, output, period, url)
    }

    /// Stop then start again, keeping the stored url/period unless new ones are given
    pub async fn restart(
        &self,
        output: ObservationSender,
        period: Option<Duration>,
        url: Option<String>,
    ) -> Result<(), JobError> {
        let mut state = self.state.lock().await;
        let period = period.unwrap_or(state.period);
        let url = url.unwrap_or_else(|| state.url.clone());
        self.start_locked(&mut state, output, period, url)
    }

    /// Suppress future ticks; a probe already in flight still reports
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = Self::halt(&mut state) {
            info!(job = %self.id, url = %state.url, "probe job stopped");
            state.draining = Some(timer.handle);
        }
    }

    /// Stop for good: any later `start` or `restart` reports `NotFound`
    pub(crate) async fn retire(&self) -> JobSnapshot {
        let mut state = self.state.lock().await;
        if let Some(timer) = Self::halt(&mut state) {
            state.draining = Some(timer.handle);
        }
        state.retired = true;
        self.snapshot_locked(&state)
    }

    /// Stop and wait for the ticker to finish its current probe
    pub(crate) async fn shutdown(&self) {
        let handle = {
            let mut state = self.state.lock().await;
            Self::take_ticker(&mut state)
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(job = %self.id, error = %e, "probe ticker ended abnormally");
            }
        }
    }

    pub async fn status(&self) -> JobStatus {
        self.state.lock().await.status
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock().await;
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &JobState) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            url: state.url.clone(),
            period: format_period(state.period),
            status: state.status,
        }
    }

    fn start_locked(
        &self,
        state: &mut JobState,
        output: ObservationSender,
        period: Duration,
        url: String,
    ) -> Result<(), JobError> {
        if state.retired {
            return Err(JobError::NotFound(self.id.clone()));
        }
        validate_period(period).to_result()?;

        let previous = Self::take_ticker(state);
        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn(run_ticker(
            self.id.clone(),
            self.prober.clone(),
            output,
            period,
            url.clone(),
            cancel.clone(),
            previous,
        ));

        state.timer = Some(Timer { cancel, handle });
        state.url = url;
        state.period = period;
        state.status = JobStatus::Running;

        info!(job = %self.id, url = %state.url, period = %format_period(period), "probe job started");
        Ok(())
    }

    fn halt(state: &mut JobState) -> Option<Timer> {
        state.status = JobStatus::Stopped;
        let timer = state.timer.take()?;
        timer.cancel.cancel();
        Some(timer)
    }

    /// Halt the running ticker, or pick up one that is still draining
    fn take_ticker(state: &mut JobState) -> Option<JoinHandle<()>> {
        match Self::halt(state) {
            Some(timer) => Some(timer.handle),
            None => state.draining.take(),
        }
    }
}

/// Tick every `period` (first tick one period after start) until cancelled
///
/// The probe is awaited inside the loop, so probes of one job never overlap.
/// Ticks missed while a probe outruns the period are skipped, not queued.
/// A `previous` ticker of the same job is awaited before the first probe.
async fn run_ticker(
    id: String,
    prober: Arc<dyn Prober>,
    output: ObservationSender,
    period: Duration,
    url: String,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            warn!(job = %id, error = %e, "previous ticker ended abnormally");
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        let observation = prober.probe(&url).await;
        if !observation.error.is_empty() {
            debug!(job = %id, url = %url, error = %observation.error, "probe error recorded");
        }

        if output.send(observation).await.is_err() {
            warn!(job = %id, "observation channel closed, ticker exiting");
            break;
        }
    }

    debug!(job = %id, "ticker finished");
}
