use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::info;

use super::job::ProbeJob;
use super::prober::Prober;
use super::types::JobSnapshot;
use crate::error::JobError;
use crate::pipeline::ObservationSender;
use crate::validation::{validate_http_endpoint, validate_period};

/// Hands out job ids: wall-clock nanoseconds, forced strictly increasing
#[derive(Debug, Default)]
struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    fn next(&self) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64;

        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return candidate.to_string(),
                Err(actual) => last = actual,
            }
        }
    }
}

/// Registry of all probe jobs
///
/// Reads (`list`, `get`) share the lock; `create` and `delete` take it
/// exclusively. Per-job state changes (`stop`, `restart`) go through the
/// job's own lock.
pub struct JobRegistry {
    jobs: RwLock<BTreeMap<String, Arc<ProbeJob>>>,
    prober: Arc<dyn Prober>,
    output: ObservationSender,
    runtime: Handle,
    ids: IdGenerator,
}

impl JobRegistry {
    /// Every job probes with `prober`, reports to `output` and ticks on `runtime`
    pub fn new(prober: Arc<dyn Prober>, output: ObservationSender, runtime: Handle) -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            prober,
            output,
            runtime,
            ids: IdGenerator::default(),
        }
    }

    /// Register and start a new job
    pub async fn create(&self, url: &str, period: Duration) -> Result<JobSnapshot, JobError> {
        validate_http_endpoint(url).to_result()?;
        validate_period(period).to_result()?;

        let id = self.ids.next();
        let job = Arc::new(ProbeJob::new(id.clone(), self.prober.clone(), self.runtime.clone()));

        let mut jobs = self.jobs.write().await;
        job.start(self.output.clone(), period, url.to_string()).await?;
        let snapshot = job.snapshot().await;
        jobs.insert(id, job);

        Ok(snapshot)
    }

    /// Snapshot of every job, in creation order
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.read().await;
        let mut snapshots = Vec::with_capacity(jobs.len());
        for job in jobs.values() {
            snapshots.push(job.snapshot().await);
        }
        snapshots
    }

    pub async fn get(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let job = self.lookup(id).await?;
        Ok(job.snapshot().await)
    }

    /// The read guard is held until the job is stopped, so a concurrent
    /// `delete` waits for it
    pub async fn stop(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let jobs = self.jobs.read().await;
        let job = Self::find(&jobs, id)?;
        job.stop().await;
        Ok(job.snapshot().await)
    }

    /// Start the job again with its stored url and period, keeping its id
    pub async fn restart(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let jobs = self.jobs.read().await;
        let job = Self::find(&jobs, id)?;
        job.restart(self.output.clone(), None, None).await?;
        Ok(job.snapshot().await)
    }

    /// Remove the job and stop it for good, returning its last snapshot
    pub async fn delete(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.remove(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let snapshot = job.retire().await;
        drop(jobs);

        info!(job = %id, "probe job deleted");
        Ok(snapshot)
    }

    /// Stop every job and wait for in-flight probes to report
    pub async fn shutdown(&self) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.write().await);
        let count = jobs.len();

        for job in jobs.values() {
            job.shutdown().await;
        }

        info!(jobs = count, "job registry shut down");
        count
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn lookup(&self, id: &str) -> Result<Arc<ProbeJob>, JobError> {
        Self::find(&*self.jobs.read().await, id).cloned()
    }

    fn find<'a>(jobs: &'a BTreeMap<String, Arc<ProbeJob>>, id: &str) -> Result<&'a Arc<ProbeJob>, JobError> {
        jobs.get(id).ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}
