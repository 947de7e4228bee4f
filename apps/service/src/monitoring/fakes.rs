//! In-process probers for exercising the engine without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use super::prober::Prober;
use super::types::Observation;

/// Answers immediately with a 200
#[derive(Default)]
pub struct InstantProber {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Prober for InstantProber {
    async fn probe(&self, url: &str) -> Observation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Observation::new(url).response(200, Some(0), Duration::ZERO)
    }
}

/// Takes `delay` per probe and records how many probes overlap
pub struct SlowProber {
    delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl SlowProber {
    pub fn new(delay: Duration) -> Self {
        Self { delay, in_flight: AtomicUsize::new(0), max_in_flight: AtomicUsize::new(0) }
    }
}

#[async_trait::async_trait]
impl Prober for SlowProber {
    async fn probe(&self, url: &str) -> Observation {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let observation = Observation::new(url);
        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        observation.response(200, None, self.delay)
    }
}

/// Signals `started` and then holds the probe until `release` is notified
#[derive(Default)]
pub struct GateProber {
    pub started: Notify,
    pub release: Notify,
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Prober for GateProber {
    async fn probe(&self, url: &str) -> Observation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Observation::new(url).response(204, None, Duration::ZERO)
    }
}
