//! Single writer between the observation channel and the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::channel::ObservationReceiver;
use crate::database::ObservationStore;
use crate::monitoring::Observation;

/// What the pump does when the store rejects a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop pumping and hand the error to whoever owns the pump
    Halt,
    /// Try each write up to `attempts` times, then log and drop it
    Retry { attempts: u32, backoff: Duration },
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Retry { attempts: 3, backoff: Duration::from_millis(500) }
    }
}

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("failed to persist observation for {url}: {reason}")]
    Persistence { url: String, reason: String },
}

/// Running counters of the pump
#[derive(Debug, Default)]
pub struct PumpStats {
    persisted: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl PumpStats {
    /// Observations written to the store
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    /// Observations given up on after exhausting retries
    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    /// Observations discarded by a full `drop-oldest` channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drains the observation channel into the store, one write at a time
pub struct SinkPump {
    receiver: ObservationReceiver,
    store: Arc<dyn ObservationStore>,
    policy: FailurePolicy,
    stats: Arc<PumpStats>,
}

impl SinkPump {
    pub fn new(
        receiver: ObservationReceiver,
        store: Arc<dyn ObservationStore>,
        policy: FailurePolicy,
    ) -> Self {
        let stats = Arc::new(PumpStats {
            dropped: receiver.dropped_counter(),
            ..PumpStats::default()
        });

        Self { receiver, store, policy, stats }
    }

    pub fn stats(&self) -> Arc<PumpStats> {
        self.stats.clone()
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<(), PumpError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Pump until every sender is gone or `shutdown` fires
    ///
    /// On shutdown whatever is already buffered is still written.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), PumpError> {
        info!(policy = ?self.policy, "Sink pump started");

        loop {
            let observation = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(observation) => observation,
                    None => {
                        info!(persisted = self.stats.persisted(), "All producers gone, sink pump finished");
                        return Ok(());
                    }
                },
            };

            self.persist(observation).await?;
        }

        let mut drained = 0u64;
        while let Some(observation) = self.receiver.try_recv() {
            self.persist(observation).await?;
            drained += 1;
        }

        info!(
            drained,
            persisted = self.stats.persisted(),
            dead_lettered = self.stats.dead_lettered(),
            dropped = self.stats.dropped(),
            "Sink pump stopped"
        );
        Ok(())
    }

    async fn persist(&self, observation: Observation) -> Result<(), PumpError> {
        let (attempts, backoff) = match self.policy {
            FailurePolicy::Halt => (1, Duration::ZERO),
            FailurePolicy::Retry { attempts, backoff } => (attempts.max(1), backoff),
        };

        let mut attempt = 1;
        loop {
            match self.store.append(&observation).await {
                Ok(()) => {
                    self.stats.persisted.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(attempt, url = %observation.url, error = %e, "Failed to persist observation, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) if self.policy == FailurePolicy::Halt => {
                    error!(url = %observation.url, error = %e, "Failed to persist observation, halting");
                    return Err(PumpError::Persistence {
                        url: observation.url,
                        reason: format!("{e:#}"),
                    });
                }
                Err(e) => {
                    self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    error!(
                        attempts,
                        url = %observation.url,
                        timestamp = %observation.timestamp,
                        status_code = observation.status_code,
                        error = %e,
                        "Dropping observation after exhausting retries"
                    );
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ObservationFilter;
    use crate::pipeline::{ChannelPolicy, channel};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Mutex;

    /// Keeps observations in memory; the first `failures` appends fail
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<Observation>>,
        failures: AtomicU32,
    }

    impl MemoryStore {
        fn failing(failures: u32) -> Self {
            Self { failures: AtomicU32::new(failures), ..Self::default() }
        }

        async fn urls(&self) -> Vec<String> {
            self.saved.lock().await.iter().map(|o| o.url.clone()).collect()
        }
    }

    #[async_trait]
    impl ObservationStore for MemoryStore {
        async fn append(&self, observation: &Observation) -> anyhow::Result<()> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(anyhow!("database is locked"));
            }
            self.saved.lock().await.push(observation.clone());
            Ok(())
        }

        async fn find(&self, filter: &ObservationFilter) -> anyhow::Result<Vec<Observation>> {
            let saved = self.saved.lock().await;
            Ok(saved.iter().filter(|o| filter.matches(o)).cloned().collect())
        }
    }

    fn obs(n: usize) -> Observation {
        Observation::new(format!("http://example.test/{n}"))
    }

    fn quick_retry(attempts: u32) -> FailurePolicy {
        FailurePolicy::Retry { attempts, backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn test_persists_in_arrival_order() {
        let (tx, rx) = channel(ChannelPolicy::Unbounded);
        let store = Arc::new(MemoryStore::default());
        let pump = SinkPump::new(rx, store.clone(), FailurePolicy::default());
        let stats = pump.stats();

        for n in 0..50 {
            tx.send(obs(n)).await.unwrap();
        }
        drop(tx);

        pump.run(CancellationToken::new()).await.unwrap();

        let expected: Vec<String> = (0..50).map(|n| format!("http://example.test/{n}")).collect();
        assert_eq!(store.urls().await, expected);
        assert_eq!(stats.persisted(), 50);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let (tx, rx) = channel(ChannelPolicy::Unbounded);
        let store = Arc::new(MemoryStore::failing(2));
        let pump = SinkPump::new(rx, store.clone(), quick_retry(3));
        let stats = pump.stats();

        tx.send(obs(0)).await.unwrap();
        drop(tx);
        pump.run(CancellationToken::new()).await.unwrap();

        assert_eq!(store.urls().await, vec!["http://example.test/0".to_string()]);
        assert_eq!(stats.persisted(), 1);
        assert_eq!(stats.dead_lettered(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter_and_continue() {
        let (tx, rx) = channel(ChannelPolicy::Unbounded);
        // Both attempts for the first observation fail, the second goes through
        let store = Arc::new(MemoryStore::failing(2));
        let pump = SinkPump::new(rx, store.clone(), quick_retry(2));
        let stats = pump.stats();

        tx.send(obs(0)).await.unwrap();
        tx.send(obs(1)).await.unwrap();
        drop(tx);
        pump.run(CancellationToken::new()).await.unwrap();

        assert_eq!(store.urls().await, vec!["http://example.test/1".to_string()]);
        assert_eq!(stats.dead_lettered(), 1);
        assert_eq!(stats.persisted(), 1);
    }

    #[tokio::test]
    async fn test_halt_policy_stops_on_first_failure() {
        let (tx, rx) = channel(ChannelPolicy::Unbounded);
        let store = Arc::new(MemoryStore::failing(1));
        let pump = SinkPump::new(rx, store.clone(), FailurePolicy::Halt);

        tx.send(obs(0)).await.unwrap();
        tx.send(obs(1)).await.unwrap();

        let result = pump.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(PumpError::Persistence { ref url, .. }) if url == "http://example.test/0"));
        assert!(store.urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_drains_buffer() {
        let (tx, rx) = channel(ChannelPolicy::Block(16));
        let store = Arc::new(MemoryStore::default());
        let pump = SinkPump::new(rx, store.clone(), FailurePolicy::default());

        for n in 0..5 {
            tx.send(obs(n)).await.unwrap();
        }

        // Sender still alive: only the cancellation ends the pump
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        pump.run(shutdown).await.unwrap();

        assert_eq!(store.urls().await.len(), 5);
        drop(tx);
    }

    #[tokio::test]
    async fn test_spawned_pump_follows_cancellation() {
        let (tx, rx) = channel(ChannelPolicy::Unbounded);
        let store = Arc::new(MemoryStore::default());
        let pump = SinkPump::new(rx, store.clone(), FailurePolicy::default());
        let shutdown = CancellationToken::new();
        let handle = pump.spawn(shutdown.clone());

        tx.send(obs(0)).await.unwrap();
        tx.send(obs(1)).await.unwrap();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
        assert_eq!(store.urls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_oldest_counts_dropped() {
        let (tx, rx) = channel(ChannelPolicy::DropOldest(2));
        let store = Arc::new(MemoryStore::default());
        let pump = SinkPump::new(rx, store.clone(), FailurePolicy::default());
        let stats = pump.stats();

        for n in 0..5 {
            tx.send(obs(n)).await.unwrap();
        }
        drop(tx);
        pump.run(CancellationToken::new()).await.unwrap();

        assert_eq!(
            store.urls().await,
            vec!["http://example.test/3".to_string(), "http://example.test/4".to_string()]
        );
        assert_eq!(stats.dropped(), 3);
        assert_eq!(stats.persisted(), 2);
    }
}
