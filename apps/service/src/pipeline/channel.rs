//! Buffer between probe jobs and the sink pump.
//!
//! All running jobs share one [`ObservationSender`]; the pump owns the only
//! [`ObservationReceiver`]. What happens when the pump falls behind is
//! decided by [`ChannelPolicy`]:
//!
//! - `unbounded`: producers never wait, memory grows instead
//! - `block:<n>`: a full buffer makes the producing job wait
//! - `drop-oldest:<n>`: a full buffer discards its oldest observation

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::monitoring::Observation;

/// Bound and overflow behaviour of the observation channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelPolicy {
    #[default]
    Unbounded,
    Block(usize),
    DropOldest(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid channel policy '{0}', expected unbounded, block:<n> or drop-oldest:<n>")]
pub struct ParsePolicyError(String);

impl FromStr for ChannelPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(Self::Unbounded);
        }

        let err = || ParsePolicyError(s.to_string());
        let (kind, capacity) = s.split_once(':').ok_or_else(err)?;
        let capacity: usize = capacity.trim().parse().map_err(|_| err())?;
        if capacity == 0 {
            return Err(err());
        }

        match kind.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block(capacity)),
            "drop-oldest" => Ok(Self::DropOldest(capacity)),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for ChannelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Block(n) => write!(f, "block:{n}"),
            Self::DropOldest(n) => write!(f, "drop-oldest:{n}"),
        }
    }
}

/// The pump is gone, nothing will read further observations
#[derive(Debug, Error, PartialEq, Eq)]
#[error("observation channel closed")]
pub struct ChannelClosed;

/// Create the shared observation channel
pub fn channel(policy: ChannelPolicy) -> (ObservationSender, ObservationReceiver) {
    let (tx, rx) = match policy {
        ChannelPolicy::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (SenderInner::Unbounded(tx), ReceiverInner::Unbounded(rx))
        }
        ChannelPolicy::Block(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (SenderInner::Block(tx), ReceiverInner::Block(rx))
        }
        // A lagging broadcast receiver loses the oldest values first
        ChannelPolicy::DropOldest(capacity) => {
            let (tx, rx) = broadcast::channel(capacity);
            (SenderInner::DropOldest(tx), ReceiverInner::DropOldest(rx))
        }
    };

    (
        ObservationSender { inner: tx },
        ObservationReceiver { inner: rx, dropped: Arc::new(AtomicU64::new(0)) },
    )
}

#[derive(Debug, Clone)]
enum SenderInner {
    Unbounded(mpsc::UnboundedSender<Observation>),
    Block(mpsc::Sender<Observation>),
    DropOldest(broadcast::Sender<Observation>),
}

/// Producer half, cloned into every probe job
#[derive(Debug, Clone)]
pub struct ObservationSender {
    inner: SenderInner,
}

impl ObservationSender {
    /// Hand an observation to the pump
    ///
    /// Only waits under the `block` policy when the buffer is full.
    pub async fn send(&self, observation: Observation) -> Result<(), ChannelClosed> {
        match &self.inner {
            SenderInner::Unbounded(tx) => tx.send(observation).map_err(|_| ChannelClosed),
            SenderInner::Block(tx) => tx.send(observation).await.map_err(|_| ChannelClosed),
            SenderInner::DropOldest(tx) => tx.send(observation).map(|_| ()).map_err(|_| ChannelClosed),
        }
    }
}

#[derive(Debug)]
enum ReceiverInner {
    Unbounded(mpsc::UnboundedReceiver<Observation>),
    Block(mpsc::Receiver<Observation>),
    DropOldest(broadcast::Receiver<Observation>),
}

/// Consumer half, owned by the sink pump
#[derive(Debug)]
pub struct ObservationReceiver {
    inner: ReceiverInner,
    dropped: Arc<AtomicU64>,
}

impl ObservationReceiver {
    /// Wait for the next observation, `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Observation> {
        match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.recv().await,
            ReceiverInner::Block(rx) => rx.recv().await,
            ReceiverInner::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(observation) => return Some(observation),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.dropped.fetch_add(skipped, Ordering::Relaxed);
                        warn!(skipped, "observation buffer overflowed, oldest entries dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Take an already buffered observation without waiting
    pub fn try_recv(&mut self) -> Option<Observation> {
        match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.try_recv().ok(),
            ReceiverInner::Block(rx) => rx.try_recv().ok(),
            ReceiverInner::DropOldest(rx) => loop {
                match rx.try_recv() {
                    Ok(observation) => return Some(observation),
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        self.dropped.fetch_add(skipped, Ordering::Relaxed);
                    }
                    Err(_) => return None,
                }
            },
        }
    }

    /// Observations discarded by the `drop-oldest` policy so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}
