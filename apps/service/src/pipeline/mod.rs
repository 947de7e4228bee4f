//! Persistence pipeline: probe jobs → observation channel → sink pump → store.

pub mod channel;
pub mod pump;

pub use channel::{ChannelClosed, ChannelPolicy, ObservationReceiver, ObservationSender, channel};
pub use pump::{FailurePolicy, PumpError, PumpStats, SinkPump};
