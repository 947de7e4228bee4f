//! Pinger service - periodic HTTP probe jobs
//!
//! The service keeps a registry of probe jobs. Every running job ticks on
//! its own task, probes its URL and pushes the resulting [`Observation`]
//! onto one shared channel. A single pump drains that channel into the
//! observation store, which the query facade reads back.

pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod pipeline;
pub mod pool;
pub mod validation;

pub use config::Config;
pub use database::{LibsqlStore, ObservationFilter, ObservationStore, PingSearch, SearchParams};
pub use error::JobError;
pub use monitoring::{HttpProber, JobRegistry, JobSnapshot, JobStatus, Observation, Prober};
pub use pipeline::{ChannelPolicy, FailurePolicy, ObservationSender, PumpStats, SinkPump};
