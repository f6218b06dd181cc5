//! Shared types for the image-generation dispatch broker.
//!
//! This crate has no I/O of its own: it holds the `Job` record, its status
//! machine, the progress event shape emitted by backend servers, and the
//! process configuration loaded from the environment. Every other crate in
//! the workspace depends on this one rather than redefining these types.

pub mod config;
pub mod job;
pub mod progress;

pub use config::BrokerConfig;
pub use job::{Job, JobStatus, SubmissionRecord};
pub use progress::ProgressEvent;

/// Maximum number of processing attempts before a job is terminally `error`.
///
/// `attempt` starts at 1; the fourth attempt (after three `failed` records)
/// exceeds this and the job is moved to `error` instead of retried.
pub const MAX_ATTEMPTS: u32 = 3;

/// Watchdog threshold: a `processing` job older than this is presumed dead.
pub const WATCHDOG_TIMEOUT_SECS: i64 = 300;

/// Overall wall-clock budget for one `generate` call.
pub const GENERATION_TIMEOUT_SECS: u64 = 180;

/// Health-probe budget used by the fleet view.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Smoothing factor for the exponential moving average of processing time.
pub const AVG_SMOOTHING_ALPHA: f64 = 0.2;
