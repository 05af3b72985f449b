//! Error taxonomy for the ingress layer.

/// Errors surfaced by pipes and their lifecycle.
///
/// Recoverable disorder under the drop/adjust policies never appears here; it
/// is reported on the diagnostic sink only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngressError {
    /// A sync time regressed behind the current-time boundary under the
    /// throw policy, or in a pre-ordered pipe that admits no fallback.
    #[error("out-of-order event: sync time {sync_time} is behind current time {current_time}")]
    OutOfOrder { sync_time: i64, current_time: i64 },
    /// An interval whose start lies after its end.
    #[error("invalid interval: start {start} is after end {end}")]
    InvalidInterval { start: i64, end: i64 },
    /// Rejected at construction; never raised at runtime.
    #[error("policy misconfiguration: {0}")]
    PolicyMisconfiguration(String),
    /// Live data was pushed before `enable` was called.
    #[error("ingress pipe is not enabled")]
    NotEnabled,
    /// `enable` was called twice.
    #[error("ingress pipe is already enabled")]
    AlreadyEnabled,
    /// The pipe was disposed and can no longer accept input.
    #[error("ingress pipe is disposed")]
    Disposed,
}
