//! Ingress policy configuration.
//!
//! Every pipe is constructed from an immutable [`IngressConfig`]; there is no
//! process-wide mutable configuration. Policies are validated once at
//! construction and never change for the lifetime of a subscription.

use crate::error::IngressError;
use serde::{Deserialize, Serialize};

/// Default number of rows per pooled event batch.
pub const DEFAULT_BATCH_SIZE: usize = 80_000;

/// What to do with a data event whose sync time regresses behind the
/// current-time boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisorderPolicy {
    /// Fail the subscription with an out-of-order error.
    Throw,
    /// Discard the event and report it on the diagnostic sink.
    Drop { reorder_latency: i64 },
    /// Shift the event forward to the current time and report the delta.
    Adjust { reorder_latency: i64 },
}

impl DisorderPolicy {
    /// How far the high watermark may run ahead of the drain frontier.
    ///
    /// `Throw` admits no slack: each event must already be in order.
    pub fn reorder_latency(&self) -> i64 {
        match self {
            DisorderPolicy::Throw => 0,
            DisorderPolicy::Drop { reorder_latency } => *reorder_latency,
            DisorderPolicy::Adjust { reorder_latency } => *reorder_latency,
        }
    }
}

/// When a sealed batch is pushed downstream ahead of reaching capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush whenever a punctuation is appended.
    OnPunctuation,
    /// Only flush when the batch fills.
    OnBatchBoundary,
    /// Flush whenever the global low watermark advances (partitioned only).
    OnLowWatermark,
}

/// Synthesized punctuation cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunctuationPolicy {
    /// No synthesized punctuations; only explicit ones pass through.
    None,
    /// One punctuation per left-aligned period boundary crossed by the data.
    Time { period: i64 },
    /// One punctuation every `n` appended data events.
    Count { n: u64 },
}

/// Synthesized low-watermark cadence (partitioned only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowWatermarkPolicy {
    None,
    /// Generate a low watermark at `min(partition high watermarks) - lag`,
    /// quantized to `period` boundaries.
    Time { period: i64, lag: i64 },
}

/// What `on_completed` does before propagating completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnCompletedPolicy {
    /// Drain the reorder buffer unbounded; leave the partial batch unsealed.
    None,
    /// Drain up to the current time and force a final flush.
    Flush,
    /// Drain unbounded, append an infinity punctuation, then flush.
    EndOfStream,
}

/// Which reorder buffer implementation backs a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortTechnique {
    /// Fiber-based multi-way merge; near-O(1) insert for near-ordered input.
    ImpatienceSort,
    /// Binary min-heap keyed by sync time.
    PriorityQueue,
}

/// Immutable per-subscription configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub disorder: DisorderPolicy,
    pub flush: FlushPolicy,
    pub punctuation: PunctuationPolicy,
    pub low_watermark: LowWatermarkPolicy,
    pub on_completed: OnCompletedPolicy,
    pub sort_technique: SortTechnique,
    pub batch_size: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            disorder: DisorderPolicy::Throw,
            flush: FlushPolicy::OnPunctuation,
            punctuation: PunctuationPolicy::None,
            low_watermark: LowWatermarkPolicy::None,
            on_completed: OnCompletedPolicy::EndOfStream,
            sort_technique: SortTechnique::ImpatienceSort,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngressConfig {
    /// Validate the parts of the configuration shared by every pipe kind.
    ///
    /// Partition-dependent rules are checked by the pipe constructors, since
    /// only they know whether a partition key is present.
    pub fn validate(&self) -> Result<(), IngressError> {
        if self.batch_size == 0 {
            return Err(IngressError::PolicyMisconfiguration(
                "batch size must be greater than zero".into(),
            ));
        }
        if let DisorderPolicy::Drop { reorder_latency } | DisorderPolicy::Adjust { reorder_latency } =
            self.disorder
        {
            if reorder_latency < 0 {
                return Err(IngressError::PolicyMisconfiguration(
                    "reorder latency must be non-negative".into(),
                ));
            }
        }
        if let PunctuationPolicy::Time { period } = self.punctuation {
            if period <= 0 {
                return Err(IngressError::PolicyMisconfiguration(
                    "punctuation period must be positive".into(),
                ));
            }
        }
        if let PunctuationPolicy::Count { n } = self.punctuation {
            if n == 0 {
                return Err(IngressError::PolicyMisconfiguration(
                    "punctuation count must be positive".into(),
                ));
            }
        }
        if let LowWatermarkPolicy::Time { period, lag } = self.low_watermark {
            if period <= 0 {
                return Err(IngressError::PolicyMisconfiguration(
                    "low watermark period must be positive".into(),
                ));
            }
            if lag < 0 {
                return Err(IngressError::PolicyMisconfiguration(
                    "low watermark lag must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}
