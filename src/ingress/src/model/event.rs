//! Timestamped event records.
//!
//! An event carries two logical times: the sync time (when it takes effect in
//! the ordered output) and the other time, which encodes the event's shape via
//! reserved sentinels — an interval end, infinity for a start edge, the
//! original start for an end-edge retraction, or the punctuation marker.

use crate::error::IngressError;

/// Sync time sentinel for "the end of time".
pub const INFINITY_SYNC_TIME: i64 = i64::MAX;
/// The smallest representable sync time; the initial current-time boundary.
pub const MIN_SYNC_TIME: i64 = i64::MIN;
/// Other-time sentinel marking a punctuation or low-watermark row.
pub const PUNCTUATION_OTHER_TIME: i64 = i64::MIN;

/// The shape of an event, derived from its sentinel encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A payload active over `[sync_time, other_time)`.
    Interval,
    /// A payload that becomes active at `sync_time` with an open end.
    StartEdge,
    /// Retraction closing a start edge; `other_time` is the original start.
    EndEdge,
    /// Assertion that no more data arrives at or before `sync_time`.
    Punctuation,
    /// A punctuation bounding every partition jointly.
    LowWatermark,
}

/// A single timestamped record flowing through the ingress layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent<P> {
    pub sync_time: i64,
    pub other_time: i64,
    pub payload: Option<P>,
}

impl<P> StreamEvent<P> {
    /// A payload active over the half-open interval `[start, end)`.
    pub fn interval(start: i64, end: i64, payload: P) -> Result<Self, IngressError> {
        if start > end {
            return Err(IngressError::InvalidInterval { start, end });
        }
        Ok(Self {
            sync_time: start,
            other_time: end,
            payload: Some(payload),
        })
    }

    /// A payload starting at `start` with an open (infinite) end.
    pub fn start_edge(start: i64, payload: P) -> Self {
        Self {
            sync_time: start,
            other_time: INFINITY_SYNC_TIME,
            payload: Some(payload),
        }
    }

    /// An end edge at `end` retracting the start edge issued at
    /// `original_start`.
    pub fn end_edge(end: i64, original_start: i64, payload: P) -> Result<Self, IngressError> {
        if original_start >= end {
            return Err(IngressError::InvalidInterval {
                start: original_start,
                end,
            });
        }
        Ok(Self {
            sync_time: end,
            other_time: original_start,
            payload: Some(payload),
        })
    }

    /// A punctuation asserting no more data at or before `time`.
    pub fn punctuation(time: i64) -> Self {
        Self {
            sync_time: time,
            other_time: PUNCTUATION_OTHER_TIME,
            payload: None,
        }
    }

    /// The shape encoded by this event's times and payload.
    pub fn kind(&self) -> EventKind {
        if self.payload.is_none() {
            return EventKind::Punctuation;
        }
        if self.other_time == INFINITY_SYNC_TIME {
            EventKind::StartEdge
        } else if self.other_time < self.sync_time {
            EventKind::EndEdge
        } else {
            EventKind::Interval
        }
    }

    /// Whether this event carries a payload (interval or edge).
    pub fn is_data(&self) -> bool {
        self.payload.is_some()
    }
}

/// Routing target for a partitioned event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionTarget<K> {
    /// A single partition.
    Key(K),
    /// Every partition jointly (low watermarks only).
    All,
}

/// A partitioned event: an unpartitioned record plus its routing target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedStreamEvent<K, P> {
    pub target: PartitionTarget<K>,
    pub event: StreamEvent<P>,
}

impl<K, P> PartitionedStreamEvent<K, P> {
    pub fn data(key: K, event: StreamEvent<P>) -> Self {
        Self {
            target: PartitionTarget::Key(key),
            event,
        }
    }

    /// A punctuation scoped to a single partition.
    pub fn punctuation(key: K, time: i64) -> Self {
        Self {
            target: PartitionTarget::Key(key),
            event: StreamEvent::punctuation(time),
        }
    }

    /// A low watermark bounding all partitions.
    pub fn low_watermark(time: i64) -> Self {
        Self {
            target: PartitionTarget::All,
            event: StreamEvent::punctuation(time),
        }
    }

    pub fn kind(&self) -> EventKind {
        match (&self.target, self.event.kind()) {
            (PartitionTarget::All, _) => EventKind::LowWatermark,
            (PartitionTarget::Key(_), kind) => kind,
        }
    }

    pub fn sync_time(&self) -> i64 {
        self.event.sync_time
    }
}
