//! Processor adapters over tokio broadcast channels.
//!
//! The pipes themselves are synchronous; a processor wraps one so it can sit
//! in a channel-connected pipeline: data and control fan in over broadcast
//! receivers, sealed batches and lifecycle signals fan out on the output
//! channel.

pub mod base;
pub mod ingress_processor;

pub use base::{
    fan_in_streams, log_broadcast_lagged, send_with_backpressure, ProcessorError,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use ingress_processor::{IngressControl, IngressOutput, IngressProcessor};
