//! Channel plumbing shared by processors.

use futures::stream::SelectAll;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity used for data and control channels alike.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Error type for processor operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessorError {
    #[error("channel closed unexpectedly")]
    ChannelClosed,
    #[error("processing error: {0}")]
    Processing(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Merge several broadcast receivers into a single stream of items.
pub fn fan_in_streams<T: Clone + Send + 'static>(
    receivers: Vec<broadcast::Receiver<T>>,
) -> SelectAll<BroadcastStream<T>> {
    let mut streams = SelectAll::new();
    for receiver in receivers {
        streams.push(BroadcastStream::new(receiver));
    }
    streams
}

/// Send to a broadcast channel, waiting while it is saturated so slow
/// receivers are not forced to lag.
pub async fn send_with_backpressure<T>(
    sender: &broadcast::Sender<T>,
    item: T,
) -> Result<(), ProcessorError> {
    while sender.len() >= DEFAULT_CHANNEL_CAPACITY {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    sender.send(item).map_err(|_| ProcessorError::ChannelClosed)?;
    Ok(())
}

pub fn log_broadcast_lagged(id: &str, skipped: u64, context: &str) {
    tracing::warn!(
        processor_id = %id,
        skipped,
        context,
        "broadcast receiver lagged; items were skipped"
    );
}
