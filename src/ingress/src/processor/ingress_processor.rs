//! IngressProcessor - drives an unpartitioned ingress pipe from broadcast
//! channels.

use crate::diagnostics::{DiagnosticSink, NullDiagnostics};
use crate::error::IngressError;
use crate::model::{EventBatch, StreamEvent};
use crate::observer::IngressObserver;
use crate::pipe::IngressPipe;
use crate::policy::IngressConfig;
use crate::processor::base::{
    fan_in_streams, log_broadcast_lagged, send_with_backpressure, ProcessorError,
    DEFAULT_CHANNEL_CAPACITY,
};
use crate::stats::IngressStats;
use futures::stream::StreamExt;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Control signals accepted alongside the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressControl {
    /// Seal and push the current batch now.
    Flush,
    /// The source is done; apply the completion policy and stop.
    End,
}

/// Everything the processor publishes downstream.
#[derive(Debug, Clone)]
pub enum IngressOutput<P> {
    Batch(EventBatch<(), P>),
    Flush,
    Completed,
}

/// Observer that parks pipe output in a queue for the processor loop to
/// forward with backpressure.
struct StepObserver<P> {
    queue: Arc<Mutex<VecDeque<IngressOutput<P>>>>,
    stats: Arc<IngressStats>,
}

impl<P: Send> IngressObserver<(), P> for StepObserver<P> {
    fn on_batch(&mut self, batch: EventBatch<(), P>) {
        let data_rows = batch
            .payloads()
            .iter()
            .filter(|payload| payload.is_some())
            .count() as u64;
        self.stats.record_batch(data_rows);
        self.queue
            .lock()
            .expect("step queue lock poisoned")
            .push_back(IngressOutput::Batch(batch));
    }

    fn on_flush(&mut self) {
        self.queue
            .lock()
            .expect("step queue lock poisoned")
            .push_back(IngressOutput::Flush);
    }

    fn on_completed(&mut self) {
        self.queue
            .lock()
            .expect("step queue lock poisoned")
            .push_back(IngressOutput::Completed);
    }

    fn on_error(&mut self, error: IngressError) {
        // The processor loop records the error; avoid counting it twice.
        tracing::warn!(error = %error, "ingress pipeline error");
    }
}

pub struct IngressProcessor<P> {
    id: String,
    config: IngressConfig,
    inputs: Vec<broadcast::Receiver<StreamEvent<P>>>,
    control_inputs: Vec<broadcast::Receiver<IngressControl>>,
    output: broadcast::Sender<IngressOutput<P>>,
    diagnostics: Option<Box<dyn DiagnosticSink<StreamEvent<P>> + Send>>,
    stats: Arc<IngressStats>,
}

impl<P> IngressProcessor<P>
where
    P: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(id: impl Into<String>, config: IngressConfig) -> Self {
        let (output, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            config,
            inputs: Vec::new(),
            control_inputs: Vec::new(),
            output,
            diagnostics: None,
            stats: Arc::new(IngressStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Route drop/adjust reports somewhere other than the void.
    pub fn set_diagnostics(&mut self, sink: Box<dyn DiagnosticSink<StreamEvent<P>> + Send>) {
        self.diagnostics = Some(sink);
    }

    pub fn set_stats(&mut self, stats: Arc<IngressStats>) {
        self.stats = stats;
    }

    pub fn stats(&self) -> Arc<IngressStats> {
        Arc::clone(&self.stats)
    }

    pub fn add_input(&mut self, receiver: broadcast::Receiver<StreamEvent<P>>) {
        self.inputs.push(receiver);
    }

    pub fn add_control_input(&mut self, receiver: broadcast::Receiver<IngressControl>) {
        self.control_inputs.push(receiver);
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<IngressOutput<P>> {
        self.output.subscribe()
    }

    pub fn start(&mut self) -> tokio::task::JoinHandle<Result<(), ProcessorError>> {
        let id = self.id.clone();
        let config = self.config;
        let mut input_streams = fan_in_streams(std::mem::take(&mut self.inputs));
        let mut control_streams = fan_in_streams(std::mem::take(&mut self.control_inputs));
        let mut control_active = !control_streams.is_empty();
        let output = self.output.clone();
        let stats = Arc::clone(&self.stats);
        let diagnostics = self
            .diagnostics
            .take()
            .unwrap_or_else(|| Box::new(NullDiagnostics));

        tracing::info!(processor_id = %id, "ingress processor starting");
        tokio::spawn(async move {
            async fn forward_outputs<P: Clone>(
                queue: &Mutex<VecDeque<IngressOutput<P>>>,
                output: &broadcast::Sender<IngressOutput<P>>,
            ) -> Result<(), ProcessorError> {
                loop {
                    let item = queue.lock().expect("step queue lock poisoned").pop_front();
                    match item {
                        Some(item) => send_with_backpressure(output, item).await?,
                        None => return Ok(()),
                    }
                }
            }

            let queue = Arc::new(Mutex::new(VecDeque::new()));
            let observer = StepObserver {
                queue: Arc::clone(&queue),
                stats: Arc::clone(&stats),
            };
            let mut pipe = IngressPipe::new(config, Box::new(observer), diagnostics)
                .map_err(|err| ProcessorError::InvalidConfiguration(err.to_string()))?;
            pipe.enable()
                .map_err(|err| ProcessorError::InvalidConfiguration(err.to_string()))?;

            loop {
                tokio::select! {
                    biased;
                    control_item = control_streams.next(), if control_active => {
                        match control_item {
                            Some(Ok(IngressControl::Flush)) => {
                                if let Err(err) = pipe.flush() {
                                    stats.record_error(err.to_string());
                                    return Err(ProcessorError::Processing(err.to_string()));
                                }
                                forward_outputs(&queue, &output).await?;
                            }
                            Some(Ok(IngressControl::End)) => {
                                if let Err(err) = pipe.on_completed() {
                                    stats.record_error(err.to_string());
                                    return Err(ProcessorError::Processing(err.to_string()));
                                }
                                forward_outputs(&queue, &output).await?;
                                tracing::info!(processor_id = %id, "received End (control)");
                                tracing::info!(processor_id = %id, "stopped");
                                return Ok(());
                            }
                            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                                log_broadcast_lagged(&id, skipped, "ingress control input");
                            }
                            None => {
                                control_active = false;
                            }
                        }
                    }
                    item = input_streams.next() => {
                        match item {
                            Some(Ok(event)) => {
                                stats.record_in(1);
                                match pipe.on_next(event) {
                                    Ok(()) => forward_outputs(&queue, &output).await?,
                                    Err(err) => {
                                        stats.record_error(err.to_string());
                                        tracing::error!(
                                            processor_id = %id,
                                            error = %err,
                                            "fatal ingress error"
                                        );
                                        return Err(ProcessorError::Processing(err.to_string()));
                                    }
                                }
                            }
                            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                                log_broadcast_lagged(&id, skipped, "ingress data input");
                            }
                            None => {
                                if let Err(err) = pipe.on_completed() {
                                    stats.record_error(err.to_string());
                                    return Err(ProcessorError::Processing(err.to_string()));
                                }
                                forward_outputs(&queue, &output).await?;
                                tracing::info!(processor_id = %id, "stopped");
                                return Ok(());
                            }
                        }
                    }
                }
            }
        })
    }
}
