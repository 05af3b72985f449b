use ingress::{
    CollectingDiagnostics, IngressControl, IngressOutput, IngressProcessor, StreamEvent,
    DEFAULT_CHANNEL_CAPACITY,
};
use std::env;
use std::path::PathBuf;
use tempo::config::{load_config, AppConfig};
use tempo::logging::init_logging;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default)]
struct CliFlags {
    config_path: Option<PathBuf>,
}

impl CliFlags {
    fn parse() -> Self {
        let mut flags = Self::default();
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => flags.config_path = args.next().map(PathBuf::from),
                other => {
                    eprintln!("[tempo] ignoring unknown argument: {}", other);
                }
            }
        }
        flags
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli_flags = CliFlags::parse();
    let config = match &cli_flags.config_path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    let _logging_guard = init_logging(&config.logging)?;
    tracing::info!(
        events = config.demo.events,
        max_disorder = config.demo.max_disorder,
        "starting ingestion demo"
    );

    let mut processor = IngressProcessor::<u64>::new("ingress", config.ingress);
    let diagnostics = CollectingDiagnostics::new();
    let reports = diagnostics.handle();
    processor.set_diagnostics(Box::new(diagnostics));

    let (input, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
    let (control, _) = broadcast::channel(16);
    processor.add_input(input.subscribe());
    processor.add_control_input(control.subscribe());
    let mut output = processor.subscribe_output();
    let stats = processor.stats();
    let processor_handle = processor.start();

    let consumer = tokio::spawn(async move {
        let mut rows = 0u64;
        let mut batches = 0u64;
        loop {
            match output.recv().await {
                Ok(IngressOutput::Batch(batch)) => {
                    rows += batch.len() as u64;
                    batches += 1;
                }
                Ok(IngressOutput::Flush) => {}
                Ok(IngressOutput::Completed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "demo consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        (rows, batches)
    });

    // Deterministic near-ordered source: monotone sync times with bounded
    // backwards jitter from a splitmix-style generator.
    let mut state = config.demo.seed | 1;
    let max_disorder = config.demo.max_disorder.max(1);
    let flush_at = config.demo.events / 2;
    for index in 0..config.demo.events {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let jitter = ((state >> 33) as i64).rem_euclid(max_disorder);
        let sync_time = index as i64 * 2 + max_disorder - jitter;
        let event = StreamEvent::interval(sync_time, sync_time + 16, index)?;
        while input.len() >= DEFAULT_CHANNEL_CAPACITY {
            tokio::task::yield_now().await;
        }
        if input.send(event).is_err() {
            break;
        }
        if index == flush_at {
            let _ = control.send(IngressControl::Flush);
        }
    }
    // Dropping the source closes the data channel; the processor drains what
    // is queued and then applies the completion policy.
    drop(input);

    let (rows, batches) = consumer.await?;
    processor_handle.await??;

    let disordered = reports.lock().expect("diagnostic lock poisoned").len();
    tracing::info!(rows, batches, disordered, "ingestion demo complete");
    println!("{}", serde_json::to_string_pretty(&stats.snapshot())?);
    Ok(())
}
