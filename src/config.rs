use ingress::IngressConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub ingress: IngressConfig,
    pub demo: DemoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            // Out of the box the app reorders rather than failing fast, so
            // the demo source's bounded disorder flows through cleanly.
            ingress: IngressConfig {
                disorder: ingress::DisorderPolicy::Adjust { reorder_latency: 64 },
                punctuation: ingress::PunctuationPolicy::Time { period: 1_000 },
                flush: ingress::FlushPolicy::OnPunctuation,
                ..IngressConfig::default()
            },
            demo: DemoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub output: LoggingOutput,
    pub level: LogLevel,
    pub include_source: bool,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            output: LoggingOutput::Stdout,
            level: LogLevel::Info,
            include_source: true,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingOutput {
    Stdout,
    File,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub dir: String,
    pub file_name: String,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            dir: "./logs".to_string(),
            file_name: "tempo.log".to_string(),
        }
    }
}

/// Synthetic source used by the demo binary.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of events to generate.
    pub events: u64,
    /// Maximum backwards displacement applied to sync times.
    pub max_disorder: i64,
    /// Seed for the deterministic shuffle.
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            events: 10_000,
            max_disorder: 32,
            seed: 0x5eed,
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error + Send + Sync>> {
    let raw = fs::read_to_string(path)?;
    let config = toml::from_str(&raw)?;
    Ok(config)
}
