// Main library entry point
// The actual functionality is provided by the ingress crate; this shell adds
// configuration loading and logging for the binary.

pub mod config;
pub mod logging;

pub use ingress::{IngressConfig, IngressProcessor, StreamEvent};
