//! Command-line arguments for the control-plane binary.

use clap::Parser;

/// VirtRigaud control plane.
#[derive(Parser, Debug)]
#[command(name = "virtrigaud-controllers", version, about)]
pub struct Args {
    /// Path to the controller configuration file
    #[arg(short, long, env = "VIRTRIGAUD_CONFIG", default_value = "/etc/virtrigaud/controllers.yaml")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VIRTRIGAUD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs instead of console output
    #[arg(long, env = "VIRTRIGAUD_LOG_JSON")]
    pub log_json: bool,

    /// Worker parallelism per reconciler
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Use mock provider backends instead of gRPC (development)
    #[arg(long)]
    pub dev: bool,
}
