//! # VirtRigaud Control Plane
//!
//! Runs the reconciler set against the object store and drives provider
//! runtimes toward declared state.
//!
//! ## Usage
//! ```bash
//! virtrigaud-controllers --config /etc/virtrigaud/controllers.yaml
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use virtrigaud_controllers::cli::Args;
use virtrigaud_controllers::{Config, Context, Manager};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    if args.log_json {
        virtrigaud_common::init_logging_json(&args.log_level)?;
    } else {
        virtrigaud_common::init_logging(&args.log_level)?;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting VirtRigaud control plane"
    );

    // Load configuration
    let config = match Config::load(&args.config) {
        Ok(cfg) => {
            info!(config_path = %args.config, "Configuration loaded");
            cfg
        }
        Err(_) if args.config == "/etc/virtrigaud/controllers.yaml" => {
            info!("No config file found, using defaults");
            Config::default()
        }
        Err(e) => {
            error!(error = %e, path = %args.config, "Failed to load configuration");
            return Err(e);
        }
    };

    // Override config with CLI args
    let config = config.with_cli_overrides(&args);

    info!(
        parallelism = config.parallelism,
        dev_mode = config.dev_mode,
        "Control plane configured"
    );

    let ctx = if config.dev_mode {
        Context::new_mock(config.intervals.clone())
    } else {
        Context::new(config.intervals.clone())
    };

    let manager = Manager::start(ctx, &config);
    manager.run_until_signal().await
}
