//! Configuration for the control-plane binary.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool size per reconciler
    pub parallelism: usize,
    /// Wall-clock budget for one reconcile
    pub reconcile_timeout_secs: u64,
    /// Use mock provider backends instead of gRPC
    pub dev_mode: bool,
    pub intervals: Intervals,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallelism: 4,
            reconcile_timeout_secs: 60,
            dev_mode: false,
            intervals: Intervals::default(),
        }
    }
}

/// Requeue cadence knobs. Tests shrink these to milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Intervals {
    /// Poll cadence for outstanding provider tasks
    pub task_poll_ms: u64,
    /// Drift-detection resync for converged objects
    pub drift_ms: u64,
    /// Retry cadence while dependencies are not ready
    pub dependency_ms: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            task_poll_ms: 2_000,
            drift_ms: 60_000,
            dependency_ms: 10_000,
        }
    }
}

impl Intervals {
    /// Millisecond intervals sized for integration tests.
    pub fn fast() -> Self {
        Self {
            task_poll_ms: 5,
            drift_ms: 50,
            dependency_ms: 5,
        }
    }

    pub fn task_poll(&self) -> Duration {
        Duration::from_millis(self.task_poll_ms)
    }

    pub fn drift(&self) -> Duration {
        Duration::from_millis(self.drift_ms)
    }

    pub fn dependency(&self) -> Duration {
        Duration::from_millis(self.dependency_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "failed to parse config file")?;

        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(parallelism) = args.parallelism {
            self.parallelism = parallelism;
        }
        if args.dev {
            self.dev_mode = true;
        }
        self
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}
