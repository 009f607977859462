//! Logging setup and per-epoch progress lines
//!
//! Output goes through `tracing`. The CLI installs a compact fmt subscriber on
//! stderr; `RUST_LOG` overrides the configured level when set.

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::error::{ResNetError, Result};
use crate::utils::format_duration;

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// Print the module path of each event
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_target: false,
            ansi: std::io::stderr().is_terminal(),
        }
    }
}

impl LogConfig {
    /// Debug level with module targets, for `--verbose`
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            with_target: true,
            ..Self::default()
        }
    }

    /// Filter directive for the configured level, e.g. `info`
    pub fn directive(&self) -> String {
        self.level.as_str().to_ascii_lowercase()
    }
}

/// Install the global subscriber; fails if one is already set
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.with_target)
                .with_ansi(config.ansi)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| ResNetError::Config(format!("Failed to initialize logger: {e}")))
}

/// Emits one line per epoch with metrics, epoch time and ETA
pub struct TrainingLogger {
    total_epochs: usize,
    current: usize,
    run_start: Instant,
    epoch_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            total_epochs,
            current: 0,
            run_start: now,
            epoch_start: now,
        }
    }

    /// Mark the start of the zero-based `epoch`
    pub fn start_epoch(&mut self, epoch: usize) {
        self.current = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Estimated time left, extrapolated from the mean epoch time so far
    pub fn eta(&self) -> Duration {
        let done = self.current + 1;
        let remaining = self.total_epochs.saturating_sub(done);
        self.run_start
            .elapsed()
            .mul_f64(remaining as f64 / done as f64)
    }

    /// `val` is `(loss, accuracy)` when validation ran this epoch
    pub fn end_epoch(&self, loss: f64, accuracy: f64, val: Option<(f64, f64)>) {
        let mut line = format!(
            "Epoch {}/{} | loss: {:.4} | accuracy: {:.4}",
            self.current + 1,
            self.total_epochs,
            loss,
            accuracy
        );
        if let Some((val_loss, val_accuracy)) = val {
            let _ = write!(line, " | val_loss: {val_loss:.4} | val_accuracy: {val_accuracy:.4}");
        }

        tracing::info!(
            "{line} | {} (ETA {})",
            format_duration(self.epoch_start.elapsed()),
            format_duration(self.eta())
        );
    }

    /// Final summary; `best` is `(epoch, val_accuracy)`
    pub fn finish(&self, best: Option<(usize, f64)>) {
        let elapsed = format_duration(self.run_start.elapsed());
        match best {
            Some((epoch, accuracy)) => tracing::info!(
                "Training finished: {} epochs in {} | best val_accuracy {:.4} at epoch {}",
                self.total_epochs,
                elapsed,
                accuracy,
                epoch
            ),
            None => tracing::info!(
                "Training finished: {} epochs in {}",
                self.total_epochs,
                elapsed
            ),
        }
    }
}
