//! Progress reporting for valuation runs.
//!
//! [`ValuationLogger`] drives an `indicatif` progress bar and emits `tracing`
//! events, both gated by a [`Verbosity`] level. Bars are hidden below
//! [`Verbosity::Info`], so library users see nothing unless they ask for it.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::value::{Status, ValuationResult};

/// How much a valuation run reports while working.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// No output.
    #[default]
    Silent,
    /// Only warnings.
    Warning,
    /// Progress bar and summary.
    Info,
    /// Per-step detail.
    Debug,
}

impl Verbosity {
    /// Map a `-v` count to a level.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Silent,
            1 => Verbosity::Warning,
            2 => Verbosity::Info,
            _ => Verbosity::Debug,
        }
    }
}

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg} {wide_bar} {pos}/{len} ({eta})";

/// Progress bar plus log events for one valuation run.
///
/// The bar either counts work items (when the total is known) or tracks the
/// completion of a stopping criterion as a percentage.
#[derive(Debug)]
pub struct ValuationLogger {
    verbosity: Verbosity,
    algorithm: String,
    bar: ProgressBar,
}

impl ValuationLogger {
    /// Start reporting for `algorithm`. `total = None` tracks completion in percent.
    pub fn new(verbosity: Verbosity, algorithm: &str, total: Option<u64>) -> Self {
        let bar = if verbosity >= Verbosity::Info {
            let bar = ProgressBar::new(total.unwrap_or(100));
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
            }
            bar.enable_steady_tick(Duration::from_millis(200));
            bar
        } else {
            ProgressBar::with_draw_target(total.or(Some(100)), ProgressDrawTarget::hidden())
        };
        bar.set_message(algorithm.to_string());

        if verbosity >= Verbosity::Info {
            info!(algorithm, ?total, "starting valuation");
        }
        Self {
            verbosity,
            algorithm: algorithm.to_string(),
            bar,
        }
    }

    /// Logger that never prints.
    pub fn silent(algorithm: &str) -> Self {
        Self::new(Verbosity::Silent, algorithm, None)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Count finished work items.
    pub fn inc(&self, n: u64) {
        self.bar.inc(n);
    }

    /// Report completion in `[0, 1]` of a stopping criterion.
    pub fn set_completion(&self, completion: f64) {
        let pos = (completion.clamp(0.0, 1.0) * 100.0).round() as u64;
        self.bar.set_position(pos);
    }

    /// Debug-level step message.
    pub fn step(&self, message: &str) {
        if self.verbosity >= Verbosity::Debug {
            debug!(algorithm = %self.algorithm, "{message}");
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= Verbosity::Warning {
            warn!(algorithm = %self.algorithm, "{message}");
        }
    }

    /// Close the bar and log a summary of the result.
    pub fn finish(&self, result: &ValuationResult) {
        self.bar.finish_and_clear();
        if self.verbosity >= Verbosity::Info {
            info!(
                algorithm = %self.algorithm,
                n_values = result.len(),
                status = ?result.status(),
                "valuation finished"
            );
        }
        if self.verbosity >= Verbosity::Warning && result.status() == Status::Failed {
            warn!(algorithm = %self.algorithm, "valuation did not converge");
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}
