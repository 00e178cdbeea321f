//! Reporting on computed values.
//!
//! - [`scores`]: test performance while removing or adding points in value order
//! - [`plots`]: aggregated curves and error bars ready for plotting, with JSON export

pub mod plots;
pub mod scores;

pub use plots::{aggregate_curves, shapley_errorbars, write_json, CurveSummary, ErrorBar};
pub use scores::{backward_elimination, compute_fb_scores, forward_selection, FbScores};
