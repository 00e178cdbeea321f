//! Parallel execution of repeated utility evaluations.
//!
//! Two schemes are provided:
//!
//! - [`MapReduceJob`]: split inputs into chunks, map each chunk on a rayon
//!   pool and reduce the results, optionally over several independent runs.
//! - [`Coordinator`]: workers on scoped threads stream partial results into a
//!   shared accumulator until a stopping criterion is met.

mod coordinator;
mod map_reduce;

pub use coordinator::Coordinator;
pub use map_reduce::{chunkify, MapReduceJob};
