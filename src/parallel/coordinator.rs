//! Coordination of asynchronous workers that stream partial results.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ValuationError;
use crate::value::stopping::StoppingCriterion;
use crate::value::{Status, ValuationResult};

struct State {
    accumulated: ValuationResult,
    criterion: Box<dyn StoppingCriterion>,
    n_submissions: usize,
}

/// Accumulates partial results from workers until a stopping criterion is met.
///
/// Workers call [`Coordinator::submit`] with results covering a batch of
/// work and poll [`Coordinator::is_done`] before starting the next batch.
/// Submissions arriving after convergence are dropped.
pub struct Coordinator {
    state: Mutex<State>,
    done: AtomicBool,
}

impl Coordinator {
    pub fn new(initial: ValuationResult, criterion: Box<dyn StoppingCriterion>) -> Self {
        Self {
            state: Mutex::new(State {
                accumulated: initial,
                criterion,
                n_submissions: 0,
            }),
            done: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Merge a partial result and check convergence.
    pub fn submit(&self, partial: &ValuationResult) -> Result<Status, ValuationError> {
        let mut state = self.state.lock();
        if self.is_done() {
            return Ok(state.accumulated.status());
        }
        let mut merged = state.accumulated.merge(partial)?;
        let status = state.criterion.evaluate(&mut merged);
        state.accumulated = merged;
        state.n_submissions += 1;
        if status.is_done() {
            debug!(n_submissions = state.n_submissions, %status, "coordinator done");
            self.done.store(true, Ordering::Release);
        }
        Ok(status)
    }

    /// Completion of the stopping criterion as of the last submission.
    pub fn completion(&self) -> f64 {
        self.state.lock().criterion.completion()
    }

    /// Run `n_workers` copies of `worker` on scoped threads.
    ///
    /// Each worker receives its id and this coordinator. The first worker
    /// error raises the done flag so the others wind down, and is returned.
    pub fn run_workers<F>(&self, n_workers: usize, worker: F) -> Result<(), ValuationError>
    where
        F: Fn(usize, &Coordinator) -> Result<(), ValuationError> + Sync,
    {
        let worker = &worker;
        let outcomes: Vec<Result<(), ValuationError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..n_workers.max(1))
                .map(|id| {
                    scope.spawn(move || {
                        let outcome = worker(id, self);
                        if outcome.is_err() {
                            self.done.store(true, Ordering::Release);
                        }
                        outcome
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(ValuationError::Parallel("worker panicked".into())))
                })
                .collect()
        });
        outcomes.into_iter().collect()
    }

    /// The accumulated result.
    pub fn into_result(self) -> ValuationResult {
        self.state.into_inner().accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::stopping::{MaxChecks, MaxUpdates};

    fn one_update(value: f64) -> ValuationResult {
        let mut r = ValuationResult::zeros("test", vec![0], vec!["a".into()]).unwrap();
        r.update(0, value).unwrap();
        r
    }

    #[test]
    fn test_accumulates_until_done() {
        let c = Coordinator::new(
            ValuationResult::empty("test"),
            MaxUpdates::new(3).unwrap().boxed(),
        );
        assert_eq!(c.submit(&one_update(1.0)).unwrap(), Status::Pending);
        assert_eq!(c.submit(&one_update(2.0)).unwrap(), Status::Pending);
        assert_eq!(c.submit(&one_update(3.0)).unwrap(), Status::Converged);
        assert!(c.is_done());
        // Ignored once done.
        c.submit(&one_update(100.0)).unwrap();
        let r = c.into_result();
        assert_eq!(r.get(0).unwrap().value, 2.0);
        assert_eq!(r.status(), Status::Converged);
    }

    #[test]
    fn test_workers_stop_on_convergence() {
        let c = Coordinator::new(
            ValuationResult::empty("test"),
            MaxUpdates::new(50).unwrap().boxed(),
        );
        c.run_workers(4, |_, coord| {
            while !coord.is_done() {
                coord.submit(&one_update(1.0))?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(c.into_result().get(0).unwrap().count, 50);
    }

    #[test]
    fn test_worker_error_stops_everyone() {
        let c = Coordinator::new(
            ValuationResult::empty("test"),
            MaxChecks::new(usize::MAX).unwrap().boxed(),
        );
        let res = c.run_workers(3, |id, coord| {
            if id == 0 {
                return Err(ValuationError::InvalidArgument("bad".into()));
            }
            while !coord.is_done() {
                coord.submit(&one_update(0.0))?;
            }
            Ok(())
        });
        assert!(res.is_err());
    }
}
