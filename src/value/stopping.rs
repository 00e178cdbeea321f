//! Stopping criteria for iterative valuation algorithms.
//!
//! A criterion inspects a [`ValuationResult`] and reports a [`Status`]. Monte
//! Carlo methods call it after every batch of updates and stop once it
//! reports anything other than [`Status::Pending`].
//!
//! Criteria compose with `&`, `|` and `!` on boxed criteria:
//!
//! ```
//! use datavalue::value::stopping::{MaxTime, MaxUpdates, StoppingCriterion};
//!
//! let done = MaxUpdates::new(1000).unwrap().boxed() | MaxTime::new(60.0).unwrap().boxed();
//! assert_eq!(done.name(), "Composite StoppingCriterion: MaxUpdates OR MaxTime");
//! ```
//!
//! The completion of a composite is the minimum (`&`), maximum (`|`) or
//! complement (`!`) of its parts.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::{Status, ValuationResult};
use crate::error::ConfigError;

// =============================================================================
// Trait
// =============================================================================

/// Decides whether a computation has converged.
pub trait StoppingCriterion: Send + Sync + fmt::Debug {
    /// Check `result` and update internal state, without modifying `result`.
    fn check(&mut self, result: &ValuationResult) -> Status;

    /// Progress towards convergence in `[0, 1]`.
    fn completion(&self) -> f64;

    /// Per-index convergence flags as of the last check, in index order.
    fn converged(&self) -> Vec<bool>;

    fn name(&self) -> String;

    fn box_clone(&self) -> Box<dyn StoppingCriterion>;

    /// Whether [`StoppingCriterion::evaluate`] writes the status into the result.
    fn modify_result(&self) -> bool {
        true
    }

    /// Check `result` and, if [`modify_result`](Self::modify_result), set its status.
    fn evaluate(&mut self, result: &mut ValuationResult) -> Status {
        if result.is_empty() {
            warn!(criterion = %self.name(), "checking convergence of an empty result");
        }
        let status = self.check(result);
        if self.modify_result() {
            result.set_status(status);
        }
        status
    }

    fn boxed(self) -> Box<dyn StoppingCriterion>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl Clone for Box<dyn StoppingCriterion> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

fn mean_of(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    flags.iter().filter(|&&f| f).count() as f64 / flags.len() as f64
}

// =============================================================================
// Composition
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    And,
    Or,
}

/// Two criteria combined with `&` or `|`.
#[derive(Debug, Clone)]
pub struct Composite {
    op: Op,
    left: Box<dyn StoppingCriterion>,
    right: Box<dyn StoppingCriterion>,
}

impl StoppingCriterion for Composite {
    fn check(&mut self, result: &ValuationResult) -> Status {
        // Both sides are always checked so that stateful criteria keep counting.
        let a = self.left.check(result);
        let b = self.right.check(result);
        match self.op {
            Op::And => a & b,
            Op::Or => a | b,
        }
    }

    fn completion(&self) -> f64 {
        let (a, b) = (self.left.completion(), self.right.completion());
        match self.op {
            Op::And => a.min(b),
            Op::Or => a.max(b),
        }
    }

    fn converged(&self) -> Vec<bool> {
        let (a, b) = (self.left.converged(), self.right.converged());
        if a.is_empty() {
            return b;
        }
        if b.is_empty() {
            return a;
        }
        a.iter()
            .zip(&b)
            .map(|(&x, &y)| match self.op {
                Op::And => x && y,
                Op::Or => x || y,
            })
            .collect()
    }

    fn name(&self) -> String {
        let op = match self.op {
            Op::And => "AND",
            Op::Or => "OR",
        };
        format!(
            "Composite StoppingCriterion: {} {op} {}",
            self.left.name(),
            self.right.name()
        )
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

/// A criterion with its status negated.
#[derive(Debug, Clone)]
pub struct Negated {
    inner: Box<dyn StoppingCriterion>,
}

impl StoppingCriterion for Negated {
    fn check(&mut self, result: &ValuationResult) -> Status {
        !self.inner.check(result)
    }

    fn completion(&self) -> f64 {
        1.0 - self.inner.completion()
    }

    fn converged(&self) -> Vec<bool> {
        self.inner.converged().into_iter().map(|c| !c).collect()
    }

    fn name(&self) -> String {
        format!("Composite StoppingCriterion: NOT {}", self.inner.name())
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

impl BitAnd for Box<dyn StoppingCriterion> {
    type Output = Box<dyn StoppingCriterion>;

    fn bitand(self, rhs: Self) -> Self::Output {
        Box::new(Composite {
            op: Op::And,
            left: self,
            right: rhs,
        })
    }
}

impl BitOr for Box<dyn StoppingCriterion> {
    type Output = Box<dyn StoppingCriterion>;

    fn bitor(self, rhs: Self) -> Self::Output {
        Box::new(Composite {
            op: Op::Or,
            left: self,
            right: rhs,
        })
    }
}

impl Not for Box<dyn StoppingCriterion> {
    type Output = Box<dyn StoppingCriterion>;

    fn not(self) -> Self::Output {
        Box::new(Negated { inner: self })
    }
}

/// A criterion that reports its status without writing it into the result.
#[derive(Debug, Clone)]
pub struct ObserveOnly(pub Box<dyn StoppingCriterion>);

impl StoppingCriterion for ObserveOnly {
    fn check(&mut self, result: &ValuationResult) -> Status {
        self.0.check(result)
    }

    fn completion(&self) -> f64 {
        self.0.completion()
    }

    fn converged(&self) -> Vec<bool> {
        self.0.converged()
    }

    fn name(&self) -> String {
        self.0.name()
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }

    fn modify_result(&self) -> bool {
        false
    }
}

// =============================================================================
// Update Counts
// =============================================================================

/// Converged once any index was updated at least `n` times.
#[derive(Debug, Clone)]
pub struct MaxUpdates {
    n: usize,
    last_max: usize,
    converged: Vec<bool>,
}

impl MaxUpdates {
    pub fn new(n: usize) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::NonPositiveCount {
                field: "n_updates",
                value: n,
            });
        }
        Ok(Self {
            n,
            last_max: 0,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for MaxUpdates {
    fn check(&mut self, result: &ValuationResult) -> Status {
        let counts = result.counts_by_index();
        self.last_max = counts.iter().copied().max().unwrap_or(0);
        if self.last_max >= self.n {
            self.converged = counts.iter().map(|&c| c >= self.n).collect();
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        (self.last_max as f64 / self.n as f64).min(1.0)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn name(&self) -> String {
        "MaxUpdates".to_string()
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

/// Converged once every index was updated at least `n` times.
#[derive(Debug, Clone)]
pub struct MinUpdates {
    n: usize,
    last_min: usize,
    converged: Vec<bool>,
}

impl MinUpdates {
    pub fn new(n: usize) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::NonPositiveCount {
                field: "n_updates",
                value: n,
            });
        }
        Ok(Self {
            n,
            last_min: 0,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for MinUpdates {
    fn check(&mut self, result: &ValuationResult) -> Status {
        let counts = result.counts_by_index();
        self.last_min = counts.iter().copied().min().unwrap_or(0);
        self.converged = counts.iter().map(|&c| c >= self.n).collect();
        if !counts.is_empty() && self.last_min >= self.n {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        (self.last_min as f64 / self.n as f64).min(1.0)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn name(&self) -> String {
        "MinUpdates".to_string()
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

/// Converged after more than `n` checks.
#[derive(Debug, Clone)]
pub struct MaxChecks {
    n: usize,
    count: usize,
    len: usize,
}

impl MaxChecks {
    pub fn new(n: usize) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::NonPositiveCount {
                field: "n_checks",
                value: n,
            });
        }
        Ok(Self { n, count: 0, len: 0 })
    }
}

impl StoppingCriterion for MaxChecks {
    fn check(&mut self, result: &ValuationResult) -> Status {
        self.count += 1;
        self.len = result.len();
        if self.count > self.n {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        (self.count as f64 / self.n as f64).min(1.0)
    }

    fn converged(&self) -> Vec<bool> {
        vec![self.count > self.n; self.len]
    }

    fn name(&self) -> String {
        "MaxChecks".to_string()
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

// =============================================================================
// Wall Time
// =============================================================================

/// Converged once the given number of seconds elapsed since construction.
#[derive(Debug, Clone)]
pub struct MaxTime {
    max: Duration,
    start: Instant,
    len: usize,
}

impl MaxTime {
    pub fn new(seconds: f64) -> Result<Self, ConfigError> {
        if !(seconds > 0.0) || !seconds.is_finite() {
            return Err(ConfigError::NonPositive {
                field: "seconds",
                value: seconds,
            });
        }
        Ok(Self {
            max: Duration::from_secs_f64(seconds),
            start: Instant::now(),
            len: 0,
        })
    }

    fn expired(&self) -> bool {
        self.start.elapsed() > self.max
    }
}

impl StoppingCriterion for MaxTime {
    fn check(&mut self, result: &ValuationResult) -> Status {
        self.len = result.len();
        if self.expired() {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        (self.start.elapsed().as_secs_f64() / self.max.as_secs_f64()).min(1.0)
    }

    fn converged(&self) -> Vec<bool> {
        vec![self.expired(); self.len]
    }

    fn name(&self) -> String {
        "MaxTime".to_string()
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

// =============================================================================
// Standard Error
// =============================================================================

/// Converged once a `fraction` of the values have standard error below
/// `threshold`, counting only indices updated more than `burn_in` times.
#[derive(Debug, Clone)]
pub struct AbsoluteStandardError {
    threshold: f64,
    fraction: f64,
    burn_in: usize,
    converged: Vec<bool>,
}

impl AbsoluteStandardError {
    /// `fraction = 1` and `burn_in = 4` are the usual choices.
    pub fn new(threshold: f64, fraction: f64, burn_in: usize) -> Result<Self, ConfigError> {
        if !(threshold > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "threshold",
                value: threshold,
            });
        }
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "fraction",
                value: fraction,
                low: 0.0,
                high: 1.0,
            });
        }
        Ok(Self {
            threshold,
            fraction,
            burn_in,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for AbsoluteStandardError {
    fn check(&mut self, result: &ValuationResult) -> Status {
        self.converged = result
            .items_by_index()
            .iter()
            .map(|item| item.stderr() < self.threshold && item.count > self.burn_in)
            .collect();
        if !self.converged.is_empty() && mean_of(&self.converged) >= self.fraction {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        mean_of(&self.converged)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn name(&self) -> String {
        format!("AbsoluteStandardError(threshold={})", self.threshold)
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

// =============================================================================
// History Deviation
// =============================================================================

/// Converged once values stop moving relative to `n_steps` checks ago.
///
/// The criterion keeps the last `n_steps + 1` snapshots of the values. For
/// every index updated more than `n_steps` times it computes
/// `|v_now - v_then| / |v_now|` (the plain difference when `v_now == 0`), and
/// when the mean of these falls below `rtol` marks those indices converged.
/// With `pin_converged`, indices stay converged once marked; otherwise the
/// flags are recomputed at every check. The status is converged once all
/// indices are.
#[derive(Debug, Clone)]
pub struct HistoryDeviation {
    n_steps: usize,
    rtol: f64,
    pin_converged: bool,
    /// `memory[i]` holds the snapshots of index `i`, oldest first.
    memory: Vec<Vec<f64>>,
    converged: Vec<bool>,
}

impl HistoryDeviation {
    pub fn new(n_steps: usize, rtol: f64, pin_converged: bool) -> Result<Self, ConfigError> {
        if n_steps == 0 {
            return Err(ConfigError::NonPositiveCount {
                field: "n_steps",
                value: n_steps,
            });
        }
        if !(rtol > 0.0 && rtol < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "rtol",
                value: rtol,
                low: 0.0,
                high: 1.0,
            });
        }
        Ok(Self {
            n_steps,
            rtol,
            pin_converged,
            memory: Vec::new(),
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for HistoryDeviation {
    fn check(&mut self, result: &ValuationResult) -> Status {
        let items = result.items_by_index();
        if items.is_empty() {
            return Status::Pending;
        }

        if self.memory.len() != items.len() {
            self.memory = items
                .iter()
                .map(|item| {
                    let mut column = vec![f64::INFINITY; self.n_steps + 1];
                    column[self.n_steps] = item.value;
                    column
                })
                .collect();
            self.converged = vec![false; items.len()];
            return Status::Pending;
        }

        for (column, item) in self.memory.iter_mut().zip(&items) {
            column.rotate_left(1);
            column[self.n_steps] = item.value;
        }

        let ready: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.count > self.n_steps)
            .map(|(pos, _)| pos)
            .collect();
        if ready.is_empty() {
            return Status::Pending;
        }

        let quotients: f64 = ready
            .iter()
            .map(|&pos| {
                let column = &self.memory[pos];
                let (curr, saved) = (column[self.n_steps], column[0]);
                let diff = (curr - saved).abs();
                if curr == 0.0 {
                    diff
                } else {
                    diff / curr.abs()
                }
            })
            .sum();
        let mean = quotients / ready.len() as f64;

        if mean < self.rtol {
            if !self.pin_converged {
                self.converged.fill(false);
            }
            for &pos in &ready {
                self.converged[pos] = true;
            }
        } else if !self.pin_converged {
            self.converged.fill(false);
        }

        if self.converged.iter().all(|&c| c) {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        mean_of(&self.converged)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn name(&self) -> String {
        format!("HistoryDeviation(n_steps={}, rtol={})", self.n_steps, self.rtol)
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

// =============================================================================
// Closures
// =============================================================================

type CheckFn = Arc<dyn Fn(&ValuationResult) -> Status + Send + Sync>;

/// A criterion defined by a function of the result. Created by [`make_criterion`].
#[derive(Clone)]
pub struct FnCriterion {
    name: String,
    fun: CheckFn,
    last: Status,
    len: usize,
}

impl fmt::Debug for FnCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCriterion")
            .field("name", &self.name)
            .field("last", &self.last)
            .finish()
    }
}

/// Turn a function of the result into a stopping criterion.
///
/// Completion is 1 once the function returned a final status and 0 before.
///
/// ```
/// use datavalue::value::stopping::{make_criterion, StoppingCriterion};
/// use datavalue::value::{Status, ValuationResult};
///
/// let mut c = make_criterion("NonEmpty", |r: &ValuationResult| {
///     if r.is_empty() { Status::Pending } else { Status::Converged }
/// });
/// let r = ValuationResult::from_random(3, 0);
/// assert_eq!(c.check(&r), Status::Converged);
/// assert_eq!(c.name(), "NonEmpty");
/// ```
pub fn make_criterion(
    name: impl Into<String>,
    fun: impl Fn(&ValuationResult) -> Status + Send + Sync + 'static,
) -> FnCriterion {
    FnCriterion {
        name: name.into(),
        fun: Arc::new(fun),
        last: Status::Pending,
        len: 0,
    }
}

impl StoppingCriterion for FnCriterion {
    fn check(&mut self, result: &ValuationResult) -> Status {
        self.last = (self.fun)(result);
        self.len = result.len();
        self.last
    }

    fn completion(&self) -> f64 {
        if self.last.is_done() {
            1.0
        } else {
            0.0
        }
    }

    fn converged(&self) -> Vec<bool> {
        vec![self.last == Status::Converged; self.len]
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn box_clone(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn with_counts(counts: &[usize]) -> ValuationResult {
        let n = counts.len();
        let names = (0..n).map(|i| i.to_string()).collect();
        ValuationResult::from_values("test", vec![1.0; n], names, Status::Pending)
            .unwrap()
            .with_counts(counts.to_vec())
            .unwrap()
    }

    #[test]
    fn test_max_updates() {
        let mut c = MaxUpdates::new(5).unwrap();
        assert_eq!(c.check(&with_counts(&[1, 4])), Status::Pending);
        assert_eq!(c.completion(), 0.8);
        assert_eq!(c.check(&with_counts(&[1, 5])), Status::Converged);
        assert_eq!(c.converged(), vec![false, true]);
    }

    #[test]
    fn test_min_updates() {
        let mut c = MinUpdates::new(3).unwrap();
        assert_eq!(c.check(&with_counts(&[3, 2])), Status::Pending);
        assert_eq!(c.check(&with_counts(&[3, 3])), Status::Converged);
        assert_eq!(c.completion(), 1.0);
    }

    #[test]
    fn test_max_checks_counts_calls() {
        let mut c = MaxChecks::new(2).unwrap();
        let r = with_counts(&[0]);
        assert_eq!(c.check(&r), Status::Pending);
        assert_eq!(c.check(&r), Status::Pending);
        assert_eq!(c.check(&r), Status::Converged);
    }

    #[rstest]
    #[case(MaxUpdates::new(0).map(|_| ()))]
    #[case(MaxChecks::new(0).map(|_| ()))]
    #[case(MaxTime::new(0.0).map(|_| ()))]
    #[case(MaxTime::new(-1.0).map(|_| ()))]
    #[case(HistoryDeviation::new(0, 0.1, false).map(|_| ()))]
    #[case(HistoryDeviation::new(5, 1.0, false).map(|_| ()))]
    #[case(HistoryDeviation::new(5, 0.0, false).map(|_| ()))]
    fn test_invalid_parameters(#[case] res: Result<(), ConfigError>) {
        assert!(res.is_err());
    }

    #[test]
    fn test_max_time_expires() {
        let mut c = MaxTime::new(0.01).unwrap();
        let r = with_counts(&[0, 0]);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(c.check(&r), Status::Converged);
        assert_eq!(c.converged(), vec![true, true]);
    }

    #[test]
    fn test_absolute_standard_error() {
        let mut c = AbsoluteStandardError::new(0.1, 1.0, 4).unwrap();
        let r = with_counts(&[10, 10]);
        // Zero variance and enough updates everywhere.
        assert_eq!(c.check(&r), Status::Converged);
        let young = with_counts(&[10, 2]);
        assert_eq!(c.check(&young), Status::Pending);
        assert_eq!(c.completion(), 0.5);
    }

    #[test]
    fn test_history_deviation_converges_on_stable_values() {
        let mut c = HistoryDeviation::new(2, 0.01, true).unwrap();
        let mut r = ValuationResult::zeros("test", vec![0, 1], vec!["a".into(), "b".into()]).unwrap();
        let mut statuses = Vec::new();
        for _ in 0..6 {
            r.update(0, 1.0).unwrap();
            r.update(1, 2.0).unwrap();
            statuses.push(c.check(&r));
        }
        // First check only fills the memory.
        assert_eq!(statuses[0], Status::Pending);
        assert_eq!(statuses.last(), Some(&Status::Converged));
    }

    #[test]
    fn test_history_deviation_pending_on_drifting_values() {
        let mut c = HistoryDeviation::new(1, 0.01, false).unwrap();
        let mut r = ValuationResult::zeros("test", vec![0], vec!["a".into()]).unwrap();
        for k in 0..10 {
            r.update(0, (k * k) as f64).unwrap();
            assert_eq!(c.check(&r), Status::Pending);
        }
    }

    #[test]
    fn test_composite_names() {
        let a = MaxUpdates::new(1).unwrap().boxed();
        let b = MaxChecks::new(1).unwrap().boxed();
        assert_eq!(
            (a.clone() & b.clone()).name(),
            "Composite StoppingCriterion: MaxUpdates AND MaxChecks"
        );
        assert_eq!(
            (a.clone() | b).name(),
            "Composite StoppingCriterion: MaxUpdates OR MaxChecks"
        );
        assert_eq!((!a).name(), "Composite StoppingCriterion: NOT MaxUpdates");
    }

    #[test]
    fn test_composite_status_and_completion() {
        let r = with_counts(&[2, 4]);
        let mut and = MaxUpdates::new(4).unwrap().boxed() & MinUpdates::new(4).unwrap().boxed();
        assert_eq!(and.check(&r), Status::Pending);
        assert_eq!(and.completion(), 0.5);

        let mut or = MaxUpdates::new(4).unwrap().boxed() | MinUpdates::new(4).unwrap().boxed();
        assert_eq!(or.check(&r), Status::Converged);
        assert_eq!(or.completion(), 1.0);

        let mut not = !MaxUpdates::new(4).unwrap().boxed();
        assert_eq!(not.check(&r), Status::Failed);
        assert_eq!(not.completion(), 0.0);
    }

    #[test]
    fn test_evaluate_sets_status_unless_observing() {
        let mut r = with_counts(&[5]);
        let mut c = MaxUpdates::new(1).unwrap();
        assert_eq!(c.evaluate(&mut r), Status::Converged);
        assert_eq!(r.status(), Status::Converged);

        let mut r = with_counts(&[5]);
        let mut observer = ObserveOnly(MaxUpdates::new(1).unwrap().boxed());
        assert_eq!(observer.evaluate(&mut r), Status::Converged);
        assert_eq!(r.status(), Status::Pending);
    }
}
