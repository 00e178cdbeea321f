//! Three-valued status of a computation.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

/// Status of a computation or of a stopping criterion check.
///
/// Statuses combine with `&`, `|` and `!`:
///
/// - `a | b` is `Converged` if either is; otherwise `Pending` if either is;
///   otherwise `Failed`.
/// - `a & b` is `Failed` if either is; otherwise `Pending` if either is;
///   otherwise `Converged`.
/// - `!Converged == Failed`, `!Pending == Converged`, `!Failed == Converged`.
///
/// ```
/// use datavalue::value::Status;
///
/// assert_eq!(Status::Pending | Status::Converged, Status::Converged);
/// assert_eq!(Status::Pending & Status::Converged, Status::Pending);
/// assert_eq!(!Status::Pending, Status::Converged);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Converged,
    Failed,
}

impl Status {
    /// Anything but `Pending` is terminal.
    pub fn is_done(self) -> bool {
        self != Status::Pending
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        use Status::*;
        match (self, rhs) {
            (Converged, _) | (_, Converged) => Converged,
            (Pending, _) | (_, Pending) => Pending,
            (Failed, Failed) => Failed,
        }
    }
}

impl BitAnd for Status {
    type Output = Status;

    fn bitand(self, rhs: Status) -> Status {
        use Status::*;
        match (self, rhs) {
            (Failed, _) | (_, Failed) => Failed,
            (Pending, _) | (_, Pending) => Pending,
            (Converged, Converged) => Converged,
        }
    }
}

impl Not for Status {
    type Output = Status;

    fn not(self) -> Status {
        match self {
            Status::Converged => Status::Failed,
            Status::Pending | Status::Failed => Status::Converged,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Converged => "converged",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::Status::{self, *};
    use rstest::rstest;

    #[rstest]
    #[case(Pending, Pending, Pending)]
    #[case(Pending, Converged, Converged)]
    #[case(Pending, Failed, Pending)]
    #[case(Converged, Failed, Converged)]
    #[case(Failed, Failed, Failed)]
    #[case(Converged, Converged, Converged)]
    fn test_or(#[case] a: Status, #[case] b: Status, #[case] expected: Status) {
        assert_eq!(a | b, expected);
        assert_eq!(b | a, expected);
    }

    #[rstest]
    #[case(Pending, Pending, Pending)]
    #[case(Pending, Converged, Pending)]
    #[case(Pending, Failed, Failed)]
    #[case(Converged, Failed, Failed)]
    #[case(Failed, Failed, Failed)]
    #[case(Converged, Converged, Converged)]
    fn test_and(#[case] a: Status, #[case] b: Status, #[case] expected: Status) {
        assert_eq!(a & b, expected);
        assert_eq!(b & a, expected);
    }

    #[test]
    fn test_not_and_done() {
        assert_eq!(!Converged, Failed);
        assert_eq!(!Pending, Converged);
        assert_eq!(!Failed, Converged);
        assert!(!Pending.is_done());
        assert!(Converged.is_done());
        assert!(Failed.is_done());
    }
}
