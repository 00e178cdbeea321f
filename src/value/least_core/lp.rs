//! Dense two-phase simplex for small linear programs.
//!
//! Problems are stated as
//!
//! ```text
//! minimize    cᵀx
//! subject to  A_eq x  = b_eq
//!             A_ub x <= b_ub
//!             x_j >= 0 unless x_j is free
//! ```
//!
//! Free variables are split into a positive and a negative part and every
//! equality becomes a pair of inequalities, so the solver works on
//! `max c'ᵀy, A'y <= b', y >= 0`. Phase one adds a single auxiliary variable
//! to reach a feasible basis; both phases pivot with Bland's rule.

use ndarray::Array2;

const EPS: f64 = 1e-9;

/// Reasons a linear program has no optimal solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LpError {
    #[error("linear program is infeasible")]
    Infeasible,

    #[error("linear program is unbounded")]
    Unbounded,

    #[error("simplex did not terminate within {0} pivots")]
    IterationLimit(usize),
}

/// Optimal point and objective value.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub x: Vec<f64>,
    pub objective: f64,
}

/// A linear program in minimisation form.
#[derive(Debug, Clone)]
pub struct LinearProgram {
    c: Vec<f64>,
    free: Vec<bool>,
    a_eq: Vec<Vec<f64>>,
    b_eq: Vec<f64>,
    a_ub: Vec<Vec<f64>>,
    b_ub: Vec<f64>,
}

impl LinearProgram {
    /// Minimise `cᵀx` with every variable non-negative.
    pub fn minimize(c: Vec<f64>) -> Self {
        let n = c.len();
        Self {
            c,
            free: vec![false; n],
            a_eq: Vec::new(),
            b_eq: Vec::new(),
            a_ub: Vec::new(),
            b_ub: Vec::new(),
        }
    }

    pub fn n_vars(&self) -> usize {
        self.c.len()
    }

    /// Remove the sign constraint on variable `j`.
    pub fn free_variable(mut self, j: usize) -> Self {
        self.free[j] = true;
        self
    }

    /// Add `row · x = rhs`.
    pub fn equality(mut self, row: Vec<f64>, rhs: f64) -> Self {
        debug_assert_eq!(row.len(), self.n_vars());
        self.a_eq.push(row);
        self.b_eq.push(rhs);
        self
    }

    /// Add `row · x <= rhs`.
    pub fn upper_bound(mut self, row: Vec<f64>, rhs: f64) -> Self {
        debug_assert_eq!(row.len(), self.n_vars());
        self.a_ub.push(row);
        self.b_ub.push(rhs);
        self
    }

    pub fn n_constraints(&self) -> usize {
        self.a_eq.len() + self.a_ub.len()
    }

    /// Solve the program.
    pub fn solve(&self) -> Result<LpSolution, LpError> {
        // Column of each original variable in the standard form, plus the
        // column of its negative part when free.
        let mut columns = Vec::with_capacity(self.n_vars());
        let mut n_std = 0;
        for &free in &self.free {
            let neg = free.then_some(n_std + 1);
            columns.push((n_std, neg));
            n_std += if free { 2 } else { 1 };
        }

        let expand = |row: &[f64], sign: f64| -> Vec<f64> {
            let mut out = vec![0.0; n_std];
            for (j, &(pos, neg)) in columns.iter().enumerate() {
                out[pos] = sign * row[j];
                if let Some(neg) = neg {
                    out[neg] = -sign * row[j];
                }
            }
            out
        };

        let mut rows = Vec::with_capacity(2 * self.a_eq.len() + self.a_ub.len());
        let mut rhs = Vec::with_capacity(rows.capacity());
        for (row, &b) in self.a_eq.iter().zip(&self.b_eq) {
            rows.push(expand(row, 1.0));
            rhs.push(b);
            rows.push(expand(row, -1.0));
            rhs.push(-b);
        }
        for (row, &b) in self.a_ub.iter().zip(&self.b_ub) {
            rows.push(expand(row, 1.0));
            rhs.push(b);
        }
        // Maximise -cᵀx.
        let objective = expand(&self.c, -1.0);

        let mut tableau = Tableau::new(&rows, &rhs, &objective);
        let y = tableau.solve()?;

        let x: Vec<f64> = columns
            .iter()
            .map(|&(pos, neg)| y[pos] - neg.map_or(0.0, |neg| y[neg]))
            .collect();
        let objective = self.c.iter().zip(&x).map(|(c, x)| c * x).sum();
        Ok(LpSolution { x, objective })
    }
}

// =============================================================================
// Tableau
// =============================================================================

/// Marker for the auxiliary variable of phase one.
const AUX: usize = usize::MAX;

/// Simplex dictionary for `max cᵀy, Ay <= b, y >= 0`.
///
/// Rows `0..m` hold the constraints, row `m` the objective and row `m + 1`
/// the phase one objective. Column `n` belongs to the auxiliary variable and
/// column `n + 1` holds the right-hand side.
struct Tableau {
    m: usize,
    n: usize,
    d: Array2<f64>,
    basic: Vec<usize>,
    non_basic: Vec<usize>,
    max_pivots: usize,
}

impl Tableau {
    fn new(a: &[Vec<f64>], b: &[f64], c: &[f64]) -> Self {
        let m = a.len();
        let n = c.len();
        let mut d = Array2::zeros((m + 2, n + 2));
        for (i, row) in a.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                d[[i, j]] = v;
            }
            d[[i, n]] = -1.0;
            d[[i, n + 1]] = b[i];
        }
        for (j, &v) in c.iter().enumerate() {
            d[[m, j]] = -v;
        }
        d[[m + 1, n]] = 1.0;

        let mut non_basic: Vec<usize> = (0..n).collect();
        non_basic.push(AUX);
        Self {
            m,
            n,
            d,
            basic: (n..n + m).collect(),
            non_basic,
            max_pivots: 50_000 + 20 * (m + n),
        }
    }

    fn pivot(&mut self, r: usize, s: usize) {
        let inv = 1.0 / self.d[[r, s]];
        let (rows, cols) = self.d.dim();
        for i in 0..rows {
            if i == r {
                continue;
            }
            let factor = self.d[[i, s]] * inv;
            if factor == 0.0 {
                continue;
            }
            for j in 0..cols {
                if j != s {
                    self.d[[i, j]] -= self.d[[r, j]] * factor;
                }
            }
        }
        for j in 0..cols {
            if j != s {
                self.d[[r, j]] *= inv;
            }
        }
        for i in 0..rows {
            if i != r {
                self.d[[i, s]] *= -inv;
            }
        }
        self.d[[r, s]] = inv;
        std::mem::swap(&mut self.basic[r], &mut self.non_basic[s]);
    }

    /// Run simplex iterations on objective row `x`. Returns `false` when the
    /// objective is unbounded.
    fn optimize(&mut self, x: usize, phase_one: bool, pivots: &mut usize) -> Result<bool, LpError> {
        let rhs = self.n + 1;
        loop {
            // Bland: entering variable with the smallest label.
            let mut s = None;
            for j in 0..=self.n {
                if !phase_one && self.non_basic[j] == AUX {
                    continue;
                }
                if self.d[[x, j]] >= -EPS {
                    continue;
                }
                s = match s {
                    Some(k) if self.non_basic[k] < self.non_basic[j] => Some(k),
                    _ => Some(j),
                };
            }
            let Some(s) = s else {
                return Ok(true);
            };

            let mut r: Option<usize> = None;
            for i in 0..self.m {
                if self.d[[i, s]] <= EPS {
                    continue;
                }
                let ratio = self.d[[i, rhs]] / self.d[[i, s]];
                r = match r {
                    None => Some(i),
                    Some(k) => {
                        let best = self.d[[k, rhs]] / self.d[[k, s]];
                        if ratio < best - EPS
                            || ((ratio - best).abs() <= EPS && self.basic[i] < self.basic[k])
                        {
                            Some(i)
                        } else {
                            Some(k)
                        }
                    }
                };
            }
            let Some(r) = r else {
                return Ok(false);
            };

            *pivots += 1;
            if *pivots > self.max_pivots {
                return Err(LpError::IterationLimit(self.max_pivots));
            }
            self.pivot(r, s);
        }
    }

    fn solve(&mut self) -> Result<Vec<f64>, LpError> {
        let (m, n) = (self.m, self.n);
        let rhs = n + 1;
        let mut pivots = 0;

        let most_negative = (0..m).min_by(|&a, &b| self.d[[a, rhs]].total_cmp(&self.d[[b, rhs]]));
        if let Some(r) = most_negative.filter(|&r| self.d[[r, rhs]] < -EPS) {
            self.pivot(r, n);
            if !self.optimize(m + 1, true, &mut pivots)? || self.d[[m + 1, rhs]] < -EPS {
                return Err(LpError::Infeasible);
            }
            // Drive the auxiliary variable out of the basis if it stayed at zero.
            for i in 0..m {
                if self.basic[i] != AUX {
                    continue;
                }
                let s = (0..=n)
                    .filter(|&j| self.non_basic[j] != AUX)
                    .max_by(|&a, &b| self.d[[i, a]].abs().total_cmp(&self.d[[i, b]].abs()));
                if let Some(s) = s.filter(|&s| self.d[[i, s]].abs() > EPS) {
                    self.pivot(i, s);
                }
            }
        }

        if !self.optimize(m, false, &mut pivots)? {
            return Err(LpError::Unbounded);
        }

        let mut y = vec![0.0; n];
        for i in 0..m {
            let var = self.basic[i];
            if var < n {
                y[var] = self.d[[i, rhs]];
            }
        }
        Ok(y)
    }
}
