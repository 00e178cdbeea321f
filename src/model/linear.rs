//! Ordinary least squares regression.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::{check_features, ModelError, SupervisedModel};

/// Ridge term added to the diagonal of the normal equations.
///
/// Keeps rank-deficient subsets (fewer rows than features) solvable.
const RIDGE: f64 = 1e-8;

/// Linear regression fitted via the normal equations.
///
/// # Example
///
/// ```
/// use datavalue::model::{LinearRegression, SupervisedModel};
/// use ndarray::array;
///
/// let mut model = LinearRegression::new();
/// let x = array![[0.0], [1.0], [2.0]];
/// let y = array![1.0, 3.0, 5.0];
/// model.fit(x.view(), y.view()).unwrap();
/// let pred = model.predict(array![[3.0]].view()).unwrap();
/// assert!((pred[0] - 7.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct LinearRegression {
    fit_intercept: bool,
    coef: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Model with an intercept term.
    pub fn new() -> Self {
        Self {
            fit_intercept: true,
            coef: None,
            intercept: 0.0,
        }
    }

    /// Model through the origin.
    pub fn without_intercept() -> Self {
        Self {
            fit_intercept: false,
            ..Self::new()
        }
    }

    /// Fitted coefficients, if fitted.
    pub fn coef(&self) -> Option<ArrayView1<'_, f64>> {
        self.coef.as_ref().map(|c| c.view())
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl SupervisedModel for LinearRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let (x_mean, y_mean) = if self.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
            (x_mean, y.mean().unwrap_or(0.0))
        } else {
            (Array1::zeros(x.ncols()), 0.0)
        };

        // Centering removes the intercept from the system.
        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let mut gram = xc.t().dot(&xc);
        for i in 0..gram.nrows() {
            gram[[i, i]] += RIDGE;
        }
        let rhs = xc.t().dot(&yc);
        let coef = solve(gram, rhs)?;

        self.intercept = y_mean - x_mean.dot(&coef);
        self.coef = Some(coef);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let coef = self.coef.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(coef.len(), x)?;
        Ok(x.dot(coef) + self.intercept)
    }

    fn name(&self) -> &str {
        "LinearRegression"
    }

    fn hash_params(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&[self.fit_intercept as u8]);
    }
}

/// Solve `a · w = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .ok_or(ModelError::Singular)?;
        if a[[pivot, col]].abs() < 1e-14 {
            return Err(ModelError::Singular);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut w = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * w[k]).sum();
        w[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_fit_recovers_exact_line() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 3.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) - x.column(1).mapv(|v| v) + 0.5;
        let mut model = LinearRegression::new();
        model.fit(x.view(), y.view()).unwrap();

        let coef = model.coef().unwrap();
        assert_abs_diff_eq!(coef[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(coef[1], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(model.intercept(), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(model.score(x.view(), y.view()).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_without_intercept() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let mut model = LinearRegression::without_intercept();
        model.fit(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(model.coef().unwrap()[0], 2.0, epsilon = 1e-6);
        assert_eq!(model.intercept(), 0.0);
    }

    #[test]
    fn test_single_row_fit_is_finite() {
        let x = array![[1.0, 2.0]];
        let y = array![3.0];
        let mut model = LinearRegression::new();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        assert_abs_diff_eq!(pred[0], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_errors() {
        let mut model = LinearRegression::new();
        assert_eq!(
            model.predict(array![[1.0]].view()).unwrap_err(),
            ModelError::NotFitted
        );
        let empty = Array2::<f64>::zeros((0, 2));
        assert_eq!(
            model.fit(empty.view(), Array1::<f64>::zeros(0).view()).unwrap_err(),
            ModelError::EmptyTrainingSet
        );

        model
            .fit(array![[1.0], [2.0]].view(), array![1.0, 2.0].view())
            .unwrap();
        assert_eq!(
            model.predict(array![[1.0, 2.0]].view()).unwrap_err(),
            ModelError::FeatureMismatch {
                expected: 1,
                got: 2
            }
        );
    }
}
