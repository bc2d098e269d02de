//! Polynomial approximation of k-distance curves.
//!
//! A curve `kdist(k)`, `k = 1..k_max`, is fitted as a polynomial in `ln k`:
//! `f(ln k) = b0 + b1 ln k + ... + bp (ln k)^p`. In log space the fit is made
//! on `ln kdist(k)` and evaluation exponentiates back.

use serde::{Deserialize, Serialize};

use crate::tree::{IndexError, IndexResult};

/// Pivots smaller than this (relative to the matrix scale) mark the normal
/// equations as singular.
const SINGULAR_PIVOT: f64 = 1e-12;

/// Extra lift of a conservative fit, relative to the largest sample, so that
/// rounding during evaluation cannot drop the curve below a sample.
const CONSERVATIVE_MARGIN: f64 = 1e-9;

/// Coefficients `b0..bp` of a polynomial in `ln k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialApproximation {
    coefficients: Vec<f64>,
}

impl PolynomialApproximation {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    /// All-zero coefficients; also used as the representative entry payload
    /// when sizing pages.
    pub fn zeros(len: usize) -> Self {
        Self {
            coefficients: vec![0.0; len],
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Polynomial degree `p`.
    pub fn order(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluates the polynomial at `x` (Horner).
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &b| acc * x + b)
    }

    /// Approximated k-distance for `k`, never negative.
    pub fn value_at(&self, k: usize, log_space: bool) -> f64 {
        let y = self.evaluate((k as f64).ln());
        let value = if log_space { y.exp() } else { y };
        value.max(0.0)
    }

    /// Coefficient-wise maximum. Since every `ln k >= 0` for `k >= 1`, the
    /// result bounds each input curve from above (in log space too, as `exp`
    /// is monotone).
    pub fn coefficient_max<'a>(
        approximations: impl IntoIterator<Item = &'a PolynomialApproximation>,
    ) -> Option<Self> {
        let mut approximations = approximations.into_iter();
        let mut result = approximations.next()?.clone();
        for other in approximations {
            if other.coefficients.len() > result.coefficients.len() {
                result.coefficients.resize(other.coefficients.len(), 0.0);
            }
            for (b, &o) in result.coefficients.iter_mut().zip(&other.coefficients) {
                *b = b.max(o);
            }
        }
        Some(result)
    }
}

/// Fits `kdist[k - 1] ≈ f(ln k)` for `k = 1..=kdist.len()`.
///
/// In log space, zero distances cannot be represented and are skipped; a
/// curve that is zero everywhere yields an approximation evaluating to 0.
/// With `conservative`, the intercept is raised by the largest positive
/// residual (plus a rounding margin) so the curve lies above every sample.
///
/// The result always holds `degree + 1` coefficients; a degree the samples
/// cannot support is lowered and the missing coefficients are zero.
pub fn approximate_k_distances(
    kdist: &[f64],
    degree: usize,
    log_space: bool,
    conservative: bool,
) -> IndexResult<PolynomialApproximation> {
    if kdist.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return Err(IndexError::InvalidArgument(
            "k-distances must be finite and non-negative".into(),
        ));
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = kdist
        .iter()
        .enumerate()
        .filter(|(_, &d)| !log_space || d > 0.0)
        .map(|(i, &d)| {
            let x = ((i + 1) as f64).ln();
            (x, if log_space { d.ln() } else { d })
        })
        .unzip();

    let mut coefficients = vec![0.0; degree + 1];
    if xs.is_empty() {
        if log_space {
            coefficients[0] = f64::NEG_INFINITY;
        }
        return Ok(PolynomialApproximation::new(coefficients));
    }

    let fitted = least_squares(&xs, &ys, degree.min(xs.len() - 1));
    coefficients[..fitted.len()].copy_from_slice(&fitted);
    let mut approximation = PolynomialApproximation::new(coefficients);

    if conservative {
        let lift = xs
            .iter()
            .zip(&ys)
            .map(|(&x, &y)| y - approximation.evaluate(x))
            .fold(0.0, f64::max);
        let magnitude = ys.iter().fold(0.0_f64, |acc, y| acc.max(y.abs()));
        approximation.coefficients[0] += lift + CONSERVATIVE_MARGIN * (1.0 + magnitude);
    }
    Ok(approximation)
}

/// Least-squares polynomial fit of at most `degree`, lowering the degree
/// until the normal equations are solvable.
fn least_squares(xs: &[f64], ys: &[f64], degree: usize) -> Vec<f64> {
    // Centred on the first sample, so a constant curve solves to exact zeros.
    let first = ys[0];
    let mean = first + ys.iter().map(|y| y - first).sum::<f64>() / ys.len() as f64;
    let centred: Vec<f64> = ys.iter().map(|y| y - mean).collect();

    let mut degree = degree;
    loop {
        if let Some(mut solution) = solve_normal_equations(xs, &centred, degree) {
            solution[0] += mean;
            return solution;
        }
        if degree == 0 {
            return vec![mean];
        }
        degree -= 1;
    }
}

fn solve_normal_equations(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    let m = degree + 1;
    let mut powers = vec![0.0; 2 * m - 1];
    let mut rhs = vec![0.0; m];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut p = 1.0;
        for (i, power) in powers.iter_mut().enumerate() {
            *power += p;
            if i < m {
                rhs[i] += p * y;
            }
            p *= x;
        }
    }
    let mut matrix: Vec<Vec<f64>> = (0..m).map(|i| powers[i..i + m].to_vec()).collect();
    gaussian_elimination(&mut matrix, &mut rhs)
}

/// Solves `matrix · b = rhs` in place with partial pivoting; `None` when singular.
fn gaussian_elimination(matrix: &mut [Vec<f64>], rhs: &mut [f64]) -> Option<Vec<f64>> {
    let m = rhs.len();
    let scale = matrix
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(1.0);

    for col in 0..m {
        let pivot = (col..m).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        if matrix[pivot][col].abs() < SINGULAR_PIVOT * scale {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..m {
            let factor = matrix[row][col] / matrix[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..m {
                matrix[row][c] -= factor * matrix[col][c];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut solution = vec![0.0; m];
    for row in (0..m).rev() {
        let tail: f64 = (row + 1..m).map(|c| matrix[row][c] * solution[c]).sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Some(solution)
}
