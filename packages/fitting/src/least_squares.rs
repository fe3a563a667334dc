//! Bounded Levenberg–Marquardt nonlinear least squares.
//!
//! Minimises `Σ (y_i − f(x_i, p))²` over a parameter rectangle. The
//! Jacobian is approximated by forward differences and candidate steps
//! are clamped into the bounds, which keeps every model evaluation
//! inside the region where the growth models are numerically stable.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Maximum outer iterations before giving up.
const MAX_ITERATIONS: usize = 200;

/// Maximum damping attempts per outer iteration.
const MAX_DAMPING_STEPS: usize = 24;

/// Relative cost-decrease tolerance.
const FTOL: f64 = 1e-10;

/// Absolute step-size tolerance.
const XTOL: f64 = 1e-10;

/// Damping factor ceiling; a stalled search below this is treated as a
/// (bounded) local minimum.
const LAMBDA_MAX: f64 = 1e12;

/// Errors from the least-squares solver.
#[derive(Debug, Error)]
pub enum FitError {
    /// The optimiser exhausted its iteration budget.
    #[error("fit did not converge within {0} iterations")]
    DidNotConverge(usize),

    /// Fewer observations than free parameters (plus one).
    #[error("underdetermined fit: {observations} observations for {parameters} parameters")]
    Underdetermined {
        /// Number of observations.
        observations: usize,
        /// Number of free parameters.
        parameters: usize,
    },

    /// The inputs are unusable (mismatched lengths, non-finite initial
    /// cost, inverted bounds).
    #[error("invalid fit input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },
}

/// A rectangular parameter domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// Per-parameter lower bounds.
    pub lower: Vec<f64>,
    /// Per-parameter upper bounds.
    pub upper: Vec<f64>,
}

impl Bounds {
    /// Creates bounds from lower and upper vectors.
    #[must_use]
    pub const fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self { lower, upper }
    }

    fn clamp(&self, params: &mut DVector<f64>) {
        for (i, value) in params.iter_mut().enumerate() {
            *value = value.clamp(self.lower[i], self.upper[i]);
        }
    }
}

/// A converged least-squares fit.
#[derive(Debug, Clone)]
pub struct Fit {
    /// Optimal parameter values.
    pub params: Vec<f64>,
    /// Estimated covariance of the parameters,
    /// `(JᵀJ)⁻¹ · RSS / (n − m)`.
    pub covariance: DMatrix<f64>,
    /// Residual sum of squares at the optimum.
    pub residual_sum_of_squares: f64,
    /// Outer iterations used.
    pub iterations: usize,
}

/// Fits `f(x, p)` to the observations by bounded Levenberg–Marquardt.
///
/// `p0` is the initial guess; it is clamped into `bounds` before the
/// first evaluation, as is every subsequent step.
///
/// # Errors
///
/// Returns [`FitError::InvalidInput`] for mismatched input lengths,
/// inverted bounds, or a non-finite initial cost;
/// [`FitError::Underdetermined`] when there are not strictly more
/// observations than parameters; [`FitError::DidNotConverge`] when the
/// iteration budget runs out.
pub fn curve_fit<F>(
    f: F,
    x: &[f64],
    y: &[f64],
    p0: &[f64],
    bounds: &Bounds,
) -> Result<Fit, FitError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x.len();
    let m = p0.len();
    validate_input(x, y, p0, bounds)?;
    if n <= m {
        return Err(FitError::Underdetermined {
            observations: n,
            parameters: m,
        });
    }

    let mut params = DVector::from_column_slice(p0);
    bounds.clamp(&mut params);

    let mut cost = residual_cost(&f, x, y, params.as_slice());
    if !cost.is_finite() {
        return Err(FitError::InvalidInput {
            message: "initial guess yields a non-finite cost".to_string(),
        });
    }

    let mut lambda = 1e-3;
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 0..MAX_ITERATIONS {
        iterations = iteration + 1;

        let residuals = residual_vector(&f, x, y, params.as_slice());
        let jacobian = forward_jacobian(&f, x, params.as_slice(), bounds);
        let jt = jacobian.transpose();
        let jtj = &jt * &jacobian;
        let gradient = &jt * &residuals;

        let mut stepped = false;
        for _ in 0..MAX_DAMPING_STEPS {
            let mut damped = jtj.clone();
            for i in 0..m {
                let diag = jtj[(i, i)].max(1e-12);
                damped[(i, i)] = jtj[(i, i)] + lambda * diag;
            }
            let Some(delta) = damped.lu().solve(&gradient) else {
                lambda *= 10.0;
                continue;
            };

            let mut candidate = &params + &delta;
            bounds.clamp(&mut candidate);
            let step: DVector<f64> = &candidate - &params;
            let candidate_cost = residual_cost(&f, x, y, candidate.as_slice());

            if candidate_cost.is_finite() && candidate_cost < cost {
                let cost_decrease = cost - candidate_cost;
                let step_size = step.amax();
                params = candidate;
                lambda = (lambda * 0.1).max(1e-12);
                if cost_decrease <= FTOL * cost.max(1e-30) || step_size <= XTOL {
                    converged = true;
                }
                cost = candidate_cost;
                stepped = true;
                break;
            }
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
        }

        if !stepped {
            // No downhill step exists within the bounds: a (possibly
            // boundary) local minimum.
            converged = true;
        }
        if converged {
            break;
        }
    }

    if !converged {
        return Err(FitError::DidNotConverge(MAX_ITERATIONS));
    }

    let jacobian = forward_jacobian(&f, x, params.as_slice(), bounds);
    let covariance = covariance_matrix(&jacobian, cost, n, m);

    log::trace!("fit converged after {iterations} iterations, rss {cost:.6e}");

    Ok(Fit {
        params: params.as_slice().to_vec(),
        covariance,
        residual_sum_of_squares: cost,
        iterations,
    })
}

fn validate_input(x: &[f64], y: &[f64], p0: &[f64], bounds: &Bounds) -> Result<(), FitError> {
    if x.len() != y.len() {
        return Err(FitError::InvalidInput {
            message: format!("x has {} entries but y has {}", x.len(), y.len()),
        });
    }
    if bounds.lower.len() != p0.len() || bounds.upper.len() != p0.len() {
        return Err(FitError::InvalidInput {
            message: "bounds do not match the parameter count".to_string(),
        });
    }
    for i in 0..p0.len() {
        if bounds.lower[i] > bounds.upper[i] {
            return Err(FitError::InvalidInput {
                message: format!("lower bound exceeds upper bound for parameter {i}"),
            });
        }
    }
    Ok(())
}

fn residual_vector<F>(f: &F, x: &[f64], y: &[f64], params: &[f64]) -> DVector<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    DVector::from_iterator(x.len(), x.iter().zip(y).map(|(&xi, &yi)| yi - f(xi, params)))
}

fn residual_cost<F>(f: &F, x: &[f64], y: &[f64], params: &[f64]) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - f(xi, params);
            r * r
        })
        .sum()
}

/// Forward-difference Jacobian of the model (not the residuals) at
/// `params`. Steps flip direction at the bounds so evaluations stay
/// inside the rectangle.
fn forward_jacobian<F>(f: &F, x: &[f64], params: &[f64], bounds: &Bounds) -> DMatrix<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x.len();
    let m = params.len();
    let base: Vec<f64> = x.iter().map(|&xi| f(xi, params)).collect();
    let mut jacobian = DMatrix::zeros(n, m);

    let sqrt_eps = f64::EPSILON.sqrt();
    let mut perturbed = params.to_vec();
    for j in 0..m {
        let mut h = sqrt_eps * params[j].abs().max(1e-3);
        if params[j] + h > bounds.upper[j] {
            h = -h;
        }
        perturbed[j] = params[j] + h;
        for i in 0..n {
            jacobian[(i, j)] = (f(x[i], &perturbed) - base[i]) / h;
        }
        perturbed[j] = params[j];
    }
    jacobian
}

/// `(JᵀJ)⁻¹ · s²` with `s² = RSS / (n − m)`, via pseudo-inverse so a
/// rank-deficient Jacobian yields large (or non-finite) variances
/// instead of a panic.
fn covariance_matrix(jacobian: &DMatrix<f64>, rss: f64, n: usize, m: usize) -> DMatrix<f64> {
    #[allow(clippy::cast_precision_loss)]
    let dof = (n - m) as f64;
    let s2 = rss / dof;
    let jtj = jacobian.transpose() * jacobian;
    jtj.svd(true, true)
        .pseudo_inverse(1e-12)
        .map_or_else(|_| DMatrix::from_element(m, m, f64::NAN), |inv| inv * s2)
}
