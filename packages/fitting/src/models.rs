//! The growth-model family.
//!
//! Six monotone growth shapes plus a double sigmoid for series with two
//! discernible growth bursts. Each variant carries its own initial
//! guess, parameter bounds, closed form, and asymptote; all are fitted
//! with [`curve_fit`] and compared by mean absolute error.

use crate::least_squares::{curve_fit, Bounds, Fit, FitError};
use crate::{Coefficient, FittedModel};

/// Two-sided 95% quantile of the standard normal distribution.
const Z_975: f64 = 1.959_963_984_540_054;

/// Candidate growth models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthModel {
    /// Logistic with the inflection guessed at the series midpoint.
    SigmoidMid,
    /// Logistic with the inflection guessed where the series first
    /// crosses half of its maximum.
    SigmoidHalfMax,
    /// Three-parameter logistic, `asym / (1 + e^((xmid - x) / scal))`.
    Logistic3,
    /// Four-parameter logistic with a free left asymptote.
    Logistic4,
    /// Asymptotic regression (exponential approach to a plateau).
    AsymptoticRegression,
    /// Michaelis–Menten saturation curve.
    MichaelisMenten,
    /// Superposition of two hyperbolic-tangent steps.
    DoubleSigmoid,
}

impl GrowthModel {
    /// All candidates, in fitting order.
    pub const ALL: [Self; 7] = [
        Self::SigmoidMid,
        Self::SigmoidHalfMax,
        Self::Logistic3,
        Self::Logistic4,
        Self::AsymptoticRegression,
        Self::MichaelisMenten,
        Self::DoubleSigmoid,
    ];

    /// Human-readable model name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SigmoidMid => "Sigmoid model",
            Self::SigmoidHalfMax => "Sigmoid model (half-max start)",
            Self::Logistic3 => "Logistic model",
            Self::Logistic4 => "Four-parameter logistic model",
            Self::AsymptoticRegression => "Asymptotic regression model",
            Self::MichaelisMenten => "Michaelis-Menten model",
            Self::DoubleSigmoid => "Double sigmoid model",
        }
    }

    /// Closed-form formula.
    #[must_use]
    pub const fn formula(self) -> &'static str {
        match self {
            Self::SigmoidMid | Self::SigmoidHalfMax => "f(x) = L / (1 + e^(-k * (x - x_0)))",
            Self::Logistic3 => "f(x) = asym / (1 + e^((xmid - x) / scal))",
            Self::Logistic4 => "f(x) = A + (B - A) / (1 + e^((xmid - x) / scal))",
            Self::AsymptoticRegression => "f(x) = asym + (R0 - asym) * e^(-e^(lrc) * x)",
            Self::MichaelisMenten => "f(x) = Vm * x / (K + x)",
            Self::DoubleSigmoid => {
                "f(x) = e + (f - e) / 2 * (tanh(k * (x - b)) + 1) \
                 + (Z - f) / 2 * (tanh(k * (x - c)) + 1)"
            }
        }
    }

    /// Parameter names, in formula order.
    #[must_use]
    pub const fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::SigmoidMid | Self::SigmoidHalfMax => &["x_0", "k", "L"],
            Self::Logistic3 => &["asym", "xmid", "scal"],
            Self::Logistic4 => &["A", "B", "xmid", "scal"],
            Self::AsymptoticRegression => &["asym", "R0", "lrc"],
            Self::MichaelisMenten => &["Vm", "K"],
            Self::DoubleSigmoid => &["e", "f", "k", "b", "Z", "c"],
        }
    }

    /// Index of the asymptote within the parameter vector.
    #[must_use]
    pub const fn asymptote_index(self) -> usize {
        match self {
            Self::SigmoidMid | Self::SigmoidHalfMax => 2,
            Self::Logistic3 | Self::AsymptoticRegression | Self::MichaelisMenten => 0,
            Self::Logistic4 => 1,
            Self::DoubleSigmoid => 4,
        }
    }

    /// Evaluates the model at `x` with parameters `p`.
    #[must_use]
    pub fn eval(self, x: f64, p: &[f64]) -> f64 {
        match self {
            Self::SigmoidMid | Self::SigmoidHalfMax => p[2] * stable_logistic(p[1] * (x - p[0])),
            Self::Logistic3 => p[0] * stable_logistic((x - p[1]) / p[2]),
            Self::Logistic4 => p[0] + (p[1] - p[0]) * stable_logistic((x - p[2]) / p[3]),
            Self::AsymptoticRegression => p[0] + (p[1] - p[0]) * (-p[2].exp() * x).exp(),
            Self::MichaelisMenten => p[0] * x / (p[1] + x),
            Self::DoubleSigmoid => {
                p[0] + (p[1] - p[0]) * 0.5 * ((p[2] * (x - p[3])).tanh() + 1.0)
                    + (p[4] - p[1]) * 0.5 * ((p[2] * (x - p[5])).tanh() + 1.0)
            }
        }
    }

    fn initial_guess(self, x: &[f64], y: &[f64]) -> Vec<f64> {
        #[allow(clippy::cast_precision_loss)]
        let n = x.len() as f64;
        let y_max = max_of(y);
        let y_min = min_of(y);
        let half_max_x = half_max_position(x, y);

        match self {
            Self::SigmoidMid => vec![n / 2.0, 0.1, y_max],
            Self::SigmoidHalfMax => vec![half_max_x, 0.25, 0.95 * y_max],
            Self::Logistic3 => vec![1.05 * y_max, half_max_x, n / 10.0],
            Self::Logistic4 => vec![y_min, y_max, half_max_x, n / 10.0],
            Self::AsymptoticRegression => vec![y_max, y[0], (2.0 / n).ln()],
            Self::MichaelisMenten => vec![1.2 * y_max, half_max_x.max(1.0)],
            Self::DoubleSigmoid => vec![
                y_min,
                (y_min + y_max) / 2.0,
                0.1,
                n / 4.0,
                y_max,
                3.0 * n / 4.0,
            ],
        }
    }

    fn bounds(self, x: &[f64], y: &[f64]) -> Bounds {
        #[allow(clippy::cast_precision_loss)]
        let n = x.len() as f64;
        let y_max = max_of(y);

        match self {
            Self::SigmoidMid | Self::SigmoidHalfMax => Bounds::new(
                vec![0.0, 1e-4, 0.0],
                vec![1.5 * n, 1.0, y_max],
            ),
            Self::Logistic3 => Bounds::new(
                vec![1e-9, 0.0, 0.5],
                vec![2.0 * y_max, 1.5 * n, n],
            ),
            Self::Logistic4 => Bounds::new(
                vec![0.0, 1e-9, 0.0, 0.5],
                vec![y_max, 2.0 * y_max, 1.5 * n, n],
            ),
            Self::AsymptoticRegression => Bounds::new(
                vec![1e-9, 0.0, -10.0],
                vec![5.0 * y_max, y_max, 2.0],
            ),
            Self::MichaelisMenten => Bounds::new(
                vec![1e-9, 1e-6],
                vec![10.0 * y_max, 10.0 * n],
            ),
            Self::DoubleSigmoid => Bounds::new(
                vec![0.0, 0.0, 1e-4, 0.0, 1e-9, 0.0],
                vec![y_max, 2.0 * y_max, 1.0, n, 2.0 * y_max, 1.5 * n],
            ),
        }
    }

    /// Fits this model to `(x, y)` and derives the asymptote, its 95%
    /// confidence interval, and the mean absolute error.
    ///
    /// # Errors
    ///
    /// Propagates [`FitError`] from the solver; a failed fit on one
    /// model is expected and simply removes it from the candidate set.
    pub fn fit(self, x: &[f64], y: &[f64]) -> Result<FittedModel, FitError> {
        let p0 = self.initial_guess(x, y);
        let bounds = self.bounds(x, y);
        let fit: Fit = curve_fit(|xi, p| self.eval(xi, p), x, y, &p0, &bounds)?;

        let fitted_values: Vec<f64> = x.iter().map(|&xi| self.eval(xi, &fit.params)).collect();
        #[allow(clippy::cast_precision_loss)]
        let mae = fitted_values
            .iter()
            .zip(y)
            .map(|(fv, yv)| (yv - fv).abs())
            .sum::<f64>()
            / y.len() as f64;

        let asym_index = self.asymptote_index();
        let asymptote = fit.params[asym_index];
        let variance = fit.covariance[(asym_index, asym_index)];
        let std_error = if variance.is_finite() && variance >= 0.0 {
            variance.sqrt()
        } else {
            f64::NAN
        };
        let dof = y.len() - fit.params.len();
        let t = t_quantile_975(dof);

        let coefficients = self
            .parameter_names()
            .iter()
            .zip(&fit.params)
            .map(|(name, &value)| Coefficient {
                name: (*name).to_string(),
                value,
            })
            .collect();

        Ok(FittedModel {
            name: self.name().to_string(),
            formula: self.formula().to_string(),
            coefficients,
            fitted_values,
            asymptote,
            asymptote_conf_int: [asymptote - t * std_error, asymptote + t * std_error],
            mae,
            n_params: fit.params.len(),
        })
    }
}

/// Selects the best fit by mean absolute error.
///
/// Among candidates whose MAE is within 1% of the minimum, the one with
/// the fewest parameters wins. This breaks borderline single- versus
/// double-sigmoid selections towards the lower-dimensional model.
#[must_use]
pub fn select_best(fits: &[FittedModel]) -> Option<&FittedModel> {
    let best_mae = fits
        .iter()
        .map(|fit| fit.mae)
        .min_by(f64::total_cmp)?;
    fits.iter()
        .filter(|fit| fit.mae <= best_mae * 1.01)
        .min_by(|a, b| {
            a.n_params
                .cmp(&b.n_params)
                .then_with(|| a.mae.total_cmp(&b.mae))
        })
}

/// Two-sided 95% Student-t quantile (the 0.975 point) for `dof` degrees
/// of freedom.
///
/// Cornish–Fisher expansion around the normal quantile; accurate to a
/// few 1e-3 for the series lengths the indicators work with (36 months
/// and up).
#[must_use]
pub fn t_quantile_975(dof: usize) -> f64 {
    if dof == 0 {
        return f64::INFINITY;
    }
    #[allow(clippy::cast_precision_loss)]
    let df = dof as f64;
    let z = Z_975;
    let z3 = z.powi(3);
    let z5 = z.powi(5);
    let z7 = z.powi(7);
    z + (z3 + z) / (4.0 * df)
        + (5.0 * z5 + 16.0 * z3 + 3.0 * z) / (96.0 * df.powi(2))
        + (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / (384.0 * df.powi(3))
}

/// Overflow-safe `1 / (1 + e^(-t))`.
fn stable_logistic(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// The x position where the series first reaches half of its maximum;
/// the series midpoint when it never does.
fn half_max_position(x: &[f64], y: &[f64]) -> f64 {
    let half = max_of(y) / 2.0;
    y.iter()
        .position(|&v| v >= half)
        .map_or_else(
            || {
                #[allow(clippy::cast_precision_loss)]
                let n = x.len() as f64;
                n / 2.0
            },
            |i| x[i],
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(model: GrowthModel, p: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| model.eval(xi, p)).collect();
        (x, y)
    }

    #[test]
    fn sigmoid_fit_recovers_plateau() {
        let (x, y) = series(GrowthModel::SigmoidMid, &[50.0, 0.2, 800.0], 150);
        let fit = GrowthModel::SigmoidMid.fit(&x, &y).unwrap();
        assert!((fit.asymptote - 800.0).abs() < 10.0);
        assert!(fit.mae < 5.0);
        assert_eq!(fit.fitted_values.len(), 150);
        assert!(fit.is_valid(0.0));
    }

    #[test]
    fn michaelis_menten_fit_recovers_parameters() {
        let (x, y) = series(GrowthModel::MichaelisMenten, &[500.0, 20.0], 120);
        let fit = GrowthModel::MichaelisMenten.fit(&x, &y).unwrap();
        assert!((fit.asymptote - 500.0).abs() < 25.0);
        assert_eq!(fit.n_params, 2);
    }

    #[test]
    fn asymptotic_regression_fit_recovers_plateau() {
        let (x, y) = series(
            GrowthModel::AsymptoticRegression,
            &[1000.0, 10.0, (0.05_f64).ln()],
            120,
        );
        let fit = GrowthModel::AsymptoticRegression.fit(&x, &y).unwrap();
        assert!((fit.asymptote - 1000.0).abs() < 50.0);
    }

    #[test]
    fn fitted_values_match_input_length_and_are_finite() {
        let (x, y) = series(GrowthModel::Logistic3, &[600.0, 40.0, 12.0], 100);
        for model in GrowthModel::ALL {
            if let Ok(fit) = model.fit(&x, &y) {
                assert_eq!(fit.fitted_values.len(), x.len(), "{}", model.name());
                assert!(
                    fit.fitted_values.iter().all(|v| v.is_finite()),
                    "{}",
                    model.name()
                );
            }
        }
    }

    #[test]
    fn selection_picks_smallest_mae() {
        let make = |name: &str, mae: f64, n_params: usize| FittedModel {
            name: name.to_string(),
            formula: String::new(),
            coefficients: vec![],
            fitted_values: vec![],
            asymptote: 1.0,
            asymptote_conf_int: [0.5, 1.5],
            mae,
            n_params,
        };
        let fits = vec![make("a", 10.0, 3), make("b", 4.0, 4), make("c", 7.0, 3)];
        assert_eq!(select_best(&fits).unwrap().name, "b");
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn selection_breaks_near_ties_towards_fewer_parameters() {
        let make = |name: &str, mae: f64, n_params: usize| FittedModel {
            name: name.to_string(),
            formula: String::new(),
            coefficients: vec![],
            fitted_values: vec![],
            asymptote: 1.0,
            asymptote_conf_int: [0.5, 1.5],
            mae,
            n_params,
        };
        // Double sigmoid wins on raw MAE by less than 1%.
        let fits = vec![make("double", 1.000, 6), make("single", 1.005, 3)];
        assert_eq!(select_best(&fits).unwrap().name, "single");
        // A clear win stays with the double sigmoid.
        let fits = vec![make("double", 1.0, 6), make("single", 1.2, 3)];
        assert_eq!(select_best(&fits).unwrap().name, "double");
    }

    #[test]
    fn t_quantile_matches_reference_values() {
        assert!((t_quantile_975(10) - 2.2281).abs() < 0.01);
        assert!((t_quantile_975(30) - 2.0423).abs() < 0.005);
        assert!((t_quantile_975(120) - 1.9799).abs() < 0.002);
        assert!((t_quantile_975(100_000) - Z_975).abs() < 1e-3);
        assert!(t_quantile_975(0).is_infinite());
    }

    #[test]
    fn stable_logistic_does_not_overflow() {
        assert!((stable_logistic(1000.0) - 1.0).abs() < 1e-12);
        assert!(stable_logistic(-1000.0).abs() < 1e-12);
        assert!((stable_logistic(0.0) - 0.5).abs() < 1e-12);
    }
}
