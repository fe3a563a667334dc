#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nonlinear least squares and the growth-model family used by the
//! Mapping Saturation indicator.
//!
//! Real OSM growth curves range from clean logistic saturation to
//! multi-burst shapes (imports followed by organic growth). A closed
//! family of low-dimensional monotone growth models is fitted with a
//! bounded Levenberg–Marquardt solver; the caller selects among the
//! valid fits by mean absolute error.
//!
//! The family is data, not a class hierarchy: [`GrowthModel`] is a
//! tagged enum whose variants carry their own initial guess, parameter
//! bounds, closed form, and asymptote.

pub mod least_squares;
pub mod models;

use serde::{Deserialize, Serialize};

pub use least_squares::{curve_fit, Bounds, Fit, FitError};
pub use models::{select_best, t_quantile_975, GrowthModel};

/// One named coefficient of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coefficient {
    /// Parameter name within the model formula.
    pub name: String,
    /// Fitted value.
    pub value: f64,
}

/// A growth model fitted to an observed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FittedModel {
    /// Model name.
    pub name: String,
    /// Closed-form formula of the model.
    pub formula: String,
    /// Fitted coefficients, in formula order.
    pub coefficients: Vec<Coefficient>,
    /// Model values at the input x positions; same length as the input.
    pub fitted_values: Vec<f64>,
    /// Estimated asymptote (the curve's plateau).
    pub asymptote: f64,
    /// 95% confidence interval for the asymptote, `[lower, upper]`.
    pub asymptote_conf_int: [f64; 2],
    /// Mean absolute error against the observed series.
    pub mae: f64,
    /// Number of free parameters of the model.
    pub n_params: usize,
}

impl FittedModel {
    /// Whether the fit satisfies the validity criteria.
    ///
    /// Valid means: all fitted values are finite, the asymptote is
    /// positive and strictly greater than the observed minimum, and the
    /// asymptote's 95% confidence interval excludes zero. The solver
    /// already guarantees convergence for any fit that reaches this
    /// point.
    #[must_use]
    pub fn is_valid(&self, observed_min: f64) -> bool {
        self.fitted_values.iter().all(|v| v.is_finite())
            && self.asymptote.is_finite()
            && self.asymptote > 0.0
            && self.asymptote > observed_min
            && self.asymptote_conf_int[0].is_finite()
            && self.asymptote_conf_int[1].is_finite()
            && self.asymptote_conf_int[0] > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted(asymptote: f64, ci: [f64; 2]) -> FittedModel {
        FittedModel {
            name: "Sigmoid model".to_string(),
            formula: String::new(),
            coefficients: vec![],
            fitted_values: vec![1.0, 2.0, 3.0],
            asymptote,
            asymptote_conf_int: ci,
            mae: 0.1,
            n_params: 3,
        }
    }

    #[test]
    fn validity_requires_positive_asymptote_above_minimum() {
        assert!(fitted(10.0, [8.0, 12.0]).is_valid(1.0));
        assert!(!fitted(-1.0, [-2.0, 0.5]).is_valid(1.0));
        assert!(!fitted(0.5, [0.2, 0.9]).is_valid(1.0));
    }

    #[test]
    fn validity_requires_ci_excluding_zero() {
        assert!(!fitted(10.0, [-1.0, 21.0]).is_valid(1.0));
        assert!(!fitted(10.0, [f64::NAN, 12.0]).is_valid(1.0));
    }

    #[test]
    fn validity_requires_finite_fitted_values() {
        let mut fit = fitted(10.0, [8.0, 12.0]);
        fit.fitted_values[1] = f64::INFINITY;
        assert!(!fit.is_valid(1.0));
    }
}
