//! Constant-mean GARCH(p,q) with Gaussian innovations.
//!
//! ```text
//! r_t       = mu + e_t
//! sigma2_t  = omega + sum_i alpha_i * e_{t-i}^2 + sum_j beta_j * sigma2_{t-j}
//! ```
//!
//! Pre-sample squared residuals and variances are replaced by an
//! exponentially weighted backcast of the first 75 squared residuals.
//! Parameters are estimated by maximum likelihood over an unconstrained
//! reparameterisation that keeps `omega > 0`, every `alpha_i, beta_j > 0`
//! and `sum(alpha) + sum(beta) < 1`.

use super::simplex::{self, SimplexOptions};
use super::{FitError, VolatilityEstimator};
use crate::domain::ReturnSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const BACKCAST_WINDOW: usize = 75;
const BACKCAST_DECAY: f64 = 0.94;
const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Starting (total alpha, total beta) pairs; the best-scoring one seeds the search.
const START_GRID: [(f64, f64); 3] = [(0.05, 0.90), (0.10, 0.85), (0.20, 0.70)];

/// Estimated GARCH parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchParams {
    pub mu: f64,
    pub omega: f64,
    pub alpha: Vec<f64>,
    pub beta: Vec<f64>,
}

impl GarchParams {
    /// Sum of all alpha and beta terms; below 1 means mean-reverting variance.
    pub fn persistence(&self) -> f64 {
        self.alpha.iter().sum::<f64>() + self.beta.iter().sum::<f64>()
    }

    /// Long-run variance the forecast reverts to.
    pub fn unconditional_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence())
    }

    fn has_non_finite(&self) -> bool {
        !self.mu.is_finite()
            || !self.omega.is_finite()
            || self.alpha.iter().chain(&self.beta).any(|v| !v.is_finite())
    }

    /// Map an unconstrained vector `[mu, ln omega, z_1 .. z_{p+q}]` to parameters.
    fn from_unconstrained(theta: &[f64], p: usize) -> Self {
        let z = &theta[2..];
        let m = z.iter().copied().fold(0.0_f64, f64::max);
        let exps: Vec<f64> = z.iter().map(|v| (v - m).exp()).collect();
        let denom = (-m).exp() + exps.iter().sum::<f64>();
        let weights: Vec<f64> = exps.iter().map(|e| e / denom).collect();

        Self {
            mu: theta[0],
            omega: theta[1].exp(),
            alpha: weights[..p].to_vec(),
            beta: weights[p..].to_vec(),
        }
    }

    /// Inverse of [`Self::from_unconstrained`]; requires persistence < 1.
    fn to_unconstrained(&self) -> Vec<f64> {
        let rest = 1.0 - self.persistence();
        let mut theta = vec![self.mu, self.omega.ln()];
        theta.extend(self.alpha.iter().chain(&self.beta).map(|w| (w / rest).ln()));
        theta
    }
}

/// Conditional variance path for the given residuals.
fn variance_path(params: &GarchParams, resid: &[f64], backcast: f64) -> Vec<f64> {
    let n = resid.len();
    let mut sigma2 = Vec::with_capacity(n);
    for t in 0..n {
        let mut s = params.omega;
        for (i, a) in params.alpha.iter().enumerate() {
            let lag = i + 1;
            s += a * if t >= lag { resid[t - lag].powi(2) } else { backcast };
        }
        for (j, b) in params.beta.iter().enumerate() {
            let lag = j + 1;
            s += b * if t >= lag { sigma2[t - lag] } else { backcast };
        }
        sigma2.push(s);
    }
    sigma2
}

/// Gaussian negative log-likelihood; +inf for any invalid variance.
fn negative_log_likelihood(params: &GarchParams, returns: &[f64], backcast: f64) -> f64 {
    let resid: Vec<f64> = returns.iter().map(|r| r - params.mu).collect();
    let sigma2 = variance_path(params, &resid, backcast);
    let mut nll = 0.0;
    for (e, s) in resid.iter().zip(&sigma2) {
        if *s <= 0.0 || !s.is_finite() {
            return f64::INFINITY;
        }
        nll += 0.5 * (LN_2PI + s.ln() + e * e / s);
    }
    nll
}

/// Exponentially weighted mean of the leading squared residuals.
fn backcast(resid: &[f64]) -> f64 {
    let tau = resid.len().min(BACKCAST_WINDOW);
    let mut weighted = 0.0;
    let mut total = 0.0;
    let mut w = 1.0;
    for e in &resid[..tau] {
        weighted += w * e * e;
        total += w;
        w *= BACKCAST_DECAY;
    }
    weighted / total
}

/// A fitted GARCH(p,q) model: parameters plus the state needed to forecast.
///
/// Immutable once built. Serializes losslessly so a reloaded model forecasts
/// bit-identically to the one that was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedGarch {
    pub p: usize,
    pub q: usize,
    pub params: GarchParams,
    /// Date of the last training observation; forecasts start after it.
    pub last_date: NaiveDate,
    pub n_obs: usize,
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: usize,
    backcast: f64,
    /// Last `p` squared residuals, oldest first (backcast-padded).
    resid_sq_tail: Vec<f64>,
    /// Last `q` conditional variances, oldest first (backcast-padded).
    sigma2_tail: Vec<f64>,
}

impl FittedGarch {
    fn num_params(&self) -> usize {
        2 + self.p + self.q
    }

    /// Pre-sample variance used to start the recursion.
    pub fn backcast(&self) -> f64 {
        self.backcast
    }

    /// Check that orders, coefficient vectors and forecast state agree.
    ///
    /// Deserialised models are not trusted: a model that passes this check
    /// can forecast without indexing out of bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.p < 1 || self.q < 1 {
            return Err(format!("lag orders must be at least 1 (p={}, q={})", self.p, self.q));
        }
        let lengths = [
            ("alpha", self.params.alpha.len(), self.p),
            ("beta", self.params.beta.len(), self.q),
            ("resid_sq_tail", self.resid_sq_tail.len(), self.p),
            ("sigma2_tail", self.sigma2_tail.len(), self.q),
        ];
        for (name, len, expected) in lengths {
            if len != expected {
                return Err(format!("{name} has {len} entries, expected {expected}"));
            }
        }
        if self.params.has_non_finite()
            || !self.backcast.is_finite()
            || self
                .resid_sq_tail
                .iter()
                .chain(&self.sigma2_tail)
                .any(|v| !v.is_finite())
        {
            return Err("non-finite parameter or forecast state".into());
        }
        Ok(())
    }

    /// Akaike information criterion.
    pub fn aic(&self) -> f64 {
        2.0 * self.num_params() as f64 - 2.0 * self.log_likelihood
    }

    /// Bayesian information criterion.
    pub fn bic(&self) -> f64 {
        self.num_params() as f64 * (self.n_obs as f64).ln() - 2.0 * self.log_likelihood
    }

    /// Analytic h-step variance forecasts for h = 1..=horizon.
    ///
    /// Future squared residuals are replaced by their expectation, the
    /// forecast variance for that step.
    pub fn forecast_variance(&self, horizon: usize) -> Vec<f64> {
        let mut e2 = self.resid_sq_tail.clone();
        let mut s2 = self.sigma2_tail.clone();
        let mut out = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let mut next = self.params.omega;
            for (i, a) in self.params.alpha.iter().enumerate() {
                next += a * e2[e2.len() - 1 - i];
            }
            for (j, b) in self.params.beta.iter().enumerate() {
                next += b * s2[s2.len() - 1 - j];
            }
            out.push(next);
            e2.push(next);
            s2.push(next);
        }
        out
    }
}

/// Default estimator: Nelder–Mead maximum likelihood.
#[derive(Debug, Clone, Default)]
pub struct GarchEstimator {
    pub options: SimplexOptions,
}

impl GarchEstimator {
    pub fn new(options: SimplexOptions) -> Self {
        Self { options }
    }
}

fn tail_padded(values: &[f64], len: usize, pad: f64) -> Vec<f64> {
    let take = values.len().min(len);
    let mut out = vec![pad; len - take];
    out.extend_from_slice(&values[values.len() - take..]);
    out
}

impl VolatilityEstimator for GarchEstimator {
    fn fit(&self, series: &ReturnSeries, p: usize, q: usize) -> Result<FittedGarch, FitError> {
        if p < 1 || q < 1 {
            return Err(FitError::InvalidOrder { p, q });
        }
        let last_date = series.last_date().ok_or(FitError::EmptySeries)?;
        let returns = series.values();
        if let Some(index) = returns.iter().position(|r| !r.is_finite()) {
            return Err(FitError::NonFiniteInput { index });
        }

        let n = returns.len();
        let mean = returns.iter().sum::<f64>() / n as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64;
        if variance <= 0.0 || !variance.is_finite() {
            return Err(FitError::DegenerateSeries);
        }

        let start_resid: Vec<f64> = returns.iter().map(|r| r - mean).collect();
        let bc = backcast(&start_resid);
        let objective = |theta: &[f64]| {
            negative_log_likelihood(&GarchParams::from_unconstrained(theta, p), &returns, bc)
        };

        let start = START_GRID
            .iter()
            .map(|&(a, b)| {
                let params = GarchParams {
                    mu: mean,
                    omega: variance * (1.0 - a - b),
                    alpha: vec![a / p as f64; p],
                    beta: vec![b / q as f64; q],
                };
                let theta = params.to_unconstrained();
                let score = objective(&theta);
                (theta, score)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(theta, _)| theta)
            .ok_or_else(|| FitError::Estimation("no starting values".into()))?;

        let mut steps = vec![0.5; start.len()];
        steps[0] = 0.1 * variance.sqrt();

        let result = simplex::minimize(objective, &start, &steps, &self.options);
        if !result.fx.is_finite() {
            return Err(FitError::Estimation(format!(
                "log-likelihood is not finite after {} iterations",
                result.iterations
            )));
        }

        let params = GarchParams::from_unconstrained(&result.x, p);
        if params.has_non_finite() {
            return Err(FitError::Estimation(
                "estimated parameters are not finite".into(),
            ));
        }

        if result.converged {
            debug!(p, q, n, iterations = result.iterations, "GARCH fit converged");
        } else {
            warn!(
                p,
                q,
                n,
                iterations = result.iterations,
                "GARCH optimiser stopped at iteration cap; estimates may be imprecise"
            );
        }

        let resid: Vec<f64> = returns.iter().map(|r| r - params.mu).collect();
        let sigma2 = variance_path(&params, &resid, bc);
        let resid_sq: Vec<f64> = resid.iter().map(|e| e * e).collect();

        Ok(FittedGarch {
            p,
            q,
            last_date,
            n_obs: n,
            log_likelihood: -result.fx,
            converged: result.converged,
            iterations: result.iterations,
            backcast: bc,
            resid_sq_tail: tail_padded(&resid_sq, p, bc),
            sigma2_tail: tail_padded(&sigma2, q, bc),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReturnPoint, ReturnSeries};

    fn series_from(values: &[f64]) -> ReturnSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        ReturnSeries::from_points(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| ReturnPoint {
                    date: start + chrono::Duration::days(i as i64),
                    pct_return: v,
                })
                .collect(),
        )
    }

    /// Deterministic GARCH(1,1) sample driven by a small LCG.
    fn simulated_returns(n: usize) -> Vec<f64> {
        let (omega, alpha, beta): (f64, f64, f64) = (0.05, 0.08, 0.9);
        let mut state: u64 = 42;
        let mut uniform = || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
        };
        let mut sigma2 = omega / (1.0 - alpha - beta);
        let mut prev_e2 = sigma2;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            sigma2 = omega + alpha * prev_e2 + beta * sigma2;
            // Box–Muller
            let z = (-2.0 * uniform().ln()).sqrt() * (2.0 * std::f64::consts::PI * uniform()).cos();
            let e = sigma2.sqrt() * z;
            prev_e2 = e * e;
            out.push(0.03 + e);
        }
        out
    }

    #[test]
    fn unconstrained_mapping_roundtrips() {
        let params = GarchParams {
            mu: 0.1,
            omega: 0.2,
            alpha: vec![0.05, 0.03],
            beta: vec![0.8],
        };
        let back = GarchParams::from_unconstrained(&params.to_unconstrained(), 2);

        assert!((back.mu - 0.1).abs() < 1e-12);
        assert!((back.omega - 0.2).abs() < 1e-12);
        assert!((back.alpha[1] - 0.03).abs() < 1e-12);
        assert!((back.beta[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn mapping_keeps_constraints_for_extreme_inputs() {
        let params = GarchParams::from_unconstrained(&[0.0, -5.0, 800.0, 750.0], 1);
        assert!(params.omega > 0.0);
        assert!(params.persistence() < 1.0 + 1e-12);
        assert!(params.alpha[0] >= 0.0 && params.beta[0] >= 0.0);
    }

    #[test]
    fn backcast_of_constant_residuals_is_their_square() {
        assert!((backcast(&[2.0; 100]) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_invalid_orders() {
        let series = series_from(&[1.0, -1.0, 0.5]);
        let est = GarchEstimator::default();
        assert!(matches!(
            est.fit(&series, 0, 1),
            Err(FitError::InvalidOrder { p: 0, q: 1 })
        ));
        assert!(matches!(est.fit(&series, 1, 0), Err(FitError::InvalidOrder { .. })));
    }

    #[test]
    fn rejects_empty_and_constant_series() {
        let est = GarchEstimator::default();
        assert!(matches!(est.fit(&series_from(&[]), 1, 1), Err(FitError::EmptySeries)));
        assert!(matches!(
            est.fit(&series_from(&[0.5; 20]), 1, 1),
            Err(FitError::DegenerateSeries)
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        let est = GarchEstimator::default();
        let err = est.fit(&series_from(&[1.0, f64::NAN, 2.0]), 1, 1).unwrap_err();
        assert!(matches!(err, FitError::NonFiniteInput { index: 1 }));
    }

    #[test]
    fn recovers_simulated_parameters_roughly() {
        let series = series_from(&simulated_returns(2_000));
        let model = GarchEstimator::default().fit(&series, 1, 1).unwrap();

        assert!(model.log_likelihood.is_finite());
        assert!(model.params.persistence() < 1.0);
        assert!(model.params.persistence() > 0.7, "{:?}", model.params);
        assert!(model.params.beta[0] > model.params.alpha[0]);
        assert!(model.aic() < model.bic());
    }

    #[test]
    fn forecast_reverts_toward_unconditional_variance() {
        let series = series_from(&simulated_returns(1_000));
        let model = GarchEstimator::default().fit(&series, 1, 1).unwrap();
        let fc = model.forecast_variance(500);
        let long_run = model.params.unconditional_variance();

        assert_eq!(fc.len(), 500);
        assert!(fc.iter().all(|v| *v > 0.0));
        let first_gap = (fc[0] - long_run).abs();
        let last_gap = (fc[499] - long_run).abs();
        assert!(last_gap <= first_gap + 1e-12);
    }

    #[test]
    fn higher_orders_fit_and_forecast() {
        let series = series_from(&simulated_returns(600));
        let model = GarchEstimator::default().fit(&series, 2, 2).unwrap();

        assert_eq!(model.params.alpha.len(), 2);
        assert_eq!(model.params.beta.len(), 2);
        assert_eq!(model.forecast_variance(3).len(), 3);
    }

    #[test]
    fn tiny_series_still_fits() {
        let series = series_from(&[2.0, -2.941_176_470_588_235]);
        let model = GarchEstimator::default().fit(&series, 1, 1).unwrap();
        let fc = model.forecast_variance(2);

        assert_eq!(fc.len(), 2);
        assert!(fc.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn fitted_model_is_consistent_and_tampering_is_caught() {
        let series = series_from(&simulated_returns(300));
        let model = GarchEstimator::default().fit(&series, 2, 1).unwrap();
        assert!(model.validate().is_ok());
        assert!(model.backcast() > 0.0);

        let mut short_tail = model.clone();
        short_tail.resid_sq_tail.pop();
        assert!(short_tail.validate().unwrap_err().contains("resid_sq_tail"));

        let mut extra_beta = model.clone();
        extra_beta.params.beta.push(0.01);
        assert!(extra_beta.validate().unwrap_err().contains("beta"));

        let mut zero_order = model.clone();
        zero_order.q = 0;
        assert!(zero_order.validate().is_err());

        let mut bad_backcast = model;
        bad_backcast.backcast = f64::NAN;
        assert!(bad_backcast.validate().is_err());
    }

    #[test]
    fn fit_does_not_mutate_series() {
        let series = series_from(&simulated_returns(200));
        let before = series.clone();
        let _ = GarchEstimator::default().fit(&series, 1, 1).unwrap();
        assert_eq!(series, before);
    }
}
