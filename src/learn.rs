//! Maximum-likelihood fitting of program parameters to observed data, by
//! gradient descent on the average negative log-likelihood.

use rand::Rng;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lang::{Program, Pure};
use crate::params::ParamVector;

/// Probabilities are clamped below at this value before taking logs, so a
/// zero-probability data point costs a large finite loss instead of an
/// infinite one.
pub const EPSILON: f64 = 1e-6;

/// Average negative log-likelihood of `data` under `prog` at `params`.
pub fn avg_nll(prog: &Program, params: &ParamVector, data: &[Pure]) -> Result<f64> {
  if data.is_empty() {
    return Err(Error::EmptyDataset);
  }
  let mut acc = 0.0;
  for datum in data {
    debug!(%datum, "scoring datum");
    let prob = prog.infer(params, datum)?.max(EPSILON);
    acc -= prob.ln();
  }
  Ok(acc / data.len() as f64)
}

/// Gradient of [`avg_nll`] with respect to `params`. Uses the same
/// clamped probability in the denominator so the two stay consistent
/// near zero.
pub fn avg_nll_gradient(prog: &Program, params: &ParamVector, data: &[Pure]) -> Result<ParamVector> {
  if data.is_empty() {
    return Err(Error::EmptyDataset);
  }
  let mut grad = ParamVector::zeros_like(params);
  for datum in data {
    let prob = prog.infer(params, datum)?.max(EPSILON);
    grad = grad.sub(&prog.gradient(params, datum)?.div(prob)?)?;
  }
  grad.div(data.len() as f64)
}

/// Fit `prog`'s parameters to `data` by gradient descent from a random
/// starting point. Parameters are clamped back into [0, 1] after each
/// step so every intermediate vector stays a valid flip probability.
pub fn optimize(
  prog: &Program,
  data: &[Pure],
  epochs: usize,
  learning_rate: f64,
  rng: &mut impl Rng,
) -> Result<ParamVector> {
  let mut params = ParamVector::random(prog.params().iter().copied(), rng);
  for epoch in 0..epochs {
    let nll = avg_nll(prog, &params, data)?;
    info!(epoch, nll, "epoch complete");
    let grad = avg_nll_gradient(prog, &params, data)?;
    params = params.sub(&grad.scale(learning_rate))?.clamp(0.0, 1.0);
  }
  Ok(params)
}
