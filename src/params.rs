use rand::Rng;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::lang::{v, Var};

/// A vector of program parameters. The key set is fixed at construction:
/// assigning an absent key fails, and arithmetic between two vectors
/// requires identical key sets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamVector {
  vals: HashMap<Var, f64>,
}

impl ParamVector {
  pub fn new(vals: impl IntoIterator<Item = (Var, f64)>) -> Self {
    ParamVector {
      vals: vals.into_iter().collect(),
    }
  }

  /// A vector with the same keys as `other`, all zero.
  pub fn zeros_like(other: &ParamVector) -> Self {
    ParamVector::new(other.keys().map(|k| (k, 0.0)))
  }

  /// A vector over `keys` with components drawn uniformly from [0, 1).
  pub fn random(keys: impl IntoIterator<Item = Var>, rng: &mut impl Rng) -> Self {
    ParamVector::new(keys.into_iter().map(|k| (k, rng.gen::<f64>())))
  }

  pub fn len(&self) -> usize {
    self.vals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vals.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = Var> + '_ {
    self.vals.keys().copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = (Var, f64)> + '_ {
    self.vals.iter().map(|(k, x)| (*k, *x))
  }

  pub fn get(&self, key: Var) -> Result<f64> {
    self
      .vals
      .get(&key)
      .copied()
      .ok_or(Error::UndefinedParam(key))
  }

  /// Assign to an existing key. Assigning a key outside the vector's key
  /// set is an error, not an insertion.
  pub fn set(&mut self, key: Var, val: f64) -> Result<()> {
    match self.vals.get_mut(&key) {
      Some(slot) => {
        *slot = val;
        Ok(())
      }
      None => Err(Error::UndefinedParam(key)),
    }
  }

  fn check_keys_match(&self, other: &ParamVector) -> Result<()> {
    if self.vals.len() == other.vals.len() && self.keys().all(|k| other.vals.contains_key(&k)) {
      return Ok(());
    }
    let sorted = |pv: &ParamVector| {
      let mut names: Vec<String> = pv.keys().map(|k| k.to_string()).collect();
      names.sort();
      names
    };
    Err(Error::KeysMismatch {
      this: sorted(self),
      other: sorted(other),
    })
  }

  pub fn add(&self, other: &ParamVector) -> Result<ParamVector> {
    self.check_keys_match(other)?;
    Ok(ParamVector::new(
      self.iter().map(|(k, x)| (k, x + other.vals[&k])),
    ))
  }

  pub fn sub(&self, other: &ParamVector) -> Result<ParamVector> {
    self.check_keys_match(other)?;
    Ok(ParamVector::new(
      self.iter().map(|(k, x)| (k, x - other.vals[&k])),
    ))
  }

  pub fn scale(&self, x: f64) -> ParamVector {
    ParamVector::new(self.iter().map(|(k, y)| (k, y * x)))
  }

  pub fn div(&self, x: f64) -> Result<ParamVector> {
    if x == 0.0 {
      return Err(Error::DivisionByZero);
    }
    Ok(self.scale(1.0 / x))
  }

  pub fn neg(&self) -> ParamVector {
    self.scale(-1.0)
  }

  /// Clamp every component into [low, hi].
  pub fn clamp(&self, low: f64, hi: f64) -> ParamVector {
    ParamVector::new(self.iter().map(|(k, x)| (k, x.clamp(low, hi))))
  }

  pub fn squared_l2_norm(&self) -> f64 {
    self.iter().map(|(_, x)| x * x).sum()
  }

  /// Name-keyed view for persistence; sorted so output is deterministic.
  pub fn to_named(&self) -> BTreeMap<String, f64> {
    self.iter().map(|(k, x)| (k.to_string(), x)).collect()
  }

  pub fn from_named(named: impl IntoIterator<Item = (String, f64)>) -> Self {
    ParamVector::new(named.into_iter().map(|(k, x)| (v(k), x)))
  }
}

impl fmt::Display for ParamVector {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    write!(f, "{{")?;
    for (name, val) in self.to_named() {
      if !first {
        write!(f, ", ")?;
      }
      write!(f, "{}: {}", name, val)?;
      first = false;
    }
    write!(f, "}}")
  }
}
