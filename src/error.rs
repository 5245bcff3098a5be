use thiserror::Error;

use crate::lang::{Pure, Var};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while evaluating a program. All of these
/// are fatal to the current evaluation and propagate to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
  #[error("name {0} not bound")]
  UnboundName(Var),

  #[error("name {0} already bound in local scope")]
  DuplicateBinding(Var),

  #[error("no active scope to bind into")]
  NoActiveScope,

  #[error("truthiness check on non-boolean value {0}")]
  NotABool(Pure),

  #[error("no such parameter {0}")]
  UndefinedParam(Var),

  #[error("keys in vectors do not match (this: {this:?}, other: {other:?})")]
  KeysMismatch {
    this: Vec<String>,
    other: Vec<String>,
  },

  #[error("theta {0} outside the interval [0, 1]")]
  ThetaRange(f64),

  #[error("division by zero")]
  DivisionByZero,

  #[error("empty dataset")]
  EmptyDataset,

  #[error("parse error: {0}")]
  Parse(String),
}
