//! An interpreter and exact-inference engine for a small probabilistic
//! programming language of boolean coin flips: sample programs, compute
//! the exact probability of an output, and differentiate that
//! probability with respect to named parameters.

mod analysis;
mod env;
mod error;
mod infer;
mod lang;
mod learn;
mod params;
mod parse;

pub use analysis::name_analysis;
pub use env::Env;
pub use error::{Error, Result};
pub use lang::{boolean, v, Expr, Program, Pure, Theta, Var};
pub use learn::{avg_nll, avg_nll_gradient, optimize, EPSILON};
pub use params::ParamVector;
