use rand::Rng;

use std::collections::HashSet;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::lang::{boolean, Expr, Program, Pure, Theta, Var};
use crate::params::ParamVector;

impl Pure {
  /// Reduce to canonical form under `env`. Canonical forms are fixed
  /// points: evaluating one again yields the same value.
  pub fn eval(&self, env: &Env) -> Result<Pure> {
    match self {
      Pure::Var(x) => {
        let bound = env.get_binding(*x)?.clone();
        bound.eval(env)
      }
      Pure::True | Pure::False | Pure::Nil => Ok(self.clone()),
      Pure::Cons(head, tail) => Ok(Pure::Cons(
        Box::new(head.eval(env)?),
        Box::new(tail.eval(env)?),
      )),
      Pure::If(cond, then, els) => {
        let cond = cond.eval(env)?;
        match cond.as_bool() {
          Some(true) => then.eval(env),
          Some(false) => els.eval(env),
          None => Err(Error::NotABool(cond)),
        }
      }
    }
  }

  pub fn infer(&self, env: &Env, val: &Pure) -> Result<f64> {
    Ok(if self.eval(env)? == val.eval(env)? {
      1.0
    } else {
      0.0
    })
  }
}

impl Theta {
  /// The probability this flip comes up true. Named parameters resolve
  /// through the environment's parameter vector; the resolved value must
  /// lie in [0, 1].
  pub fn resolve(&self, env: &Env) -> Result<f64> {
    let theta = match self {
      Theta::Lit(x) => *x,
      Theta::Param(p) => env.get_param(*p)?,
    };
    if !(0.0..=1.0).contains(&theta) {
      return Err(Error::ThetaRange(theta));
    }
    Ok(theta)
  }
}

impl Expr {
  /// Draw one value from the program distribution. Sequence bindings go
  /// into the current scope, not a fresh one: they stay visible to
  /// everything lexically after the bind in the same pass.
  pub fn sample(&self, env: &mut Env, rng: &mut impl Rng) -> Result<Pure> {
    match self {
      Expr::Return(p) => p.eval(env),
      Expr::Flip(theta) => {
        let theta = theta.resolve(env)?;
        Ok(boolean(rng.gen::<f64>() < theta))
      }
      Expr::Seq(x, bound, rest) => {
        let val = bound.sample(env, rng)?;
        env.add_binding(*x, val)?;
        rest.sample(env, rng)
      }
    }
  }

  /// The finite set of values this expression can produce under `env`,
  /// ignoring probabilities.
  pub fn possible_vals(&self, env: &mut Env) -> Result<HashSet<Pure>> {
    match self {
      Expr::Return(p) => Ok(HashSet::from([p.eval(env)?])),
      Expr::Flip(_) => Ok(HashSet::from([Pure::True, Pure::False])),
      Expr::Seq(x, bound, rest) => {
        let mut poss = HashSet::new();
        for val in bound.possible_vals(env)? {
          let inner = env.with_binding(*x, val, |env| rest.possible_vals(env))?;
          poss.extend(inner);
        }
        Ok(poss)
      }
    }
  }

  /// Exact probability mass this expression assigns to `val` under `env`.
  pub fn infer(&self, env: &mut Env, val: &Pure) -> Result<f64> {
    match self {
      Expr::Return(p) => p.infer(env, val),
      Expr::Flip(theta) => {
        let theta = theta.resolve(env)?;
        Ok(match val.eval(env)? {
          Pure::True => theta,
          Pure::False => 1.0 - theta,
          _ => 0.0,
        })
      }
      Expr::Seq(x, bound, rest) => {
        // The denotation of a sequence sums, over each possible bound
        // value, the probability of that value times the probability of
        // the continuation under the extended environment:
        //   sum_{u in vals(e1)} [[e1]](u) * [[e2]]{x |-> u}(val)
        let mut prob = 0.0;
        for poss in bound.possible_vals(env)? {
          let term = env.with_binding(*x, poss.clone(), |env| {
            let bound_prob = bound.infer(env, &poss)?;
            Ok(bound_prob * rest.infer(env, val)?)
          })?;
          prob += term;
        }
        Ok(prob)
      }
    }
  }

  /// Derivative of the probability mass at `val` with respect to `param`.
  pub fn deriv(&self, env: &mut Env, param: Var, val: &Pure) -> Result<f64> {
    match self {
      Expr::Return(_) => Ok(0.0),
      Expr::Flip(Theta::Lit(_)) => Ok(0.0),
      Expr::Flip(Theta::Param(p)) if *p != param => Ok(0.0),
      Expr::Flip(Theta::Param(_)) => Ok(match val.eval(env)? {
        Pure::True => 1.0,
        Pure::False => -1.0,
        _ => 0.0,
      }),
      Expr::Seq(x, bound, rest) => {
        // Product rule over the terms of the infer() sum.
        let mut deriv = 0.0;
        for poss in bound.possible_vals(env)? {
          let (del_e2, e2) = env.with_binding(*x, poss.clone(), |env| {
            Ok((rest.deriv(env, param, val)?, rest.infer(env, val)?))
          })?;
          let del_e1 = bound.deriv(env, param, &poss)?;
          let e1 = bound.infer(env, &poss)?;
          deriv += del_e1 * e2 + e1 * del_e2;
        }
        Ok(deriv)
      }
    }
  }

  /// Derivatives for every parameter occurring in this expression.
  pub fn gradient(&self, env: &mut Env, val: &Pure) -> Result<ParamVector> {
    let mut entries = Vec::new();
    for p in self.params() {
      entries.push((p, self.deriv(env, p, val)?));
    }
    Ok(ParamVector::new(entries))
  }
}

impl Program {
  /// A fresh environment whose base scope holds the program definitions.
  pub fn env<'a>(&self, params: &'a ParamVector) -> Result<Env<'a>> {
    let mut env = Env::new(params);
    for (name, defn) in self.defns() {
      env.add_binding(*name, defn.clone())?;
    }
    Ok(env)
  }

  /// Draw `k` independent samples, each under a fresh environment.
  pub fn sample(&self, params: &ParamVector, k: usize, rng: &mut impl Rng) -> Result<Vec<Pure>> {
    let mut out = Vec::with_capacity(k);
    for _ in 0..k {
      let mut env = self.env(params)?;
      out.push(self.expr().sample(&mut env, rng)?);
    }
    Ok(out)
  }

  pub fn infer(&self, params: &ParamVector, val: &Pure) -> Result<f64> {
    let mut env = self.env(params)?;
    self.expr().infer(&mut env, val)
  }

  /// Gradient of the probability mass at `val`, keyed like `params`.
  /// Parameters the program never mentions get a zero component.
  pub fn gradient(&self, params: &ParamVector, val: &Pure) -> Result<ParamVector> {
    let mut grad = ParamVector::zeros_like(params);
    let mut env = self.env(params)?;
    for p in self.params().iter().copied() {
      let d = self.expr().deriv(&mut env, p, val)?;
      grad.set(p, d)?;
    }
    Ok(grad)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lang::v;
  use maplit::hashmap;
  use pretty_assertions::assert_eq;
  use rand::rngs::mock::StepRng;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  const TOL: f64 = 1e-9;

  fn empty_params() -> ParamVector {
    ParamVector::default()
  }

  // A StepRng whose f64 draws are all exactly `x` (for x expressible as
  // a dyadic fraction over 2^53).
  fn const_rng(x: f64) -> StepRng {
    StepRng::new(((x * (1u64 << 53) as f64) as u64) << 11, 0)
  }

  fn flip(theta: f64) -> Expr {
    Expr::Flip(Theta::Lit(theta))
  }

  fn flip_param(name: &str) -> Expr {
    Expr::Flip(Theta::Param(v(name)))
  }

  fn seq(x: &str, bound: Expr, rest: Expr) -> Expr {
    Expr::Seq(v(x), Box::new(bound), Box::new(rest))
  }

  fn ret(p: Pure) -> Expr {
    Expr::Return(p)
  }

  fn var(x: &str) -> Pure {
    Pure::Var(v(x))
  }

  fn ite(c: Pure, t: Pure, e: Pure) -> Pure {
    Pure::If(Box::new(c), Box::new(t), Box::new(e))
  }

  fn cons(h: Pure, t: Pure) -> Pure {
    Pure::Cons(Box::new(h), Box::new(t))
  }

  #[test]
  fn eval_resolves_variables() {
    let params = empty_params();
    let mut env = Env::new(&params);
    env.add_binding(v("x"), Pure::True).unwrap();
    assert_eq!(var("x").eval(&env).unwrap(), Pure::True);
    assert_eq!(
      var("missing").eval(&env).unwrap_err(),
      Error::UnboundName(v("missing"))
    );
  }

  #[test]
  fn eval_if_takes_exactly_one_branch() {
    let params = empty_params();
    let env = Env::new(&params);
    // The untaken branch references an unbound name and must never be
    // evaluated.
    let e = ite(Pure::True, Pure::Nil, var("unbound"));
    assert_eq!(e.eval(&env).unwrap(), Pure::Nil);
    let e = ite(Pure::False, var("unbound"), Pure::Nil);
    assert_eq!(e.eval(&env).unwrap(), Pure::Nil);
  }

  #[test]
  fn eval_if_requires_boolean_condition() {
    let params = empty_params();
    let env = Env::new(&params);
    let e = ite(Pure::Nil, Pure::True, Pure::False);
    assert_eq!(e.eval(&env).unwrap_err(), Error::NotABool(Pure::Nil));
  }

  #[test]
  fn eval_cons_forces_both_children() {
    let params = empty_params();
    let mut env = Env::new(&params);
    env.add_binding(v("x"), Pure::True).unwrap();
    let e = cons(var("x"), ite(var("x"), Pure::Nil, Pure::False));
    assert_eq!(e.eval(&env).unwrap(), cons(Pure::True, Pure::Nil));
  }

  #[test]
  fn eval_is_idempotent() {
    let params = empty_params();
    let mut env = Env::new(&params);
    env.add_binding(v("x"), Pure::False).unwrap();
    let e = cons(ite(Pure::True, var("x"), Pure::Nil), Pure::Nil);
    let once = e.eval(&env).unwrap();
    let twice = once.eval(&env).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn flip_sample_thresholds_on_theta() {
    let params = empty_params();
    let mut env = Env::new(&params);
    // Draw is exactly 0.5: theta 0.7 accepts it, theta 0.3 does not.
    let mut rng = const_rng(0.5);
    assert_eq!(flip(0.7).sample(&mut env, &mut rng).unwrap(), Pure::True);
    assert_eq!(flip(0.3).sample(&mut env, &mut rng).unwrap(), Pure::False);
  }

  #[test]
  fn flip_zero_never_samples_true() {
    let params = empty_params();
    let mut env = Env::new(&params);
    let mut rng = const_rng(0.0);
    assert_eq!(flip(0.0).sample(&mut env, &mut rng).unwrap(), Pure::False);
  }

  #[test]
  fn flip_resolves_named_parameter() {
    let params = ParamVector::new([(v("p"), 1.0)]);
    let mut env = Env::new(&params);
    let mut rng = const_rng(0.5);
    assert_eq!(
      flip_param("p").sample(&mut env, &mut rng).unwrap(),
      Pure::True
    );
    assert_eq!(
      flip_param("q").sample(&mut env, &mut rng).unwrap_err(),
      Error::UndefinedParam(v("q"))
    );
  }

  #[test]
  fn flip_theta_out_of_range_fails() {
    let params = ParamVector::new([(v("p"), 1.5)]);
    let mut env = Env::new(&params);
    assert_eq!(
      flip(1.5).infer(&mut env, &Pure::True).unwrap_err(),
      Error::ThetaRange(1.5)
    );
    assert_eq!(
      flip_param("p").infer(&mut env, &Pure::True).unwrap_err(),
      Error::ThetaRange(1.5)
    );
  }

  #[test]
  fn sequence_sample_binds_into_current_scope() {
    let params = empty_params();
    let mut env = Env::new(&params);
    let mut rng = const_rng(0.0);
    let e = seq("x", flip(1.0), ret(var("x")));
    assert_eq!(e.sample(&mut env, &mut rng).unwrap(), Pure::True);
    // The binding outlives the sequence node.
    assert_eq!(env.get_binding(v("x")).unwrap(), &Pure::True);
  }

  #[test]
  fn sequence_sample_rejects_rebinding() {
    let params = empty_params();
    let mut env = Env::new(&params);
    let mut rng = const_rng(0.0);
    let e = seq("x", flip(0.5), seq("x", flip(0.5), ret(var("x"))));
    assert_eq!(
      e.sample(&mut env, &mut rng).unwrap_err(),
      Error::DuplicateBinding(v("x"))
    );
  }

  #[test]
  fn sample_is_deterministic_under_a_seed() {
    let params = empty_params();
    let e = seq("x", flip(0.5), ret(cons(var("x"), Pure::Nil)));
    let draw = |seed| {
      let mut env = Env::new(&params);
      let mut rng = StdRng::seed_from_u64(seed);
      e.sample(&mut env, &mut rng).unwrap()
    };
    assert_eq!(draw(7), draw(7));
  }

  #[test]
  fn possible_vals_of_return_is_a_singleton() {
    let params = empty_params();
    let mut env = Env::new(&params);
    let e = ret(Pure::Nil);
    assert_eq!(
      e.possible_vals(&mut env).unwrap(),
      HashSet::from([Pure::Nil])
    );
  }

  #[test]
  fn possible_vals_of_flip_is_both_booleans() {
    let params = empty_params();
    let mut env = Env::new(&params);
    assert_eq!(
      flip(0.0).possible_vals(&mut env).unwrap(),
      HashSet::from([Pure::True, Pure::False])
    );
  }

  #[test]
  fn possible_vals_of_sequence_unions_continuations() {
    let params = empty_params();
    let mut env = Env::new(&params);
    let e = seq("x", flip(0.5), ret(ite(var("x"), cons(Pure::True, Pure::Nil), Pure::Nil)));
    assert_eq!(
      e.possible_vals(&mut env).unwrap(),
      HashSet::from([cons(Pure::True, Pure::Nil), Pure::Nil])
    );
    // No binding leaked out of the traversal.
    assert!(env.get_binding(v("x")).is_err());
  }

  #[test]
  fn infer_flip_matches_theta() {
    let params = empty_params();
    let mut env = Env::new(&params);
    for theta in [0.0, 0.25, 0.5, 1.0] {
      assert!((flip(theta).infer(&mut env, &Pure::True).unwrap() - theta).abs() < TOL);
      assert!((flip(theta).infer(&mut env, &Pure::False).unwrap() - (1.0 - theta)).abs() < TOL);
    }
    assert_eq!(flip(0.5).infer(&mut env, &Pure::Nil).unwrap(), 0.0);
  }

  #[test]
  fn infer_return_compares_canonical_forms() {
    let params = empty_params();
    let mut env = Env::new(&params);
    env.add_binding(v("x"), Pure::True).unwrap();
    let e = ret(ite(var("x"), Pure::Nil, Pure::False));
    assert_eq!(e.infer(&mut env, &Pure::Nil).unwrap(), 1.0);
    assert_eq!(e.infer(&mut env, &Pure::False).unwrap(), 0.0);
  }

  #[test]
  fn infer_single_bind() {
    let params = empty_params();
    let mut env = Env::new(&params);
    let e = seq("x", flip(0.5), ret(var("x")));
    assert!((e.infer(&mut env, &Pure::True).unwrap() - 0.5).abs() < TOL);
    assert!((e.infer(&mut env, &Pure::False).unwrap() - 0.5).abs() < TOL);
  }

  #[test]
  fn infer_two_coin_scenario() {
    // y <- flip 0.3; x <- flip 0.7; return (if y then x else false)
    let params = empty_params();
    let mut env = Env::new(&params);
    let e = seq(
      "y",
      flip(0.3),
      seq("x", flip(0.7), ret(ite(var("y"), var("x"), Pure::False))),
    );
    assert!((e.infer(&mut env, &Pure::True).unwrap() - 0.21).abs() < TOL);
    assert!((e.infer(&mut env, &Pure::False).unwrap() - 0.79).abs() < TOL);
  }

  #[test]
  fn infer_conserves_probability_mass() {
    let params = ParamVector::new([(v("p"), 0.4)]);
    let mut env = Env::new(&params);
    let e = seq(
      "a",
      flip_param("p"),
      seq("b", flip(0.6), ret(ite(var("a"), var("b"), Pure::False))),
    );
    let mass: f64 = e.infer(&mut env, &Pure::True).unwrap() + e.infer(&mut env, &Pure::False).unwrap();
    assert!((mass - 1.0).abs() < TOL);
  }

  #[test]
  fn deriv_of_flip_wrt_its_own_parameter() {
    let params = ParamVector::new([(v("p"), 0.5)]);
    let mut env = Env::new(&params);
    let e = flip_param("p");
    assert_eq!(e.deriv(&mut env, v("p"), &Pure::True).unwrap(), 1.0);
    assert_eq!(e.deriv(&mut env, v("p"), &Pure::False).unwrap(), -1.0);
    assert_eq!(e.deriv(&mut env, v("p"), &Pure::Nil).unwrap(), 0.0);
    assert_eq!(e.deriv(&mut env, v("q"), &Pure::True).unwrap(), 0.0);
    assert_eq!(flip(0.5).deriv(&mut env, v("p"), &Pure::True).unwrap(), 0.0);
  }

  #[test]
  fn deriv_of_sequence_uses_the_product_rule() {
    // x <- flip p; y <- flip q; return (if x then y else false)
    // P(true) = p * q, so dP/dp = q and dP/dq = p.
    let params = ParamVector::new([(v("p"), 0.3), (v("q"), 0.7)]);
    let mut env = Env::new(&params);
    let e = seq(
      "x",
      flip_param("p"),
      seq("y", flip_param("q"), ret(ite(var("x"), var("y"), Pure::False))),
    );
    assert!((e.deriv(&mut env, v("p"), &Pure::True).unwrap() - 0.7).abs() < TOL);
    assert!((e.deriv(&mut env, v("q"), &Pure::True).unwrap() - 0.3).abs() < TOL);
    // P(false) = 1 - p * q.
    assert!((e.deriv(&mut env, v("p"), &Pure::False).unwrap() + 0.7).abs() < TOL);
  }

  #[test]
  fn deriv_through_a_passthrough_bind() {
    // x <- flip p; return x: the derivative survives the bind unchanged.
    let params = ParamVector::new([(v("p"), 0.2)]);
    let mut env = Env::new(&params);
    let e = seq("x", flip_param("p"), ret(var("x")));
    assert!((e.deriv(&mut env, v("p"), &Pure::True).unwrap() - 1.0).abs() < TOL);
    assert!((e.deriv(&mut env, v("p"), &Pure::False).unwrap() + 1.0).abs() < TOL);
  }

  #[test]
  fn expr_gradient_covers_every_mentioned_parameter() {
    let params = ParamVector::new([(v("p"), 0.3), (v("q"), 0.7)]);
    let mut env = Env::new(&params);
    let e = seq(
      "x",
      flip_param("p"),
      seq("y", flip_param("q"), ret(ite(var("x"), var("y"), Pure::False))),
    );
    let grad = e.gradient(&mut env, &Pure::True).unwrap();
    assert!((grad.get(v("p")).unwrap() - 0.7).abs() < TOL);
    assert!((grad.get(v("q")).unwrap() - 0.3).abs() < TOL);
  }

  #[test]
  fn program_definitions_are_visible_everywhere() {
    let defns = hashmap! {
      v("marked") => cons(Pure::True, Pure::Nil),
    };
    let e = seq("x", flip(0.5), ret(ite(var("x"), var("marked"), Pure::Nil)));
    let prog = Program::new(defns, e);
    let params = empty_params();
    let marked = cons(Pure::True, Pure::Nil);
    assert!((prog.infer(&params, &marked).unwrap() - 0.5).abs() < TOL);
    assert!((prog.infer(&params, &Pure::Nil).unwrap() - 0.5).abs() < TOL);
  }

  #[test]
  fn program_definitions_resolve_transitively() {
    let defns = hashmap! {
      v("a") => var("b"),
      v("b") => Pure::True,
    };
    let prog = Program::new(defns, ret(var("a")));
    let params = empty_params();
    assert_eq!(prog.infer(&params, &Pure::True).unwrap(), 1.0);
  }

  #[test]
  fn program_sample_uses_a_fresh_environment_per_draw() {
    // A second draw would hit a duplicate binding if the environment
    // were reused.
    let e = seq("x", flip(1.0), ret(var("x")));
    let prog = Program::new(hashmap! {}, e);
    let params = empty_params();
    let mut rng = const_rng(0.0);
    let samples = prog.sample(&params, 3, &mut rng).unwrap();
    assert_eq!(samples, vec![Pure::True, Pure::True, Pure::True]);
  }

  #[test]
  fn program_gradient_is_keyed_like_the_supplied_vector() {
    let e = seq("x", flip_param("p"), ret(var("x")));
    let prog = Program::new(hashmap! {}, e);
    let params = ParamVector::new([(v("p"), 0.5), (v("unused"), 0.9)]);
    let grad = prog.gradient(&params, &Pure::True).unwrap();
    assert!((grad.get(v("p")).unwrap() - 1.0).abs() < TOL);
    assert_eq!(grad.get(v("unused")).unwrap(), 0.0);
  }
}
