use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::lang::{Expr, Program, Pure, Var};

/// Scope environment for name analysis: only which names are bound
/// matters, not their values.
struct NameEnv {
  scopes: Vec<HashSet<Var>>,
}

impl NameEnv {
  fn new() -> Self {
    NameEnv {
      scopes: vec![HashSet::new()],
    }
  }

  fn add_name(&mut self, name: Var) {
    if let Some(scope) = self.scopes.last_mut() {
      scope.insert(name);
    }
  }

  fn check_binding(&self, name: Var) -> Result<()> {
    if self.scopes.iter().rev().any(|scope| scope.contains(&name)) {
      Ok(())
    } else {
      Err(Error::UnboundName(name))
    }
  }

  fn with_scope<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    self.scopes.push(HashSet::new());
    let result = body(self);
    self.scopes.pop();
    result
  }
}

/// Check that every variable in `prog` is used within its scope.
/// Definition names are mutually visible; a sequence binder is visible
/// only to its continuation. Running this before execution is the
/// precondition for the evaluator's own scope handling to be safe.
pub fn name_analysis(prog: &Program) -> Result<()> {
  let mut env = NameEnv::new();
  for name in prog.defns().keys() {
    env.add_name(*name);
  }
  for defn in prog.defns().values() {
    check_pure(&mut env, defn)?;
  }
  check_expr(&mut env, prog.expr())
}

fn check_expr(env: &mut NameEnv, expr: &Expr) -> Result<()> {
  match expr {
    Expr::Return(p) => check_pure(env, p),
    // A flip's parameter names a learnable parameter, not a binding;
    // it is resolved against the parameter vector at run time.
    Expr::Flip(_) => Ok(()),
    Expr::Seq(x, bound, rest) => {
      check_expr(env, bound)?;
      env.with_scope(|env| {
        env.add_name(*x);
        check_expr(env, rest)
      })
    }
  }
}

fn check_pure(env: &mut NameEnv, p: &Pure) -> Result<()> {
  match p {
    Pure::Var(x) => env.check_binding(*x),
    Pure::True | Pure::False | Pure::Nil => Ok(()),
    Pure::Cons(head, tail) => {
      check_pure(env, head)?;
      check_pure(env, tail)
    }
    Pure::If(cond, then, els) => {
      check_pure(env, cond)?;
      check_pure(env, then)?;
      check_pure(env, els)
    }
  }
}
