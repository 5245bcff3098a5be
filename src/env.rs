use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::lang::{Pure, Var};
use crate::params::ParamVector;

/// Naming environment for expression evaluation: a stack of lexical scopes
/// over a borrowed parameter vector. Lookup is innermost-first; rebinding a
/// name within one scope is an error, shadowing across scopes is not.
pub struct Env<'a> {
  params: &'a ParamVector,
  scopes: Vec<HashMap<Var, Pure>>,
}

impl<'a> Env<'a> {
  pub fn new(params: &'a ParamVector) -> Self {
    Env {
      params,
      scopes: vec![HashMap::new()],
    }
  }

  pub fn add_scope(&mut self) {
    self.scopes.push(HashMap::new());
  }

  pub fn remove_scope(&mut self) {
    self.scopes.pop();
  }

  pub fn add_binding(&mut self, name: Var, val: Pure) -> Result<()> {
    let local = self.scopes.last_mut().ok_or(Error::NoActiveScope)?;
    if local.contains_key(&name) {
      return Err(Error::DuplicateBinding(name));
    }
    local.insert(name, val);
    Ok(())
  }

  pub fn get_binding(&self, name: Var) -> Result<&Pure> {
    for scope in self.scopes.iter().rev() {
      if let Some(val) = scope.get(&name) {
        return Ok(val);
      }
    }
    Err(Error::UnboundName(name))
  }

  pub fn get_param(&self, name: Var) -> Result<f64> {
    self.params.get(name)
  }

  /// Run `body` under a fresh scope. The scope is popped on every exit
  /// path, error propagation included.
  pub fn with_scope<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    self.add_scope();
    let result = body(self);
    self.remove_scope();
    result
  }

  /// Run `body` under a fresh scope holding a single binding.
  pub fn with_binding<T>(
    &mut self,
    name: Var,
    val: Pure,
    body: impl FnOnce(&mut Self) -> Result<T>,
  ) -> Result<T> {
    self.add_scope();
    let result = match self.add_binding(name, val) {
      Ok(()) => body(self),
      Err(e) => Err(e),
    };
    self.remove_scope();
    result
  }

  #[cfg(test)]
  pub fn depth(&self) -> usize {
    self.scopes.len()
  }
}
