use string_interner::{DefaultSymbol as Symbol, StringInterner};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;

thread_local! {
  pub static INTERNER: RefCell<StringInterner> = RefCell::new(StringInterner::default());
}

/// An interned variable or parameter name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(Symbol);

impl Var {
  pub fn new(t: impl Into<String>) -> Self {
    INTERNER.with(|interner| {
      let symbol = interner.borrow_mut().get_or_intern(t.into());
      Var(symbol)
    })
  }
}

pub fn v(t: impl Into<String>) -> Var {
  Var::new(t)
}

impl fmt::Display for Var {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    INTERNER.with(|interner| {
      let interner = interner.borrow();
      let s = interner.resolve(self.0).unwrap();
      write!(f, "{}", s)
    })
  }
}

impl fmt::Debug for Var {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self)
  }
}

/// A pure (side-effect-free) value expression.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Pure {
  Var(Var),
  True,
  False,
  Nil,
  Cons(Box<Pure>, Box<Pure>),
  If(Box<Pure>, Box<Pure>, Box<Pure>),
}

pub fn boolean(b: bool) -> Pure {
  if b {
    Pure::True
  } else {
    Pure::False
  }
}

impl Pure {
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Pure::True => Some(true),
      Pure::False => Some(false),
      _ => None,
    }
  }

  fn is_atom(&self) -> bool {
    matches!(self, Pure::Var(_) | Pure::True | Pure::False | Pure::Nil)
  }
}

/// A `Pure` wrapper that parenthesizes non-atomic subterms.
struct Child<'a>(&'a Pure);

impl fmt::Display for Child<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    if self.0.is_atom() {
      write!(f, "{}", self.0)
    } else {
      write!(f, "({})", self.0)
    }
  }
}

impl fmt::Display for Pure {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Pure::Var(x) => write!(f, "{}", x),
      Pure::True => write!(f, "true"),
      Pure::False => write!(f, "false"),
      Pure::Nil => write!(f, "nil"),
      Pure::Cons(head, tail) => write!(f, "cons {} {}", Child(head), Child(tail)),
      Pure::If(cond, then, els) => {
        write!(f, "if {} then {} else {}", cond, then, Child(els))
      }
    }
  }
}

/// The probability argument of a `flip`: a literal or a named parameter.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Theta {
  Lit(f64),
  Param(Var),
}

impl fmt::Display for Theta {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Theta::Lit(x) => write!(f, "{:?}", x),
      Theta::Param(p) => write!(f, "{}", p),
    }
  }
}

/// An effectful expression: randomness (`flip`) and monadic sequencing.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
  Return(Pure),
  Flip(Theta),
  Seq(Var, Box<Expr>, Box<Expr>),
}

impl Expr {
  /// Collect the symbolic parameter names of this expression.
  pub fn params_into(&self, acc: &mut HashSet<Var>) {
    match self {
      Expr::Return(_) | Expr::Flip(Theta::Lit(_)) => {}
      Expr::Flip(Theta::Param(p)) => {
        acc.insert(*p);
      }
      Expr::Seq(_, bound, rest) => {
        bound.params_into(acc);
        rest.params_into(acc);
      }
    }
  }

  pub fn params(&self) -> HashSet<Var> {
    let mut acc = HashSet::new();
    self.params_into(&mut acc);
    acc
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Expr::Return(p) => write!(f, "return {}", p),
      Expr::Flip(theta) => write!(f, "flip {}", theta),
      Expr::Seq(x, bound, rest) => match bound.as_ref() {
        Expr::Seq(..) => write!(f, "{} <- ({}); {}", x, bound, rest),
        _ => write!(f, "{} <- {}; {}", x, bound, rest),
      },
    }
  }
}

/// A parsed program: top-level pure definitions plus a root effectful
/// expression. The parameter set is collected once at construction.
#[derive(Clone, Debug)]
pub struct Program {
  defns: HashMap<Var, Pure>,
  expr: Expr,
  params: HashSet<Var>,
}

impl Program {
  pub fn new(defns: HashMap<Var, Pure>, expr: Expr) -> Self {
    let params = expr.params();
    Program {
      defns,
      expr,
      params,
    }
  }

  pub fn defns(&self) -> &HashMap<Var, Pure> {
    &self.defns
  }

  pub fn expr(&self) -> &Expr {
    &self.expr
  }

  /// The closed set of tunable parameter names.
  pub fn params(&self) -> &HashSet<Var> {
    &self.params
  }
}
