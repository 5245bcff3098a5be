use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::lang::{v, Expr, Program, Pure, Theta};

#[derive(Parser)]
#[grammar = "flippl.pest"]
struct FlipplParser;

fn is_keyword(rule: Rule) -> bool {
  matches!(
    rule,
    Rule::kw_define
      | Rule::kw_flip
      | Rule::kw_return
      | Rule::kw_if
      | Rule::kw_then
      | Rule::kw_else
      | Rule::kw_cons
  )
}

/// Children of a pair with the keyword tokens dropped.
fn subpairs<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
  pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn parse_pure(pair: Pair<Rule>) -> Pure {
  match pair.as_rule() {
    Rule::pure_expr | Rule::non_if_pure_expr | Rule::paren_pure_expr => {
      parse_pure(subpairs(pair).next().unwrap())
    }
    Rule::if_expr => {
      let mut pairs = subpairs(pair);
      let cond = parse_pure(pairs.next().unwrap());
      let then = parse_pure(pairs.next().unwrap());
      let els = parse_pure(pairs.next().unwrap());
      Pure::If(Box::new(cond), Box::new(then), Box::new(els))
    }
    Rule::true_lit => Pure::True,
    Rule::false_lit => Pure::False,
    Rule::nil_lit => Pure::Nil,
    Rule::cons_expr => {
      let mut pairs = subpairs(pair);
      let head = parse_pure(pairs.next().unwrap());
      let tail = parse_pure(pairs.next().unwrap());
      Pure::Cons(Box::new(head), Box::new(tail))
    }
    Rule::var_expr => Pure::Var(v(pair.as_str())),
    rule => unreachable!("{:?}", rule),
  }
}

fn parse_theta(pair: Pair<Rule>) -> Result<Theta> {
  let inner = pair.into_inner().next().unwrap();
  match inner.as_rule() {
    Rule::float => {
      let s = inner.as_str();
      let x: f64 = s
        .parse()
        .map_err(|_| Error::Parse(format!("bad float literal {}", s)))?;
      Ok(Theta::Lit(x))
    }
    Rule::name => Ok(Theta::Param(v(inner.as_str()))),
    rule => unreachable!("{:?}", rule),
  }
}

fn parse_expr(pair: Pair<Rule>) -> Result<Expr> {
  match pair.as_rule() {
    Rule::eff_expr | Rule::non_bind_eff_expr | Rule::paren_eff_expr => {
      parse_expr(subpairs(pair).next().unwrap())
    }
    Rule::bind_expr => {
      let mut pairs = subpairs(pair);
      let name = v(pairs.next().unwrap().as_str());
      let bound = parse_expr(pairs.next().unwrap())?;
      let rest = parse_expr(pairs.next().unwrap())?;
      Ok(Expr::Seq(name, Box::new(bound), Box::new(rest)))
    }
    Rule::flip_expr => Ok(Expr::Flip(parse_theta(subpairs(pair).next().unwrap())?)),
    Rule::return_expr => Ok(Expr::Return(parse_pure(subpairs(pair).next().unwrap()))),
    rule => unreachable!("{:?}", rule),
  }
}

impl Program {
  /// Parse a program: zero or more `define` bindings followed by one
  /// effectful expression.
  pub fn parse(input: &str) -> Result<Program> {
    let mut pairs =
      FlipplParser::parse(Rule::prog, input).map_err(|e| Error::Parse(e.to_string()))?;
    let prog = pairs.next().unwrap();

    let mut defns = HashMap::new();
    let mut expr = None;
    for pair in prog.into_inner() {
      match pair.as_rule() {
        Rule::defn => {
          let mut inner = subpairs(pair);
          let name = v(inner.next().unwrap().as_str());
          let val = parse_pure(inner.next().unwrap());
          if defns.insert(name, val).is_some() {
            return Err(Error::DuplicateBinding(name));
          }
        }
        Rule::eff_expr => expr = Some(parse_expr(pair)?),
        Rule::EOI => {}
        rule => unreachable!("{:?}", rule),
      }
    }

    let expr = expr.ok_or_else(|| Error::Parse("program has no root expression".into()))?;
    Ok(Program::new(defns, expr))
  }
}

impl Pure {
  /// Parse a standalone pure value, e.g. a datum from a training set.
  pub fn parse(input: &str) -> Result<Pure> {
    let mut pairs =
      FlipplParser::parse(Rule::value, input).map_err(|e| Error::Parse(e.to_string()))?;
    let value = pairs.next().unwrap();
    Ok(parse_pure(subpairs(value).next().unwrap()))
  }
}
