//! Guard expressions
//!
//! Task guards use the same expression language as `{{ ... }}` and
//! `{% if %}` in templates, compiled by the same strict engine. An
//! expression is checked when it is parsed and evaluated against each
//! host's variables.

use crate::error::Error;
use crate::renderer::{environment, first_missing};
use crate::value::Value;
use crate::vars::Vars;
use minijinja::ErrorKind;
use serde::Deserialize;

/// A parsed expression.
///
/// ```
/// use stencil::{Expr, Vars};
///
/// let mut vars = Vars::new();
/// vars.insert("env", "production");
/// let guard = Expr::parse("env == 'production' and tls is not defined").unwrap();
/// assert!(guard.is_true(&vars).unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    source: String,
    origin: String,
    line: usize,
}

impl Expr {
    /// Parse a standalone expression (e.g. a task guard)
    pub fn parse(source: &str) -> Result<Self, Error> {
        Self::parse_at(source, "expression", 1)
    }

    /// Parse an expression, attributing errors to `origin` and `line`
    pub fn parse_at(source: &str, origin: &str, line: usize) -> Result<Self, Error> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::Syntax {
                origin: origin.to_string(),
                line,
                message: "empty expression".into(),
            });
        }
        let env = environment();
        env.compile_expression(source)
            .map_err(|e| Error::from_engine(&e, origin, line, None))?;
        Ok(Self {
            source: source.to_string(),
            origin: origin.to_string(),
            line,
        })
    }

    /// The expression text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a variable context
    pub fn eval(&self, vars: &Vars) -> Result<Value, Error> {
        let value = self.evaluate(vars)?;
        Value::deserialize(value).map_err(|e| Error::Type {
            origin: self.origin.clone(),
            line: self.line,
            message: format!("'{}' does not produce a plain value: {e}", self.source),
        })
    }

    /// Evaluate and reduce to truthiness
    pub fn is_true(&self, vars: &Vars) -> Result<bool, Error> {
        Ok(self.evaluate(vars)?.is_true())
    }

    fn evaluate(&self, vars: &Vars) -> Result<minijinja::Value, Error> {
        let locate = |e: &minijinja::Error, missing: Option<String>| {
            Error::from_engine(e, &self.origin, self.line, missing)
        };
        let env = environment();
        let expr = env
            .compile_expression(&self.source)
            .map_err(|e| locate(&e, None))?;
        expr.eval(vars).map_err(|e| {
            let missing = (e.kind() == ErrorKind::UndefinedError)
                .then(|| first_missing(expr.undeclared_variables(true), vars))
                .flatten();
            locate(&e, missing)
        })
    }
}
