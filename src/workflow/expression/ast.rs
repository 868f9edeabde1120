// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for sandboxed expressions

use std::fmt;

/// An expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant value
    Literal(Literal),
    /// Dotted lookup into the evaluation scope, e.g. `outputs.fetch.items[0]`
    Path(Vec<PathSegment>),
    /// Comparison expression: left op right
    Compare {
        left: Box<Expression>,
        op: CompareOp,
        right: Box<Expression>,
    },
    /// Arithmetic expression: left op right
    Arithmetic {
        left: Box<Expression>,
        op: ArithOp,
        right: Box<Expression>,
    },
    /// Unary minus
    Negate(Box<Expression>),
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
}

/// One step of a path
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    /// == (also written =)
    Eq,
    /// !=
    NotEq,
    /// >
    Gt,
    /// >=
    Gte,
    /// <
    Lt,
    /// <=
    Lte,
    /// contains (for strings and arrays)
    Contains,
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl Expression {
    /// Convenience constructor for a plain dotted path
    pub fn path(segments: &[&str]) -> Self {
        Expression::Path(
            segments
                .iter()
                .map(|s| PathSegment::Field(s.to_string()))
                .collect(),
        )
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Contains => write!(f, "contains"),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => write!(f, "+"),
            ArithOp::Sub => write!(f, "-"),
            ArithOp::Mul => write!(f, "*"),
            ArithOp::Div => write!(f, "/"),
            ArithOp::Rem => write!(f, "%"),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}
