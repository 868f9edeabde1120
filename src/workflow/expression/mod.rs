// SPDX-License-Identifier: MIT

//! Sandboxed expression language
//!
//! Conditions and inline logic are written as small expressions instead of code:
//! - `price > 30000`
//! - `input.status == 'ok' and input.items.length > 0`
//! - `outputs.fetch.total * 2 >= inputs.limit`
//!
//! Expressions are parsed once into an AST and interpreted over JSON values.
//! There is no way to reach the host environment from an expression.

mod ast;
mod evaluator;
mod parser;

pub use ast::{ArithOp, CompareOp, Expression, Literal, PathSegment};
pub use evaluator::{compare, evaluate, evaluate_bool, values_equal};
pub use parser::parse;
