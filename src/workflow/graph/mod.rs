// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the resolver that validates and indexes a step list,
//! and the engine that walks it one step at a time.

pub mod executor;
pub mod resolver;

pub use executor::WorkflowEngine;
pub use resolver::{CompiledStep, Graph};
