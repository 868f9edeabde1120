// SPDX-License-Identifier: MIT

//! stepflow-rs - a minimal step-graph workflow engine
//!
//! A workflow is a list of steps, each carrying one action:
//! - `httpRequest` - call an HTTP endpoint, its response becomes the step output
//! - `condition` - compare two operands and branch
//! - `inlineLogic` - evaluate a sandboxed boolean expression over the current input and branch
//!
//! The engine walks the graph from its entry step, threading each step's output into
//! the next one and recording every visit in an execution trace.

pub mod config;
pub mod error;
pub mod server;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{StepflowError, WorkflowError};
pub use workflow::{
    ExecutionTrace, Graph, RunEvent, RunFailure, RunRequest, RunResult, WorkflowDefinition,
    WorkflowEngine,
};
