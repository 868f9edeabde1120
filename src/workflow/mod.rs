// SPDX-License-Identifier: MIT

pub mod action;
pub mod expression;
pub mod graph;
pub mod loader;
pub mod scope;
pub mod template;
pub mod trace;
pub mod types;

pub use graph::{Graph, WorkflowEngine};
pub use loader::WorkflowLoader;
pub use trace::{ExecutionTrace, RunEvent, RunFailure, RunResult, StepRecord, StepStatus};
pub use types::{RunRequest, StepDefinition, WorkflowDefinition};
