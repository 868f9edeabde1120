// SPDX-License-Identifier: MIT

//! Action executors - one per action kind
//!
//! - `HttpExecutor` - issues the declared request and parses the response
//! - `ConditionExecutor` - compares two operands and picks a branch
//! - `InlineLogicExecutor` - evaluates a boolean expression over the current input
//!
//! Executors are compiled once when a graph is loaded, so malformed
//! expressions, operators and URLs are rejected before any step runs.

mod condition;
mod http;
mod inline;

pub use condition::{ConditionExecutor, ConditionOperator};
pub use http::HttpExecutor;
pub use inline::InlineLogicExecutor;

use crate::error::WorkflowError;
use crate::workflow::trace::ExecutionTrace;
use crate::workflow::types::{ActionDefinition, ActionKind, StepDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Read-only view of the run an executor is called from
pub struct RunContext<'r> {
    pub client: &'r reqwest::Client,
    /// Run-level inputs supplied by the caller
    pub inputs: &'r Value,
    /// Steps completed so far in this run
    pub trace: &'r ExecutionTrace,
    pub step_timeout: Duration,
}

/// What an executor produced for one visit
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub output: Value,
    /// Branch decision, set by branching actions only
    pub outcome: Option<bool>,
    pub next_step_id: Option<String>,
}

impl StepOutcome {
    pub fn chain(output: Value, next_step_id: Option<String>) -> Self {
        Self {
            output,
            outcome: None,
            next_step_id,
        }
    }

    pub fn branch(output: Value, outcome: bool, next_step_id: Option<String>) -> Self {
        Self {
            output,
            outcome: Some(outcome),
            next_step_id,
        }
    }
}

/// Core executor trait for all action kinds
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Successor ids this action can produce
    fn successors(&self) -> Vec<&str>;

    /// Run the action for one visit of `step_id` with the previous step's output as `input`
    async fn execute(
        &self,
        step_id: &str,
        input: &Value,
        ctx: &RunContext<'_>,
    ) -> Result<StepOutcome, WorkflowError>;
}

/// Build the executor for a step, validating everything that can be checked statically
pub fn compile(step: &StepDefinition) -> Result<Box<dyn ActionExecutor>, WorkflowError> {
    let executor: Box<dyn ActionExecutor> = match &step.action {
        ActionDefinition::HttpRequest(action) => Box::new(HttpExecutor::compile(&step.id, action)?),
        ActionDefinition::Condition(action) => {
            Box::new(ConditionExecutor::compile(&step.id, action)?)
        }
        ActionDefinition::InlineLogic(action) => {
            Box::new(InlineLogicExecutor::compile(&step.id, action)?)
        }
    };
    Ok(executor)
}

/// Empty ids mean "no successor"
pub(crate) fn next_id(id: &Option<String>) -> Option<String> {
    crate::workflow::types::non_empty(id).map(str::to_string)
}
