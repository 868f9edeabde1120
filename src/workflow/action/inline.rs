// SPDX-License-Identifier: MIT

use super::{next_id, ActionExecutor, RunContext, StepOutcome};
use crate::error::WorkflowError;
use crate::workflow::expression::{self, Expression};
use crate::workflow::scope::Scope;
use crate::workflow::types::{ActionKind, InlineLogicAction};
use async_trait::async_trait;
use serde_json::Value;

/// Evaluates a boolean expression against the current input
///
/// The input is reachable as `input` and its top-level keys as bare identifiers.
/// Nothing else from the run is visible.
#[derive(Debug)]
pub struct InlineLogicExecutor {
    expression: Expression,
    on_success: Option<String>,
    on_failure: Option<String>,
}

impl InlineLogicExecutor {
    pub fn compile(step_id: &str, action: &InlineLogicAction) -> Result<Self, WorkflowError> {
        let expression = expression::parse(&action.expression).map_err(|e| {
            WorkflowError::validation(format!("Step '{}': {}", step_id, inner_message(&e)))
        })?;

        Ok(Self {
            expression,
            on_success: next_id(&action.on_success_next_step_id),
            on_failure: next_id(&action.on_failure_next_step_id),
        })
    }

    pub fn decide(&self, input: &Value) -> Result<bool, WorkflowError> {
        let scope = Scope::new().with_root("input", input).with_fallback(input);
        expression::evaluate_bool(&self.expression, &scope)
    }
}

fn inner_message(err: &WorkflowError) -> String {
    match err {
        WorkflowError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ActionExecutor for InlineLogicExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::InlineLogic
    }

    fn successors(&self) -> Vec<&str> {
        [&self.on_success, &self.on_failure]
            .into_iter()
            .filter_map(|id| id.as_deref())
            .collect()
    }

    async fn execute(
        &self,
        step_id: &str,
        input: &Value,
        _ctx: &RunContext<'_>,
    ) -> Result<StepOutcome, WorkflowError> {
        let passed = self.decide(input).map_err(|e| match e {
            WorkflowError::Evaluation(msg) => {
                WorkflowError::evaluation(format!("Step '{}': {}", step_id, msg))
            }
            other => other,
        })?;
        let next = if passed {
            self.on_success.clone()
        } else {
            self.on_failure.clone()
        };

        Ok(StepOutcome::branch(input.clone(), passed, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::trace::ExecutionTrace;
    use serde_json::json;
    use std::time::Duration;

    fn action(expr: &str) -> InlineLogicAction {
        InlineLogicAction {
            expression: expr.to_string(),
            on_success_next_step_id: Some("yes".into()),
            on_failure_next_step_id: Some("no".into()),
        }
    }

    #[tokio::test]
    async fn test_branches_on_current_input() {
        let executor =
            InlineLogicExecutor::compile("E", &action("input.price > 30000 and currency == 'USD'"))
                .unwrap();
        let client = reqwest::Client::new();
        let inputs = json!({"price": 1});
        let trace = ExecutionTrace::new();
        let ctx = RunContext {
            client: &client,
            inputs: &inputs,
            trace: &trace,
            step_timeout: Duration::from_secs(1),
        };

        let input = json!({"price": 45000, "currency": "USD"});
        let out = executor.execute("E", &input, &ctx).await.unwrap();
        assert_eq!(out.outcome, Some(true));
        assert_eq!(out.next_step_id.as_deref(), Some("yes"));
        assert_eq!(out.output, input);

        let input = json!({"price": 10, "currency": "USD"});
        let out = executor.execute("E", &input, &ctx).await.unwrap();
        assert_eq!(out.next_step_id.as_deref(), Some("no"));
    }

    #[test]
    fn test_run_inputs_are_not_visible() {
        let executor = InlineLogicExecutor::compile("E", &action("inputs == null")).unwrap();
        assert!(executor.decide(&json!({"a": 1})).unwrap());
    }

    #[test]
    fn test_non_boolean_result_fails() {
        let executor = InlineLogicExecutor::compile("E", &action("input.price + 1")).unwrap();
        let err = executor.decide(&json!({"price": 1})).unwrap_err();
        assert_eq!(err.kind(), "evaluation_error");
    }

    #[test]
    fn test_syntax_error_is_validation() {
        let err = InlineLogicExecutor::compile("E", &action("price >")).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Step 'E'"));
    }

    #[test]
    fn test_missing_branch_means_terminal() {
        let executor = InlineLogicExecutor::compile(
            "E",
            &InlineLogicAction {
                expression: "true".into(),
                on_success_next_step_id: Some(String::new()),
                on_failure_next_step_id: None,
            },
        )
        .unwrap();
        assert!(executor.successors().is_empty());
    }
}
