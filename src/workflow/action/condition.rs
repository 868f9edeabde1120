// SPDX-License-Identifier: MIT

use super::{next_id, ActionExecutor, RunContext, StepOutcome};
use crate::error::WorkflowError;
use crate::workflow::expression::{self, CompareOp, Expression};
use crate::workflow::scope::Scope;
use crate::workflow::trace::ExecutionTrace;
use crate::workflow::types::{ActionKind, ConditionAction, Operand};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Operators a condition step accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    LessThan,
}

impl FromStr for ConditionOperator {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" | "EQUALS" | "equals" => Ok(ConditionOperator::Equals),
            ">" | "GREATER_THAN" | "greaterThan" => Ok(ConditionOperator::GreaterThan),
            "<" | "LESS_THAN" | "lessThan" => Ok(ConditionOperator::LessThan),
            other => Err(WorkflowError::UnsupportedOperator(other.to_string())),
        }
    }
}

impl From<ConditionOperator> for CompareOp {
    fn from(op: ConditionOperator) -> Self {
        match op {
            ConditionOperator::Equals => CompareOp::Eq,
            ConditionOperator::GreaterThan => CompareOp::Gt,
            ConditionOperator::LessThan => CompareOp::Lt,
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConditionOperator::Equals => "==",
            ConditionOperator::GreaterThan => ">",
            ConditionOperator::LessThan => "<",
        })
    }
}

#[derive(Debug)]
enum CompiledOperand {
    Expression(Expression),
    Literal(Value),
}

impl CompiledOperand {
    fn compile(step_id: &str, side: &str, operand: &Operand) -> Result<Self, WorkflowError> {
        match operand {
            Operand::Expression(source) => expression::parse(source)
                .map(CompiledOperand::Expression)
                .map_err(|e| {
                    WorkflowError::validation(format!(
                        "Step '{}' {} operand: {}",
                        step_id,
                        side,
                        strip_kind(&e)
                    ))
                }),
            Operand::Value(value) => Ok(CompiledOperand::Literal(value.clone())),
        }
    }

    fn resolve(&self, scope: &Scope<'_>) -> Result<Value, WorkflowError> {
        match self {
            CompiledOperand::Expression(expr) => expression::evaluate(expr, scope),
            CompiledOperand::Literal(value) => Ok(value.clone()),
        }
    }
}

fn strip_kind(err: &WorkflowError) -> String {
    match err {
        WorkflowError::Validation(msg) | WorkflowError::Evaluation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Compares `left <operator> right` and follows the matching branch
///
/// Operands see run inputs and earlier step outputs, never the step input itself.
/// Bare identifiers are looked up in the run inputs first, then in prior outputs
/// from the most recent backwards; `inputs.x` and `outputs.<stepId>.x` address them directly.
#[derive(Debug)]
pub struct ConditionExecutor {
    left: CompiledOperand,
    operator: ConditionOperator,
    right: CompiledOperand,
    on_true: String,
    on_false: String,
}

impl ConditionExecutor {
    pub fn compile(step_id: &str, action: &ConditionAction) -> Result<Self, WorkflowError> {
        let operator: ConditionOperator = action.operator.parse()?;

        let on_true = next_id(&action.on_true_next_step_id).ok_or_else(|| {
            WorkflowError::validation(format!(
                "Condition step '{}' is missing onTrueNextStepId",
                step_id
            ))
        })?;
        let on_false = next_id(&action.on_false_next_step_id).ok_or_else(|| {
            WorkflowError::validation(format!(
                "Condition step '{}' is missing onFalseNextStepId",
                step_id
            ))
        })?;

        Ok(Self {
            left: CompiledOperand::compile(step_id, "left", &action.left)?,
            operator,
            right: CompiledOperand::compile(step_id, "right", &action.right)?,
            on_true,
            on_false,
        })
    }

    pub fn operator(&self) -> ConditionOperator {
        self.operator
    }

    /// Evaluate the comparison against run inputs and the trace so far
    pub fn decide(&self, inputs: &Value, trace: &ExecutionTrace) -> Result<bool, WorkflowError> {
        let outputs = trace.outputs();
        let scope = trace.outputs_newest_first().fold(
            Scope::new()
                .with_root("inputs", inputs)
                .with_root("outputs", &outputs)
                .with_fallback(inputs),
            |scope, output| scope.with_fallback(output),
        );

        let left = self.left.resolve(&scope)?;
        let right = self.right.resolve(&scope)?;
        expression::compare(&left, self.operator.into(), &right)
    }
}

#[async_trait]
impl ActionExecutor for ConditionExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Condition
    }

    fn successors(&self) -> Vec<&str> {
        vec![self.on_true.as_str(), self.on_false.as_str()]
    }

    async fn execute(
        &self,
        step_id: &str,
        input: &Value,
        ctx: &RunContext<'_>,
    ) -> Result<StepOutcome, WorkflowError> {
        let outcome = self.decide(ctx.inputs, ctx.trace).map_err(|e| match e {
            WorkflowError::Evaluation(msg) => {
                WorkflowError::evaluation(format!("Condition step '{}': {}", step_id, msg))
            }
            other => other,
        })?;
        log::debug!("Condition step '{}' evaluated to {}", step_id, outcome);

        let next = if outcome {
            self.on_true.clone()
        } else {
            self.on_false.clone()
        };
        Ok(StepOutcome::branch(input.clone(), outcome, Some(next)))
    }
}
