// SPDX-License-Identifier: MIT

//! Execution trace, run results and streaming events

use crate::error::{ErrorDetail, WorkflowError};
use crate::workflow::types::{ActionKind, StepDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// One executed visit of a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub action: ActionKind,
    pub input: Value,
    /// Absent for failed steps; `null` is a legitimate output (empty response body)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Boolean result of a branching step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn completed(
        step: &StepDefinition,
        input: Value,
        output: Value,
        outcome: Option<bool>,
        next_step_id: Option<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            step_id: step.id.clone(),
            name: step.name.clone(),
            action: step.action.kind(),
            input,
            output: Some(output),
            outcome,
            next_step_id,
            status: StepStatus::Completed,
            error: None,
            started_at,
            duration_ms: millis(elapsed),
        }
    }

    pub fn failed(
        step: &StepDefinition,
        input: Value,
        error: &WorkflowError,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            step_id: step.id.clone(),
            name: step.name.clone(),
            action: step.action.kind(),
            input,
            output: None,
            outcome: None,
            next_step_id: None,
            status: StepStatus::Failed,
            error: Some(error.detail()),
            started_at,
            duration_ms: millis(elapsed),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Ordered record of every step visit in a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ExecutionTrace {
    records: Vec<StepRecord>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    /// Latest record for a step id
    pub fn get(&self, step_id: &str) -> Option<&StepRecord> {
        self.records.iter().rev().find(|r| r.step_id == step_id)
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Step ids in execution order
    pub fn path(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.step_id.as_str()).collect()
    }

    /// Latest completed output per step id, as an object keyed by id
    pub fn outputs(&self) -> Value {
        let mut outputs = Map::new();
        for record in self.records.iter().filter(|r| r.is_completed()) {
            if let Some(output) = &record.output {
                outputs.insert(record.step_id.clone(), output.clone());
            }
        }
        Value::Object(outputs)
    }

    /// Completed outputs, most recent first
    pub fn outputs_newest_first(&self) -> impl Iterator<Item = &Value> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.is_completed())
            .filter_map(|r| r.output.as_ref())
    }
}

/// Successful run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: Uuid,
    /// Output of the last executed step
    pub output: Value,
    pub trace: ExecutionTrace,
}

/// Failed run with the trace accumulated up to the failure
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("Run {run_id} failed: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    #[serde(serialize_with = "serialize_error")]
    pub error: WorkflowError,
    pub trace: ExecutionTrace,
}

impl RunFailure {
    pub fn new(run_id: Uuid, error: WorkflowError, trace: ExecutionTrace) -> Self {
        Self {
            run_id,
            error,
            trace,
        }
    }
}

fn serialize_error<S: Serializer>(error: &WorkflowError, serializer: S) -> Result<S::Ok, S::Error> {
    error.detail().serialize(serializer)
}

/// Progress events pushed while a run executes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: Uuid,
        workflow: String,
        entry_step_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StepStarted {
        step_id: String,
        action: ActionKind,
        visit: u32,
    },
    StepCompleted { record: StepRecord },
    StepFailed { record: StepRecord },
    #[serde(rename_all = "camelCase")]
    RunCompleted { run_id: Uuid, output: Value },
    #[serde(rename_all = "camelCase")]
    RunFailed { run_id: Uuid, error: ErrorDetail },
}
