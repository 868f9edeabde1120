// SPDX-License-Identifier: MIT

//! Schema types for workflow definitions
//!
//! This module contains the data structures a workflow definition is parsed into.
//! One camelCase dialect is accepted, from JSON or YAML.

use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// Body accepted by the transport and the CLI: a definition plus its run inputs
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub definition: WorkflowDefinition,
    #[serde(default = "empty_inputs")]
    pub inputs: Value,
}

fn empty_inputs() -> Value {
    Value::Object(Default::default())
}

/// A node in the workflow graph
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique, case-sensitive identifier
    pub id: String,
    /// Human label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entry point flag
    #[serde(default)]
    pub is_first: bool,
    /// Terminal flag; traversal stops after this step even if a next id exists
    #[serde(default)]
    pub is_last: bool,
    pub action: ActionDefinition,
}

/// The unit of work a step performs
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionDefinition {
    HttpRequest(HttpRequestAction),
    Condition(ConditionAction),
    InlineLogic(InlineLogicAction),
}

/// HTTP call with a single unconditional successor
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestAction {
    #[serde(default)]
    pub method: HttpMethod,
    /// May contain `{placeholder}` segments
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
}

/// Comparison between two operands with a true and a false branch
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionAction {
    pub left: Operand,
    pub operator: String,
    pub right: Operand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_true_next_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_false_next_step_id: Option<String>,
}

/// Boolean expression over the current input with success and failure branches
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InlineLogicAction {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success_next_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure_next_step_id: Option<String>,
}

/// Condition operand: a string is parsed as an expression, anything else is a literal
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum Operand {
    Expression(String),
    Value(Value),
}

/// HTTP method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    /// Methods that send the current input when no body is declared
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => reqwest::Method::GET,
            HttpMethod::POST => reqwest::Method::POST,
            HttpMethod::PUT => reqwest::Method::PUT,
            HttpMethod::PATCH => reqwest::Method::PATCH,
            HttpMethod::DELETE => reqwest::Method::DELETE,
        }
    }
}

/// Action capability tag, recorded in the trace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    HttpRequest,
    Condition,
    InlineLogic,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::HttpRequest => write!(f, "httpRequest"),
            ActionKind::Condition => write!(f, "condition"),
            ActionKind::InlineLogic => write!(f, "inlineLogic"),
        }
    }
}

impl ActionDefinition {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionDefinition::HttpRequest(_) => ActionKind::HttpRequest,
            ActionDefinition::Condition(_) => ActionKind::Condition,
            ActionDefinition::InlineLogic(_) => ActionKind::InlineLogic,
        }
    }

    /// Declared successor ids with the field that declares them; empty ids are skipped
    pub fn next_step_refs(&self) -> Vec<(&'static str, &str)> {
        let refs: Vec<(&'static str, &Option<String>)> = match self {
            ActionDefinition::HttpRequest(a) => vec![("nextStepId", &a.next_step_id)],
            ActionDefinition::Condition(a) => vec![
                ("onTrueNextStepId", &a.on_true_next_step_id),
                ("onFalseNextStepId", &a.on_false_next_step_id),
            ],
            ActionDefinition::InlineLogic(a) => vec![
                ("onSuccessNextStepId", &a.on_success_next_step_id),
                ("onFailureNextStepId", &a.on_failure_next_step_id),
            ],
        };

        refs.into_iter()
            .filter_map(|(field, id)| non_empty(id).map(|id| (field, id)))
            .collect()
    }
}

/// Treats an empty string the same as an absent id
pub fn non_empty(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|s| !s.is_empty())
}

static RUN_REQUEST_SCHEMA: Lazy<Value> =
    Lazy::new(|| serde_json::to_value(schemars::schema_for!(RunRequest)).unwrap_or_default());

/// JSON Schema of a run request
pub fn run_request_schema() -> &'static Value {
    &RUN_REQUEST_SCHEMA
}
