//! Workflow loader - JSON and YAML file loading and parsing
//!
//! A file holds either a bare workflow definition or a full run request
//! (`{definition, inputs}`); the extension picks the format.

use super::types::{RunRequest, WorkflowDefinition};
use crate::error::StepflowError;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// `.yaml` / `.yml` are YAML, everything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Format::Yaml
            }
            _ => Format::Json,
        }
    }
}

/// Loads workflow definitions and run requests from disk
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition; a run request file yields its definition
    pub fn load_workflow<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<WorkflowDefinition, StepflowError> {
        self.load_request(path).map(|request| request.definition)
    }

    /// Load a run request; a bare definition gets empty inputs
    pub fn load_request<P: AsRef<Path>>(&self, path: P) -> Result<RunRequest, StepflowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let document = match Format::from_path(path) {
            Format::Json => serde_json::from_str::<Value>(&content)?,
            Format::Yaml => serde_yaml::from_str::<Value>(&content)?,
        };
        Self::from_document(document)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, StepflowError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// Parse a workflow definition from a JSON string
    pub fn parse_json(content: &str) -> Result<WorkflowDefinition, StepflowError> {
        let def: WorkflowDefinition = serde_json::from_str(content)?;
        Ok(def)
    }

    /// Parse a run request from a JSON string
    pub fn parse_request(content: &str) -> Result<RunRequest, StepflowError> {
        let request: RunRequest = serde_json::from_str(content)?;
        Ok(request)
    }

    /// Interpret a parsed document as a run request or a bare definition
    pub fn from_document(document: Value) -> Result<RunRequest, StepflowError> {
        if document.get("definition").is_some() {
            return Ok(serde_json::from_value(document)?);
        }
        Ok(RunRequest {
            definition: serde_json::from_value(document)?,
            inputs: Value::Object(Default::default()),
        })
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
