// SPDX-License-Identifier: MIT

//! Graph resolver - validates a step list and indexes it by id

use crate::error::WorkflowError;
use crate::workflow::action::{self, ActionExecutor};
use crate::workflow::types::{StepDefinition, WorkflowDefinition};
use std::collections::{HashMap, HashSet, VecDeque};

/// Step with its executor compiled
pub struct CompiledStep {
    pub definition: StepDefinition,
    pub executor: Box<dyn ActionExecutor>,
}

impl CompiledStep {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn is_last(&self) -> bool {
        self.definition.is_last
    }
}

impl std::fmt::Debug for CompiledStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStep")
            .field("id", &self.definition.id)
            .field("action", &self.executor.kind())
            .finish()
    }
}

/// Validated, read-only step graph for one run
#[derive(Debug)]
pub struct Graph {
    name: String,
    steps: HashMap<String, CompiledStep>,
    /// Declaration order
    order: Vec<String>,
    entry: String,
}

impl Graph {
    /// Validate and compile a full workflow definition
    pub fn from_workflow(definition: &WorkflowDefinition) -> Result<Self, WorkflowError> {
        let mut graph = Self::load(&definition.steps)?;
        graph.name = definition.name.clone();
        Ok(graph)
    }

    /// Validate and compile a step list
    ///
    /// Every check runs here, before any step executes: empty list, duplicate or
    /// blank ids, conflicting entry flags, malformed actions and dangling references.
    pub fn load(steps: &[StepDefinition]) -> Result<Self, WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::validation("Workflow has no steps"));
        }

        let mut seen = HashSet::new();
        for step in steps {
            if step.id.trim().is_empty() {
                return Err(WorkflowError::validation("Step id must not be empty"));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(WorkflowError::validation(format!(
                    "Duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let flagged: Vec<&str> = steps
            .iter()
            .filter(|s| s.is_first)
            .map(|s| s.id.as_str())
            .collect();
        let entry = match flagged.as_slice() {
            [] => {
                let first = &steps[0].id;
                log::warn!(
                    "No step is flagged isFirst; falling back to first declared step '{}'",
                    first
                );
                first.clone()
            }
            [only] => only.to_string(),
            many => {
                return Err(WorkflowError::validation(format!(
                    "Multiple steps are flagged isFirst: {}",
                    many.join(", ")
                )))
            }
        };

        for step in steps {
            for (field, target) in step.action.next_step_refs() {
                if !seen.contains(target) {
                    return Err(WorkflowError::validation(format!(
                        "Step '{}' {} references unknown step '{}'",
                        step.id, field, target
                    )));
                }
            }
        }

        let mut compiled = HashMap::with_capacity(steps.len());
        for step in steps {
            let executor = action::compile(step)?;
            compiled.insert(
                step.id.clone(),
                CompiledStep {
                    definition: step.clone(),
                    executor,
                },
            );
        }

        let graph = Self {
            name: String::new(),
            steps: compiled,
            order: steps.iter().map(|s| s.id.clone()).collect(),
            entry,
        };

        let unreachable = graph.unreachable();
        if !unreachable.is_empty() {
            log::warn!(
                "Steps unreachable from entry '{}': {}",
                graph.entry,
                unreachable.join(", ")
            );
        }

        Ok(graph)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_id(&self) -> &str {
        &self.entry
    }

    pub fn entry(&self) -> Result<&CompiledStep, WorkflowError> {
        self.resolve(&self.entry)
    }

    /// Look up a step at traversal time
    pub fn resolve(&self, id: &str) -> Result<&CompiledStep, WorkflowError> {
        self.steps
            .get(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Step ids in declaration order
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Declared steps no path from the entry can reach
    pub fn unreachable(&self) -> Vec<&str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([self.entry.as_str()]);

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(step) = self.steps.get(id) {
                if step.is_last() {
                    continue;
                }
                queue.extend(step.executor.successors());
            }
        }

        self.step_ids().filter(|id| !visited.contains(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{
        ActionDefinition, ConditionAction, HttpRequestAction, InlineLogicAction, Operand,
    };
    use serde_json::json;

    fn http(id: &str, next: Option<&str>) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: None,
            is_first: false,
            is_last: false,
            action: ActionDefinition::HttpRequest(HttpRequestAction {
                method: Default::default(),
                url: "http://localhost/x".into(),
                headers: Default::default(),
                body: None,
                next_step_id: next.map(str::to_string),
            }),
        }
    }

    fn condition(id: &str, operator: &str, on_true: &str, on_false: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: None,
            is_first: false,
            is_last: false,
            action: ActionDefinition::Condition(ConditionAction {
                left: Operand::Expression("price".into()),
                operator: operator.to_string(),
                right: Operand::Value(json!(30000)),
                on_true_next_step_id: Some(on_true.to_string()),
                on_false_next_step_id: Some(on_false.to_string()),
            }),
        }
    }

    fn first(mut step: StepDefinition) -> StepDefinition {
        step.is_first = true;
        step
    }

    #[test]
    fn test_load_valid_graph() {
        let steps = vec![
            http("C", None),
            first(http("A", Some("B"))),
            condition("B", ">", "C", "D"),
            http("D", None),
        ];
        let graph = Graph::load(&steps).unwrap();

        assert_eq!(graph.entry_id(), "A");
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.resolve("B").unwrap().id(), "B");
        assert!(graph.unreachable().is_empty());
        assert_eq!(graph.step_ids().collect::<Vec<_>>(), vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_entry_falls_back_to_first_declared() {
        let steps = vec![http("A", Some("B")), http("B", None)];
        let graph = Graph::load(&steps).unwrap();
        assert_eq!(graph.entry_id(), "A");
    }

    #[test]
    fn test_empty_list_rejected() {
        let err = Graph::load(&[]).unwrap_err();
        assert_eq!(err, WorkflowError::validation("Workflow has no steps"));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let steps = vec![first(http("A", Some("missing")))];
        let err = Graph::load(&steps).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("'missing'"));
        assert!(err.to_string().contains("nextStepId"));
    }

    #[test]
    fn test_empty_next_id_is_terminal() {
        let steps = vec![first(http("A", Some("")))];
        let graph = Graph::load(&steps).unwrap();
        assert!(graph.entry().unwrap().executor.successors().is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let steps = vec![http("A", None), http("A", None)];
        assert!(Graph::load(&steps)
            .unwrap_err()
            .to_string()
            .contains("Duplicate step id 'A'"));
    }

    #[test]
    fn test_multiple_entry_flags_rejected() {
        let steps = vec![first(http("A", None)), first(http("B", None))];
        assert!(Graph::load(&steps).unwrap_err().is_validation());
    }

    #[test]
    fn test_unsupported_operator_rejected() {
        let steps = vec![first(condition("B", "~=", "B", "B"))];
        assert_eq!(
            Graph::load(&steps).unwrap_err(),
            WorkflowError::UnsupportedOperator("~=".into())
        );
    }

    #[test]
    fn test_bad_expression_rejected_at_load() {
        let steps = vec![StepDefinition {
            id: "E".into(),
            name: None,
            is_first: true,
            is_last: false,
            action: ActionDefinition::InlineLogic(InlineLogicAction {
                expression: "input.price >".into(),
                on_success_next_step_id: None,
                on_failure_next_step_id: None,
            }),
        }];
        assert!(Graph::load(&steps).unwrap_err().is_validation());
    }

    #[test]
    fn test_deeply_nested_expression_rejected_at_load() {
        let expression = format!("{}true{}", "(".repeat(50_000), ")".repeat(50_000));
        let mut step = condition("C", ">", "C", "C");
        if let ActionDefinition::Condition(action) = &mut step.action {
            action.left = Operand::Expression(expression.clone());
        }
        let inline = StepDefinition {
            id: "E".into(),
            name: None,
            is_first: true,
            is_last: false,
            action: ActionDefinition::InlineLogic(InlineLogicAction {
                expression,
                on_success_next_step_id: None,
                on_failure_next_step_id: None,
            }),
        };

        for steps in [vec![first(step)], vec![inline]] {
            let err = Graph::load(&steps).unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains("nested too deeply"));
        }
    }

    #[test]
    fn test_resolve_unknown_id() {
        let graph = Graph::load(&[first(http("A", None))]).unwrap();
        assert_eq!(
            graph.resolve("Z").unwrap_err(),
            WorkflowError::NotFound("Z".into())
        );
    }

    #[test]
    fn test_unreachable_steps_reported() {
        let steps = vec![first(http("A", None)), http("orphan", None)];
        let graph = Graph::load(&steps).unwrap();
        assert_eq!(graph.unreachable(), vec!["orphan"]);
    }

    #[test]
    fn test_from_workflow_keeps_name() {
        let definition = WorkflowDefinition {
            name: "btc-check".into(),
            description: String::new(),
            steps: vec![first(http("A", None))],
        };
        let graph = Graph::from_workflow(&definition).unwrap();
        assert_eq!(graph.name(), "btc-check");
    }
}
