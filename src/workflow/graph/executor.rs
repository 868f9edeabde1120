//! Workflow execution engine

use super::resolver::{CompiledStep, Graph};
use crate::config::EngineConfig;
use crate::error::{StepflowError, WorkflowError};
use crate::workflow::action::{RunContext, StepOutcome};
use crate::workflow::trace::{ExecutionTrace, RunEvent, RunFailure, RunResult, StepRecord};
use crate::workflow::types::WorkflowDefinition;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Walks a step graph one step at a time
///
/// Each run owns its trace and visit counters; the engine itself only holds the
/// configuration and a pooled HTTP client, so one engine can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    config: EngineConfig,
    client: reqwest::Client,
}

impl WorkflowEngine {
    pub fn new(config: EngineConfig) -> Result<Self, StepflowError> {
        let client = reqwest::Client::builder()
            .timeout(config.step_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load a definition and execute it
    ///
    /// Validation failures come back as a `RunFailure` with an empty trace.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        inputs: Value,
    ) -> Result<RunResult, RunFailure> {
        let graph = Graph::from_workflow(definition)
            .map_err(|e| RunFailure::new(Uuid::new_v4(), e, ExecutionTrace::new()))?;
        self.execute(&graph, inputs).await
    }

    /// Like `run`, pushing progress events to `tx` while the run executes
    pub async fn run_stream(
        &self,
        definition: &WorkflowDefinition,
        inputs: Value,
        tx: mpsc::Sender<RunEvent>,
    ) -> Result<RunResult, RunFailure> {
        match Graph::from_workflow(definition) {
            Ok(graph) => self.execute_stream(&graph, inputs, tx).await,
            Err(e) => {
                let failure = RunFailure::new(Uuid::new_v4(), e, ExecutionTrace::new());
                let _ = tx
                    .send(RunEvent::RunFailed {
                        run_id: failure.run_id,
                        error: failure.error.detail(),
                    })
                    .await;
                Err(failure)
            }
        }
    }

    /// Execute an already validated graph
    pub async fn execute(&self, graph: &Graph, inputs: Value) -> Result<RunResult, RunFailure> {
        self.drive(graph, inputs, None).await
    }

    pub async fn execute_stream(
        &self,
        graph: &Graph,
        inputs: Value,
        tx: mpsc::Sender<RunEvent>,
    ) -> Result<RunResult, RunFailure> {
        self.drive(graph, inputs, Some(&tx)).await
    }

    async fn drive(
        &self,
        graph: &Graph,
        inputs: Value,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunResult, RunFailure> {
        let run_id = Uuid::new_v4();
        // None when the timeout is too large to represent; the run is then unbounded
        let deadline = Instant::now().checked_add(self.config.run_timeout);
        let mut trace = ExecutionTrace::new();
        let mut visits: HashMap<String, u32> = HashMap::new();
        let mut cursor = graph.entry_id().to_string();
        let mut input = inputs.clone();

        log::info!(
            "Run {} of '{}' starting at step '{}'",
            run_id,
            graph.name(),
            cursor
        );
        emit(
            events,
            RunEvent::RunStarted {
                run_id,
                workflow: graph.name().to_string(),
                entry_step_id: cursor.clone(),
            },
        )
        .await;

        loop {
            let step = match graph.resolve(&cursor) {
                Ok(step) => step,
                Err(e) => return Err(fail(run_id, e, trace, events).await),
            };

            let count = visits.entry(cursor.clone()).or_insert(0);
            if *count >= self.config.max_visits_per_step {
                let err = WorkflowError::CycleLimitExceeded {
                    step_id: cursor.clone(),
                    limit: self.config.max_visits_per_step,
                };
                return Err(fail(run_id, err, trace, events).await);
            }
            *count += 1;
            let visit = *count;

            log::info!(
                "Executing step '{}' ({}), visit {}",
                step.id(),
                step.executor.kind(),
                visit
            );
            emit(
                events,
                RunEvent::StepStarted {
                    step_id: step.id().to_string(),
                    action: step.executor.kind(),
                    visit,
                },
            )
            .await;

            let started_at = Utc::now();
            let clock = std::time::Instant::now();
            let result = self
                .execute_step(step, &input, &inputs, &trace, deadline)
                .await;
            let elapsed = clock.elapsed();

            match result {
                Ok(StepOutcome {
                    output,
                    outcome,
                    next_step_id,
                }) => {
                    let next = if step.is_last() { None } else { next_step_id };
                    let consumed = std::mem::replace(&mut input, output.clone());
                    let record = StepRecord::completed(
                        &step.definition,
                        consumed,
                        output,
                        outcome,
                        next.clone(),
                        started_at,
                        elapsed,
                    );

                    log::info!(
                        "Step '{}' completed in {}ms -> {}",
                        step.id(),
                        record.duration_ms,
                        next.as_deref().unwrap_or("(end)")
                    );
                    emit(
                        events,
                        RunEvent::StepCompleted {
                            record: record.clone(),
                        },
                    )
                    .await;
                    trace.push(record);

                    match next {
                        Some(id) => cursor = id,
                        None => break,
                    }
                }
                Err(e) => {
                    log::error!("Step '{}' failed: {}", step.id(), e);
                    let record = StepRecord::failed(&step.definition, input, &e, started_at, elapsed);
                    emit(
                        events,
                        RunEvent::StepFailed {
                            record: record.clone(),
                        },
                    )
                    .await;
                    trace.push(record);
                    return Err(fail(run_id, e, trace, events).await);
                }
            }
        }

        log::info!("Run {} completed after {} steps", run_id, trace.len());
        emit(
            events,
            RunEvent::RunCompleted {
                run_id,
                output: input.clone(),
            },
        )
        .await;

        Ok(RunResult {
            run_id,
            output: input,
            trace,
        })
    }

    /// One visit, bounded by the run deadline
    async fn execute_step(
        &self,
        step: &CompiledStep,
        input: &Value,
        inputs: &Value,
        trace: &ExecutionTrace,
        deadline: Option<Instant>,
    ) -> Result<StepOutcome, WorkflowError> {
        let timed_out = || WorkflowError::Timeout {
            step_id: step.id().to_string(),
            after: self.config.run_timeout,
        };
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(timed_out());
        }

        let ctx = RunContext {
            client: &self.client,
            inputs,
            trace,
            step_timeout: self.config.step_timeout,
        };
        let execution = step.executor.execute(step.id(), input, &ctx);
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, execution)
                .await
                .unwrap_or_else(|_| Err(timed_out())),
            None => execution.await,
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

async fn fail(
    run_id: Uuid,
    error: WorkflowError,
    trace: ExecutionTrace,
    events: Option<&mpsc::Sender<RunEvent>>,
) -> RunFailure {
    log::error!("Run {} failed: {}", run_id, error);
    emit(
        events,
        RunEvent::RunFailed {
            run_id,
            error: error.detail(),
        },
    )
    .await;
    RunFailure::new(run_id, error, trace)
}
