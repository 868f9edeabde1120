// SPDX-License-Identifier: MIT

//! HTTP transport for the engine
//!
//! - `GET  /api/health`
//! - `GET  /api/schema` - JSON Schema of a run request
//! - `POST /api/executions` - run a workflow, respond with the result or failure
//! - `POST /api/executions/stream` - run a workflow, stream `RunEvent`s as SSE
//! - `POST /api/workflows/validate` - load a definition without running it

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{ErrorDetail, StepflowError, WorkflowError};
use crate::workflow::loader::WorkflowLoader;
use crate::workflow::types::{run_request_schema, RunRequest};
use crate::workflow::{Graph, RunEvent, WorkflowEngine};

/// State shared by every request handler
pub struct AppState {
    pub engine: WorkflowEngine,
}

pub fn router(engine: WorkflowEngine) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/schema", get(schema))
        .route("/api/executions", post(create_execution))
        .route("/api/executions/stream", post(stream_execution))
        .route("/api/workflows/validate", post(validate_workflow))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(port: u16, engine: WorkflowEngine) -> Result<(), StepflowError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, engine).await
}

/// Serve on an already bound listener
pub async fn serve_on(listener: TcpListener, engine: WorkflowEngine) -> Result<(), StepflowError> {
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn schema() -> Json<Value> {
    Json(run_request_schema().clone())
}

fn error_response(status: StatusCode, detail: ErrorDetail) -> Response {
    (status, Json(json!({ "error": detail }))).into_response()
}

/// Parse the body ourselves so malformed JSON maps to a 400 with our error shape
fn parse_run_request(body: &[u8]) -> Result<RunRequest, Box<Response>> {
    serde_json::from_slice::<RunRequest>(body).map_err(|e| {
        log::warn!("Rejected malformed run request: {}", e);
        Box::new(error_response(
            StatusCode::BAD_REQUEST,
            WorkflowError::validation(format!("Malformed run request: {}", e)).detail(),
        ))
    })
}

#[tracing::instrument(skip_all)]
async fn create_execution(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_run_request(&body) {
        Ok(request) => request,
        Err(response) => return *response,
    };

    match state.engine.run(&request.definition, request.inputs).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(failure) => {
            let status = if failure.error.is_validation() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(failure)).into_response()
        }
    }
}

#[tracing::instrument(skip_all)]
async fn stream_execution(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_run_request(&body) {
        Ok(request) => request,
        Err(response) => return *response,
    };

    event_stream(state, request).into_response()
}

fn event_stream(
    state: Arc<AppState>,
    request: RunRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<RunEvent>(100);

    tokio::spawn(async move {
        log::info!(
            "Starting streaming execution of '{}'",
            request.definition.name
        );
        if let Err(failure) = state
            .engine
            .run_stream(&request.definition, request.inputs, tx)
            .await
        {
            log::warn!("Streaming execution failed: {}", failure);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default().json_data(&event).unwrap_or_else(|e| {
            Event::default()
                .event("error")
                .data(format!("Could not encode event: {}", e))
        }))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

async fn validate_workflow(body: Bytes) -> Response {
    let document = match serde_json::from_slice::<Value>(&body) {
        Ok(document) => document,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                WorkflowError::validation(format!("Malformed definition: {}", e)).detail(),
            )
        }
    };

    let definition = match WorkflowLoader::from_document(document) {
        Ok(request) => request.definition,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                WorkflowError::validation(format!("Malformed definition: {}", e)).detail(),
            )
        }
    };

    match Graph::from_workflow(&definition) {
        Ok(graph) => Json(json!({
            "valid": true,
            "name": graph.name(),
            "steps": graph.len(),
            "entryStepId": graph.entry_id(),
            "unreachable": graph.unreachable(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "valid": false, "error": e.detail() })),
        )
            .into_response(),
    }
}
