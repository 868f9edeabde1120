//! Integration tests for workflow loading and execution
//!
//! These tests drive the engine and the HTTP transport end to end, with action
//! targets served by a mock HTTP server.

use serde_json::{json, Value};
use std::time::Duration;
use stepflow_rs::config::EngineConfig;
use stepflow_rs::error::WorkflowError;
use stepflow_rs::server;
use stepflow_rs::workflow::{
    RunRequest, StepStatus, WorkflowDefinition, WorkflowEngine, WorkflowLoader,
};
use tokio::net::TcpListener;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

/// A -> GET price, B -> price > 30000, C (true) / D (false) -> POST echo
fn price_check(base: &str) -> Value {
    json!({
        "name": "btc-check",
        "steps": [
            {
                "id": "A",
                "name": "Fetch price",
                "isFirst": true,
                "action": {
                    "type": "httpRequest",
                    "method": "GET",
                    "url": format!("{}/price?currency={{currency}}", base),
                    "nextStepId": "B"
                }
            },
            {
                "id": "B",
                "action": {
                    "type": "condition",
                    "left": "price",
                    "operator": ">",
                    "right": 30000,
                    "onTrueNextStepId": "C",
                    "onFalseNextStepId": "D"
                }
            },
            {
                "id": "C",
                "isLast": true,
                "action": { "type": "httpRequest", "method": "POST", "url": format!("{}/high", base) }
            },
            {
                "id": "D",
                "isLast": true,
                "action": {
                    "type": "httpRequest",
                    "method": "POST",
                    "url": format!("{}/low", base),
                    "body": { "alert": "price dropped", "price": "{input.price}" }
                }
            }
        ]
    })
}

fn definition(value: Value) -> WorkflowDefinition {
    serde_json::from_value(value).unwrap()
}

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(EngineConfig::default()).unwrap()
}

async fn mock_price(server: &MockServer, price: u64) {
    Mock::given(method("GET"))
        .and(path("/price"))
        .and(query_param("currency", "USD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": price })))
        .expect(1)
        .mount(server)
        .await;
}

async fn spawn_server(config: EngineConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let engine = WorkflowEngine::new(config).unwrap();
    tokio::spawn(server::serve_on(listener, engine));
    format!("http://{}", addr)
}

// ============================================================================
// Engine
// ============================================================================

#[tokio::test]
async fn test_price_check_takes_true_branch() {
    let server = MockServer::start().await;
    mock_price(&server, 45000).await;
    Mock::given(method("POST"))
        .and(path("/high"))
        .and(body_json(json!({ "price": 45000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "notified": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/low"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = engine()
        .run(
            &definition(price_check(&server.uri())),
            json!({ "currency": "USD" }),
        )
        .await
        .unwrap();

    assert_eq!(result.trace.len(), 3);
    assert_eq!(result.trace.path(), vec!["A", "B", "C"]);
    assert_eq!(result.trace.get("B").unwrap().outcome, Some(true));
    assert_eq!(result.trace.get("B").unwrap().input, json!({ "price": 45000 }));
    assert_eq!(result.trace.get("C").unwrap().input, json!({ "price": 45000 }));
    assert_eq!(result.output, json!({ "notified": true }));
    assert_eq!(
        result.trace.get("A").unwrap().input,
        json!({ "currency": "USD" })
    );
}

#[tokio::test]
async fn test_price_check_takes_false_branch() {
    let server = MockServer::start().await;
    mock_price(&server, 100).await;
    Mock::given(method("POST"))
        .and(path("/low"))
        .and(body_json(json!({ "alert": "price dropped", "price": 100 })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let result = engine()
        .run(
            &definition(price_check(&server.uri())),
            json!({ "currency": "USD" }),
        )
        .await
        .unwrap();

    assert_eq!(result.trace.path(), vec!["A", "B", "D"]);
    assert_eq!(result.trace.get("B").unwrap().outcome, Some(false));
    assert_eq!(result.output, Value::Null);
}

#[tokio::test]
async fn test_self_loop_stops_at_visit_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/poll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "done": false })))
        .expect(3)
        .mount(&server)
        .await;

    let looping = definition(json!({
        "steps": [{
            "id": "X",
            "isFirst": true,
            "action": { "type": "httpRequest", "url": format!("{}/poll", server.uri()), "nextStepId": "X" }
        }]
    }));

    let failure = WorkflowEngine::new(EngineConfig::default().with_max_visits(3))
        .unwrap()
        .run(&looping, json!({}))
        .await
        .unwrap_err();

    assert_eq!(
        failure.error,
        WorkflowError::CycleLimitExceeded {
            step_id: "X".into(),
            limit: 3
        }
    );
    assert_eq!(failure.trace.path(), vec!["X", "X", "X"]);
}

#[tokio::test]
async fn test_failing_target_halts_run() {
    let server = MockServer::start().await;
    mock_price(&server, 45000).await;
    Mock::given(method("POST"))
        .and(path("/high"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut value = price_check(&server.uri());
    // Send C on to D so an unreached step exists after the failure
    value["steps"][2]["isLast"] = json!(false);
    value["steps"][2]["action"]["nextStepId"] = json!("D");
    Mock::given(path("/low"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let failure = engine()
        .run(&definition(value), json!({ "currency": "USD" }))
        .await
        .unwrap_err();

    assert_eq!(
        failure.error,
        WorkflowError::request("C", Some(500), "Internal Server Error")
    );
    assert_eq!(failure.trace.path(), vec!["A", "B", "C"]);
    assert_eq!(failure.trace.get("B").unwrap().status, StepStatus::Completed);
    let failed = failure.trace.get("C").unwrap();
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.error.as_ref().unwrap().kind, "request_error");
    assert!(failed.output.is_none());
}

#[tokio::test]
async fn test_invalid_definition_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut value = price_check(&server.uri());
    value["steps"][1]["action"]["onFalseNextStepId"] = json!("nowhere");

    let failure = engine()
        .run(&definition(value), json!({ "currency": "USD" }))
        .await
        .unwrap_err();

    assert!(failure.error.is_validation());
    assert!(failure.error.to_string().contains("nowhere"));
    assert!(failure.trace.is_empty());
}

#[tokio::test]
async fn test_decisions_are_repeatable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": 45000 })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let def = definition(price_check(&server.uri()));
    let engine = engine();
    let first = engine.run(&def, json!({ "currency": "USD" })).await.unwrap();
    let second = engine.run(&def, json!({ "currency": "USD" })).await.unwrap();

    assert_eq!(first.trace.path(), second.trace.path());
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_yaml_workflow_with_inline_logic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "paid", "items": [1, 2, 3] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ship"))
        .and(body_json(json!({ "order": 42, "count": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = format!(
        r#"
name: ship-order
steps:
  - id: fetch
    isFirst: true
    action:
      type: httpRequest
      url: "{base}/order/{{orderId}}"
      nextStepId: check
  - id: check
    action:
      type: inlineLogic
      expression: "status == 'paid' and items.length >= 3"
      onSuccessNextStepId: ship
  - id: ship
    action:
      type: httpRequest
      method: POST
      url: "{base}/ship"
      body:
        order: "{{inputs.orderId}}"
        count: "{{input.items.length}}"
"#,
        base = server.uri()
    );
    let def = WorkflowLoader::parse_yaml(&yaml).unwrap();

    let result = engine().run(&def, json!({ "orderId": 42 })).await.unwrap();

    assert_eq!(result.trace.path(), vec!["fetch", "check", "ship"]);
    assert_eq!(result.trace.get("check").unwrap().outcome, Some(true));
    assert_eq!(result.output, json!("queued"));
}

// ============================================================================
// HTTP transport
// ============================================================================

#[tokio::test]
async fn test_server_health() {
    let base = spawn_server(EngineConfig::default()).await;
    let body: Value = reqwest::get(format!("{}/api/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_server_execution_success() {
    let target = MockServer::start().await;
    mock_price(&target, 45000).await;
    Mock::given(method("POST"))
        .and(path("/high"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&target)
        .await;

    let base = spawn_server(EngineConfig::default()).await;
    let request = json!({
        "definition": price_check(&target.uri()),
        "inputs": { "currency": "USD" }
    });

    let response = reqwest::Client::new()
        .post(format!("{}/api/executions", base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["output"], json!({ "ok": true }));
    assert_eq!(body["trace"].as_array().unwrap().len(), 3);
    assert_eq!(body["trace"][1]["stepId"], "B");
    assert_eq!(body["trace"][1]["outcome"], true);
    assert!(body["runId"].is_string());
}

#[tokio::test]
async fn test_server_rejects_malformed_body() {
    let base = spawn_server(EngineConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/executions", base))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "validation_error");
}

#[tokio::test]
async fn test_server_rejects_invalid_definition() {
    let base = spawn_server(EngineConfig::default()).await;
    let request = json!({
        "definition": {
            "steps": [{
                "id": "B",
                "action": {
                    "type": "condition", "left": "a", "operator": "~", "right": 1,
                    "onTrueNextStepId": "B", "onFalseNextStepId": "B"
                }
            }]
        }
    });

    let response = reqwest::Client::new()
        .post(format!("{}/api/executions", base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "unsupported_operator_error");
    assert_eq!(body["trace"], json!([]));
}

#[tokio::test]
async fn test_server_reports_execution_failure() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&target)
        .await;

    let base = spawn_server(EngineConfig::default()).await;
    let request = RunRequest {
        definition: definition(price_check(&target.uri())),
        inputs: json!({ "currency": "USD" }),
    };

    let response = reqwest::Client::new()
        .post(format!("{}/api/executions", base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "request_error");
    assert_eq!(body["trace"].as_array().unwrap().len(), 1);
    assert_eq!(body["trace"][0]["status"], "failed");
}

#[tokio::test]
async fn test_server_validate_endpoint() {
    let base = spawn_server(EngineConfig::default()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/workflows/validate", base))
        .json(&price_check("http://localhost:9"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["steps"], 4);
    assert_eq!(body["entryStepId"], "A");

    let response = client
        .post(format!("{}/api/workflows/validate", base))
        .json(&json!({ "steps": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn test_server_streams_events() {
    let base = spawn_server(EngineConfig::default()).await;
    let request = json!({
        "definition": {
            "steps": [
                { "id": "A", "isFirst": true,
                  "action": { "type": "inlineLogic", "expression": "input.n > 1",
                              "onSuccessNextStepId": "B" } },
                { "id": "B", "action": { "type": "inlineLogic", "expression": "true" } }
            ]
        },
        "inputs": { "n": 5 }
    });

    let response = reqwest::Client::new()
        .post(format!("{}/api/executions/stream", base))
        .json(&request)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let text = response.text().await.unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect();

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "runStarted",
            "stepStarted",
            "stepCompleted",
            "stepStarted",
            "stepCompleted",
            "runCompleted"
        ]
    );
    assert_eq!(events[5]["output"], json!({ "n": 5 }));
}
