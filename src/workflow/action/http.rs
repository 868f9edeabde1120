// SPDX-License-Identifier: MIT

use super::{next_id, ActionExecutor, RunContext, StepOutcome};
use crate::error::WorkflowError;
use crate::workflow::scope::Scope;
use crate::workflow::template;
use crate::workflow::types::{ActionKind, HttpMethod, HttpRequestAction};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

/// Issues the step's HTTP request and parses the response as the step output
///
/// URL, header values and body strings may carry `{placeholder}`s. They resolve
/// against `inputs` (run inputs) and `input` (the previous step's output); bare keys
/// are looked up in the run inputs first, then in the current input.
#[derive(Debug)]
pub struct HttpExecutor {
    method: HttpMethod,
    url: String,
    headers: Vec<(HeaderName, String)>,
    body: Option<Value>,
    next_step_id: Option<String>,
}

impl HttpExecutor {
    pub fn compile(step_id: &str, action: &HttpRequestAction) -> Result<Self, WorkflowError> {
        if action.url.trim().is_empty() {
            return Err(WorkflowError::validation(format!(
                "Step '{}' has an empty url",
                step_id
            )));
        }
        if !template::has_placeholders(&action.url) {
            Url::parse(&action.url).map_err(|e| {
                WorkflowError::validation(format!(
                    "Step '{}' has an invalid url '{}': {}",
                    step_id, action.url, e
                ))
            })?;
        }

        let headers = action
            .headers
            .iter()
            .map(|(name, value)| {
                HeaderName::from_bytes(name.as_bytes())
                    .map(|name| (name, value.clone()))
                    .map_err(|_| {
                        WorkflowError::validation(format!(
                            "Step '{}' has an invalid header name '{}'",
                            step_id, name
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            method: action.method,
            url: action.url.clone(),
            headers,
            body: action.body.clone(),
            next_step_id: next_id(&action.next_step_id),
        })
    }

    fn build_headers(&self, step_id: &str, scope: &Scope<'_>) -> Result<HeaderMap, WorkflowError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, template_value) in &self.headers {
            let rendered = template::render_string(template_value, scope)?;
            let value = HeaderValue::from_str(&rendered).map_err(|_| {
                WorkflowError::evaluation(format!(
                    "Step '{}': invalid value for header '{}'",
                    step_id, name
                ))
            })?;
            headers.insert(name.clone(), value);
        }

        Ok(headers)
    }

    fn build_body(&self, input: &Value, scope: &Scope<'_>) -> Result<Option<Value>, WorkflowError> {
        match &self.body {
            Some(body) => template::render_value(body, scope).map(Some),
            None if self.method.carries_body() => Ok(Some(input.clone())),
            None => Ok(None),
        }
    }

    fn transport_error(
        &self,
        step_id: &str,
        err: reqwest::Error,
        ctx: &RunContext<'_>,
    ) -> WorkflowError {
        if err.is_timeout() {
            WorkflowError::Timeout {
                step_id: step_id.to_string(),
                after: ctx.step_timeout,
            }
        } else {
            WorkflowError::request(step_id, None, err.to_string())
        }
    }
}

/// Empty body is `null`, JSON is parsed, anything else is kept as a string
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl ActionExecutor for HttpExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::HttpRequest
    }

    fn successors(&self) -> Vec<&str> {
        self.next_step_id.as_deref().into_iter().collect()
    }

    async fn execute(
        &self,
        step_id: &str,
        input: &Value,
        ctx: &RunContext<'_>,
    ) -> Result<StepOutcome, WorkflowError> {
        let scope = Scope::new()
            .with_root("inputs", ctx.inputs)
            .with_root("input", input)
            .with_fallback(ctx.inputs)
            .with_fallback(input);

        let rendered = template::render_string(&self.url, &scope)?;
        let url = Url::parse(&rendered).map_err(|e| {
            WorkflowError::evaluation(format!(
                "Step '{}' resolved an invalid url '{}': {}",
                step_id, rendered, e
            ))
        })?;
        let headers = self.build_headers(step_id, &scope)?;
        let body = self.build_body(input, &scope)?;

        log::debug!("{:?} {} for step '{}'", self.method, url, step_id);

        let mut request = ctx
            .client
            .request(self.method.into(), url)
            .headers(headers);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(step_id, e, ctx))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            return Err(WorkflowError::request(step_id, Some(status.as_u16()), reason));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(step_id, e, ctx))?;

        Ok(StepOutcome::chain(parse_body(&text), self.next_step_id.clone()))
    }
}
