// SPDX-License-Identifier: MIT

//! `{placeholder}` substitution for HTTP URLs, headers and bodies

use crate::error::WorkflowError;
use crate::workflow::scope::Scope;
use serde_json::Value;

/// A `{key}` occurrence inside a template
struct Placeholder<'t> {
    start: usize,
    end: usize,
    key: &'t str,
}

/// Find placeholders; braces around anything that is not a plain dotted key stay literal
fn scan(template: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut offset = 0;

    while let Some(open) = template[offset..].find('{') {
        let start = offset + open;
        let Some(close) = template[start + 1..].find('}') else {
            break;
        };
        let end = start + 1 + close;
        let key = &template[start + 1..end];

        if is_key(key) {
            found.push(Placeholder {
                start,
                end: end + 1,
                key,
            });
            offset = end + 1;
        } else {
            offset = start + 1;
        }
    }

    found
}

fn is_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with('.')
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$'))
}

/// True when the template contains at least one placeholder
pub fn has_placeholders(template: &str) -> bool {
    !scan(template).is_empty()
}

/// Substitute every placeholder with the textual form of its value
pub fn render_string(template: &str, scope: &Scope<'_>) -> Result<String, WorkflowError> {
    let placeholders = scan(template);
    if placeholders.is_empty() {
        return Ok(template.to_string());
    }

    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for placeholder in placeholders {
        rendered.push_str(&template[last..placeholder.start]);
        let value = resolve(placeholder.key, scope)?;
        match value {
            Value::String(s) => rendered.push_str(&s),
            other => rendered.push_str(&other.to_string()),
        }
        last = placeholder.end;
    }
    rendered.push_str(&template[last..]);

    Ok(rendered)
}

/// Substitute placeholders in every string of a JSON value
///
/// A string consisting of exactly one placeholder is replaced by the raw value,
/// so `"{count}"` can become a number rather than the text `"3"`.
pub fn render_value(value: &Value, scope: &Scope<'_>) -> Result<Value, WorkflowError> {
    match value {
        Value::String(s) => {
            let placeholders = scan(s);
            if let [only] = placeholders.as_slice() {
                if only.start == 0 && only.end == s.len() {
                    return resolve(only.key, scope);
                }
            }
            render_string(s, scope).map(Value::String)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                rendered.insert(k.clone(), render_value(v, scope)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn resolve(key: &str, scope: &Scope<'_>) -> Result<Value, WorkflowError> {
    scope
        .get_path(key)
        .map(|v| v.into_owned())
        .ok_or_else(|| WorkflowError::evaluation(format!("Missing input value for '{}'", key)))
}
