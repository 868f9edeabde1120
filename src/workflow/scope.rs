// SPDX-License-Identifier: MIT

//! Read-only evaluation scope for expressions and templates
//!
//! A scope is a set of named roots (`input`, `inputs`, `outputs`) plus an ordered
//! list of fallback objects that bare identifiers are looked up in.

use crate::workflow::expression::PathSegment;
use serde_json::Value;
use std::borrow::Cow;

#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    roots: Vec<(&'a str, &'a Value)>,
    fallbacks: Vec<&'a Value>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `value` under `name`
    pub fn with_root(mut self, name: &'a str, value: &'a Value) -> Self {
        self.roots.push((name, value));
        self
    }

    /// Search `value` for bare identifiers that match no root; earlier fallbacks win
    pub fn with_fallback(mut self, value: &'a Value) -> Self {
        self.fallbacks.push(value);
        self
    }

    /// Resolve a parsed path; `None` when any segment is missing
    pub fn lookup(&self, segments: &[PathSegment]) -> Option<Cow<'a, Value>> {
        let (first, rest) = segments.split_first()?;
        let PathSegment::Field(name) = first else {
            return None;
        };

        let start = self
            .roots
            .iter()
            .copied()
            .find(|(root, _)| *root == name.as_str())
            .map(|(_, value)| value)
            .or_else(|| {
                self.fallbacks
                    .iter()
                    .copied()
                    .find_map(|v| v.get(name.as_str()))
            })?;

        let mut current = Cow::Borrowed(start);
        for segment in rest {
            current = step(current, segment)?;
        }
        Some(current)
    }

    /// Resolve a dotted path such as `inputs.user.0.name`
    pub fn get_path(&self, path: &str) -> Option<Cow<'a, Value>> {
        let segments: Vec<PathSegment> = path
            .split('.')
            .map(|part| match part.parse::<usize>() {
                Ok(i) => PathSegment::Index(i),
                Err(_) => PathSegment::Field(part.to_string()),
            })
            .collect();
        if segments
            .iter()
            .any(|s| matches!(s, PathSegment::Field(f) if f.is_empty()))
        {
            return None;
        }
        self.lookup(&segments)
    }
}

fn step<'a>(current: Cow<'a, Value>, segment: &PathSegment) -> Option<Cow<'a, Value>> {
    match current {
        Cow::Borrowed(value) => match child(value, segment)? {
            Child::Ref(v) => Some(Cow::Borrowed(v)),
            Child::Computed(v) => Some(Cow::Owned(v)),
        },
        Cow::Owned(value) => match child(&value, segment)? {
            Child::Ref(v) => Some(Cow::Owned(v.clone())),
            Child::Computed(v) => Some(Cow::Owned(v)),
        },
    }
}

enum Child<'v> {
    Ref(&'v Value),
    Computed(Value),
}

fn child<'v>(value: &'v Value, segment: &PathSegment) -> Option<Child<'v>> {
    match segment {
        PathSegment::Field(name) => {
            if let Some(v) = value.get(name.as_str()) {
                return Some(Child::Ref(v));
            }
            if name == "length" {
                let len = match value {
                    Value::Array(a) => a.len(),
                    Value::String(s) => s.chars().count(),
                    Value::Object(o) => o.len(),
                    _ => return None,
                };
                return Some(Child::Computed(Value::from(len)));
            }
            None
        }
        PathSegment::Index(i) => match value {
            Value::Array(a) => a.get(*i).map(Child::Ref),
            Value::Object(o) => o.get(&i.to_string()).map(Child::Ref),
            _ => None,
        },
    }
}
