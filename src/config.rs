// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Values come from built-in defaults, then `STEPFLOW_*` environment variables
//! (a `.env` file is loaded by the binary), then command-line flags.

use crate::error::StepflowError;
use std::env;
use std::time::Duration;

pub const ENV_MAX_VISITS: &str = "STEPFLOW_MAX_VISITS";
pub const ENV_STEP_TIMEOUT_SECS: &str = "STEPFLOW_STEP_TIMEOUT_SECS";
pub const ENV_RUN_TIMEOUT_SECS: &str = "STEPFLOW_RUN_TIMEOUT_SECS";

pub const DEFAULT_MAX_VISITS: u32 = 10;
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Limits applied to every run executed by an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How many times a single step may execute within one run
    pub max_visits_per_step: u32,
    /// Timeout for each HTTP call
    pub step_timeout: Duration,
    /// Deadline for the whole run
    pub run_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_visits_per_step: DEFAULT_MAX_VISITS,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by whichever `STEPFLOW_*` variables are set
    pub fn from_env() -> Result<Self, StepflowError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, StepflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_VISITS) {
            config.max_visits_per_step = parse_positive(ENV_MAX_VISITS, &raw)? as u32;
        }
        if let Some(raw) = lookup(ENV_STEP_TIMEOUT_SECS) {
            config.step_timeout = Duration::from_secs(parse_positive(ENV_STEP_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_RUN_TIMEOUT_SECS) {
            config.run_timeout = Duration::from_secs(parse_positive(ENV_RUN_TIMEOUT_SECS, &raw)?);
        }

        Ok(config)
    }

    pub fn with_max_visits(mut self, max_visits: u32) -> Self {
        self.max_visits_per_step = max_visits;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, StepflowError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(StepflowError::config(format!("{} must be greater than zero", key))),
        Ok(n) if key == ENV_MAX_VISITS && n > u32::MAX as u64 => Err(StepflowError::config(
            format!("{} is too large: {}", key, n),
        )),
        Ok(n) => Ok(n),
        Err(_) => Err(StepflowError::config(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_visits_per_step, 10);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (ENV_MAX_VISITS, "3"),
            (ENV_STEP_TIMEOUT_SECS, "5"),
            (ENV_RUN_TIMEOUT_SECS, " 60 "),
        ]))
        .unwrap();

        assert_eq!(config.max_visits_per_step, 3);
        assert_eq!(config.step_timeout, Duration::from_secs(5));
        assert_eq!(config.run_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_env_value() {
        let err = EngineConfig::from_lookup(lookup_from(&[(ENV_MAX_VISITS, "many")])).unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_VISITS));

        let err = EngineConfig::from_lookup(lookup_from(&[(ENV_RUN_TIMEOUT_SECS, "0")])).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::default()
            .with_max_visits(2)
            .with_step_timeout(Duration::from_millis(250));
        assert_eq!(config.max_visits_per_step, 2);
        assert_eq!(config.step_timeout, Duration::from_millis(250));
        assert_eq!(config.run_timeout, DEFAULT_RUN_TIMEOUT);
    }
}
