//! Operator configuration

use std::collections::BTreeMap;
use std::time::Duration;

/// Default re-check interval for healthy CSVs and catalog resyncs
pub const DEFAULT_WAKEUP_INTERVAL: Duration = Duration::from_secs(30);

/// Runtime configuration for the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Re-check interval for healthy CSVs
    pub wakeup_interval: Duration,

    /// Namespaces to watch; empty watches the whole cluster
    pub watched_namespaces: Vec<String>,

    /// Annotations applied to managed namespaces
    pub annotations: BTreeMap<String, String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            wakeup_interval: DEFAULT_WAKEUP_INTERVAL,
            watched_namespaces: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }
}

impl OperatorConfig {
    /// Build a config from CLI inputs
    ///
    /// A negative wakeup interval falls back to the default rather than
    /// failing startup.
    pub fn new(
        wakeup_interval_secs: i64,
        watched_namespaces: Vec<String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        let wakeup_interval = if wakeup_interval_secs < 0 {
            DEFAULT_WAKEUP_INTERVAL
        } else {
            Duration::from_secs(wakeup_interval_secs as u64)
        };
        Self {
            wakeup_interval,
            watched_namespaces,
            annotations,
        }
    }
}

/// Parse a `key=value` annotation flag
pub fn parse_annotation(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid annotation '{raw}', expected key=value")),
    }
}
