//! Configuration processing utilities.
//!
//! Cell configuration is opaque to the kernel I/O layer: a JSON object
//! per cell, merged over kernel-wide defaults. [`SessionConfig`] holds
//! the few knobs a consumer sets when it builds a session.

use std::env;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messaging::streams::StdinMode;

/// Environment variable selecting the stdin mode (`interactive` | `echo`).
pub const STDIN_MODE_ENV: &str = "KERNEL_IO_STDIN_MODE";
/// Environment variable enabling output recording (`1`/`true`).
pub const RECORD_OUTPUT_ENV: &str = "KERNEL_IO_RECORD_OUTPUT";

/// Merge a cell configuration over defaults.
///
/// Keys present in `config` win; every other key comes from `defaults`.
/// Non-object values are treated as empty.
pub fn process_config(config: &Value, defaults: &Value) -> Value {
    let mut result: Map<String, Value> = defaults.as_object().cloned().unwrap_or_default();
    if let Some(overrides) = config.as_object() {
        for (key, value) in overrides {
            result.insert(key.clone(), value.clone());
        }
    }
    Value::Object(result)
}

/// Settings a consumer chooses when building a kernel session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How captured stdin answers reads.
    pub stdin_mode: StdinMode,
    /// Keep a local record of captured stdout/stderr.
    pub record_output: bool,
}

impl SessionConfig {
    /// Read the session config from the environment.
    ///
    /// Unset variables keep their defaults; unrecognized values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(STDIN_MODE_ENV) {
            match raw.trim().to_lowercase().as_str() {
                "interactive" => config.stdin_mode = StdinMode::Interactive,
                "echo" => config.stdin_mode = StdinMode::Echo,
                other => log::warn!(
                    "[SessionConfig] Ignoring {}={:?}; expected \"interactive\" or \"echo\"",
                    STDIN_MODE_ENV,
                    other
                ),
            }
        }

        if let Some(raw) = lookup(RECORD_OUTPUT_ENV) {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => config.record_output = true,
                "0" | "false" | "no" | "" => config.record_output = false,
                other => log::warn!(
                    "[SessionConfig] Ignoring {}={:?}; expected a boolean",
                    RECORD_OUTPUT_ENV,
                    other
                ),
            }
        }

        config
    }
}
