//! Environment variable access.
//!
//! Startup code reads the environment through [`EnvSource`] so the same
//! resolution logic runs against the real process environment and against an
//! in-memory map in tests.

use std::collections::HashMap;

/// A source of environment variables.
pub trait EnvSource: Send + Sync {
    /// Returns the raw value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;

    /// Returns the value of `key` when it is set to a non-empty string.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|value| !value.trim().is_empty())
    }

    /// Reads an enable flag. `1` and `true` (any case) enable, every other
    /// value disables. Unset flags return `None`.
    fn flag(&self, key: &str) -> Option<bool> {
        self.var(key).map(|value| {
            let value = value.trim();
            value == "1" || value.eq_ignore_ascii_case("true")
        })
    }
}

/// The environment of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}
