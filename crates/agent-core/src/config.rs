// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The Config Store: a JSON key/value file, rewritten atomically on every
// write (temp file + rename, matching the pattern other agents in this
// workspace use for their own settings files).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use crate::error::Result;

/// Typed view over the recognized configuration keys. The store also
/// round-trips any keys it doesn't recognize, so a newer server and an
/// older agent can share one config file without data loss.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub api_port: u16,
    pub default_printer: Option<String>,
    pub max_retries: u32,
    /// Delay, in milliseconds, before a failed job is retried.
    pub retry_delay_ms: u64,
    pub max_queue_size: usize,
    pub server_base_url: Option<String>,
    pub api_key: Option<String>,
    pub sumatra_path: Option<String>,
    /// Poll the remote server on a growing interval when it has no pending
    /// jobs, instead of a strict fixed cadence. Off by default.
    #[serde(default)]
    pub poll_backoff_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_port: 3001,
            default_printer: None,
            max_retries: 3,
            retry_delay_ms: 5_000,
            max_queue_size: 100,
            server_base_url: None,
            api_key: None,
            sumatra_path: None,
            poll_backoff_enabled: false,
        }
    }
}

/// Atomically-persisted JSON key/value store backing [`AgentConfig`].
pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl ConfigStore {
    /// Load the store from `path`, or start empty if the file is absent or
    /// unreadable — a missing config file is not an error, it just means
    /// every `get` falls back to its default.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<Map<String, Value>>(&s).ok())
            .unwrap_or_default();
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Read `key`, falling back to `default` if absent or the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let values = self.values.lock().expect("config store mutex poisoned");
        values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    /// Write `key`, persisting the whole store atomically. Returns `false`
    /// (and logs) on I/O failure rather than propagating — a config write
    /// failure should never take the agent down.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> bool {
        let json = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "could not serialize config value");
                return false;
            }
        };
        let snapshot = {
            let mut values = self.values.lock().expect("config store mutex poisoned");
            values.insert(key.to_string(), json);
            values.clone()
        };
        match self.persist(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "failed to persist config store");
                false
            }
        }
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// A typed snapshot of the recognized keys, current as of this call.
    pub fn snapshot(&self) -> AgentConfig {
        let d = AgentConfig::default();
        AgentConfig {
            api_port: self.get("apiPort", d.api_port),
            default_printer: self.get("defaultPrinter", d.default_printer),
            max_retries: self.get("maxRetries", d.max_retries),
            retry_delay_ms: self.get("retryDelay", d.retry_delay_ms),
            max_queue_size: self.get("maxQueueSize", d.max_queue_size),
            server_base_url: self.get("serverBaseUrl", d.server_base_url),
            api_key: self.get("apiKey", d.api_key),
            sumatra_path: self.get("sumatraPath", d.sumatra_path),
            poll_backoff_enabled: self.get("pollBackoffEnabled", d.poll_backoff_enabled),
        }
    }

    /// Replace the default printer, the one value the spooler's
    /// `setDefaultPrinter` operation needs to persist directly.
    pub fn set_default_printer(&self, name: &str) -> bool {
        self.set("defaultPrinter", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        assert_eq!(store.get("apiPort", 3001u16), 3001);
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        assert!(store.set("maxRetries", 7u32));
        assert_eq!(store.get("maxRetries", 0u32), 7);
    }

    #[test]
    fn set_persists_atomically_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path);
        store.set("apiKey", "bearer abc123");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = ConfigStore::open(&path);
        assert_eq!(
            reloaded.get("apiKey", String::new()),
            "bearer abc123".to_string()
        );
    }

    #[test]
    fn unrecognized_keys_round_trip_through_snapshot_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path);
        store.set("someFutureKey", "value");
        store.set("maxRetries", 2u32);

        let reloaded = ConfigStore::open(&path);
        assert_eq!(
            reloaded.get("someFutureKey", String::new()),
            "value".to_string()
        );
        assert_eq!(reloaded.get("maxRetries", 0u32), 2);
    }
}
