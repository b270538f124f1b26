//! Capability provider - the sole sanctioned channel for I/O, secrets and
//! network access available to plugin code.
//!
//! Plugin scripts never reach the filesystem or the network directly; the
//! policy gate rejects any attempt to. Everything flows through an injected
//! [`CapabilityProvider`], which the harness swaps per test run.

use crate::error::{CapabilityError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

lazy_static! {
    static ref SECRET_NAME: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();
}

/// Validate a secret name before lookup. Keeps path-shaped names out of the
/// secret namespace regardless of the backing provider.
pub fn check_secret_name(name: &str) -> Result<()> {
    if name.is_empty() || !SECRET_NAME.is_match(name) {
        return Err(CapabilityError::InvalidSecretName(name.to_string()));
    }
    Ok(())
}

/// The capability surface visible to plugin scripts as the `runtime` module.
///
/// Implementations must be cheap to share (`Arc`) and safe to call from any
/// thread. Every method corresponds to exactly one script-callable function.
pub trait CapabilityProvider: Send + Sync {
    /// Look up a named secret.
    fn get_secret(&self, name: &str) -> Result<String>;

    /// Read namespaced text previously stored under `key`.
    fn read_text(&self, key: &str) -> Result<String>;

    /// Store namespaced text under `key`.
    fn write_text(&self, key: &str, content: &str) -> Result<()>;

    /// Read structured data stored under `key`.
    fn read_json(&self, key: &str) -> Result<Value> {
        serde_json::from_str(&self.read_text(key)?)
            .map_err(|e| CapabilityError::Payload(e.to_string()))
    }

    /// Store structured data under `key`.
    fn write_json(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| CapabilityError::Payload(e.to_string()))?;
        self.write_text(key, &text)
    }

    /// Outbound GET returning parsed structured data.
    fn http_get_json(&self, url: &str, query: &Value) -> Result<Value>;

    /// Outbound POST returning parsed structured data.
    fn http_post_json(&self, url: &str, body: &Value) -> Result<Value>;

    /// Invoke another registered plugin by name.
    fn call_plugin(&self, name: &str, params: &Value) -> Result<Value>;
}

/// Provider that refuses every capability.
///
/// The default base provider at gate time: a test that exercises a secret or
/// network path without declaring a mock fails loudly with an
/// unresolved-capability error instead of silently observing stale state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl CapabilityProvider for NullProvider {
    fn get_secret(&self, name: &str) -> Result<String> {
        check_secret_name(name)?;
        Err(CapabilityError::Unavailable("get_secret".into()))
    }

    fn read_text(&self, _key: &str) -> Result<String> {
        Err(CapabilityError::Unavailable("read_text".into()))
    }

    fn write_text(&self, _key: &str, _content: &str) -> Result<()> {
        Err(CapabilityError::Unavailable("write_text".into()))
    }

    fn http_get_json(&self, _url: &str, _query: &Value) -> Result<Value> {
        Err(CapabilityError::Unavailable("http_get_json".into()))
    }

    fn http_post_json(&self, _url: &str, _body: &Value) -> Result<Value> {
        Err(CapabilityError::Unavailable("http_post_json".into()))
    }

    fn call_plugin(&self, _name: &str, _params: &Value) -> Result<Value> {
        Err(CapabilityError::Unavailable("call_plugin".into()))
    }
}

/// In-memory provider: a secret table plus a namespaced text store.
///
/// Backs embedded deployments and test fixtures. Network capabilities are
/// not served here; real outbound calls belong to an external provider
/// implementation behind the same trait.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    secrets: BTreeMap<String, String>,
    store: Mutex<BTreeMap<String, String>>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret at construction time.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    /// Seed the text store at construction time.
    pub fn with_text(self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.store
            .lock()
            .expect("store lock poisoned")
            .insert(key.into(), content.into());
        self
    }
}

impl CapabilityProvider for MemoryProvider {
    fn get_secret(&self, name: &str) -> Result<String> {
        check_secret_name(name)?;
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::SecretNotFound(name.to_string()))
    }

    fn read_text(&self, key: &str) -> Result<String> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| CapabilityError::KeyNotFound(key.to_string()))
    }

    fn write_text(&self, key: &str, content: &str) -> Result<()> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    fn http_get_json(&self, _url: &str, _query: &Value) -> Result<Value> {
        Err(CapabilityError::Unavailable("http_get_json".into()))
    }

    fn http_post_json(&self, _url: &str, _body: &Value) -> Result<Value> {
        Err(CapabilityError::Unavailable("http_post_json".into()))
    }

    fn call_plugin(&self, _name: &str, _params: &Value) -> Result<Value> {
        Err(CapabilityError::Unavailable("call_plugin".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_provider_round_trips_text() {
        let provider = MemoryProvider::new();
        provider.write_text("notes/a", "hello").unwrap();
        assert_eq!(provider.read_text("notes/a").unwrap(), "hello");
    }

    #[test]
    fn memory_provider_serves_seeded_secrets() {
        let provider = MemoryProvider::new().with_secret("MY_API_KEY", "s3cr3t");
        assert_eq!(provider.get_secret("MY_API_KEY").unwrap(), "s3cr3t");
        assert_eq!(
            provider.get_secret("OTHER"),
            Err(CapabilityError::SecretNotFound("OTHER".into()))
        );
    }

    #[test]
    fn secret_names_are_validated() {
        let provider = MemoryProvider::new().with_secret("K", "v");
        assert!(matches!(
            provider.get_secret("../escape"),
            Err(CapabilityError::InvalidSecretName(_))
        ));
        assert!(matches!(
            provider.get_secret(""),
            Err(CapabilityError::InvalidSecretName(_))
        ));
    }

    #[test]
    fn json_round_trip_uses_text_store() {
        let provider = MemoryProvider::new();
        let value = serde_json::json!({"a": 1, "b": ["x", "y"]});
        provider.write_json("data", &value).unwrap();
        assert_eq!(provider.read_json("data").unwrap(), value);
    }

    #[test]
    fn null_provider_refuses_everything() {
        let provider = NullProvider;
        assert!(matches!(
            provider.get_secret("K"),
            Err(CapabilityError::Unavailable(_))
        ));
        assert!(matches!(
            provider.http_get_json("https://example.com", &Value::Null),
            Err(CapabilityError::Unavailable(_))
        ));
    }
}
