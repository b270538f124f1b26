//! Per-test mock layering over a base provider.
//!
//! A test case declares canned return values for the capability functions it
//! exercises; everything it does not cover falls through to the base
//! provider. Because the layered provider is built fresh for each test and
//! dropped afterwards, there is no install/restore step and nothing can leak
//! between tests.

use crate::error::{CapabilityError, Result};
use crate::provider::{check_secret_name, CapabilityProvider};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Canned return values keyed by capability function name.
///
/// For `get_secret` and `read_text` an object value acts as a lookup table
/// (secret/key name → value, missing names fail); any other value is
/// returned verbatim for every call.
#[derive(Debug, Clone, Default)]
pub struct MockOverrides {
    by_fn: BTreeMap<String, Value>,
}

impl MockOverrides {
    /// Build overrides from a declared `mocks` map.
    pub fn from_map(map: &BTreeMap<String, Value>) -> Self {
        Self { by_fn: map.clone() }
    }

    /// True when no function is overridden.
    pub fn is_empty(&self) -> bool {
        self.by_fn.is_empty()
    }

    /// Whether `func` has a canned value.
    pub fn covers(&self, func: &str) -> bool {
        self.by_fn.contains_key(func)
    }

    fn get(&self, func: &str) -> Option<&Value> {
        self.by_fn.get(func)
    }
}

/// Provider that answers from [`MockOverrides`] and delegates the rest.
pub struct MockedProvider {
    overrides: MockOverrides,
    base: Arc<dyn CapabilityProvider>,
}

impl MockedProvider {
    /// Layer `overrides` over `base`.
    pub fn new(overrides: MockOverrides, base: Arc<dyn CapabilityProvider>) -> Self {
        Self { overrides, base }
    }

    fn stringish(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl CapabilityProvider for MockedProvider {
    fn get_secret(&self, name: &str) -> Result<String> {
        match self.overrides.get("get_secret") {
            Some(Value::Object(table)) => {
                check_secret_name(name)?;
                table
                    .get(name)
                    .map(Self::stringish)
                    .ok_or_else(|| CapabilityError::SecretNotFound(name.to_string()))
            }
            Some(value) => Ok(Self::stringish(value)),
            None => self.base.get_secret(name),
        }
    }

    fn read_text(&self, key: &str) -> Result<String> {
        match self.overrides.get("read_text") {
            Some(Value::Object(table)) => table
                .get(key)
                .map(Self::stringish)
                .ok_or_else(|| CapabilityError::KeyNotFound(key.to_string())),
            Some(value) => Ok(Self::stringish(value)),
            None => self.base.read_text(key),
        }
    }

    fn write_text(&self, key: &str, content: &str) -> Result<()> {
        // A canned write is a sink: recorded nowhere, always succeeds.
        if self.overrides.covers("write_text") {
            return Ok(());
        }
        self.base.write_text(key, content)
    }

    fn read_json(&self, key: &str) -> Result<Value> {
        match self.overrides.get("read_json") {
            Some(value) => Ok(value.clone()),
            None => self.base.read_json(key),
        }
    }

    fn write_json(&self, key: &str, value: &Value) -> Result<()> {
        if self.overrides.covers("write_json") {
            return Ok(());
        }
        self.base.write_json(key, value)
    }

    fn http_get_json(&self, url: &str, query: &Value) -> Result<Value> {
        match self.overrides.get("http_get_json") {
            Some(value) => Ok(value.clone()),
            None => self.base.http_get_json(url, query),
        }
    }

    fn http_post_json(&self, url: &str, body: &Value) -> Result<Value> {
        match self.overrides.get("http_post_json") {
            Some(value) => Ok(value.clone()),
            None => self.base.http_post_json(url, body),
        }
    }

    fn call_plugin(&self, name: &str, params: &Value) -> Result<Value> {
        match self.overrides.get("call_plugin") {
            Some(value) => Ok(value.clone()),
            None => self.base.call_plugin(name, params),
        }
    }
}
