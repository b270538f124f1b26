//! Rhai binding — the script-visible `runtime` module and the hardened
//! engine plugin scripts run under.
//!
//! A fresh engine is built per execution with the provider injected at
//! construction time. Scripts reach the provider only through the canonical
//! import:
//!
//! ```rhai
//! import "runtime" as runtime;
//! let key = runtime::get_secret("MY_API_KEY");
//! ```

use crate::provider::CapabilityProvider;
use rhai::module_resolvers::StaticModuleResolver;
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, EvalAltResult, Map, Module};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Import path and canonical alias of the capability module.
pub const PROVIDER_MODULE: &str = "runtime";

/// Operation budget per script evaluation. Keeps runaway loops in untrusted
/// modules from hanging the gate.
pub const MAX_OPERATIONS: u64 = 1_000_000;

fn runtime_err(e: impl std::fmt::Display) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// Convert a script value into structured data.
pub fn dynamic_to_value(value: &Dynamic) -> Result<Value, Box<EvalAltResult>> {
    from_dynamic(value)
}

/// Convert structured data into a script value.
pub fn value_to_dynamic(value: &Value) -> Result<Dynamic, Box<EvalAltResult>> {
    to_dynamic(value)
}

/// Build a script parameter map from a structured parameter mapping.
pub fn params_to_map(params: &BTreeMap<String, Value>) -> Result<Map, Box<EvalAltResult>> {
    let mut map = Map::new();
    for (key, value) in params {
        map.insert(key.as_str().into(), to_dynamic(value)?);
    }
    Ok(map)
}

/// Build the `runtime` module over a provider.
///
/// Each script-callable function delegates to the corresponding trait
/// method; provider errors surface as script runtime errors.
pub fn capability_module(provider: Arc<dyn CapabilityProvider>) -> Module {
    let mut module = Module::new();

    let p = provider.clone();
    module.set_native_fn("get_secret", move |name: &str| {
        p.get_secret(name).map(Dynamic::from).map_err(runtime_err)
    });

    let p = provider.clone();
    module.set_native_fn("read_text", move |key: &str| {
        p.read_text(key).map(Dynamic::from).map_err(runtime_err)
    });

    let p = provider.clone();
    module.set_native_fn("write_text", move |key: &str, content: &str| {
        p.write_text(key, content).map_err(runtime_err)?;
        Ok(Dynamic::UNIT)
    });

    let p = provider.clone();
    module.set_native_fn("read_json", move |key: &str| {
        let value = p.read_json(key).map_err(runtime_err)?;
        to_dynamic(&value)
    });

    let p = provider.clone();
    module.set_native_fn("write_json", move |key: &str, value: Dynamic| {
        let value: Value = from_dynamic(&value)?;
        p.write_json(key, &value).map_err(runtime_err)?;
        Ok(Dynamic::UNIT)
    });

    let p = provider.clone();
    module.set_native_fn("http_get_json", move |url: &str| {
        let value = p.http_get_json(url, &Value::Null).map_err(runtime_err)?;
        to_dynamic(&value)
    });

    let p = provider.clone();
    module.set_native_fn("http_get_json", move |url: &str, query: Map| {
        let query: Value = from_dynamic(&Dynamic::from(query))?;
        let value = p.http_get_json(url, &query).map_err(runtime_err)?;
        to_dynamic(&value)
    });

    let p = provider.clone();
    module.set_native_fn("http_post_json", move |url: &str, body: Dynamic| {
        let body: Value = from_dynamic(&body)?;
        let value = p.http_post_json(url, &body).map_err(runtime_err)?;
        to_dynamic(&value)
    });

    let p = provider;
    module.set_native_fn("call_plugin", move |name: &str, params: Map| {
        let params: Value = from_dynamic(&Dynamic::from(params))?;
        let value = p.call_plugin(name, &params).map_err(runtime_err)?;
        to_dynamic(&value)
    });

    module
}

/// Build the hardened engine plugin scripts evaluate under.
///
/// The engine is sandboxed (no filesystem, no network, `eval` disabled),
/// operation-limited, and resolves exactly one module path: the capability
/// provider under [`PROVIDER_MODULE`].
pub fn harness_engine(provider: Arc<dyn CapabilityProvider>) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(100_000);
    engine.disable_symbol("eval");

    let mut resolver = StaticModuleResolver::new();
    resolver.insert(PROVIDER_MODULE, capability_module(provider));
    engine.set_module_resolver(resolver);

    engine
}
