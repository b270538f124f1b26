//! Module loader — parse untrusted source into the fixed capability
//! interface: metadata plus one invokable entry point.
//!
//! Loading compiles the script once, evaluates its top-level constants
//! under the hardened engine (operation-limited, capability-sandboxed) and
//! snapshots `PROGRAM` / `TESTS` as structured data. Nothing here inspects
//! module attributes ad hoc at call time: a [`LoadedPlugin`] is the whole
//! surface callers get.

use crate::error::LoadError;
use crate::types::{ProgramMetadata, TestCase, ENTRY_POINT, METADATA_CONST, TESTS_CONST};
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use warden_runtime::bind::{dynamic_to_value, harness_engine, params_to_map};
use warden_runtime::CapabilityProvider;

/// Loads plugin sources against a fixed base provider.
#[derive(Clone)]
pub struct ModuleLoader {
    provider: Arc<dyn CapabilityProvider>,
}

impl ModuleLoader {
    /// Create a loader whose module-body evaluation sees `provider`.
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { provider }
    }

    /// The base provider this loader evaluates against.
    pub fn provider(&self) -> Arc<dyn CapabilityProvider> {
        self.provider.clone()
    }

    /// Compile and evaluate the module body, snapshotting its declarations.
    pub fn load(&self, source: &str) -> Result<LoadedPlugin, LoadError> {
        let engine = harness_engine(self.provider.clone());
        let ast = engine
            .compile(source)
            .map_err(|e| LoadError::Parse(e.to_string()))?;

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| LoadError::Eval(e.to_string()))?;

        let metadata_value = read_const(&scope, METADATA_CONST)?;
        let tests_value = read_const(&scope, TESTS_CONST)?;

        Ok(LoadedPlugin {
            source_hash: blake3::hash(source.as_bytes()).to_hex().to_string(),
            ast,
            metadata_value,
            tests_value,
        })
    }
}

fn read_const(scope: &Scope<'_>, name: &str) -> Result<Option<Value>, LoadError> {
    match scope.get_value::<Dynamic>(name) {
        Some(value) => dynamic_to_value(&value)
            .map(Some)
            .map_err(|e| LoadError::Eval(format!("{name} is not plain data: {e}"))),
        None => Ok(None),
    }
}

/// A loaded plugin: compiled AST plus snapshotted declarations.
#[derive(Debug)]
pub struct LoadedPlugin {
    source_hash: String,
    ast: AST,
    metadata_value: Option<Value>,
    tests_value: Option<Value>,
}

impl LoadedPlugin {
    /// Blake3 hex digest of the source this plugin was loaded from.
    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    /// Raw metadata value, if the module declared one.
    pub fn metadata_value(&self) -> Option<&Value> {
        self.metadata_value.as_ref()
    }

    /// Typed metadata. Fails when the declaration is missing or malformed.
    pub fn metadata(&self) -> Result<ProgramMetadata, LoadError> {
        let value = self
            .metadata_value
            .as_ref()
            .ok_or(LoadError::MissingDeclaration("const PROGRAM"))?;
        match ProgramMetadata::from_value(value) {
            (Some(metadata), _) => Ok(metadata),
            (None, errors) => Err(LoadError::MetadataShape(errors)),
        }
    }

    /// Declared test cases, plus a warning when the declaration is present
    /// but malformed. A broken optional signal must not block an otherwise
    /// valid module, but hiding the defect would starve refinement feedback.
    pub fn tests(&self) -> (Vec<TestCase>, Option<String>) {
        match &self.tests_value {
            None => (Vec::new(), None),
            Some(value) => match serde_json::from_value::<Vec<TestCase>>(value.clone()) {
                Ok(tests) => (tests, None),
                Err(e) => (
                    Vec::new(),
                    Some(format!("{TESTS_CONST} declaration ignored: {e}")),
                ),
            },
        }
    }

    /// Call the entry point with a parameter mapping under `engine`.
    ///
    /// The engine decides which provider the call sees; the harness passes a
    /// per-test mocked engine here, the registry its invocation engine.
    pub fn invoke(
        &self,
        engine: &Engine,
        params: &BTreeMap<String, Value>,
    ) -> Result<Value, LoadError> {
        let arg = params_to_map(params).map_err(|e| LoadError::Entry(e.to_string()))?;
        let mut scope = Scope::new();
        let result: Dynamic = engine
            .call_fn(&mut scope, &self.ast, ENTRY_POINT, (arg,))
            .map_err(|e| LoadError::Entry(e.to_string()))?;
        dynamic_to_value(&result)
            .map_err(|e| LoadError::Entry(format!("entry point produced non-data result: {e}")))
    }
}
