//! Error types for Warden Core
//!
//! Gate and harness findings are never errors: they accumulate as plain
//! strings inside a `GateResult` so a single refinement round receives the
//! complete picture. The types here cover the cases that legitimately
//! interrupt control flow: caller misuse and environment failure.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Main error type for Warden operations
#[derive(Error, Debug)]
pub enum WardenError {
    /// Registry errors (bad id, backing-file I/O)
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Module loading errors
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// External generator errors
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Capability provider errors
    #[error("capability error: {0}")]
    Capability(#[from] warden_runtime::CapabilityError),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the plugin registry.
///
/// The only category allowed to interrupt control flow: a bad id or a
/// broken store indicates caller misuse or environment failure, not a
/// plugin-quality finding.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown plugin id: {0}")]
    UnknownId(String),

    #[error("no plugin registered under name: {0}")]
    UnknownName(String),

    #[error("registry index at {path} is corrupt: {detail}")]
    CorruptIndex { path: PathBuf, detail: String },

    #[error("backing source for '{id}' is missing: {path}")]
    MissingSource { id: String, path: PathBuf },

    #[error("plugin '{id}' failed to load: {source}")]
    Load {
        id: String,
        #[source]
        source: LoadError,
    },

    #[error("invalid parameters for '{id}': {details:?}")]
    InvalidParams { id: String, details: Vec<String> },

    #[error("plugin '{id}' failed during invocation: {detail}")]
    Invoke { id: String, detail: String },

    #[error("IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from loading a plugin module into its capability interface.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("script does not parse: {0}")]
    Parse(String),

    #[error("module body failed to evaluate: {0}")]
    Eval(String),

    #[error("missing declaration: {0}")]
    MissingDeclaration(&'static str),

    #[error("metadata is not well-formed: {0:?}")]
    MetadataShape(Vec<String>),

    #[error("entry point failed: {0}")]
    Entry(String),
}

/// Errors from the external generator collaborator.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generator backend failed: {0}")]
    Backend(String),

    #[error("generator returned empty output")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_render_the_offending_id() {
        let err = RegistryError::UnknownId("plugin_123".into());
        assert!(err.to_string().contains("plugin_123"));
    }

    #[test]
    fn load_errors_nest_into_registry_errors() {
        let err = RegistryError::Load {
            id: "plugin_1".into(),
            source: LoadError::MissingDeclaration("const PROGRAM"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("plugin_1"));
        assert!(rendered.contains("const PROGRAM"));
    }

    #[test]
    fn umbrella_error_converts_from_parts() {
        let err: WardenError = RegistryError::UnknownId("x".into()).into();
        assert!(matches!(err, WardenError::Registry(_)));
        let err: WardenError = GeneratorError::Empty.into();
        assert!(matches!(err, WardenError::Generator(_)));
    }
}
