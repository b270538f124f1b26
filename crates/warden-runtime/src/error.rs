//! Error types for the capability provider surface.

use thiserror::Error;

/// Result type alias for capability operations
pub type Result<T> = std::result::Result<T, CapabilityError>;

/// Errors raised by capability providers.
///
/// These surface inside plugin scripts as runtime errors; the harness
/// converts them into failing test outcomes, they are never fatal to the
/// host process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Secret lookup failed
    #[error("secret not found: {0}")]
    SecretNotFound(String),

    /// Secret name failed hygiene validation
    #[error("invalid secret name '{0}' (allowed: A-Za-z0-9_.-)")]
    InvalidSecretName(String),

    /// No stored value under the requested key
    #[error("no entry under key '{0}'")]
    KeyNotFound(String),

    /// The provider does not serve this capability
    #[error("capability '{0}' is not available through this provider")]
    Unavailable(String),

    /// A plugin-to-plugin call failed
    #[error("plugin call failed: {0}")]
    PluginCall(String),

    /// Payload could not be parsed or converted
    #[error("malformed payload: {0}")]
    Payload(String),
}
