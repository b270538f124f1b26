//! Capability policy — what generated plugins may and may not do.
//!
//! The policy is process-wide data, versionable but never mutated per
//! request. It names one canonical import shape for the capability module
//! so that forbidden-call detection by qualified-name matching cannot be
//! defeated by renaming, and it carries the denylists the validator matches
//! against: forbidden imports, forbidden calls, placeholder secrets, and
//! secret-shaped parameter keys.

use crate::types::{ENTRY_POINT, METADATA_CONST, TESTS_CONST};
use serde::{Deserialize, Serialize};

/// One forbidden call pattern, bare (`open`) or qualified (`runtime::fetch`),
/// with an optional remediation hint appended to the violation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenCall {
    pub call: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ForbiddenCall {
    fn new(call: &str, hint: Option<&str>) -> Self {
        Self {
            call: call.to_string(),
            hint: hint.map(str::to_string),
        }
    }

    /// Split into `(namespace, function)` for qualified patterns.
    pub fn qualified(&self) -> Option<(&str, &str)> {
        self.call.split_once("::")
    }
}

/// The capability policy the validator enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityPolicy {
    /// Canonical alias plugin scripts must bind the capability module to.
    pub provider_name: String,
    /// Import path of the capability module.
    pub provider_module: String,
    /// Name of the required metadata constant.
    pub metadata_const: String,
    /// Name of the required entry-point function.
    pub entry_point: String,
    /// Name of the optional declared-tests constant.
    pub tests_const: String,
    /// Module paths plugins must never import.
    pub forbidden_imports: Vec<String>,
    /// Calls plugins must never make, bare or qualified.
    pub forbidden_calls: Vec<ForbiddenCall>,
    /// Literal strings that mark an echoed placeholder secret.
    pub placeholder_literals: Vec<String>,
    /// Parameter keys that smell like secrets (case-insensitive).
    pub secret_param_keys: Vec<String>,
    /// Upper bound on candidate source size, in bytes.
    pub max_source_bytes: usize,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            provider_name: "runtime".to_string(),
            provider_module: "runtime".to_string(),
            metadata_const: METADATA_CONST.to_string(),
            entry_point: ENTRY_POINT.to_string(),
            tests_const: TESTS_CONST.to_string(),
            forbidden_imports: vec![
                "fs".to_string(),
                "http".to_string(),
                "net".to_string(),
                "os".to_string(),
                "process".to_string(),
            ],
            forbidden_calls: vec![
                ForbiddenCall::new("open", Some("use runtime::read_text/write_text")),
                ForbiddenCall::new("eval", Some("dynamic evaluation is not available to plugins")),
                ForbiddenCall::new(
                    "runtime::fetch",
                    Some("retired alias; use runtime::http_get_json"),
                ),
                ForbiddenCall::new("fetch", Some("use runtime::http_get_json")),
            ],
            placeholder_literals: vec![
                "your_api_key".to_string(),
                "api_key_here".to_string(),
                "replace_me".to_string(),
            ],
            secret_param_keys: vec![
                "api_key".to_string(),
                "apikey".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "key".to_string(),
                "access_token".to_string(),
                "auth".to_string(),
                "authorization".to_string(),
            ],
            max_source_bytes: 256 * 1024,
        }
    }
}

impl CapabilityPolicy {
    /// Load a policy from TOML text. Omitted fields keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Whether a parameter key matches the secret-name heuristic.
    pub fn is_secret_param_key(&self, key: &str) -> bool {
        self.secret_param_keys
            .iter()
            .any(|s| s.eq_ignore_ascii_case(key))
    }

    /// Whether a string literal is a known placeholder secret.
    pub fn is_placeholder_literal(&self, literal: &str) -> bool {
        self.placeholder_literals
            .iter()
            .any(|s| s.eq_ignore_ascii_case(literal.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_names_the_canonical_import() {
        let policy = CapabilityPolicy::default();
        assert_eq!(policy.provider_name, "runtime");
        assert_eq!(policy.provider_module, "runtime");
        assert_eq!(policy.entry_point, "run");
    }

    #[test]
    fn secret_key_heuristic_is_case_insensitive() {
        let policy = CapabilityPolicy::default();
        assert!(policy.is_secret_param_key("api_key"));
        assert!(policy.is_secret_param_key("API_KEY"));
        assert!(policy.is_secret_param_key("Token"));
        assert!(!policy.is_secret_param_key("city"));
        assert!(!policy.is_secret_param_key("keyword"));
    }

    #[test]
    fn placeholder_literals_match_trimmed_case_insensitive() {
        let policy = CapabilityPolicy::default();
        assert!(policy.is_placeholder_literal("YOUR_API_KEY"));
        assert!(policy.is_placeholder_literal(" api_key_here "));
        assert!(!policy.is_placeholder_literal("a real value"));
    }

    #[test]
    fn forbidden_calls_split_into_qualified_parts() {
        let policy = CapabilityPolicy::default();
        let fetch = policy
            .forbidden_calls
            .iter()
            .find(|c| c.call == "runtime::fetch")
            .unwrap();
        assert_eq!(fetch.qualified(), Some(("runtime", "fetch")));
        let open = policy
            .forbidden_calls
            .iter()
            .find(|c| c.call == "open")
            .unwrap();
        assert_eq!(open.qualified(), None);
    }

    #[test]
    fn toml_overrides_keep_unset_defaults() {
        let policy = CapabilityPolicy::from_toml(
            r#"
            forbidden_imports = ["fs", "exotic"]
            max_source_bytes = 1024
            "#,
        )
        .unwrap();
        assert_eq!(policy.forbidden_imports, vec!["fs", "exotic"]);
        assert_eq!(policy.max_source_bytes, 1024);
        assert_eq!(policy.provider_name, "runtime");
        assert!(!policy.secret_param_keys.is_empty());
    }
}
