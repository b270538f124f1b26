//! Structural & policy validation of candidate plugin source.
//!
//! Checks run in a fixed order and accumulate: parse (fatal, nothing else
//! can be trusted after it), required declarations, canonical-import rule,
//! forbidden imports and calls, placeholder literals. Everything applicable
//! is evaluated even after the first failure so one regeneration round
//! receives the complete defect list, not one error at a time.

use crate::policy::CapabilityPolicy;
use crate::syntax::SourceIndex;
use crate::types::ProgramMetadata;
use serde_json::Value;
use std::collections::BTreeSet;

/// Structural facts about one source, feeding the scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceSignals {
    pub parsed: bool,
    pub has_metadata_decl: bool,
    pub has_entry_point: bool,
    pub entry_has_body: bool,
    pub uses_try_catch: bool,
    pub guarded_param_access: bool,
    pub raw_param_index: bool,
    pub references_provider: bool,
    pub canonical_import: bool,
    pub uses_secret_capability: bool,
    pub uses_network_capability: bool,
    pub forbidden_usage: bool,
    pub secret_param_key: bool,
}

/// Outcome of the static checks (no execution involved).
#[derive(Debug, Default)]
pub(crate) struct StaticReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub signals: SourceSignals,
    pub parse_failed: bool,
}

/// Run every static check against `source`.
pub(crate) fn validate_static(source: &str, policy: &CapabilityPolicy) -> StaticReport {
    let mut report = StaticReport::default();

    if source.len() > policy.max_source_bytes {
        report.errors.push(format!(
            "source exceeds {} bytes ({} given)",
            policy.max_source_bytes,
            source.len()
        ));
        report.parse_failed = true;
        return report;
    }

    // Parse first: an unparsable candidate yields a single fatal error and
    // every other check is skipped.
    if let Err(e) = rhai::Engine::new().compile(source) {
        report.errors.push(format!("syntax error: {e}"));
        report.parse_failed = true;
        return report;
    }

    let idx = SourceIndex::scan(source);
    let signals = &mut report.signals;
    signals.parsed = true;

    // Required declarations: exactly one metadata constant, exactly one
    // entry point.
    let metadata_decls = idx.declares_const(&policy.metadata_const);
    signals.has_metadata_decl = metadata_decls >= 1;
    match metadata_decls {
        0 => report
            .errors
            .push(format!("const {} missing", policy.metadata_const)),
        1 => {}
        n => report.errors.push(format!(
            "const {} declared {n} times; exactly one expected",
            policy.metadata_const
        )),
    }

    let entry_defs = idx.defines_fn(&policy.entry_point);
    signals.has_entry_point = entry_defs >= 1;
    signals.entry_has_body = idx.fn_has_body(&policy.entry_point);
    match entry_defs {
        0 => report
            .errors
            .push(format!("fn {}(params) missing", policy.entry_point)),
        1 => {}
        n => report.errors.push(format!(
            "fn {} defined {n} times; exactly one expected",
            policy.entry_point
        )),
    }

    // Import analysis. The policy is expressed against one canonical import
    // shape so qualified-name matching cannot be defeated by renaming.
    let canonical_form = format!(
        "`import \"{}\" as {};`",
        policy.provider_module, policy.provider_name
    );
    let imports = idx.imports();
    let mut provider_import_present = false;
    for imp in &imports {
        if imp.path == policy.provider_module {
            provider_import_present = true;
            if imp.depth != 0 {
                report.errors.push(format!(
                    "import of \"{}\" must appear at module top level",
                    policy.provider_module
                ));
            }
            match imp.alias.as_deref() {
                Some(alias) if alias == policy.provider_name => {
                    if imp.depth == 0 {
                        signals.canonical_import = true;
                    }
                }
                Some(alias) => report.errors.push(format!(
                    "non-canonical alias '{alias}' for the \"{}\" module; use {canonical_form}",
                    policy.provider_module
                )),
                None => report.errors.push(format!(
                    "import of \"{}\" must be aliased; use {canonical_form}",
                    policy.provider_module
                )),
            }
        } else {
            if policy.forbidden_imports.contains(&imp.path) {
                report
                    .errors
                    .push(format!("forbidden import: \"{}\"", imp.path));
                signals.forbidden_usage = true;
            }
            if imp.alias.as_deref() == Some(policy.provider_name.as_str()) {
                report.errors.push(format!(
                    "alias '{}' bound to non-canonical module \"{}\"",
                    policy.provider_name, imp.path
                ));
            }
        }
    }

    signals.references_provider = idx.references(&policy.provider_name);
    if signals.references_provider && !provider_import_present {
        report
            .errors
            .push(format!("missing import: {canonical_form}"));
    }

    // Forbidden calls, bare and qualified, matched by literal name.
    for forbidden in &policy.forbidden_calls {
        let hit = match forbidden.qualified() {
            Some((ns, name)) => idx.calls_qualified(ns, name),
            None => idx.calls_bare(&forbidden.call),
        };
        if hit {
            let mut message = format!("forbidden call: {}", forbidden.call);
            if let Some(hint) = &forbidden.hint {
                message.push_str(&format!(" ({hint})"));
            }
            report.errors.push(message);
            signals.forbidden_usage = true;
        }
    }

    // Placeholder secrets echoed verbatim from example text.
    let mut seen = BTreeSet::new();
    for literal in idx.string_literals() {
        if policy.is_placeholder_literal(literal)
            && seen.insert(literal.trim().to_ascii_lowercase())
        {
            report.errors.push(format!(
                "forbidden placeholder literal: \"{}\"",
                literal.trim()
            ));
        }
    }

    signals.uses_try_catch = idx.uses_try_catch();
    signals.guarded_param_access = idx.guarded_access("params");
    signals.raw_param_index = idx.raw_index_on("params");
    signals.uses_secret_capability = idx.calls_qualified(&policy.provider_name, "get_secret");
    signals.uses_network_capability = idx.calls_qualified(&policy.provider_name, "http_get_json")
        || idx.calls_qualified(&policy.provider_name, "http_post_json");

    if signals.raw_param_index && !signals.guarded_param_access {
        report.warnings.push(
            "entry point indexes params directly; prefer guarded access \
             (`\"key\" in params`) with explicit required checks"
                .to_string(),
        );
    }

    report
}

/// Apply metadata shape checks and the secret-key heuristic.
///
/// Returns the typed metadata when well-formed, every defect found, and
/// whether any parameter key matched the secret-name heuristic.
pub(crate) fn check_metadata(
    metadata_value: &Value,
    policy: &CapabilityPolicy,
) -> (Option<ProgramMetadata>, Vec<String>, bool) {
    let (metadata, mut errors) = ProgramMetadata::from_value(metadata_value);

    let mut secret_key = false;
    if let Some(items) = metadata_value.get("params").and_then(Value::as_array) {
        for item in items {
            let Some(key) = item.get("key").and_then(Value::as_str) else {
                continue;
            };
            if policy.is_secret_param_key(key) {
                errors.push(format!(
                    "params key '{key}' looks like a secret; use {}::get_secret() instead",
                    policy.provider_name
                ));
                secret_key = true;
            }
        }
    }

    (metadata, errors, secret_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> CapabilityPolicy {
        CapabilityPolicy::default()
    }

    #[test]
    fn unparsable_source_short_circuits_with_one_error() {
        let report = validate_static("fn run( {", &policy());
        assert!(report.parse_failed);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("syntax error:"));
    }

    #[test]
    fn missing_declarations_are_both_reported() {
        let report = validate_static("let x = 1;", &policy());
        assert!(report.errors.iter().any(|e| e.contains("const PROGRAM")));
        assert!(report.errors.iter().any(|e| e.contains("fn run")));
    }

    #[test]
    fn reference_without_import_is_exactly_one_violation() {
        let source = r#"
            const PROGRAM = #{ name: "x", params: [] };
            fn run(params) {
                let a = runtime::get_secret("A");
                let b = runtime::http_get_json("https://x");
                a + b
            }
        "#;
        let report = validate_static(source, &policy());
        let missing: Vec<_> = report
            .errors
            .iter()
            .filter(|e| e.starts_with("missing import:"))
            .collect();
        assert_eq!(missing.len(), 1, "errors: {:?}", report.errors);
    }

    #[test]
    fn aliased_import_is_a_disallowed_style() {
        let source = r#"
            import "runtime" as rt;
            const PROGRAM = #{ name: "x", params: [] };
            fn run(params) { rt::get_secret("A") }
        "#;
        let report = validate_static(source, &policy());
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("non-canonical alias 'rt'")));
        assert!(
            !report.errors.iter().any(|e| e.starts_with("missing import:")),
            "style violation must not double-report as missing import"
        );
    }

    #[test]
    fn forbidden_calls_carry_their_hints() {
        let source = r#"
            import "runtime" as runtime;
            const PROGRAM = #{ name: "x", params: [] };
            fn run(params) {
                open("file.txt");
                runtime::fetch("https://x")
            }
        "#;
        let report = validate_static(source, &policy());
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("forbidden call: open") && e.contains("read_text")));
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("forbidden call: runtime::fetch") && e.contains("retired")));
        assert!(report.signals.forbidden_usage);
    }

    #[test]
    fn forbidden_imports_are_flagged() {
        let source = r#"
            import "fs" as fs;
            const PROGRAM = #{ name: "x", params: [] };
            fn run(params) { fs::read("x") }
        "#;
        let report = validate_static(source, &policy());
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("forbidden import: \"fs\"")));
    }

    #[test]
    fn placeholder_literals_are_rejected_once_each() {
        let source = r#"
            const PROGRAM = #{ name: "x", params: [] };
            fn run(params) {
                let a = "your_api_key";
                let b = "YOUR_API_KEY";
                a + b
            }
        "#;
        let report = validate_static(source, &policy());
        let hits: Vec<_> = report
            .errors
            .iter()
            .filter(|e| e.contains("placeholder literal"))
            .collect();
        assert_eq!(hits.len(), 1, "case-folded duplicates collapse");
    }

    #[test]
    fn clean_local_module_passes_static_checks() {
        let source = r#"
            const PROGRAM = #{
                name: "Doubler",
                params: [ #{ key: "n", type: "int", required: true } ],
            };
            fn run(params) {
                if "n" in params { (params.n * 2).to_string() } else { "0" }
            }
        "#;
        let report = validate_static(source, &policy());
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert!(report.signals.has_entry_point);
        assert!(report.signals.entry_has_body);
        assert!(report.signals.guarded_param_access);
        assert!(!report.signals.references_provider);
    }

    #[test]
    fn secret_shaped_param_keys_are_policy_violations() {
        let value = json!({
            "name": "x",
            "params": [
                {"key": "API_KEY", "type": "str", "required": true},
                {"key": "city", "type": "str", "required": true},
            ],
        });
        let (metadata, errors, secret) = check_metadata(&value, &policy());
        assert!(secret);
        assert!(metadata.is_some(), "shape itself is fine");
        assert!(errors.iter().any(|e| e.contains("API_KEY")));
    }

    #[test]
    fn validation_is_deterministic() {
        let source = r#"
            fn run(params) { open("x") }
        "#;
        let a = validate_static(source, &policy());
        let b = validate_static(source, &policy());
        assert_eq!(a.errors, b.errors);
        assert_eq!(a.warnings, b.warnings);
    }
}
