//! End-to-end tests for the gate → harness → scorer → registry pipeline.
//!
//! These exercise the REAL engine and a real tempdir-backed registry, with
//! no shortcuts around the public surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use warden_core::gate::{refine, Category, Gate, Generator, ERROR_SCORE_CEILING};
use warden_core::loader::ModuleLoader;
use warden_core::registry::PluginRegistry;
use warden_core::types::PluginOutput;
use warden_core::{GeneratorError, RegistryError};
use warden_runtime::{harness_engine, NullProvider};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn gate() -> Gate {
    Gate::with_default_policy(Arc::new(NullProvider))
}

fn temp_registry() -> (TempDir, PluginRegistry) {
    let dir = tempfile::Builder::new()
        .prefix("warden_e2e_")
        .tempdir()
        .expect("should create tempdir");
    let registry = PluginRegistry::open(dir.path(), Arc::new(NullProvider)).unwrap();
    (dir, registry)
}

fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

const DOUBLER: &str = r#"
    const PROGRAM = #{
        name: "Doubler",
        version: "1.0",
        description: "Doubles an integer.",
        params: [
            #{ key: "n", type: "int", required: true, placeholder: "5" },
        ],
    };

    const TESTS = [
        #{ name: "doubles five", params: #{ n: 5 }, expect: #{ contains: ["10"] } },
    ];

    fn run(params) { (params.n * 2).to_string() }
"#;

// ---------------------------------------------------------------------------
// Property: empty params never trip schema policy and earn full credit
// ---------------------------------------------------------------------------
#[test]
fn empty_params_module_gates_clean_with_full_schema_credit() {
    let source = r#"
        const PROGRAM = #{
            name: "Constant",
            version: "1.0",
            description: "Returns a constant.",
            params: [],
        };
        fn run(params) { "42" }
    "#;
    let result = gate().check(source);
    assert!(result.ok, "{}", result.render());
    let schema = &result.breakdown[0];
    assert_eq!(schema.category, Category::SchemaQuality);
    assert_eq!(schema.score, schema.max);
}

// ---------------------------------------------------------------------------
// Property: a module without the entry point is rejected before the harness
// ---------------------------------------------------------------------------
#[test]
fn missing_entry_point_blocks_without_harness_run() {
    let source = r#"
        const PROGRAM = #{ name: "NoEntry", params: [] };
        const TESTS = [ #{ name: "would run" } ];
    "#;
    let result = gate().check(source);
    assert!(!result.ok);
    assert!(result.errors.iter().any(|e| e.contains("fn run")));
    assert!(result.test_results.is_empty());
}

// ---------------------------------------------------------------------------
// Property: provider use without the canonical import is one violation
// ---------------------------------------------------------------------------
#[test]
fn missing_canonical_import_is_exactly_one_violation() {
    let source = r#"
        const PROGRAM = #{ name: "Leaky", params: [] };
        fn run(params) {
            let a = runtime::get_secret("A");
            let b = runtime::http_get_json("https://x");
            let c = runtime::http_post_json("https://x", #{ a: 1 });
            a + b + c
        }
    "#;
    let result = gate().check(source);
    assert!(!result.ok);
    let missing: Vec<_> = result
        .errors
        .iter()
        .filter(|e| e.starts_with("missing import:"))
        .collect();
    assert_eq!(missing.len(), 1, "errors: {:?}", result.errors);
}

// ---------------------------------------------------------------------------
// Property: secret-shaped param keys always block and clamp the schema score
// ---------------------------------------------------------------------------
#[test]
fn api_key_param_blocks_and_clamps_schema_category() {
    let source = r#"
        const PROGRAM = #{
            name: "Sneaky",
            version: "1.0",
            description: "Asks the caller for a secret.",
            params: [
                #{ key: "Api_Key", type: "str", required: true, placeholder: "sk-..." },
            ],
        };
        fn run(params) { "x" }
    "#;
    let result = gate().check(source);
    assert!(!result.ok);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("Api_Key") && e.contains("secret")));
    let schema = &result.breakdown[0];
    assert!(schema.score <= 5, "schema clamped, got {}", schema.score);
    assert!(result.score <= ERROR_SCORE_CEILING);
}

// ---------------------------------------------------------------------------
// Property: gating has no hidden state
// ---------------------------------------------------------------------------
#[test]
fn repeated_gating_yields_identical_results() {
    let g = gate();
    let sources = [DOUBLER, "fn run( {", "let x = 1;"];
    for source in sources {
        let a = g.check(source);
        let b = g.check(source);
        assert_eq!(a.errors, b.errors);
        assert_eq!(a.warnings, b.warnings);
        assert_eq!(a.score, b.score);
    }
}

// ---------------------------------------------------------------------------
// Property: mocks are scoped to their test case
// ---------------------------------------------------------------------------
#[test]
fn second_test_never_observes_first_tests_secret_mock() {
    let source = r#"
        import "runtime" as runtime;
        const PROGRAM = #{ name: "SecretEcho", params: [] };
        const TESTS = [
            #{
                name: "mocked",
                mocks: #{ get_secret: #{ API: "A" } },
                expect: #{ contains: ["A"] },
            },
            #{ name: "unmocked" },
        ];
        fn run(params) { runtime::get_secret("API") }
    "#;
    let result = gate().check(source);
    let mocked = &result.test_results[0];
    let unmocked = &result.test_results[1];
    assert!(mocked.ok, "mocked test passes: {mocked:?}");
    assert!(!unmocked.ok, "unmocked test must fail, not reuse the mock");
    assert!(unmocked
        .error
        .as_deref()
        .unwrap()
        .contains("get_secret"));
    assert!(result.errors.iter().any(|e| e == "Test failed: unmocked"));
}

// ---------------------------------------------------------------------------
// Scenario: the doubler module passes end to end
// ---------------------------------------------------------------------------
#[test]
fn doubler_scenario_gates_ok_with_output_credit() {
    let result = gate().check(DOUBLER);
    assert!(result.ok, "{}", result.render());
    let output = &result.breakdown[2];
    assert_eq!(output.category, Category::OutputCorrectness);
    assert!(output.score > 0);
}

// ---------------------------------------------------------------------------
// Scenario: a wrong expectation fails the gate and caps the score
// ---------------------------------------------------------------------------
#[test]
fn wrong_expectation_fails_named_test_and_caps_score() {
    let source = DOUBLER.replace("[\"10\"]", "[\"99\"]");
    let result = gate().check(&source);
    assert!(!result.ok);
    assert!(result
        .errors
        .iter()
        .any(|e| e.starts_with("Test failed: doubles five")));
    assert!(result.score <= ERROR_SCORE_CEILING);
}

// ---------------------------------------------------------------------------
// Scenario: registry overwrite / delete lifecycle
// ---------------------------------------------------------------------------
#[test]
fn overwrite_then_get_source_then_delete_lifecycle() -> anyhow::Result<()> {
    let (_dir, registry) = temp_registry();
    let entry = registry.register(DOUBLER, None)?;

    let new_source = DOUBLER.replace("* 2", "* 4").replace("Doubler", "Quad");
    registry.overwrite(&entry.id, &new_source, None)?;
    assert_eq!(registry.get_source(&entry.id)?, new_source);

    registry.delete(&entry.id)?;
    assert!(matches!(
        registry.get_source(&entry.id),
        Err(RegistryError::UnknownId(_))
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Round-trip: registry invocation equals a direct entry-point call
// ---------------------------------------------------------------------------
#[test]
fn registered_invocation_matches_direct_entry_call() {
    let (_dir, registry) = temp_registry();
    let entry = registry.register(DOUBLER, None).unwrap();

    let inputs = [params(&[("n", json!(5))]), params(&[("n", json!(-3))])];
    for input in inputs {
        let via_registry = registry.invoke(&entry.id, &input).unwrap();

        let plugin = ModuleLoader::new(Arc::new(NullProvider))
            .load(DOUBLER)
            .unwrap();
        let engine = harness_engine(Arc::new(NullProvider));
        let direct = plugin.invoke(&engine, &input).unwrap();

        assert_eq!(via_registry, PluginOutput::Text(direct.as_str().unwrap().to_string()));
    }
}

// ---------------------------------------------------------------------------
// Full stack: refinement recovers from a broken first candidate, the best
// candidate registers and runs
// ---------------------------------------------------------------------------
struct TwoShotGenerator;

impl Generator for TwoShotGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        if prompt.contains("Quality gate errors") {
            Ok(DOUBLER.to_string())
        } else {
            Ok("const PROGRAM = 1".to_string())
        }
    }
}

#[test]
fn refine_then_register_then_invoke() {
    let g = gate();
    let refinement = refine(&g, &TwoShotGenerator, "double a number", 3).unwrap();
    assert!(refinement.result.ok, "{}", refinement.result.render());
    assert_eq!(refinement.rounds_used, 2);

    let (_dir, registry) = temp_registry();
    let entry = registry
        .register(&refinement.source, Some("double a number"))
        .unwrap();
    let out = registry.invoke(&entry.id, &params(&[("n", json!(21))])).unwrap();
    assert_eq!(out, PluginOutput::Text("42".to_string()));
}

// ---------------------------------------------------------------------------
// Operator override: a failing candidate can still be registered, with the
// full picture rendered for the decision
// ---------------------------------------------------------------------------
#[test]
fn failing_candidate_supports_operator_override_registration() {
    let source = DOUBLER.replace("[\"10\"]", "[\"99\"]");
    let result = gate().check(&source);
    assert!(!result.ok);

    let rendered = result.render();
    assert!(rendered.contains("[FAIL]"));
    assert!(rendered.contains("Test failed"));
    assert!(rendered.contains("score:"));

    // The registry does not consult the gate: the override path is open.
    let (_dir, registry) = temp_registry();
    let entry = registry.register(&source, None).unwrap();
    let out = registry.invoke(&entry.id, &params(&[("n", json!(2))])).unwrap();
    assert_eq!(out, PluginOutput::Text("4".to_string()));
}
