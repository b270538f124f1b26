//! Gate — the combined validate → execute → score decision for one
//! candidate module.
//!
//! A candidate source enters the static validator first. Only a statically
//! clean module is loaded and has its declared tests run under the mocked
//! harness; the scorer then reduces everything to a single comparable
//! number. Findings accumulate as strings; the unit of failure handed to
//! generation feedback is always the full error list.

pub mod harness;
pub mod refine;
pub mod score;
pub mod validator;

use crate::loader::ModuleLoader;
use crate::policy::CapabilityPolicy;
use crate::types::{TestCase, TestOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use warden_runtime::CapabilityProvider;

pub use harness::Harness;
pub use refine::{refine, Generator, Refinement, DEFAULT_MAX_ROUNDS};
pub use score::ERROR_SCORE_CEILING;
pub use validator::SourceSignals;

/// Scoring category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SchemaQuality,
    Stability,
    OutputCorrectness,
    Extensibility,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SchemaQuality => "schema_quality",
            Self::Stability => "stability",
            Self::OutputCorrectness => "output_correctness",
            Self::Extensibility => "extensibility",
        };
        f.write_str(name)
    }
}

/// Score of one category, with its ceiling and a short explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    pub score: u8,
    pub max: u8,
    pub detail: String,
}

/// The gate's decision for one candidate.
///
/// Invariant: `ok == errors.is_empty()`. The score is informational even
/// when `ok` is false (it is capped below passing then), so score alone
/// must never be used to bypass `ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub test_results: Vec<TestOutcome>,
    pub score: u8,
    pub breakdown: Vec<CategoryScore>,
}

impl GateResult {
    /// Human-readable report: verdict, full error and warning lists, and
    /// the score breakdown. Operators deciding on an override registration
    /// need the whole picture, never a summary.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        lines.push(
            if self.ok {
                "[OK] quality gate passed."
            } else {
                "[FAIL] quality gate not passed."
            }
            .to_string(),
        );
        if !self.errors.is_empty() {
            lines.push("errors:".to_string());
            lines.extend(self.errors.iter().map(|e| format!(" - {e}")));
        }
        if !self.warnings.is_empty() {
            lines.push("warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!(" - {w}")));
        }
        lines.push(format!("score: {}/100", self.score));
        for category in &self.breakdown {
            lines.push(format!(
                " - {}: {}/{} ({})",
                category.category, category.score, category.max, category.detail
            ));
        }
        lines.join("\n")
    }
}

/// The policy gate: validator + harness + scorer over one provider.
pub struct Gate {
    policy: CapabilityPolicy,
    loader: ModuleLoader,
    harness: Harness,
}

impl Gate {
    /// Create a gate with an explicit policy.
    pub fn new(policy: CapabilityPolicy, provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            policy,
            loader: ModuleLoader::new(provider.clone()),
            harness: Harness::new(provider),
        }
    }

    /// Create a gate with the compiled-in default policy.
    pub fn with_default_policy(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self::new(CapabilityPolicy::default(), provider)
    }

    /// The policy this gate enforces.
    pub fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    /// Full pipeline: validate, run declared tests, score.
    pub fn check(&self, source: &str) -> GateResult {
        self.run(source, true)
    }

    /// Validation and metadata checks only, no test execution. The score
    /// is computed without harness outcomes.
    pub fn validate_only(&self, source: &str) -> GateResult {
        self.run(source, false)
    }

    fn run(&self, source: &str, execute_tests: bool) -> GateResult {
        debug!(bytes = source.len(), "gating candidate");

        let static_report = validator::validate_static(source, &self.policy);
        let mut errors = static_report.errors;
        let mut warnings = static_report.warnings;
        let mut signals = static_report.signals;

        let mut metadata = None;
        let mut tests: Vec<TestCase> = Vec::new();
        let mut outcomes: Vec<TestOutcome> = Vec::new();

        // The module body is evaluated only when every static check passed,
        // so hostile source never executes with known violations in it.
        if !static_report.parse_failed && errors.is_empty() {
            match self.loader.load(source) {
                Ok(plugin) => {
                    match plugin.metadata_value() {
                        Some(value) => {
                            let (typed, shape_errors, secret_key) =
                                validator::check_metadata(value, &self.policy);
                            metadata = typed;
                            errors.extend(shape_errors);
                            signals.secret_param_key = secret_key;
                        }
                        None => errors.push(format!(
                            "const {} missing after evaluation",
                            self.policy.metadata_const
                        )),
                    }

                    let (declared, test_warning) = plugin.tests();
                    if let Some(warning) = test_warning {
                        warnings.push(warning);
                    } else if declared.is_empty() {
                        warnings.push(format!(
                            "module declares no tests (const {}); scorer credit is forfeited",
                            self.policy.tests_const
                        ));
                    }
                    tests = declared;

                    if execute_tests && errors.is_empty() {
                        if let Some(metadata) = &metadata {
                            outcomes = self.harness.run_tests(&plugin, metadata, &tests);
                            for outcome in outcomes.iter().filter(|o| !o.ok) {
                                errors.push(format!("Test failed: {}", outcome.name));
                            }
                        }
                    }
                }
                Err(e) => errors.push(format!("module load failed: {e}")),
            }
        }

        let capability_test_mocked = tests.iter().any(|t| {
            t.mocks
                .keys()
                .any(|k| matches!(k.as_str(), "get_secret" | "http_get_json" | "http_post_json"))
        });

        let (total, breakdown) = score::score(&score::ScoreInput {
            metadata: metadata.as_ref(),
            signals: &signals,
            tests_declared: tests.len(),
            capability_test_mocked,
            outcomes: &outcomes,
            has_errors: !errors.is_empty(),
        });

        let result = GateResult {
            ok: errors.is_empty(),
            errors,
            warnings,
            test_results: outcomes,
            score: total,
            breakdown,
        };
        info!(
            ok = result.ok,
            score = result.score,
            errors = result.errors.len(),
            "gate decision"
        );
        result
    }
}
