//! Scoring engine — reduce validator and harness signals to one comparable
//! number.
//!
//! Four weighted categories sum to 100. Scores are deterministic given
//! identical source and test declarations; there is no randomness and no
//! hidden state. A candidate with hard errors is capped below passing so a
//! structurally broken module can never outrank a merely unpolished valid
//! one.

use crate::gate::{Category, CategoryScore};
use crate::gate::validator::SourceSignals;
use crate::types::{ProgramMetadata, TestOutcome};

/// Ceiling applied to the total when blocking errors exist.
pub const ERROR_SCORE_CEILING: u8 = 59;

/// Ceiling applied to the schema category when a secret-shaped key exists.
const SECRET_KEY_SCHEMA_CEILING: u8 = 5;

/// Parameter count above which composability credit is withheld.
const PARAM_COUNT_BUDGET: usize = 5;

const SCHEMA_MAX: u8 = 30;
const STABILITY_MAX: u8 = 30;
const OUTPUT_MAX: u8 = 25;
const EXTENSIBILITY_MAX: u8 = 15;

/// Everything the scorer looks at.
pub(crate) struct ScoreInput<'a> {
    pub metadata: Option<&'a ProgramMetadata>,
    pub signals: &'a SourceSignals,
    pub tests_declared: usize,
    pub capability_test_mocked: bool,
    pub outcomes: &'a [TestOutcome],
    pub has_errors: bool,
}

/// Compute the total score and the per-category breakdown.
pub(crate) fn score(input: &ScoreInput<'_>) -> (u8, Vec<CategoryScore>) {
    if !input.signals.parsed {
        // Nothing vacuously true about a source that does not parse.
        let breakdown = [
            (Category::SchemaQuality, SCHEMA_MAX),
            (Category::Stability, STABILITY_MAX),
            (Category::OutputCorrectness, OUTPUT_MAX),
            (Category::Extensibility, EXTENSIBILITY_MAX),
        ]
        .into_iter()
        .map(|(category, max)| CategoryScore {
            category,
            score: 0,
            max,
            detail: "source does not parse".to_string(),
        })
        .collect();
        return (0, breakdown);
    }

    let breakdown = vec![
        schema_quality(input),
        stability(input),
        output_correctness(input),
        extensibility(input),
    ];

    let total: u32 = breakdown.iter().map(|c| u32::from(c.score)).sum();
    let mut total = total.min(100) as u8;
    if input.has_errors {
        total = total.min(ERROR_SCORE_CEILING);
    }
    (total, breakdown)
}

fn schema_quality(input: &ScoreInput<'_>) -> CategoryScore {
    let Some(metadata) = input.metadata else {
        return CategoryScore {
            category: Category::SchemaQuality,
            score: 0,
            max: SCHEMA_MAX,
            detail: "metadata missing or malformed".to_string(),
        };
    };

    let mut points = 10u8; // params list present and well-formed
    let mut notes = vec![format!("{} params", metadata.params.len())];

    if metadata.params.len() <= PARAM_COUNT_BUDGET {
        points += 5;
    } else {
        notes.push(format!(
            "more than {PARAM_COUNT_BUDGET} params hurts composability"
        ));
    }

    // A well-formed schema always carries key/type/required on every item.
    points += 5;

    let placeholders_complete = metadata
        .params
        .iter()
        .all(|p| p.placeholder.as_deref().is_some_and(|s| !s.is_empty()));
    if placeholders_complete {
        points += 5;
    } else {
        notes.push("placeholders incomplete".to_string());
    }

    if input.signals.secret_param_key {
        points = points.min(SECRET_KEY_SCHEMA_CEILING);
        notes.push("secret-shaped param key clamps this category".to_string());
    } else {
        points += 5;
    }

    CategoryScore {
        category: Category::SchemaQuality,
        score: points.min(SCHEMA_MAX),
        max: SCHEMA_MAX,
        detail: notes.join("; "),
    }
}

fn stability(input: &ScoreInput<'_>) -> CategoryScore {
    let signals = input.signals;
    let mut points = 0u8;
    let mut notes = Vec::new();

    if signals.has_entry_point {
        points += 10;
    } else {
        notes.push("entry point missing".to_string());
    }

    if signals.uses_try_catch {
        points += 10;
    } else {
        notes.push("no try/catch recovery".to_string());
    }

    if signals.guarded_param_access || !signals.raw_param_index {
        points += 10;
    } else {
        notes.push("unguarded param indexing".to_string());
    }

    if notes.is_empty() {
        notes.push("entry point, recovery and guarded access present".to_string());
    }

    CategoryScore {
        category: Category::Stability,
        score: points,
        max: STABILITY_MAX,
        detail: notes.join("; "),
    }
}

fn output_correctness(input: &ScoreInput<'_>) -> CategoryScore {
    let mut points = 0u8;
    let mut notes = Vec::new();

    if input.signals.entry_has_body {
        points += 5;
    } else {
        notes.push("no return path".to_string());
    }

    if input.tests_declared > 0 {
        points += 8;
    } else {
        notes.push("no declared tests".to_string());
    }

    if input.outcomes.is_empty() {
        notes.push("0/0 tests passing".to_string());
    } else {
        let passed = input.outcomes.iter().filter(|o| o.ok).count();
        let total = input.outcomes.len();
        // Linear partial credit on the pass ratio.
        points += ((passed * 12 * 2 + total) / (total * 2)) as u8;
        notes.push(format!("{passed}/{total} tests passing"));
    }

    CategoryScore {
        category: Category::OutputCorrectness,
        score: points.min(OUTPUT_MAX),
        max: OUTPUT_MAX,
        detail: notes.join("; "),
    }
}

fn extensibility(input: &ScoreInput<'_>) -> CategoryScore {
    let signals = input.signals;
    let mut points = 0u8;
    let mut notes = Vec::new();

    if signals.forbidden_usage {
        notes.push("forbidden imports or calls present".to_string());
    } else {
        points += 5;
    }

    if signals.references_provider && !signals.canonical_import {
        notes.push("canonical capability import missing".to_string());
    } else {
        points += 5;
    }

    let needs_capability_test = signals.uses_secret_capability || signals.uses_network_capability;
    if needs_capability_test && !input.capability_test_mocked {
        notes.push("secret/network path has no mocked test".to_string());
    } else {
        points += 5;
    }

    if notes.is_empty() {
        notes.push("capability usage is clean".to_string());
    }

    CategoryScore {
        category: Category::Extensibility,
        score: points,
        max: EXTENSIBILITY_MAX,
        detail: notes.join("; "),
    }
}
