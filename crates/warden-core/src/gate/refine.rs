//! Refinement loop — bounded best-of-N candidate generation with
//! feedback-driven retries.
//!
//! One round = generate a candidate, gate it. While the gate says no and
//! rounds remain, the follow-up prompt carries the original request, the
//! complete ordered error list and the previous candidate verbatim, so a
//! single round can fix several independent defects. Each round costs an
//! external generation call. The best-scoring candidate seen is tracked
//! across all rounds and returned even when no round reached `ok`; callers
//! decide whether to accept an unvalidated best effort.

use crate::error::GeneratorError;
use crate::gate::{Gate, GateResult};
use tracing::{info, warn};

/// Default round bound. The loop terminates deterministically in round
/// count regardless of generator behavior.
pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// The external generator collaborator.
pub trait Generator {
    /// Produce one candidate module source for a prompt.
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Best candidate found by a refinement run.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub source: String,
    pub result: GateResult,
    pub rounds_used: u32,
}

/// Run the refinement loop.
///
/// A generator failure on the very first round is an error, since there is
/// nothing to fall back on. A failure on a later round stops the loop and
/// returns the best candidate seen so far.
pub fn refine(
    gate: &Gate,
    generator: &dyn Generator,
    request: &str,
    max_rounds: u32,
) -> Result<Refinement, GeneratorError> {
    let max_rounds = max_rounds.max(1);

    let mut source = generator.generate(request)?;
    let mut result = gate.check(&source);
    let mut rounds = 1u32;
    let mut best = Refinement {
        source: source.clone(),
        result: result.clone(),
        rounds_used: rounds,
    };

    while !result.ok && rounds < max_rounds {
        let prompt = feedback_prompt(request, &source, &result);
        let next = match generator.generate(&prompt) {
            Ok(next) => next,
            Err(e) => {
                warn!(round = rounds + 1, error = %e, "generator failed; keeping best candidate");
                break;
            }
        };
        rounds += 1;
        source = next;
        result = gate.check(&source);
        if is_better(&result, &best.result) {
            best = Refinement {
                source: source.clone(),
                result: result.clone(),
                rounds_used: rounds,
            };
        }
    }

    best.rounds_used = rounds;
    info!(
        rounds,
        ok = best.result.ok,
        score = best.result.score,
        "refinement finished"
    );
    Ok(best)
}

fn is_better(candidate: &GateResult, incumbent: &GateResult) -> bool {
    (candidate.ok, candidate.score) > (incumbent.ok, incumbent.score)
}

/// Build the follow-up request for a failed candidate: original request,
/// the full ordered error list, and the previous source verbatim.
pub fn feedback_prompt(request: &str, previous_source: &str, result: &GateResult) -> String {
    let mut prompt = String::from(
        "The previous module failed the quality gate. Fix ALL errors below and \
         return the FULL corrected module.\n\
         Return ONLY a complete Rhai module. No markdown.\n\n\
         === Original request ===\n",
    );
    prompt.push_str(request);
    prompt.push_str("\n\n=== Quality gate errors ===\n");
    for error in &result.errors {
        prompt.push_str("- ");
        prompt.push_str(error);
        prompt.push('\n');
    }
    prompt.push_str("\n=== Previous module ===\n");
    prompt.push_str(previous_source);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Arc;
    use warden_runtime::NullProvider;

    const BROKEN: &str = "fn run( {";
    const NO_ENTRY: &str = r#"const PROGRAM = #{ name: "x", params: [] };"#;
    const VALID: &str = r#"
        const PROGRAM = #{ name: "x", params: [] };
        fn run(params) { "done" }
    "#;

    /// Replays a fixed script of responses and records received prompts.
    struct ScriptedGenerator {
        responses: RefCell<Vec<Result<String, GeneratorError>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<String, GeneratorError>>) -> Self {
            Self {
                responses: RefCell::new(responses),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                Err(GeneratorError::Empty)
            } else {
                responses.remove(0)
            }
        }
    }

    fn gate() -> Gate {
        Gate::with_default_policy(Arc::new(NullProvider))
    }

    #[test]
    fn first_valid_candidate_ends_the_loop() {
        let generator = ScriptedGenerator::new(vec![Ok(VALID.to_string())]);
        let refinement = refine(&gate(), &generator, "make a thing", 3).unwrap();
        assert!(refinement.result.ok);
        assert_eq!(refinement.rounds_used, 1);
        assert_eq!(generator.prompts.borrow().len(), 1);
    }

    #[test]
    fn feedback_carries_all_errors_and_the_previous_source() {
        let generator =
            ScriptedGenerator::new(vec![Ok(NO_ENTRY.to_string()), Ok(VALID.to_string())]);
        let refinement = refine(&gate(), &generator, "make a thing", 3).unwrap();
        assert!(refinement.result.ok);
        assert_eq!(refinement.rounds_used, 2);

        let prompts = generator.prompts.borrow();
        assert_eq!(prompts[0], "make a thing");
        assert!(prompts[1].contains("fn run(params) missing"));
        assert!(prompts[1].contains(NO_ENTRY), "previous source verbatim");
        assert!(prompts[1].contains("make a thing"), "original request kept");
    }

    #[test]
    fn loop_is_bounded_and_keeps_the_best_candidate() {
        let generator = ScriptedGenerator::new(vec![
            Ok(BROKEN.to_string()),
            Ok(NO_ENTRY.to_string()),
            Ok(BROKEN.to_string()),
        ]);
        let refinement = refine(&gate(), &generator, "r", 3).unwrap();
        assert_eq!(refinement.rounds_used, 3);
        assert!(!refinement.result.ok);
        // The structurally richer round-2 candidate outscores both parse
        // failures and must be the one returned.
        assert_eq!(refinement.source, NO_ENTRY);
    }

    #[test]
    fn generator_failure_on_round_one_is_an_error() {
        let generator = ScriptedGenerator::new(vec![Err(GeneratorError::Backend("down".into()))]);
        assert!(refine(&gate(), &generator, "r", 3).is_err());
    }

    #[test]
    fn generator_failure_later_returns_best_so_far() {
        let generator = ScriptedGenerator::new(vec![
            Ok(NO_ENTRY.to_string()),
            Err(GeneratorError::Backend("down".into())),
        ]);
        let refinement = refine(&gate(), &generator, "r", 4).unwrap();
        assert_eq!(refinement.source, NO_ENTRY);
        assert!(!refinement.result.ok);
    }
}
