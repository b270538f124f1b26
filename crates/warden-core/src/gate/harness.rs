//! Mocked execution harness — run declared tests with capability calls
//! intercepted per test.
//!
//! Each test gets a fresh engine over a fresh provider: the test's mocks
//! layered on the harness base. Both are dropped when the test ends, so
//! there is nothing to restore and no way for one test's mocks to leak
//! into the next, exception or not. Capability
//! calls a test does not mock fall through to the base provider, so tests
//! exercising only local computation need no mocks at all.

use crate::loader::LoadedPlugin;
use crate::types::{OutputKind, PluginOutput, ProgramMetadata, TestCase, TestOutcome};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;
use warden_runtime::{harness_engine, CapabilityProvider, MockOverrides, MockedProvider};

/// Longest output preview attached to a test outcome.
const PREVIEW_LEN: usize = 200;

/// Runs declared tests against a base provider.
pub struct Harness {
    base: Arc<dyn CapabilityProvider>,
}

impl Harness {
    /// Create a harness whose unmocked capability calls hit `base`.
    pub fn new(base: Arc<dyn CapabilityProvider>) -> Self {
        Self { base }
    }

    /// Run every declared test. A failing test is never fatal to the
    /// harness itself; each failure is surfaced as a non-ok outcome.
    pub fn run_tests(
        &self,
        plugin: &LoadedPlugin,
        metadata: &ProgramMetadata,
        tests: &[TestCase],
    ) -> Vec<TestOutcome> {
        tests
            .iter()
            .enumerate()
            .map(|(index, test)| {
                let outcome = self.run_one(plugin, metadata, test, index);
                debug!(test = %outcome.name, ok = outcome.ok, "harness test finished");
                outcome
            })
            .collect()
    }

    fn run_one(
        &self,
        plugin: &LoadedPlugin,
        metadata: &ProgramMetadata,
        test: &TestCase,
        index: usize,
    ) -> TestOutcome {
        let name = test.label(index);

        let provider: Arc<dyn CapabilityProvider> = if test.mocks.is_empty() {
            self.base.clone()
        } else {
            Arc::new(MockedProvider::new(
                MockOverrides::from_map(&test.mocks),
                self.base.clone(),
            ))
        };
        let engine = harness_engine(provider);

        let value = match plugin.invoke(&engine, &test.params) {
            Ok(value) => value,
            Err(e) => return TestOutcome::failed(name, e.to_string(), None),
        };

        let output = PluginOutput::classify(&value, metadata.kind);
        let rendered = output.render();
        let preview = Some(preview(&rendered));

        if let Some(expected_kind) = test.expect.kind {
            let matches = match expected_kind {
                OutputKind::String => matches!(output, PluginOutput::Text(_)),
                OutputKind::PathContentMap => matches!(output, PluginOutput::Files(_)),
            };
            if !matches {
                let got = match output {
                    PluginOutput::Text(_) => "a plain string",
                    PluginOutput::Files(_) => "a path-content map",
                };
                return TestOutcome::failed(
                    name,
                    format!("expected result shape {expected_kind:?}, got {got}"),
                    preview,
                );
            }
        }

        for needle in &test.expect.contains {
            if !rendered.contains(needle) {
                return TestOutcome::failed(
                    name,
                    format!("output missing expected substring {needle:?}"),
                    preview,
                );
            }
        }

        if let Some(pattern) = &test.expect.regex {
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(&rendered) {
                        return TestOutcome::failed(
                            name,
                            format!("output does not match /{pattern}/"),
                            preview,
                        );
                    }
                }
                Err(e) => {
                    return TestOutcome::failed(name, format!("invalid expectation regex: {e}"), preview)
                }
            }
        }

        TestOutcome::passed(name, preview)
    }
}

fn preview(rendered: &str) -> String {
    if rendered.chars().count() <= PREVIEW_LEN {
        return rendered.to_string();
    }
    let truncated: String = rendered.chars().take(PREVIEW_LEN).collect();
    format!("{truncated}…")
}
