//! Warden Core - Policy gate, execution harness and registry for
//! machine-generated plugin modules
//!
//! Warden accepts untrusted, machine-generated plugin scripts and decides,
//! without trusting the author, whether each one is safe and correct to
//! register and execute.
//!
//! # Architecture
//!
//! A candidate flows through four stages:
//!
//! 1. **Validator** (`gate::validator`): structural and policy checks over
//!    a token-level syntax predicate layer; nothing is executed
//! 2. **Harness** (`gate::harness`): declared tests run with capability
//!    calls intercepted by per-test mocks
//! 3. **Scorer** (`gate::score`): four weighted categories reduce the
//!    findings to one comparable 0–100 number
//! 4. **Registry** (`registry`): accepted modules are persisted, versioned
//!    and dispatchable by id or name
//!
//! The **refinement loop** (`gate::refine`) wraps the first three stages:
//! gate a candidate, feed the complete error list back to the external
//! generator, keep the best-scoring candidate seen within a bounded number
//! of rounds.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use warden_core::gate::Gate;
//! use warden_runtime::NullProvider;
//!
//! let gate = Gate::with_default_policy(Arc::new(NullProvider));
//! let result = gate.check(
//!     r#"
//!     const PROGRAM = #{
//!         name: "Greeter",
//!         version: "1.0",
//!         description: "Greets a person.",
//!         params: [ #{ key: "who", type: "str", required: true } ],
//!     };
//!     fn run(params) { `hello ${params.who}` }
//!     "#,
//! );
//! assert!(result.ok, "{}", result.render());
//! ```
//!
//! # Design Principles
//!
//! 1. **Findings accumulate, errors interrupt**: gate findings are plain
//!    strings handed back in full; only registry misuse raises
//! 2. **Isolation by construction**: each harness test gets a fresh engine
//!    and a fresh provider, so there is nothing to restore afterwards
//! 3. **Determinism**: identical source and declarations always produce
//!    identical errors, warnings and score

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod gate;
pub mod loader;
pub mod policy;
pub mod registry;
pub mod syntax;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{GeneratorError, LoadError, RegistryError, Result, WardenError};
pub use gate::{refine, Gate, GateResult, Generator, Harness, Refinement};
pub use loader::{LoadedPlugin, ModuleLoader};
pub use policy::CapabilityPolicy;
pub use registry::{PluginRegistry, RegistryEntry};
pub use types::{
    OutputKind, ParamSchemaItem, ParamType, PluginOutput, ProgramKind, ProgramMetadata, TestCase,
    TestOutcome, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
