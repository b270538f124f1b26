//! Warden Runtime - Capability provider surface for plugin scripts
//!
//! Generated plugin modules never touch the filesystem, the network, or the
//! secret store directly. Everything flows through one injected
//! [`CapabilityProvider`], exposed to scripts as the `runtime` module.
//!
//! The pieces:
//!
//! - [`provider`]: the provider trait plus the in-memory and deny-all
//!   implementations
//! - [`mock`]: per-test canned-value layering (uncovered calls fall through)
//! - [`bind`]: the Rhai module binding and the hardened engine constructor
//!
//! Mocking is dependency injection, not substitution: a fresh provider and a
//! fresh engine are built per test run and dropped afterwards, so there is
//! no global state to restore and no way for one test's mocks to leak into
//! the next.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bind;
pub mod error;
pub mod mock;
pub mod provider;

pub use bind::{capability_module, harness_engine, PROVIDER_MODULE};
pub use error::{CapabilityError, Result};
pub use mock::{MockOverrides, MockedProvider};
pub use provider::{CapabilityProvider, MemoryProvider, NullProvider};
