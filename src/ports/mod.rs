//! Ports (traits) for PKCS#11 token operations
//!
//! These traits describe the device capability set the core consumes.
//! They represent ports in hexagonal architecture - the core depends on
//! these abstractions, not on a concrete PKCS#11 binding.

pub mod contract_tests;
mod provider;
mod token_session;

pub use provider::Provider;
pub use token_session::TokenSession;
