//! Adapters - concrete implementations of ports (traits)

mod cryptoki_provider;

pub mod soft_token;

// Re-export for convenience
pub use cryptoki_provider::{CryptokiProvider, CryptokiSession};
