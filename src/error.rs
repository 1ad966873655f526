//! Error types for edhsm
//!
//! This module defines the error hierarchy for all edhsm operations.
//! Errors are grouped by the component that raises them and use thiserror
//! for implementation.

use thiserror::Error;

use crate::model::{KeyIdError, ObjectClass, PinError, TemplateError};

/// Result type alias for edhsm operations
///
/// This is a convenience alias for `Result<T, EdhsmError>`.
pub type EdhsmResult<T> = Result<T, EdhsmError>;

/// Top-level error type for all edhsm operations
#[derive(Error, Debug)]
pub enum EdhsmError {
    /// Provider module and slot errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Session lifecycle and authentication errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Key provisioning errors
    #[error("Key management error: {0}")]
    KeyManagement(#[from] KeyManagementError),

    /// Signing and verification errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Mechanism registry errors
    #[error("Mechanism error: {0}")]
    Mechanism(#[from] MechanismError),

    /// Domain validation errors
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),
}

impl EdhsmError {
    /// `true` when nothing further should be attempted in this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EdhsmError::Device(DeviceError::TokenNotPresent { .. }))
    }
}

/// Provider module, lifecycle and slot errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The provider library could not be loaded
    #[error("Failed to load PKCS#11 provider {path}: {reason}")]
    ProviderLoad { path: String, reason: String },

    /// `initialize` was called on an initialized module
    #[error("Provider module is already initialized")]
    AlreadyInitialized,

    /// The module was never initialized or has been finalized
    #[error("Provider module is not initialized")]
    NotInitialized,

    /// Requested slot index is out of range
    #[error("Slot {index} not found ({available} slots available)")]
    SlotNotFound { index: usize, available: usize },

    /// Slot has no token; terminal for the run
    #[error("No token present in slot {slot} - insert or initialize a token")]
    TokenNotPresent { slot: u64 },

    /// Any other provider-level failure
    #[error("Provider failure: {reason}")]
    Provider { reason: String },
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session could not be opened
    #[error("Failed to open session on slot {slot}: {reason}")]
    Open { slot: u64, reason: String },

    /// Login was rejected
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// `login` was called on a logged-in session
    #[error("Session is already logged in")]
    AlreadyLoggedIn,

    /// `logout` was called on a session that is not logged in
    #[error("Session is not logged in")]
    NotLoggedIn,

    /// The session has already been closed
    #[error("Session is closed")]
    Closed,

    /// Logout or close failed at the device
    #[error("Failed to release session: {reason}")]
    Release { reason: String },
}

/// Key provisioning errors
#[derive(Error, Debug)]
pub enum KeyManagementError {
    /// Key pair generation was rejected
    #[error("Failed to generate key pair: {reason}")]
    Generation { reason: String },

    /// No object of the class carries the identifier
    #[error("No {class} found with id {key_id}")]
    NotFound { class: ObjectClass, key_id: String },

    /// Searching token objects failed at the device
    #[error("Object search failed: {reason}")]
    Search { reason: String },

    /// Reading an attribute failed at the device
    #[error("Failed to read attribute {attribute}: {reason}")]
    AttributeRead { attribute: String, reason: String },
}

/// Signing and verification errors
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The device refused or failed to sign
    #[error("Failed to generate signature: {reason}")]
    Signing { reason: String },

    /// The verify operation itself failed (not a signature mismatch)
    #[error("Verification operation failed: {reason}")]
    VerificationOperation { reason: String },
}

/// Mechanism registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MechanismError {
    /// Name is registered under a different identifier
    #[error("Mechanism {name} is registered as {registered:#x}, refusing {requested:#x}")]
    Conflict {
        name: String,
        registered: u64,
        requested: u64,
    },

    /// Name was never registered
    #[error("Unknown mechanism: {name}")]
    Unknown { name: String },

    /// Identifier is not supported by the provider
    #[error("Mechanism {id:#x} is not supported by this provider")]
    Unsupported { id: u64 },
}

/// Domain validation errors
#[derive(Error, Debug)]
pub enum DomainError {
    /// PIN validation error
    #[error("PIN validation error: {0}")]
    Pin(#[from] PinError),

    /// Key identifier error
    #[error("Key identifier error: {0}")]
    KeyId(#[from] KeyIdError),

    /// Attribute template error
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

impl From<PinError> for EdhsmError {
    fn from(err: PinError) -> Self {
        EdhsmError::Domain(DomainError::Pin(err))
    }
}

impl From<KeyIdError> for EdhsmError {
    fn from(err: KeyIdError) -> Self {
        EdhsmError::Domain(DomainError::KeyId(err))
    }
}

/// Invalid templates never reach the device; they fail generation early.
impl From<TemplateError> for EdhsmError {
    fn from(err: TemplateError) -> Self {
        EdhsmError::KeyManagement(KeyManagementError::Generation {
            reason: err.to_string(),
        })
    }
}
