//! Caller-assigned identifier correlating a public and a private key object

use std::fmt;

use thiserror::Error;

/// Value of `CKA_ID` shared by both halves of a key pair
///
/// The identifier is opaque to the token. It must be unique within an
/// object class but the public and private halves deliberately share it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(Vec<u8>);

impl KeyId {
    /// Upper bound accepted for identifiers
    pub const MAX_LENGTH: usize = 255;

    pub fn new(id: Vec<u8>) -> Result<Self, KeyIdError> {
        if id.is_empty() {
            return Err(KeyIdError::Empty);
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(KeyIdError::TooLong { actual: id.len() });
        }
        Ok(Self(id))
    }

    pub fn from_slice(id: &[u8]) -> Result<Self, KeyIdError> {
        Self::new(id.to_vec())
    }

    /// Parse a hex string such as `0102030405`
    pub fn from_hex(id: &str) -> Result<Self, KeyIdError> {
        let bytes = hex::decode(id.trim()).map_err(|e| KeyIdError::InvalidHex {
            reason: e.to_string(),
        })?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl Default for KeyId {
    /// `01 02 03 04 05`, the identifier used by the reference deployment
    fn default() -> Self {
        Self(vec![1, 2, 3, 4, 5])
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyIdError {
    #[error("Key identifier must not be empty")]
    Empty,

    #[error("Key identifier must be at most {max} bytes, got {actual}", max = KeyId::MAX_LENGTH)]
    TooLong { actual: usize },

    #[error("Key identifier is not valid hex: {reason}")]
    InvalidHex { reason: String },
}
