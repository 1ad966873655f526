//! Attribute templates for Edwards key pair generation
//!
//! Each key class gets its own immutable configuration structure. Fields a
//! class can never carry (sign on a public key, verify on a private key) do
//! not exist on it, so those combinations cannot be expressed at all. The
//! remaining conflicts are checked by [`KeyPairTemplate::validate`] before
//! anything reaches the device.

use thiserror::Error;

use super::{EdwardsCurve, KeyId, KeyTypeId};

/// Default `CKA_LABEL` of generated public keys
pub const DEFAULT_PUBLIC_LABEL: &str = "Generated EC Edwards pubK";

/// Default `CKA_LABEL` of generated private keys
pub const DEFAULT_PRIVATE_LABEL: &str = "Generated EC Edwards privK";

/// Template for the public half
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyTemplate {
    /// Always `CKK_EC_EDWARDS` for templates built here
    pub key_type: KeyTypeId,
    pub curve: EdwardsCurve,
    /// Token-resident (`true`) or session object (`false`)
    pub token: bool,
    pub private: bool,
    pub modifiable: bool,
    pub verify: bool,
    pub encrypt: bool,
    pub derive: bool,
    pub wrap: bool,
    pub label: String,
    pub id: KeyId,
}

impl PublicKeyTemplate {
    /// Token-resident, read-only, verify-only public key
    pub fn edwards(id: KeyId) -> Self {
        Self {
            key_type: KeyTypeId::EC_EDWARDS,
            curve: EdwardsCurve::Ed25519,
            token: true,
            private: false,
            modifiable: false,
            verify: true,
            encrypt: false,
            derive: false,
            wrap: true,
            label: DEFAULT_PUBLIC_LABEL.to_string(),
            id,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Template for the private half
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyTemplate {
    pub key_type: KeyTypeId,
    pub token: bool,
    pub private: bool,
    /// Key value never leaves the token in plaintext
    pub sensitive: bool,
    pub extractable: bool,
    pub modifiable: bool,
    pub sign: bool,
    pub derive: bool,
    pub decrypt: bool,
    pub label: String,
    pub id: KeyId,
}

impl PrivateKeyTemplate {
    /// Token-resident, sensitive, non-extractable, sign-only private key
    pub fn edwards(id: KeyId) -> Self {
        Self {
            key_type: KeyTypeId::EC_EDWARDS,
            token: true,
            private: false,
            sensitive: true,
            extractable: false,
            modifiable: false,
            sign: true,
            derive: false,
            decrypt: false,
            label: DEFAULT_PRIVATE_LABEL.to_string(),
            id,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Both templates of one generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairTemplate {
    pub public: PublicKeyTemplate,
    pub private: PrivateKeyTemplate,
}

impl KeyPairTemplate {
    /// Default Ed25519 templates correlated by `id`
    pub fn edwards(id: KeyId) -> Self {
        Self {
            public: PublicKeyTemplate::edwards(id.clone()),
            private: PrivateKeyTemplate::edwards(id),
        }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.public.id
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.public.id != self.private.id {
            return Err(TemplateError::MismatchedIds);
        }
        if self.public.key_type != self.private.key_type {
            return Err(TemplateError::MismatchedKeyTypes);
        }
        if self.private.sensitive && self.private.extractable {
            return Err(TemplateError::SensitiveAndExtractable);
        }
        if self.public.label.is_empty() || self.private.label.is_empty() {
            return Err(TemplateError::EmptyLabel);
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateError {
    #[error("public and private templates must share one key identifier")]
    MismatchedIds,

    #[error("public and private templates must share one key type")]
    MismatchedKeyTypes,

    #[error("private key cannot be both sensitive and extractable")]
    SensitiveAndExtractable,

    #[error("key labels must not be empty")]
    EmptyLabel,
}
