//! Run configuration

use std::path::PathBuf;

use super::{KeyId, Pin, UserType};

/// Default SoftHSM2 module location
pub const DEFAULT_MODULE_PATH: &str = "/usr/local/lib/softhsm/libsofthsm2.so";

/// Default module label
pub const DEFAULT_MODULE_LABEL: &str = "SoftHSM";

/// Registry name of the signing mechanism
pub const DEFAULT_SIGNING_MECHANISM: &str = "CKM_EDDSA";

/// Registry name of the key generation mechanism
pub const DEFAULT_KEYGEN_MECHANISM: &str = "CKM_EC_EDWARDS_KEY_PAIR_GEN";

/// Where the key pair for a run comes from
///
/// This is an operator decision. The crate never probes the token to pick
/// one automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySource {
    /// Generate a fresh pair under the identifier
    Generate,
    /// Use the pair already stored under the identifier
    #[default]
    Lookup,
}

/// Everything a signing run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerConfig {
    /// PKCS#11 module to load
    pub module_path: PathBuf,
    pub module_label: String,
    /// Index into the provider's slot list
    pub slot_index: usize,
    pub pin: Pin,
    pub user_type: UserType,
    pub key_id: KeyId,
    pub key_source: KeySource,
    /// Registry name of the signing mechanism
    pub mechanism: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from(DEFAULT_MODULE_PATH),
            module_label: DEFAULT_MODULE_LABEL.to_string(),
            slot_index: 0,
            pin: Pin::default(),
            user_type: UserType::User,
            key_id: KeyId::default(),
            key_source: KeySource::Lookup,
            mechanism: DEFAULT_SIGNING_MECHANISM.to_string(),
        }
    }
}
