//! Inspect key use case

use crate::device::Device;
use crate::error::EdhsmResult;
use crate::model::{KeyDetails, ObjectClass, SignerConfig};
use crate::ports::Provider;
use crate::provisioner::{describe_key, lookup_key_pair};

use super::open_authenticated;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairDetails {
    pub public: KeyDetails,
    pub private: KeyDetails,
}

/// Look up the pair stored under the configured key id and read back its
/// attributes. Read-only.
pub fn inspect_key<P: Provider>(
    device: &Device<P>,
    config: &SignerConfig,
) -> EdhsmResult<KeyPairDetails> {
    let session = open_authenticated(device, config.slot_index, &config.pin, config.user_type)?;
    session.run(|session| {
        let keys = lookup_key_pair(session, &config.key_id)?;
        Ok(KeyPairDetails {
            public: describe_key(session, keys.public, ObjectClass::PublicKey)?,
            private: describe_key(session, keys.private, ObjectClass::PrivateKey)?,
        })
    })
}
