//! Generate key use case
//!
//! Generates a fresh Edwards key pair under the configured key id and
//! reports its public key.

use crate::device::Device;
use crate::error::EdhsmResult;
use crate::model::{KeyId, SignerConfig};
use crate::ports::Provider;
use crate::provisioner::{generate_edwards_key_pair, read_public_key};
use crate::registry::MechanismRegistry;

use super::open_authenticated;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub key_id: KeyId,
    pub public_key: Option<[u8; 32]>,
}

/// Generate a new Ed25519 key pair on the configured slot
///
/// This function orchestrates the complete key generation workflow:
/// 1. Select the slot and require a token
/// 2. Open a read-write session and log in
/// 3. Generate the pair with the default Edwards templates
/// 4. Log out and close the session
///
/// The token does not stop a second pair being generated under an id that
/// is already in use; lookups then pick the first match.
pub fn generate_key<P: Provider>(
    device: &Device<P>,
    registry: &MechanismRegistry,
    config: &SignerConfig,
) -> EdhsmResult<GeneratedKey> {
    let session = open_authenticated(device, config.slot_index, &config.pin, config.user_type)?;
    session.run(|session| {
        let keys = generate_edwards_key_pair(session, registry, &config.key_id)?;
        Ok(GeneratedKey {
            public_key: read_public_key(session, keys.public)?,
            key_id: keys.id,
        })
    })
}
