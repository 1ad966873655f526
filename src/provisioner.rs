//! Key provisioner
//!
//! Generates an Edwards key pair under a caller-chosen identifier, or finds
//! the pair already stored under it. Which of the two runs is decided by
//! the operator; the provisioner never probes the token to choose.

use tracing::{debug, info, warn};

use crate::error::{EdhsmResult, KeyManagementError};
use crate::model::{
    decode_ec_point, AttributeKind, EdwardsCurve, KeyDetails, KeyId, KeyPair, KeyPairTemplate, ObjectClass,
    DEFAULT_KEYGEN_MECHANISM,
};
use crate::ports::TokenSession;
use crate::registry::MechanismRegistry;
use crate::session::AuthenticatedSession;

/// Generate a key pair from `template`
///
/// The template is validated before the device sees it; invalid
/// combinations fail as `KeyManagementError::Generation`.
pub fn generate_key_pair<S: TokenSession>(
    session: &mut AuthenticatedSession<'_, S>,
    registry: &MechanismRegistry,
    template: &KeyPairTemplate,
) -> EdhsmResult<KeyPair<S::Handle>> {
    template.validate()?;
    let mechanism = registry.resolve(DEFAULT_KEYGEN_MECHANISM)?;

    debug!(
        "Generating Edwards key pair {} with mechanism {}",
        template.key_id(),
        mechanism
    );
    let (public, private) = session
        .token_mut()
        .generate_key_pair(mechanism, template)?;

    info!("Generated key pair {}", template.key_id());
    Ok(KeyPair {
        id: template.key_id().clone(),
        public,
        private,
    })
}

/// Generate a key pair with the default Edwards templates
pub fn generate_edwards_key_pair<S: TokenSession>(
    session: &mut AuthenticatedSession<'_, S>,
    registry: &MechanismRegistry,
    key_id: &KeyId,
) -> EdhsmResult<KeyPair<S::Handle>> {
    generate_key_pair(session, registry, &KeyPairTemplate::edwards(key_id.clone()))
}

/// Find the public and private objects stored under `key_id`
///
/// When several objects of one class share the identifier the first one
/// the device returns is used and a warning is logged. Nothing on the
/// token is modified.
pub fn lookup_key_pair<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    key_id: &KeyId,
) -> EdhsmResult<KeyPair<S::Handle>> {
    let public = find_first(session, ObjectClass::PublicKey, key_id)?;
    let private = find_first(session, ObjectClass::PrivateKey, key_id)?;

    debug!("Found key pair {}", key_id);
    Ok(KeyPair {
        id: key_id.clone(),
        public,
        private,
    })
}

fn find_first<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    class: ObjectClass,
    key_id: &KeyId,
) -> EdhsmResult<S::Handle> {
    let matches = session.token().find_objects(class, key_id)?;
    if matches.len() > 1 {
        warn!(
            "{} objects of class {} share id {}, using the first",
            matches.len(),
            class,
            key_id
        );
    }
    matches.into_iter().next().ok_or_else(|| {
        KeyManagementError::NotFound {
            class,
            key_id: key_id.to_hex(),
        }
        .into()
    })
}

/// Ed25519 public key held in a public key object's `CKA_EC_POINT`
///
/// `None` when the provider does not reveal the point or it is not a
/// 32-byte Edwards point.
pub fn read_public_key<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    public_key: S::Handle,
) -> EdhsmResult<Option<[u8; 32]>> {
    let point = session
        .token()
        .read_attribute(public_key, AttributeKind::EcPoint)?
        .bytes();
    Ok(point.and_then(|point| decode_ec_point(&point)))
}

/// Read back what the provider will reveal about a key object
///
/// Attributes the provider does not support stay `None`.
pub fn describe_key<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    object: S::Handle,
    class: ObjectClass,
) -> EdhsmResult<KeyDetails> {
    let token = session.token();
    let read = |attribute| token.read_attribute(object, attribute);

    let mut details = KeyDetails::empty(class);
    details.label = read(AttributeKind::Label)?
        .bytes()
        .map(|label| String::from_utf8_lossy(&label).into_owned());
    details.id = read(AttributeKind::Id)?
        .bytes()
        .and_then(|id| KeyId::new(id).ok());
    details.key_type = read(AttributeKind::KeyType)?.key_type();
    details.curve = read(AttributeKind::EcParams)?
        .bytes()
        .and_then(|params| EdwardsCurve::from_params(&params));

    details.protection.token = read(AttributeKind::Token)?.flag();
    details.protection.private = read(AttributeKind::Private)?.flag();
    details.protection.modifiable = read(AttributeKind::Modifiable)?.flag();

    match class {
        ObjectClass::PublicKey => {
            details.usage.verify = read(AttributeKind::Verify)?.flag();
            details.usage.encrypt = read(AttributeKind::Encrypt)?.flag();
            if let Some(point) = read(AttributeKind::EcPoint)?.bytes() {
                details.set_public_key_from_point(&point);
            }
        }
        ObjectClass::PrivateKey => {
            details.usage.sign = read(AttributeKind::Sign)?.flag();
            details.usage.decrypt = read(AttributeKind::Decrypt)?.flag();
            details.protection.sensitive = read(AttributeKind::Sensitive)?.flag();
            details.protection.extractable = read(AttributeKind::Extractable)?.flag();
        }
    }
    details.usage.derive = read(AttributeKind::Derive)?.flag();

    Ok(details)
}
