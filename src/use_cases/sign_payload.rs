//! Sign payload use case
//!
//! Signs a caller-supplied message under a key id on one token: slot
//! selection, authenticated session, key provisioning, sign plus
//! self-verification, release.

use tracing::{info, warn};

use crate::device::Device;
use crate::error::EdhsmResult;
use crate::model::{KeyId, KeySource, Pin, Signature, SignerConfig, UserType};
use crate::ports::Provider;
use crate::provisioner::{generate_edwards_key_pair, lookup_key_pair, read_public_key};
use crate::registry::MechanismRegistry;
use crate::signing::sign_and_verify;

use super::open_authenticated;

/// One signing run on an initialized device
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub slot_index: usize,
    pub pin: &'a Pin,
    pub user_type: UserType,
    pub key_id: &'a KeyId,
    pub key_source: KeySource,
    /// Registry name of the signing mechanism
    pub mechanism: &'a str,
    pub message: &'a [u8],
}

impl<'a> SignRequest<'a> {
    pub fn new(config: &'a SignerConfig, message: &'a [u8]) -> Self {
        Self {
            slot_index: config.slot_index,
            pin: &config.pin,
            user_type: config.user_type,
            key_id: &config.key_id,
            key_source: config.key_source,
            mechanism: &config.mechanism,
            message,
        }
    }
}

/// What a signing run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningReport {
    pub key_id: KeyId,
    pub signature: Signature,
    /// Result of the self-check against the public key
    pub verified: bool,
    /// Ed25519 public key, when the token reveals it
    pub public_key: Option<[u8; 32]>,
}

impl SigningReport {
    pub fn public_key_hex(&self) -> Option<String> {
        self.public_key.map(hex::encode)
    }
}

/// Sign `request.message` on an initialized device
///
/// Exactly one of generate or lookup runs, as chosen by
/// `request.key_source`. The session is logged out and closed on every
/// path, including when provisioning or signing fails.
///
/// # Errors
///
/// - `MechanismError::Unknown` if the signing mechanism is not registered
/// - `DeviceError::SlotNotFound` / `DeviceError::TokenNotPresent`
/// - `SessionError::Open` / `SessionError::Authentication`
/// - `KeyManagementError::Generation` / `KeyManagementError::NotFound`
/// - `CryptoError::Signing` / `CryptoError::VerificationOperation`
pub fn sign_payload<P: Provider>(
    device: &Device<P>,
    registry: &MechanismRegistry,
    request: &SignRequest<'_>,
) -> EdhsmResult<SigningReport> {
    let mechanism = registry.resolve(request.mechanism)?;
    let session = open_authenticated(device, request.slot_index, request.pin, request.user_type)?;

    session.run(|session| {
        let keys = match request.key_source {
            KeySource::Generate => generate_edwards_key_pair(session, registry, request.key_id)?,
            KeySource::Lookup => lookup_key_pair(session, request.key_id)?,
        };
        let public_key = read_public_key(session, keys.public)?;
        let signed = sign_and_verify(session, &keys, mechanism, request.message)?;

        Ok(SigningReport {
            key_id: keys.id,
            signature: signed.signature,
            verified: signed.verified,
            public_key,
        })
    })
}

/// Run the whole device lifecycle around [`sign_payload`]
///
/// Initializes the provider, registers the Edwards mechanisms, signs and
/// finalizes. Finalize is attempted even when signing failed; the signing
/// error is the one returned.
pub fn sign_with_provider<P: Provider>(
    provider: P,
    config: &SignerConfig,
    message: &[u8],
) -> EdhsmResult<SigningReport> {
    let report = with_device(provider, &config.module_label, |device, registry| {
        sign_payload(device, registry, &SignRequest::new(config, message))
    })?;
    info!(
        "Signed {} bytes with key {} (verified: {})",
        message.len(),
        report.key_id,
        report.verified
    );
    Ok(report)
}

/// Initialize a device around `f` and finalize it afterwards
pub fn with_device<P: Provider, T>(
    provider: P,
    label: &str,
    f: impl FnOnce(&Device<P>, &MechanismRegistry) -> EdhsmResult<T>,
) -> EdhsmResult<T> {
    let mut device = Device::with_provider(provider, label);
    device.initialize()?;

    let mut registry = MechanismRegistry::new();
    registry.register_edwards_defaults();

    let outcome = f(&device, &registry);
    let finalized = device.finalize();
    match (outcome, finalized) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(finalize_err)) => {
            warn!("Finalize also failed: {}", finalize_err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::soft_token::{Fault, SoftHsm};
    use crate::error::{CryptoError, DeviceError, EdhsmError, KeyManagementError, MechanismError};

    fn generate_config() -> SignerConfig {
        SignerConfig {
            key_source: KeySource::Generate,
            ..SignerConfig::default()
        }
    }

    #[test]
    fn test_sign_with_generated_key() {
        let token = SoftHsm::new(Pin::default());
        let report = sign_with_provider(token.clone(), &generate_config(), b"helloworld").unwrap();

        assert!(report.verified);
        assert_eq!(report.signature.len(), 64);
        assert_eq!(report.key_id, KeyId::default());
        assert!(report.public_key.is_some());
        assert!(!token.is_initialized());
        assert_eq!(token.open_sessions(), 0);
    }

    #[test]
    fn test_signature_checks_out_off_device() {
        use ed25519_dalek::{Verifier, VerifyingKey};

        let token = SoftHsm::new(Pin::default());
        let report = sign_with_provider(token, &generate_config(), b"helloworld").unwrap();

        let verifying_key = VerifyingKey::from_bytes(&report.public_key.unwrap()).unwrap();
        let signature = ed25519_dalek::Signature::from_slice(report.signature.as_bytes()).unwrap();
        assert!(verifying_key.verify(b"helloworld", &signature).is_ok());
    }

    #[test]
    fn test_lookup_reuses_generated_key() {
        let token = SoftHsm::new(Pin::default());
        let generated = sign_with_provider(token.clone(), &generate_config(), b"first").unwrap();
        let found =
            sign_with_provider(token.clone(), &SignerConfig::default(), b"second").unwrap();

        assert!(found.verified);
        assert_eq!(found.public_key, generated.public_key);
        assert_eq!(token.object_count(), 2);
    }

    #[test]
    fn test_lookup_missing_key_releases_everything() {
        let token = SoftHsm::new(Pin::default());
        let err = sign_with_provider(token.clone(), &SignerConfig::default(), b"m").unwrap_err();

        assert!(matches!(
            err,
            EdhsmError::KeyManagement(KeyManagementError::NotFound { .. })
        ));
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
        assert_eq!(journal.mutations, 0);
        assert!(!token.is_initialized());
    }

    #[test]
    fn test_search_fault_releases_and_finalizes() {
        let token = SoftHsm::new(Pin::default());
        token.inject_fault(Fault::FindObjects);
        let err = sign_with_provider(token.clone(), &SignerConfig::default(), b"m").unwrap_err();

        assert!(matches!(
            err,
            EdhsmError::KeyManagement(KeyManagementError::Search { .. })
        ));
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
        assert_eq!(journal.signs, 0);
        assert!(!token.is_initialized());
    }

    #[test]
    fn test_sign_fault_releases_once() {
        let token = SoftHsm::new(Pin::default());
        token.inject_fault(Fault::Sign);
        let err = sign_with_provider(token.clone(), &generate_config(), b"m").unwrap_err();

        assert!(matches!(err, EdhsmError::Crypto(CryptoError::Signing { .. })));
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
    }

    #[test]
    fn test_unknown_mechanism_opens_no_session() {
        let token = SoftHsm::new(Pin::default());
        let config = SignerConfig {
            mechanism: "CKM_VENDOR_UNKNOWN".to_string(),
            ..generate_config()
        };
        let err = sign_with_provider(token.clone(), &config, b"m").unwrap_err();

        assert!(matches!(
            err,
            EdhsmError::Mechanism(MechanismError::Unknown { .. })
        ));
        assert_eq!(token.journal().sessions_opened, 0);
    }

    #[test]
    fn test_no_token_is_terminal() {
        let token = SoftHsm::without_token(Pin::default());
        let err = sign_with_provider(token.clone(), &generate_config(), b"m").unwrap_err();

        assert!(err.is_terminal());
        assert!(matches!(
            err,
            EdhsmError::Device(DeviceError::TokenNotPresent { .. })
        ));
        assert_eq!(token.journal().sessions_opened, 0);
        assert!(!token.is_initialized());
    }

    #[test]
    fn test_sign_payload_on_initialized_device() {
        let token = SoftHsm::with_slots(Pin::default(), &[false, true]);
        let mut device = Device::with_provider(token.clone(), "SoftHSM");
        device.initialize().unwrap();
        let registry = MechanismRegistry::with_edwards_defaults();

        let config = SignerConfig {
            slot_index: 1,
            ..generate_config()
        };
        let report = sign_payload(&device, &registry, &SignRequest::new(&config, b"payload")).unwrap();
        assert!(report.verified);

        device.finalize().unwrap();
    }
}
