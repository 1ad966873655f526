//! Signing engine
//!
//! The message is handed to the token as-is. Any hashing is the
//! mechanism's business, never done here.

use tracing::{debug, info, warn};

use crate::error::{CryptoError, EdhsmResult};
use crate::model::{KeyPair, MechanismId, Signature};
use crate::ports::TokenSession;
use crate::session::AuthenticatedSession;

/// A signature together with the result of checking it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub signature: Signature,
    /// Outcome of verifying `signature` with the public key
    pub verified: bool,
}

/// Sign `message` with `private_key`
///
/// # Errors
///
/// Returns `CryptoError::Signing` if the token refuses (sign usage disabled,
/// mechanism incompatible with the key), or if an EdDSA signature does not
/// have the fixed Ed25519 length
pub fn sign<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    private_key: S::Handle,
    mechanism: MechanismId,
    message: &[u8],
) -> EdhsmResult<Signature> {
    debug!(
        "Signing {} bytes with {:?} using mechanism {}",
        message.len(),
        private_key,
        mechanism
    );
    let bytes = session.token().sign(mechanism, private_key, message)?;

    if mechanism == MechanismId::EDDSA && bytes.len() != Signature::ED25519_LENGTH {
        return Err(CryptoError::Signing {
            reason: format!(
                "EdDSA signature must be {} bytes, token returned {}",
                Signature::ED25519_LENGTH,
                bytes.len()
            ),
        }
        .into());
    }

    Ok(Signature::from_bytes(bytes))
}

/// Check `signature` over `message` with `public_key`
///
/// `Ok(false)` means the signature does not match. Errors are reserved for
/// the verify operation itself failing.
pub fn verify<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    public_key: S::Handle,
    mechanism: MechanismId,
    message: &[u8],
    signature: &Signature,
) -> EdhsmResult<bool> {
    let verified = session
        .token()
        .verify(mechanism, public_key, message, signature.as_bytes())?;
    debug!("Verification with {:?}: {}", public_key, verified);
    Ok(verified)
}

/// Sign, then immediately verify with the matching public key
///
/// The self-check catches a mismatched pair or misconfigured attributes
/// at the point of use, for the price of one more device round trip.
pub fn sign_and_verify<S: TokenSession>(
    session: &AuthenticatedSession<'_, S>,
    keys: &KeyPair<S::Handle>,
    mechanism: MechanismId,
    message: &[u8],
) -> EdhsmResult<SignedMessage> {
    let signature = sign(session, keys.private, mechanism, message)?;
    info!("Signature: {}", signature.to_hex());

    let verified = verify(session, keys.public, mechanism, message, &signature)?;
    if verified {
        info!("Signature verified with key {}", keys.id);
    } else {
        warn!("Signature did not verify with key {}", keys.id);
    }

    Ok(SignedMessage {
        signature,
        verified,
    })
}
