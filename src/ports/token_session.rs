//! TokenSession trait - operations against one open session

use std::fmt::Debug;

use crate::error::EdhsmResult;
use crate::model::{
    AttributeKind, AttributeRead, KeyId, KeyPairTemplate, MechanismId, ObjectClass, Pin, UserType,
};

/// Capability to operate on a token through an open session
///
/// State rules (login once, nothing after close) are tracked by
/// [`crate::Session`]; implementations only talk to the device.
pub trait TokenSession {
    /// Provider-specific object handle
    type Handle: Copy + Debug + Eq;

    /// `C_Login`
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - the PIN is rejected (`SessionError::Authentication`)
    /// - the session is already logged in (`SessionError::AlreadyLoggedIn`)
    fn login(&mut self, user_type: UserType, pin: &Pin) -> EdhsmResult<()>;

    /// `C_Logout`
    fn logout(&mut self) -> EdhsmResult<()>;

    /// `C_CloseSession`
    fn close(&mut self) -> EdhsmResult<()>;

    /// `C_FindObjects` over `{CKA_CLASS, CKA_ID}`, in device order
    fn find_objects(&self, class: ObjectClass, id: &KeyId) -> EdhsmResult<Vec<Self::Handle>>;

    /// `C_GetAttributeValue` for a single attribute
    fn read_attribute(
        &self,
        object: Self::Handle,
        attribute: AttributeKind,
    ) -> EdhsmResult<AttributeRead>;

    /// `C_GenerateKeyPair`, returning `(public, private)`
    ///
    /// # Errors
    ///
    /// Returns `KeyManagementError::Generation` if the mechanism is
    /// unsupported or the templates are rejected
    fn generate_key_pair(
        &mut self,
        mechanism: MechanismId,
        template: &KeyPairTemplate,
    ) -> EdhsmResult<(Self::Handle, Self::Handle)>;

    /// `C_Sign` over the raw message
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Signing` if the key may not sign or the
    /// mechanism does not fit the key
    fn sign(&self, mechanism: MechanismId, key: Self::Handle, data: &[u8]) -> EdhsmResult<Vec<u8>>;

    /// `C_Verify`
    ///
    /// A signature that does not match is `Ok(false)`. Only device or
    /// protocol faults are errors (`CryptoError::VerificationOperation`).
    fn verify(
        &self,
        mechanism: MechanismId,
        key: Self::Handle,
        data: &[u8],
        signature: &[u8],
    ) -> EdhsmResult<bool>;
}
