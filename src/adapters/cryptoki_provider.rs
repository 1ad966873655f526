//! PKCS#11 provider backed by the cryptoki crate
//!
//! Loads a vendor module (SoftHSM2, a network HSM client, a smart card
//! middleware) and implements the token ports on top of it.

use std::fmt;
use std::path::Path;

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::error::{Error as CryptokiError, RvError};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{
    Attribute, AttributeInfo, AttributeType, KeyType, ObjectClass as CkObjectClass, ObjectHandle,
};
use cryptoki::session::{Session as CkSession, UserType as CkUserType};
use cryptoki::slot::Slot;
use cryptoki::types::AuthPin;
use tracing::{debug, info};

use crate::error::{
    CryptoError, DeviceError, EdhsmError, EdhsmResult, KeyManagementError, MechanismError,
    SessionError,
};
use crate::model::{
    AttributeKind, AttributeRead, AttributeValue, KeyId, KeyPairTemplate, KeyTypeId, MechanismId,
    ObjectClass, Pin, PrivateKeyTemplate, PublicKeyTemplate, SessionMode, SlotInfo, UserType,
};
use crate::ports::{Provider, TokenSession};

/// A loaded PKCS#11 module
pub struct CryptokiProvider {
    path: String,
    context: Option<Pkcs11>,
}

impl fmt::Debug for CryptokiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptokiProvider")
            .field("path", &self.path)
            .field("loaded", &self.context.is_some())
            .finish()
    }
}

impl CryptokiProvider {
    /// Load the module at `path` without initializing it
    pub fn load(path: &Path) -> EdhsmResult<Self> {
        let path_text = path.display().to_string();
        let context = Pkcs11::new(path).map_err(|e| DeviceError::ProviderLoad {
            path: path_text.clone(),
            reason: e.to_string(),
        })?;
        debug!("Loaded PKCS#11 module {}", path_text);
        Ok(Self {
            path: path_text,
            context: Some(context),
        })
    }

    fn context(&self) -> EdhsmResult<&Pkcs11> {
        self.context
            .as_ref()
            .ok_or_else(|| DeviceError::NotInitialized.into())
    }

    fn all_slots(&self) -> EdhsmResult<Vec<Slot>> {
        self.context()?
            .get_all_slots()
            .map_err(|e| provider_error("C_GetSlotList", e))
    }
}

fn provider_error(function: &str, err: CryptokiError) -> EdhsmError {
    DeviceError::Provider {
        reason: format!("{}: {}", function, err),
    }
    .into()
}

fn return_value(err: &CryptokiError) -> Option<RvError> {
    match err {
        CryptokiError::Pkcs11(rv) => Some(*rv),
        _ => None,
    }
}

impl Provider for CryptokiProvider {
    type Session = CryptokiSession;

    fn initialize(&mut self) -> EdhsmResult<()> {
        let context = self.context()?;
        match context.initialize(CInitializeArgs::OsThreads) {
            Ok(()) => {
                info!("Initialized PKCS#11 module {}", self.path);
                Ok(())
            }
            Err(e) if return_value(&e) == Some(RvError::CryptokiAlreadyInitialized) => {
                Err(DeviceError::AlreadyInitialized.into())
            }
            Err(e) => Err(provider_error("C_Initialize", e)),
        }
    }

    fn finalize(&mut self) -> EdhsmResult<()> {
        let context = self
            .context
            .take()
            .ok_or(EdhsmError::Device(DeviceError::NotInitialized))?;
        context.finalize();
        debug!("Finalized PKCS#11 module {}", self.path);
        Ok(())
    }

    fn slots(&self, token_present_only: bool) -> EdhsmResult<Vec<SlotInfo>> {
        let context = self.context()?;
        let mut slots = Vec::new();
        for (index, slot) in self.all_slots()?.into_iter().enumerate() {
            let info = context
                .get_slot_info(slot)
                .map_err(|e| provider_error("C_GetSlotInfo", e))?;
            if token_present_only && !info.token_present() {
                continue;
            }
            slots.push(SlotInfo::new(
                index,
                slot.id(),
                info.token_present(),
                info.slot_description().trim(),
            ));
        }
        Ok(slots)
    }

    fn open_session(&self, slot: &SlotInfo, mode: SessionMode) -> EdhsmResult<CryptokiSession> {
        let open_error = |reason: String| -> EdhsmError {
            SessionError::Open {
                slot: slot.id,
                reason,
            }
            .into()
        };

        let context = self.context()?;
        let target = self
            .all_slots()?
            .into_iter()
            .find(|candidate| candidate.id() == slot.id)
            .ok_or_else(|| open_error("CKR_SLOT_ID_INVALID".to_string()))?;

        // cryptoki always sets CKF_SERIAL_SESSION.
        let session = if mode.read_write {
            context.open_rw_session(target)
        } else {
            context.open_ro_session(target)
        }
        .map_err(|e| open_error(e.to_string()))?;

        Ok(CryptokiSession {
            session: Some(session),
            slot: slot.id,
        })
    }
}

/// An open cryptoki session
pub struct CryptokiSession {
    session: Option<CkSession>,
    slot: u64,
}

impl fmt::Debug for CryptokiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptokiSession")
            .field("slot", &self.slot)
            .field("open", &self.session.is_some())
            .finish()
    }
}

impl CryptokiSession {
    fn session(&self) -> EdhsmResult<&CkSession> {
        self.session
            .as_ref()
            .ok_or_else(|| SessionError::Closed.into())
    }
}

/// Map a mechanism id onto a cryptoki mechanism
///
/// cryptoki 0.6 has no vendor-defined mechanism variant, so ids registered
/// through `register_vendor_mechanism` resolve in the registry but are
/// rejected here as `Unsupported` before any device call.
fn mechanism(id: MechanismId) -> Result<Mechanism<'static>, MechanismError> {
    match id {
        MechanismId::EC_EDWARDS_KEY_PAIR_GEN => Ok(Mechanism::EccEdwardsKeyPairGen),
        MechanismId::EDDSA => Ok(Mechanism::Eddsa),
        other => Err(MechanismError::Unsupported { id: other.value() }),
    }
}

fn key_type(id: KeyTypeId) -> EdhsmResult<KeyType> {
    if id == KeyTypeId::EC_EDWARDS {
        Ok(KeyType::EC_EDWARDS)
    } else {
        Err(KeyManagementError::Generation {
            reason: format!("key type {:#x} is not supported", id.0),
        }
        .into())
    }
}

fn class(class: ObjectClass) -> CkObjectClass {
    match class {
        ObjectClass::PublicKey => CkObjectClass::PUBLIC_KEY,
        ObjectClass::PrivateKey => CkObjectClass::PRIVATE_KEY,
    }
}

fn attribute_type(kind: AttributeKind) -> AttributeType {
    match kind {
        AttributeKind::KeyType => AttributeType::KeyType,
        AttributeKind::Label => AttributeType::Label,
        AttributeKind::Id => AttributeType::Id,
        AttributeKind::Token => AttributeType::Token,
        AttributeKind::Private => AttributeType::Private,
        AttributeKind::Modifiable => AttributeType::Modifiable,
        AttributeKind::Sensitive => AttributeType::Sensitive,
        AttributeKind::Extractable => AttributeType::Extractable,
        AttributeKind::Sign => AttributeType::Sign,
        AttributeKind::Verify => AttributeType::Verify,
        AttributeKind::Encrypt => AttributeType::Encrypt,
        AttributeKind::Decrypt => AttributeType::Decrypt,
        AttributeKind::Derive => AttributeType::Derive,
        AttributeKind::Wrap => AttributeType::Wrap,
        AttributeKind::EcParams => AttributeType::EcParams,
        AttributeKind::EcPoint => AttributeType::EcPoint,
    }
}

fn attribute_value(attribute: Attribute) -> Option<AttributeValue> {
    let value = match attribute {
        Attribute::Label(bytes)
        | Attribute::Id(bytes)
        | Attribute::EcParams(bytes)
        | Attribute::EcPoint(bytes) => AttributeValue::Bytes(bytes),
        Attribute::Token(flag)
        | Attribute::Private(flag)
        | Attribute::Modifiable(flag)
        | Attribute::Sensitive(flag)
        | Attribute::Extractable(flag)
        | Attribute::Sign(flag)
        | Attribute::Verify(flag)
        | Attribute::Encrypt(flag)
        | Attribute::Decrypt(flag)
        | Attribute::Derive(flag)
        | Attribute::Wrap(flag) => AttributeValue::Bool(flag),
        Attribute::KeyType(key_type) => AttributeValue::KeyType(KeyTypeId(u64::from(*key_type))),
        _ => return None,
    };
    Some(value)
}

fn public_attributes(template: &PublicKeyTemplate) -> EdhsmResult<Vec<Attribute>> {
    Ok(vec![
        Attribute::Class(CkObjectClass::PUBLIC_KEY),
        Attribute::KeyType(key_type(template.key_type)?),
        Attribute::Token(template.token),
        Attribute::Private(template.private),
        Attribute::Modifiable(template.modifiable),
        Attribute::Verify(template.verify),
        Attribute::Encrypt(template.encrypt),
        Attribute::Derive(template.derive),
        Attribute::Wrap(template.wrap),
        Attribute::EcParams(template.curve.params().to_vec()),
        Attribute::Label(template.label.as_bytes().to_vec()),
        Attribute::Id(template.id.as_bytes().to_vec()),
    ])
}

fn private_attributes(template: &PrivateKeyTemplate) -> EdhsmResult<Vec<Attribute>> {
    Ok(vec![
        Attribute::Class(CkObjectClass::PRIVATE_KEY),
        Attribute::KeyType(key_type(template.key_type)?),
        Attribute::Token(template.token),
        Attribute::Private(template.private),
        Attribute::Sensitive(template.sensitive),
        Attribute::Extractable(template.extractable),
        Attribute::Modifiable(template.modifiable),
        Attribute::Sign(template.sign),
        Attribute::Derive(template.derive),
        Attribute::Decrypt(template.decrypt),
        Attribute::Label(template.label.as_bytes().to_vec()),
        Attribute::Id(template.id.as_bytes().to_vec()),
    ])
}

impl TokenSession for CryptokiSession {
    type Handle = ObjectHandle;

    fn login(&mut self, user_type: UserType, pin: &Pin) -> EdhsmResult<()> {
        let user = match user_type {
            UserType::User => CkUserType::User,
            UserType::SecurityOfficer => CkUserType::So,
            UserType::ContextSpecific => CkUserType::ContextSpecific,
        };
        let pin = AuthPin::new(pin.as_str().into());
        self.session()?
            .login(user, Some(&pin))
            .map_err(|e| match return_value(&e) {
                Some(RvError::UserAlreadyLoggedIn) => SessionError::AlreadyLoggedIn.into(),
                _ => EdhsmError::from(SessionError::Authentication {
                    reason: e.to_string(),
                }),
            })
    }

    fn logout(&mut self) -> EdhsmResult<()> {
        self.session()?.logout().map_err(|e| match return_value(&e) {
            Some(RvError::UserNotLoggedIn) => SessionError::NotLoggedIn.into(),
            _ => EdhsmError::from(SessionError::Release {
                reason: format!("C_Logout: {}", e),
            }),
        })
    }

    fn close(&mut self) -> EdhsmResult<()> {
        // C_CloseSession runs when the cryptoki session is dropped.
        self.session
            .take()
            .map(drop)
            .ok_or_else(|| SessionError::Closed.into())
    }

    fn find_objects(&self, object_class: ObjectClass, id: &KeyId) -> EdhsmResult<Vec<ObjectHandle>> {
        let template = [
            Attribute::Class(class(object_class)),
            Attribute::Id(id.as_bytes().to_vec()),
        ];
        self.session()?.find_objects(&template).map_err(|e| {
            KeyManagementError::Search {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn read_attribute(
        &self,
        object: ObjectHandle,
        attribute: AttributeKind,
    ) -> EdhsmResult<AttributeRead> {
        let session = self.session()?;
        let kind = [attribute_type(attribute)];
        let read_error = |e: CryptokiError| -> EdhsmError {
            KeyManagementError::AttributeRead {
                attribute: attribute.to_string(),
                reason: e.to_string(),
            }
            .into()
        };

        let info = session.get_attribute_info(object, &kind).map_err(read_error)?;
        if !matches!(info.first(), Some(AttributeInfo::Available(_))) {
            return Ok(AttributeRead::Unsupported);
        }
        let value = session
            .get_attributes(object, &kind)
            .map_err(read_error)?
            .into_iter()
            .next()
            .and_then(attribute_value);
        Ok(value.map_or(AttributeRead::Unsupported, AttributeRead::Value))
    }

    fn generate_key_pair(
        &mut self,
        mechanism_id: MechanismId,
        template: &KeyPairTemplate,
    ) -> EdhsmResult<(ObjectHandle, ObjectHandle)> {
        let generation_error = |reason: String| -> EdhsmError {
            KeyManagementError::Generation { reason }.into()
        };
        let mechanism = mechanism(mechanism_id).map_err(|e| generation_error(e.to_string()))?;
        let public = public_attributes(&template.public)?;
        let private = private_attributes(&template.private)?;

        self.session()?
            .generate_key_pair(&mechanism, &public, &private)
            .map_err(|e| generation_error(e.to_string()))
    }

    fn sign(&self, mechanism_id: MechanismId, key: ObjectHandle, data: &[u8]) -> EdhsmResult<Vec<u8>> {
        let signing_error = |reason: String| -> EdhsmError { CryptoError::Signing { reason }.into() };
        let mechanism = mechanism(mechanism_id).map_err(|e| signing_error(e.to_string()))?;
        self.session()?
            .sign(&mechanism, key, data)
            .map_err(|e| signing_error(e.to_string()))
    }

    fn verify(
        &self,
        mechanism_id: MechanismId,
        key: ObjectHandle,
        data: &[u8],
        signature: &[u8],
    ) -> EdhsmResult<bool> {
        let operation_error =
            |reason: String| -> EdhsmError { CryptoError::VerificationOperation { reason }.into() };
        let mechanism = mechanism(mechanism_id).map_err(|e| operation_error(e.to_string()))?;
        match self.session()?.verify(&mechanism, key, data, signature) {
            Ok(()) => Ok(true),
            Err(e) => match return_value(&e) {
                Some(RvError::SignatureInvalid | RvError::SignatureLenRange) => Ok(false),
                _ => Err(operation_error(e.to_string())),
            },
        }
    }
}
