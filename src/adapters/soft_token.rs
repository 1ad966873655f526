//! In-memory simulated PKCS#11 token
//!
//! `SoftHsm` behaves like a small SoftHSM2 instance: slots with or without a
//! token, PIN login, token objects with attribute templates, Ed25519 key
//! generation and EdDSA sign/verify. It also records what was called
//! ([`Journal`]) and can fail the next call of a given kind ([`Fault`]),
//! which is what the tests use to check release-on-every-path behaviour.
//!
//! Clones share one token. The state lives behind `Rc<RefCell<_>>`, so the
//! simulator is single-threaded like the workflow it serves.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::{rng, RngCore};
use tracing::debug;

use crate::error::{
    CryptoError, DeviceError, EdhsmError, EdhsmResult, KeyManagementError, SessionError,
};
use crate::model::{
    encode_ec_point, AttributeKind, AttributeRead, AttributeValue, KeyId, KeyPairTemplate,
    KeyTypeId, MechanismId, ObjectClass, Pin, SessionMode, SlotInfo, UserType, ED25519_OID,
};
use crate::ports::{Provider, TokenSession};

/// Operation that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    OpenSession,
    Login,
    Logout,
    Close,
    FindObjects,
    ReadAttribute,
    GenerateKeyPair,
    Sign,
    Verify,
}

/// Call counters, including calls that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Journal {
    pub sessions_opened: usize,
    pub logins: usize,
    pub logouts: usize,
    pub closes: usize,
    pub signs: usize,
    pub verifies: usize,
    /// Operations that changed token contents
    pub mutations: usize,
}

/// Object handle issued by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoftObject(u64);

#[derive(Debug)]
struct SoftSlot {
    id: u64,
    token_present: bool,
    logged_in: Option<UserType>,
}

#[derive(Debug)]
struct StoredObject {
    slot: u64,
    class: ObjectClass,
    key_type: KeyTypeId,
    id: KeyId,
    label: String,
    token: bool,
    private: bool,
    modifiable: bool,
    sensitive: bool,
    extractable: bool,
    sign: bool,
    verify: bool,
    encrypt: bool,
    decrypt: bool,
    derive: bool,
    wrap: bool,
    ec_params: Vec<u8>,
    public_key: [u8; 32],
    secret: Option<SigningKey>,
}

#[derive(Debug)]
struct TokenState {
    initialized: bool,
    pin: Pin,
    slots: Vec<SoftSlot>,
    objects: BTreeMap<u64, StoredObject>,
    open_sessions: BTreeSet<u64>,
    next_handle: u64,
    next_session: u64,
    faults: HashSet<Fault>,
    unsupported: HashSet<AttributeKind>,
    oid_params: bool,
    journal: Journal,
}

impl TokenState {
    fn take_fault(&mut self, fault: Fault) -> bool {
        self.faults.remove(&fault)
    }

    fn slot_mut(&mut self, id: u64) -> Option<&mut SoftSlot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }

    fn logged_in(&self, slot: u64) -> bool {
        self.slots
            .iter()
            .any(|candidate| candidate.id == slot && candidate.logged_in.is_some())
    }
}

/// Simulated provider; see the module docs
#[derive(Debug, Clone)]
pub struct SoftHsm {
    state: Rc<RefCell<TokenState>>,
}

impl SoftHsm {
    /// One slot holding an initialized token protected by `pin`
    pub fn new(pin: Pin) -> Self {
        Self::with_slots(pin, &[true])
    }

    /// One empty slot
    pub fn without_token(pin: Pin) -> Self {
        Self::with_slots(pin, &[false])
    }

    /// One slot per entry, `true` meaning a token is present
    pub fn with_slots(pin: Pin, tokens: &[bool]) -> Self {
        let slots = tokens
            .iter()
            .enumerate()
            .map(|(position, token_present)| SoftSlot {
                id: 0x100 + position as u64,
                token_present: *token_present,
                logged_in: None,
            })
            .collect();
        Self {
            state: Rc::new(RefCell::new(TokenState {
                initialized: false,
                pin,
                slots,
                objects: BTreeMap::new(),
                open_sessions: BTreeSet::new(),
                next_handle: 1,
                next_session: 1,
                faults: HashSet::new(),
                unsupported: HashSet::new(),
                oid_params: false,
                journal: Journal::default(),
            })),
        }
    }

    /// Make the next call of this kind fail
    pub fn inject_fault(&self, fault: Fault) {
        self.state.borrow_mut().faults.insert(fault);
    }

    /// Report `attribute` as unsupported on every object
    pub fn mark_unsupported(&self, attribute: AttributeKind) {
        self.state.borrow_mut().unsupported.insert(attribute);
    }

    /// Store `CKA_EC_PARAMS` of new keys as the RFC 8410 OID
    pub fn store_oid_params(&self) {
        self.state.borrow_mut().oid_params = true;
    }

    pub fn journal(&self) -> Journal {
        self.state.borrow().journal
    }

    pub fn object_count(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.borrow().open_sessions.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }
}

impl Provider for SoftHsm {
    type Session = SoftSession;

    fn initialize(&mut self) -> EdhsmResult<()> {
        let mut state = self.state.borrow_mut();
        if state.initialized {
            return Err(DeviceError::AlreadyInitialized.into());
        }
        state.initialized = true;
        Ok(())
    }

    fn finalize(&mut self) -> EdhsmResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.initialized {
            return Err(DeviceError::NotInitialized.into());
        }
        state.initialized = false;
        state.open_sessions.clear();
        for slot in &mut state.slots {
            slot.logged_in = None;
        }
        Ok(())
    }

    fn slots(&self, token_present_only: bool) -> EdhsmResult<Vec<SlotInfo>> {
        let state = self.state.borrow();
        if !state.initialized {
            return Err(DeviceError::NotInitialized.into());
        }
        Ok(state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.token_present || !token_present_only)
            .map(|(index, slot)| {
                SlotInfo::new(
                    index,
                    slot.id,
                    slot.token_present,
                    format!("Simulated slot {:#x}", slot.id),
                )
            })
            .collect())
    }

    fn open_session(&self, slot: &SlotInfo, mode: SessionMode) -> EdhsmResult<SoftSession> {
        let mut state = self.state.borrow_mut();
        let open_error = |reason: &str| -> EdhsmError {
            SessionError::Open {
                slot: slot.id,
                reason: reason.to_string(),
            }
            .into()
        };

        if !state.initialized {
            return Err(DeviceError::NotInitialized.into());
        }
        state.journal.sessions_opened += 1;
        if state.take_fault(Fault::OpenSession) {
            return Err(open_error("CKR_SESSION_COUNT"));
        }
        if !mode.serial {
            return Err(open_error("CKR_SESSION_PARALLEL_NOT_SUPPORTED"));
        }
        let present = match state.slot_mut(slot.id) {
            Some(found) => found.token_present,
            None => return Err(open_error("CKR_SLOT_ID_INVALID")),
        };
        if !present {
            return Err(open_error("CKR_TOKEN_NOT_PRESENT"));
        }

        let handle = state.next_session;
        state.next_session += 1;
        state.open_sessions.insert(handle);
        debug!("Simulated session {} opened on slot {:#x}", handle, slot.id);

        Ok(SoftSession {
            state: Rc::clone(&self.state),
            handle,
            slot: slot.id,
            read_write: mode.read_write,
            closed: false,
        })
    }
}

/// Session on a [`SoftHsm`] slot
#[derive(Debug)]
pub struct SoftSession {
    state: Rc<RefCell<TokenState>>,
    handle: u64,
    slot: u64,
    read_write: bool,
    closed: bool,
}

impl SoftSession {
    fn ensure_open(&self) -> EdhsmResult<()> {
        if self.closed {
            Err(SessionError::Closed.into())
        } else {
            Ok(())
        }
    }
}

fn generation_error(reason: &str) -> EdhsmError {
    KeyManagementError::Generation {
        reason: reason.to_string(),
    }
    .into()
}

fn signing_error(reason: &str) -> EdhsmError {
    CryptoError::Signing {
        reason: reason.to_string(),
    }
    .into()
}

fn verification_error(reason: &str) -> EdhsmError {
    CryptoError::VerificationOperation {
        reason: reason.to_string(),
    }
    .into()
}

impl TokenSession for SoftSession {
    type Handle = SoftObject;

    fn login(&mut self, user_type: UserType, pin: &Pin) -> EdhsmResult<()> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        state.journal.logins += 1;
        if state.take_fault(Fault::Login) {
            return Err(SessionError::Authentication {
                reason: "CKR_DEVICE_ERROR".to_string(),
            }
            .into());
        }
        if state.logged_in(self.slot) {
            return Err(SessionError::AlreadyLoggedIn.into());
        }
        if pin.as_bytes() != state.pin.as_bytes() {
            return Err(SessionError::Authentication {
                reason: "CKR_PIN_INCORRECT".to_string(),
            }
            .into());
        }
        if let Some(slot) = state.slot_mut(self.slot) {
            slot.logged_in = Some(user_type);
        }
        Ok(())
    }

    fn logout(&mut self) -> EdhsmResult<()> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        state.journal.logouts += 1;
        if state.take_fault(Fault::Logout) {
            return Err(SessionError::Release {
                reason: "CKR_DEVICE_ERROR".to_string(),
            }
            .into());
        }
        match state.slot_mut(self.slot) {
            Some(slot) if slot.logged_in.is_some() => {
                slot.logged_in = None;
                Ok(())
            }
            _ => Err(SessionError::NotLoggedIn.into()),
        }
    }

    fn close(&mut self) -> EdhsmResult<()> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        state.journal.closes += 1;
        let failed = state.take_fault(Fault::Close);
        // A failed C_CloseSession still invalidates the handle.
        self.closed = true;
        state.open_sessions.remove(&self.handle);
        // Closing the last session logs the application out of the token.
        if state.open_sessions.is_empty() {
            if let Some(slot) = state.slot_mut(self.slot) {
                slot.logged_in = None;
            }
        }
        if failed {
            return Err(SessionError::Release {
                reason: "CKR_DEVICE_ERROR".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn find_objects(&self, class: ObjectClass, id: &KeyId) -> EdhsmResult<Vec<SoftObject>> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        if state.take_fault(Fault::FindObjects) {
            return Err(KeyManagementError::Search {
                reason: "CKR_DEVICE_ERROR".to_string(),
            }
            .into());
        }
        let logged_in = state.logged_in(self.slot);
        Ok(state
            .objects
            .iter()
            .filter(|(_, object)| {
                object.slot == self.slot
                    && object.class == class
                    && &object.id == id
                    && (logged_in || !object.private)
            })
            .map(|(handle, _)| SoftObject(*handle))
            .collect())
    }

    fn read_attribute(
        &self,
        object: SoftObject,
        attribute: AttributeKind,
    ) -> EdhsmResult<AttributeRead> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        if state.take_fault(Fault::ReadAttribute) {
            return Err(KeyManagementError::AttributeRead {
                attribute: attribute.to_string(),
                reason: "CKR_DEVICE_ERROR".to_string(),
            }
            .into());
        }
        if state.unsupported.contains(&attribute) {
            return Ok(AttributeRead::Unsupported);
        }
        let stored = state.objects.get(&object.0).ok_or_else(|| {
            EdhsmError::from(KeyManagementError::AttributeRead {
                attribute: attribute.to_string(),
                reason: "CKR_OBJECT_HANDLE_INVALID".to_string(),
            })
        })?;

        let public = stored.class == ObjectClass::PublicKey;
        let value = match attribute {
            AttributeKind::Label => AttributeValue::Bytes(stored.label.as_bytes().to_vec()),
            AttributeKind::Id => AttributeValue::Bytes(stored.id.as_bytes().to_vec()),
            AttributeKind::KeyType => AttributeValue::KeyType(stored.key_type),
            AttributeKind::EcParams => AttributeValue::Bytes(stored.ec_params.clone()),
            AttributeKind::EcPoint if public => {
                AttributeValue::Bytes(encode_ec_point(&stored.public_key))
            }
            AttributeKind::Token => AttributeValue::Bool(stored.token),
            AttributeKind::Private => AttributeValue::Bool(stored.private),
            AttributeKind::Modifiable => AttributeValue::Bool(stored.modifiable),
            AttributeKind::Sensitive if !public => AttributeValue::Bool(stored.sensitive),
            AttributeKind::Extractable if !public => AttributeValue::Bool(stored.extractable),
            AttributeKind::Sign if !public => AttributeValue::Bool(stored.sign),
            AttributeKind::Decrypt if !public => AttributeValue::Bool(stored.decrypt),
            AttributeKind::Verify if public => AttributeValue::Bool(stored.verify),
            AttributeKind::Encrypt if public => AttributeValue::Bool(stored.encrypt),
            AttributeKind::Wrap if public => AttributeValue::Bool(stored.wrap),
            AttributeKind::Derive => AttributeValue::Bool(stored.derive),
            // CKR_ATTRIBUTE_TYPE_INVALID for this class
            _ => return Ok(AttributeRead::Unsupported),
        };
        Ok(AttributeRead::Value(value))
    }

    fn generate_key_pair(
        &mut self,
        mechanism: MechanismId,
        template: &KeyPairTemplate,
    ) -> EdhsmResult<(SoftObject, SoftObject)> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        if state.take_fault(Fault::GenerateKeyPair) {
            return Err(generation_error("CKR_DEVICE_ERROR"));
        }
        if !state.logged_in(self.slot) {
            return Err(generation_error("CKR_USER_NOT_LOGGED_IN"));
        }
        if !self.read_write && (template.public.token || template.private.token) {
            return Err(generation_error("CKR_SESSION_READ_ONLY"));
        }
        if mechanism != MechanismId::EC_EDWARDS_KEY_PAIR_GEN {
            return Err(generation_error("CKR_MECHANISM_INVALID"));
        }
        if template.public.key_type != KeyTypeId::EC_EDWARDS
            || template.private.key_type != KeyTypeId::EC_EDWARDS
        {
            return Err(generation_error("CKR_TEMPLATE_INCONSISTENT"));
        }
        if template.private.sensitive && template.private.extractable {
            return Err(generation_error("CKR_TEMPLATE_INCONSISTENT"));
        }

        let mut secret = [0u8; 32];
        rng().fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);
        let public_key = signing_key.verifying_key().to_bytes();
        let ec_params = if state.oid_params {
            ED25519_OID.to_vec()
        } else {
            template.public.curve.params().to_vec()
        };

        let public = StoredObject {
            slot: self.slot,
            class: ObjectClass::PublicKey,
            key_type: template.public.key_type,
            id: template.public.id.clone(),
            label: template.public.label.clone(),
            token: template.public.token,
            private: template.public.private,
            modifiable: template.public.modifiable,
            sensitive: false,
            extractable: true,
            sign: false,
            verify: template.public.verify,
            encrypt: template.public.encrypt,
            decrypt: false,
            derive: template.public.derive,
            wrap: template.public.wrap,
            ec_params: ec_params.clone(),
            public_key,
            secret: None,
        };
        let private = StoredObject {
            slot: self.slot,
            class: ObjectClass::PrivateKey,
            key_type: template.private.key_type,
            id: template.private.id.clone(),
            label: template.private.label.clone(),
            token: template.private.token,
            private: template.private.private,
            modifiable: template.private.modifiable,
            sensitive: template.private.sensitive,
            extractable: template.private.extractable,
            sign: template.private.sign,
            verify: false,
            encrypt: false,
            decrypt: template.private.decrypt,
            derive: template.private.derive,
            wrap: false,
            ec_params,
            public_key,
            secret: Some(signing_key),
        };

        let public_handle = state.next_handle;
        let private_handle = public_handle + 1;
        state.next_handle += 2;
        state.objects.insert(public_handle, public);
        state.objects.insert(private_handle, private);
        state.journal.mutations += 1;

        Ok((SoftObject(public_handle), SoftObject(private_handle)))
    }

    fn sign(&self, mechanism: MechanismId, key: SoftObject, data: &[u8]) -> EdhsmResult<Vec<u8>> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        state.journal.signs += 1;
        if state.take_fault(Fault::Sign) {
            return Err(signing_error("CKR_DEVICE_ERROR"));
        }
        if !state.logged_in(self.slot) {
            return Err(signing_error("CKR_USER_NOT_LOGGED_IN"));
        }
        let stored = state
            .objects
            .get(&key.0)
            .ok_or_else(|| signing_error("CKR_KEY_HANDLE_INVALID"))?;
        if mechanism != MechanismId::EDDSA {
            return Err(signing_error("CKR_MECHANISM_INVALID"));
        }
        let secret = match (&stored.secret, stored.class) {
            (Some(secret), ObjectClass::PrivateKey) => secret,
            _ => return Err(signing_error("CKR_KEY_TYPE_INCONSISTENT")),
        };
        if !stored.sign {
            return Err(signing_error("CKR_KEY_FUNCTION_NOT_PERMITTED"));
        }
        Ok(secret.sign(data).to_bytes().to_vec())
    }

    fn verify(
        &self,
        mechanism: MechanismId,
        key: SoftObject,
        data: &[u8],
        signature: &[u8],
    ) -> EdhsmResult<bool> {
        self.ensure_open()?;
        let mut state = self.state.borrow_mut();
        state.journal.verifies += 1;
        if state.take_fault(Fault::Verify) {
            return Err(verification_error("CKR_DEVICE_ERROR"));
        }
        let stored = state
            .objects
            .get(&key.0)
            .ok_or_else(|| verification_error("CKR_KEY_HANDLE_INVALID"))?;
        if mechanism != MechanismId::EDDSA {
            return Err(verification_error("CKR_MECHANISM_INVALID"));
        }
        if stored.class != ObjectClass::PublicKey {
            return Err(verification_error("CKR_KEY_TYPE_INCONSISTENT"));
        }
        if !stored.verify {
            return Err(verification_error("CKR_KEY_FUNCTION_NOT_PERMITTED"));
        }
        let verifying_key = VerifyingKey::from_bytes(&stored.public_key)
            .map_err(|e| verification_error(&e.to_string()))?;
        // CKR_SIGNATURE_LEN_RANGE and CKR_SIGNATURE_INVALID both mean "no match".
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(verifying_key.verify_strict(data, &signature).is_ok())
    }
}
