mod access;
mod config;
mod curve;
mod key_id;
mod mechanism;
mod object;
mod pin;
mod signature;
mod slot;
mod template;

pub use access::{SessionMode, UserType};
pub use config::{
    KeySource, SignerConfig, DEFAULT_KEYGEN_MECHANISM, DEFAULT_MODULE_LABEL, DEFAULT_MODULE_PATH,
    DEFAULT_SIGNING_MECHANISM,
};
pub use curve::{decode_ec_point, encode_ec_point, EdwardsCurve, ED25519_OID, EDWARDS25519_NAMED_CURVE};
pub use key_id::{KeyId, KeyIdError};
pub use mechanism::{
    KeyTypeId, MechanismDescriptor, MechanismId, CKK_EC_EDWARDS, CKM_EC_EDWARDS_KEY_PAIR_GEN,
    CKM_EDDSA,
};
pub use object::{
    AttributeKind, AttributeRead, AttributeValue, KeyDetails, KeyPair, ObjectClass,
    ProtectionFlags, UsageFlags,
};
pub use pin::{Pin, PinError};
pub use signature::Signature;
pub use slot::SlotInfo;
pub use template::{
    KeyPairTemplate, PrivateKeyTemplate, PublicKeyTemplate, TemplateError,
    DEFAULT_PRIVATE_LABEL, DEFAULT_PUBLIC_LABEL,
};
