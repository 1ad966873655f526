//! Token objects and their attributes

use std::fmt;

use super::{curve, EdwardsCurve, KeyId, KeyTypeId};

/// Object classes this crate searches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    PublicKey,
    PrivateKey,
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectClass::PublicKey => f.write_str("public key"),
            ObjectClass::PrivateKey => f.write_str("private key"),
        }
    }
}

/// Handles of a correlated public/private key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair<H> {
    pub id: KeyId,
    pub public: H,
    pub private: H,
}

/// Attributes that can be read back from a key object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Label,
    Id,
    KeyType,
    EcParams,
    EcPoint,
    Token,
    Private,
    Modifiable,
    Sensitive,
    Extractable,
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    Derive,
    Wrap,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::Label => "CKA_LABEL",
            AttributeKind::Id => "CKA_ID",
            AttributeKind::KeyType => "CKA_KEY_TYPE",
            AttributeKind::EcParams => "CKA_EC_PARAMS",
            AttributeKind::EcPoint => "CKA_EC_POINT",
            AttributeKind::Token => "CKA_TOKEN",
            AttributeKind::Private => "CKA_PRIVATE",
            AttributeKind::Modifiable => "CKA_MODIFIABLE",
            AttributeKind::Sensitive => "CKA_SENSITIVE",
            AttributeKind::Extractable => "CKA_EXTRACTABLE",
            AttributeKind::Sign => "CKA_SIGN",
            AttributeKind::Verify => "CKA_VERIFY",
            AttributeKind::Encrypt => "CKA_ENCRYPT",
            AttributeKind::Decrypt => "CKA_DECRYPT",
            AttributeKind::Derive => "CKA_DERIVE",
            AttributeKind::Wrap => "CKA_WRAP",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Bytes(Vec<u8>),
    Bool(bool),
    KeyType(KeyTypeId),
}

/// Outcome of reading one attribute
///
/// Providers differ in what they will return: sensitive values, attributes
/// the object class does not define, or attributes the module never
/// implemented all come back as `Unsupported` rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRead {
    Value(AttributeValue),
    Unsupported,
}

impl AttributeRead {
    pub fn bytes(self) -> Option<Vec<u8>> {
        match self {
            AttributeRead::Value(AttributeValue::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self {
            AttributeRead::Value(AttributeValue::Bool(flag)) => Some(*flag),
            _ => None,
        }
    }

    pub fn key_type(&self) -> Option<KeyTypeId> {
        match self {
            AttributeRead::Value(AttributeValue::KeyType(key_type)) => Some(*key_type),
            _ => None,
        }
    }
}

/// Usage flags as stored on the token; `None` when unreadable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageFlags {
    pub sign: Option<bool>,
    pub verify: Option<bool>,
    pub encrypt: Option<bool>,
    pub decrypt: Option<bool>,
    pub derive: Option<bool>,
}

/// Protection flags as stored on the token; `None` when unreadable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectionFlags {
    pub token: Option<bool>,
    pub private: Option<bool>,
    pub modifiable: Option<bool>,
    pub sensitive: Option<bool>,
    pub extractable: Option<bool>,
}

/// Everything that could be read back about one key object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDetails {
    pub class: ObjectClass,
    pub label: Option<String>,
    pub id: Option<KeyId>,
    pub key_type: Option<KeyTypeId>,
    /// Curve named by `CKA_EC_PARAMS`, in either encoding
    pub curve: Option<EdwardsCurve>,
    pub usage: UsageFlags,
    pub protection: ProtectionFlags,
    /// Raw Ed25519 public key, public objects only
    pub public_key: Option<[u8; 32]>,
}

impl KeyDetails {
    pub fn empty(class: ObjectClass) -> Self {
        Self {
            class,
            label: None,
            id: None,
            key_type: None,
            curve: None,
            usage: UsageFlags::default(),
            protection: ProtectionFlags::default(),
            public_key: None,
        }
    }

    pub fn public_key_hex(&self) -> Option<String> {
        self.public_key.map(hex::encode)
    }

    pub(crate) fn set_public_key_from_point(&mut self, point: &[u8]) {
        self.public_key = curve::decode_ec_point(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_class_display() {
        assert_eq!(ObjectClass::PublicKey.to_string(), "public key");
        assert_eq!(ObjectClass::PrivateKey.to_string(), "private key");
    }

    #[test]
    fn test_attribute_read_accessors() {
        assert_eq!(
            AttributeRead::Value(AttributeValue::Bytes(vec![1])).bytes(),
            Some(vec![1])
        );
        assert_eq!(AttributeRead::Value(AttributeValue::Bool(true)).flag(), Some(true));
        assert_eq!(AttributeRead::Unsupported.flag(), None);
        assert_eq!(AttributeRead::Unsupported.bytes(), None);
        assert_eq!(
            AttributeRead::Value(AttributeValue::KeyType(KeyTypeId::EC_EDWARDS)).key_type(),
            Some(KeyTypeId::EC_EDWARDS)
        );
    }

    #[test]
    fn test_public_key_hex() {
        let mut details = KeyDetails::empty(ObjectClass::PublicKey);
        assert_eq!(details.public_key_hex(), None);
        details.set_public_key_from_point(&curve::encode_ec_point(&[0xab; 32]));
        assert_eq!(details.public_key_hex(), Some("ab".repeat(32)));
    }
}
