//! Mechanism and key type identifiers understood by the token

use std::fmt;

/// `CKK_EC_EDWARDS`
pub const CKK_EC_EDWARDS: u64 = 0x40;

/// `CKM_EC_EDWARDS_KEY_PAIR_GEN`
pub const CKM_EC_EDWARDS_KEY_PAIR_GEN: u64 = 0x1055;

/// `CKM_EDDSA`
pub const CKM_EDDSA: u64 = 0x1057;

/// Numeric PKCS#11 mechanism identifier (`CK_MECHANISM_TYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MechanismId(pub u64);

impl MechanismId {
    pub const EC_EDWARDS_KEY_PAIR_GEN: Self = Self(CKM_EC_EDWARDS_KEY_PAIR_GEN);
    pub const EDDSA: Self = Self(CKM_EDDSA);

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MechanismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Numeric PKCS#11 key type (`CK_KEY_TYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyTypeId(pub u64);

impl KeyTypeId {
    pub const EC_EDWARDS: Self = Self(CKK_EC_EDWARDS);
}

/// A named mechanism as held by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MechanismDescriptor {
    pub name: String,
    pub id: MechanismId,
}

impl MechanismDescriptor {
    pub fn new(name: impl Into<String>, id: MechanismId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for MechanismDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
