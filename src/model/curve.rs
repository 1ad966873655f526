//! Named curve parameters (`CKA_EC_PARAMS`) for Edwards keys

/// `PrintableString "edwards25519"`, the encoding SoftHSM2 accepts for Ed25519
pub const EDWARDS25519_NAMED_CURVE: [u8; 14] = [
    0x13, 0x0c, 0x65, 0x64, 0x77, 0x61, 0x72, 0x64, 0x73, 0x32, 0x35, 0x35, 0x31, 0x39,
];

/// `OBJECT IDENTIFIER 1.3.101.112` (RFC 8410)
pub const ED25519_OID: [u8; 5] = [0x06, 0x03, 0x2b, 0x65, 0x70];

/// Edwards curves this crate knows how to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EdwardsCurve {
    #[default]
    Ed25519,
}

impl EdwardsCurve {
    /// Encoding placed in generation templates
    pub fn params(self) -> &'static [u8] {
        match self {
            EdwardsCurve::Ed25519 => &EDWARDS25519_NAMED_CURVE,
        }
    }

    /// Recognize either the named-curve or the OID encoding
    pub fn from_params(params: &[u8]) -> Option<Self> {
        if params == EDWARDS25519_NAMED_CURVE || params == ED25519_OID {
            Some(EdwardsCurve::Ed25519)
        } else {
            None
        }
    }
}

/// Strip the DER `OCTET STRING` wrapper some tokens put around `CKA_EC_POINT`
pub fn decode_ec_point(point: &[u8]) -> Option<[u8; 32]> {
    let raw = match point {
        [0x04, 0x20, rest @ ..] if rest.len() == 32 => rest,
        raw if raw.len() == 32 => raw,
        _ => return None,
    };
    raw.try_into().ok()
}

/// DER `OCTET STRING` encoding of a raw Ed25519 public key
pub fn encode_ec_point(public_key: &[u8; 32]) -> Vec<u8> {
    let mut point = Vec::with_capacity(34);
    point.extend_from_slice(&[0x04, 0x20]);
    point.extend_from_slice(public_key);
    point
}
