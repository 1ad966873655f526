//! Session access mode and login role

/// Flags requested when opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionMode {
    /// `CKF_RW_SESSION`
    pub read_write: bool,
    /// `CKF_SERIAL_SESSION`, mandatory for every PKCS#11 session
    pub serial: bool,
}

impl SessionMode {
    /// Read/write serial session, required for key generation
    pub const fn read_write() -> Self {
        Self {
            read_write: true,
            serial: true,
        }
    }

    pub const fn read_only() -> Self {
        Self {
            read_write: false,
            serial: true,
        }
    }
}

impl Default for SessionMode {
    fn default() -> Self {
        Self::read_write()
    }
}

/// Role presented at login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UserType {
    /// Normal user (`CKU_USER`)
    #[default]
    User,
    /// Security officer (`CKU_SO`)
    SecurityOfficer,
    /// Per-operation re-authentication (`CKU_CONTEXT_SPECIFIC`)
    ContextSpecific,
}
