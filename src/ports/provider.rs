//! Provider trait - module lifecycle, slot enumeration and session opening

use super::TokenSession;
use crate::error::EdhsmResult;
use crate::model::{SessionMode, SlotInfo};

/// Capability exposed by a loaded PKCS#11 module
///
/// Implementations are plain adapters: they translate calls to the device
/// and map its failures into [`crate::EdhsmError`]. Lifecycle ordering
/// (initialize once, nothing after finalize) is enforced by
/// [`crate::Device`], which owns the provider.
pub trait Provider {
    /// Session type handed out by this provider
    type Session: TokenSession;

    /// `C_Initialize`
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::AlreadyInitialized` if the module reports it
    fn initialize(&mut self) -> EdhsmResult<()>;

    /// `C_Finalize`
    fn finalize(&mut self) -> EdhsmResult<()>;

    /// `C_GetSlotList`, optionally restricted to slots holding a token
    fn slots(&self, token_present_only: bool) -> EdhsmResult<Vec<SlotInfo>>;

    /// `C_OpenSession`
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Open` if the slot is busy, unknown, has no
    /// token, or the mode is not serial
    fn open_session(&self, slot: &SlotInfo, mode: SessionMode) -> EdhsmResult<Self::Session>;
}
