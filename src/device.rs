//! Device binding and slot selection
//!
//! [`Device`] is the explicit handle to a loaded provider. It owns the
//! provider for the whole run and enforces the module lifecycle:
//! initialize exactly once, finalize last, nothing in between touches a
//! module that is not initialized.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::adapters::CryptokiProvider;
use crate::error::{DeviceError, EdhsmResult, SessionError};
use crate::model::{SessionMode, SlotInfo};
use crate::ports::Provider;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Loaded,
    Initialized,
    Finalized,
}

/// Handle to a loaded PKCS#11 provider
#[derive(Debug)]
pub struct Device<P: Provider> {
    provider: P,
    label: String,
    lifecycle: Lifecycle,
}

impl Device<CryptokiProvider> {
    /// Load the PKCS#11 module at `provider_path`
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ProviderLoad` if the path does not resolve to a
    /// loadable module
    pub fn load(provider_path: impl AsRef<Path>, label: &str) -> EdhsmResult<Self> {
        let provider = CryptokiProvider::load(provider_path.as_ref())?;
        Ok(Self::with_provider(provider, label))
    }
}

impl<P: Provider> Device<P> {
    /// Wrap an already loaded provider
    pub fn with_provider(provider: P, label: &str) -> Self {
        debug!("Loaded provider {}", label);
        Self {
            provider,
            label: label.to_string(),
            lifecycle: Lifecycle::Loaded,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub fn initialize(&mut self) -> EdhsmResult<()> {
        match self.lifecycle {
            Lifecycle::Loaded => {}
            Lifecycle::Initialized => return Err(DeviceError::AlreadyInitialized.into()),
            Lifecycle::Finalized => return Err(DeviceError::NotInitialized.into()),
        }
        self.provider.initialize()?;
        self.lifecycle = Lifecycle::Initialized;
        info!("Provider {} initialized", self.label);
        Ok(())
    }

    /// Release the module; must be the last call on this device
    ///
    /// Sessions borrow the device, so none can outlive this call.
    pub fn finalize(&mut self) -> EdhsmResult<()> {
        self.ensure_initialized()?;
        self.lifecycle = Lifecycle::Finalized;
        self.provider.finalize()?;
        info!("Provider {} finalized", self.label);
        Ok(())
    }

    pub fn list_slots(&self, token_present_only: bool) -> EdhsmResult<Vec<SlotInfo>> {
        self.ensure_initialized()?;
        let slots = self.provider.slots(token_present_only)?;
        debug!("Found {} slots (token_present_only={})", slots.len(), token_present_only);
        Ok(slots)
    }

    /// Pick a slot by its position among all slots
    ///
    /// The returned slot may have no token; check with [`Self::require_token`].
    pub fn select_slot(&self, index: usize) -> EdhsmResult<SlotInfo> {
        let slots = self.list_slots(false)?;
        let available = slots.len();
        slots
            .into_iter()
            .nth(index)
            .ok_or_else(|| DeviceError::SlotNotFound { index, available }.into())
    }

    /// Fail with the terminal `TokenNotPresent` unless the slot holds a token
    pub fn require_token(&self, slot: &SlotInfo) -> EdhsmResult<()> {
        if slot.token_present {
            Ok(())
        } else {
            warn!("Slot {} has no token", slot.id);
            Err(DeviceError::TokenNotPresent { slot: slot.id }.into())
        }
    }

    /// Open a session against `slot`
    pub fn open_session(
        &self,
        slot: &SlotInfo,
        mode: SessionMode,
    ) -> EdhsmResult<Session<'_, P::Session>> {
        self.ensure_initialized()?;
        if !mode.serial {
            return Err(SessionError::Open {
                slot: slot.id,
                reason: "sessions must be opened with CKF_SERIAL_SESSION".to_string(),
            }
            .into());
        }
        let inner = self.provider.open_session(slot, mode)?;
        debug!("Opened session on slot {} ({:?})", slot.id, mode);
        Ok(Session::new(inner, slot.clone(), mode))
    }

    fn ensure_initialized(&self) -> EdhsmResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(DeviceError::NotInitialized.into())
        }
    }
}
