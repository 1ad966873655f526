//! Use cases (orchestration)
//!
//! This module contains use cases that orchestrate a full run across the
//! device, session, provisioner and signing components.

mod generate_key;
mod inspect_key;
mod sign_payload;

pub use generate_key::{generate_key, GeneratedKey};
pub use inspect_key::{inspect_key, KeyPairDetails};
pub use sign_payload::{sign_payload, sign_with_provider, with_device, SignRequest, SigningReport};

use crate::device::Device;
use crate::error::EdhsmResult;
use crate::model::{Pin, SessionMode, UserType};
use crate::ports::Provider;
use crate::session::AuthenticatedSession;

/// Select the slot, insist on a token and log in on a read-write session
fn open_authenticated<'d, P: Provider>(
    device: &'d Device<P>,
    slot_index: usize,
    pin: &Pin,
    user_type: UserType,
) -> EdhsmResult<AuthenticatedSession<'d, P::Session>> {
    let slot = device.select_slot(slot_index)?;
    device.require_token(&slot)?;
    device
        .open_session(&slot, SessionMode::read_write())?
        .authenticate(pin, user_type)
}
