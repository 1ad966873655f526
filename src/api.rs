//! One-call entry points against a real PKCS#11 module

use crate::adapters::CryptokiProvider;
use crate::error::EdhsmResult;
use crate::use_cases::{
    generate_key as generate_key_use_case, inspect_key as inspect_key_use_case,
    sign_with_provider, with_device, GeneratedKey, KeyPairDetails, SigningReport,
};

pub use crate::model::*;

/// Sign `message` using the module, slot and key described by `config`
pub fn sign_payload(config: &SignerConfig, message: &[u8]) -> EdhsmResult<SigningReport> {
    let provider = CryptokiProvider::load(&config.module_path)?;
    sign_with_provider(provider, config, message)
}

/// Generate a key pair under `config.key_id`
pub fn generate_key(config: &SignerConfig) -> EdhsmResult<GeneratedKey> {
    let provider = CryptokiProvider::load(&config.module_path)?;
    with_device(provider, &config.module_label, |device, registry| {
        generate_key_use_case(device, registry, config)
    })
}

/// Read back the pair stored under `config.key_id`
pub fn inspect_key(config: &SignerConfig) -> EdhsmResult<KeyPairDetails> {
    let provider = CryptokiProvider::load(&config.module_path)?;
    with_device(provider, &config.module_label, |device, _| {
        inspect_key_use_case(device, config)
    })
}

/// Slots of the module, optionally only those holding a token
pub fn list_slots(config: &SignerConfig, token_present_only: bool) -> EdhsmResult<Vec<SlotInfo>> {
    let provider = CryptokiProvider::load(&config.module_path)?;
    with_device(provider, &config.module_label, |device, _| {
        device.list_slots(token_present_only)
    })
}
