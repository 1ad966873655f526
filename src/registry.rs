//! Mechanism registry
//!
//! Maps symbolic mechanism names to numeric identifiers so that vendor
//! mechanisms missing from a binding's own tables become addressable by
//! name. The registry is an explicit value handed to the components that
//! need it; there is no process-global table.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::MechanismError;
use crate::model::{
    MechanismDescriptor, MechanismId, CKM_EC_EDWARDS_KEY_PAIR_GEN, CKM_EDDSA,
    DEFAULT_KEYGEN_MECHANISM, DEFAULT_SIGNING_MECHANISM,
};

/// Outcome of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// Same name and id were already present; nothing changed
    AlreadyPresent,
}

#[derive(Debug, Clone, Default)]
pub struct MechanismRegistry {
    entries: BTreeMap<String, MechanismId>,
}

impl MechanismRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the Edwards key generation and EdDSA mechanisms
    pub fn with_edwards_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_edwards_defaults();
        registry
    }

    /// Add the Edwards defaults to an existing registry
    ///
    /// A conflicting earlier registration is kept and logged; the run
    /// carries on with it.
    pub fn register_edwards_defaults(&mut self) {
        for (name, id) in Self::edwards_defaults() {
            if let Err(err) = self.register_vendor_mechanism(name, id) {
                warn!("Keeping existing mechanism registration: {}", err);
            }
        }
    }

    /// Mechanisms every signing run registers at startup
    pub fn edwards_defaults() -> [(&'static str, MechanismId); 2] {
        [
            (
                DEFAULT_KEYGEN_MECHANISM,
                MechanismId(CKM_EC_EDWARDS_KEY_PAIR_GEN),
            ),
            (DEFAULT_SIGNING_MECHANISM, MechanismId(CKM_EDDSA)),
        ]
    }

    /// Register `name` as `id`
    ///
    /// Re-registering the same pair is a no-op. A different id for a known
    /// name is refused and the existing mapping stays in place.
    pub fn register_vendor_mechanism(
        &mut self,
        name: &str,
        id: MechanismId,
    ) -> Result<Registration, MechanismError> {
        match self.entries.get(name) {
            Some(existing) if *existing == id => Ok(Registration::AlreadyPresent),
            Some(existing) => Err(MechanismError::Conflict {
                name: name.to_string(),
                registered: existing.value(),
                requested: id.value(),
            }),
            None => {
                self.entries.insert(name.to_string(), id);
                debug!("Registered mechanism {} as {}", name, id);
                Ok(Registration::Added)
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Result<MechanismId, MechanismError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| MechanismError::Unknown {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn descriptors(&self) -> Vec<MechanismDescriptor> {
        self.entries
            .iter()
            .map(|(name, id)| MechanismDescriptor::new(name.clone(), *id))
            .collect()
    }
}
