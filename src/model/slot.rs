use std::fmt;

/// A slot as reported by the provider at enumeration time
///
/// Slots are read-only snapshots; enumerate again to observe token
/// insertion or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Position in the provider's slot list
    pub index: usize,
    /// Provider-assigned slot identifier
    pub id: u64,
    /// `CKF_TOKEN_PRESENT`
    pub token_present: bool,
    pub description: String,
}

impl SlotInfo {
    pub fn new(index: usize, id: u64, token_present: bool, description: impl Into<String>) -> Self {
        Self {
            index,
            id,
            token_present,
            description: description.into(),
        }
    }
}

impl fmt::Display for SlotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} id={} token={} {}",
            self.index,
            self.id,
            if self.token_present { "present" } else { "absent" },
            self.description.trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        let slot = SlotInfo::new(0, 1234, true, "SoftHSM slot ID 0x4d2   ");
        assert_eq!(slot.to_string(), "#0 id=1234 token=present SoftHSM slot ID 0x4d2");
    }

    #[test]
    fn test_slot_without_token_display() {
        let slot = SlotInfo::new(2, 7, false, "");
        assert!(slot.to_string().contains("token=absent"));
    }
}
