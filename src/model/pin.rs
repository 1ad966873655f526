use std::fmt;
use thiserror::Error;

/// User or security officer PIN presented at login
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(Vec<u8>);

impl Pin {
    pub const DEFAULT: &'static [u8] = b"1234";

    pub const MIN_LENGTH: usize = 4;

    pub const MAX_LENGTH: usize = 255;

    pub fn new(pin: Vec<u8>) -> Result<Self, PinError> {
        if pin.len() < Self::MIN_LENGTH {
            return Err(PinError::TooShort);
        }
        if pin.len() > Self::MAX_LENGTH {
            return Err(PinError::TooLong);
        }
        if std::str::from_utf8(&pin).is_err() {
            return Err(PinError::NotUtf8);
        }
        Ok(Self(pin))
    }

    pub fn from_str(pin: &str) -> Result<Self, PinError> {
        Self::new(pin.as_bytes().to_vec())
    }

    pub fn default() -> Self {
        Self(Self::DEFAULT.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// PIN as text; construction guarantees UTF-8.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin([REDACTED])")
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be at least {min} characters", min = Pin::MIN_LENGTH)]
    TooShort,

    #[error("PIN must be at most {max} characters", max = Pin::MAX_LENGTH)]
    TooLong,

    #[error("PIN must be valid UTF-8")]
    NotUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_valid() {
        assert!(Pin::from_str("1234").is_ok());
        assert!(Pin::from_str("12345678").is_ok());
    }

    #[test]
    fn test_pin_too_short() {
        assert_eq!(Pin::from_str("123").unwrap_err(), PinError::TooShort);
    }

    #[test]
    fn test_pin_too_long() {
        assert_eq!(Pin::from_str(&"1".repeat(256)).unwrap_err(), PinError::TooLong);
    }

    #[test]
    fn test_pin_not_utf8() {
        assert_eq!(
            Pin::new(vec![0xff, 0xfe, 0xfd, 0xfc]).unwrap_err(),
            PinError::NotUtf8
        );
    }

    #[test]
    fn test_pin_default() {
        let pin = Pin::default();
        assert_eq!(pin.as_bytes(), b"1234");
        assert_eq!(pin.as_str(), "1234");
    }

    #[test]
    fn test_pin_debug_redacted() {
        let pin = Pin::default();
        let debug_str = format!("{:?}", pin);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("1234"));
    }
}
