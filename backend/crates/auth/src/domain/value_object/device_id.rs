//! Device identifier
//!
//! Opaque, client-supplied string naming the origin of a session. Only
//! bounds are checked: non-empty after trimming, at most 128 characters,
//! no control characters.

use kernel::error::app_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEVICE_ID_MAX_LENGTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> AppResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(AppError::bad_request("Device id cannot be empty"));
        }
        if trimmed.chars().count() > DEVICE_ID_MAX_LENGTH {
            return Err(AppError::bad_request(format!(
                "Device id must be at most {} characters",
                DEVICE_ID_MAX_LENGTH
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(AppError::bad_request("Device id contains control characters"));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Create from a stored value or a verified token claim
    pub fn from_db(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_bounds() {
        assert_eq!(DeviceId::new(" d1 ").unwrap().as_str(), "d1");
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("   ").is_err());
        assert!(DeviceId::new("a".repeat(DEVICE_ID_MAX_LENGTH + 1)).is_err());
        assert!(DeviceId::new("d\u{0000}1").is_err());
    }
}
