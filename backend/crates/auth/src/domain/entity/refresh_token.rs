//! Refresh Token Entity
//!
//! One row per issued refresh token. Only the SHA-256 of the raw token is
//! stored. A row moves one way from active to revoked; expiry is derived
//! from the clock.

use chrono::{DateTime, Utc};

use crate::domain::value_object::{device_id::DeviceId, user_id::UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: UserId,
    pub device_id: DeviceId,
    /// Lower-case hex SHA-256 of the raw token
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_in: Duration, revoked: bool) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            id: 1,
            user_id: UserId::new(1),
            device_id: DeviceId::from_db("d1"),
            token_hash: "h".to_string(),
            expires_at: now + expires_in,
            revoked_at: revoked.then_some(now),
            created_at: now,
        }
    }

    #[test]
    fn test_active_state() {
        let now = Utc::now();
        assert!(token(Duration::hours(1), false).is_active(now));
        assert!(!token(Duration::hours(1), true).is_active(now));
        assert!(!token(Duration::hours(-1), false).is_active(now));
    }
}
