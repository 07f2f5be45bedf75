//! User Entity

use chrono::{DateTime, Utc};

use crate::domain::value_object::{email::Email, user_id::UserId, user_name::Username};

/// Account row
///
/// `verified_at` is set exactly when `verified` is true. `version` is bumped
/// by every update for optimistic concurrency.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub username: Username,
    pub password_hash: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to insert a user; the store assigns id and timestamps
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub username: Username,
    pub password_hash: String,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.verified && self.verified_at.is_some()
    }
}
