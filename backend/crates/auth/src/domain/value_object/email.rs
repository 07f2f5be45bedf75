//! Email Value Object
//!
//! Validated, lower-cased email address. Lower-casing on construction makes
//! the unique index on `users.email` case-insensitive. Ownership of the
//! address is proven separately by the verify-email flow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RFC 5321 path limit
pub const EMAIL_MAX_LENGTH: usize = 254;

/// RFC 5321 local-part limit
const LOCAL_PART_MAX_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    Empty,
    TooLong { length: usize, max: usize },
    /// Not of the form `local@domain.tld`
    InvalidFormat,
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Email cannot be empty"),
            Self::TooLong { length, max } => {
                write!(f, "Email is too long ({length} chars, maximum {max})")
            }
            Self::InvalidFormat => write!(f, "Invalid email format"),
        }
    }
}

impl std::error::Error for EmailError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EmailError> {
        let email = raw.as_ref().trim().to_lowercase();

        if email.is_empty() {
            return Err(EmailError::Empty);
        }
        let length = email.chars().count();
        if length > EMAIL_MAX_LENGTH {
            return Err(EmailError::TooLong {
                length,
                max: EMAIL_MAX_LENGTH,
            });
        }

        let (local, domain) = email.split_once('@').ok_or(EmailError::InvalidFormat)?;
        if !valid_local(local) || !valid_domain(domain) {
            return Err(EmailError::InvalidFormat);
        }

        Ok(Self(email))
    }

    /// Wrap a value read back from `users.email`
    pub fn from_db(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn valid_local(local: &str) -> bool {
    !local.is_empty()
        && local.len() <= LOCAL_PART_MAX_LENGTH
        && !local.chars().any(|c| c.is_whitespace() || c == '@')
}

fn valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::new(value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Email::new(s)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_valid() {
        assert!(Email::new("a@x.io").is_ok());
        assert!(Email::new("user.name+tag@example.co.jp").is_ok());
    }

    #[test]
    fn test_email_invalid() {
        assert_eq!(Email::new("  ").unwrap_err(), EmailError::Empty);
        for bad in [
            "userexample.com",
            "user@",
            "@example.com",
            "user@@example.com",
            "user@example",
            "user@-example.com",
            "user@exa..mple.com",
            "us er@example.com",
        ] {
            assert_eq!(Email::new(bad).unwrap_err(), EmailError::InvalidFormat, "{bad}");
        }
        assert!(matches!(
            Email::new(format!("{}@x.io", "a".repeat(260))).unwrap_err(),
            EmailError::TooLong { .. }
        ));
    }

    #[test]
    fn test_email_is_lower_cased() {
        let email = Email::new(" A@X.io ").unwrap();
        assert_eq!(email.as_str(), "a@x.io");
    }

    #[test]
    fn test_email_serde() {
        let email = Email::new("a@x.io").unwrap();
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"a@x.io\"");
        assert!(serde_json::from_str::<Email>("\"nope\"").is_err());
    }
}
