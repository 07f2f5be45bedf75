//! Username Value Object
//!
//! Public handle of an account, unique across users.
//!
//! ## Rules
//! - NFKC normalization, trim, then lower-case (canonical form)
//! - 1 to 30 characters
//! - ASCII letters, digits and `_ . -` only
//! - no whitespace

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

pub const USERNAME_MAX_LENGTH: usize = 30;

const ALLOWED_SPECIAL_CHARS: &[char] = &['_', '.', '-'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    Empty,
    TooLong { length: usize, max: usize },
    InvalidCharacter { char: char, position: usize },
}

impl fmt::Display for UsernameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Username cannot be empty"),
            Self::TooLong { length, max } => {
                write!(f, "Username is too long ({length} chars, maximum {max})")
            }
            Self::InvalidCharacter { char, position } => write!(
                f,
                "Invalid character '{char}' at position {position}. Only a-z, 0-9, _, ., - are allowed"
            ),
        }
    }
}

impl std::error::Error for UsernameError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn new(input: impl AsRef<str>) -> Result<Self, UsernameError> {
        let canonical = input
            .as_ref()
            .nfkc()
            .collect::<String>()
            .trim()
            .to_lowercase();

        if canonical.is_empty() {
            return Err(UsernameError::Empty);
        }

        let length = canonical.chars().count();
        if length > USERNAME_MAX_LENGTH {
            return Err(UsernameError::TooLong {
                length,
                max: USERNAME_MAX_LENGTH,
            });
        }

        if let Some((position, char)) = canonical
            .chars()
            .enumerate()
            .find(|(_, c)| !Self::is_valid_char(*c))
        {
            return Err(UsernameError::InvalidCharacter { char, position });
        }

        Ok(Self(canonical))
    }

    /// Wrap a value read back from `users.username`
    pub fn from_db(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    fn is_valid_char(c: char) -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || ALLOWED_SPECIAL_CHARS.contains(&c)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Username::new(value)
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_valid() {
        assert_eq!(Username::new("a").unwrap().as_str(), "a");
        assert_eq!(Username::new(" Alice_01 ").unwrap().as_str(), "alice_01");
        // fullwidth input folds to ASCII under NFKC
        assert_eq!(Username::new("ｂｏｂ").unwrap().as_str(), "bob");
    }

    #[test]
    fn test_username_invalid() {
        assert_eq!(Username::new("").unwrap_err(), UsernameError::Empty);
        assert!(matches!(
            Username::new("a".repeat(USERNAME_MAX_LENGTH + 1)).unwrap_err(),
            UsernameError::TooLong { .. }
        ));
        assert_eq!(
            Username::new("a b").unwrap_err(),
            UsernameError::InvalidCharacter {
                char: ' ',
                position: 1
            }
        );
        assert!(Username::new("名前").is_err());
    }
}
