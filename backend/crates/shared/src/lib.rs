//! Shared Kernel
//!
//! Vocabulary every backend crate agrees on:
//! - `error` - `AppError` and the `ErrorKind` taxonomy HTTP statuses derive from
//! - `event` - bus envelope and the email event payload

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod event;
