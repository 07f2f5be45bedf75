//! Platform - technical foundations shared by the backend crates
//!
//! - `crypto` - SHA-256 helpers and opaque tokens
//! - `password` - credential hashing (SHA-256 pre-hash + bcrypt)
//! - `cache` - ephemeral key/value token store (Redis, in-memory)
//! - `broker` - event bus producer and broker abstraction
//! - `supervisor` - background worker lifecycle

pub mod broker;
pub mod cache;
pub mod crypto;
pub mod password;
pub mod supervisor;
