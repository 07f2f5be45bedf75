//! Value Object Module

pub mod device_id;
pub mod email;
pub mod user_id;
pub mod user_name;
