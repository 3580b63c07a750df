//! Shared utilities

pub mod push_id;
pub mod time;
