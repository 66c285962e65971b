//! Gpt Definitions
pub mod encode;
pub mod error;
pub mod header;
pub mod partition;
