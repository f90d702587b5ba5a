//! Shared utilities.

pub mod config;
pub mod string_utils;

pub use config::{process_config, SessionConfig};
pub use string_utils::dedent;
