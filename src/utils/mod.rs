//! Utility functions for duration parsing and formatting.

pub mod format;

// Re-export commonly used items at module level
pub use format::{format_duration, parse_duration, serde_duration, serde_opt_duration};
