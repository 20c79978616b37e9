//! Utility functions for string formatting.

pub mod format;

pub use format::{format_amount, format_date, format_remaining, truncate_string};
