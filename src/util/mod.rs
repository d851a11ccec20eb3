//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use chrono::Utc;

/// Current Unix time in whole seconds
pub fn unix_time() -> i64 {
    Utc::now().timestamp()
}

/// Last six hex digits of a MAC identity, separators removed
pub fn mac_suffix(mac: &str) -> String {
    let digits: Vec<char> = mac.chars().filter(char::is_ascii_hexdigit).collect();
    let start = digits.len().saturating_sub(6);
    digits[start..].iter().collect()
}
