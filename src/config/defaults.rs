//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Shortest permitted save delay.
pub const MIN_SAVE_TIMEOUT_SECS: u64 = 1;

/// Shortest permitted close delay.
pub const MIN_CLOSE_TIMEOUT_SECS: u64 = 60;

/// Largest accepted chat sequence offset; leaves room for every chat to grow.
pub const MAX_FIRST_SEQ: u64 = i64::MAX as u64;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_resource() -> String {
    "parley".to_string()
}

pub fn default_muc_subdomain() -> String {
    "conference".to_string()
}

// =============================================================================
// Dispatch Defaults
// =============================================================================

pub fn default_dispatch_workers() -> usize {
    4
}

// =============================================================================
// Chat Defaults
// =============================================================================

pub fn default_save_timeout() -> u64 {
    300
}

pub fn default_close_timeout() -> u64 {
    3600
}

// =============================================================================
// Store Defaults
// =============================================================================

pub fn default_store_path() -> String {
    "parley.db".to_string()
}
