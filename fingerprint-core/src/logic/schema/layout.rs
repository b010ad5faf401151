//! Signal Layout - Centralized Signal Definition
//!
//! **CRITICAL: This file controls the fingerprint schema**
//!
//! ## Rules (NEVER break these):
//! 1. Add signal → increment SCHEMA_VERSION
//! 2. Change order → increment SCHEMA_VERSION
//! 3. Remove signal → increment SCHEMA_VERSION
//!
//! The order below is the canonical vector order, so it feeds directly into
//! every device id. Stored records carry the version they were built with.

use crc32fast::Hasher;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// ============================================================================
// SCHEMA VERSION
// ============================================================================

/// Current signal layout version
/// MUST be incremented when layout changes
pub const SCHEMA_VERSION: u8 = 1;

// ============================================================================
// SIGNAL LAYOUT (Authoritative source)
// ============================================================================

/// Signal keys in exact canonical order
pub const SIGNAL_LAYOUT: &[&str] = &[
    // === Screen (0-6) ===
    "screen_width",
    "screen_height",
    "screen_avail_width",
    "screen_avail_height",
    "color_depth",
    "pixel_ratio",
    "screen_frame",

    // === Hardware (7-11) ===
    "hardware_concurrency",
    "device_memory",
    "max_touch_points",
    "platform",
    "architecture",

    // === Software (12-17) ===
    "user_agent",
    "vendor",
    "vendor_flavors",
    "os_cpu",
    "browser_name",
    "browser_version",

    // === Locale (18-21) ===
    "languages",
    "timezone",
    "timezone_offset",
    "date_time_locale",

    // === Storage (22-26) ===
    "cookies_enabled",
    "local_storage",
    "session_storage",
    "indexed_db",
    "open_database",

    // === Rendering (27-33) ===
    "canvas_hash",
    "webgl_vendor",
    "webgl_renderer",
    "webgl_params_hash",
    "webgl_extensions_hash",
    "audio_hash",
    "math_fingerprint",

    // === Fonts & Plugins (34-36) ===
    "fonts",
    "font_preferences_hash",
    "plugins",

    // === Media Preferences (37-41) ===
    "do_not_track",
    "pdf_viewer_enabled",
    "color_gamut",
    "reduced_motion",
    "hdr",

    // === Network-derived (42-44) ===
    "http_header_order_hash",
    "accept_language",
    "tls_client_hello_hash",
];

/// Total number of signals
/// IMPORTANT: Must match SIGNAL_LAYOUT.len()!
pub const SIGNAL_COUNT: usize = 45;

/// High-entropy signals used to index stored fingerprints for candidate lookup
pub const ANCHOR_KEYS: &[&str] = &[
    "canvas_hash",
    "webgl_params_hash",
    "audio_hash",
    "fonts",
    "tls_client_hello_hash",
];

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// Compute CRC32 hash of the signal layout
/// Used to detect layout mismatches between stored records and the engine
pub fn compute_layout_hash() -> u32 {
    hash_keys(SIGNAL_LAYOUT)
}

/// CRC32 of an arbitrary key list under the current schema version
pub fn hash_keys(keys: &[&str]) -> u32 {
    let mut hasher = Hasher::new();

    hasher.update(&[SCHEMA_VERSION]);

    for name in keys {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // Separator
    }

    hasher.finalize()
}

static LAYOUT_HASH: Lazy<u32> = Lazy::new(compute_layout_hash);

/// Get layout hash (computed once)
pub fn layout_hash() -> u32 {
    *LAYOUT_HASH
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Complete layout information for serialization/logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub signal_count: usize,
    pub signal_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            hash: layout_hash(),
            signal_count: SIGNAL_COUNT,
            signal_names: SIGNAL_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// LAYOUT VALIDATION
// ============================================================================

/// Error when a vector or record was built with a different layout
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Signal layout mismatch: expected v{expected_version} (hash: {expected_hash:08x}), \
     got v{actual_version} (hash: {actual_hash:08x})"
)]
pub struct LayoutMismatchError {
    pub expected_version: u8,
    pub expected_hash: u32,
    pub actual_version: u8,
    pub actual_hash: u32,
}

/// Validate that incoming data matches current layout
pub fn validate_layout(incoming_version: u8, incoming_hash: u32) -> Result<(), LayoutMismatchError> {
    let current_hash = layout_hash();

    if incoming_version != SCHEMA_VERSION || incoming_hash != current_hash {
        return Err(LayoutMismatchError {
            expected_version: SCHEMA_VERSION,
            expected_hash: current_hash,
            actual_version: incoming_version,
            actual_hash: incoming_hash,
        });
    }

    Ok(())
}

// ============================================================================
// SIGNAL INDEX LOOKUP
// ============================================================================

/// Get signal position by name
pub fn signal_index(name: &str) -> Option<usize> {
    SIGNAL_LAYOUT.iter().position(|&n| n == name)
}

/// Get signal name by position
pub fn signal_name(index: usize) -> Option<&'static str> {
    SIGNAL_LAYOUT.get(index).copied()
}

/// Is this key part of the current schema?
pub fn is_known_signal(name: &str) -> bool {
    signal_index(name).is_some()
}

// ============================================================================
// TESTS
// ============================================================================
