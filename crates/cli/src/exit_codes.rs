//! CLI Exit Code Registry
//!
//! Single source of truth for `bedcensus` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 2    | Usage error (bad arguments, unreadable config file)  |
//! | 60   | Invalid census config (parse or validation failure)  |
//! | 61   | Runtime / data error (unreadable or malformed input) |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing or unreadable config file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Census (60-69)
// =============================================================================

/// Config failed to parse or validate.
pub const EXIT_CENSUS_INVALID_CONFIG: u8 = 60;

/// Input could not be loaded or reconciled (missing file, unknown format,
/// missing column, unparseable cell, output write failure).
pub const EXIT_CENSUS_RUNTIME: u8 = 61;
