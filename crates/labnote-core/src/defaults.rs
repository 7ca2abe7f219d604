//! Centralized default constants for labnote.
//!
//! Every crate references these constants instead of defining its own
//! magic values. Organized by domain area.

// =============================================================================
// TABLE SCHEMA
// =============================================================================

/// Header of the recordings table, in column order.
pub const TABLE_HEADERS: [&str; 7] = [
    HEADER_DATE,
    HEADER_TIME,
    HEADER_STACK_ID,
    HEADER_EXP_ID,
    HEADER_SITE_ID,
    HEADER_PARADIGM,
    HEADER_COMMENT,
];

/// Header used by notes written before the paradigm column existed.
pub const LEGACY_TABLE_HEADERS: [&str; 6] = [
    HEADER_DATE,
    HEADER_TIME,
    HEADER_STACK_ID,
    HEADER_EXP_ID,
    HEADER_SITE_ID,
    HEADER_COMMENT,
];

pub const HEADER_DATE: &str = "Date";
pub const HEADER_TIME: &str = "Time";
pub const HEADER_STACK_ID: &str = "StackID";
pub const HEADER_EXP_ID: &str = "ExpID";
pub const HEADER_SITE_ID: &str = "SiteID";
pub const HEADER_PARADIGM: &str = "Paradigm";
pub const HEADER_COMMENT: &str = "Comment";

// =============================================================================
// DATE / TIME
// =============================================================================

/// Default date format for table cells (chrono syntax).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default time format for table cells (chrono syntax).
pub const TIME_FORMAT: &str = "%H:%M";

/// Date representation written to storage.
pub const STORAGE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Time representation written to storage.
pub const STORAGE_TIME_FORMAT: &str = "%H:%M:%S";

// =============================================================================
// FRONT MATTER
// =============================================================================

/// Front-matter key holding the animal a note belongs to.
pub const FRONT_MATTER_ANIMAL: &str = "animal";

/// Front-matter key stamped after a successful export.
pub const FRONT_MATTER_LAST_EXPORT: &str = "last_export";

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL when `DATABASE_URL` is not set.
pub const DATABASE_URL: &str = "postgres://localhost/labnote";

/// Default pool size. A single export never holds more than one connection.
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// Default connection acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;
