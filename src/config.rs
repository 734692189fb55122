use chrono::Duration;

/// Page sizes must be a multiple of this value. Hints that aren't are ignored
/// and the page size is read from the database header instead.
pub const PAGE_SIZE_GRANULARITY: u32 = 1024;

/// Page size recorded by old format revisions, which leave the header field
/// zeroed.
pub const LEGACY_PAGE_SIZE: u32 = 4 * 1024;

/// Number of header bytes the header reader needs.
pub const HEADER_SIZE: usize = 668;

/// Default log file prefix (the engine's "base name").
pub const DEFAULT_LOG_PREFIX: &str = "edb";

/// Instance name used when none is given.
pub const DEFAULT_INSTANCE_NAME: &str = "esedump";

/// Default upper bound (relative to now) for ambiguous 64-bit values to be
/// accepted as timestamps.
pub fn default_future_time_limit() -> Duration {
    Duration::days(100 * 365)
}
