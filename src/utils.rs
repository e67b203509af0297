//! Utility functions for key paths and section timestamps.

use chrono::{DateTime, Utc};

/// 100-nanosecond ticks between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;

/// Separator between key path segments.
pub const KEY_SEPARATOR: char = '\\';

/// Returns the parent of `key`, or `None` for a root-level key.
///
/// ```rust
/// # use reg_editor::utils::parent_key;
/// assert_eq!(parent_key(r"Software\Wine\Direct3D"), Some(r"Software\Wine"));
/// assert_eq!(parent_key("Software"), None);
/// ```
pub fn parent_key(key: &str) -> Option<&str> {
    key.rfind(KEY_SEPARATOR).map(|index| &key[..index])
}

/// Iterates over the proper ancestors of `key`, nearest first.
///
/// `a\b\c` yields `a\b`, then `a`.
pub fn ancestors(key: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_key(key), |current| parent_key(current))
}

/// Converts a UTC time to a Windows FILETIME tick count.
///
/// Times before 1601 clamp to zero.
pub fn to_filetime(time: DateTime<Utc>) -> u64 {
    let ticks = i128::from(time.timestamp()) * 10_000_000
        + i128::from(time.timestamp_subsec_nanos() / 100)
        + i128::from(FILETIME_UNIX_EPOCH_TICKS);
    u64::try_from(ticks.max(0)).unwrap_or(u64::MAX)
}

/// Converts a Windows FILETIME tick count back to UTC.
pub fn from_filetime(ticks: u64) -> Option<DateTime<Utc>> {
    let unix_ticks = i128::from(ticks) - i128::from(FILETIME_UNIX_EPOCH_TICKS);
    let seconds = i64::try_from(unix_ticks.div_euclid(10_000_000)).ok()?;
    let nanos = (unix_ticks.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

/// Formats the two metadata lines written under a new section header:
/// `[key] <unix-seconds>` and `#time=<hex ticks>`.
///
/// The hex form is the high 32 bits of the FILETIME unpadded followed by the
/// low 32 bits padded to eight digits.
pub fn section_header(escaped_key: &str, time: DateTime<Utc>) -> String {
    let ticks = to_filetime(time);
    format!(
        "[{}] {}\n#time={:x}{:08x}",
        escaped_key,
        time.timestamp(),
        ticks >> 32,
        ticks & 0xffff_ffff
    )
}
