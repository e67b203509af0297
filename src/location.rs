//! Byte-span descriptors for key sections and value lines.

use std::fmt;

/// How a key header is matched while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// `[key]` only.
    Exact,
    /// `[key]` or any nested `[key\...]` header.
    Prefix,
}

/// Position of a key section or value inside the working copy.
///
/// * `offset` is the byte position of the newline that ends the line
///   preceding the matched content. Deletions start here.
/// * `start`/`end` bound the matched content. For a key section that is the
///   body after the header line; for a value it is the payload after `=`.
///
/// `end` never includes the newline terminating the last line of the span,
/// so inserting at `end` appends right after the last line of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    /// Splice point for deletion.
    pub offset: u64,

    /// First byte of the content.
    pub start: u64,

    /// One past the last byte of the content.
    pub end: u64,
}

impl Location {
    /// Creates a new location.
    pub fn new(offset: u64, start: u64, end: u64) -> Self {
        Self { offset, start, end }
    }

    /// Length of the content in bytes.
    ///
    /// Empty sections can report `end < start`; their length is zero.
    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span holds no content.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.offset, self.start, self.end)
    }
}
