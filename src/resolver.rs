//! Location resolver: finds key sections and value lines in the working copy.
//!
//! Every lookup is a forward, line-at-a-time scan. Consecutive lookups of
//! sibling keys can resume from a remembered position through an explicit
//! [`ParentKeyCache`] owned by the caller.

use crate::error::Result;
use crate::location::{KeyMatch, Location};
use crate::scanner::{Line, LineScanner};
use crate::utils::{ancestors, parent_key};
use crate::value::{escape, value_prefix};
use std::path::Path;
use tracing::debug;

/// Single-slot memo of where the headers under one parent key begin.
///
/// The position is the start of the first header line whose path begins
/// with the parent key. Every sibling under that parent appears at or after
/// it, so lookups of siblings can skip the bytes before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentKeyCache {
    parent: Option<String>,
    position: Option<u64>,
}

impl ParentKeyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes the cache to the parent of `key`.
    ///
    /// The remembered position survives only if `key` has the same parent as
    /// the previously scoped key.
    pub fn scope_to(&mut self, key: &str) {
        match parent_key(key) {
            Some(parent) if self.parent.as_deref() == Some(parent) => {}
            Some(parent) => {
                self.parent = Some(parent.to_string());
                self.position = None;
            }
            None => self.clear(),
        }
    }

    /// Forgets the remembered position and parent.
    pub fn clear(&mut self) {
        self.parent = None;
        self.position = None;
    }

    /// Remembered scan position for `parent`, if any.
    pub fn position_for(&self, parent: &str) -> Option<u64> {
        match self.parent.as_deref() {
            Some(cached) if cached == parent => self.position,
            _ => None,
        }
    }

    fn remember(&mut self, parent: &str, position: u64) {
        if self.parent.as_deref() != Some(parent) {
            self.parent = Some(parent.to_string());
        }
        self.position = Some(position);
    }
}

fn header_matches(line: &[u8], header: &[u8], mode: KeyMatch) -> bool {
    let Some(rest) = line.strip_prefix(header) else {
        return false;
    };
    match mode {
        KeyMatch::Exact => closes_header(rest),
        // an escaped `\\` starts any nested key
        KeyMatch::Prefix => rest.first() == Some(&b'\\') || closes_header(rest),
    }
}

/// True if `rest` is the closing `]` of a header, followed by the timestamp
/// or the end of the line. Key names may themselves contain `]`.
fn closes_header(rest: &[u8]) -> bool {
    match rest.strip_prefix(b"]") {
        Some(after) => matches!(after.first(), None | Some(b' ') | Some(b'\t') | Some(b'\r')),
        None => false,
    }
}

/// A section whose header has been seen but whose end has not.
struct OpenSection {
    offset: u64,
    start: u64,
    blank_run_start: Option<u64>,
    last_line_end: u64,
}

impl OpenSection {
    fn new(header: &Line<'_>) -> Self {
        Self {
            offset: header.start.saturating_sub(1),
            start: header.next_start(),
            blank_run_start: None,
            last_line_end: header.content_end(),
        }
    }

    fn observe(&mut self, line: &Line<'_>) {
        if line.is_blank() {
            self.blank_run_start.get_or_insert(line.start);
        } else {
            self.blank_run_start = None;
        }
        self.last_line_end = line.content_end();
    }

    /// Ends the section at the header starting at `next_header`, dropping
    /// the blank lines right before it.
    fn close_before(self, next_header: u64) -> Location {
        let body_end = self.blank_run_start.unwrap_or(next_header);
        Location::new(self.offset, self.start, body_end.saturating_sub(1))
    }

    fn close_at_eof(self) -> Location {
        Location::new(self.offset, self.start, self.last_line_end)
    }
}

/// Finds the section of `key`.
///
/// Returns `Ok(None)` if no matching header exists. On success `offset` is
/// the newline preceding the header (0 for a header on the first line),
/// `start` is the first byte after the header line and `end` is the end of
/// the last non-blank body line before the next header (or end of file).
pub fn find_key_section(
    working_copy: &Path,
    key: &str,
    mode: KeyMatch,
    cache: &mut ParentKeyCache,
) -> Result<Option<Location>> {
    let header = format!("[{}", escape(key));
    let parent = parent_key(key);

    let cached = parent.and_then(|p| cache.position_for(p));
    // no anchor needed when resuming from a cached position
    let mut anchor = match (parent, cached) {
        (Some(p), None) => Some(format!("[{}", escape(p))),
        _ => None,
    };

    let from = cached.unwrap_or(0);
    if cached.is_some() {
        debug!(key, position = from, "Parent key cache hit");
    }

    let mut scanner = LineScanner::open(working_copy, from)?;
    let mut section: Option<OpenSection> = None;

    while let Some(line) = scanner.next_line()? {
        if let Some(open) = section.as_mut() {
            if !line.is_header() {
                open.observe(&line);
                continue;
            }
        }
        if let Some(open) = section.take() {
            let location = open.close_before(line.start);
            debug!(key, %location, ?mode, "Located key section");
            return Ok(Some(location));
        }

        if let Some(prefix) = &anchor {
            if line.content.starts_with(prefix.as_bytes()) {
                if let Some(p) = parent {
                    cache.remember(p, line.start);
                }
                anchor = None;
            }
        }
        if anchor.is_none() && header_matches(line.content, header.as_bytes(), mode) {
            section = Some(OpenSection::new(&line));
        }
    }

    Ok(section.map(|open| {
        let location = open.close_at_eof();
        debug!(key, %location, ?mode, "Located key section at end of file");
        location
    }))
}

/// Finds every section matching `key` in a single pass from the start of
/// the file, in file order.
///
/// With [`KeyMatch::Prefix`] this is the key and its whole subtree.
pub fn find_all_key_sections(working_copy: &Path, key: &str, mode: KeyMatch) -> Result<Vec<Location>> {
    let header = format!("[{}", escape(key));
    let mut scanner = LineScanner::open(working_copy, 0)?;
    let mut sections = Vec::new();
    let mut section: Option<OpenSection> = None;

    while let Some(line) = scanner.next_line()? {
        if !line.is_header() {
            if let Some(open) = section.as_mut() {
                open.observe(&line);
            }
            continue;
        }
        if let Some(open) = section.take() {
            sections.push(open.close_before(line.start));
        }
        if header_matches(line.content, header.as_bytes(), mode) {
            section = Some(OpenSection::new(&line));
        }
    }
    if let Some(open) = section {
        sections.push(open.close_at_eof());
    }

    debug!(key, count = sections.len(), ?mode, "Located key sections");
    Ok(sections)
}

/// Returns true if the line introduces a value: `"name"=...` or `@=...`.
fn is_name_line(content: &[u8]) -> bool {
    if content.starts_with(b"@=") {
        return true;
    }
    content.first() == Some(&b'"') && content.windows(2).skip(1).any(|w| w == b"\"=")
}

/// Finds the value `name` (`None` for the default value) inside a key section.
///
/// `start` is the first payload byte after `=`; `end` is the end of the last
/// payload line, which is the line before the next blank or name-bearing line
/// or the end of the section.
pub fn find_value_line(
    working_copy: &Path,
    section: &Location,
    name: Option<&str>,
) -> Result<Option<Location>> {
    if section.is_empty() {
        return Ok(None);
    }

    let prefix = value_prefix(name);
    let mut scanner = LineScanner::open(working_copy, section.start)?;
    let mut found: Option<(u64, u64)> = None;
    let mut value_end = section.start;

    while let Some(line) = scanner.next_line()? {
        if line.start >= section.end {
            break;
        }
        match found {
            None => {
                if line.content.starts_with(prefix.as_bytes()) {
                    found = Some((line.start.saturating_sub(1), line.start + prefix.len() as u64));
                }
            }
            Some(_) => {
                if line.is_blank() || is_name_line(line.content) {
                    break;
                }
            }
        }
        value_end = line.content_end();
    }

    Ok(found.map(|(offset, start)| Location::new(offset, start, value_end.min(section.end).max(start))))
}

/// Finds the nearest existing ancestor section of `key`.
///
/// Ancestors are tried nearest first (`a\b\c` tries `a\b`, then `a`) in
/// prefix mode, so an ancestor that only exists through deeper descendants
/// still anchors the insertion.
pub fn find_ancestor_section(
    working_copy: &Path,
    key: &str,
    cache: &mut ParentKeyCache,
) -> Result<Option<Location>> {
    for ancestor in ancestors(key) {
        if let Some(location) = find_key_section(working_copy, ancestor, KeyMatch::Prefix, cache)? {
            debug!(key, ancestor, %location, "Found ancestor section");
            return Ok(Some(location));
        }
    }
    Ok(None)
}
