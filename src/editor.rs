//! Editing session over one hive file.
//!
//! A session works on a private working copy of the target file. Reads and
//! writes only ever touch the working copy; [`RegistryEditor::close`] renames
//! it over the target if anything changed, or deletes it otherwise.

use crate::error::{RegistryError, Result};
use crate::location::{KeyMatch, Location};
use crate::resolver::{
    find_all_key_sections, find_ancestor_section, find_key_section, find_value_line, ParentKeyCache,
};
use crate::scanner::BUFFER_SIZE;
use crate::splice::{splice, Edit};
use crate::utils::section_header;
use crate::value::{
    check_raw_payload, check_single_line, decode_dword, decode_hex, decode_string, encode_dword,
    encode_hex, encode_hex_digits, encode_string, escape, value_prefix, ValueData,
};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, instrument, warn};

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorOptions {
    /// Create missing keys when setting values (default `true`). When false,
    /// setting a value under a missing key does nothing.
    pub create_key_if_not_exist: bool,

    /// Chunk size of the copy loop used by every rewrite.
    pub buffer_size: usize,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            create_key_if_not_exist: true,
            buffer_size: BUFFER_SIZE,
        }
    }
}

/// Incremental editor for a flat-text registry hive.
///
/// Values are addressed by a backslash-separated key path and a value name;
/// `None` as the name addresses the key's default (`@`) value.
///
/// # Examples
///
/// ```no_run
/// use reg_editor::RegistryEditor;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut editor = RegistryEditor::open("user.reg")?;
/// editor.set_dword_value(r"Software\Wine\Direct3D", Some("csmt"), 3)?;
/// editor.set_string_value(r"Software\Wine\Direct3D", Some("renderer"), "vulkan")?;
/// let csmt = editor.get_dword_value_or(r"Software\Wine\Direct3D", Some("csmt"), 0)?;
/// assert_eq!(csmt, 3);
/// editor.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RegistryEditor {
    target: PathBuf,
    scratch_dir: PathBuf,
    working: Option<TempPath>,
    modified: bool,
    options: EditorOptions,
    cache: ParentKeyCache,
}

impl RegistryEditor {
    /// Opens an editing session on `path` with default options.
    ///
    /// The target does not need to exist; the session then starts from an
    /// empty working copy and creates the file on close.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the working copy cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, EditorOptions::default())
    }

    /// Opens an editing session on `path`.
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: EditorOptions) -> Result<Self> {
        let target = path.as_ref().to_path_buf();
        let scratch_dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = match target.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => String::from(".reg."),
        };

        let mut working = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(&scratch_dir)?;

        if target.is_file() {
            let mut source = File::open(&target)?;
            let copied = io::copy(&mut source, working.as_file_mut())?;
            debug!(bytes = copied, "Copied target into working copy");
        } else {
            debug!("Target missing, starting from an empty working copy");
        }

        info!("Opened registry editor");
        Ok(Self {
            target,
            scratch_dir,
            working: Some(working.into_temp_path()),
            modified: false,
            options,
            cache: ParentKeyCache::new(),
        })
    }

    /// Ends the session.
    ///
    /// If anything was modified the working copy atomically replaces the
    /// target; otherwise it is deleted. Failures are logged, never returned.
    /// If the commit fails the working copy is left next to the target.
    /// Calling `close` again does nothing.
    pub fn close(&mut self) {
        let Some(working) = self.working.take() else {
            return;
        };

        if self.modified {
            match working.persist(&self.target) {
                Ok(()) => info!(path = %self.target.display(), "Committed registry changes"),
                // the working copy stays on disk so the edits can be recovered
                Err(e) => match e.path.keep() {
                    Ok(kept) => warn!(
                        path = %self.target.display(),
                        kept = %kept.display(),
                        error = %e.error,
                        "Failed to commit registry changes, working copy kept"
                    ),
                    Err(keep) => warn!(
                        path = %self.target.display(),
                        error = %e.error,
                        keep_error = %keep.error,
                        "Failed to commit registry changes and to keep the working copy"
                    ),
                },
            }
        } else if let Err(e) = working.close() {
            warn!(error = %e, "Failed to remove working copy");
        }
    }

    /// Returns true until [`close`](Self::close) has run.
    pub fn is_open(&self) -> bool {
        self.working.is_some()
    }

    /// Returns true once any mutation has succeeded.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Path of the target file.
    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Session options.
    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Controls whether setting a value under a missing key creates the key.
    pub fn set_create_key_if_not_exist(&mut self, create: bool) {
        self.options.create_key_if_not_exist = create;
    }

    fn working_copy(&self) -> Result<PathBuf> {
        self.working
            .as_deref()
            .map(Path::to_path_buf)
            .ok_or(RegistryError::SessionClosed)
    }

    fn apply_edits(&mut self, working: &Path, edits: &[Edit]) -> Result<()> {
        splice(working, &self.scratch_dir, edits, self.options.buffer_size)?;
        self.modified = true;
        Ok(())
    }

    /// Returns true if a section for exactly `key` exists.
    pub fn key_exists(&self, key: &str) -> Result<bool> {
        let working = self.working_copy()?;
        let mut cache = ParentKeyCache::new();
        Ok(find_key_section(&working, key, KeyMatch::Exact, &mut cache)?.is_some())
    }

    /// Returns the raw payload text of a value (everything after `=`,
    /// continuation lines included, escapes untouched).
    pub fn get_raw_value(&self, key: &str, name: Option<&str>) -> Result<Option<String>> {
        let working = self.working_copy()?;
        let mut cache = ParentKeyCache::new();

        let Some(section) = find_key_section(&working, key, KeyMatch::Exact, &mut cache)? else {
            return Ok(None);
        };
        let Some(value) = find_value_line(&working, &section, name)? else {
            return Ok(None);
        };
        read_span(&working, &value).map(Some)
    }

    /// Returns the decoded value.
    pub fn get_value(&self, key: &str, name: Option<&str>) -> Result<Option<ValueData>> {
        self.get_raw_value(key, name)?
            .map(|raw| ValueData::decode(&raw))
            .transpose()
    }

    /// Returns a string value with escapes removed.
    pub fn get_string_value(&self, key: &str, name: Option<&str>) -> Result<Option<String>> {
        self.get_raw_value(key, name)?
            .map(|raw| decode_string(&raw))
            .transpose()
    }

    /// Returns a string value, or `fallback` if it does not exist.
    pub fn get_string_value_or(&self, key: &str, name: Option<&str>, fallback: &str) -> Result<String> {
        Ok(self
            .get_string_value(key, name)?
            .unwrap_or_else(|| fallback.to_string()))
    }

    /// Returns a dword value.
    pub fn get_dword_value(&self, key: &str, name: Option<&str>) -> Result<Option<u32>> {
        self.get_raw_value(key, name)?
            .map(|raw| decode_dword(&raw))
            .transpose()
    }

    /// Returns a dword value, or `fallback` if it does not exist.
    pub fn get_dword_value_or(&self, key: &str, name: Option<&str>, fallback: u32) -> Result<u32> {
        Ok(self.get_dword_value(key, name)?.unwrap_or(fallback))
    }

    /// Returns the bytes of a hex value.
    pub fn get_hex_value(&self, key: &str, name: Option<&str>) -> Result<Option<Vec<u8>>> {
        self.get_raw_value(key, name)?
            .map(|raw| decode_hex(&raw))
            .transpose()
    }

    /// Finds the section of `key`, creating it if allowed.
    fn resolve_or_create(&mut self, working: &Path, key: &str) -> Result<Option<Location>> {
        if let Some(section) = find_key_section(working, key, KeyMatch::Exact, &mut self.cache)? {
            return Ok(Some(section));
        }
        if !self.options.create_key_if_not_exist {
            debug!(key, "Key missing and creation disabled, skipping");
            return Ok(None);
        }
        self.insert_key_section(working, key).map(Some)
    }

    /// Writes an already encoded payload for one value.
    ///
    /// Returns `Ok(false)` when the key is missing and key creation is
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns a format error, without touching the file, if the key or name
    /// contains a line break or the payload breaks a line anywhere but in a
    /// hex continuation.
    pub fn set_raw_value(&mut self, key: &str, name: Option<&str>, payload: &str) -> Result<bool> {
        check_value_target(key, name)?;
        check_raw_payload(payload)?;
        let working = self.working_copy()?;
        self.cache.scope_to(key);

        let Some(section) = self.resolve_or_create(&working, key)? else {
            return Ok(false);
        };

        let edit = match find_value_line(&working, &section, name)? {
            Some(value) => Edit::replace(value.start, value.end, payload),
            None => Edit::insert(section.end, format!("\n{}{}", value_prefix(name), payload)),
        };
        self.apply_edits(&working, &[edit])?;
        Ok(true)
    }

    /// Writes a typed value.
    pub fn set_value(&mut self, key: &str, name: Option<&str>, data: &ValueData) -> Result<bool> {
        check_value_data(data)?;
        self.set_raw_value(key, name, &data.encode(name))
    }

    /// Writes a string value.
    pub fn set_string_value(&mut self, key: &str, name: Option<&str>, value: &str) -> Result<bool> {
        check_single_line("String value", value)?;
        self.set_raw_value(key, name, &encode_string(Some(value)))
    }

    /// Writes a dword value.
    pub fn set_dword_value(&mut self, key: &str, name: Option<&str>, value: u32) -> Result<bool> {
        self.set_raw_value(key, name, &encode_dword(value))
    }

    /// Writes a hex value from raw bytes.
    pub fn set_hex_value(&mut self, key: &str, name: Option<&str>, bytes: &[u8]) -> Result<bool> {
        self.set_raw_value(key, name, &encode_hex(name, bytes))
    }

    /// Writes a hex value from a string of hex digits such as `"0001ff"`.
    ///
    /// # Errors
    ///
    /// Returns a format error, without touching the file, if `digits` is not
    /// an even-length run of hex digits.
    pub fn set_hex_string(&mut self, key: &str, name: Option<&str>, digits: &str) -> Result<bool> {
        let payload = encode_hex_digits(name, digits)?;
        self.set_raw_value(key, name, &payload)
    }

    /// Writes several typed values of one key in a single rewrite.
    pub fn set_values(&mut self, key: &str, values: &[(Option<&str>, ValueData)]) -> Result<bool> {
        let encoded = values
            .iter()
            .map(|(name, data)| check_value_data(data).map(|_| (*name, data.encode(*name))))
            .collect::<Result<Vec<_>>>()?;
        self.set_raw_values(key, &encoded)
    }

    /// Writes several string values of one key in a single rewrite.
    pub fn set_string_values(&mut self, key: &str, values: &[(Option<&str>, &str)]) -> Result<bool> {
        let encoded = values
            .iter()
            .map(|(name, value)| {
                check_single_line("String value", value).map(|_| (*name, encode_string(Some(*value))))
            })
            .collect::<Result<Vec<_>>>()?;
        self.set_raw_values(key, &encoded)
    }

    /// Writes several encoded payloads of one key in a single rewrite.
    ///
    /// Existing values are replaced in file order and new values are appended
    /// after the section's last line in the order given. The result is the
    /// same as calling [`set_raw_value`](Self::set_raw_value) for each pair
    /// in file-position order. If a name appears more than once, its last
    /// payload wins.
    pub fn set_raw_values(&mut self, key: &str, values: &[(Option<&str>, String)]) -> Result<bool> {
        check_value_target(key, None)?;
        for (name, payload) in values {
            check_value_target(key, *name)?;
            check_raw_payload(payload)?;
        }
        let working = self.working_copy()?;
        self.cache.scope_to(key);

        let Some(section) = self.resolve_or_create(&working, key)? else {
            return Ok(false);
        };

        let mut unique: Vec<(Option<&str>, &str)> = Vec::with_capacity(values.len());
        for (name, payload) in values {
            match unique.iter_mut().find(|(seen, _)| seen == name) {
                Some(slot) => slot.1 = payload.as_str(),
                None => unique.push((*name, payload.as_str())),
            }
        }

        let mut planned = Vec::with_capacity(unique.len());
        for (index, (name, payload)) in unique.iter().enumerate() {
            let entry = match find_value_line(&working, &section, *name)? {
                Some(value) => (
                    Slot::Existing(value.start),
                    Edit::replace(value.start, value.end, *payload),
                ),
                None => (
                    Slot::Append(index),
                    Edit::insert(section.end, format!("\n{}{}", value_prefix(*name), payload)),
                ),
            };
            planned.push(entry);
        }
        planned.sort_by(|a, b| a.0.cmp(&b.0));

        let edits: Vec<Edit> = planned.into_iter().map(|(_, edit)| edit).collect();
        if !edits.is_empty() {
            self.apply_edits(&working, &edits)?;
        }
        Ok(true)
    }

    /// Removes one value. Returns `Ok(false)` if the key or value is missing.
    pub fn remove_value(&mut self, key: &str, name: Option<&str>) -> Result<bool> {
        let working = self.working_copy()?;
        self.cache.clear();

        let Some(section) = find_key_section(&working, key, KeyMatch::Exact, &mut self.cache)? else {
            return Ok(false);
        };
        let Some(value) = find_value_line(&working, &section, name)? else {
            return Ok(false);
        };

        self.apply_edits(&working, &[Edit::delete(value.offset, value.end)])?;
        self.cache.clear();
        Ok(true)
    }

    /// Removes a key section. With `subtree`, every nested key below it is
    /// removed as well, in one rewrite.
    ///
    /// Returns `Ok(false)` and leaves the file untouched if nothing matched.
    pub fn remove_key(&mut self, key: &str, subtree: bool) -> Result<bool> {
        let working = self.working_copy()?;
        self.cache.clear();

        let sections = if subtree {
            find_all_key_sections(&working, key, KeyMatch::Prefix)?
        } else {
            find_key_section(&working, key, KeyMatch::Exact, &mut self.cache)?
                .into_iter()
                .collect()
        };
        self.cache.clear();

        if sections.is_empty() {
            return Ok(false);
        }

        // adjacent sections collapse into one span so no edit overlaps the
        // newline trimmed by the previous one
        let mut edits: Vec<Edit> = Vec::with_capacity(sections.len());
        for section in sections {
            match edits.last_mut() {
                Some(previous) if section.offset <= previous.end => previous.end = section.end,
                _ => edits.push(Edit::delete(section.offset, section.end)),
            }
        }

        debug!(key, sections = edits.len(), subtree, "Removing key");
        self.apply_edits(&working, &edits)?;
        Ok(true)
    }

    /// Creates the section for `key` if it does not already exist and returns
    /// its location.
    pub fn create_key(&mut self, key: &str) -> Result<Location> {
        check_single_line("Key", key)?;
        let working = self.working_copy()?;
        self.cache.clear();
        if let Some(section) = find_key_section(&working, key, KeyMatch::Exact, &mut self.cache)? {
            return Ok(section);
        }
        self.insert_key_section(&working, key)
    }

    /// Splices a new, empty section for `key` right after its nearest
    /// existing ancestor, or at the end of the file.
    fn insert_key_section(&mut self, working: &Path, key: &str) -> Result<Location> {
        self.cache.clear();

        let file_len = fs::metadata(working)?.len();
        let mut ancestor_cache = ParentKeyCache::new();
        let at = match find_ancestor_section(working, key, &mut ancestor_cache)? {
            Some(ancestor) => (ancestor.end + 1).min(file_len),
            None => file_len,
        };

        let header = section_header(&escape(key), Utc::now());
        let header_line_len = header.find('\n').unwrap_or(header.len()) as u64;
        let content = format!("\n{}\n", header);

        self.apply_edits(working, &[Edit::insert(at, content.as_bytes())])?;
        self.cache.clear();

        // offset: leading newline; start: after the header line; end: the
        // newline closing the `#time=` line
        let location = Location::new(
            at,
            at + 1 + header_line_len + 1,
            at + content.len() as u64 - 1,
        );
        debug!(key, %location, "Created key");
        Ok(location)
    }
}

impl Drop for RegistryEditor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Position of a batch entry; real locations sort before appended values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Existing(u64),
    Append(usize),
}

fn check_value_target(key: &str, name: Option<&str>) -> Result<()> {
    check_single_line("Key", key)?;
    match name {
        Some(name) => check_single_line("Value name", name),
        None => Ok(()),
    }
}

fn check_value_data(data: &ValueData) -> Result<()> {
    match data {
        ValueData::String(text) => check_single_line("String value", text),
        _ => Ok(()),
    }
}

fn read_span(working: &Path, location: &Location) -> Result<String> {
    let mut file = File::open(working)?;
    file.seek(SeekFrom::Start(location.start))?;
    let mut bytes = vec![0u8; location.length() as usize];
    file.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| RegistryError::format_error(format!("Value at {} is not UTF-8: {}", location, e)))
}
