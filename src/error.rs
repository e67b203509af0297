//! Error types for registry editing operations.
//!
//! Absent keys and values are not errors: lookups report them as `Ok(None)`
//! or `Ok(false)`. The variants here cover storage failures, stored text that
//! does not decode, and misuse of a closed session.

use std::io;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while reading or editing a hive file.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error on the target, the working copy or a scratch file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored or supplied text is not in the expected format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Dword text is not exactly eight hex digits.
    #[error("Invalid dword value: {0:?}")]
    InvalidDword(String),

    /// Hex stream does not decode to whole byte pairs.
    #[error("Invalid hex value: {0}")]
    InvalidHex(String),

    /// Splice edits were unsorted or overlapping.
    #[error("Invalid splice: edit at {start} starts before current position {position}")]
    InvalidSplice {
        /// Source position already reached by the splice.
        position: u64,
        /// Start of the offending edit.
        start: u64,
    },

    /// The editor session has already been closed.
    #[error("Editor session is closed")]
    SessionClosed,
}

impl RegistryError {
    /// Creates a format error with detailed context.
    ///
    /// # Arguments
    ///
    /// * `message` - Description of the format error
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use reg_editor::error::RegistryError;
    /// let raw = "dword:xyz";
    /// let err = RegistryError::format_error(format!("Unrecognized value text: {}", raw));
    /// ```
    pub fn format_error(message: String) -> Self {
        Self::InvalidFormat(message)
    }

    /// Creates an invalid dword error from the offending text.
    pub fn invalid_dword(text: &str) -> Self {
        Self::InvalidDword(text.to_string())
    }

    /// Returns true if this error came from the underlying storage.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<hex::FromHexError> for RegistryError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}

impl From<tempfile::PersistError> for RegistryError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}

impl From<tempfile::PathPersistError> for RegistryError {
    fn from(err: tempfile::PathPersistError) -> Self {
        Self::Io(err.error)
    }
}
