//! Copy-on-write splicing of the working copy.
//!
//! A splice streams the working copy into a fresh scratch file, applying a
//! sorted list of edits on the way, and then atomically renames the scratch
//! file over the working copy. If any step fails the scratch file is deleted
//! and the working copy is left exactly as it was.

use crate::error::{RegistryError, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// One edit to the byte stream of the working copy.
///
/// Bytes `[start, end)` of the source are dropped and `replacement` is written
/// in their place. Inserts have `start == end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// First source byte affected.
    pub start: u64,

    /// One past the last source byte dropped.
    pub end: u64,

    /// Bytes written at `start`.
    pub replacement: Vec<u8>,

    /// Also drop one `\n` following the span when the output so far is empty
    /// or ends with `\n`, so removals leave no doubled blank line.
    pub trim_newline: bool,
}

impl Edit {
    /// Inserts `bytes` before source position `at`.
    pub fn insert(at: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            start: at,
            end: at,
            replacement: bytes.into(),
            trim_newline: false,
        }
    }

    /// Replaces source bytes `[start, end)` with `bytes`.
    pub fn replace(start: u64, end: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            start,
            end: end.max(start),
            replacement: bytes.into(),
            trim_newline: false,
        }
    }

    /// Removes source bytes `[start, end)` and a following newline if that
    /// newline would otherwise leave a blank line.
    pub fn delete(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
            replacement: Vec::new(),
            trim_newline: true,
        }
    }
}

/// Streams `source` into `sink`, applying `edits` in order.
struct Splicer<'a, W: Write> {
    source: File,
    source_len: u64,
    sink: W,
    position: u64,
    last_written: Option<u8>,
    buffer: &'a mut [u8],
}

impl<'a, W: Write> Splicer<'a, W> {
    /// Copies exactly `len` source bytes.
    fn copy(&mut self, mut len: u64) -> std::io::Result<()> {
        while len > 0 {
            let chunk = (self.buffer.len() as u64).min(len) as usize;
            self.source.read_exact(&mut self.buffer[..chunk])?;
            self.sink.write_all(&self.buffer[..chunk])?;
            self.last_written = Some(self.buffer[chunk - 1]);
            self.position += chunk as u64;
            len -= chunk as u64;
        }
        Ok(())
    }

    /// Copies everything from the current position to end of file.
    fn copy_rest(&mut self) -> std::io::Result<()> {
        loop {
            let read = self.source.read(self.buffer)?;
            if read == 0 {
                return Ok(());
            }
            self.sink.write_all(&self.buffer[..read])?;
            self.position += read as u64;
        }
    }

    /// Skips `len` source bytes, all of which must exist.
    fn skip(&mut self, len: u64) -> std::io::Result<()> {
        if self.position + len > self.source_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "cannot skip to {} past end of file at {}",
                    self.position + len,
                    self.source_len
                ),
            ));
        }
        if len > 0 {
            self.source.seek(SeekFrom::Current(len as i64))?;
            self.position += len;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(&last) = bytes.last() {
            self.sink.write_all(bytes)?;
            self.last_written = Some(last);
        }
        Ok(())
    }

    /// Drops the next source byte if it is `\n`.
    fn trim_newline(&mut self) -> std::io::Result<()> {
        let mut next = [0u8; 1];
        if self.source.read(&mut next)? == 1 {
            if next[0] == b'\n' {
                self.position += 1;
            } else {
                self.source.seek(SeekFrom::Current(-1))?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, edit: &Edit) -> Result<()> {
        if edit.start < self.position {
            return Err(RegistryError::InvalidSplice {
                position: self.position,
                start: edit.start,
            });
        }
        self.copy(edit.start - self.position)?;
        self.skip(edit.end - edit.start)?;
        self.write(&edit.replacement)?;
        if edit.trim_newline && self.last_written.map_or(true, |b| b == b'\n') {
            self.trim_newline()?;
        }
        Ok(())
    }
}

/// Applies `edits` to `working_copy` through a scratch file in `scratch_dir`.
///
/// Edits must be sorted by `start` and must not overlap. The working copy is
/// replaced only after every edit and the trailing copy have succeeded.
pub fn splice(
    working_copy: &Path,
    scratch_dir: &Path,
    edits: &[Edit],
    buffer_size: usize,
) -> Result<()> {
    let scratch = tempfile::Builder::new()
        .prefix(".reg-splice")
        .tempfile_in(scratch_dir)?;

    match write_spliced(working_copy, &scratch, edits, buffer_size) {
        Ok(written) => {
            scratch.persist(working_copy)?;
            debug!(edits = edits.len(), bytes = written, "Spliced working copy");
            Ok(())
        }
        Err(e) => {
            // dropping the scratch file deletes it
            warn!(error = %e, "Splice aborted, working copy unchanged");
            Err(e)
        }
    }
}

fn write_spliced(
    working_copy: &Path,
    scratch: &NamedTempFile,
    edits: &[Edit],
    buffer_size: usize,
) -> Result<u64> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut sink = BufWriter::with_capacity(buffer_size.max(1), scratch.as_file());
    let source = File::open(working_copy)?;
    let source_len = source.metadata()?.len();
    let mut splicer = Splicer {
        source,
        source_len,
        sink: &mut sink,
        position: 0,
        last_written: None,
        buffer: &mut buffer,
    };

    for edit in edits {
        splicer.apply(edit)?;
    }
    splicer.copy_rest()?;
    let written = splicer.position;

    sink.flush()?;
    Ok(written)
}
