//! Line-at-a-time scanning of the working copy with exact byte offsets.
//!
//! Lines are read through a fixed-size buffer, so scanning never holds more
//! than one line of the file in memory.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Read buffer size used by scanners and splices (64 KiB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// One physical line of the file.
#[derive(Debug)]
pub struct Line<'a> {
    /// Byte position of the first byte of the line.
    pub start: u64,

    /// Line content without the trailing `\n`.
    pub content: &'a [u8],

    /// Whether the line ended with `\n` (false only for the last line).
    pub terminated: bool,
}

impl<'a> Line<'a> {
    /// Position one past the last content byte (the `\n`, if any).
    pub fn content_end(&self) -> u64 {
        self.start + self.content.len() as u64
    }

    /// Position of the first byte of the following line.
    pub fn next_start(&self) -> u64 {
        self.content_end() + u64::from(self.terminated)
    }

    /// Returns true if the line has no visible content.
    pub fn is_blank(&self) -> bool {
        matches!(self.content, b"" | b"\r")
    }

    /// Returns true if the line opens a new key section.
    pub fn is_header(&self) -> bool {
        self.content.first() == Some(&b'[')
    }
}

/// Sequential line reader that tracks the byte offset of every line.
pub struct LineScanner<R> {
    reader: R,
    position: u64,
    buffer: Vec<u8>,
}

impl LineScanner<BufReader<File>> {
    /// Opens `path` and positions the scanner at byte `from`.
    pub fn open(path: &Path, from: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if from > 0 {
            file.seek(SeekFrom::Start(from))?;
        }
        Ok(Self::with_position(BufReader::with_capacity(BUFFER_SIZE, file), from))
    }
}

impl<R: BufRead> LineScanner<R> {
    /// Wraps a reader whose next byte sits at `position` in the file.
    pub fn with_position(reader: R, position: u64) -> Self {
        Self {
            reader,
            position,
            buffer: Vec::with_capacity(256),
        }
    }

    /// Byte position of the next unread line.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the next line, or `None` at end of file.
    pub fn next_line(&mut self) -> io::Result<Option<Line<'_>>> {
        self.buffer.clear();
        let read = self.reader.read_until(b'\n', &mut self.buffer)?;
        if read == 0 {
            return Ok(None);
        }

        let start = self.position;
        self.position += read as u64;

        let terminated = self.buffer.last() == Some(&b'\n');
        let content = if terminated {
            &self.buffer[..read - 1]
        } else {
            &self.buffer[..]
        };

        Ok(Some(Line {
            start,
            content,
            terminated,
        }))
    }
}
