//! Value codec: textual encoding of String, Dword and Hex payloads.
//!
//! Value lines look like:
//!
//! ```text
//! "Name"="escaped \"text\""
//! "Flags"=dword:0000002a
//! "Blob"=hex:00,01,ff,10,20,30,40,50,60,70,80,90,a0,b0,c0,\
//!   d0,e0,f0
//! @="default value"
//! ```

use crate::error::{RegistryError, Result};
use std::fmt;

/// Maximum width of a physical hex line, continuation backslash included.
pub const HEX_LINE_WIDTH: usize = 56;

/// Indentation written at the start of every hex continuation line.
pub const HEX_CONTINUATION_INDENT: &str = "  ";

const DWORD_PREFIX: &str = "dword:";
const HEX_PREFIX: &str = "hex:";

/// Escapes backslashes and double quotes.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reverses [`escape`].
///
/// Only `\\` and `\"` are recognized; any other backslash sequence is kept
/// as written.
pub fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next @ ('\\' | '"')) = chars.peek() {
                unescaped.push(next);
                chars.next();
                continue;
            }
        }
        unescaped.push(c);
    }
    unescaped
}

/// Rejects a key, value name or string payload that contains a line break.
///
/// These are always written on one physical line; a `\n` or `\r` inside
/// them would be read back as a header or value line of its own.
pub fn check_single_line(what: &str, text: &str) -> Result<()> {
    if text.contains(['\n', '\r']) {
        return Err(RegistryError::format_error(format!(
            "{} must not contain line breaks: {:?}",
            what, text
        )));
    }
    Ok(())
}

/// Rejects an encoded payload whose line breaks are not hex continuations.
///
/// The only line break a payload may carry is `\` + `\n` followed by the
/// indentation of the next continuation line.
pub fn check_raw_payload(raw: &str) -> Result<()> {
    let bytes = raw.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let continuation = b == b'\n'
            && i > 0
            && bytes[i - 1] == b'\\'
            && matches!(bytes.get(i + 1), Some(b' ') | Some(b'\t'));
        if b == b'\r' || (b == b'\n' && !continuation) {
            return Err(RegistryError::format_error(format!(
                "Value payload has a line break outside a hex continuation: {:?}",
                raw
            )));
        }
    }
    Ok(())
}

/// Text that introduces a value line: `"escaped-name"=` or `@=`.
pub fn value_prefix(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("\"{}\"=", escape(name)),
        None => String::from("@="),
    }
}

/// Encodes a string payload; `None` becomes an empty string.
pub fn encode_string(value: Option<&str>) -> String {
    format!("\"{}\"", escape(value.unwrap_or_default()))
}

/// Decodes a quoted string payload.
pub fn decode_string(raw: &str) -> Result<String> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| RegistryError::format_error(format!("Not a quoted string: {:?}", raw)))?;
    Ok(unescape(inner))
}

/// Encodes a dword as `dword:` plus eight lowercase hex digits.
pub fn encode_dword(value: u32) -> String {
    format!("{}{:08x}", DWORD_PREFIX, value)
}

/// Decodes `dword:XXXXXXXX`.
pub fn decode_dword(raw: &str) -> Result<u32> {
    let digits = raw
        .strip_prefix(DWORD_PREFIX)
        .filter(|d| d.len() == 8 && d.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| RegistryError::invalid_dword(raw))?;
    u32::from_str_radix(digits, 16).map_err(|_| RegistryError::invalid_dword(raw))
}

/// Encodes raw bytes as a wrapped `hex:` payload for value `name`.
pub fn encode_hex(name: Option<&str>, bytes: &[u8]) -> String {
    wrap_hex_digits(name, &hex::encode(bytes))
}

/// Encodes an already formatted hex-digit string (e.g. `"0001ff"`).
///
/// # Errors
///
/// Returns `RegistryError::InvalidFormat` if the string has an odd length or
/// contains characters other than hex digits.
pub fn encode_hex_digits(name: Option<&str>, digits: &str) -> Result<String> {
    if digits.len() % 2 != 0 {
        return Err(RegistryError::format_error(format!(
            "Hex string has odd length {}",
            digits.len()
        )));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(RegistryError::format_error(format!(
            "Hex string contains non-hex characters: {:?}",
            digits
        )));
    }
    Ok(wrap_hex_digits(name, &digits.to_ascii_lowercase()))
}

/// Lays out hex digit pairs as a comma-joined stream, wrapping lines so that
/// none exceeds [`HEX_LINE_WIDTH`] (first pair on a line always fits).
fn wrap_hex_digits(name: Option<&str>, digits: &str) -> String {
    let pairs: Vec<&str> = digits
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect();

    let mut payload = String::with_capacity(HEX_PREFIX.len() + pairs.len() * 3 + pairs.len() / 16 * 4);
    payload.push_str(HEX_PREFIX);

    let mut column = value_prefix(name).len() + HEX_PREFIX.len();
    let mut on_line = 0;
    for (i, pair) in pairs.iter().enumerate() {
        let last = i + 1 == pairs.len();
        let width = pair.len() + usize::from(!last);

        // room for the pair, its comma and a possible continuation backslash
        if on_line > 0 && column + width + 1 > HEX_LINE_WIDTH {
            payload.push_str("\\\n");
            payload.push_str(HEX_CONTINUATION_INDENT);
            column = HEX_CONTINUATION_INDENT.len();
            on_line = 0;
        }

        payload.push_str(pair);
        if !last {
            payload.push(',');
        }
        column += width;
        on_line += 1;
    }
    payload
}

/// Decodes a `hex:` payload, tolerating continuation lines.
pub fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let stream = raw
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| RegistryError::format_error(format!("Not a hex value: {:?}", raw)))?;

    let joined: String = stream
        .chars()
        .filter(|c| !matches!(c, '\\' | ' ' | '\t' | '\r' | '\n'))
        .collect();
    if joined.is_empty() {
        return Ok(Vec::new());
    }

    let mut digits = String::with_capacity(joined.len());
    for pair in joined.split(',') {
        if pair.len() != 2 {
            return Err(RegistryError::InvalidHex(format!("malformed byte pair {:?}", pair)));
        }
        digits.push_str(pair);
    }
    Ok(hex::decode(digits)?)
}

/// Supported value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// Quoted string (REG_SZ).
    String,
    /// 32-bit unsigned integer (REG_DWORD).
    Dword,
    /// Raw bytes (REG_BINARY).
    Hex,
}

impl ValueType {
    /// Detects the type of a raw payload from its leading text.
    pub fn of_raw(raw: &str) -> Option<Self> {
        if raw.starts_with('"') {
            Some(ValueType::String)
        } else if raw.starts_with(DWORD_PREFIX) {
            Some(ValueType::Dword)
        } else if raw.starts_with(HEX_PREFIX) {
            Some(ValueType::Hex)
        } else {
            None
        }
    }

    /// Returns the Windows name of this value type.
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "REG_SZ",
            ValueType::Dword => "REG_DWORD",
            ValueType::Hex => "REG_BINARY",
        }
    }
}

/// Decoded value data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueData {
    /// String value.
    String(String),

    /// 32-bit integer.
    Dword(u32),

    /// Binary data.
    Hex(Vec<u8>),
}

impl ValueData {
    /// Decodes a raw payload (the text after `=`).
    ///
    /// # Errors
    ///
    /// Returns a format error if the payload type is not recognized or its
    /// content does not decode.
    pub fn decode(raw: &str) -> Result<Self> {
        match ValueType::of_raw(raw) {
            Some(ValueType::String) => decode_string(raw).map(ValueData::String),
            Some(ValueType::Dword) => decode_dword(raw).map(ValueData::Dword),
            Some(ValueType::Hex) => decode_hex(raw).map(ValueData::Hex),
            None => Err(RegistryError::format_error(format!(
                "Unsupported value payload: {:?}",
                raw
            ))),
        }
    }

    /// Encodes the payload written after `=` for value `name`.
    ///
    /// The name only matters for hex values, whose line wrapping depends on
    /// the length of the value prefix.
    pub fn encode(&self, name: Option<&str>) -> String {
        match self {
            ValueData::String(s) => encode_string(Some(s)),
            ValueData::Dword(d) => encode_dword(*d),
            ValueData::Hex(bytes) => encode_hex(name, bytes),
        }
    }

    /// Returns the type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            ValueData::String(_) => ValueType::String,
            ValueData::Dword(_) => ValueType::Dword,
            ValueData::Hex(_) => ValueType::Hex,
        }
    }

    /// Returns the string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueData::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is a dword value.
    pub fn as_dword(&self) -> Option<u32> {
        match self {
            ValueData::Dword(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a hex value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ValueData::Hex(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::String(s) => write!(f, "{}", s),
            ValueData::Dword(d) => write!(f, "{} (0x{:08X})", d, d),
            ValueData::Hex(b) => write!(f, "{:02X?}", b),
        }
    }
}

impl From<&str> for ValueData {
    fn from(value: &str) -> Self {
        ValueData::String(value.to_string())
    }
}

impl From<String> for ValueData {
    fn from(value: String) -> Self {
        ValueData::String(value)
    }
}

impl From<u32> for ValueData {
    fn from(value: u32) -> Self {
        ValueData::Dword(value)
    }
}

impl From<Vec<u8>> for ValueData {
    fn from(value: Vec<u8>) -> Self {
        ValueData::Hex(value)
    }
}
