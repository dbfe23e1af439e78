//! Fragment response framing
//!
//! Batched fragment responses are a plain concatenation of records:
//!
//! ```text
//! <item_id>\n<byte_length>\n<payload>
//! ```
//!
//! with no trailing delimiter. The reader advances strictly by the declared
//! byte length, so payloads may contain newlines.

use thiserror::Error;

/// Framing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Truncated record at byte offset {offset}")]
    Truncated { offset: usize },

    #[error("Invalid payload length {value:?} for item {item_id}")]
    InvalidLength { item_id: String, value: String },

    #[error("Invalid UTF-8 at byte offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("Invalid item id: {0:?}")]
    InvalidItemId(String),
}

/// One decoded fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRecord {
    /// Item identifier the fragment belongs to
    pub item_id: String,
    /// Rendered markup
    pub payload: String,
}

impl FragmentRecord {
    pub fn new(item_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            payload: payload.into(),
        }
    }
}

/// Decode a framed response body into its records, in wire order.
pub fn decode_records(body: &[u8]) -> Result<Vec<FragmentRecord>, FramingError> {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        let (id_bytes, after_id) = read_line(body, pos)?;
        let item_id = std::str::from_utf8(id_bytes)
            .map_err(|_| FramingError::InvalidUtf8 { offset: pos })?
            .to_string();

        let (len_bytes, payload_start) = read_line(body, after_id)?;
        let len_text = std::str::from_utf8(len_bytes)
            .map_err(|_| FramingError::InvalidUtf8 { offset: after_id })?;
        let len = parse_length(len_text).ok_or_else(|| FramingError::InvalidLength {
            item_id: item_id.clone(),
            value: len_text.to_string(),
        })?;

        let payload_end = payload_start
            .checked_add(len)
            .filter(|end| *end <= body.len())
            .ok_or(FramingError::Truncated {
                offset: payload_start,
            })?;

        let payload = std::str::from_utf8(&body[payload_start..payload_end])
            .map_err(|_| FramingError::InvalidUtf8 {
                offset: payload_start,
            })?
            .to_string();

        records.push(FragmentRecord { item_id, payload });
        pos = payload_end;
    }

    Ok(records)
}

/// Encode records into a framed body.
///
/// Ids must be non-empty and must not contain a newline.
pub fn encode_records<'a, I>(records: I) -> Result<Vec<u8>, FramingError>
where
    I: IntoIterator<Item = &'a FragmentRecord>,
{
    let mut body = Vec::new();

    for record in records {
        if record.item_id.is_empty() || record.item_id.contains('\n') {
            return Err(FramingError::InvalidItemId(record.item_id.clone()));
        }
        body.extend_from_slice(record.item_id.as_bytes());
        body.push(b'\n');
        body.extend_from_slice(record.payload.len().to_string().as_bytes());
        body.push(b'\n');
        body.extend_from_slice(record.payload.as_bytes());
    }

    Ok(body)
}

/// Returns the bytes up to the next `\n` and the offset just past it.
fn read_line(body: &[u8], start: usize) -> Result<(&[u8], usize), FramingError> {
    let rest = &body[start..];
    let newline = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(FramingError::Truncated { offset: start })?;
    Ok((&rest[..newline], start + newline + 1))
}

/// Strict decimal: digits only, no sign or whitespace.
fn parse_length(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
