//! Conversion between readable [`MetaValue`]s and codec-ready values.
//!
//! The write side is deliberately permissive: shapes the rules below do not
//! recognise are passed through for the codec to accept or reject.

use crate::error::{EngineError, Result};
use crate::metadata::MetaValue;

use super::tags::{TAG_USER_COMMENT, TagDescriptor, TagType};

const CHARSET_ASCII: &[u8; 8] = b"ASCII\0\0\0";
const CHARSET_UNICODE: &[u8; 8] = b"UNICODE\0";
const CHARSET_JIS: &[u8; 8] = b"JIS\0\0\0\0\0";

/// A field value after type-aware conversion, ready for the EXIF codec.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Bytes(Vec<u8>),
    /// Ordered (numerator, denominator) pairs.
    Rationals(Vec<(i64, i64)>),
    /// Left as-is; the codec validates it against the declared type.
    Scalar(MetaValue),
}

/// Convert a readable value into the shape the codec expects for `tag`.
pub fn coerce(tag: &TagDescriptor, value: &MetaValue) -> Result<CoercedValue> {
    match tag.kind {
        TagType::Ascii | TagType::Undefined => match value {
            MetaValue::Text(s) if tag.id == TAG_USER_COMMENT && tag.kind == TagType::Undefined => {
                Ok(CoercedValue::Bytes(encode_user_comment(s)))
            }
            MetaValue::Text(s) => Ok(CoercedValue::Bytes(s.as_bytes().to_vec())),
            MetaValue::List(items) => byte_list(items)
                .map(CoercedValue::Bytes)
                .ok_or_else(|| mismatch(tag, "expected a string or a list of bytes")),
            _ => Err(mismatch(tag, "expected a string")),
        },
        TagType::Rational | TagType::SRational => Ok(match value {
            MetaValue::List(items) => match rational_pairs(items) {
                Some(pairs) => CoercedValue::Rationals(pairs),
                None => CoercedValue::Scalar(value.clone()),
            },
            _ => CoercedValue::Scalar(value.clone()),
        }),
        _ => Ok(CoercedValue::Scalar(value.clone())),
    }
}

fn mismatch(tag: &TagDescriptor, reason: &str) -> EngineError {
    EngineError::TypeCoercion {
        tag: tag.name.to_string(),
        expected: tag.kind,
        reason: reason.to_string(),
    }
}

fn byte_list(items: &[MetaValue]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|v| v.as_int().and_then(|i| u8::try_from(i).ok()))
        .collect()
}

/// `[a, b]` is one pair; `[[a, b], [c, d], ...]` is a sequence of pairs.
fn rational_pairs(items: &[MetaValue]) -> Option<Vec<(i64, i64)>> {
    if let [MetaValue::Int(num), MetaValue::Int(den)] = items {
        return Some(vec![(*num, *den)]);
    }
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| match item {
            MetaValue::List(pair) => match pair.as_slice() {
                [MetaValue::Int(num), MetaValue::Int(den)] => Some((*num, *den)),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn encode_user_comment(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        let mut bytes = CHARSET_ASCII.to_vec();
        bytes.extend_from_slice(text.as_bytes());
        bytes
    } else {
        let mut bytes = CHARSET_UNICODE.to_vec();
        bytes.extend(text.encode_utf16().flat_map(|c| c.to_be_bytes()));
        bytes
    }
}

/// Decode a byte-valued field (Ascii / Undefined) for the readable tree.
///
/// Undecodable bytes become an opaque `<bytes: N>` placeholder.
pub fn decode_bytes(tag: &TagDescriptor, bytes: &[u8]) -> MetaValue {
    if tag.id == TAG_USER_COMMENT && tag.kind == TagType::Undefined {
        return MetaValue::Text(decode_user_comment(bytes));
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => MetaValue::Text(s.trim_end_matches('\0').to_string()),
        Err(_) => MetaValue::Text(format!("<bytes: {}>", bytes.len())),
    }
}

/// Decode a `UserComment`: an 8-byte charset header followed by the text.
pub fn decode_user_comment(bytes: &[u8]) -> String {
    let text = match bytes.split_at_checked(8) {
        Some((header, rest)) if header == CHARSET_ASCII => String::from_utf8_lossy(rest).into_owned(),
        Some((header, rest)) if header == CHARSET_UNICODE => decode_utf16(rest),
        // No JIS X 0208 table is carried; most writers put ASCII in here anyway.
        Some((header, rest)) if header == CHARSET_JIS => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    text.trim_matches('\0').trim_end().to_string()
}

fn decode_utf16(bytes: &[u8]) -> String {
    let (big_endian, body) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (true, rest),
        [0xFF, 0xFE, rest @ ..] => (false, rest),
        _ => (looks_big_endian(bytes), bytes),
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Latin text in UTF-16BE has its zero bytes at even offsets.
fn looks_big_endian(bytes: &[u8]) -> bool {
    let (even, odd) = bytes
        .chunks_exact(2)
        .fold((0usize, 0usize), |(e, o), c| (e + (c[0] == 0) as usize, o + (c[1] == 0) as usize));
    even >= odd
}

/// A numeric field: one component decodes to a scalar, several to a list.
pub fn scalar_or_list<T: Into<MetaValue>>(values: impl IntoIterator<Item = T>) -> MetaValue {
    let mut items: Vec<MetaValue> = values.into_iter().map(Into::into).collect();
    if items.len() == 1 {
        items.remove(0)
    } else {
        MetaValue::List(items)
    }
}

/// A rational field: one pair decodes to `[n, d]`, several to `[[n, d], ...]`.
pub fn rationals(pairs: impl IntoIterator<Item = (i64, i64)>) -> MetaValue {
    scalar_or_list(
        pairs
            .into_iter()
            .map(|(n, d)| MetaValue::List(vec![MetaValue::Int(n), MetaValue::Int(d)])),
    )
}
