//! The flat wire format.
//!
//! Every field of every object travels as one entry of a flat string map.
//! The key is `objectId + "." + key` (root keys have an empty id, so they
//! start with the delimiter). The value is a marker character followed by a
//! payload:
//!
//! | marker | meaning                      | payload      |
//! |--------|------------------------------|--------------|
//! | `' '`  | string                       | the string   |
//! | `'&'`  | reference, same engine       | object id    |
//! | `'p'`  | reference, foreign engine    | object id    |
//!
//! A deleted key is carried as an absent value (`None`, `null` in JSON).

use crate::constants::{FOREIGN_MARKER, KEY_DELIMITER, REFERENCE_MARKER, STRING_MARKER};

use super::EngineError;

/// A decoded wire value, borrowing its payload from the encoded string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Text(&'a str),
    Reference(&'a str),
    Foreign(&'a str),
}

impl WireValue<'_> {
    /// Encodes this value with its marker.
    pub fn encode(&self) -> String {
        let (marker, payload) = match self {
            WireValue::Text(s) => (STRING_MARKER, s),
            WireValue::Reference(id) => (REFERENCE_MARKER, id),
            WireValue::Foreign(id) => (FOREIGN_MARKER, id),
        };
        let mut encoded = String::with_capacity(payload.len() + 1);
        encoded.push(marker);
        encoded.push_str(payload);
        encoded
    }
}

/// Builds the flat key addressing `key` of the object `object_id`.
pub fn flat_key(object_id: &str, key: &str) -> String {
    let mut flat = String::with_capacity(object_id.len() + key.len() + 1);
    flat.push_str(object_id);
    flat.push(KEY_DELIMITER);
    flat.push_str(key);
    flat
}

/// Splits a flat key into `(object_id, key)`.
///
/// Ids never contain the delimiter but keys may. A leading delimiter marks a
/// root key; otherwise the split happens at the fixed id length when the
/// delimiter sits there, and at the first delimiter if not.
pub fn split_flat_key(flat_key: &str, id_length: usize) -> Result<(&str, &str), EngineError> {
    if let Some(key) = flat_key.strip_prefix(KEY_DELIMITER) {
        return Ok(("", key));
    }
    let delimiter = KEY_DELIMITER as u8;
    let split = if flat_key.as_bytes().get(id_length) == Some(&delimiter) {
        Some(id_length)
    } else {
        flat_key.find(KEY_DELIMITER)
    };
    match split {
        Some(i) => Ok((&flat_key[..i], &flat_key[i + 1..])),
        None => Err(EngineError::MalformedKey {
            flat_key: flat_key.to_string(),
        }),
    }
}

/// Parses an encoded value by its leading marker.
pub fn parse_value(encoded: &str) -> Result<WireValue<'_>, EngineError> {
    let mut chars = encoded.chars();
    let marker = chars.next().ok_or(EngineError::EmptyValue)?;
    let payload = chars.as_str();
    match marker {
        STRING_MARKER => Ok(WireValue::Text(payload)),
        REFERENCE_MARKER => Ok(WireValue::Reference(payload)),
        FOREIGN_MARKER => Ok(WireValue::Foreign(payload)),
        marker => Err(EngineError::UnknownMarker { marker }),
    }
}
