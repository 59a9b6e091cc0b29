//! Constants used throughout the wavestate library.
//!
//! This module provides central definitions for the flat wire format: the
//! delimiter between object ids and keys, the marker characters that tag
//! encoded values, and the defaults for identity and position generation.

/// Separates an object id from a key inside a flat key (`objectId + "." + key`).
pub const KEY_DELIMITER: char = '.';

/// Default length of generated object ids. 62^5 is roughly 916 million ids.
pub const DEFAULT_ID_LENGTH: usize = 5;

/// Alphabet object ids are drawn from.
pub const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Marker prefixing a plain string value.
pub const STRING_MARKER: char = ' ';

/// Marker prefixing a reference to an object owned by the same engine.
pub const REFERENCE_MARKER: char = '&';

/// Marker prefixing a reference to an object owned by the foreign (roster) engine.
pub const FOREIGN_MARKER: char = 'p';

/// Lowest character code used in generated position keys.
pub const DEFAULT_MIN_CODE: u32 = 0;

/// Highest character code used in generated position keys.
///
/// Kept within ASCII so every generated key is single-byte under UTF-8.
pub const DEFAULT_MAX_CODE: u32 = 127;

/// Default collision-probability denominator for position keys.
pub const DEFAULT_CHANCE: u64 = 15625;

/// Roster object key holding the participant id.
pub const PARTICIPANT_ID: &str = "id";

/// Roster object key holding the participant display name.
pub const PARTICIPANT_DISPLAY_NAME: &str = "displayName";

/// Roster object key holding the participant thumbnail URL.
pub const PARTICIPANT_THUMBNAIL_URL: &str = "thumbnailUrl";
