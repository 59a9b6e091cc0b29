//! Fractional position keys.
//!
//! A position key is a string used only for its lexicographic order. A new
//! key can always be generated strictly between two existing ones (unless
//! they are adjacent, e.g. `"a"` and `"a\0"`), so members can be inserted
//! anywhere without renumbering their neighbours.
//!
//! Keys are random rather than midpoints: two replicas inserting at the same
//! spot without coordinating pick different keys with high probability. The
//! generator keeps appending random characters until the number of keys it
//! could have produced reaches [`PositionConfig::chance`], which bounds the
//! odds of an exact collision by `1/chance`.
//!
//! Generated keys never end in the lowest code of the alphabet, since no key
//! could then be placed directly in front of them. The one exception is an
//! upper bound made of lowest codes, such as `"\0\0"`: the only key below it
//! is one of its own prefixes, which is returned as is and without padding.

use std::cmp::Ordering;

use rand::Rng;
use tracing::{trace, warn};

use super::ListError;
use crate::config::PositionConfig;

/// Generates a key strictly between `min` and `max`.
///
/// Either bound may be omitted; an empty bound counts as omitted. Equal bounds
/// are logged and the upper bound is ignored.
///
/// ```
/// use wavestate::{PositionConfig, list::position::string_between};
///
/// let config = PositionConfig::default();
/// let mut rng = rand::thread_rng();
/// let key = string_between(Some("b"), Some("c"), &config, &mut rng).unwrap();
/// assert!("b" < key.as_str() && key.as_str() < "c");
/// ```
pub fn string_between<R: Rng + ?Sized>(
    min: Option<&str>,
    max: Option<&str>,
    config: &PositionConfig,
    rng: &mut R,
) -> Result<String, ListError> {
    config.validate()?;
    let min = min.filter(|s| !s.is_empty());
    let mut max = max.filter(|s| !s.is_empty());
    if let (Some(lo), Some(hi)) = (min, max) {
        match lo.cmp(hi) {
            Ordering::Greater => {
                return Err(ListError::BoundsOutOfOrder {
                    min: lo.to_string(),
                    max: hi.to_string(),
                });
            }
            Ordering::Equal => {
                warn!(bound = %lo.escape_debug(), "Position bounds are equal; ignoring upper bound");
                max = None;
            }
            Ordering::Less => {}
        }
    }

    let lo: Vec<u32> = min.map(codes).unwrap_or_default();
    let hi: Option<Vec<u32>> = max.map(codes);
    let min_code = config.min_code;
    let alphabet_end = config.max_code + 1;

    let mut key: Vec<u32> = Vec::new();
    let mut combos: u128 = 1;
    // The key so far equals the bound's prefix of the same length.
    let mut lower_tight = true;
    let mut upper_tight = hi.is_some();
    // Key length at which the key first exceeded the lower bound.
    let mut loose_at: Option<usize> = None;

    loop {
        let i = key.len();
        let lo_c = if lower_tight { lo.get(i).copied() } else { None };
        let hi_c = match &hi {
            Some(hi) if upper_tight => match hi.get(i) {
                Some(&h) => Some(h),
                // The key caught up with the upper bound. Its longest proper
                // prefix still sorts below it, if that is above the lower one.
                None => {
                    return match loose_at {
                        Some(len) if len < i => {
                            key.truncate(i - 1);
                            Ok(into_key(key))
                        }
                        _ => Err(ListError::NoRoom),
                    };
                }
            },
            _ => None,
        };
        let floor = lo_c.map_or(min_code, |c| c.max(min_code));
        let ceil = hi_c.map_or(alphabet_end, |c| c.min(alphabet_end));

        let c = if floor < ceil {
            combos = combos.saturating_mul(u128::from(ceil - floor));
            rng.gen_range(floor..ceil)
        } else if let Some(h) = hi_c.filter(|&h| h <= floor) {
            h
        } else {
            floor
        };
        key.push(c);
        lower_tight &= lo_c == Some(c);
        upper_tight &= hi_c == Some(c);
        if !lower_tight && loose_at.is_none() {
            loose_at = Some(key.len());
        }

        if !lower_tight && !upper_tight && c != min_code {
            break;
        }
    }

    let padding_width = u128::from(config.max_code - min_code);
    while combos < u128::from(config.chance) {
        key.push(rng.gen_range(min_code + 1..=config.max_code));
        combos = combos.saturating_mul(padding_width);
    }

    Ok(into_key(key))
}

fn into_key(codes: Vec<u32>) -> String {
    // Every code is either copied from a bound or inside the ASCII alphabet.
    let key: String = codes.into_iter().filter_map(char::from_u32).collect();
    trace!(key = %key.escape_debug(), "Generated position key");
    key
}

/// Generates a key strictly between `min` and `max` using the thread RNG.
pub fn position_between(
    min: Option<&str>,
    max: Option<&str>,
    config: &PositionConfig,
) -> Result<String, ListError> {
    string_between(min, max, config, &mut rand::thread_rng())
}

fn codes(s: &str) -> Vec<u32> {
    s.chars().map(u32::from).collect()
}
