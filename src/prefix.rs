//! Expansion of callsign prefix ranges as written in the DXCC list.
//!
//! The list abbreviates runs of prefixes: `7T-7Y` is every prefix from
//! `7T` to `7Y`, `UA8-0` leaves out the common part of the right endpoint,
//! `PP0-PU0F` carries a fixed suffix, and `UA-UB8-0` nests a second range.

use thiserror::Error;

/// Errors raised for prefix ranges that cannot be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    #[error("not a prefix range: {0}")]
    NotARange(String),

    #[error("malformed prefix range: {0}")]
    Malformed(String),

    #[error("prefix range wraps around a non-digit: {0}")]
    Wraparound(String),
}

/// Expand a token that may or may not be a range.
pub fn expand(token: &str) -> Result<Vec<String>, PrefixError> {
    if token.contains('-') {
        expand_range(token)
    } else {
        Ok(vec![token.to_string()])
    }
}

/// Expand a prefix range into the prefixes it denotes, in order.
///
/// ```
/// use hamlog::prefix::expand_range;
///
/// assert_eq!(expand_range("9Q-9T").unwrap(), ["9Q", "9R", "9S", "9T"]);
/// assert_eq!(expand_range("UA8-0").unwrap(), ["UA8", "UA9", "UA0"]);
/// ```
pub fn expand_range(range: &str) -> Result<Vec<String>, PrefixError> {
    let mut out = Vec::new();
    expand_into(range, &mut out)?;
    Ok(out)
}

fn expand_into(range: &str, out: &mut Vec<String>) -> Result<(), PrefixError> {
    let malformed = || PrefixError::Malformed(range.to_string());

    let (left, right) = range
        .split_once('-')
        .ok_or_else(|| PrefixError::NotARange(range.to_string()))?;
    if left.is_empty() || right.is_empty() {
        return Err(malformed());
    }

    let left: Vec<char> = left.chars().collect();
    let mut right: Vec<char> = right.chars().collect();
    let mut suffix = Vec::new();

    // A longer right endpoint carries a suffix shared by the whole range,
    // a shorter one omits the part it has in common with the left.
    if right.len() > left.len() {
        suffix = right.split_off(left.len());
    } else if right.len() < left.len() {
        let mut full = left[..left.len() - right.len()].to_vec();
        full.append(&mut right);
        right = full;
    }

    let n = left.len();
    let (prefix, from, to) = if left[n - 1] == right[n - 1] {
        if n < 2 || left[..n - 2] != right[..n - 2] {
            return Err(malformed());
        }
        suffix.insert(0, left[n - 1]);
        (&left[..n - 2], left[n - 2], right[n - 2])
    } else {
        if left[..n - 1] != right[..n - 1] {
            return Err(malformed());
        }
        (&left[..n - 1], left[n - 1], right[n - 1])
    };

    let steps: Vec<char> = if to < from {
        if to != '0' || !from.is_ascii_digit() {
            return Err(PrefixError::Wraparound(range.to_string()));
        }
        (from..='9').chain(std::iter::once('0')).collect()
    } else if from.is_ascii_digit() == to.is_ascii_digit() {
        (from..=to).collect()
    } else {
        return Err(malformed());
    };

    for step in steps {
        let prefix: String = prefix
            .iter()
            .chain(std::iter::once(&step))
            .chain(suffix.iter())
            .collect();
        if prefix.contains('-') {
            expand_into(&prefix, out)?;
        } else {
            out.push(prefix);
        }
    }
    Ok(())
}
