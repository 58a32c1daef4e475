//! Maidenhead locators (`JN88EF`) and geographic positions.
//!
//! A locator is a sequence of pairs, longitude first: a field (`A`..`R`),
//! a square (`0`..`9`), then alternating subsquares (`A`..`X`) and
//! digits. Each pair narrows the cell of the previous one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Offset into the last cell used when extending a locator, see the IARU
/// Region 1 VHF Managers Handbook: `LL` and `44` sit slightly below the
/// middle of their cell.
const VHF_ROUNDING: f64 = 0.47699;

/// Errors raised for malformed locators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("locator needs an even number of characters: {0:?}")]
    Length(String),

    #[error("invalid character {ch:?} in locator {locator:?}")]
    InvalidChar { locator: String, ch: char },
}

/// A position in decimal degrees, north and east positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build a position from degrees, minutes and seconds.
    pub fn from_dms(lat: (f64, f64, f64), lon: (f64, f64, f64)) -> Self {
        let degrees = |(d, m, s): (f64, f64, f64)| d + m / 60.0 + s / 3600.0;
        Self::new(degrees(lat), degrees(lon))
    }

    /// The position a locator stands for.
    ///
    /// With `round_vhf` the result is the point VHF practice uses when a
    /// locator is extended (appending `LL`, `44`, ...), otherwise the
    /// center of the cell.
    pub fn from_locator(locator: &str, round_vhf: bool) -> Result<Self, LocatorError> {
        let locator = locator.trim();
        let chars: Vec<char> = locator.chars().collect();
        if chars.is_empty() || chars.len() % 2 != 0 {
            return Err(LocatorError::Length(locator.to_string()));
        }

        let rounding = if round_vhf { VHF_ROUNDING } else { 0.5 };
        let mut pos = [0.0_f64; 2];
        let mut mul = 10.0_f64;
        let mut cell = 10.0_f64;
        for (n, pair) in chars.chunks(2).enumerate() {
            for (axis, &ch) in pair.iter().enumerate() {
                let value = pair_value(n, ch).ok_or_else(|| LocatorError::InvalidChar {
                    locator: locator.to_string(),
                    ch,
                })?;
                pos[axis] += f64::from(value) * mul;
            }
            cell = if n % 2 == 1 { 24.0 } else { 10.0 };
            mul /= cell;
        }
        pos[0] += mul * cell * rounding;
        pos[1] += mul * cell * rounding;

        Ok(Self::new(pos[1] - 90.0, pos[0] * 2.0 - 180.0))
    }

    /// The locator with `precision` pairs, e.g. 3 for `JN88EF`.
    pub fn to_locator(&self, precision: usize) -> String {
        let mut out = String::with_capacity(precision * 2);
        let mut pos = [(self.lon + 180.0) / 2.0, self.lat + 90.0];
        let mut div = 10.0;
        for k in 0..precision {
            for p in &mut pos {
                let (q, r) = divmod(*p, div);
                if k % 2 == 1 {
                    out.push(char::from(b'0' + q as u8));
                    *p = r * 10.0;
                } else {
                    out.push(char::from(b'A' + q as u8));
                    *p = r * 24.0;
                }
            }
            div = if k % 2 == 1 { 10.0 } else { 24.0 };
        }
        out
    }
}

/// Value of a locator character in pair number `n`.
fn pair_value(n: usize, ch: char) -> Option<u8> {
    let ch = ch.to_ascii_uppercase();
    let last = if n == 0 { 'R' } else { 'X' };
    match ch {
        '0'..='9' if n % 2 == 1 => Some(ch as u8 - b'0'),
        'A'..='X' if n % 2 == 0 && ch <= last => Some(ch as u8 - b'A'),
        _ => None,
    }
}

/// Floored division of non-negative values, quotient rounded to a whole
/// number.
fn divmod(value: f64, divisor: f64) -> (f64, f64) {
    let rem = value % divisor;
    (((value - rem) / divisor).round(), rem)
}

fn write_dms(f: &mut fmt::Formatter<'_>, value: f64, suffixes: [char; 2]) -> fmt::Result {
    let suffix = if value > 0.0 { suffixes[1] } else { suffixes[0] };
    let mut value = value.abs();
    let degrees = value.trunc();
    value = (value - degrees) * 60.0;
    let minutes = value.trunc();
    value = (value - minutes) * 60.0;
    write!(f, "{}°{}'{:.2}\"{}", degrees, minutes, value, suffix)
}

impl fmt::Display for Position {
    /// Degrees, minutes and seconds: `48°12'30.69"N 16°22'23.33"E`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dms(f, self.lat, ['S', 'N'])?;
        write!(f, " ")?;
        write_dms(f, self.lon, ['W', 'E'])
    }
}

impl FromStr for Position {
    type Err = LocatorError;

    /// Parse a locator with VHF rounding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_locator(s, true)
    }
}
