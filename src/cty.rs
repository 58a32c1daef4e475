//! Country lookup from `cty.dat` files.
//!
//! A `cty.dat` file lists countries, each as a header line of eight
//! colon-terminated fields followed by one or more lines of
//! comma-separated prefixes, the last one terminated by `;`:
//!
//! ```text
//! Austria:                  15:  28:  EU:   47.33:   -13.33:    -1.0:  OE:
//!     OE,=4U0R,=4U1A,=4U1VIC(20)[28];
//! ```
//!
//! Prefixes starting with `=` are complete callsigns. Zone overrides and
//! other annotations in `()`, `[]`, `<>`, `{}` or `~~` are ignored.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use nom::{
    IResult, Parser,
    bytes::complete::{take_till, take_till1},
    character::complete::char,
    combinator::{all_consuming, map, map_res, opt},
    sequence::terminated,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Characters opening an annotation after a prefix.
const ANNOTATION_OPENERS: &str = "([<{~";

/// Errors raised while loading a country file.
#[derive(Debug, Error)]
pub enum CtyError {
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Continent {
    NorthAmerica,
    SouthAmerica,
    Europe,
    Asia,
    Africa,
    Oceania,
}

impl Continent {
    /// Two-letter code as used in `cty.dat` and the DXCC list.
    pub fn code(&self) -> &'static str {
        match self {
            Continent::NorthAmerica => "NA",
            Continent::SouthAmerica => "SA",
            Continent::Europe => "EU",
            Continent::Asia => "AS",
            Continent::Africa => "AF",
            Continent::Oceania => "OC",
        }
    }
}

impl FromStr for Continent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NA" => Ok(Continent::NorthAmerica),
            "SA" => Ok(Continent::SouthAmerica),
            "EU" => Ok(Continent::Europe),
            "AS" => Ok(Continent::Asia),
            "AF" => Ok(Continent::Africa),
            "OC" => Ok(Continent::Oceania),
            other => Err(format!("unknown continent: {}", other)),
        }
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One country of a `cty.dat` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub name: String,
    pub cq_zone: u8,
    pub itu_zone: u8,
    pub continent: Continent,
    /// Degrees north.
    pub latitude: f64,
    /// Degrees west; east is negative.
    pub longitude: f64,
    /// Local time offset from UTC in hours.
    pub utc_offset: f32,
    pub primary_prefix: String,
    /// Listed only for the DARC WAEDC award (primary prefix marked `*`).
    pub wae_only: bool,
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} CQ: {} ITU: {}",
            self.name, self.primary_prefix, self.continent, self.cq_zone, self.itu_zone
        )
    }
}

/// A colon-terminated header field, trimmed.
fn field(input: &str) -> IResult<&str, &str> {
    terminated(map(take_till(|c: char| c == ':'), str::trim), char(':')).parse(input)
}

fn country_header(input: &str) -> IResult<&str, Country> {
    map_res(
        (field, field, field, field, field, field, field, field),
        |(name, cq, itu, continent, lat, lon, offset, prefix)| -> Result<Country, String> {
            if name.is_empty() {
                return Err("empty country name".to_string());
            }
            let (wae_only, primary_prefix) = match prefix.strip_prefix('*') {
                Some(rest) => (true, rest),
                None => (false, prefix),
            };
            Ok(Country {
                name: name.to_string(),
                cq_zone: cq.parse().map_err(|_| format!("invalid CQ zone: {}", cq))?,
                itu_zone: itu.parse().map_err(|_| format!("invalid ITU zone: {}", itu))?,
                continent: continent.parse()?,
                latitude: lat.parse().map_err(|_| format!("invalid latitude: {}", lat))?,
                longitude: lon.parse().map_err(|_| format!("invalid longitude: {}", lon))?,
                utc_offset: offset
                    .parse()
                    .map_err(|_| format!("invalid UTC offset: {}", offset))?,
                primary_prefix: primary_prefix.to_string(),
                wae_only,
            })
        },
    )
    .parse(input)
}

fn parse_country_header(line: &str) -> Option<Country> {
    all_consuming(country_header)
        .parse(line)
        .ok()
        .map(|(_, country)| country)
}

/// A prefix token: optional `=` for an exact callsign, then the prefix up
/// to the first annotation.
fn prefix_token(input: &str) -> IResult<&str, (bool, &str)> {
    map(
        (opt(char('=')), take_till1(|c: char| ANNOTATION_OPENERS.contains(c))),
        |(exact, prefix)| (exact.is_some(), prefix),
    )
    .parse(input)
}

/// Callsign to country table loaded from `cty.dat`.
#[derive(Debug, Clone, Default)]
pub struct PrefixTable {
    countries: Vec<Country>,
    exact: HashMap<String, usize>,
    prefixes: HashMap<String, usize>,
    max_prefix_len: usize,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_file(path: &Path) -> Result<Self, CtyError> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file))
    }

    pub fn parse_str(input: &str) -> Result<Self, CtyError> {
        Self::load(input.as_bytes())
    }

    /// Load a table from `cty.dat` content.
    pub fn load<R: BufRead>(reader: R) -> Result<Self, CtyError> {
        let mut table = Self::new();
        let mut current: Option<usize> = None;
        let mut line_no = 0;

        for line in reader.lines() {
            line_no += 1;
            let line = line?;
            let line = line.trim();

            let Some(country) = current else {
                if line.is_empty() {
                    continue;
                }
                let header = line.strip_suffix(':').and_then(|_| parse_country_header(line));
                let country = header.ok_or_else(|| CtyError::Format {
                    line: line_no,
                    message: format!("invalid country header: {}", line),
                })?;
                current = Some(table.add_country(country));
                continue;
            };

            let (line, end) = match line.strip_suffix(';') {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            for token in line.trim_end_matches(',').split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                match prefix_token(token) {
                    Ok((_, (true, call))) => table.add_exact(call, country),
                    Ok((_, (false, prefix))) => table.add_prefix(prefix, country),
                    Err(_) => debug!(line = line_no, "ignoring prefix token {:?}", token),
                }
            }
            if end {
                current = None;
            }
        }

        if let Some(country) = current {
            warn!(
                "country {} not terminated by ';'",
                table.countries[country].name
            );
        }

        info!(
            countries = table.countries.len(),
            prefixes = table.prefixes.len(),
            exact = table.exact.len(),
            "loaded country table"
        );
        Ok(table)
    }

    /// Add a country, returning its index for
    /// [`add_prefix`](Self::add_prefix) and [`add_exact`](Self::add_exact).
    pub fn add_country(&mut self, country: Country) -> usize {
        self.countries.push(country);
        self.countries.len() - 1
    }

    /// Map a prefix to a country. The first definition of a prefix wins.
    pub fn add_prefix(&mut self, prefix: &str, country: usize) {
        let prefix = prefix.to_uppercase();
        self.max_prefix_len = self.max_prefix_len.max(prefix.chars().count());
        self.prefixes.entry(prefix).or_insert(country);
    }

    /// Map a complete callsign to a country. The first definition wins.
    pub fn add_exact(&mut self, call: &str, country: usize) {
        self.exact.entry(call.to_uppercase()).or_insert(country);
    }

    /// Country of a callsign: an exact match, else the longest matching
    /// prefix.
    pub fn lookup(&self, callsign: &str) -> Option<&Country> {
        let call = callsign.trim().to_uppercase();
        if let Some(&index) = self.exact.get(&call) {
            return self.countries.get(index);
        }

        let ends: Vec<usize> = call
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take(self.max_prefix_len)
            .collect();
        ends.iter()
            .rev()
            .find_map(|&end| self.prefixes.get(&call[..end]))
            .and_then(|&index| self.countries.get(index))
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn country(&self, name: &str) -> Option<&Country> {
        self.countries.iter().find(|country| country.name == name)
    }

    pub fn max_prefix_len(&self) -> usize {
        self.max_prefix_len
    }
}
