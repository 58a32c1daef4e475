//! Band plans: which amateur band a frequency belongs to.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while building a band plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BandplanError {
    #[error("new band {new} overlaps existing {existing}")]
    Overlap { new: String, existing: String },

    #[error("band {0} ends before it starts")]
    InvalidRange(String),
}

/// Austrian allocations, frequencies in Hz.
const AUSTRIA: &[(&str, f64, f64)] = &[
    ("2.2km", 135.7e3, 137.8e3),
    ("630m", 472.0e3, 479.0e3),
    ("160m", 1810.0e3, 2000.0e3),
    ("80m", 3500.0e3, 3800.0e3),
    ("60m", 5351.3e3, 5366.5e3),
    ("40m", 7000.0e3, 7200.0e3),
    ("30m", 10100.0e3, 10150.0e3),
    ("20m", 14000.0e3, 14350.0e3),
    ("17m", 18068.0e3, 18168.0e3),
    ("15m", 21000.0e3, 21450.0e3),
    ("12m", 24890.0e3, 24990.0e3),
    ("10m", 28000.0e3, 29700.0e3),
    ("6m", 50.0e6, 52.0e6),
    ("2m", 144.0e6, 146.0e6),
    ("70cm", 430.0e6, 440.0e6),
];

/// The widest allocation of each band across the IARU regions.
const WORLDWIDE: &[(&str, f64, f64)] = &[
    ("2200m", 135.7e3, 137.8e3),
    ("630m", 472.0e3, 479.0e3),
    ("160m", 1800.0e3, 2000.0e3),
    ("80m", 3500.0e3, 4000.0e3),
    ("60m", 5330.0e3, 5410.0e3),
    ("40m", 7000.0e3, 7300.0e3),
    ("30m", 10100.0e3, 10150.0e3),
    ("20m", 14000.0e3, 14350.0e3),
    ("17m", 18068.0e3, 18168.0e3),
    ("15m", 21000.0e3, 21450.0e3),
    ("12m", 24890.0e3, 24990.0e3),
    ("10m", 28000.0e3, 29700.0e3),
    ("6m", 50.0e6, 54.0e6),
    ("2m", 144.0e6, 148.0e6),
    ("70cm", 420.0e6, 450.0e6),
];

/// A frequency range with a name. Both ends are inclusive, in Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub start: f64,
    pub end: f64,
}

impl Band {
    pub fn new(name: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        self.start <= frequency && frequency <= self.end
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (scale, unit) = if self.start > 1e9 {
            (1e9, "GHz")
        } else if self.start > 1e6 {
            (1e6, "MHz")
        } else if self.start > 1e3 {
            (1e3, "kHz")
        } else {
            (1.0, "Hz")
        };
        write!(
            f,
            "Band {} {:.3} {}-{:.3} {}",
            self.name,
            self.start / scale,
            unit,
            self.end / scale,
            unit
        )
    }
}

/// A set of non-overlapping bands, kept sorted by start frequency.
#[derive(Debug, Clone, Default)]
pub struct Bandplan {
    bands: Vec<Band>,
}

impl Bandplan {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_table(table: &[(&str, f64, f64)]) -> Self {
        Self {
            bands: table
                .iter()
                .map(|&(name, start, end)| Band::new(name, start, end))
                .collect(),
        }
    }

    /// Insert a band, rejecting one that overlaps a band already present.
    pub fn add_band(&mut self, band: Band) -> Result<(), BandplanError> {
        if band.start.is_nan() || band.end.is_nan() || band.start > band.end {
            return Err(BandplanError::InvalidRange(band.to_string()));
        }
        let index = self.bands.partition_point(|b| b.start <= band.start);
        let neighbours = [
            index.checked_sub(1).map(|i| &self.bands[i]),
            self.bands.get(index),
        ];
        if let Some(existing) = neighbours
            .into_iter()
            .flatten()
            .find(|b| b.start <= band.end && band.start <= b.end)
        {
            return Err(BandplanError::Overlap {
                new: band.to_string(),
                existing: existing.to_string(),
            });
        }
        self.bands.insert(index, band);
        Ok(())
    }

    /// The band containing `frequency` (Hz).
    pub fn lookup(&self, frequency: f64) -> Option<&Band> {
        let index = self.bands.partition_point(|b| b.start <= frequency);
        index
            .checked_sub(1)
            .map(|i| &self.bands[i])
            .filter(|band| band.contains(frequency))
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

/// Built-in band plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Region {
    Austria,
    #[default]
    Worldwide,
}

impl Region {
    pub fn bandplan(self) -> Bandplan {
        match self {
            Region::Austria => Bandplan::from_table(AUSTRIA),
            Region::Worldwide => Bandplan::from_table(WORLDWIDE),
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "austria" | "at" => Ok(Region::Austria),
            "worldwide" | "iaru" => Ok(Region::Worldwide),
            other => Err(format!("unknown band plan: {}", other)),
        }
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
