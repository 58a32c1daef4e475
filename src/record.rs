//! ADIF QSO records and layered field lookup.
//!
//! A [`Record`] is a plain mapping from lowercased field name to string
//! value. Anything that depends on the log a record belongs to (constant
//! fields such as the station callsign, the mode translation table, the
//! output date format) lives in a [`LogContext`] and is supplied at lookup
//! time through [`lookup`] or a [`RecordView`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bandplan::Bandplan;
use crate::locator::{LocatorError, Position};

/// Default format used when rendering QSO timestamps.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Default Cabrillo columns as `(field, width)`.
pub const DEFAULT_CABRILLO_FIELDS: &[(&str, usize)] = &[
    ("frqint", 5),
    ("mode", 2),
    ("isodate", 10),
    ("time_off", 4),
    ("own_call", 13),
    ("rst_sent", 3),
    ("call", 13),
    ("rst_rcvd", 3),
    ("gridsquare", 4),
];

/// Errors raised when a field value cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Missing field: {0}")]
    Missing(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Invalid Cabrillo field spec: {0}")]
    InvalidCabrilloField(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(#[from] LocatorError),
}

/// A single QSO record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record from the four fields every QSO has.
    pub fn new(
        call: impl Into<String>,
        mode: impl Into<String>,
        qso_date: impl Into<String>,
        time_on: impl Into<String>,
    ) -> Self {
        let mut record = Record::default();
        record.insert("call", call);
        record.insert("mode", mode);
        record.insert("qso_date", qso_date);
        record.insert("time_on", time_on);
        record
    }

    /// Build a record from name/value pairs. Names are lowercased.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut record = Record::default();
        for (name, value) in fields {
            record.insert(name.as_ref(), value);
        }
        record
    }

    /// Add an optional field; `None` leaves the record untouched.
    pub fn with_field(mut self, name: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    /// Set a field, returning the previous value. Last write wins.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.fields.insert(name.to_lowercase(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(&name.to_lowercase())
    }

    /// The stored value of a field, without derived fields or log defaults.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(value) => Some(value.as_str()),
            None => self.fields.get(&name.to_lowercase()).map(String::as_str),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The contacted station's callsign.
    pub fn call(&self) -> Option<&str> {
        self.get("call")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stored fields in lexicographic order of name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.fields() {
            write_tag(f, name, value)?;
            writeln!(f)?;
        }
        write!(f, "<eor>")
    }
}

/// Write a single `<name:length>value` tag. Length counts characters.
pub(crate) fn write_tag(f: &mut impl fmt::Write, name: &str, value: &str) -> fmt::Result {
    write!(f, "<{}:{}>{}", name, value.chars().count(), value)
}

/// Mode translation table.
///
/// Maps the stored `mode` to another name. A `default` entry is used for
/// modes that have no entry of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ModeMap(BTreeMap<String, String>);

impl ModeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.0.insert(from.into(), to.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Translate a mode, falling back to `default`, then to the mode itself.
    pub fn translate<'a>(&'a self, mode: &'a str) -> &'a str {
        self.0
            .get(mode)
            .or_else(|| self.0.get("default"))
            .map(String::as_str)
            .unwrap_or(mode)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModeMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        ModeMap(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Settings shared by every record of a log.
#[derive(Debug, Clone)]
pub struct LogContext {
    fields: BTreeMap<String, String>,
    mode_map: ModeMap,
    date_format: String,
    bandplan: Option<Bandplan>,
}

impl Default for LogContext {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            mode_map: ModeMap::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            bandplan: None,
        }
    }
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the station callsign, available to every record as `own_call`.
    pub fn with_callsign(self, callsign: impl Into<String>) -> Self {
        self.with_field("own_call", callsign)
    }

    /// Add a constant field visible from every record.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_mode_map(mut self, mode_map: ModeMap) -> Self {
        self.mode_map = mode_map;
        self
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    /// Derive `band` from `freq` for records that do not log a band.
    pub fn with_bandplan(mut self, bandplan: Bandplan) -> Self {
        self.bandplan = Some(bandplan);
        self
    }

    /// Replace the mode map. Takes effect on the next lookup.
    pub fn set_mode_map(&mut self, mode_map: ModeMap) {
        self.mode_map = mode_map;
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn mode_map(&self) -> &ModeMap {
        &self.mode_map
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn bandplan(&self) -> Option<&Bandplan> {
        self.bandplan.as_ref()
    }
}

/// Look up a field of a record.
///
/// Resolution order:
/// 1. derived fields: `frqint` (frequency in kHz as an integer, from
///    `freq` in MHz), `isodate` (`qso_date` as `YYYY-MM-DD`), `mode`
///    translated through the mode map, `time_off` falling back to
///    `time_on`, `band` from `freq` through the band plan when the record
///    has no band of its own;
/// 2. the record's own fields;
/// 3. the constant fields of the log context.
///
/// A field found nowhere is `Ok(None)`. Derived values are recomputed on
/// every call.
pub fn lookup<'a>(
    record: &'a Record,
    context: &'a LogContext,
    name: &str,
) -> Result<Option<Cow<'a, str>>, FieldError> {
    let name = name.to_lowercase();

    match name.as_str() {
        "frqint" => {
            return record
                .get("freq")
                .map(|freq| frequency_khz(freq).map(Cow::Owned))
                .transpose();
        }
        "isodate" => {
            return record
                .get("qso_date")
                .map(|date| parse_date(date).map(|d| Cow::Owned(d.format("%Y-%m-%d").to_string())))
                .transpose();
        }
        "mode" if !context.mode_map.is_empty() => {
            if let Some(mode) = record.get("mode") {
                return Ok(Some(Cow::Borrowed(context.mode_map.translate(mode))));
            }
        }
        "time_off" if !record.contains("time_off") => {
            if let Some(time_on) = record.get("time_on") {
                return Ok(Some(Cow::Borrowed(time_on)));
            }
        }
        "band" if !record.contains("band") => {
            if let (Some(plan), Some(freq)) = (&context.bandplan, record.get("freq")) {
                if let Some(band) = plan.lookup(parse_mhz(freq)? * 1e6) {
                    return Ok(Some(Cow::Borrowed(band.name.as_str())));
                }
            }
        }
        _ => {}
    }

    Ok(record
        .get(&name)
        .or_else(|| context.field(&name))
        .map(Cow::Borrowed))
}

fn parse_mhz(freq: &str) -> Result<f64, FieldError> {
    let mhz: f64 = freq
        .trim()
        .parse()
        .map_err(|_| FieldError::InvalidFrequency(freq.to_string()))?;
    if !mhz.is_finite() || mhz < 0.0 {
        return Err(FieldError::InvalidFrequency(freq.to_string()));
    }
    Ok(mhz)
}

/// Convert a frequency in MHz to whole kHz, rounding half up.
fn frequency_khz(freq: &str) -> Result<String, FieldError> {
    let mhz = parse_mhz(freq)?;
    Ok(((mhz * 1000.0 + 0.5).floor() as u64).to_string())
}

fn parse_date(date: &str) -> Result<NaiveDate, FieldError> {
    NaiveDate::parse_from_str(date.trim(), "%Y%m%d")
        .map_err(|_| FieldError::InvalidDate(date.to_string()))
}

/// Combine an ADIF date (`YYYYMMDD`) and time (`HHMM` or `HHMMSS`).
pub fn parse_date_time(date: &str, time: &str) -> Result<NaiveDateTime, FieldError> {
    let day = parse_date(date)?;
    let time = time.trim();
    let format = if time.len() > 4 { "%H%M%S" } else { "%H%M" };
    let time = NaiveTime::parse_from_str(time, format)
        .map_err(|_| FieldError::InvalidDate(format!("{} {}", date, time)))?;
    Ok(day.and_time(time))
}

/// Render a timestamp, rejecting malformed format strings instead of panicking.
pub fn format_date_time(value: &NaiveDateTime, format: &str) -> Result<String, FieldError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(FieldError::InvalidDateFormat(format.to_string()));
    }
    let mut out = String::new();
    write!(out, "{}", value.format(format))
        .map_err(|_| FieldError::InvalidDateFormat(format.to_string()))?;
    Ok(out)
}

/// One fixed-width Cabrillo column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabrilloField {
    pub name: String,
    pub width: usize,
}

impl CabrilloField {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    /// The standard QSO line layout.
    pub fn defaults() -> Vec<Self> {
        DEFAULT_CABRILLO_FIELDS
            .iter()
            .map(|&(name, width)| Self::new(name, width))
            .collect()
    }

    /// Left-justify the value, padding and truncating to the column width.
    fn render(&self, value: &str) -> String {
        let value: String = value.chars().take(self.width).collect();
        format!("{:<width$}", value, width = self.width)
    }
}

impl FromStr for CabrilloField {
    type Err = FieldError;

    /// Parse a `name:width` spec such as `call:13`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FieldError::InvalidCabrilloField(s.to_string());
        let (name, width) = s.split_once(':').ok_or_else(invalid)?;
        let name = name.trim();
        let width: usize = width.trim().parse().map_err(|_| invalid())?;
        if name.is_empty() || width == 0 {
            return Err(invalid());
        }
        Ok(Self::new(name.to_lowercase(), width))
    }
}

impl<'de> Deserialize<'de> for CabrilloField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A record seen through the context of its log.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    record: &'a Record,
    context: &'a LogContext,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a Record, context: &'a LogContext) -> Self {
        Self { record, context }
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    /// See [`lookup`].
    pub fn lookup(&self, name: &str) -> Result<Option<Cow<'a, str>>, FieldError> {
        lookup(self.record, self.context, name)
    }

    /// Like [`lookup`](Self::lookup) but a missing field is an error.
    pub fn require(&self, name: &str) -> Result<Cow<'a, str>, FieldError> {
        self.lookup(name)?
            .ok_or_else(|| FieldError::Missing(name.to_lowercase()))
    }

    /// Stored value from the record or the log, without derived fields.
    fn stored(&self, name: &str) -> Option<&'a str> {
        self.record.get(name).or_else(|| self.context.field(name))
    }

    /// The mode as confirmed by LoTW if present, else the logged mode.
    pub fn effective_mode(&self) -> Result<Option<Cow<'a, str>>, FieldError> {
        if self.stored("app_lotw_mode").is_some() {
            self.lookup("app_lotw_mode")
        } else {
            self.lookup("mode")
        }
    }

    /// Start of the QSO from `qso_date` and `time_on`.
    pub fn date_on(&self) -> Result<NaiveDateTime, FieldError> {
        let date = self.require("qso_date")?;
        let time = self.require("time_on")?;
        parse_date_time(&date, &time)
    }

    /// End of the QSO, present only if `qso_date_off` and `time_off` are logged.
    pub fn date_off(&self) -> Result<Option<NaiveDateTime>, FieldError> {
        match (self.stored("qso_date_off"), self.stored("time_off")) {
            (Some(date), Some(time)) => parse_date_time(date, time).map(Some),
            _ => Ok(None),
        }
    }

    /// Date the QSL was received (`qslrdate`).
    pub fn qsl_rcvd_date(&self) -> Result<Option<NaiveDateTime>, FieldError> {
        self.stored("qslrdate")
            .map(|date| parse_date_time(date, "0000"))
            .transpose()
    }

    /// Position of the contacted station from its `gridsquare`.
    pub fn position(&self) -> Result<Option<Position>, FieldError> {
        self.stored("gridsquare")
            .map(|locator| Position::from_locator(locator, true).map_err(FieldError::from))
            .transpose()
    }

    /// [`date_on`](Self::date_on) rendered with the log's date format.
    pub fn formatted_date_on(&self) -> Result<String, FieldError> {
        format_date_time(&self.date_on()?, self.context.date_format())
    }

    /// Render as a Cabrillo `QSO:` line.
    pub fn to_cabrillo(&self, fields: &[CabrilloField]) -> Result<String, FieldError> {
        let mut line = String::from("QSO:");
        for field in fields {
            let value = self.require(&field.name)?;
            line.push(' ');
            line.push_str(&field.render(&value));
        }
        Ok(line)
    }
}

impl fmt::Display for RecordView<'_> {
    /// The stored fields, exactly as [`Record`] renders them. The mode map
    /// and other derived values only apply to [`lookup`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.record, f)
    }
}
