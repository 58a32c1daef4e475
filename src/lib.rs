//! hamlog - A Rust library for amateur radio logs and callsign resolution.
//!
//! This crate provides:
//! - A tolerant ADIF tokenizer and log reader, including gzip-wrapped TQ8
//!   files signed for LoTW
//! - Layered field lookup on QSO records with derived fields and Cabrillo
//!   output
//! - Band plans and Maidenhead locators for the `freq` and `gridsquare`
//!   fields
//! - Callsign to country lookup from `cty.dat` and the ARRL DXCC list, and
//!   reconciliation of the two
//!
//! # Example
//!
//! ```rust
//! use hamlog::{log::Log, record::LogContext};
//!
//! let adif = "Exported log\n<EOH>\n<CALL:4>W1AW <QSO_DATE:8>20230615 <TIME_ON:4>1230 \
//!             <MODE:2>CW <FREQ:5>7.030 <EOR>\n";
//! let log = Log::parse_str(adif, LogContext::new().with_callsign("OE3RSU")).expect("valid ADIF");
//!
//! let qso = log.by_call("W1AW")[0];
//! assert_eq!(qso.lookup("frqint").unwrap().as_deref(), Some("7030"));
//! assert_eq!(qso.lookup("own_call").unwrap().as_deref(), Some("OE3RSU"));
//! ```

pub mod adif;
pub mod bandplan;
pub mod config;
pub mod cty;
pub mod dxcc;
pub mod locator;
pub mod log;
pub mod prefix;
pub mod record;
pub mod resolver;
pub mod tq8;

pub use adif::{AdifError, AdifResult, Encoding, Tag, Tokenizer};
pub use bandplan::{Band, Bandplan, BandplanError, Region};
pub use config::Config;
pub use cty::{Continent, Country, CtyError, PrefixTable};
pub use dxcc::{DxccError, DxccFile, DxccList, Entity};
pub use locator::{LocatorError, Position};
pub use log::{Header, Log, RecordReader};
pub use prefix::PrefixError;
pub use record::{CabrilloField, FieldError, LogContext, ModeMap, Record, RecordView, lookup};
pub use resolver::CtyDxcc;
pub use tq8::Tq8Log;
