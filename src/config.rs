//! Configuration file support for hamlog.
//!
//! Loads settings from `~/.config/hamlog/config.toml` on Linux
//! (or platform-appropriate location on other OSes).

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::adif::Encoding;
use crate::bandplan::Region;
use crate::record::{CabrilloField, DEFAULT_DATE_FORMAT, LogContext, ModeMap};

/// Application configuration loaded from TOML file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Station callsign, available to every record as `own_call`.
    pub callsign: Option<String>,

    /// Text encoding of ADIF input files.
    pub encoding: Encoding,

    /// strftime format for rendered QSO timestamps.
    pub date_format: String,

    /// Path of the `cty.dat` country file.
    pub cty_file: PathBuf,

    /// Path of a local copy of the ARRL DXCC list.
    pub dxcc_file: PathBuf,

    /// Download the DXCC list from this URL instead of reading `dxcc_file`.
    pub dxcc_url: Option<String>,

    /// Mode translation, e.g. `SSB = "PH"`. A `default` key catches the rest.
    pub mode_map: BTreeMap<String, String>,

    /// Cabrillo QSO line columns as `name:width`.
    pub cabrillo_fields: Vec<CabrilloField>,

    /// Band plan (`austria`, `worldwide`) used to derive `band` from `freq`.
    pub bandplan: Option<Region>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();
        Self {
            callsign: None,
            encoding: Encoding::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            cty_file: data_dir.join("cty.dat"),
            dxcc_file: data_dir.join("dxcc.txt"),
            dxcc_url: None,
            mode_map: BTreeMap::new(),
            cabrillo_fields: CabrilloField::defaults(),
            bandplan: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hamlog/config.toml"))
    }

    /// Directory holding the default data files.
    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("hamlog"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Validate all configuration settings.
    pub fn validate(&self) -> Result<()> {
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            anyhow::bail!("Invalid date_format: {}", self.date_format);
        }
        if self.cabrillo_fields.is_empty() {
            anyhow::bail!("cabrillo_fields must name at least one field");
        }
        if let Some(callsign) = &self.callsign {
            if callsign.trim().is_empty() || callsign.contains(char::is_whitespace) {
                anyhow::bail!("Invalid callsign: {:?}", callsign);
            }
        }
        Ok(())
    }

    /// The log settings derived from this configuration.
    pub fn log_context(&self) -> LogContext {
        let mut context = LogContext::new()
            .with_date_format(&self.date_format)
            .with_mode_map(self.mode_map.iter().collect::<ModeMap>());
        if let Some(callsign) = &self.callsign {
            context = context.with_callsign(callsign.to_uppercase());
        }
        if let Some(region) = self.bandplan {
            context = context.with_bandplan(region.bandplan());
        }
        context
    }
}
