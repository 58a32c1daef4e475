//! hamlog CLI - Read amateur radio logs and resolve callsigns to countries.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hamlog::{
    adif::Encoding,
    bandplan::Region,
    config::Config,
    cty::PrefixTable,
    dxcc::{DxccFile, DxccList},
    locator::Position,
    log::Log,
    resolver::CtyDxcc,
    tq8::Tq8Log,
};
use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Cabrillo version written in the START-OF-LOG header.
const CABRILLO_VERSION: &str = "3.0";

/// hamlog - Read ADIF and TQ8 logs, look up DXCC entities of callsigns
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: <config dir>/hamlog/config.toml)
    #[arg(long, env = "HAMLOG_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse an ADIF file and print it
    Adif {
        /// ADIF file to read (standard input if omitted)
        file: Option<PathBuf>,

        /// Station callsign used for own_call
        #[arg(short, long, env = "HAMLOG_CALLSIGN")]
        call: Option<String>,

        /// Encoding of the ADIF file (utf-8, latin-1)
        #[arg(short, long)]
        encoding: Option<Encoding>,

        /// Print the log in Cabrillo format
        #[arg(long, conflicts_with = "json")]
        cabrillo: bool,

        /// Print the log as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a TQ8 file signed for LoTW
    Tq8 {
        /// TQ8 file to read
        file: PathBuf,

        /// Print the log as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up callsigns in a cty.dat country file
    Cty {
        /// Country file (overrides cty_file from the config)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Callsigns to look up
        #[arg(required = true)]
        calls: Vec<String>,
    },

    /// Look up callsigns in the ARRL DXCC list
    Dxcc {
        /// DXCC list file (overrides dxcc_file from the config)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Download the DXCC list from this URL
        #[arg(short, long)]
        url: Option<String>,

        /// Callsigns to look up
        #[arg(required = true)]
        calls: Vec<String>,
    },

    /// Look up DXCC entities of callsigns through the country file
    Lookup {
        /// Country file (overrides cty_file from the config)
        #[arg(long)]
        cty_file: Option<PathBuf>,

        /// DXCC list file (overrides dxcc_file from the config)
        #[arg(long)]
        dxcc_file: Option<PathBuf>,

        /// Download the DXCC list from this URL
        #[arg(short, long)]
        url: Option<String>,

        /// Also list countries of the country file without a DXCC entity
        #[arg(long)]
        unmatched: bool,

        /// Callsigns to look up
        calls: Vec<String>,
    },

    /// Show the band of frequencies
    Band {
        /// Band plan (overrides bandplan from the config)
        #[arg(short, long)]
        plan: Option<Region>,

        /// Frequencies in MHz
        #[arg(required = true)]
        frequencies: Vec<f64>,
    },

    /// Convert a Maidenhead locator to a position
    Locator {
        /// Number of locator pairs to print back
        #[arg(short, long, default_value_t = 3)]
        precision: usize,

        /// Use the center of the cell instead of VHF rounding
        #[arg(long)]
        center: bool,

        /// Locators such as JN88EF
        #[arg(required = true)]
        locators: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    debug!(?config, "configuration loaded");

    match args.command {
        Command::Adif {
            file,
            call,
            encoding,
            cabrillo,
            json,
        } => {
            let mut context = config.log_context();
            if let Some(call) = call {
                context = context.with_callsign(call.to_uppercase());
            }
            let encoding = encoding.unwrap_or(config.encoding);
            let reader = open_input(file.as_deref())?;
            let log = Log::read_with_encoding(reader, encoding, context)
                .with_context(|| format!("Failed to parse {}", input_name(file.as_deref())))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&log)?);
            } else if cabrillo {
                println!("{}", render_cabrillo(&log, &config)?);
            } else {
                print!("{}", render_summary(&log)?);
                println!("{}", log);
            }
        }

        Command::Tq8 { file, json } => {
            let tq8 = Tq8Log::open(&file, config.encoding, config.log_context())
                .with_context(|| format!("Failed to decode {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(tq8.log())?);
            } else {
                println!("Station: {}", tq8.callsign().unwrap_or("unknown"));
                println!("Got {} records", tq8.log().len());
                println!("{}", tq8.log());
            }
        }

        Command::Cty { file, calls } => {
            let table = load_cty(file.as_deref().unwrap_or(&config.cty_file))?;
            for call in &calls {
                let found = table.lookup(call).map(|country| country.to_string());
                for line in report_lines(call, found.as_deref()) {
                    println!("{}", line);
                }
            }
        }

        Command::Dxcc { file, url, calls } => {
            let url = url.or_else(|| config.dxcc_url.clone());
            let file = file.unwrap_or_else(|| config.dxcc_file.clone());
            let current = load_current_dxcc(&file, url.as_deref()).await?;
            for call in &calls {
                let names = current.lookup(call).into_iter().map(|e| e.name.as_str());
                for line in report_lines(call, names) {
                    println!("{}", line);
                }
            }
        }

        Command::Lookup {
            cty_file,
            dxcc_file,
            url,
            unmatched,
            calls,
        } => {
            let table = load_cty(cty_file.as_deref().unwrap_or(&config.cty_file))?;
            let url = url.or_else(|| config.dxcc_url.clone());
            let file = dxcc_file.unwrap_or_else(|| config.dxcc_file.clone());
            let resolver = CtyDxcc::new(table, load_current_dxcc(&file, url.as_deref()).await?);

            for call in &calls {
                let names = resolver.lookup(call).into_iter().map(|e| e.name.as_str());
                for line in report_lines(call, names) {
                    println!("{}", line);
                }
            }
            if unmatched {
                for country in resolver.unmatched_countries() {
                    println!("No DXCC entity: {}", country.name);
                }
            }
        }

        Command::Band { plan, frequencies } => {
            let bandplan = plan.or(config.bandplan).unwrap_or_default().bandplan();
            for mhz in frequencies {
                match bandplan.lookup(mhz * 1e6) {
                    Some(band) => println!("{}: {}", mhz, band),
                    None => println!("{}: NOT FOUND", mhz),
                }
            }
        }

        Command::Locator {
            precision,
            center,
            locators,
        } => {
            for locator in &locators {
                let position = Position::from_locator(locator, !center)
                    .with_context(|| format!("Invalid locator: {}", locator))?;
                println!("{}: {} {}", locator, position, position.to_locator(precision));
            }
        }
    }

    Ok(())
}

fn input_name(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "standard input".to_string())
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn load_cty(path: &Path) -> Result<PrefixTable> {
    PrefixTable::load_file(path)
        .with_context(|| format!("Failed to load country file: {}", path.display()))
}

/// The current-entities list, downloaded if a URL is given, else read
/// from `file`.
async fn load_current_dxcc(file: &Path, url: Option<&str>) -> Result<DxccList> {
    let dxcc = match url {
        Some(url) => DxccFile::fetch(url)
            .await
            .with_context(|| format!("Failed to fetch DXCC list from {}", url))?,
        None => DxccFile::load_file(file)
            .with_context(|| format!("Failed to load DXCC list: {}", file.display()))?,
    };
    let current = dxcc
        .into_current()
        .context("DXCC list has no CURRENT ENTITIES section")?;
    info!(entities = current.entities().len(), "loaded DXCC list");
    Ok(current)
}

/// Header text, header tags, record count and EOF mark of a log.
fn render_summary(log: &Log) -> Result<String, fmt::Error> {
    let mut out = String::new();
    if let Some(header) = log.header() {
        writeln!(out, "{}", header)?;
    }
    for (name, value) in log.header_tags() {
        writeln!(out, "{:>18}: {}", name, value)?;
    }
    writeln!(out, "Got {} records", log.len())?;
    if let Some(mark) = log.eof_mark() {
        writeln!(out, "Got non-standard EOF-mark: {}", mark)?;
    }
    writeln!(out, "<EOH>")?;
    Ok(out)
}

fn render_cabrillo(log: &Log, config: &Config) -> Result<String> {
    let mut headers = vec![("start-of-log", CABRILLO_VERSION)];
    if let Some(call) = log.context().field("own_call") {
        headers.push(("callsign", call));
    }
    log.to_cabrillo(&config.cabrillo_fields, &headers)
        .context("Failed to render Cabrillo log")
}

/// `CALL: name` for every match, or `CALL: NOT FOUND`.
fn report_lines<'a>(call: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let lines: Vec<String> = names
        .into_iter()
        .map(|name| format!("{}: {}", call, name))
        .collect();
    if lines.is_empty() {
        vec![format!("{}: NOT FOUND", call)]
    } else {
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamlog::record::LogContext;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["hamlog", "adif", "log.adi", "-c", "oe3rsu", "-e", "latin1"])
            .unwrap();
        match args.command {
            Command::Adif {
                file,
                call,
                encoding,
                cabrillo,
                json,
            } => {
                assert_eq!(file, Some(PathBuf::from("log.adi")));
                assert_eq!(call.as_deref(), Some("oe3rsu"));
                assert_eq!(encoding, Some(Encoding::Latin1));
                assert!(!cabrillo);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_args_cabrillo_conflicts_with_json() {
        assert!(Args::try_parse_from(["hamlog", "adif", "--cabrillo", "--json"]).is_err());
    }

    #[test]
    fn test_args_lookup_requires_calls() {
        assert!(Args::try_parse_from(["hamlog", "cty"]).is_err());
        assert!(Args::try_parse_from(["hamlog", "cty", "W1AW"]).is_ok());
    }

    #[test]
    fn test_args_band_and_locator() {
        let args = Args::try_parse_from(["hamlog", "band", "-p", "austria", "14.074", "7.25"]).unwrap();
        match args.command {
            Command::Band { plan, frequencies } => {
                assert_eq!(plan, Some(Region::Austria));
                assert_eq!(frequencies, [14.074, 7.25]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Args::try_parse_from(["hamlog", "band", "-p", "mars", "14.074"]).is_err());

        let args = Args::try_parse_from(["hamlog", "locator", "JN88", "-p", "4"]).unwrap();
        match args.command {
            Command::Locator {
                precision,
                center,
                locators,
            } => {
                assert_eq!(precision, 4);
                assert!(!center);
                assert_eq!(locators, ["JN88"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_render_summary() {
        let log = Log::parse_str(
            "Exported log\n<programid:6>logger<eoh><call:4>W1AW<eor><app_eof><eor>",
            LogContext::new(),
        )
        .unwrap();
        assert_eq!(
            render_summary(&log).unwrap(),
            "Exported log\n         programid: logger\nGot 1 records\n\
             Got non-standard EOF-mark: app_eof\n<EOH>\n"
        );
    }

    #[test]
    fn test_render_cabrillo() {
        let config: Config = toml::from_str(
            r#"
            callsign = "OE3RSU"
            cabrillo_fields = ["own_call:6", "call:6"]
            "#,
        )
        .unwrap();
        let log = Log::parse_str("<call:4>W1AW<eor>", config.log_context()).unwrap();
        assert_eq!(
            render_cabrillo(&log, &config).unwrap(),
            "START-OF-LOG: 3.0\nCALLSIGN: OE3RSU\nQSO: OE3RSU W1AW  \nEND_OF_LOG:"
        );
    }

    #[test]
    fn test_report_lines() {
        assert_eq!(report_lines("W1AW", ["United States of America"]), ["W1AW: United States of America"]);
        assert_eq!(report_lines("ZZ1ZZ", Vec::<&str>::new()), ["ZZ1ZZ: NOT FOUND"]);
        assert_eq!(report_lines("VP8A", ["Falkland Is.", "South Georgia I."]).len(), 2);
    }
}
