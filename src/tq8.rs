//! TQ8 files: the gzip-compressed, signed ADIF uploads accepted by LoTW.
//!
//! A TQ8 stream has no free-text header. Its first record describes the
//! signing certificate (`rec_type` `tCERT`), the second the station
//! (`rec_type` `tSTATION`), and every following record is a QSO.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::info;

use crate::adif::{AdifError, AdifResult, Encoding, Tokenizer};
use crate::log::{Log, RecordReader};
use crate::record::{LogContext, Record};

const CERTIFICATE_RECORD: &str = "tCERT";
const STATION_RECORD: &str = "tSTATION";

/// A decoded TQ8 upload.
#[derive(Debug, Clone)]
pub struct Tq8Log {
    certificate: Record,
    station: Record,
    log: Log,
}

impl Tq8Log {
    /// Decode a gzip-compressed TQ8 stream.
    ///
    /// The station record's `call` becomes the `own_call` of the log.
    /// Decompression failures are reported as format errors at the line
    /// reached so far.
    pub fn read<R: Read>(input: R, encoding: Encoding, context: LogContext) -> AdifResult<Self> {
        let tokenizer = Tokenizer::with_encoding(BufReader::new(GzDecoder::new(input)), encoding);
        let mut reader = RecordReader::new(tokenizer);

        let certificate = expect_record(&mut reader, CERTIFICATE_RECORD)?;
        let station = expect_record(&mut reader, STATION_RECORD)?;
        let callsign = station
            .call()
            .ok_or_else(|| reader.tokenizer().format_error("station record without call"))?;

        let mut log = Log::new(context.with_callsign(callsign));
        while let Some(record) = next_record(&mut reader)? {
            log.append(record);
        }

        info!(call = callsign, records = log.len(), "parsed TQ8 file");
        Ok(Self {
            certificate,
            station,
            log,
        })
    }

    pub fn open(path: &Path, encoding: Encoding, context: LogContext) -> AdifResult<Self> {
        Self::read(File::open(path)?, encoding, context)
    }

    pub fn certificate(&self) -> &Record {
        &self.certificate
    }

    pub fn station(&self) -> &Record {
        &self.station
    }

    /// Callsign of the uploading station.
    pub fn callsign(&self) -> Option<&str> {
        self.log.context().field("own_call")
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn into_log(self) -> Log {
        self.log
    }
}

/// Read a record, reporting I/O failures as corrupt compressed data.
fn next_record<R: Read>(
    reader: &mut RecordReader<BufReader<GzDecoder<R>>>,
) -> AdifResult<Option<Record>> {
    reader.next_record().map_err(|e| match e {
        AdifError::Io(e) => reader
            .tokenizer()
            .format_error(format!("compressed stream: {}", e)),
        other => other,
    })
}

fn expect_record<R: Read>(
    reader: &mut RecordReader<BufReader<GzDecoder<R>>>,
    rec_type: &str,
) -> AdifResult<Record> {
    match next_record(reader)? {
        Some(record) if record.get("rec_type") == Some(rec_type) => Ok(record),
        Some(record) => Err(reader.tokenizer().format_error(format!(
            "expected {} record, got {}",
            rec_type,
            record.get("rec_type").unwrap_or("untyped record")
        ))),
        None => Err(reader
            .tokenizer()
            .format_error(format!("missing {} record", rec_type))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const UPLOAD: &str = "<TQSL_IDENT:21>TQSL V2.5.1 Lib: V2.5\n\
        <Rec_Type:5>tCERT\n<CERT_UID:1>1\n<CERTIFICATE:8>MIIDabcd\n<eor>\n\
        <Rec_Type:8>tSTATION\n<STATION_UID:1>1\n<CERT_UID:1>1\n<CALL:6>OE3RSU\n<DXCC:3>206\n<eor>\n\
        <Rec_Type:8>tCONTACT\n<STATION_UID:1>1\n<CALL:6>OE1ABC\n<BAND:3>20M\n<MODE:3>SSB\n\
        <QSO_DATE:10>2023-06-15\n<QSO_TIME:9>12:30:00Z\n<SIGN_LOTW_V1.0:8:6>c2lnbmVk\n\
        <SIGNDATA:6>abcdef\n<eor>\n";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_read_upload() {
        let data = gzip(UPLOAD.as_bytes());
        let tq8 = Tq8Log::read(data.as_slice(), Encoding::Utf8, LogContext::new()).unwrap();
        assert_eq!(tq8.certificate().get("certificate"), Some("MIIDabcd"));
        assert_eq!(tq8.station().get("dxcc"), Some("206"));
        assert_eq!(tq8.callsign(), Some("OE3RSU"));

        let log = tq8.log();
        assert_eq!(log.len(), 1);
        let view = log.get(0).unwrap();
        assert_eq!(view.record().get("sign_lotw_v1.0"), Some("c2lnbmVk"));
        assert_eq!(view.lookup("own_call").unwrap().as_deref(), Some("OE3RSU"));
    }

    #[test]
    fn test_station_before_certificate() {
        let data = gzip(b"<Rec_Type:8>tSTATION<CALL:6>OE3RSU<eor>");
        let err = Tq8Log::read(data.as_slice(), Encoding::Utf8, LogContext::new()).unwrap_err();
        assert!(err.to_string().contains("expected tCERT record, got tSTATION"));
    }

    #[test]
    fn test_missing_station() {
        let data = gzip(b"<Rec_Type:5>tCERT<eor>");
        let err = Tq8Log::read(data.as_slice(), Encoding::Utf8, LogContext::new()).unwrap_err();
        assert!(err.to_string().contains("missing tSTATION record"));
    }

    #[test]
    fn test_not_gzip() {
        let err = Tq8Log::read(UPLOAD.as_bytes(), Encoding::Utf8, LogContext::new()).unwrap_err();
        match err {
            AdifError::Format { line, message } => {
                assert_eq!(line, 1);
                assert!(message.starts_with("compressed stream"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&gzip(UPLOAD.as_bytes())).unwrap();
        let tq8 = Tq8Log::open(file.path(), Encoding::Utf8, LogContext::new()).unwrap();
        assert_eq!(tq8.into_log().len(), 1);
    }
}
