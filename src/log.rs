//! ADIF logs: header, records and the by-callsign index.
//!
//! [`RecordReader`] turns the tag stream of a [`Tokenizer`] into records;
//! [`Log`] owns the result of a complete parse.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adif::{AdifError, AdifResult, Encoding, Tokenizer};
use crate::record::{CabrilloField, FieldError, LogContext, ModeMap, Record, RecordView, write_tag};

/// Tag terminating the free-text header.
pub const END_OF_HEADER: &str = "eoh";

/// Tag terminating a record.
pub const END_OF_RECORD: &str = "eor";

/// The part of an ADIF file before the first record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Free text before the end-of-header tag, trimmed. `None` if the file
    /// starts directly with a tag or the end tag never appears.
    pub text: Option<String>,

    /// Tags seen while scanning the header.
    pub tags: BTreeMap<String, String>,
}

/// Reads records one at a time from a tokenizer.
///
/// A record ends at the end tag (`<eor>` by default). A record without any
/// field means the stream is exhausted; ADIF has no end-of-file marker.
pub struct RecordReader<R> {
    tokenizer: Tokenizer<R>,
    end_tag: String,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(tokenizer: Tokenizer<R>) -> Self {
        Self {
            tokenizer,
            end_tag: END_OF_RECORD.to_string(),
            done: false,
        }
    }

    /// Use a different end-of-record tag.
    pub fn with_end_tag(mut self, end_tag: &str) -> Self {
        self.end_tag = end_tag.to_lowercase();
        self
    }

    pub fn tokenizer(&self) -> &Tokenizer<R> {
        &self.tokenizer
    }

    /// Scan the header up to `end_tag`.
    ///
    /// Must be called before the first record. Leading whitespace is
    /// skipped; if the stream then starts with `<` there is no header and
    /// nothing is consumed. A malformed tag inside the header is kept as
    /// header text.
    pub fn read_header(&mut self, end_tag: &str) -> AdifResult<Header> {
        let end_tag = end_tag.to_lowercase();
        let mut header = Header::default();

        self.tokenizer.skip_whitespace()?;
        if matches!(self.tokenizer.peek_char()?, None | Some('<')) {
            return Ok(header);
        }

        let mut text = String::new();
        loop {
            match self.tokenizer.peek_char()? {
                None => break,
                Some('<') => {
                    self.tokenizer.set_strict();
                    match self.tokenizer.next_tag() {
                        Ok(Some(tag)) if tag.name == end_tag => {
                            header.text = Some(text.trim().to_string());
                            return Ok(header);
                        }
                        Ok(Some(tag)) => {
                            header.tags.insert(tag.name, tag.value);
                        }
                        Ok(None) => break,
                        Err(AdifError::Format { line, message }) => {
                            debug!(line, "keeping malformed header tag as text: {}", message);
                            text.push_str(self.tokenizer.raw());
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(_) => {
                    if let Some(c) = self.tokenizer.next_char()? {
                        text.push(c);
                    }
                }
            }
        }

        warn!("header not terminated by <{}>", end_tag);
        Ok(header)
    }

    /// Read the next record, or `None` once the stream is exhausted.
    ///
    /// Input ending right after the last field of a record (without an end
    /// tag) still yields that record.
    pub fn next_record(&mut self) -> AdifResult<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        self.tokenizer.set_strict();
        let mut record = Record::default();

        loop {
            match self.tokenizer.next_tag() {
                Ok(Some(tag)) if tag.name == self.end_tag => {
                    if !tag.value.is_empty() {
                        self.done = true;
                        return Err(self
                            .tokenizer
                            .format_error(format!("invalid <{}> with a value", self.end_tag)));
                    }
                    break;
                }
                Ok(Some(tag)) => {
                    record.insert(&tag.name, tag.value);
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }

        if record.is_empty() {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = AdifResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// A parsed ADIF log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Log {
    header: Option<String>,
    header_tags: BTreeMap<String, String>,
    eof_mark: Option<String>,
    records: Vec<Record>,
    #[serde(skip)]
    by_call: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    context: LogContext,
}

impl Log {
    /// An empty log.
    pub fn new(context: LogContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Parse a UTF-8 ADIF stream.
    pub fn read<R: BufRead>(reader: R, context: LogContext) -> AdifResult<Self> {
        Self::read_with_encoding(reader, Encoding::Utf8, context)
    }

    pub fn read_with_encoding<R: BufRead>(
        reader: R,
        encoding: Encoding,
        context: LogContext,
    ) -> AdifResult<Self> {
        Self::from_reader(
            RecordReader::new(Tokenizer::with_encoding(reader, encoding)),
            context,
        )
    }

    pub fn parse_str(input: &str, context: LogContext) -> AdifResult<Self> {
        Self::read(input.as_bytes(), context)
    }

    /// Read header and records from a record reader.
    pub fn from_reader<R: BufRead>(
        mut reader: RecordReader<R>,
        context: LogContext,
    ) -> AdifResult<Self> {
        let header = reader.read_header(END_OF_HEADER)?;
        let mut records = Vec::new();
        while let Some(record) = reader.next_record()? {
            records.push(record);
        }

        let mut log = Log::new(context);
        log.header = header.text;
        log.header_tags = header.tags;

        if let Some(mark) = records.last().and_then(eof_mark) {
            debug!("dropping non-standard EOF mark <{}>", mark);
            log.eof_mark = Some(mark);
            records.pop();
        }

        for record in records {
            log.append(record);
        }

        info!(
            records = log.records.len(),
            lines = reader.tokenizer().line(),
            "parsed ADIF log"
        );
        Ok(log)
    }

    /// Add a record, keeping the by-callsign index current.
    pub fn append(&mut self, record: Record) {
        if let Some(call) = record.call() {
            self.by_call
                .entry(call.to_string())
                .or_default()
                .push(self.records.len());
        }
        self.records.push(record);
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    pub fn set_header(&mut self, header: Option<String>) {
        self.header = header;
    }

    pub fn header_tags(&self) -> &BTreeMap<String, String> {
        &self.header_tags
    }

    /// Name of a non-standard end-of-file tag found after the last record.
    pub fn eof_mark(&self) -> Option<&str> {
        self.eof_mark.as_deref()
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Replace the mode map used by lookups on this log's records.
    pub fn set_mode_map(&mut self, mode_map: ModeMap) {
        self.context.set_mode_map(mode_map);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records in log order, seen through this log's context.
    pub fn iter(&self) -> impl Iterator<Item = RecordView<'_>> {
        self.records
            .iter()
            .map(|record| RecordView::new(record, &self.context))
    }

    pub fn get(&self, index: usize) -> Option<RecordView<'_>> {
        self.records
            .get(index)
            .map(|record| RecordView::new(record, &self.context))
    }

    /// All records with the given `call`.
    pub fn by_call(&self, call: &str) -> Vec<RecordView<'_>> {
        self.by_call
            .get(call)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.get(index))
            .collect()
    }

    /// Callsigns present in the log.
    pub fn calls(&self) -> impl Iterator<Item = &str> {
        self.by_call.keys().map(String::as_str)
    }

    /// Records ordered by QSO start. Records without a valid date sort first.
    pub fn sorted_by_date(&self) -> Vec<RecordView<'_>> {
        let mut views: Vec<_> = self.iter().collect();
        views.sort_by_key(|view| view.date_on().ok());
        views
    }

    /// Render as a Cabrillo log.
    ///
    /// `headers` become `KEY: value` lines before the QSO lines.
    pub fn to_cabrillo(
        &self,
        fields: &[CabrilloField],
        headers: &[(&str, &str)],
    ) -> Result<String, FieldError> {
        let mut lines: Vec<String> = headers
            .iter()
            .map(|(key, value)| format!("{}: {}", key.to_uppercase(), value))
            .collect();
        for view in self.iter() {
            lines.push(view.to_cabrillo(fields)?);
        }
        lines.push("END_OF_LOG:".to_string());
        Ok(lines.join("\n"))
    }
}

/// A trailing record consisting of a single empty `*eof*` tag.
fn eof_mark(record: &Record) -> Option<String> {
    let mut fields = record.fields();
    match (fields.next(), fields.next()) {
        (Some((name, "")), None) if name.contains("eof") => Some(name.to_string()),
        _ => None,
    }
}

impl fmt::Display for Log {
    /// Header text, header tags and `<eoh>` if there is a header, then the
    /// records sorted by date, separated by blank lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some(header) = &self.header {
            write!(f, "{}\n\n", header)?;
            for (name, value) in &self.header_tags {
                write_tag(f, name, value)?;
                writeln!(f)?;
            }
            write!(f, "<eoh>")?;
            first = false;
        }
        for view in self.sorted_by_date() {
            if !first {
                write!(f, "\n\n")?;
            }
            write!(f, "{}", view)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "Exported by a logger\nversion 1.2\n\
        <ADIF_VER:5>3.1.0 <PROGRAMID:6>logger\n<EOH>\n\
        <CALL:6>OE1ABC <QSO_DATE:8>20230615 <TIME_ON:4>1230 <MODE:3>SSB <FREQ:6>14.250 <EOR>\n\
        <CALL:5>DL1AA <QSO_DATE:8>20230614 <TIME_ON:4>0800 <MODE:2>CW <FREQ:5>7.012 <EOR>\n\
        <CALL:6>OE1ABC <QSO_DATE:8>20230616 <TIME_ON:4>0915 <MODE:2>CW <FREQ:5>3.550 <EOR>\n";

    fn parse(input: &str) -> AdifResult<Log> {
        Log::parse_str(input, LogContext::new())
    }

    #[test]
    fn test_parse_sample() {
        let log = parse(SAMPLE).unwrap();
        assert_eq!(log.header(), Some("Exported by a logger\nversion 1.2"));
        assert_eq!(log.header_tags().get("adif_ver").map(String::as_str), Some("3.1.0"));
        assert_eq!(log.header_tags().get("programid").map(String::as_str), Some("logger"));
        assert_eq!(log.len(), 3);
        assert_eq!(log.records()[1].call(), Some("DL1AA"));
        assert_eq!(log.eof_mark(), None);
    }

    #[test]
    fn test_by_call_index() {
        let log = parse(SAMPLE).unwrap();
        let views = log.by_call("OE1ABC");
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].record().get("time_on"), Some("0915"));
        assert!(log.by_call("K1ABC").is_empty());

        let mut log = log;
        log.append(Record::new("K1ABC", "CW", "20230617", "1000"));
        assert_eq!(log.by_call("K1ABC").len(), 1);
        let mut calls: Vec<_> = log.calls().collect();
        calls.sort();
        assert_eq!(calls, vec!["DL1AA", "K1ABC", "OE1ABC"]);
    }

    #[test]
    fn test_no_header() {
        let log = parse("<call:4>W1AW<eor>").unwrap();
        assert_eq!(log.header(), None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_leading_whitespace_is_not_a_header() {
        let log = parse("\n\n  <call:4>W1AW<eor>").unwrap();
        assert_eq!(log.header(), None);
        assert!(log.header_tags().is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let log = parse("").unwrap();
        assert!(log.is_empty());
        assert_eq!(log.header(), None);
    }

    #[test]
    fn test_header_keeps_malformed_tag_as_text() {
        let log = parse("Created <:x> today\n<eoh><call:4>W1AW<eor>").unwrap();
        assert_eq!(log.header(), Some("Created <:x> today"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_end_of_stream_after_eor() {
        let log = parse("<call:4>W1AW<eor><call:5>K1ABC<eor>").unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_missing_final_eor() {
        let log = parse("<call:4>W1AW<eor><call:5>K1ABC").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].call(), Some("K1ABC"));
    }

    #[test]
    fn test_empty_record_ends_stream() {
        let log = parse("<call:4>W1AW<eor>\n<eor><call:5>K1ABC<eor>").unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_duplicate_field_last_wins() {
        let log = parse("<call:4>W1AW<CALL:5>K1ABC<eor>").unwrap();
        assert_eq!(log.records()[0].call(), Some("K1ABC"));
    }

    #[test]
    fn test_end_tag_with_value_is_error() {
        let err = parse("<call:4>W1AW<eor:1>x").unwrap_err();
        assert!(err.to_string().contains("invalid <eor>"));
    }

    #[test]
    fn test_zero_length_field_is_not_end_of_record() {
        let log = parse("<call:4>W1AW<qsl_sent><band:3>20m<eor>").unwrap();
        assert_eq!(log.len(), 1);
        let record = &log.records()[0];
        assert_eq!(record.get("qsl_sent"), Some(""));
        assert_eq!(record.get("band"), Some("20m"));
    }

    #[test]
    fn test_format_error_aborts_parse() {
        let err = parse("<call:4>W1AW<eor>\n<call:x>K1ABC<eor>").unwrap_err();
        match err {
            AdifError::Format { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_eof_mark_is_removed() {
        let log = parse("<call:4>W1AW<eor><app_eof><eor>").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.eof_mark(), Some("app_eof"));
    }

    #[test]
    fn test_reader_iterator_fuses_after_error() {
        let tokenizer = Tokenizer::new("<call:4>W1AW<eor><:1>x<eor><call:4>K1AB<eor>".as_bytes());
        let mut reader = RecordReader::new(tokenizer);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_custom_end_tag() {
        let tokenizer = Tokenizer::new("<call:4>W1AW<eor><band:3>20m<EOT><call:5>K1ABC<eot>".as_bytes());
        let reader = RecordReader::new(tokenizer).with_end_tag("EOT");
        let records: Vec<Record> = reader.collect::<AdifResult<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("eor"), Some(""));
        assert_eq!(records[0].get("band"), Some("20m"));
        assert_eq!(records[1].call(), Some("K1ABC"));
    }

    #[test]
    fn test_display_sorted_by_date() {
        let log = parse(SAMPLE).unwrap();
        let text = log.to_string();
        assert!(text.starts_with(
            "Exported by a logger\nversion 1.2\n\n<adif_ver:5>3.1.0\n<programid:6>logger\n<eoh>\n\n"
        ));
        let dl = text.find("DL1AA").unwrap();
        let oe = text.find("OE1ABC").unwrap();
        assert!(dl < oe);
        assert!(text.ends_with("<eor>"));
    }

    #[test]
    fn test_cabrillo_log() {
        let context = LogContext::new()
            .with_callsign("OE3RSU")
            .with_mode_map(ModeMap::from_iter([("SSB", "PH")]));
        let log = Log::parse_str(
            "<call:6>OE1ABC<qso_date:8>20230615<time_on:4>1230<mode:3>SSB<freq:6>14.250\
             <rst_sent:2>59<rst_rcvd:2>57<gridsquare:4>JN88<eor>",
            context,
        )
        .unwrap();
        let fields: Vec<CabrilloField> = ["frqint:5", "mode:2", "call:8"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let text = log
            .to_cabrillo(&fields, &[("start-of-log", "3.0")])
            .unwrap();
        assert_eq!(
            text,
            "START-OF-LOG: 3.0\nQSO: 14250 PH OE1ABC  \nEND_OF_LOG:"
        );
    }

    #[test]
    fn test_round_trip_with_header() {
        let log = parse(SAMPLE).unwrap();
        let reparsed = parse(&log.to_string()).unwrap();
        assert_eq!(reparsed.header(), log.header());
        let mut original: Vec<_> = log.records().to_vec();
        let mut again: Vec<_> = reparsed.records().to_vec();
        original.sort_by(|a, b| a.get("qso_date").cmp(&b.get("qso_date")));
        again.sort_by(|a, b| a.get("qso_date").cmp(&b.get("qso_date")));
        assert_eq!(original, again);
    }

    #[test]
    fn test_round_trip_keeps_stored_values_and_header_tags() {
        let context = LogContext::new().with_mode_map(ModeMap::from_iter([("SSB", "PH")]));
        let log = Log::parse_str(SAMPLE, context.clone()).unwrap();
        assert_eq!(log.by_call("DL1AA")[0].lookup("mode").unwrap().as_deref(), Some("PH"));

        let text = log.to_string();
        assert!(text.contains("<mode:3>SSB"));
        assert!(!text.contains("<mode:2>PH"));

        let reparsed = Log::parse_str(&text, context).unwrap();
        assert_eq!(reparsed.header_tags(), log.header_tags());
        let stored = |log: &Log| {
            let mut records = log.records().to_vec();
            records.sort_by(|a, b| a.get("qso_date").cmp(&b.get("qso_date")));
            records
        };
        assert_eq!(stored(&reparsed), stored(&log));
        assert_eq!(reparsed.by_call("OE1ABC")[0].record().get("mode"), Some("SSB"));
    }

    proptest! {
        #[test]
        fn prop_record_round_trip(
            fields in prop::collection::btree_map("[a-z][a-z0-9_]{0,11}", "[ -~]{1,40}", 1..8)
        ) {
            prop_assume!(!fields.contains_key(END_OF_RECORD));
            let record = Record::from_fields(fields.iter().map(|(k, v)| (k.as_str(), v.clone())));
            let log = parse(&record.to_string()).unwrap();
            prop_assert_eq!(log.len(), 1);
            prop_assert_eq!(&log.records()[0], &record);
        }
    }
}
