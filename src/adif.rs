//! Character-level tokenizer for the ADIF tag-length-value format.
//!
//! An ADIF stream is a sequence of tags of the form
//! ```text
//! <NAME:LENGTH[:TYPE]>VALUE
//! <NAME>
//! ```
//! where `LENGTH` is the exact number of characters of `VALUE` that follow
//! the closing `>`. Tag names are case-insensitive and are normalized to
//! lowercase. Zero-length tags such as `<EOR>` and `<EOH>` carry no value.
//!
//! The tokenizer is a pull-based state machine: [`Tokenizer::next_tag`]
//! consumes exactly one tag from the underlying reader and never reads
//! past it, so a caller may stop after the header and hand the same
//! reader to someone else.
//!
//! # Tolerance
//!
//! Real-world exports are not always clean. Whitespace between tags is
//! always ignored. After a tag carrying a value the tokenizer is lenient
//! and silently drops stray characters up to the next `<`. At the start of
//! a record and after a zero-length tag it is strict and any character
//! other than whitespace or `<` is a format error.

use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;

use nom::{
    IResult, Parser,
    branch::alt,
    character::complete::{char, digit1, satisfy},
    combinator::{all_consuming, map_res, opt, recognize},
    sequence::{preceded, terminated},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

/// Errors raised while reading an ADIF stream.
#[derive(Debug, Error)]
pub enum AdifError {
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for ADIF reading operations.
pub type AdifResult<T> = Result<T, AdifError>;

/// Text encoding of an ADIF stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// ISO-8859-1, one byte per character.
    Latin1,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            other => Err(format!("unsupported encoding: {}", other)),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => write!(f, "utf-8"),
            Encoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

impl<'de> Deserialize<'de> for Encoding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single tag read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased tag name.
    pub name: String,
    /// Tag value; empty for zero-length tags.
    pub value: String,
}

/// Failure to produce the next character.
enum CharError {
    Io(io::Error),
    /// Bytes that are not valid in the stream's encoding.
    Decode(String),
}

impl From<io::Error> for CharError {
    fn from(e: io::Error) -> Self {
        CharError::Io(e)
    }
}

/// Decodes characters one at a time from a buffered reader.
struct CharReader<R> {
    inner: R,
    encoding: Encoding,
}

impl<R: BufRead> CharReader<R> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.inner.fill_buf()? {
            [] => return Ok(None),
            [first, ..] => *first,
        };
        self.inner.consume(1);
        Ok(Some(byte))
    }

    fn read_char(&mut self) -> Result<Option<char>, CharError> {
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };

        if self.encoding == Encoding::Latin1 {
            return Ok(Some(char::from(first)));
        }

        let width = match first {
            0x00..=0x7f => return Ok(Some(char::from(first))),
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => {
                return Err(CharError::Decode(format!(
                    "invalid UTF-8 lead byte 0x{:02x}",
                    first
                )));
            }
        };

        let mut buf = [first, 0, 0, 0];
        for slot in &mut buf[1..width] {
            *slot = self
                .read_byte()?
                .ok_or_else(|| CharError::Decode("truncated UTF-8 sequence".to_string()))?;
        }

        std::str::from_utf8(&buf[..width])
            .map_err(|e| CharError::Decode(e.to_string()))
            .map(|s| s.chars().next())
    }
}

/// Parse the `LENGTH[:TYPE]` part of a tag.
///
/// The type may be a single letter (an ADIF data type indicator such as
/// `D` or `S`) or a number, which LoTW emits for its `SIGN_LOTW_V1.0`
/// tag. Only the leading integer is the length.
fn length_spec(input: &str) -> IResult<&str, usize> {
    terminated(
        map_res(digit1, |s: &str| s.parse::<usize>()),
        opt(preceded(
            char(':'),
            alt((recognize(satisfy(|c: char| c.is_ascii_alphabetic())), digit1)),
        )),
    )
    .parse(input)
}

fn parse_length(spec: &str) -> Option<usize> {
    all_consuming(length_spec)
        .parse(spec.trim())
        .ok()
        .map(|(_, count)| count)
}

/// Pull-based ADIF tag reader.
///
/// Holds the cursor state of one parse. It is not meant to be shared
/// between two logical parses of the same stream.
pub struct Tokenizer<R> {
    chars: CharReader<R>,
    peeked: Option<char>,
    line: usize,
    lenient: bool,
    raw: String,
}

impl<R: BufRead> Tokenizer<R> {
    /// Create a UTF-8 tokenizer.
    pub fn new(reader: R) -> Self {
        Self::with_encoding(reader, Encoding::Utf8)
    }

    /// Create a tokenizer decoding the stream with the given encoding.
    pub fn with_encoding(reader: R, encoding: Encoding) -> Self {
        Self {
            chars: CharReader {
                inner: reader,
                encoding,
            },
            peeked: None,
            line: 1,
            lenient: false,
            raw: String::new(),
        }
    }

    /// Current line number (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Characters consumed by the most recent call to [`next_tag`](Self::next_tag).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Return to the strict start state, where stray characters are errors.
    pub fn set_strict(&mut self) {
        self.lenient = false;
    }

    /// Build a format error at the current line.
    pub fn format_error(&self, message: impl Into<String>) -> AdifError {
        AdifError::Format {
            line: self.line,
            message: message.into(),
        }
    }

    /// Decode one character. Undecodable bytes are a format error at the
    /// current line.
    fn read_char(&mut self) -> AdifResult<Option<char>> {
        self.chars.read_char().map_err(|e| match e {
            CharError::Io(e) => AdifError::Io(e),
            CharError::Decode(message) => self.format_error(message),
        })
    }

    /// Look at the next character without consuming it.
    pub fn peek_char(&mut self) -> AdifResult<Option<char>> {
        if self.peeked.is_none() {
            self.peeked = self.read_char()?;
        }
        Ok(self.peeked)
    }

    /// Consume the next character.
    pub fn next_char(&mut self) -> AdifResult<Option<char>> {
        let c = match self.peeked.take() {
            Some(c) => Some(c),
            None => self.read_char()?,
        };
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
            }
            self.raw.push(c);
        }
        Ok(c)
    }

    /// Consume whitespace up to the next significant character.
    pub fn skip_whitespace(&mut self) -> AdifResult<()> {
        while let Some(c) = self.peek_char()? {
            if !c.is_whitespace() {
                break;
            }
            self.next_char()?;
        }
        Ok(())
    }

    /// Read the next tag.
    ///
    /// Returns `Ok(None)` when the input ends between tags. Running out of
    /// input inside a tag is a format error.
    pub fn next_tag(&mut self) -> AdifResult<Option<Tag>> {
        self.raw.clear();

        loop {
            match self.next_char()? {
                None => return Ok(None),
                Some('<') => break,
                Some(c) if c.is_whitespace() => {}
                Some(c) if self.lenient => {
                    trace!(line = self.line, "skipping stray character {:?}", c);
                }
                Some(c) => {
                    return Err(self.format_error(format!("expected tag start, got {:?}", c)));
                }
            }
        }

        let mut name = String::new();
        let delimiter = loop {
            match self.next_char()? {
                None => return Err(self.format_error("unexpected end of input in tag name")),
                Some(c @ (':' | '>')) => break c,
                Some(c) => name.extend(c.to_lowercase()),
            }
        };

        if name.is_empty() {
            return Err(self.format_error("empty tag"));
        }

        if delimiter == '>' {
            self.lenient = false;
            return Ok(Some(Tag {
                name,
                value: String::new(),
            }));
        }

        let mut spec = String::new();
        loop {
            match self.next_char()? {
                None => return Err(self.format_error("unexpected end of input in tag length")),
                Some('>') => break,
                Some(c) => spec.push(c),
            }
        }

        let count = parse_length(&spec)
            .ok_or_else(|| self.format_error(format!("invalid count: {}", spec)))?;

        let mut value = String::with_capacity(count.min(4096));
        for _ in 0..count {
            match self.next_char()? {
                Some(c) => value.push(c),
                None => {
                    return Err(self.format_error(format!("unexpected end of input in <{}>", name)));
                }
            }
        }

        self.lenient = true;
        Ok(Some(Tag { name, value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(input: &str) -> AdifResult<Vec<(String, String)>> {
        let mut tokenizer = Tokenizer::new(input.as_bytes());
        let mut out = Vec::new();
        while let Some(tag) = tokenizer.next_tag()? {
            out.push((tag.name, tag.value));
        }
        Ok(out)
    }

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_basic_tags() {
        let parsed = tags("<CALL:4>W1AW <BAND:3>20m\n<EOR>").unwrap();
        assert_eq!(
            parsed,
            vec![pair("call", "W1AW"), pair("band", "20m"), pair("eor", "")]
        );
    }

    #[test]
    fn test_zero_length_tag() {
        let parsed = tags("<FOO>").unwrap();
        assert_eq!(parsed, vec![pair("foo", "")]);
    }

    #[test]
    fn test_explicit_zero_length_does_not_eat_next_tag() {
        let parsed = tags("<comment:0><call:4>W1AW").unwrap();
        assert_eq!(parsed, vec![pair("comment", ""), pair("call", "W1AW")]);
    }

    #[test]
    fn test_value_is_taken_verbatim() {
        let parsed = tags("<comment:11>a <b> c\n de").unwrap();
        assert_eq!(parsed, vec![pair("comment", "a <b> c\n de")]);
    }

    #[test]
    fn test_length_counts_characters() {
        let parsed = tags("<name:5>Jürgen<call:4>DL1A").unwrap();
        // The sixth character is stray text after a value and is skipped.
        assert_eq!(parsed, vec![pair("name", "Jürge"), pair("call", "DL1A")]);
    }

    #[test]
    fn test_datatype_suffix() {
        let parsed = tags("<QSO_DATE:8:D>20230615<name:3:S>Bob").unwrap();
        assert_eq!(parsed, vec![pair("qso_date", "20230615"), pair("name", "Bob")]);
    }

    #[test]
    fn test_numeric_suffix_from_lotw() {
        let parsed = tags("<SIGN_LOTW_V1.0:4:6>abcd").unwrap();
        assert_eq!(parsed, vec![pair("sign_lotw_v1.0", "abcd")]);
    }

    #[test]
    fn test_invalid_count() {
        let err = tags("<FOO:abc>xyz").unwrap_err();
        match err {
            AdifError::Format { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("invalid count"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // A fresh parse is unaffected.
        assert_eq!(tags("<FOO:3>xyz").unwrap(), vec![pair("foo", "xyz")]);
    }

    #[test]
    fn test_word_suffix_is_rejected() {
        assert!(tags("<FOO:3:Str>xyz").is_err());
    }

    #[test]
    fn test_empty_tag_name() {
        assert!(matches!(
            tags("<:3>abc"),
            Err(AdifError::Format { .. })
        ));
        assert!(tags("<>").is_err());
    }

    #[test]
    fn test_strict_at_start() {
        let err = tags("junk<call:4>W1AW").unwrap_err();
        assert!(err.to_string().contains("expected tag start"));
    }

    #[test]
    fn test_lenient_after_value() {
        let parsed = tags("<call:4>W1AW junk here <band:3>40m").unwrap();
        assert_eq!(parsed, vec![pair("call", "W1AW"), pair("band", "40m")]);
    }

    #[test]
    fn test_strict_after_zero_length_tag() {
        assert!(tags("<call:4>W1AW<eor>junk<call:4>K1AB").is_err());
    }

    #[test]
    fn test_line_numbers() {
        let err = tags("<call:4>W1AW\n<eor>\n\n<:1>x").unwrap_err();
        match err {
            AdifError::Format { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_value() {
        let err = tags("<call:6>W1AW").unwrap_err();
        assert!(err.to_string().contains("unexpected end of input"));
    }

    #[test]
    fn test_clean_end_of_input() {
        assert!(tags("").unwrap().is_empty());
        assert!(tags("  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_latin1() {
        let bytes: &[u8] = b"<name:6>J\xfcrgen";
        let mut tokenizer = Tokenizer::with_encoding(bytes, Encoding::Latin1);
        let tag = tokenizer.next_tag().unwrap().unwrap();
        assert_eq!(tag.value, "Jürgen");
    }

    #[test]
    fn test_invalid_utf8_is_format_error_with_line() {
        let bytes: &[u8] = b"<call:4>W1AW\n<name:6>J\xfcrgen";
        let mut tokenizer = Tokenizer::new(bytes);
        assert!(tokenizer.next_tag().unwrap().is_some());
        match tokenizer.next_tag() {
            Err(AdifError::Format { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("0xfc"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_utf8_is_format_error() {
        let bytes: &[u8] = b"<name:1>\xc3";
        let mut tokenizer = Tokenizer::new(bytes);
        assert!(matches!(
            tokenizer.next_tag(),
            Err(AdifError::Format { line: 1, .. })
        ));
    }

    #[test]
    fn test_does_not_read_past_tag() {
        let mut tokenizer = Tokenizer::new("<eoh>rest".as_bytes());
        let tag = tokenizer.next_tag().unwrap().unwrap();
        assert_eq!(tag.name, "eoh");
        assert_eq!(tokenizer.peek_char().unwrap(), Some('r'));
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("latin1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("ebcdic".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("5"), Some(5));
        assert_eq!(parse_length(" 5 "), Some(5));
        assert_eq!(parse_length("8:D"), Some(8));
        assert_eq!(parse_length("175:6"), Some(175));
        assert_eq!(parse_length("abc"), None);
        assert_eq!(parse_length(""), None);
        assert_eq!(parse_length("5:"), None);
    }
}
