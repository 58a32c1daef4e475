//! The ARRL DXCC entity list.
//!
//! The published list is a plain-text document containing one section per
//! entity type (current and deleted entities). Each section starts with
//! `ARRL DXCC LIST`, has a short header (type, edition, total), a table of
//! entities with their prefixes and zones, and numbered notes that refer
//! back to entities through cross references such as `3Y(1)`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, info};

use crate::prefix::{self, PrefixError};

/// Where ARRL publishes the current list.
pub const DXCC_LIST_URL: &str = "http://www.arrl.org/files/file/DXCC/2019_Current_Deleted(3).txt";

/// Marker starting every section of the document.
const SECTION_MARKER: &str = "ARRL DXCC LIST";

/// Type of the list of entities that still count.
pub const CURRENT: &str = "CURRENT";

static RE_ENTITY_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(CURRENT|DELETED) ENTITIES").expect("valid regex"));
static RE_EDITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][a-z]+)\s+([0-9]{4})\s+Edition").expect("valid regex"));
static RE_TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+)\s+Entities Total:\s+([0-9]+)\b").expect("valid regex")
});
static RE_HEADER_ZONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ZONE\s+Entity").expect("valid regex"));
static RE_HEADER_COLUMNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Prefix\s+Entity\s+Continent\s+ITU\s+CQ\s+Code").expect("valid regex")
});
static RE_HEADER_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*_){5}").expect("valid regex"));
static RE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s+(\S+)\s+(.+)\s+([AEONS][ACEFONSU,]+)\s+",
        r"([-()0-9,A-Z]+)\s+([-()0-9,A-Z]+)\s+([0-9]{3})"
    ))
    .expect("valid regex")
});
static RE_NOTES_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^NOTES:").expect("valid regex"));
static RE_NOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+([0-9]+)\s+(.*)$").expect("valid regex"));
static RE_SPECIAL_NOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+([\^])\s+(.*)$").expect("valid regex"));
static RE_NOTES_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Zone Notes can be found").expect("valid regex"));

/// Errors raised while loading the DXCC list.
#[derive(Debug, Error)]
pub enum DxccError {
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("line {line}: {source}")]
    Prefix {
        line: usize,
        #[source]
        source: PrefixError,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid get result: {status}: {reason}\n    {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("no ARRL DXCC LIST section found")]
    MissingSection,

    #[error("duplicate {0} section")]
    DuplicateSection(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A DXCC entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub code: u16,
    pub name: String,
    /// Continent code, or several separated by commas.
    pub continent: String,
    /// ITU zone(s) or a reference to the zone notes, e.g. `(A)`.
    pub itu_zone: String,
    /// CQ zone(s), same form as the ITU zone.
    pub cq_zone: String,
    pub prefixes: Vec<String>,
    pub notes: Vec<String>,
    /// Organisation suffix such as `AA` in `KC4_AA`.
    pub org: Option<String>,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03} {:<35} {} ITU: {} CQ: {} {}",
            self.code,
            self.name,
            self.continent,
            self.itu_zone,
            self.cq_zone,
            self.prefixes.join(",")
        )?;
        if let Some(org) = &self.org {
            write!(f, " Org: {}", org)?;
        }
        if !self.notes.is_empty() {
            write!(f, "\n  Notes:")?;
            for line in self.notes.iter().flat_map(|note| note.lines()) {
                write!(f, "\n    {}", line)?;
            }
        }
        Ok(())
    }
}

/// One section of the list.
#[derive(Debug, Clone, Default)]
pub struct DxccList {
    entity_type: Option<String>,
    edition: Option<String>,
    total: Option<usize>,
    head_text: Vec<String>,
    entities: Vec<Entity>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<u16, usize>,
    prefixes: HashMap<String, Vec<usize>>,
    max_prefix_len: usize,
}

impl DxccList {
    /// Parse a single section, starting with its `ARRL DXCC LIST` line.
    pub fn parse_str(section: &str) -> Result<Self, DxccError> {
        Self::parse_section(section, 1)
    }

    /// Parse a section whose first line is line `first_line` of the document.
    fn parse_section(section: &str, first_line: usize) -> Result<Self, DxccError> {
        let mut parser = SectionParser::default();
        for (offset, line) in section.lines().enumerate() {
            parser.line = first_line + offset;
            parser.feed(line.trim_end())?;
        }
        parser.finish()
    }

    /// `CURRENT` or `DELETED`.
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Edition such as `April 2019`.
    pub fn edition(&self) -> Option<&str> {
        self.edition.as_deref()
    }

    /// Number of entities the list claims to contain.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Explanatory text between the section header and the table.
    pub fn head_text(&self) -> &[String] {
        &self.head_text
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Entity by name. With duplicate names the last one listed wins.
    pub fn by_name(&self, name: &str) -> Option<&Entity> {
        self.by_name.get(name).map(|&index| &self.entities[index])
    }

    pub fn by_code(&self, code: u16) -> Option<&Entity> {
        self.by_code.get(&code).map(|&index| &self.entities[index])
    }

    /// All entities sharing the longest prefix that matches `callsign`.
    ///
    /// A prefix may belong to several entities (for example where the
    /// zone decides), so every one of them is returned.
    pub fn lookup(&self, callsign: &str) -> Vec<&Entity> {
        let call = callsign.trim().to_uppercase();
        let ends = call
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take(self.max_prefix_len)
            .collect::<Vec<_>>();
        ends.iter()
            .rev()
            .find_map(|&end| self.prefixes.get(&call[..end]))
            .map(|indices| indices.iter().map(|&index| &self.entities[index]).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    /// Before the section marker.
    #[default]
    Init,
    /// Section header: type, edition and total.
    Dxcc,
    /// Text and column headers before the table.
    Head,
    List,
    Note,
    Done,
}

#[derive(Default)]
struct SectionParser {
    state: State,
    line: usize,
    list: DxccList,
    /// Note key to the entities referring to it.
    crossref: HashMap<String, Vec<usize>>,
    notes: Vec<(String, String)>,
    last_note: Option<usize>,
}

impl SectionParser {
    fn format_error(&self, message: impl Into<String>) -> DxccError {
        DxccError::Format {
            line: self.line,
            message: message.into(),
        }
    }

    fn feed(&mut self, line: &str) -> Result<(), DxccError> {
        let text = line.trim_start();
        match self.state {
            State::Init => {
                if line.contains(SECTION_MARKER) {
                    self.state = State::Dxcc;
                }
            }
            State::Dxcc if text.is_empty() => {}
            State::Dxcc => {
                if let Some(caps) = RE_ENTITY_TYPE.captures(text) {
                    self.list.entity_type = Some(caps[1].to_string());
                } else if let Some(caps) = RE_EDITION.captures(text) {
                    self.list.edition = Some(format!("{} {}", &caps[1], &caps[2]));
                } else if let Some(caps) = RE_TOTAL.captures(text) {
                    self.set_total(&caps)?;
                } else {
                    self.state = State::Head;
                    return self.feed(line);
                }
            }
            State::Head => {
                if RE_HEADER_RULE.is_match(line) {
                    self.state = State::List;
                } else if !RE_HEADER_ZONE.is_match(text)
                    && !RE_HEADER_COLUMNS.is_match(text)
                    && !text.is_empty()
                {
                    self.list.head_text.push(line.to_string());
                }
            }
            State::List => {
                if let Some(caps) = RE_ENTRY.captures(line) {
                    self.add_entry(&caps)?;
                } else if RE_NOTES_START.is_match(text) {
                    self.state = State::Note;
                } else if !text.is_empty() {
                    debug!(line = self.line, "skipping unrecognised list line: {}", text);
                }
            }
            State::Note => {
                if let Some(caps) = RE_NOTE
                    .captures(line)
                    .or_else(|| RE_SPECIAL_NOTE.captures(line))
                {
                    self.add_note(&caps[1], caps[2].trim_end());
                } else if RE_NOTES_END.is_match(text) {
                    self.attach_notes();
                    self.state = State::Done;
                } else if !text.is_empty() {
                    match self.last_note {
                        Some(index) => {
                            let note = &mut self.notes[index].1;
                            note.push('\n');
                            note.push_str(text);
                        }
                        None => debug!(line = self.line, "text before first note: {}", text),
                    }
                }
            }
            State::Done => {}
        }
        Ok(())
    }

    fn set_total(&mut self, caps: &Captures) -> Result<(), DxccError> {
        let total = caps[2]
            .parse()
            .map_err(|_| self.format_error(format!("invalid total: {}", &caps[2])))?;
        match &self.list.entity_type {
            Some(entity_type) if entity_type.eq_ignore_ascii_case(&caps[1]) => {
                self.list.total = Some(total);
                Ok(())
            }
            other => Err(self.format_error(format!(
                "total for {} entities in {} section",
                &caps[1],
                other.as_deref().unwrap_or("untyped")
            ))),
        }
    }

    fn add_entry(&mut self, caps: &Captures) -> Result<(), DxccError> {
        let index = self.list.entities.len();
        let code: u16 = caps[6]
            .parse()
            .map_err(|_| self.format_error(format!("invalid entity code: {}", &caps[6])))?;

        let mut token = caps[1].trim_end_matches(['#', '*']);
        if let Some((head, refs)) = token.split_once('(') {
            let refs = refs
                .strip_suffix(')')
                .ok_or_else(|| self.format_error(format!("unterminated cross reference: {}", token)))?;
            for key in refs.split("),(") {
                self.crossref.entry(key.to_string()).or_default().push(index);
            }
            token = head.trim_end_matches(['#', '*']);
        }

        let (mut token, mut org) = match token.split_once('_') {
            Some((head, org)) => (head, Some(org)),
            None => (token, None),
        };

        // Antarctica carries its own note marker, after the prefix or the
        // organisation.
        let antarctica = if let Some(head) = token.strip_suffix('^') {
            token = head;
            true
        } else if let Some(head) = org.and_then(|org| org.strip_suffix('^')) {
            org = Some(head);
            true
        } else {
            false
        };
        if antarctica {
            if self.crossref.contains_key("^") {
                return Err(self.format_error("duplicate ^ note marker"));
            }
            self.crossref.insert("^".to_string(), vec![index]);
        }

        let mut parts: Vec<String> = token.split(',').map(str::to_string).collect();
        // "3B6,7" is short for 3B6 and 3B7.
        if let [first, second] = parts.as_mut_slice() {
            if second.len() == 1
                && second.chars().all(|c| c.is_ascii_digit())
                && first.ends_with(|c: char| c.is_ascii_digit())
            {
                *second = format!("{}{}", &first[..first.len() - 1], second);
            }
        }

        let mut prefixes = Vec::new();
        for part in parts.iter().filter(|part| !part.is_empty()) {
            let expanded = prefix::expand(part).map_err(|source| DxccError::Prefix {
                line: self.line,
                source,
            })?;
            prefixes.extend(expanded);
        }

        let entity = Entity {
            code,
            name: caps[2].trim_end().to_string(),
            continent: caps[3].to_string(),
            itu_zone: caps[4].to_string(),
            cq_zone: caps[5].to_string(),
            prefixes,
            notes: Vec::new(),
            org: org.map(str::to_string),
        };

        let list = &mut self.list;
        for prefix in &entity.prefixes {
            list.max_prefix_len = list.max_prefix_len.max(prefix.chars().count());
            list.prefixes.entry(prefix.clone()).or_default().push(index);
        }
        list.by_name.insert(entity.name.clone(), index);
        list.by_code.insert(entity.code, index);
        list.entities.push(entity);
        Ok(())
    }

    fn add_note(&mut self, key: &str, text: &str) {
        let index = match self.notes.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.notes[index].1 = text.to_string();
                index
            }
            None => {
                self.notes.push((key.to_string(), text.to_string()));
                self.notes.len() - 1
            }
        };
        self.last_note = Some(index);
    }

    fn attach_notes(&mut self) {
        for (key, text) in self.notes.drain(..) {
            match self.crossref.get(&key) {
                Some(indices) => {
                    for &index in indices {
                        self.list.entities[index].notes.push(text.clone());
                    }
                }
                None => debug!("note {} is not referenced by any entity", key),
            }
        }
        self.last_note = None;
    }

    fn finish(mut self) -> Result<DxccList, DxccError> {
        if self.state == State::Init {
            return Err(DxccError::MissingSection);
        }
        if self.state == State::Note {
            self.attach_notes();
        }
        Ok(self.list)
    }
}

/// The complete published document, with one list per entity type.
#[derive(Debug, Clone, Default)]
pub struct DxccFile {
    lists: Vec<DxccList>,
    by_type: HashMap<String, usize>,
}

impl DxccFile {
    pub fn load_file(path: &Path) -> Result<Self, DxccError> {
        let text = fs::read_to_string(path)?;
        Self::parse_str(&text)
    }

    /// Download and parse the list.
    pub async fn fetch(url: &str) -> Result<Self, DxccError> {
        info!(url, "fetching DXCC list");
        let response = reqwest::get(url).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DxccError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
                body,
            });
        }
        let text = response.text().await?;
        Self::parse_str(&text)
    }

    /// Split the document at each `ARRL DXCC LIST` and parse every
    /// non-blank section. Text before the first marker is ignored.
    pub fn parse_str(text: &str) -> Result<Self, DxccError> {
        let mut chunks = text.split(SECTION_MARKER);
        let preamble = chunks.next().unwrap_or_default();
        let mut line = 1 + preamble.matches('\n').count();

        let mut file = DxccFile::default();
        for chunk in chunks {
            let first_line = line;
            line += chunk.matches('\n').count();
            if chunk.trim().is_empty() {
                continue;
            }

            let list = DxccList::parse_section(&format!("{}{}", SECTION_MARKER, chunk), first_line)?;
            let entity_type = list
                .entity_type()
                .ok_or_else(|| DxccError::Format {
                    line: first_line,
                    message: "section without entity type".to_string(),
                })?
                .to_uppercase();
            if file.by_type.contains_key(&entity_type) {
                return Err(DxccError::DuplicateSection(entity_type));
            }
            debug!(
                entity_type = entity_type.as_str(),
                entities = list.entities().len(),
                "parsed DXCC section"
            );
            file.by_type.insert(entity_type, file.lists.len());
            file.lists.push(list);
        }

        if file.lists.is_empty() {
            return Err(DxccError::MissingSection);
        }
        Ok(file)
    }

    /// The list of the given entity type (`CURRENT`, `DELETED`).
    pub fn by_type(&self, entity_type: &str) -> Option<&DxccList> {
        self.by_type
            .get(&entity_type.to_uppercase())
            .map(|&index| &self.lists[index])
    }

    pub fn current(&self) -> Option<&DxccList> {
        self.by_type(CURRENT)
    }

    pub fn into_current(mut self) -> Option<DxccList> {
        let index = self.by_type.remove(CURRENT)?;
        Some(self.lists.swap_remove(index))
    }

    pub fn lists(&self) -> &[DxccList] {
        &self.lists
    }
}
