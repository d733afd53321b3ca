//! Minimal BibTeX reading for citation display.
//!
//! Only what citation linking needs is modelled: entry type, key and raw
//! field values. `@string`, `@preamble` and `@comment` blocks are skipped and
//! string concatenation (`#`) is not expanded.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use super::delimiter::{scan_balanced, Bracket};

static ENTRY_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(?P<type>[A-Za-z]+)\s*\{").expect("valid bibtex entry regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BibtexError {
    #[error("no URL can be derived for entry {0:?}")]
    NoUrl(String),

    #[error("entry {0:?} has no year")]
    MissingYear(String),

    #[error("entry {0:?} has no author")]
    MissingAuthor(String),
}

/// Something that can describe citation keys for display.
///
/// Both lookups are optional: a missing entry or field is not a failure.
pub trait BibliographyLookup {
    fn url(&self, key: &str) -> Option<String>;

    /// `Author Year`, or `Author (Year)` when `paren` is set.
    fn author_year(&self, key: &str, paren: bool) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    /// Lowercased entry type, e.g. `article` or `docushare`.
    pub entry_type: String,
    pub key: String,
    /// Field values keyed by lowercased field name.
    pub fields: HashMap<String, String>,
}

impl BibEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Canonical URL for the entry.
    ///
    /// DocuShare documents (or anything with a `handle`) link to
    /// `https://ls.st/HANDLE`; otherwise `adsurl`, then `doi`, then `url`.
    pub fn url(&self) -> Result<String, BibtexError> {
        if let Some(handle) = self.field("handle") {
            return Ok(format!("https://ls.st/{handle}"));
        }
        if self.entry_type == "docushare" {
            return Ok(format!("https://ls.st/{}", self.key));
        }
        if let Some(adsurl) = self.field("adsurl") {
            return Ok(adsurl.to_string());
        }
        if let Some(doi) = self.field("doi") {
            return Ok(format!("https://doi.org/{doi}"));
        }
        if let Some(url) = self.field("url") {
            return Ok(url.to_string());
        }
        Err(BibtexError::NoUrl(self.key.clone()))
    }

    /// Short author-year label: `Swinbank 2017`, `Leistedt and Hogg 2017`,
    /// `Juric et al. 2015`, or `Swinbank (2017)` with `paren`.
    pub fn author_year(&self, paren: bool) -> Result<String, BibtexError> {
        let year = self
            .field("year")
            .ok_or_else(|| BibtexError::MissingYear(self.key.clone()))?;
        let author = self
            .field("author")
            .ok_or_else(|| BibtexError::MissingAuthor(self.key.clone()))?;

        let last_names: Vec<String> = split_persons(author).iter().map(|p| last_name(p)).collect();
        let authors = match last_names.as_slice() {
            [] => return Err(BibtexError::MissingAuthor(self.key.clone())),
            [only] => only.clone(),
            [first, second] => format!("{first} and {second}"),
            [first, ..] => format!("{first} et al."),
        };

        if paren {
            Ok(format!("{authors} ({year})"))
        } else {
            Ok(format!("{authors} {year}"))
        }
    }
}

/// Words of `s`, split on whitespace outside of brace groups.
fn top_level_words(s: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut depth = 0i32;
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if let Some(s0) = start.take() {
                words.push(&s[s0..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s0) = start {
        words.push(&s[s0..]);
    }
    words
}

fn split_persons(author: &str) -> Vec<Vec<&str>> {
    let mut persons = vec![Vec::new()];
    for word in top_level_words(author) {
        if word.eq_ignore_ascii_case("and") {
            persons.push(Vec::new());
        } else if let Some(current) = persons.last_mut() {
            current.push(word);
        }
    }
    persons.retain(|p| !p.is_empty());
    persons
}

/// `{Zibetti}, S.` → `Zibetti`; `John D. Swinbank` → `Swinbank`.
fn last_name(words: &[&str]) -> String {
    let comma_at = words.iter().position(|w| top_level_comma(w).is_some());
    let raw = match comma_at {
        Some(i) => {
            let word = words[i];
            let cut = top_level_comma(word).unwrap_or(word.len());
            let mut parts: Vec<&str> = words[..i].to_vec();
            parts.push(&word[..cut]);
            parts.join(" ")
        }
        None => words.last().copied().unwrap_or_default().to_string(),
    };
    raw.replace(['{', '}'], "")
}

fn top_level_comma(word: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in word.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parsed entries of one or more `.bib` sources.
#[derive(Debug, Clone, Default)]
pub struct Bibliography {
    entries: HashMap<String, BibEntry>,
}

impl Bibliography {
    /// Parse BibTeX text. Malformed entries are logged and skipped.
    pub fn parse(text: &str) -> Self {
        let mut bibliography = Self::default();
        bibliography.extend_from_str(text);
        bibliography
    }

    /// Add entries from more BibTeX text; existing keys are replaced.
    pub fn extend_from_str(&mut self, text: &str) {
        for caps in ENTRY_START.captures_iter(text) {
            let (Some(whole), Some(entry_type)) = (caps.get(0), caps.name("type")) else {
                continue;
            };
            let entry_type = entry_type.as_str().to_ascii_lowercase();
            if matches!(entry_type.as_str(), "string" | "preamble" | "comment") {
                continue;
            }
            let body = match scan_balanced(text, whole.end() - 1, Bracket::Curly) {
                Ok(body) => body.content,
                Err(e) => {
                    warn!(error = %e, "Skipping unbalanced BibTeX entry");
                    continue;
                }
            };
            if let Some(entry) = parse_entry_body(&entry_type, body) {
                self.entries.insert(entry.key.clone(), entry);
            }
        }
        debug!(entries = self.entries.len(), "Parsed BibTeX entries");
    }

    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BibliographyLookup for Bibliography {
    fn url(&self, key: &str) -> Option<String> {
        self.get(key)?.url().ok()
    }

    fn author_year(&self, key: &str, paren: bool) -> Option<String> {
        self.get(key)?.author_year(paren).ok()
    }
}

fn parse_entry_body(entry_type: &str, body: &str) -> Option<BibEntry> {
    let (key, rest) = match body.find(',') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body, ""),
    };
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let mut fields = HashMap::new();
    let mut cursor = 0;
    while let Some((name, value, next)) = parse_field(rest, cursor) {
        fields.insert(name.to_ascii_lowercase(), normalize_value(value));
        cursor = next;
    }

    Some(BibEntry {
        entry_type: entry_type.to_string(),
        key: key.to_string(),
        fields,
    })
}

/// Parse `name = value` starting at `from`; returns the field and the
/// offset after it.
fn parse_field(rest: &str, from: usize) -> Option<(&str, &str, usize)> {
    let bytes = rest.as_bytes();
    let mut i = from;
    while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b',') {
        i += 1;
    }
    let name_start = i;
    let is_name_byte = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.');
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let name = &rest[name_start..i];
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    match bytes.get(i)? {
        b'{' => {
            let found = scan_balanced(rest, i, Bracket::Curly).ok()?;
            Some((name, found.content, found.end))
        }
        b'"' => {
            let mut depth = 0i32;
            for (j, c) in rest[i + 1..].char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    '"' if depth == 0 => {
                        let end = i + 1 + j;
                        return Some((name, &rest[i + 1..end], end + 1));
                    }
                    _ => {}
                }
            }
            None
        }
        _ => {
            let len = rest[i..].find(',').unwrap_or(rest.len() - i);
            Some((name, rest[i..i + len].trim(), i + len))
        }
    }
}

/// Collapse internal whitespace runs to single spaces.
fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
