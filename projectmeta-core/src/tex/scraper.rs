//! Scrape parameterless macro definitions (`\def`, `\newcommand`) from TeX
//! source and substitute them textually.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use super::delimiter::{scan_balanced, Bracket};

// `\def\name{` and `\def \name {`
static DEF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\def\s*(?P<token>\\[A-Za-z@]+)\s*\{").expect("valid def regex"));

// `\newcommand{\name}{`, `\newcommand { \name } {` and `\newcommand \name {`
static NEWCOMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\newcommand\s*(?:\{\s*(?P<braced>\\[A-Za-z@]+)\s*\}|(?P<bare>\\[A-Za-z@]+))\s*\{",
    )
    .expect("valid newcommand regex")
});

static CONTROL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[A-Za-z@]+").expect("valid control word regex"));

/// Macro tokens (including the leading backslash) and their replacement text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    macros: HashMap<String, String>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine a macro; the latest definition wins.
    pub fn insert(&mut self, token: impl Into<String>, replacement: impl Into<String>) {
        self.macros.insert(token.into(), replacement.into());
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.macros.get(token).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.macros.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// A definition found in the source, before it is folded into a table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Definition {
    offset: usize,
    token: String,
    replacement: String,
}

fn scrape(tex_source: &str, pattern: &Regex, token_groups: &[&str]) -> Vec<Definition> {
    pattern
        .captures_iter(tex_source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let token = token_groups.iter().find_map(|g| caps.name(g))?.as_str();
            // The pattern ends on the opening brace of the body.
            let body_start = whole.end() - 1;
            match scan_balanced(tex_source, body_start, Bracket::Curly) {
                Ok(body) => Some(Definition {
                    offset: whole.start(),
                    token: token.to_string(),
                    replacement: body.content.to_string(),
                }),
                Err(e) => {
                    warn!(token, error = %e, "Skipping macro definition with unbalanced body");
                    None
                }
            }
        })
        .collect()
}

fn into_table(definitions: impl IntoIterator<Item = Definition>) -> MacroTable {
    let mut table = MacroTable::new();
    for d in definitions {
        table.insert(d.token, d.replacement);
    }
    table
}

/// Macros defined with `\def`.
pub fn get_def_macros(tex_source: &str) -> MacroTable {
    into_table(scrape(tex_source, &DEF_PATTERN, &["token"]))
}

/// Macros defined with `\newcommand`. Definitions taking parameters
/// (`\newcommand{\x}[1]{..}`) are not matched.
pub fn get_newcommand_macros(tex_source: &str) -> MacroTable {
    into_table(scrape(tex_source, &NEWCOMMAND_PATTERN, &["braced", "bare"]))
}

/// All macros, folded in source order across both definition styles.
pub fn get_macros(tex_source: &str) -> MacroTable {
    let mut definitions = scrape(tex_source, &DEF_PATTERN, &["token"]);
    definitions.extend(scrape(tex_source, &NEWCOMMAND_PATTERN, &["braced", "bare"]));
    definitions.sort_by_key(|d| d.offset);
    let table = into_table(definitions);
    debug!(count = table.len(), "Scraped macro definitions");
    table
}

/// Replace every occurrence of each macro token with its replacement.
///
/// Tokens are matched as whole control words, so a `\ab` macro never
/// touches `\abc`. One pass only: replacements are not rescanned.
pub fn replace_macros(tex_source: &str, macros: &MacroTable) -> String {
    if macros.is_empty() {
        return tex_source.to_string();
    }
    CONTROL_WORD
        .replace_all(tex_source, |caps: &Captures<'_>| {
            let word = &caps[0];
            macros.get(word).unwrap_or(word).to_string()
        })
        .into_owned()
}
