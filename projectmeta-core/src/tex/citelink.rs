//! Rewrite citation commands into `\href` links.
//!
//! Each variant is a grammar plus a function from a parsed occurrence to its
//! replacement text. The shared driver replaces one occurrence at a time and
//! re-parses from scratch, since every replacement shifts later offsets.

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use super::bibtex::BibliographyLookup;
use super::command::{ArgumentSpec, LatexCommand, ParsedCommand};
use super::delimiter::Bracket;

/// Builds the replacement for one occurrence.
pub type Replacement = fn(&ParsedCommand<'_>, Option<&dyn BibliographyLookup>) -> String;

#[derive(Clone)]
pub struct CommandLinker {
    command: LatexCommand,
    replace: Replacement,
}

impl CommandLinker {
    pub fn new(command: LatexCommand, replace: Replacement) -> Self {
        Self { command, replace }
    }

    pub fn command(&self) -> &LatexCommand {
        &self.command
    }

    /// Replace every occurrence of the command in `tex`.
    pub fn apply(&self, tex: &str, bibliography: Option<&dyn BibliographyLookup>) -> String {
        let mut tex = tex.to_string();
        let mut replaced = 0usize;
        while let Some(parsed) = self.command.parse_first(&tex) {
            let source = parsed.command_source().to_string();
            let replacement = (self.replace)(&parsed, bibliography);
            if replacement == source {
                warn!(command = %self.command.name(), "Citation replacement made no progress");
                break;
            }
            tex = tex.replacen(&source, &replacement, 1);
            replaced += 1;
        }
        if replaced > 0 {
            debug!(command = %self.command.name(), replaced, "Linked citations");
        }
        tex
    }
}

impl std::fmt::Debug for CommandLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLinker")
            .field("command", &self.command.name())
            .finish()
    }
}

fn citation_command(name: &str, optional: &str, required: &str) -> LatexCommand {
    LatexCommand::new(
        name,
        vec![
            ArgumentSpec::optional(optional, Bracket::Square),
            ArgumentSpec::required(required, Bracket::Curly),
        ],
    )
    .expect("valid citation grammar")
}

fn href(url: Option<String>, text: &str) -> String {
    match url {
        Some(url) => format!(r"\href{{{url}}}{{{text}}}"),
        None => text.to_string(),
    }
}

fn docushare_link(parsed: &ParsedCommand<'_>) -> String {
    let key = parsed.get("citekey").unwrap_or_default().trim();
    let text = parsed.get("title").map(str::trim).unwrap_or(key);
    href(Some(format!("https://ls.st/{key}")), text)
}

fn citation_keys<'s>(parsed: &ParsedCommand<'s>) -> impl Iterator<Item = &'s str> {
    parsed
        .get("keys")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn author_year_links(
    parsed: &ParsedCommand<'_>,
    bibliography: Option<&dyn BibliographyLookup>,
    paren: bool,
) -> Vec<String> {
    citation_keys(parsed)
        .map(|key| {
            let text = bibliography
                .and_then(|b| b.author_year(key, paren))
                .unwrap_or_else(|| key.to_string());
            href(bibliography.and_then(|b| b.url(key)), &text)
        })
        .collect()
}

fn citeds(parsed: &ParsedCommand<'_>, _: Option<&dyn BibliographyLookup>) -> String {
    docushare_link(parsed)
}

fn citedsp(parsed: &ParsedCommand<'_>, _: Option<&dyn BibliographyLookup>) -> String {
    format!("[{}]", docushare_link(parsed))
}

fn citep(parsed: &ParsedCommand<'_>, bibliography: Option<&dyn BibliographyLookup>) -> String {
    format!("[{}]", author_year_links(parsed, bibliography, false).join(", "))
}

fn citet(parsed: &ParsedCommand<'_>, bibliography: Option<&dyn BibliographyLookup>) -> String {
    author_year_links(parsed, bibliography, true).join(", ")
}

static DEFAULT_LINKERS: Lazy<Vec<CommandLinker>> = Lazy::new(|| {
    vec![
        CommandLinker::new(citation_command("citeds", "title", "citekey"), citeds),
        CommandLinker::new(citation_command("citedsp", "title", "citekey"), citedsp),
        CommandLinker::new(citation_command("citep", "note", "keys"), citep),
        CommandLinker::new(citation_command("citet", "note", "keys"), citet),
    ]
});

/// Applies every citation variant, optionally backed by a bibliography.
#[derive(Clone)]
pub struct CitationLinker {
    linkers: Vec<CommandLinker>,
    bibliography: Option<Arc<dyn BibliographyLookup + Send + Sync>>,
}

impl CitationLinker {
    pub fn new(bibliography: Option<Arc<dyn BibliographyLookup + Send + Sync>>) -> Self {
        Self {
            linkers: DEFAULT_LINKERS.clone(),
            bibliography,
        }
    }

    /// Use a custom set of variants.
    pub fn with_linkers(
        linkers: Vec<CommandLinker>,
        bibliography: Option<Arc<dyn BibliographyLookup + Send + Sync>>,
    ) -> Self {
        Self {
            linkers,
            bibliography,
        }
    }

    pub fn link(&self, tex: &str) -> String {
        let bibliography = self
            .bibliography
            .as_deref()
            .map(|b| b as &dyn BibliographyLookup);
        self.linkers
            .iter()
            .fold(tex.to_string(), |tex, linker| linker.apply(&tex, bibliography))
    }
}

impl std::fmt::Debug for CitationLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationLinker")
            .field("linkers", &self.linkers.len())
            .field("bibliography", &self.bibliography.is_some())
            .finish()
    }
}
