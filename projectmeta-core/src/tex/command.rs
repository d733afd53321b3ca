//! # command: grammar, matcher and parser for TeX command invocations
//!
//! A [`LatexCommand`] names a TeX command (`title`) and the ordered argument
//! slots that may follow it (`[short_title]{long_title}`). Parsing a source
//! string yields a lazy sequence of [`ParsedCommand`]s, one per occurrence of
//! the command token, each exposing its arguments by name and the exact
//! source text it was parsed from.
//!
//! ## Matching rules
//! - The token `\name` matches only when not followed by further letters, so
//!   a `title` grammar never matches `\titlename`.
//! - Whitespace is allowed between the token and the first argument.
//!   Between later arguments only spaces and tabs are allowed, never a line
//!   break.
//! - An absent optional argument is skipped without moving the cursor.
//! - An absent required argument drops the whole occurrence. The one
//!   exception is the bare-token form `\input file.tex`: when nothing has been
//!   consumed yet and the token is separated from a plain word by spaces, the
//!   word is taken as the first required brace argument.
//! - Occurrences with unbalanced delimiters are dropped and logged.
//!
//! "Command not present" is an empty sequence, never an error.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{CaptureMatches, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use super::delimiter::{scan_balanced, Bracket, ScanError};

static COMMAND_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z@]+\*?$").expect("valid command name regex"));

/// Errors raised while building a command grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("invalid command name {0:?}: expected letters, optionally followed by '*'")]
    InvalidName(String),

    #[error("argument {0:?} is declared more than once")]
    DuplicateArgument(String),

    #[error("unsupported opening bracket {0:?}")]
    InvalidBracket(char),
}

/// Looking up an argument that the occurrence does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("argument {0:?} is absent from this command occurrence")]
    Absent(String),
}

/// Reasons a single occurrence could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OccurrenceError {
    #[error("required argument {argument:?} missing for command at offset {offset}")]
    MissingRequired { argument: String, offset: usize },

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// One argument slot in a command grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSpec {
    pub name: String,
    pub required: bool,
    pub bracket: Bracket,
}

impl ArgumentSpec {
    pub fn required(name: impl Into<String>, bracket: Bracket) -> Self {
        Self {
            name: name.into(),
            required: true,
            bracket,
        }
    }

    pub fn optional(name: impl Into<String>, bracket: Bracket) -> Self {
        Self {
            name: name.into(),
            required: false,
            bracket,
        }
    }

    /// Build a slot from its opening bracket character (`'['` or `'{'`).
    pub fn new(
        name: impl Into<String>,
        required: bool,
        opening: char,
    ) -> Result<Self, GrammarError> {
        let bracket =
            Bracket::from_open(opening).ok_or(GrammarError::InvalidBracket(opening))?;
        Ok(Self {
            name: name.into(),
            required,
            bracket,
        })
    }
}

/// Location of a detected command token (`\name` plus trailing whitespace).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandToken {
    /// Offset of the backslash.
    pub start: usize,
    /// Offset just past the command name.
    pub name_end: usize,
    /// Offset just past the whitespace following the name.
    pub end: usize,
}

/// Grammar for a single TeX command.
#[derive(Debug, Clone)]
pub struct LatexCommand {
    name: String,
    arguments: Vec<ArgumentSpec>,
    pattern: Regex,
}

impl LatexCommand {
    /// Build a grammar. Validation happens here, never at parse time.
    pub fn new(name: &str, arguments: Vec<ArgumentSpec>) -> Result<Self, GrammarError> {
        for (i, arg) in arguments.iter().enumerate() {
            if arguments[..i].iter().any(|a| a.name == arg.name) {
                return Err(GrammarError::DuplicateArgument(arg.name.clone()));
            }
        }
        let pattern = Self::command_pattern(name)?;
        Ok(Self {
            name: name.to_string(),
            arguments,
            pattern,
        })
    }

    /// The detection regex for `\name`.
    ///
    /// Captures `tail` (letters glued to the name) and `ws` (the whitespace
    /// after it). A non-empty `tail` means a longer command was hit, and
    /// [`LatexCommand::detect`] discards it; the regex crate has no
    /// lookahead to do that inside the pattern.
    pub fn command_pattern(name: &str) -> Result<Regex, GrammarError> {
        if !COMMAND_NAME.is_match(name) {
            return Err(GrammarError::InvalidName(name.to_string()));
        }
        let tail = if name.ends_with('*') {
            "(?P<tail>)"
        } else {
            "(?P<tail>[A-Za-z@]*)"
        };
        let pattern = format!(r"\\{}{}(?P<ws>\s*)", regex::escape(name), tail);
        Regex::new(&pattern).map_err(|_| GrammarError::InvalidName(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    /// Find every token for this command, left to right.
    pub fn detect<'a>(&'a self, source: &'a str) -> impl Iterator<Item = CommandToken> + 'a {
        self.pattern
            .captures_iter(source)
            .filter_map(token_from_captures)
    }

    /// Lazily parse every occurrence of the command in `source`.
    pub fn parse<'c, 's>(&'c self, source: &'s str) -> ParsedCommands<'c, 's> {
        ParsedCommands {
            command: self,
            source,
            captures: self.pattern.captures_iter(source),
        }
    }

    /// The first occurrence, if any.
    pub fn parse_first<'s>(&self, source: &'s str) -> Option<ParsedCommand<'s>> {
        self.parse(source).next()
    }

    /// Parse the arguments following a detected token.
    pub fn parse_at<'s>(
        &self,
        source: &'s str,
        token: CommandToken,
    ) -> Result<ParsedCommand<'s>, OccurrenceError> {
        let mut cursor = token.end;
        let mut consumed = false;
        let mut arguments: Vec<(String, &'s str)> = Vec::with_capacity(self.arguments.len());

        for arg in &self.arguments {
            let start = if consumed {
                skip_inline_whitespace(source, cursor)
            } else {
                cursor
            };

            if source[start..].starts_with(arg.bracket.open()) {
                let found = scan_balanced(source, start, arg.bracket)?;
                arguments.push((arg.name.clone(), found.content));
                cursor = found.end;
                consumed = true;
                continue;
            }

            if !arg.required {
                continue;
            }

            if !consumed && arg.bracket == Bracket::Curly {
                if let Some(word) = bare_token(source, token) {
                    arguments.push((arg.name.clone(), &source[word.clone()]));
                    cursor = word.end;
                    consumed = true;
                    continue;
                }
            }

            return Err(OccurrenceError::MissingRequired {
                argument: arg.name.clone(),
                offset: token.start,
            });
        }

        let end = if consumed { cursor } else { token.name_end };
        Ok(ParsedCommand {
            span: token.start..end,
            command_source: &source[token.start..end],
            arguments,
        })
    }
}

fn token_from_captures(caps: regex::Captures<'_>) -> Option<CommandToken> {
    let whole = caps.get(0)?;
    if caps.name("tail").is_some_and(|t| !t.as_str().is_empty()) {
        return None;
    }
    let ws = caps.name("ws")?;
    Some(CommandToken {
        start: whole.start(),
        name_end: ws.start(),
        end: ws.end(),
    })
}

fn skip_inline_whitespace(source: &str, from: usize) -> usize {
    let skipped = source[from..]
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    from + skipped
}

/// A plain word separated from the command by spaces, as in `\input file.tex`.
fn bare_token(source: &str, token: CommandToken) -> Option<Range<usize>> {
    let whitespace = &source[token.name_end..token.end];
    if whitespace.is_empty() || whitespace.contains('\n') {
        return None;
    }
    let len: usize = source[token.end..]
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, '{' | '}' | '[' | ']' | '%' | '\\'))
        .map(char::len_utf8)
        .sum();
    if len == 0 {
        return None;
    }
    Some(token.end..token.end + len)
}

/// One parsed occurrence of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'s> {
    span: Range<usize>,
    command_source: &'s str,
    arguments: Vec<(String, &'s str)>,
}

impl<'s> ParsedCommand<'s> {
    /// Content of the named argument.
    ///
    /// # Errors
    ///
    /// [`ArgumentError::Absent`] when the argument did not occur, which is
    /// distinct from an argument that occurred with empty content.
    pub fn get(&self, name: &str) -> Result<&'s str, ArgumentError> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, content)| *content)
            .ok_or_else(|| ArgumentError::Absent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arguments.iter().any(|(n, _)| n == name)
    }

    /// Exact source text from the backslash through the last closing delimiter.
    pub fn command_source(&self) -> &'s str {
        self.command_source
    }

    /// Byte range of [`ParsedCommand::command_source`] within the parsed source.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Arguments that occurred, in declaration order.
    pub fn arguments(&self) -> impl Iterator<Item = (&str, &'s str)> + '_ {
        self.arguments.iter().map(|(n, c)| (n.as_str(), *c))
    }
}

/// Lazy sequence returned by [`LatexCommand::parse`].
pub struct ParsedCommands<'c, 's> {
    command: &'c LatexCommand,
    source: &'s str,
    captures: CaptureMatches<'c, 's>,
}

impl<'c, 's> Iterator for ParsedCommands<'c, 's> {
    type Item = ParsedCommand<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        for caps in self.captures.by_ref() {
            let Some(token) = token_from_captures(caps) else {
                continue;
            };
            match self.command.parse_at(self.source, token) {
                Ok(parsed) => return Some(parsed),
                Err(OccurrenceError::MissingRequired { argument, offset }) => {
                    debug!(
                        command = %self.command.name,
                        argument = %argument,
                        offset,
                        "Skipping command occurrence without its required argument"
                    );
                }
                Err(OccurrenceError::Scan(e)) => {
                    warn!(
                        command = %self.command.name,
                        offset = token.start,
                        error = %e,
                        "Skipping command occurrence with malformed delimiters"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_command() -> LatexCommand {
        LatexCommand::new(
            "title",
            vec![
                ArgumentSpec::optional("short_title", Bracket::Square),
                ArgumentSpec::required("long_title", Bracket::Curly),
            ],
        )
        .unwrap()
    }

    #[test]
    fn parses_optional_and_required() {
        let command = title_command();
        let source = r"\title[Short]{Long Title}";
        let parsed: Vec<_> = command.parse(source).collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].get("long_title").unwrap(), "Long Title");
        assert_eq!(parsed[0].get("short_title").unwrap(), "Short");
        assert_eq!(parsed[0].command_source(), source);
        assert_eq!(parsed[0].span(), 0..source.len());
    }

    #[test]
    fn absent_optional_is_an_error_not_empty() {
        let command = title_command();
        let parsed = command.parse_first(r"\title{Title}").unwrap();
        assert_eq!(
            parsed.get("short_title"),
            Err(ArgumentError::Absent("short_title".into()))
        );
        assert!(!parsed.contains("short_title"));
        assert!(parsed.contains("long_title"));
    }

    #[test]
    fn empty_argument_is_present() {
        let parsed = title_command().parse_first(r"\title[]{}").unwrap();
        assert_eq!(parsed.get("short_title").unwrap(), "");
        assert_eq!(parsed.get("long_title").unwrap(), "");
    }

    #[test]
    fn tolerates_spacing_between_arguments() {
        let parsed = title_command()
            .parse_first("\\title    [Test Plan]  { \\product ~Test Plan}")
            .unwrap();
        assert_eq!(parsed.get("short_title").unwrap(), "Test Plan");
        assert_eq!(parsed.get("long_title").unwrap(), r" \product ~Test Plan");
    }

    #[test]
    fn line_break_between_arguments_ends_the_command() {
        let parsed = title_command().parse_first("\\title{A}\n[B]").unwrap();
        assert_eq!(parsed.command_source(), r"\title{A}");

        // Required argument after a line break is not found.
        let command = LatexCommand::new(
            "pair",
            vec![
                ArgumentSpec::required("a", Bracket::Curly),
                ArgumentSpec::required("b", Bracket::Curly),
            ],
        )
        .unwrap();
        assert!(command.parse_first("\\pair{x}\n{y}").is_none());
        assert_eq!(command.parse_first(r"\pair{x} {y}").unwrap().get("b").unwrap(), "y");
    }

    #[test]
    fn prefix_commands_do_not_match() {
        let command = title_command();
        let source = "% hello\n\\title{Hello}\n\\titlename{Imposter}";
        assert_eq!(command.detect(source).count(), 1);
        let parsed: Vec<_> = command.parse(source).collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].get("long_title").unwrap(), "Hello");
    }

    #[test]
    fn missing_required_skips_only_that_occurrence() {
        let command = LatexCommand::new(
            "setDocRef",
            vec![ArgumentSpec::required("handle", Bracket::Curly)],
        )
        .unwrap();
        let source = "\\setDocRef[Trap]{X}\n\\setDocRef{LDM-151}";
        let parsed: Vec<_> = command.parse(source).collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].get("handle").unwrap(), "LDM-151");
    }

    #[test]
    fn unbalanced_occurrence_is_skipped() {
        let command = LatexCommand::new(
            "emph",
            vec![ArgumentSpec::required("text", Bracket::Curly)],
        )
        .unwrap();
        // The first occurrence swallows the rest of the source and never closes.
        let parsed: Vec<_> = command.parse(r"\emph{a \emph{b}").collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].get("text").unwrap(), "b");
    }

    #[test]
    fn parse_at_reports_missing_argument() {
        let command = LatexCommand::new(
            "author",
            vec![ArgumentSpec::required("authors", Bracket::Curly)],
        )
        .unwrap();
        let source = "\\author\n";
        let token = command.detect(source).next().unwrap();
        let err = command.parse_at(source, token).unwrap_err();
        assert!(matches!(err, OccurrenceError::MissingRequired { .. }));
    }

    #[test]
    fn bare_token_argument() {
        let command = LatexCommand::new(
            "input",
            vec![ArgumentSpec::required("filename", Bracket::Curly)],
        )
        .unwrap();
        let source = "Hello.\n\n\\input test.tex\n\nMore content.";
        let parsed = command.parse_first(source).unwrap();
        assert_eq!(parsed.get("filename").unwrap(), "test.tex");
        assert_eq!(parsed.command_source(), r"\input test.tex");
    }

    #[test]
    fn bare_token_needs_separating_space() {
        let command = LatexCommand::new(
            "input",
            vec![ArgumentSpec::required("filename", Bracket::Curly)],
        )
        .unwrap();
        assert!(command.parse_first("\\input\ntest.tex").is_none());
        assert!(command.parse_first(r"\input \other").is_none());
    }

    #[test]
    fn occurrences_come_left_to_right() {
        let command = LatexCommand::new(
            "citeds",
            vec![
                ArgumentSpec::optional("title", Bracket::Square),
                ArgumentSpec::required("citekey", Bracket::Curly),
            ],
        )
        .unwrap();
        let keys: Vec<_> = command
            .parse(r"\citeds{A} text \citeds[T]{B}, \citeds{C}")
            .map(|p| p.get("citekey").unwrap())
            .collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }

    #[test]
    fn grammar_rejects_bad_names() {
        assert_eq!(
            LatexCommand::new("ti(tle", vec![]).unwrap_err(),
            GrammarError::InvalidName("ti(tle".into())
        );
        assert!(LatexCommand::new("", vec![]).is_err());
        assert!(LatexCommand::new("section*", vec![]).is_ok());
    }

    #[test]
    fn grammar_rejects_duplicate_arguments() {
        let err = LatexCommand::new(
            "x",
            vec![
                ArgumentSpec::required("a", Bracket::Curly),
                ArgumentSpec::required("a", Bracket::Curly),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GrammarError::DuplicateArgument("a".into()));
    }

    #[test]
    fn argument_spec_from_bracket_char() {
        let spec = ArgumentSpec::new("options", false, '[').unwrap();
        assert_eq!(spec.bracket, Bracket::Square);
        assert_eq!(
            ArgumentSpec::new("x", true, '(').unwrap_err(),
            GrammarError::InvalidBracket('(')
        );
    }

    #[test]
    fn starred_command_is_distinct() {
        let plain = LatexCommand::new(
            "section",
            vec![ArgumentSpec::required("heading", Bracket::Curly)],
        )
        .unwrap();
        let starred = LatexCommand::new(
            "section*",
            vec![ArgumentSpec::required("heading", Bracket::Curly)],
        )
        .unwrap();
        let source = r"\section*{Intro} \section{Body}";
        let headings = |command: &LatexCommand| -> Vec<&str> {
            command
                .parse(source)
                .map(|p| p.get("heading").unwrap())
                .collect()
        };
        let plain_hits = headings(&plain);
        let starred_hits = headings(&starred);
        assert_eq!(plain_hits, vec!["Body"]);
        assert_eq!(starred_hits, vec!["Intro"]);
    }

    #[test]
    fn parse_is_restartable() {
        let command = title_command();
        let source = r"\title{A}";
        assert_eq!(command.parse(source).count(), 1);
        assert_eq!(command.parse(source).count(), 1);
    }
}
