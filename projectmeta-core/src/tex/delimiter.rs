//! Balanced delimiter scanning.
//!
//! Every argument extraction in the crate (command arguments, macro bodies,
//! BibTeX entry bodies) goes through [`scan_balanced`]. The scanner counts
//! opening and closing delimiters of a single kind and has no notion of TeX
//! escapes: a `\{` inside math mode still counts as a delimiter.

use thiserror::Error;

/// Delimiter kinds that wrap TeX arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    /// `[...]`, conventionally optional arguments.
    Square,
    /// `{...}`, conventionally required arguments.
    Curly,
}

impl Bracket {
    pub const fn open(self) -> char {
        match self {
            Bracket::Square => '[',
            Bracket::Curly => '{',
        }
    }

    pub const fn close(self) -> char {
        match self {
            Bracket::Square => ']',
            Bracket::Curly => '}',
        }
    }

    /// Look up a bracket kind from its opening character.
    pub fn from_open(c: char) -> Option<Self> {
        match c {
            '[' => Some(Bracket::Square),
            '{' => Some(Bracket::Curly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The scanner was pointed at something other than the opening delimiter.
    #[error("expected opening delimiter {expected:?} at offset {offset}, found {found:?}")]
    Malformed {
        offset: usize,
        expected: char,
        found: Option<char>,
    },

    /// The end of the source was reached before the delimiter closed.
    #[error("unbalanced {open:?} delimiter opened at offset {offset}")]
    Unbalanced { offset: usize, open: char },
}

/// Content found between a matched pair of delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balanced<'a> {
    /// Text strictly between the delimiters.
    pub content: &'a str,
    /// Byte offset just past the closing delimiter.
    pub end: usize,
}

/// Extract the content of the delimiter pair opening at byte offset `start`.
///
/// # Errors
///
/// [`ScanError::Malformed`] if `source[start..]` does not begin with the
/// opening delimiter, [`ScanError::Unbalanced`] if it never closes.
pub fn scan_balanced(
    source: &str,
    start: usize,
    bracket: Bracket,
) -> Result<Balanced<'_>, ScanError> {
    let (open, close) = (bracket.open(), bracket.close());

    let found = source.get(start..).and_then(|rest| rest.chars().next());
    if found != Some(open) {
        return Err(ScanError::Malformed {
            offset: start,
            expected: open,
            found,
        });
    }

    let mut balance = 0usize;
    for (i, c) in source[start..].char_indices() {
        if c == open {
            balance += 1;
        } else if c == close {
            balance -= 1;
            if balance == 0 {
                let end = start + i + c.len_utf8();
                return Ok(Balanced {
                    content: &source[start + open.len_utf8()..start + i],
                    end,
                });
            }
        }
    }

    Err(ScanError::Unbalanced {
        offset: start,
        open,
    })
}
