//! LaTeX source handling: delimiter scanning, command parsing, normalization,
//! macro expansion, the `lsstdoc` document model and citation linking.

pub mod bibtex;
pub mod citelink;
pub mod command;
pub mod delimiter;
pub mod lsstdoc;
pub mod normalizer;
pub mod scraper;

pub use bibtex::{BibEntry, Bibliography, BibliographyLookup, BibtexError};
pub use citelink::{CitationLinker, CommandLinker};
pub use command::{ArgumentError, ArgumentSpec, GrammarError, LatexCommand, ParsedCommand};
pub use delimiter::{scan_balanced, Bracket, ScanError};
pub use lsstdoc::{LsstDoc, RenderedDoc};
pub use normalizer::{read_tex_file, NormalizeError};
pub use scraper::{get_macros, replace_macros, MacroTable};
