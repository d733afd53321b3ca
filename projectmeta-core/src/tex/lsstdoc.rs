//! # lsstdoc: metadata model of an `lsstdoc` LaTeX document
//!
//! [`LsstDoc`] owns a normalized TeX source and reads metadata commands out of
//! it on demand. Every field is parsed at most once: the first read runs the
//! command parser and caches the outcome, including the absent case, so a
//! document without an abstract is not re-scanned on every access.
//!
//! Field values are raw LaTeX. [`LsstDoc::render`] produces converted markup
//! through a [`Converter`].

use std::path::Path;

use chrono::NaiveDate;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::debug;

use super::citelink::CitationLinker;
use super::command::{ArgumentSpec, LatexCommand};
use super::delimiter::Bracket;
use super::normalizer::{read_tex_file, NormalizeError};
use super::scraper::{get_macros, replace_macros};
use crate::convert::{ConvertError, ConvertOptions, Converter};

static TITLE: Lazy<LatexCommand> = Lazy::new(|| {
    grammar(
        "title",
        vec![
            ArgumentSpec::optional("short_title", Bracket::Square),
            ArgumentSpec::required("long_title", Bracket::Curly),
        ],
    )
});
static AUTHOR: Lazy<LatexCommand> =
    Lazy::new(|| grammar("author", vec![ArgumentSpec::required("authors", Bracket::Curly)]));
static ABSTRACT: Lazy<LatexCommand> = Lazy::new(|| {
    grammar(
        "setDocAbstract",
        vec![ArgumentSpec::required("abstract", Bracket::Curly)],
    )
});
static DOC_REF: Lazy<LatexCommand> =
    Lazy::new(|| grammar("setDocRef", vec![ArgumentSpec::required("handle", Bracket::Curly)]));
static DOCUMENT_CLASS: Lazy<LatexCommand> = Lazy::new(|| {
    grammar(
        "documentclass",
        vec![
            ArgumentSpec::optional("options", Bracket::Square),
            ArgumentSpec::required("class_name", Bracket::Curly),
        ],
    )
});
static DATE: Lazy<LatexCommand> =
    Lazy::new(|| grammar("date", vec![ArgumentSpec::required("date", Bracket::Curly)]));

static AND_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\band\b").expect("valid regex"));

fn grammar(name: &str, arguments: Vec<ArgumentSpec>) -> LatexCommand {
    LatexCommand::new(name, arguments).expect("valid lsstdoc grammar")
}

/// Lazily parsed view over one document's source.
#[derive(Debug, Default)]
pub struct LsstDoc {
    tex: String,
    // (long title, short title) come from the same command.
    title: OnceCell<(Option<String>, Option<String>)>,
    authors: OnceCell<Vec<String>>,
    abstract_: OnceCell<Option<String>>,
    handle: OnceCell<Option<String>>,
    is_draft: OnceCell<bool>,
    date: OnceCell<Option<String>>,
}

impl LsstDoc {
    /// Wrap already normalized TeX source.
    pub fn new(tex: impl Into<String>) -> Self {
        Self {
            tex: tex.into(),
            ..Self::default()
        }
    }

    /// Read a root TeX file: normalize it, inline its includes, then expand
    /// its parameterless macros.
    pub fn read(root_tex: impl AsRef<Path>) -> Result<Self, NormalizeError> {
        let root_tex = root_tex.as_ref();
        let tex = read_tex_file(root_tex)?;
        let macros = get_macros(&tex);
        debug!(path = %root_tex.display(), macros = macros.len(), "Read lsstdoc source");
        Ok(Self::new(replace_macros(&tex, &macros)))
    }

    pub fn tex(&self) -> &str {
        &self.tex
    }

    fn first_argument(&self, command: &LatexCommand, argument: &str) -> Option<String> {
        command
            .parse_first(&self.tex)
            .and_then(|parsed| parsed.get(argument).ok().map(|v| v.trim().to_string()))
    }

    fn titles(&self) -> &(Option<String>, Option<String>) {
        self.title.get_or_init(|| match TITLE.parse_first(&self.tex) {
            Some(parsed) => (
                parsed.get("long_title").ok().map(|t| t.trim().to_string()),
                parsed.get("short_title").ok().map(|t| t.trim().to_string()),
            ),
            None => (None, None),
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.titles().0.as_deref()
    }

    pub fn short_title(&self) -> Option<&str> {
        self.titles().1.as_deref()
    }

    /// Authors from the first `\author{}`; empty when there is none.
    pub fn authors(&self) -> &[String] {
        self.authors.get_or_init(|| {
            self.first_argument(&AUTHOR, "authors")
                .map(|block| split_authors(&block))
                .unwrap_or_default()
        })
    }

    pub fn abstract_text(&self) -> Option<&str> {
        self.abstract_
            .get_or_init(|| self.first_argument(&ABSTRACT, "abstract"))
            .as_deref()
    }

    /// Document handle such as `LDM-151`, from `\setDocRef`.
    pub fn handle(&self) -> Option<&str> {
        self.handle
            .get_or_init(|| self.first_argument(&DOC_REF, "handle"))
            .as_deref()
    }

    /// `LDM` for `LDM-151`.
    pub fn series(&self) -> Option<&str> {
        self.handle()?.split_once('-').map(|(series, _)| series)
    }

    /// `151` for `LDM-151`. Only the first hyphen separates the parts.
    pub fn serial(&self) -> Option<&str> {
        self.handle()?.split_once('-').map(|(_, serial)| serial)
    }

    /// True when `lsstdraft` is one of the document class options.
    pub fn is_draft(&self) -> bool {
        *self.is_draft.get_or_init(|| {
            DOCUMENT_CLASS
                .parse_first(&self.tex)
                .and_then(|parsed| parsed.get("options").ok())
                .map(|options| options.split(',').any(|o| o.trim() == "lsstdraft"))
                .unwrap_or(false)
        })
    }

    /// Raw `\date{}` content.
    pub fn date(&self) -> Option<&str> {
        self.date
            .get_or_init(|| self.first_argument(&DATE, "date"))
            .as_deref()
    }

    /// `\date{}` as a calendar date, when written `YYYY-MM-DD`.
    pub fn revision_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date()?, "%Y-%m-%d").ok()
    }

    /// Convert the display fields to the markup in `options`.
    ///
    /// Title, short title and authors are converted as inline content. The
    /// abstract keeps its paragraphs and is citation-linked first when a
    /// `linker` is given.
    pub fn render(
        &self,
        converter: &dyn Converter,
        options: &ConvertOptions,
        linker: Option<&CitationLinker>,
    ) -> Result<RenderedDoc, ConvertError> {
        let to = options.format.pandoc_name();
        let inline = options.inline();
        let convert_inline =
            |field: &str| converter.convert(field, "latex", to, &inline);

        let title = self.title().map(convert_inline).transpose()?;
        let short_title = self.short_title().map(convert_inline).transpose()?;
        let authors = self
            .authors()
            .iter()
            .map(|a| convert_inline(a.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let abstract_text = match self.abstract_text() {
            Some(text) => {
                let linked = match linker {
                    Some(linker) => linker.link(text),
                    None => text.to_string(),
                };
                Some(converter.convert(&linked, "latex", to, options)?)
            }
            None => None,
        };

        Ok(RenderedDoc {
            title,
            short_title,
            authors,
            abstract_text,
        })
    }
}

/// Converted display fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDoc {
    pub title: Option<String>,
    pub short_title: Option<String>,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
}

/// Split an `\author{}` block written either as `A, B, C` or `A, B, and C`.
pub fn split_authors(block: &str) -> Vec<String> {
    let block = block.replace('\n', " ").replace('~', " ");
    let mut authors = Vec::new();
    for segment in block.trim().split(',') {
        if AND_WORD.is_match(segment) {
            authors.extend(
                AND_WORD
                    .split(segment)
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
            );
        } else {
            let author = segment.trim();
            if !author.is_empty() {
                authors.push(author.to_string());
            }
        }
    }
    authors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{MockConverter, OutputFormat};

    const SAMPLE: &str = concat!(
        "\\documentclass[DM, lsstdraft, toc]{lsstdoc}\n",
        "\\title[Test Plan]{Data Management Test Plan}\n",
        "\\author{William~O'Mullane, John~Swinbank, Leanne~Guy, and Amanda~Bauer}\n",
        "\\setDocRef{LDM-503}\n",
        "\\date{2017-07-04}\n",
        "\\setDocAbstract{\n",
        "This is the Test Plan for \\citeds{LDM-151}.\n",
        "}\n",
    );

    #[test]
    fn reads_fields() {
        let doc = LsstDoc::new(SAMPLE);
        assert_eq!(doc.title(), Some("Data Management Test Plan"));
        assert_eq!(doc.short_title(), Some("Test Plan"));
        assert_eq!(
            doc.authors(),
            ["William O'Mullane", "John Swinbank", "Leanne Guy", "Amanda Bauer"]
        );
        assert_eq!(doc.handle(), Some("LDM-503"));
        assert_eq!(doc.series(), Some("LDM"));
        assert_eq!(doc.serial(), Some("503"));
        assert!(doc.is_draft());
        assert_eq!(
            doc.abstract_text(),
            Some(r"This is the Test Plan for \citeds{LDM-151}.")
        );
        assert_eq!(doc.revision_date(), NaiveDate::from_ymd_opt(2017, 7, 4));
    }

    #[test]
    fn absent_fields() {
        let doc = LsstDoc::new("\\documentclass[DM,toc]{lsstdoc}\n\\title{Only a title}");
        assert_eq!(doc.title(), Some("Only a title"));
        assert_eq!(doc.short_title(), None);
        assert!(doc.authors().is_empty());
        assert_eq!(doc.abstract_text(), None);
        assert_eq!(doc.handle(), None);
        assert_eq!(doc.series(), None);
        assert!(!doc.is_draft());
        assert_eq!(doc.date(), None);
    }

    #[test]
    fn handle_splits_on_first_hyphen() {
        let doc = LsstDoc::new(r"\setDocRef{DMTR-31}");
        assert_eq!((doc.series(), doc.serial()), (Some("DMTR"), Some("31")));

        let doc = LsstDoc::new(r"\setDocRef{SQR-006-A}");
        assert_eq!((doc.series(), doc.serial()), (Some("SQR"), Some("006-A")));
    }

    #[test]
    fn authors_conventions() {
        assert_eq!(split_authors("A, B, and C"), ["A", "B", "C"]);
        assert_eq!(split_authors("A,\nB,\nand\nC"), ["A", "B", "C"]);
        assert_eq!(split_authors("A and B"), ["A", "B"]);
        assert_eq!(split_authors("Alexandra Sand, Andy"), ["Alexandra Sand", "Andy"]);
    }

    #[test]
    fn draft_option_is_exact() {
        assert!(LsstDoc::new(r"\documentclass[ lsstdraft ]{lsstdoc}").is_draft());
        assert!(!LsstDoc::new(r"\documentclass[lsstdraftish]{lsstdoc}").is_draft());
        assert!(!LsstDoc::new(r"\documentclass{lsstdoc}").is_draft());
    }

    #[test]
    fn non_iso_date_has_no_revision_date() {
        let doc = LsstDoc::new(r"\date{\today}");
        assert_eq!(doc.date(), Some(r"\today"));
        assert_eq!(doc.revision_date(), None);
    }

    #[test]
    fn render_converts_fields_and_links_abstract() {
        let doc = LsstDoc::new(SAMPLE);
        let mut converter = MockConverter::new();
        converter
            .expect_convert()
            .withf(|_, from, to, options| from == "latex" && to == "html" && options.deparagraph)
            .returning(|content, _, _, _| Ok(format!("<i>{content}</i>")));
        converter
            .expect_convert()
            .withf(|_, _, _, options| !options.deparagraph)
            .times(1)
            .returning(|content, _, _, _| Ok(format!("<p>{content}</p>")));

        let options = ConvertOptions {
            format: OutputFormat::Html,
            ..ConvertOptions::default()
        };
        let linker = CitationLinker::new(None);
        let rendered = doc.render(&converter, &options, Some(&linker)).unwrap();

        assert_eq!(rendered.title.as_deref(), Some("<i>Data Management Test Plan</i>"));
        assert_eq!(rendered.short_title.as_deref(), Some("<i>Test Plan</i>"));
        assert_eq!(rendered.authors.len(), 4);
        assert_eq!(
            rendered.abstract_text.as_deref(),
            Some(r"<p>This is the Test Plan for \href{https://ls.st/LDM-151}{LDM-151}.</p>")
        );
    }

    #[test]
    fn render_keeps_absent_fields_absent() {
        let doc = LsstDoc::new(r"\title{T}");
        let mut converter = MockConverter::new();
        converter
            .expect_convert()
            .times(1)
            .returning(|content, _, _, _| Ok(content.to_string()));
        let rendered = doc
            .render(&converter, &ConvertOptions::default(), None)
            .unwrap();
        assert_eq!(rendered.title.as_deref(), Some("T"));
        assert_eq!(rendered.abstract_text, None);
        assert!(rendered.authors.is_empty());
    }
}
