//! # convert: markup conversion of extracted TeX fields
//!
//! Document fields are extracted as raw LaTeX. A [`Converter`] turns them into
//! the output markup (HTML or plain text). The production implementation
//! shells out to `pandoc`; [`PassthroughConverter`] leaves content untouched
//! for environments without it.

use std::io::{self, Write};
use std::process::{Command, Stdio};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Target markup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Plain,
}

impl OutputFormat {
    /// Writer name understood by pandoc.
    pub fn pandoc_name(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Plain => "plain",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "plain" | "text" => Ok(OutputFormat::Plain),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    pub format: OutputFormat,
    /// Remove a lone `<p>...</p>` wrapper from the output.
    pub deparagraph: bool,
    pub mathjax: bool,
    pub smart: bool,
    pub extra_args: Vec<String>,
}

impl ConvertOptions {
    /// Same options with `deparagraph` switched on, for inline fields.
    pub fn inline(&self) -> Self {
        Self {
            deparagraph: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("converter I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Converter: Send + Sync {
    /// Convert `content` from markup `from` (e.g. `latex`) to markup `to`.
    fn convert(
        &self,
        content: &str,
        from: &str,
        to: &str,
        options: &ConvertOptions,
    ) -> Result<String, ConvertError>;
}

/// Runs the `pandoc` executable.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: String,
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self {
            program: "pandoc".to_string(),
        }
    }
}

impl PandocConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific pandoc binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for one conversion.
    pub fn arguments(from: &str, to: &str, options: &ConvertOptions) -> Vec<String> {
        let smart = if options.smart { "+smart" } else { "-smart" };
        let mut args = vec![
            format!("--from={from}{smart}"),
            format!("--to={to}"),
        ];
        if options.mathjax {
            args.push("--mathjax".to_string());
        }
        for extra in &options.extra_args {
            if !args.contains(extra) {
                args.push(extra.clone());
            }
        }
        args
    }
}

impl Converter for PandocConverter {
    fn convert(
        &self,
        content: &str,
        from: &str,
        to: &str,
        options: &ConvertOptions,
    ) -> Result<String, ConvertError> {
        let args = Self::arguments(from, to, options);
        debug!(program = %self.program, ?args, "Running converter");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(program = %self.program, error = ?e, "Failed to launch converter process");
                ConvertError::Spawn {
                    program: self.program.clone(),
                    source: e,
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes())?;
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                status = %output.status,
                stderr = %stderr,
                "Converter exited with non-zero code"
            );
            return Err(ConvertError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let converted = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(finish(converted, to, options))
    }
}

/// Returns content unchanged apart from trimming.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughConverter;

impl Converter for PassthroughConverter {
    fn convert(
        &self,
        content: &str,
        _from: &str,
        _to: &str,
        _options: &ConvertOptions,
    ) -> Result<String, ConvertError> {
        Ok(content.trim().to_string())
    }
}

fn finish(converted: String, to: &str, options: &ConvertOptions) -> String {
    let converted = converted.trim();
    if options.deparagraph && to.starts_with("html") {
        deparagraph(converted)
    } else {
        converted.to_string()
    }
}

/// Strip the `<p>` wrapper from HTML that consists of a single paragraph.
/// Anything with more than one block is returned as is.
pub fn deparagraph(html: &str) -> String {
    let trimmed = html.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<p>")
        .and_then(|rest| rest.strip_suffix("</p>"))
    {
        if !inner.contains("<p>") && !inner.contains("</p>") {
            return inner.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deparagraph_single_paragraph() {
        assert_eq!(deparagraph("<p>Hello <em>world</em></p>\n"), "Hello <em>world</em>");
    }

    #[test]
    fn deparagraph_leaves_multiple_blocks() {
        let html = "<p>One</p>\n<p>Two</p>";
        assert_eq!(deparagraph(html), html);
        assert_eq!(deparagraph("<ul><li>x</li></ul>"), "<ul><li>x</li></ul>");
    }

    #[test]
    fn pandoc_arguments() {
        let options = ConvertOptions {
            format: OutputFormat::Html,
            deparagraph: false,
            mathjax: true,
            smart: true,
            extra_args: vec!["--wrap=none".into(), "--mathjax".into(), "--wrap=none".into()],
        };
        assert_eq!(
            PandocConverter::arguments("latex", "html", &options),
            vec!["--from=latex+smart", "--to=html", "--mathjax", "--wrap=none"]
        );

        let plain = ConvertOptions::default();
        assert_eq!(
            PandocConverter::arguments("latex", "plain", &plain),
            vec!["--from=latex-smart", "--to=plain"]
        );
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("HTML".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Plain);
        assert!("docx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn finish_deparagraphs_only_html() {
        let options = ConvertOptions::default().inline();
        assert_eq!(finish("<p>x</p>\n".into(), "html", &options), "x");
        assert_eq!(finish("<p>x</p>\n".into(), "plain", &options), "<p>x</p>");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let converter = PandocConverter::with_program("definitely-not-a-real-pandoc-binary");
        let err = converter
            .convert("x", "latex", "html", &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::Spawn { .. }));
    }

    #[test]
    fn passthrough_trims() {
        let out = PassthroughConverter
            .convert("  \\emph{x} \n", "latex", "html", &ConvertOptions::default())
            .unwrap();
        assert_eq!(out, r"\emph{x}");
    }
}
