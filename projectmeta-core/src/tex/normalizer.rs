//! TeX source normalization: comment stripping, trailing whitespace removal
//! and recursive inlining of `\input` / `\include` files.
//!
//! The pipeline order is fixed: read, strip comments, strip trailing
//! whitespace, inline referenced files. Included files run through the same
//! pipeline and are resolved relative to the root document's directory.
//! Inclusion cycles are not detected.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{debug, error};

use super::command::{ArgumentSpec, LatexCommand, ParsedCommand};
use super::delimiter::Bracket;

static INPUT_COMMAND: Lazy<LatexCommand> = Lazy::new(|| file_command("input"));
static INCLUDE_COMMAND: Lazy<LatexCommand> = Lazy::new(|| file_command("include"));

fn file_command(name: &str) -> LatexCommand {
    LatexCommand::new(name, vec![ArgumentSpec::required("filename", Bracket::Curly)])
        .expect("valid file inclusion grammar")
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("cannot read TeX source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl NormalizeError {
    /// The file that could not be read.
    pub fn path(&self) -> &Path {
        match self {
            NormalizeError::Read { path, .. } => path,
        }
    }
}

/// Delete comments: everything from an unescaped `%` to the end of its line.
/// Newlines are kept.
pub fn remove_comments(tex_source: &str) -> String {
    tex_source
        .split('\n')
        .map(|line| {
            let bytes = line.as_bytes();
            let cut = line
                .match_indices('%')
                .map(|(i, _)| i)
                .find(|&i| i == 0 || bytes[i - 1] != b'\\');
            match cut {
                Some(i) => &line[..i],
                None => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Delete trailing whitespace from every line.
pub fn remove_trailing_whitespace(tex_source: &str) -> String {
    tex_source
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read a root TeX file and return its normalized, flattened source.
///
/// # Errors
///
/// [`NormalizeError::Read`] if the root file or any file it references
/// cannot be read. A missing include aborts the whole document.
pub fn read_tex_file(root_filepath: impl AsRef<Path>) -> Result<String, NormalizeError> {
    let root_filepath = root_filepath.as_ref();
    let root_dir = root_filepath
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    read_tex_file_in(root_filepath, &root_dir)
}

fn read_tex_file_in(filepath: &Path, root_dir: &Path) -> Result<String, NormalizeError> {
    let raw = fs::read_to_string(filepath).map_err(|e| {
        error!(path = %filepath.display(), error = %e, "Cannot open TeX source");
        NormalizeError::Read {
            path: filepath.to_path_buf(),
            source: e,
        }
    })?;

    let tex_source = remove_comments(&raw);
    let tex_source = remove_trailing_whitespace(&tex_source);
    process_inputs(&tex_source, root_dir)
}

/// Replace every `\input` and `\include` in `tex_source` with the normalized
/// content of the referenced file.
///
/// All references are located in `tex_source` before any substitution, so
/// later references are unaffected by what earlier ones expand to.
pub fn process_inputs(tex_source: &str, root_dir: &Path) -> Result<String, NormalizeError> {
    let mut references: Vec<ParsedCommand<'_>> = INPUT_COMMAND
        .parse(tex_source)
        .chain(INCLUDE_COMMAND.parse(tex_source))
        .collect();
    if references.is_empty() {
        return Ok(tex_source.to_string());
    }
    references.sort_by_key(|r| r.span().start);

    let mut output = String::with_capacity(tex_source.len());
    let mut last = 0;
    for reference in &references {
        let span = reference.span();
        if span.start < last {
            continue;
        }
        let Ok(filename) = reference.get("filename") else {
            continue;
        };
        let include_path = resolve_include_path(root_dir, filename);
        debug!(path = %include_path.display(), "Inlining included TeX file");

        output.push_str(&tex_source[last..span.start]);
        output.push_str(&read_tex_file_in(&include_path, root_dir)?);
        last = span.end;
    }
    output.push_str(&tex_source[last..]);
    Ok(output)
}

/// Path of an included file: relative to the root directory, with `.tex`
/// appended when the reference has no extension.
pub fn resolve_include_path(root_dir: &Path, filename: &str) -> PathBuf {
    let mut path = root_dir.join(filename.trim());
    if path.extension().is_none() {
        path.set_extension("tex");
    }
    path
}
