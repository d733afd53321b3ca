//! High-level pipeline: download → extract → upload of document metadata.
//!
//! For every downloaded source the pipeline reads the root TeX file into an
//! [`LsstDoc`], renders its display fields, assembles the JSON-LD record and
//! hands it to an [`Uploader`].
//!
//! # Error Handling
//! One broken document never aborts a run. Its failure is logged, recorded in
//! [`SynchroniseReport::failed`], and the remaining documents are processed.
//! Sources the downloader could not fetch arrive in the manifest's `failed`
//! list and are reported the same way.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Single document: [`extract_jsonld`]
//! - Bibliography setup: [`prepare_linker`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

pub use crate::contract::FailedDocument;
use crate::contract::{
    DownloadedManifest, DownloadedSource, MetadataRecord, UploadReceipt, Uploader,
};
use crate::convert::{ConvertError, ConvertOptions, Converter, OutputFormat};
use crate::download::{get_content_commit_date, DownloadConfig, SourceAction};
use crate::github::parse_repo_slug;
use crate::jsonld::build_jsonld;
use crate::lsstbib::{BibtexCache, KNOWN_BIBLIOGRAPHIES};
use crate::tex::citelink::CitationLinker;
use crate::tex::lsstdoc::LsstDoc;
use crate::tex::normalizer::NormalizeError;

/// How documents are turned into records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub format: OutputFormat,
    pub mathjax: bool,
    pub smart: bool,
    pub link_citations: bool,
    /// lsst-texmf bibliographies used for citation display.
    pub bibliographies: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Html,
            mathjax: false,
            smart: true,
            link_citations: true,
            bibliographies: KNOWN_BIBLIOGRAPHIES.iter().map(|b| b.to_string()).collect(),
        }
    }
}

impl ProcessConfig {
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            format: self.format,
            deparagraph: false,
            mathjax: self.mathjax,
            smart: self.smart,
            extra_args: Vec::new(),
        }
    }
}

/// The top-level synchronise configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchroniseConfig {
    pub download: DownloadConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("document {0} has no \\setDocRef handle")]
    MissingHandle(PathBuf),
}

/// One extracted document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub handle: Option<String>,
    pub jsonld: Value,
}

/// Extensions whose last commit dates a document's content.
pub const CONTENT_EXTENSIONS: [&str; 2] = ["tex", "bib"];

/// Read, render and describe a single root TeX file.
///
/// `dateModified` comes from an ISO `\date{}`; otherwise from the last git
/// commit touching the document's `.tex` or `.bib` files, when the source
/// directory is a repository.
pub fn extract_jsonld(
    root_tex: &Path,
    options: &ConvertOptions,
    converter: &dyn Converter,
    linker: Option<&CitationLinker>,
    source_url: Option<&str>,
) -> Result<Extracted, ExtractError> {
    let doc = LsstDoc::read(root_tex)?;
    let rendered = doc.render(converter, options, linker)?;
    let committed = match doc.revision_date() {
        Some(_) => None,
        None => content_commit_date(root_tex),
    };
    let jsonld = build_jsonld(&doc, &rendered, source_url, committed);
    debug!(path = %root_tex.display(), handle = ?doc.handle(), "Extracted document metadata");
    Ok(Extracted {
        handle: doc.handle().map(str::to_string),
        jsonld,
    })
}

fn content_commit_date(root_tex: &Path) -> Option<DateTime<Utc>> {
    let root_dir = match root_tex.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    get_content_commit_date(&CONTENT_EXTENSIONS, root_dir)
        .inspect_err(|e| debug!(path = %root_dir.display(), error = %e, "No content commit date"))
        .ok()
}

/// A citation linker backed by the configured bibliographies, or `None`
/// when citation linking is switched off.
pub async fn prepare_linker(
    process: &ProcessConfig,
    cache: &BibtexCache,
) -> Option<CitationLinker> {
    if !process.link_citations {
        return None;
    }
    let bibliography = cache.bibliography(&process.bibliographies).await;
    info!(entries = bibliography.len(), "Loaded bibliographies for citation linking");
    Some(CitationLinker::new(Some(Arc::new(bibliography))))
}

/// Browsable URL of a source's repository, when there is one.
pub fn source_url(source: &DownloadedSource) -> Option<String> {
    match &source.original_source {
        SourceAction::Git(git) => Some(
            parse_repo_slug(&git.repo_url)
                .map(|slug| slug.html_url())
                .unwrap_or_else(|_| git.repo_url.clone()),
        ),
        SourceAction::Local(_) => None,
    }
}

#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub uploaded: Vec<UploadReceipt>,
    pub failed: Vec<FailedDocument>,
}

impl SynchroniseReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub async fn synchronise<U>(
    process: &ProcessConfig,
    converter: &dyn Converter,
    linker: Option<&CitationLinker>,
    uploader: &U,
    manifest: &DownloadedManifest,
) -> SynchroniseReport
where
    U: Uploader + ?Sized,
{
    info!(
        sources = manifest.sources.len(),
        download_failures = manifest.failed.len(),
        "[SYNC] Starting synchronisation pipeline"
    );
    let options = process.convert_options();
    // Sources that never downloaded count as failed documents of this run.
    let mut report = SynchroniseReport {
        uploaded: Vec::new(),
        failed: manifest.failed.clone(),
    };

    for source in &manifest.sources {
        let root_tex = source.root_tex_path();
        info!(
            source = %source.logical_name,
            path = %root_tex.display(),
            "[SYNC] Extracting document"
        );

        let url = source_url(source);
        let record = extract_jsonld(&root_tex, &options, converter, linker, url.as_deref())
            .and_then(|extracted| match extracted.handle {
                Some(report_number) => Ok(MetadataRecord {
                    report_number,
                    jsonld: extracted.jsonld,
                }),
                None => Err(ExtractError::MissingHandle(root_tex.clone())),
            });
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                error!(
                    source = %source.logical_name,
                    error = %e,
                    "[SYNC][ERROR] Extraction failed"
                );
                report.failed.push(FailedDocument {
                    logical_name: source.logical_name.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        info!(report_number = %record.report_number, "[SYNC][UPLOAD] Upserting record");
        match uploader.upsert_record(&record).await {
            Ok(receipt) => {
                info!(
                    report_number = %receipt.report_number,
                    created = receipt.created,
                    "[SYNC][UPLOAD] Upsert succeeded"
                );
                report.uploaded.push(receipt);
            }
            Err(e) => {
                error!(
                    report_number = %record.report_number,
                    error = %e,
                    "[SYNC][ERROR][UPLOAD] Upsert failed"
                );
                report.failed.push(FailedDocument {
                    logical_name: source.logical_name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        "[SYNC] Synchronisation finished"
    );
    report
}
