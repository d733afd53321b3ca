//! # contract: interfaces between pipeline stages
//!
//! The synchronise pipeline talks to the outside world through two traits:
//! - [`Downloader`] makes document sources available on the local filesystem
//!   and describes them in a [`DownloadedManifest`].
//! - [`Uploader`] stores metadata records in the metadata service.
//!
//! Both are async, return boxed errors, and are annotated for `mockall` so
//! tests can swap in deterministic mocks.

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

pub type DownloadError = Box<dyn std::error::Error + Send + Sync>;
pub type UploadError = Box<dyn std::error::Error + Send + Sync>;

/// Manifest returned from a download: what was fetched and where it lives.
#[derive(Debug, Clone, Default)]
pub struct DownloadedManifest {
    pub sources: Vec<DownloadedSource>,
    /// Sources that could not be made available; the rest are still usable.
    pub failed: Vec<FailedDocument>,
}

/// A source or document the pipeline gave up on, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub logical_name: String,
    pub error: String,
}

/// One document source available locally.
#[derive(Debug, Clone)]
pub struct DownloadedSource {
    /// Human-readable name (repository URL or local path).
    pub logical_name: String,
    /// Directory holding the document source.
    pub local_path: PathBuf,
    /// Root TeX file, relative to `local_path`.
    pub root_tex: PathBuf,
    /// Declared source action, for audit.
    pub original_source: crate::download::SourceAction,
}

impl DownloadedSource {
    pub fn root_tex_path(&self) -> PathBuf {
        self.local_path.join(&self.root_tex)
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch every configured source and describe the result.
    async fn download_all(&self) -> Result<DownloadedManifest, DownloadError>;
}

/// A document's metadata, keyed by its report number (handle).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub report_number: String,
    pub jsonld: serde_json::Value,
}

/// What the metadata service reports after storing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub report_number: String,
    pub content_hash: String,
    /// True when the record did not exist before.
    pub created: bool,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Insert the record, or replace the one stored under the same report
    /// number.
    async fn upsert_record(&self, record: &MetadataRecord) -> Result<UploadReceipt, UploadError>;
}
