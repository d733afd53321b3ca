//! # lsstbib: bibliographies published in `lsst-texmf`
//!
//! The `lsst-texmf` repository ships the shared BibTeX databases that LSST
//! documents cite from. [`BibtexCache`] downloads them through a
//! [`BibtexFetcher`] and keeps the text for the lifetime of the cache.
//!
//! The cache has no eviction. Two concurrent misses on the same name may
//! both fetch; the later insert wins and both callers get usable text.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::tex::bibtex::Bibliography;

/// Bibliographies available from `lsst-texmf`.
pub const KNOWN_BIBLIOGRAPHIES: [&str; 5] = ["lsst", "lsst-dm", "refs", "books", "refs_ads"];

pub const LSST_TEXMF_BIB_URL: &str =
    "https://raw.githubusercontent.com/lsst/lsst-texmf/master/texmf/bibtex/bib";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unknown bibliography {0:?}")]
    Unknown(String),

    #[error("request for bibliography {name:?} failed: {source}")]
    Http {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("bibliography {name:?} returned HTTP {status}")]
    Status { name: String, status: u16 },
}

/// Reduce a user-supplied name or path (`bib/lsst-dm.bib`) to a bare
/// bibliography name (`lsst-dm`).
pub fn sanitize_name(input: &str) -> String {
    Path::new(input.trim())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn is_known(name: &str) -> bool {
    KNOWN_BIBLIOGRAPHIES.contains(&name)
}

pub fn bibliography_url(base_url: &str, name: &str) -> String {
    format!("{}/{name}.bib", base_url.trim_end_matches('/'))
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BibtexFetcher: Send + Sync {
    /// Fetch the BibTeX text of one known bibliography.
    async fn fetch(&self, name: &str) -> Result<String, FetchError>;
}

/// Downloads bibliographies over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBibtexFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl Default for HttpBibtexFetcher {
    fn default() -> Self {
        Self::new(LSST_TEXMF_BIB_URL)
    }
}

impl HttpBibtexFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BibtexFetcher for HttpBibtexFetcher {
    async fn fetch(&self, name: &str) -> Result<String, FetchError> {
        let url = bibliography_url(&self.base_url, name);
        debug!(%url, "Downloading bibliography");
        let http = |source| FetchError::Http {
            name: name.to_string(),
            source,
        };
        let response = self.client.get(&url).send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                name: name.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(http)
    }
}

/// Shared cache of downloaded bibliography text, keyed by name.
pub struct BibtexCache {
    fetcher: Arc<dyn BibtexFetcher>,
    texts: RwLock<HashMap<String, Arc<String>>>,
}

impl BibtexCache {
    pub fn new(fetcher: Arc<dyn BibtexFetcher>) -> Self {
        Self {
            fetcher,
            texts: RwLock::new(HashMap::new()),
        }
    }

    /// BibTeX text of `name`, downloading it on the first request.
    pub async fn get(&self, name: &str) -> Result<Arc<String>, FetchError> {
        if !is_known(name) {
            return Err(FetchError::Unknown(name.to_string()));
        }
        if let Some(text) = self.texts.read().await.get(name) {
            return Ok(Arc::clone(text));
        }
        let text = Arc::new(self.fetcher.fetch(name).await?);
        self.texts
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&text));
        info!(bibliography = name, bytes = text.len(), "Cached bibliography");
        Ok(text)
    }

    /// Parse the named bibliographies into one [`Bibliography`].
    ///
    /// Downloads run concurrently. Unknown names and failed downloads are
    /// logged and skipped; later bibliographies override earlier ones on
    /// duplicate keys.
    pub async fn bibliography(&self, names: &[String]) -> Bibliography {
        let known: Vec<String> = names
            .iter()
            .filter_map(|raw| {
                let name = sanitize_name(raw);
                if is_known(&name) {
                    Some(name)
                } else {
                    warn!(bibliography = %raw, "Skipping unknown bibliography");
                    None
                }
            })
            .collect();

        let texts = join_all(known.iter().map(|name| self.get(name))).await;

        let mut bibliography = Bibliography::default();
        for (name, text) in known.iter().zip(texts) {
            match text {
                Ok(text) => bibliography.extend_from_str(&text),
                Err(e) => warn!(bibliography = %name, error = %e, "Skipping bibliography"),
            }
        }
        bibliography
    }

    pub async fn len(&self) -> usize {
        self.texts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.texts.read().await.is_empty()
    }
}
