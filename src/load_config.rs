/// `load_config` module: reads the YAML sync configuration into the core's
/// [`SynchroniseConfig`].
///
/// This is the only place where user-supplied YAML is parsed. Secrets (API
/// URL and token) are never read from the file; the uploader takes them from
/// the environment.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use projectmeta_core::download::{DownloadConfig, SourceAction};
use projectmeta_core::synchronise::{ProcessConfig, SynchroniseConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// On-disk shape: `sources` may be omitted, and so may `process`.
#[derive(Debug, Deserialize)]
struct FileConfig {
    download: FileDownload,
    #[serde(default)]
    process: ProcessConfig,
}

#[derive(Debug, Deserialize)]
struct FileDownload {
    output_dir: PathBuf,
    #[serde(default)]
    sources: Vec<SourceAction>,
}

impl From<FileConfig> for SynchroniseConfig {
    fn from(file: FileConfig) -> Self {
        SynchroniseConfig {
            download: DownloadConfig {
                output_dir: file.download.output_dir,
                sources: file.download.sources,
            },
            process: file.process,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SynchroniseConfig> {
    let path = path.as_ref();
    info!(config_path = %path.display(), "Reading sync configuration");

    let text = fs::read_to_string(path)
        .inspect_err(|e| {
            error!(error = ?e, config_path = %path.display(), "Cannot read config file");
        })
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let file: FileConfig = serde_yaml::from_str(&text)
        .inspect_err(|e| {
            error!(error = %e, config_path = %path.display(), "Invalid config YAML");
        })
        .with_context(|| format!("Failed to parse config YAML in {}", path.display()))?;

    let config = SynchroniseConfig::from(file);
    info!(
        output_dir = %config.download.output_dir.display(),
        sources_count = config.download.sources.len(),
        format = ?config.process.format,
        link_citations = config.process.link_citations,
        "Loaded sync configuration"
    );
    debug!(?config, "Sync configuration (full)");
    Ok(config)
}
