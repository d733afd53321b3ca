/// Command line interface for projectmeta.
///
/// All parsing, extraction and pipeline logic lives in `projectmeta-core`;
/// this module only wires configuration, environment and collaborators
/// together.
///
/// - `sync` downloads the configured document sources, extracts their
///   metadata and upserts the records to the metadata service.
/// - `extract` prints the JSON-LD record of one local root TeX file.
use crate::load_config::load_config;
use crate::upload::MetadataClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use projectmeta_core::contract::Downloader;
use projectmeta_core::convert::{
    ConvertOptions, Converter, OutputFormat, PandocConverter, PassthroughConverter,
};
use projectmeta_core::download::DefaultDownloader;
use projectmeta_core::lsstbib::{BibtexCache, HttpBibtexFetcher};
use projectmeta_core::synchronise::{extract_jsonld, prepare_linker, synchronise, ProcessConfig};
use projectmeta_core::tex::citelink::CitationLinker;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for projectmeta: metadata records for LSST LaTeX documents.
#[derive(Parser)]
#[clap(
    name = "projectmeta",
    version,
    about = "Extract metadata from LSST LaTeX documents and publish it as JSON-LD"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise all configured documents to the metadata service
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Print the JSON-LD record of a local root TeX file
    Extract {
        /// Root TeX file of the document
        path: PathBuf,
        /// Output markup for converted fields: html or plain
        #[clap(long, default_value = "html")]
        format: OutputFormat,
        /// Leave fields as LaTeX instead of converting them with pandoc
        #[clap(long)]
        no_pandoc: bool,
        /// Repository URL recorded as codeRepository
        #[clap(long)]
        source_url: Option<String>,
    },
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => run_sync(config).await,
        Commands::Extract {
            path,
            format,
            no_pandoc,
            source_url,
        } => run_extract(path, format, no_pandoc, source_url),
    }
}

fn converter(no_pandoc: bool) -> Box<dyn Converter> {
    if no_pandoc {
        Box::new(PassthroughConverter)
    } else {
        Box::new(PandocConverter::new())
    }
}

async fn run_sync(config: PathBuf) -> Result<()> {
    let config = load_config(config)?;
    tracing::info!(command = "sync", "Starting synchronisation process");

    let uploader = MetadataClient::new_from_env()
        .map_err(|e| anyhow::anyhow!("Failed to construct uploader from env: {e}"))?;

    let downloader = DefaultDownloader::new(config.download.clone());
    let manifest = Downloader::download_all(&downloader)
        .await
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let cache = BibtexCache::new(Arc::new(HttpBibtexFetcher::default()));
    let linker = prepare_linker(&config.process, &cache).await;
    let converter = converter(false);

    let report = synchronise(
        &config.process,
        converter.as_ref(),
        linker.as_ref(),
        &uploader,
        &manifest,
    )
    .await;

    println!(
        "Synchronised {} documents, {} failed",
        report.uploaded.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  {}: {}", failure.logical_name, failure.error);
    }

    if report.is_success() {
        tracing::info!(
            command = "sync",
            uploaded = report.uploaded.len(),
            "Synchronisation complete"
        );
        Ok(())
    } else {
        tracing::error!(
            command = "sync",
            failed = report.failed.len(),
            "Synchronisation finished with failures"
        );
        Err(anyhow::anyhow!(
            "{} documents failed to synchronise",
            report.failed.len()
        ))
    }
}

/// Same conversion settings as `sync` with its default process section, in
/// the requested format.
fn extract_options(format: OutputFormat) -> ConvertOptions {
    ConvertOptions {
        format,
        ..ProcessConfig::default().convert_options()
    }
}

fn run_extract(
    path: PathBuf,
    format: OutputFormat,
    no_pandoc: bool,
    source_url: Option<String>,
) -> Result<()> {
    tracing::info!(command = "extract", path = %path.display(), "Extracting document metadata");
    let options = extract_options(format);
    let linker = CitationLinker::new(None);
    let converter = converter(no_pandoc);
    let extracted = extract_jsonld(
        &path,
        &options,
        converter.as_ref(),
        Some(&linker),
        source_url.as_deref(),
    )?;
    println!("{}", serde_json::to_string_pretty(&extracted.jsonld)?);
    Ok(())
}
