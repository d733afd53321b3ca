use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use mockall::predicate::eq;
use projectmeta_core::contract::{Downloader, MetadataRecord, MockUploader, UploadReceipt};
use projectmeta_core::convert::{MockConverter, PassthroughConverter};
use projectmeta_core::download::{
    get_content_commit_date, read_git_commit_timestamp_for_file, DefaultDownloader,
    DownloadConfig, GitSource, LocalSource, SourceAction,
};
use projectmeta_core::lsstbib::{BibtexCache, MockBibtexFetcher};
use projectmeta_core::synchronise::{prepare_linker, synchronise, ProcessConfig};
use tempfile::tempdir;

fn write_document(dir: &Path, file: &str, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file), body).unwrap();
}

fn receipt_for(record: &MetadataRecord) -> UploadReceipt {
    UploadReceipt {
        report_number: record.report_number.clone(),
        content_hash: "hash123".into(),
        created: true,
    }
}

fn local(path: &Path, root_tex: &str) -> SourceAction {
    SourceAction::Local(LocalSource {
        path: path.to_path_buf(),
        root_tex: root_tex.into(),
    })
}

#[tokio::test]
async fn test_synchronise_continues_past_failed_documents() {
    let root = tempdir().unwrap();
    let good = root.path().join("good");
    let no_handle = root.path().join("no_handle");
    let broken = root.path().join("broken");
    write_document(
        &good,
        "LDM-151.tex",
        concat!(
            "\\title{Data Management Science Pipelines Design}\n",
            "\\setDocRef{LDM-151}\n",
            "\\author{John Swinbank}\n",
        ),
    );
    write_document(&no_handle, "doc.tex", "\\title{Untitled note}\n");
    write_document(&broken, "doc.tex", "\\setDocRef{DMTN-1}\n\\input{missing}\n");

    let downloader = DefaultDownloader::new(DownloadConfig {
        output_dir: root.path().join("out"),
        sources: vec![
            local(&no_handle, "doc.tex"),
            local(&good, "LDM-151.tex"),
            local(&broken, "doc.tex"),
        ],
    });
    let manifest = downloader
        .download_all()
        .await
        .expect("Local sources should resolve");
    assert_eq!(manifest.sources.len(), 3);

    let mut uploader = MockUploader::new();
    uploader
        .expect_upsert_record()
        .withf(|record: &MetadataRecord| {
            record.report_number == "LDM-151"
                && record.jsonld["name"] == "Data Management Science Pipelines Design"
                && record.jsonld["author"][0]["name"] == "John Swinbank"
                && record.jsonld.get("codeRepository").is_none()
        })
        .times(1)
        .returning(|record| Ok(receipt_for(record)));

    let process = ProcessConfig {
        link_citations: false,
        ..ProcessConfig::default()
    };
    let report = synchronise(&process, &PassthroughConverter, None, &uploader, &manifest).await;

    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.uploaded[0].report_number, "LDM-151");
    assert_eq!(report.failed.len(), 2);
    assert!(!report.is_success());
    assert!(report.failed[0].error.contains("no \\setDocRef handle"));
    assert!(report.failed[1].error.contains("missing.tex"));
}

#[tokio::test]
async fn test_synchronise_records_upload_failures() {
    let root = tempdir().unwrap();
    let a = root.path().join("a");
    let b = root.path().join("b");
    write_document(&a, "a.tex", "\\setDocRef{SQR-001}\n");
    write_document(&b, "b.tex", "\\setDocRef{SQR-002}\n");

    let manifest = DefaultDownloader::new(DownloadConfig {
        output_dir: root.path().join("out"),
        sources: vec![local(&a, "a.tex"), local(&b, "b.tex")],
    })
    .download_all()
    .await
    .unwrap();

    let mut uploader = MockUploader::new();
    uploader
        .expect_upsert_record()
        .withf(|record: &MetadataRecord| record.report_number == "SQR-001")
        .returning(|_| Err("service unavailable".into()));
    uploader
        .expect_upsert_record()
        .withf(|record: &MetadataRecord| record.report_number == "SQR-002")
        .returning(|record| Ok(receipt_for(record)));

    let report = synchronise(
        &ProcessConfig::default(),
        &PassthroughConverter,
        None,
        &uploader,
        &manifest,
    )
    .await;

    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error, "service unavailable");
}

#[tokio::test]
async fn test_synchronise_links_citations_in_abstract() {
    let root = tempdir().unwrap();
    let doc = root.path().join("doc");
    write_document(
        &doc,
        "DMTN-036.tex",
        "\\setDocRef{DMTN-036}\n\\setDocAbstract{Follows \\citep{LDM-151}.}\n",
    );
    let manifest = DefaultDownloader::new(DownloadConfig {
        output_dir: root.path().join("out"),
        sources: vec![local(&doc, "DMTN-036.tex")],
    })
    .download_all()
    .await
    .unwrap();

    let mut fetcher = MockBibtexFetcher::new();
    fetcher.expect_fetch().with(eq("lsst-dm")).times(1).returning(|_| {
        Ok(concat!(
            "@DocuShare{LDM-151, author = {John D. Swinbank},",
            " year = 2017, handle = {LDM-151}}"
        )
        .into())
    });
    let cache = BibtexCache::new(Arc::new(fetcher));
    let process = ProcessConfig {
        bibliographies: vec!["lsst-dm.bib".into(), "unknown".into()],
        ..ProcessConfig::default()
    };
    let linker = prepare_linker(&process, &cache).await.expect("linking enabled");

    let mut converter = MockConverter::new();
    converter
        .expect_convert()
        .returning(|content, _, _, _| Ok(content.to_string()));

    let mut uploader = MockUploader::new();
    uploader
        .expect_upsert_record()
        .withf(|record: &MetadataRecord| {
            record.jsonld["description"]
                == r"Follows [\href{https://ls.st/LDM-151}{Swinbank 2017}]."
        })
        .times(1)
        .returning(|record| Ok(receipt_for(record)));

    let report =
        synchronise(&process, &converter, Some(&linker), &uploader, &manifest).await;
    assert!(report.is_success(), "failures: {:?}", report.failed);
}

#[tokio::test]
async fn test_prepare_linker_disabled() {
    let mut fetcher = MockBibtexFetcher::new();
    fetcher.expect_fetch().never();
    let cache = BibtexCache::new(Arc::new(fetcher));
    let process = ProcessConfig {
        link_citations: false,
        ..ProcessConfig::default()
    };
    assert!(prepare_linker(&process, &cache).await.is_none());
}

#[tokio::test]
async fn test_missing_source_is_reported_without_stopping_the_run() {
    let root = tempdir().unwrap();
    let present = root.path().join("present");
    let absent = root.path().join("absent");
    write_document(&present, "doc.tex", "\\setDocRef{DMTN-036}\n");

    let manifest = DefaultDownloader::new(DownloadConfig {
        output_dir: root.path().join("out"),
        sources: vec![local(&absent, "doc.tex"), local(&present, "doc.tex")],
    })
    .download_all()
    .await
    .expect("a missing source must not fail the whole download");

    let mut uploader = MockUploader::new();
    uploader
        .expect_upsert_record()
        .withf(|record: &MetadataRecord| record.report_number == "DMTN-036")
        .times(1)
        .returning(|record| Ok(receipt_for(record)));

    let report = synchronise(
        &ProcessConfig::default(),
        &PassthroughConverter,
        None,
        &uploader,
        &manifest,
    )
    .await;

    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].logical_name, absent.display().to_string());
    assert!(report.failed[0].error.contains("does not exist"));
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_git_source_is_cloned_and_checked_out() {
    let root = tempdir().unwrap();
    let origin = root.path().join("origin");
    write_document(&origin, "SQR-000.tex", "\\setDocRef{SQR-000}\n\\date{\\today}\n");
    if !git(&origin, &["init", "--quiet"]) {
        // git is unavailable in this environment.
        return;
    }
    assert!(git(&origin, &["add", "."]));
    assert!(git(&origin, &["commit", "--quiet", "-m", "init"]));
    assert!(git(&origin, &["tag", "v1"]));

    let output_dir = root.path().join("out");
    let repo_url = origin.display().to_string();
    let downloader = DefaultDownloader::new(DownloadConfig {
        output_dir: output_dir.clone(),
        sources: vec![SourceAction::Git(GitSource {
            repo_url: repo_url.clone(),
            reference: Some("v1".into()),
            root_tex: "SQR-000.tex".into(),
        })],
    });

    // Twice: an existing clone is replaced.
    for _ in 0..2 {
        let manifest = downloader.download_all().await.expect("download should succeed");
        assert!(manifest.failed.is_empty(), "failures: {:?}", manifest.failed);
        let source = &manifest.sources[0];
        assert_eq!(source.logical_name, repo_url);
        assert!(source.local_path.starts_with(&output_dir));
        assert!(source.root_tex_path().is_file());
    }

    let manifest = downloader.download_all().await.unwrap();
    let clone = &manifest.sources[0];
    let committed = read_git_commit_timestamp_for_file(&clone.root_tex_path())
        .expect("committed file has a timestamp");
    assert_eq!(
        get_content_commit_date(&["tex", "bib"], &clone.local_path).unwrap(),
        committed
    );
    assert!(read_git_commit_timestamp_for_file(&clone.local_path.join("absent.tex")).is_err());

    // `\date{\today}` is not a date, so the commit time stands in.
    let mut uploader = MockUploader::new();
    uploader
        .expect_upsert_record()
        .withf(|record: &MetadataRecord| {
            record.report_number == "SQR-000" && record.jsonld["dateModified"].is_string()
        })
        .times(1)
        .returning(|record| Ok(receipt_for(record)));
    let report = synchronise(
        &ProcessConfig::default(),
        &PassthroughConverter,
        None,
        &uploader,
        &manifest,
    )
    .await;
    assert!(report.is_success(), "failures: {:?}", report.failed);
}
