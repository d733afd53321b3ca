//! # Metadata service client
//!
//! Implements the core `Uploader` trait over HTTP.
//!
//! Records are stored with `PUT {PROJECTMETA_API_URL}/records/{reportNumber}`.
//! The service answers `201 Created` for a new record and `200 OK` (or
//! `204 No Content`) when an existing record was replaced.
//!
//! Construct [`MetadataClient`] from the environment (`PROJECTMETA_API_URL`,
//! `PROJECTMETA_API_TOKEN`); a `.env` file is honoured.

use async_trait::async_trait;
use projectmeta_core::contract::{MetadataRecord, UploadError, UploadReceipt, Uploader};
use reqwest::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::env;

pub const API_URL_VAR: &str = "PROJECTMETA_API_URL";
pub const API_TOKEN_VAR: &str = "PROJECTMETA_API_TOKEN";

pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct RecordBody<'a> {
    content_hash: &'a str,
    jsonld: &'a serde_json::Value,
}

/// Hex SHA-256 of the record's serialized JSON-LD.
pub fn content_hash(jsonld: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(jsonld.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn new_from_env() -> Result<Self, UploadError> {
        dotenvy::dotenv().ok();
        match (env::var(API_URL_VAR), env::var(API_TOKEN_VAR)) {
            (Ok(base_url), Ok(token)) => {
                tracing::info!(
                    base_url = %base_url,
                    token_set = !token.is_empty(),
                    "Initialized MetadataClient from environment"
                );
                Ok(Self::new(base_url, token))
            }
            (Err(e), _) => {
                tracing::error!(error = ?e, "{API_URL_VAR} missing in environment");
                Err(format!("{API_URL_VAR}: {e}").into())
            }
            (_, Err(e)) => {
                tracing::error!(error = ?e, "{API_TOKEN_VAR} missing in environment");
                Err(format!("{API_TOKEN_VAR}: {e}").into())
            }
        }
    }

    pub fn record_url(&self, report_number: &str) -> String {
        format!("{}/records/{}", self.base_url, report_number)
    }
}

#[async_trait]
impl Uploader for MetadataClient {
    async fn upsert_record(&self, record: &MetadataRecord) -> Result<UploadReceipt, UploadError> {
        let hash = content_hash(&record.jsonld);
        let url = self.record_url(&record.report_number);
        tracing::info!(
            report_number = %record.report_number,
            %url,
            content_hash = %hash,
            "Uploading metadata record"
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&RecordBody {
                content_hash: &hash,
                jsonld: &record.jsonld,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, %url, "Request to metadata service failed");
                e
            })?;

        let status = response.status();
        let created = match status {
            StatusCode::CREATED => true,
            StatusCode::OK | StatusCode::NO_CONTENT => false,
            other => {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %other, body = %body, "Metadata service rejected record");
                return Err(format!("metadata service returned {other}: {body}").into());
            }
        };

        tracing::info!(report_number = %record.report_number, created, "Stored metadata record");
        Ok(UploadReceipt {
            report_number: record.report_number.clone(),
            content_hash: hash,
            created,
        })
    }
}
