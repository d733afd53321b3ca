//! JSON-LD metadata records (CodeMeta + schema.org) for LSST documents.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

use crate::tex::lsstdoc::{LsstDoc, RenderedDoc};

pub const CODEMETA_CONTEXT: &str =
    "https://raw.githubusercontent.com/codemeta/codemeta/2.0-rc/codemeta.jsonld";
pub const SCHEMA_ORG_CONTEXT: &str = "http://schema.org";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// `2017-07-04T00:00:00Z`
pub fn encode_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn decode_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map(|naive| naive.and_utc())
}

/// Assemble the metadata record of a document.
///
/// Display fields come from `rendered`; identifiers come from `doc`.
/// `dateModified` is the document's revision date at midnight UTC, or
/// `committed` when the document has no ISO revision date. Fields that are
/// absent are left out of the record.
pub fn build_jsonld(
    doc: &LsstDoc,
    rendered: &RenderedDoc,
    source_url: Option<&str>,
    committed: Option<DateTime<Utc>>,
) -> Value {
    let mut record = Map::new();
    record.insert(
        "@context".into(),
        json!([CODEMETA_CONTEXT, SCHEMA_ORG_CONTEXT]),
    );
    record.insert("@type".into(), json!(["Report", "SoftwareSourceCode"]));
    record.insert("language".into(), json!("TeX"));

    if let Some(handle) = doc.handle() {
        record.insert("reportNumber".into(), json!(handle));
    }
    if let Some(name) = rendered.title.as_deref().or(doc.title()) {
        record.insert("name".into(), json!(name));
    }
    if let Some(description) = rendered.abstract_text.as_deref() {
        record.insert("description".into(), json!(description));
    }
    if !rendered.authors.is_empty() {
        let authors: Vec<Value> = rendered
            .authors
            .iter()
            .map(|name| json!({"@type": "Person", "name": name}))
            .collect();
        record.insert("author".into(), Value::Array(authors));
    }
    if let Some(url) = source_url {
        record.insert("codeRepository".into(), json!(url));
    }
    let modified = doc
        .revision_date()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .or(committed);
    if let Some(modified) = modified {
        record.insert("dateModified".into(), json!(encode_datetime(&modified)));
    }

    Value::Object(record)
}
