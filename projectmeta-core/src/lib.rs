#![doc = "projectmeta-core: core logic library for projectmeta."]

//! Everything needed to turn LSST LaTeX documents into metadata records:
//! TeX command parsing and normalization, the `lsstdoc` document model,
//! citation linking, markup conversion, JSON-LD assembly and the
//! download → extract → upload pipeline.
//!
//! The binary crate only adds configuration loading, the HTTP uploader and
//! the command line.

pub mod contract;
pub mod convert;
pub mod download;
pub mod github;
pub mod jsonld;
pub mod lsstbib;
pub mod synchronise;
pub mod tex;
