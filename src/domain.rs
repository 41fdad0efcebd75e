pub mod base_model;
pub mod catalog;
pub mod fields;
pub mod naming;
pub mod weight;

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

pub const MODEL_FILE_EXTENSION: &str = "safetensors";
pub const SAFETENSORS_METADATA_KEY: &str = "__metadata__";
pub const MAX_HEADER_BYTES: u64 = 100_000_000;
pub const NONAME_CREATOR: &str = "__noname__";

pub use base_model::BaseModel;
pub use catalog::{ScannedModel, YamlFragment};
pub use weight::Weight;

/// Where a metadata record was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataSource {
    Hint,
    CivitaiInfo,
    CmInfo,
    Json,
    Safetensors,
}

impl MetadataSource {
    /// Companion sources in the order they are consulted after the hint.
    pub const COMPANIONS: [MetadataSource; 4] = [
        MetadataSource::CivitaiInfo,
        MetadataSource::CmInfo,
        MetadataSource::Json,
        MetadataSource::Safetensors,
    ];

    pub fn suffix(self) -> Option<&'static str> {
        match self {
            MetadataSource::Hint => None,
            MetadataSource::CivitaiInfo => Some("civitai.info"),
            MetadataSource::CmInfo => Some("cm-info.json"),
            MetadataSource::Json => Some("json"),
            MetadataSource::Safetensors => Some(MODEL_FILE_EXTENSION),
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix() {
            Some(suffix) => f.write_str(suffix),
            None => f.write_str("hint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub source: MetadataSource,
    pub fields: Map<String, Value>,
}

impl MetadataRecord {
    pub fn new(source: MetadataSource, fields: Map<String, Value>) -> Self {
        Self { source, fields }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub models_found: u64,
    pub models_scanned: u64,
    pub metadata_records: u64,
    pub unknown_base_models: u64,
}
