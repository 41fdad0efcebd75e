use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::domain::MetadataRecord;

/// Base model family a LoRA targets. Declaration order is emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BaseModel {
    Sd15,
    Sdxl,
    Pony,
    Ilxl,
    Unkn,
}

impl BaseModel {
    pub fn code(self) -> &'static str {
        match self {
            BaseModel::Sd15 => "sd15",
            BaseModel::Sdxl => "sdxl",
            BaseModel::Pony => "pony",
            BaseModel::Ilxl => "ilxl",
            BaseModel::Unkn => "unkn",
        }
    }
}

impl fmt::Display for BaseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Metadata keys carrying a base model tag, most authoritative first.
pub const BASE_MODEL_KEYS: &[&str] = &["ss_base_model_version", "baseModel", "BaseModel", "sd version"];

/// Exact (case and spacing sensitive) metadata values.
pub const NORMALIZE_MAP: &[(&str, BaseModel)] = &[
    ("sd_1.5", BaseModel::Sd15),
    ("SD 1.5", BaseModel::Sd15),
    ("SD1", BaseModel::Sd15),
    ("Illustrious", BaseModel::Ilxl),
    ("Pony", BaseModel::Pony),
    ("SDXL 1.0", BaseModel::Sdxl),
    ("SDXL", BaseModel::Sdxl),
    ("sd15", BaseModel::Sd15),
    ("sdxl", BaseModel::Sdxl),
    ("ilxl", BaseModel::Ilxl),
    ("pony", BaseModel::Pony),
];

/// File name substrings, most specific first. The empty key always matches.
pub const FILENAME_KEY_MAP: &[(&str, BaseModel)] = &[
    ("pdxl", BaseModel::Pony),
    ("pony", BaseModel::Pony),
    ("ilxl", BaseModel::Ilxl),
    ("pxl", BaseModel::Pony),
    ("ill", BaseModel::Ilxl),
    ("ixl", BaseModel::Ilxl),
    ("il", BaseModel::Ilxl),
    ("xl", BaseModel::Sdxl),
    ("", BaseModel::Sd15),
];

pub fn normalize_base_model(value: &str) -> Option<BaseModel> {
    NORMALIZE_MAP
        .iter()
        .find(|(raw, _)| *raw == value)
        .map(|(_, base_model)| *base_model)
}

pub fn classify_from_metadata(records: &[MetadataRecord]) -> BaseModel {
    for key in BASE_MODEL_KEYS {
        for record in records {
            let Some(Value::String(value)) = record.fields.get(*key) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            debug!("key [{key}] -> value [{value}] ({})", record.source);
            if let Some(base_model) = normalize_base_model(value) {
                return base_model;
            }
        }
    }
    BaseModel::Unkn
}

pub fn classify_from_filename(path: &Path) -> BaseModel {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    FILENAME_KEY_MAP
        .iter()
        .find(|(key, _)| file_name.contains(key))
        .map(|(_, base_model)| *base_model)
        .unwrap_or(BaseModel::Sd15)
}
