pub mod emitters;

use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::catalog::{file_name, file_stem};
use crate::domain::{
    BaseModel, MAX_HEADER_BYTES, MODEL_FILE_EXTENSION, MetadataRecord, MetadataSource,
    SAFETENSORS_METADATA_KEY, ScanStats, ScannedModel,
};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json in {}: {}", .path.display(), .source)]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid metadata in {}: {}", .path.display(), .reason)]
    Metadata { path: PathBuf, reason: String },
    #[error("invalid hint file {}: {}", .path.display(), .reason)]
    Hint { path: PathBuf, reason: String },
    #[error("{0}")]
    Message(String),
}

pub trait FilePorts {
    /// Calls `on_file` for every regular file under `target`, or for
    /// `target` itself when it is not a directory.
    fn for_each_file(
        &self,
        target: &Path,
        on_file: &mut dyn FnMut(PathBuf) -> Result<(), ScanError>,
    ) -> Result<(), ScanError>;
    fn is_file(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String, ScanError>;
    fn open(&self, path: &Path) -> Result<Box<dyn Read>, ScanError>;
}

pub trait ProgressReporter {
    fn on_start(&self, total: u64);
    fn on_update(&self, stats: &ScanStats);
    fn on_finish(&self, stats: &ScanStats);
}

/// User supplied metadata overrides keyed by model file name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Hints {
    entries: HashMap<String, Map<String, Value>>,
}

impl Hints {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ScanError> {
        let value: Value = serde_json::from_str(text).map_err(|source| ScanError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(top) = value else {
            return Err(ScanError::Hint {
                path: path.to_path_buf(),
                reason: "top level must be an object".to_string(),
            });
        };

        let mut entries = HashMap::with_capacity(top.len());
        for (file_name, hint) in top {
            let Value::Object(fields) = hint else {
                return Err(ScanError::Hint {
                    path: path.to_path_buf(),
                    reason: format!("hint for {file_name} must be an object"),
                });
            };
            entries.insert(file_name, fields);
        }

        Ok(Self { entries })
    }

    pub fn get(&self, file_name: &str) -> Map<String, Value> {
        self.entries.get(file_name).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_hints(ports: &dyn FilePorts, path: &Path) -> Result<Hints, ScanError> {
    let text = ports.read_to_string(path)?;
    let hints = Hints::parse(path, &text)?;
    if hints.is_empty() {
        warn!("hint file {} has no entries", path.display());
    } else {
        info!("loaded {} hints from {}", hints.len(), path.display());
    }
    Ok(hints)
}

/// `<dir>/<stem>.<suffix>` for a model file `<dir>/<stem>.safetensors`.
pub fn companion_path(target: &Path, suffix: &str) -> PathBuf {
    let mut path: OsString = target.with_extension("").into_os_string();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// Reads the `__metadata__` object of a safetensors header: an 8 byte
/// little-endian length followed by that many bytes of UTF-8 JSON.
pub fn read_safetensors_metadata(
    path: &Path,
    mut reader: impl Read,
) -> Result<Option<Map<String, Value>>, ScanError> {
    let invalid = |reason: String| ScanError::Metadata {
        path: path.to_path_buf(),
        reason,
    };

    let mut size_buf = [0u8; 8];
    reader
        .read_exact(&mut size_buf)
        .map_err(|err| invalid(format!("cannot read header length: {err}")))?;
    let header_size = u64::from_le_bytes(size_buf);
    if header_size > MAX_HEADER_BYTES {
        return Err(invalid(format!("header too large: {header_size} bytes")));
    }

    let mut header_buf = vec![0u8; header_size as usize];
    reader
        .read_exact(&mut header_buf)
        .map_err(|err| invalid(format!("truncated header: {err}")))?;
    let header_str =
        String::from_utf8(header_buf).map_err(|err| invalid(format!("header is not utf-8: {err}")))?;

    let header: Value = serde_json::from_str(&header_str).map_err(|source| ScanError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Object(mut header) = header else {
        return Err(invalid("header is not a JSON object".to_string()));
    };

    match header.remove(SAFETENSORS_METADATA_KEY) {
        Some(Value::Object(metadata)) => Ok(Some(metadata)),
        _ => Ok(None),
    }
}

fn read_json_object(ports: &dyn FilePorts, path: &Path) -> Result<Map<String, Value>, ScanError> {
    let text = ports.read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|source| ScanError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(ScanError::Metadata {
            path: path.to_path_buf(),
            reason: "expected a JSON object".to_string(),
        }),
    }
}

/// Loads the priority-ordered metadata list of one model file: the hint
/// first, then every existing companion in `MetadataSource::COMPANIONS`
/// order. Empty companions are skipped; the hint is always present.
pub fn load_metadata(
    ports: &dyn FilePorts,
    target: &Path,
    hints: &Hints,
) -> Result<Vec<MetadataRecord>, ScanError> {
    let mut records = vec![MetadataRecord::new(
        MetadataSource::Hint,
        hints.get(&file_name(target)),
    )];

    for source in MetadataSource::COMPANIONS {
        let Some(suffix) = source.suffix() else {
            continue;
        };
        let path = companion_path(target, suffix);
        if !ports.is_file(&path) {
            continue;
        }

        let fields = match source {
            MetadataSource::Safetensors => read_safetensors_metadata(&path, ports.open(&path)?)?,
            _ => Some(read_json_object(ports, &path)?),
        };
        if let Some(fields) = fields.filter(|fields| !fields.is_empty()) {
            records.push(MetadataRecord::new(source, fields));
        }
    }

    Ok(records)
}

pub fn is_model_file(path: &Path) -> bool {
    file_name(path).ends_with(&format!(".{MODEL_FILE_EXTENSION}"))
}

/// Collects model files from every target. Directories are walked
/// recursively; explicit file targets are taken as given.
pub fn collect_model_files(
    ports: &dyn FilePorts,
    targets: &[PathBuf],
) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for target in targets {
        let explicit = ports.is_file(target);
        ports.for_each_file(target, &mut |path| {
            if explicit || is_model_file(&path) {
                files.push(path);
            }
            Ok::<(), ScanError>(())
        })?;
    }
    Ok(files)
}

pub fn model_stems(files: &[PathBuf]) -> BTreeSet<String> {
    files.iter().map(|path| file_stem(path)).collect()
}

pub fn scan_models(
    ports: &dyn FilePorts,
    progress: &dyn ProgressReporter,
    files: &[PathBuf],
    hints: &Hints,
) -> Result<Vec<ScannedModel>, ScanError> {
    let mut stats = ScanStats {
        models_found: files.len() as u64,
        ..ScanStats::default()
    };
    progress.on_start(stats.models_found);

    let mut models = Vec::with_capacity(files.len());
    for path in files {
        info!("reading {}", path.display());
        let records = load_metadata(ports, path, hints)?;
        stats.metadata_records += records
            .iter()
            .filter(|record| record.source != MetadataSource::Hint)
            .count() as u64;

        let model = ScannedModel::from_records(path.clone(), records);
        if model.base_model == BaseModel::Unkn {
            stats.unknown_base_models += 1;
        }

        stats.models_scanned += 1;
        progress.on_update(&stats);
        models.push(model);
    }

    progress.on_finish(&stats);
    Ok(models)
}
