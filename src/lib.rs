pub mod application;
pub mod domain;
pub mod infrastructure;

pub use crate::application::emitters::{
    validate_wildcards, write_dump, write_jinja_overrides, write_list, write_singulars,
    write_split_places, write_summary, write_variants, WildcardReport,
};
pub use crate::application::{
    collect_model_files, load_hints, load_metadata, model_stems, scan_models, FilePorts, Hints,
    ProgressReporter, ScanError,
};
pub use crate::domain::{
    BaseModel, MetadataRecord, MetadataSource, ScanStats, ScannedModel, Weight, YamlFragment,
    MODEL_FILE_EXTENSION,
};
pub use crate::infrastructure::{
    open_output, FsPorts, IndicatifProgressReporter, LineProgressReporter, NoProgressReporter,
};
