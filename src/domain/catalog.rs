use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::domain::base_model::{classify_from_filename, classify_from_metadata};
use crate::domain::fields::{get_creator, get_description, get_keywords, get_title};
use crate::domain::naming::normalize_name;
use crate::domain::weight::get_weight;
use crate::domain::{BaseModel, MetadataRecord, NONAME_CREATOR, Weight};

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A model file together with everything derived from its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedModel {
    pub path: PathBuf,
    pub records: Vec<MetadataRecord>,
    pub title: String,
    pub creator: String,
    pub keywords: Vec<String>,
    pub description: String,
    pub weight: Weight,
    /// Classification from metadata; authoritative.
    pub base_model: BaseModel,
    /// Classification from the file name alone.
    pub inferred_base_model: BaseModel,
}

impl ScannedModel {
    pub fn from_records(path: PathBuf, records: Vec<MetadataRecord>) -> Self {
        let stem = file_stem(&path);
        Self {
            title: get_title(&records),
            creator: get_creator(&records),
            keywords: get_keywords(&records),
            description: get_description(&records),
            weight: get_weight(&stem, &records),
            base_model: classify_from_metadata(&records),
            inferred_base_model: classify_from_filename(&path),
            path,
            records,
        }
    }

    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }

    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }

    pub fn creator_or_noname(&self) -> &str {
        if self.creator.is_empty() {
            NONAME_CREATOR
        } else {
            &self.creator
        }
    }

    /// `<lora:STEM:WEIGHT>[, keyword...] # TITLE [[PROVENANCE]]`
    pub fn lora_line(&self) -> String {
        let keywords: String = self
            .keywords
            .iter()
            .map(|keyword| format!(", {keyword}"))
            .collect();
        format!(
            "<lora:{}:{}>{} # {} [[{}]]",
            self.stem(),
            self.weight.formatted_value(),
            keywords,
            self.title,
            self.weight.provenance
        )
    }
}

pub type VariantGroups = BTreeMap<String, BTreeMap<String, BTreeMap<BaseModel, Vec<PathBuf>>>>;

/// Grouped view of one scan, consumed by the YAML emitters.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct YamlFragment {
    pub by_base_model: BTreeMap<BaseModel, Vec<PathBuf>>,
    /// creator -> normalized name -> base model -> files
    pub variants: VariantGroups,
    pub descriptions: BTreeMap<PathBuf, String>,
    pub places: BTreeMap<(String, String), BTreeSet<PathBuf>>,
}

impl YamlFragment {
    pub fn build(models: &[ScannedModel]) -> Self {
        let mut fragment = Self::default();
        for model in models {
            fragment.insert(model);
        }
        fragment
    }

    fn insert(&mut self, model: &ScannedModel) {
        let path = model.path.clone();
        self.by_base_model
            .entry(model.base_model)
            .or_default()
            .push(path.clone());
        self.descriptions.insert(path.clone(), model.lora_line());

        let creator = model.creator_or_noname().to_string();
        let name = normalize_name(&model.stem());
        self.variants
            .entry(creator.clone())
            .or_default()
            .entry(name.clone())
            .or_default()
            .entry(model.base_model)
            .or_default()
            .push(path.clone());

        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.places.entry((creator, name)).or_default().insert(parent);
    }

    pub fn description(&self, path: &Path) -> &str {
        self.descriptions.get(path).map_or("", String::as_str)
    }

    /// Variant groups whose files live in more than one directory.
    pub fn split_places(&self) -> impl Iterator<Item = (&(String, String), &BTreeSet<PathBuf>)> {
        self.places.iter().filter(|(_, places)| places.len() > 1)
    }
}
