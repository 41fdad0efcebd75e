use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::application::{FilePorts, ScanError};
use crate::domain::{BaseModel, MetadataRecord, ScannedModel, YamlFragment};

pub const OVERRIDE_MACRO_HEADER: &str = "\
{% macro override_basemodel(modelname) -%}
{# ordering from low priority to high priority -#}
{%- set result = 'unkn' -%}";

pub const OVERRIDE_MACRO_FOOTER: &str = "\
{{ result }}
{%- endmacro %}";

const WILDCARD_EXTENSION: &str = "yaml";

static LORA_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<lora:([^>:]*):[0-9.]*>").unwrap());

pub fn write_summary(out: &mut dyn Write, models: &[ScannedModel]) -> io::Result<()> {
    for model in models {
        writeln!(out, "[filename] {}", model.path.display())?;
        writeln!(out, "[title] {}", model.title)?;
        writeln!(
            out,
            "[weight] {} ({})",
            model.weight.formatted_value(), model.weight.provenance
        )?;
        writeln!(out, "[keywords] {}", model.keywords.join(", "))?;
        writeln!(out, "[creator] {}", model.creator)?;
        writeln!(
            out,
            "[basemodel] from name: {} from metadata: {}",
            model.inferred_base_model, model.base_model
        )?;
        writeln!(out, "[description] {}", model.description)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct DumpEntry<'a> {
    file: &'a Path,
    metadata: &'a [MetadataRecord],
}

/// One JSON document per line with every metadata record of a file.
pub fn write_dump(out: &mut dyn Write, models: &[ScannedModel]) -> io::Result<()> {
    for model in models {
        let entry = DumpEntry {
            file: &model.path,
            metadata: &model.records,
        };
        serde_json::to_writer(&mut *out, &entry)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Writes a Jinja macro that corrects the file-name based guess wherever
/// metadata says otherwise. Returns the number of override lines.
pub fn write_jinja_overrides(out: &mut dyn Write, models: &[ScannedModel]) -> io::Result<usize> {
    writeln!(out, "{}", OVERRIDE_MACRO_HEADER)?;
    let mut overrides = 0;
    for model in models {
        if model.base_model == BaseModel::Unkn {
            warn!("can't detect base model of {}", model.file_name());
            continue;
        }
        if model.base_model != model.inferred_base_model {
            writeln!(
                out,
                "{{% set result = '{}' if modelname == '{}' else result -%}}",
                model.base_model,
                model.file_name()
            )?;
            overrides += 1;
        }
    }
    writeln!(out, "{}", OVERRIDE_MACRO_FOOTER)?;
    Ok(overrides)
}

fn write_root(out: &mut dyn Write, root: Option<&str>) -> io::Result<&'static str> {
    match root {
        Some(root) => {
            writeln!(out, "{root}:")?;
            Ok("  ")
        }
        None => Ok(""),
    }
}

fn write_loras(
    out: &mut dyn Write,
    fragment: &YamlFragment,
    pad: &str,
    loras: &[PathBuf],
) -> io::Result<()> {
    for lora in loras {
        writeln!(out, "{pad}- {}", fragment.description(lora))?;
    }
    Ok(())
}

/// `BASE:` followed by every LoRA classified as that base model.
pub fn write_list(out: &mut dyn Write, fragment: &YamlFragment, root: Option<&str>) -> io::Result<()> {
    let pad = write_root(out, root)?;
    for (base_model, loras) in &fragment.by_base_model {
        writeln!(out, "{pad}{base_model}:")?;
        write_loras(out, fragment, &format!("{pad}  "), loras)?;
    }
    Ok(())
}

/// Normalized names published for more than one base model.
pub fn write_variants(
    out: &mut dyn Write,
    fragment: &YamlFragment,
    root: Option<&str>,
) -> io::Result<()> {
    let pad = write_root(out, root)?;
    for variant_bases in fragment.variants.values() {
        for (name, variants) in variant_bases {
            if variants.len() <= 1 {
                continue;
            }
            writeln!(out, "{pad}{name}:")?;
            for (base_model, loras) in variants {
                writeln!(out, "{pad}  {base_model}:")?;
                write_loras(out, fragment, &format!("{pad}    "), loras)?;
            }
        }
    }
    Ok(())
}

/// Normalized names with a single base model, grouped under their creator.
pub fn write_singulars(
    out: &mut dyn Write,
    fragment: &YamlFragment,
    root: Option<&str>,
) -> io::Result<()> {
    let pad = write_root(out, root)?;
    for (creator, variant_bases) in &fragment.variants {
        let mut show_creator = true;
        for (name, variants) in variant_bases {
            if variants.len() > 1 {
                continue;
            }
            if show_creator {
                writeln!(out, "{pad}{creator}:")?;
                show_creator = false;
            }
            writeln!(out, "{pad}  {name}:")?;
            for (base_model, loras) in variants {
                writeln!(out, "{pad}    {base_model}:")?;
                write_loras(out, fragment, &format!("{pad}      "), loras)?;
            }
        }
    }
    Ok(())
}

/// Reports variant groups spread over several directories.
pub fn write_split_places(out: &mut dyn Write, fragment: &YamlFragment) -> io::Result<usize> {
    let mut split = 0;
    for ((creator, name), places) in fragment.split_places() {
        let places: Vec<String> = places.iter().map(|place| place.display().to_string()).collect();
        warn!("{creator}/{name} is split");
        writeln!(out, "{creator}/{name} is split in {}", places.join(" : "))?;
        split += 1;
    }
    Ok(split)
}

fn validate_wildcard_file(
    out: &mut dyn Write,
    wildcard: &Path,
    text: &str,
    loras: &BTreeSet<String>,
) -> io::Result<usize> {
    writeln!(out, "Checking {}...", wildcard.display())?;
    let mut unmatched = 0;
    for line in text.lines() {
        for captures in LORA_REFERENCE.captures_iter(line) {
            if !loras.contains(&captures[1]) {
                writeln!(out, "  {} is not in target loras", &captures[0])?;
                unmatched += 1;
            }
        }
    }
    Ok(unmatched)
}

fn check_yaml_syntax(out: &mut dyn Write, wildcard: &Path, text: &str) -> io::Result<bool> {
    if wildcard.extension().and_then(|ext| ext.to_str()) != Some(WILDCARD_EXTENSION) {
        return Ok(true);
    }
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(_) => Ok(true),
        Err(err) => {
            warn!("{} is not valid YAML", wildcard.display());
            writeln!(out, "  invalid YAML: {err}")?;
            Ok(false)
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WildcardReport {
    pub unmatched: usize,
    pub invalid_yaml: usize,
}

/// Cross-checks `<lora:NAME:WEIGHT>` references in wildcard files against
/// the scanned model stems and parses every `.yaml` file. Problems are
/// written to `out` and counted; they never abort the walk.
pub fn validate_wildcards(
    ports: &dyn FilePorts,
    out: &mut dyn Write,
    wildcards: &[PathBuf],
    loras: &BTreeSet<String>,
) -> Result<WildcardReport, ScanError> {
    let mut report = WildcardReport::default();
    for wildcard in wildcards {
        ports.for_each_file(wildcard, &mut |path| {
            let text = ports.read_to_string(&path)?;
            report.unmatched += validate_wildcard_file(out, &path, &text, loras)?;
            if !check_yaml_syntax(out, &path, &text)? {
                report.invalid_yaml += 1;
            }
            Ok(())
        })?;
    }
    Ok(report)
}
