use serde_json::Value;

use crate::domain::MetadataRecord;

pub type KeyPath = &'static [&'static str];

pub const DESCRIPTION_KEYS: &[KeyPath] = &[
    &["model", "description"],
    &["ModelDescription"],
    &["description"],
];
pub const TITLE_KEYS: &[KeyPath] = &[&["model", "name"], &["ModelName"]];
pub const CREATOR_KEYS: &[KeyPath] = &[&["creator", "username"]];
// trainedWords is a list, activation text a comma separated string
pub const KEYWORD_KEYS: &[KeyPath] = &[&["activation text"], &["trainedWords"], &["TrainedWords"]];
pub const WEIGHT_KEYS: &[KeyPath] = &[&["preferred weight"]];

/// Walks `keys` into `fields`. Safetensors metadata sometimes carries an
/// empty object serialized as the string `"{}"`; that counts as empty.
fn get_recursive<'a>(record: &'a MetadataRecord, keys: &[&str]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    let mut current = record.fields.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    is_truthy(current).then_some(current)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "{}",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Returns the first non-empty value, trying every record for a key path
/// before moving to the next key path.
pub fn get_value<'a>(records: &'a [MetadataRecord], key_paths: &[KeyPath]) -> Option<&'a Value> {
    key_paths
        .iter()
        .find_map(|keys| records.iter().find_map(|record| get_recursive(record, keys)))
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn get_text(records: &[MetadataRecord], key_paths: &[KeyPath]) -> String {
    get_value(records, key_paths)
        .map(value_to_text)
        .unwrap_or_default()
}

pub fn get_description(records: &[MetadataRecord]) -> String {
    get_text(records, DESCRIPTION_KEYS)
}

pub fn get_title(records: &[MetadataRecord]) -> String {
    get_text(records, TITLE_KEYS)
}

pub fn get_creator(records: &[MetadataRecord]) -> String {
    get_text(records, CREATOR_KEYS)
}

pub fn get_keywords(records: &[MetadataRecord]) -> Vec<String> {
    match get_value(records, KEYWORD_KEYS) {
        Some(Value::Array(items)) => items.iter().map(value_to_text).collect(),
        Some(Value::String(text)) => text.split(',').map(|word| word.trim().to_string()).collect(),
        Some(other) => vec![value_to_text(other)],
        None => Vec::new(),
    }
}

pub fn get_preferred_weight(records: &[MetadataRecord]) -> Option<&Value> {
    get_value(records, WEIGHT_KEYS)
}
