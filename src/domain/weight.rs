use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::MetadataRecord;
use crate::domain::fields::{get_description, get_preferred_weight};

pub const DEFAULT_WEIGHT: f64 = 1.0;
pub const METADATA_PROVENANCE: &str = "metadata";
pub const NO_MATCH_PROVENANCE: &str = "N/A";

/// Phrase that must not directly precede an antecedent match.
const NEGATIVE_PREFIX: &str = "do not use a ";

const NUMBER: &str = r"([0-9]+(?:\.[0-9]+)?)";

static COMMENT_MARKERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<--|-->").unwrap());
static TAG_SPANS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").unwrap());
static LINE_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n]+").unwrap());

static ANTECEDENT_WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:use it|(?:weight(?: value|)|apply|strength)s?\s*[:：]?\s*(?:around|of|from|is|is between|))\s*{}",
        range_pattern()
    ))
    .unwrap()
});

static SUBSEQUENT_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){}\s*weights?", range_pattern())).unwrap());

fn range_pattern() -> String {
    format!(r"{0}(?:\s*(?:-|~|to)\s*{0}?)?", NUMBER)
}

fn lora_tag_pattern(name: &str) -> Option<Regex> {
    let pattern = format!(
        r"(?i)(?:<|&lt;)lora:{}:{}(?:>|&gt;)",
        regex::escape(name),
        NUMBER
    );
    Regex::new(&pattern).ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Weight {
    pub value: f64,
    pub provenance: String,
}

impl Weight {
    pub fn new(value: f64, provenance: impl Into<String>) -> Self {
        Self {
            value,
            provenance: provenance.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::new(DEFAULT_WEIGHT, NO_MATCH_PROVENANCE)
    }

    /// `1.0` rather than `1`, so emitted tags read the same for every source.
    pub fn formatted_value(&self) -> String {
        format!("{:?}", self.value)
    }
}

/// Averages a matched `left[-right]` range.
///
/// A right bound written without a decimal point and larger than 4 is read
/// as the fractional digits of the left bound, so `1-8` means `1.0-1.8`.
/// A zero left bound is nonsensical and yields the default weight.
pub fn calc_weight(left: &str, right: Option<&str>) -> Option<f64> {
    let right = right.unwrap_or(left);
    let left_value: f64 = left.parse().ok()?;
    let mut right_value: f64 = right.parse().ok()?;

    if left_value == 0.0 {
        return Some(DEFAULT_WEIGHT);
    }
    if !right.contains('.') && right_value > 4.0 && left_value.fract() * 10.0 < right_value {
        right_value = format!("{}.{}", left_value.trunc(), right).parse().ok()?;
    }

    let mean = (left_value + right_value) / 2.0;
    Some((mean * 100.0).round_ties_even() / 100.0)
}

fn search_antecedent(text: &str) -> Option<regex::Captures<'_>> {
    let mut start = 0;
    while start <= text.len() {
        let captures = ANTECEDENT_WEIGHT.captures_at(text, start)?;
        let found = captures.get(0)?;
        if !preceded_by_negative(text, found.start()) {
            return Some(captures);
        }
        start = found.start()
            + text[found.start()..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    None
}

fn preceded_by_negative(text: &str, position: usize) -> bool {
    let Some(from) = position.checked_sub(NEGATIVE_PREFIX.len()) else {
        return false;
    };
    text.get(from..position)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(NEGATIVE_PREFIX))
}

fn weight_from_captures(captures: &regex::Captures<'_>) -> Option<Weight> {
    let left = captures.get(1)?.as_str();
    let right = captures.get(2).map(|m| m.as_str());
    let value = calc_weight(left, right)?;
    let provenance = LINE_BREAKS.replace_all(captures.get(0)?.as_str(), "");
    Some(Weight::new(value, provenance))
}

pub fn get_weight_from_description(name: &str, description: &str) -> Weight {
    let raw = COMMENT_MARKERS.replace_all(description, "");
    let cooked = TAG_SPANS.replace_all(&raw, " ");
    let texts: [&str; 2] = [&raw, &cooked];

    if let Some(tag) = lora_tag_pattern(name) {
        for text in texts {
            if let Some(weight) = tag.captures(text).as_ref().and_then(weight_from_captures) {
                return weight;
            }
        }
    }
    for text in texts {
        if let Some(weight) = search_antecedent(text).as_ref().and_then(weight_from_captures) {
            return weight;
        }
    }
    for text in texts {
        if let Some(weight) = SUBSEQUENT_WEIGHT
            .captures(text)
            .as_ref()
            .and_then(weight_from_captures)
        {
            return weight;
        }
    }
    Weight::fallback()
}

// Only the literal "0" means unset; "0.0" is an explicit weight.
fn weight_from_metadata(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) if text == "0" => None,
        Value::String(text) => match text.trim().parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("ignoring unparsable preferred weight [{text}]");
                None
            }
        },
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

pub fn get_weight(name: &str, records: &[MetadataRecord]) -> Weight {
    if let Some(value) = get_preferred_weight(records).and_then(weight_from_metadata) {
        debug!("{name}: preferred weight {value} from metadata");
        return Weight::new(value, METADATA_PROVENANCE);
    }
    get_weight_from_description(name, &get_description(records))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::MetadataSource;

    fn records(value: Value) -> Vec<MetadataRecord> {
        match value {
            Value::Object(fields) => vec![MetadataRecord::new(MetadataSource::CivitaiInfo, fields)],
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn integer_right_bound_is_read_as_decimal_continuation() {
        assert_eq!(calc_weight("1", Some("8")), Some(1.4));
        assert_eq!(calc_weight("0.6", Some("8")), Some(0.7));
    }

    #[test]
    fn single_value_averages_to_itself() {
        assert_eq!(calc_weight("0.6", None), Some(0.6));
        assert_eq!(calc_weight("0.7", Some("0.9")), Some(0.8));
        assert_eq!(calc_weight("1", Some("2")), Some(1.5));
    }

    #[test]
    fn zero_left_bound_is_guarded() {
        assert_eq!(calc_weight("0", None), Some(1.0));
        assert_eq!(calc_weight("0", Some("0.5")), Some(1.0));
    }

    #[test]
    fn lora_tag_in_description() {
        let weight = get_weight_from_description("MyLora", "Try <lora:MyLora:0.65> with care");
        assert_eq!(weight, Weight::new(0.65, "<lora:MyLora:0.65>"));

        let escaped = get_weight_from_description("My.Lora", "&lt;lora:my.lora:0.5&gt;");
        assert_eq!(escaped, Weight::new(0.5, "&lt;lora:my.lora:0.5&gt;"));
    }

    #[test]
    fn lora_tag_for_other_model_is_ignored() {
        let weight = get_weight_from_description("MyLora", "<lora:Other:0.3>");
        assert_eq!(weight, Weight::fallback());
    }

    #[test]
    fn antecedent_phrase_with_range() {
        let weight = get_weight_from_description("x", "Recommended weight: 0.7-0.9 for best results");
        assert_eq!(weight, Weight::new(0.8, "weight: 0.7-0.9"));
    }

    #[test]
    fn negative_phrase_is_skipped() {
        let weight = get_weight_from_description("x", "Do not use a weight of 1.5");
        assert_eq!(weight, Weight::fallback());

        let weight = get_weight_from_description("x", "do not use a weight of 1.5, 0.8 weight is best");
        assert_eq!(weight, Weight::new(0.8, "0.8 weight"));
    }

    #[test]
    fn subsequent_weight_phrase() {
        let weight = get_weight_from_description("x", "works well at 0.6 weight");
        assert_eq!(weight, Weight::new(0.6, "0.6 weight"));
    }

    #[test]
    fn tags_are_stripped_in_cooked_text() {
        let weight = get_weight_from_description("x", "<p>strength</p> <b>0.75</b>");
        assert_eq!(weight.value, 0.75);
    }

    #[test]
    fn provenance_has_no_line_breaks() {
        let weight = get_weight_from_description("x", "weight\n0.5");
        assert_eq!(weight, Weight::new(0.5, "weight0.5"));
    }

    #[test]
    fn preferred_weight_beats_description() {
        let records = records(json!({
            "preferred weight": "0.8",
            "description": "weight of 0.4"
        }));

        assert_eq!(get_weight("x", &records), Weight::new(0.8, METADATA_PROVENANCE));
    }

    #[test]
    fn zero_preferred_weight_falls_back_to_description() {
        let records = records(json!({
            "preferred weight": "0",
            "description": "weight of 0.4"
        }));

        assert_eq!(get_weight("x", &records), Weight::new(0.4, "weight of 0.4"));
    }

    #[test]
    fn decimal_zero_preferred_weight_is_kept() {
        let records = records(json!({
            "preferred weight": "0.0",
            "description": "weight of 0.6"
        }));

        assert_eq!(get_weight("x", &records), Weight::new(0.0, METADATA_PROVENANCE));
    }

    #[test]
    fn whole_number_weights_keep_a_decimal_point() {
        assert_eq!(Weight::fallback().formatted_value(), "1.0");
        assert_eq!(Weight::new(0.75, METADATA_PROVENANCE).formatted_value(), "0.75");
    }

    #[test]
    fn no_hint_anywhere_uses_default() {
        assert_eq!(get_weight("x", &records(json!({}))), Weight::fallback());
    }
}
