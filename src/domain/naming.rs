use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Base model or version tag.
const TAG: &str = r"(?:illustrious|pdxl|pony|ponyxl|sdxl|pxl|xl|is|il|p6|v?[0-9]+(?:\.[0-9]+)?[a-z]?|v[0-9]+[a-z]+[0-9]+)";

/// Tag at the end, after a delimiter or in parentheses.
static TAG_AT_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)[-_. ]{0}$|\({0}\)$", TAG)).unwrap());

/// Tag enclosed by the same delimiter on both sides.
static TAG_AT_MID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)-{0}[0-9]*-|_{0}[0-9]*_|\.{0}[0-9]*\.", TAG))
    .unwrap()
});

static LEADING_HYPHEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*-").unwrap());
static SPECIAL_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?:,\[\]{}#&*!|>]").unwrap());
static REPEATED_DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}|_{2,}| {2,}").unwrap());

fn first_char(captures: &Captures<'_>) -> String {
    captures[0].chars().next().map(String::from).unwrap_or_default()
}

fn normalize_once(name: &str) -> String {
    let mut result = name.to_string();

    while let Some(found) = TAG_AT_END.find(&result) {
        result.truncate(found.start());
    }

    loop {
        let collapsed = TAG_AT_MID.replace_all(&result, first_char).into_owned();
        if collapsed == result {
            break;
        }
        result = collapsed;
    }

    result = LEADING_HYPHEN.replace(&result, "").into_owned();
    result = SPECIAL_CHARS.replace_all(&result, "").into_owned();
    result = REPEATED_DELIMITERS.replace_all(&result, first_char).into_owned();
    result.trim().to_string()
}

/// Normalizes a file stem into a variant grouping key.
///
/// A single pass can expose a new trailing tag (removing `[` `]` turns
/// `Hero [Pony]` into `Hero Pony`), so passes repeat until stable.
pub fn normalize_name(stem: &str) -> String {
    let mut current = stem.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_stacked_suffixes() {
        assert_eq!(normalize_name("MyLora-pony-v2"), "MyLora");
        assert_eq!(normalize_name("Character_Name_IL_v1.0"), "Character_Name");
    }

    #[test]
    fn strips_parenthesized_suffix_and_leading_hyphen() {
        assert_eq!(normalize_name("-Cute Girl (Pony)"), "Cute Girl");
    }

    #[test]
    fn collapses_mid_string_tags() {
        assert_eq!(normalize_name("style-xl-v2-lora"), "style-lora");
    }

    #[test]
    fn removes_special_chars_and_repeated_delimiters() {
        assert_eq!(normalize_name("foo__bar"), "foo_bar");
        assert_eq!(normalize_name("Hero [Illustrious]!"), "Hero");
    }

    #[test]
    fn plain_names_are_untouched() {
        assert_eq!(normalize_name("Hero"), "Hero");
        assert_eq!(normalize_name("Solo"), "Solo");
    }

    #[test]
    fn normalization_is_idempotent() {
        for stem in [
            "MyLora-pony-v2",
            "Character_Name_IL_v1.0",
            "-Cute Girl (Pony)",
            "style-xl-v2-lora",
            "Hero [Illustrious]!",
            "a__b--c  d",
        ] {
            let once = normalize_name(stem);
            assert_eq!(normalize_name(&once), once, "stem {stem}");
        }
    }
}
