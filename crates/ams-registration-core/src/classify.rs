//! Rule-based classifier for single OCR lines.
//!
//! Maps one raw line such as `모델명: 15U50R` to a category, the cleaned
//! field value, and a fixed heuristic confidence. Patterns are evaluated
//! in a fixed order and the first match wins:
//!
//! | # | Pattern | Confidence |
//! |---|---------|------------|
//! | 1 | `title: content` | 0.9 |
//! | 2 | `<title keyword> content` | 0.8 |
//! | 3 | parenthesized content | 0.7 |
//! | 4 | literal prefixes `상호명`, `기자재`, `제조자`, `정격` | 0.7 |
//! | 5 | whole-string category with prefix stripping | 0.6 |
//! | 6 | fallback, original text | 0.5 |
//!
//! Several patterns overlap on the same input, so the order is part of
//! the behavior and must not be rearranged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{Category, Extraction, JsonExtraction};

static COLON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):\s*(.+)$").expect("static regex"));

static SPACE_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(모델명|제조사|시리얼번호|시리얼|제조자|제조업체|상호명|기자재|명칭|제품명칭)\s+(.+)$")
        .expect("static regex")
});

static PAREN_CONTENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("static regex"));

static PAREN_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("static regex"));

static BRACKET_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("static regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Decorative prefixes removed from a value, applied in order.
static CONTENT_PREFIX_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^기자재의\s*",
        r"(?i)^제품의\s*",
        r"(?i)^상품의\s*",
        r"(?i)^장비의\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static MANUFACTURER_GLUED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^제조자\s+").expect("static regex"));

static COUNTRY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^제조국가\s*").expect("static regex"));

static EQUIPMENT_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^기자재의\s*").expect("static regex"));

static NAME_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"제품명칭|명칭").expect("static regex"));

static TITLE_PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:모델명|시리얼|제조사)\)").expect("static regex"));

static MODEL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:기자재의?|명칭|제품명칭|모델명?)").expect("static regex"));

static MANUFACTURER_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:상호명|제조업체명?|제조사|제조자)").expect("static regex"));

static SPEC_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:정격|전압|스펙)").expect("static regex"));

/// Parenthesized text containing any of these is a title, not a value.
const PAREN_TITLE_WORDS: [&str; 4] = ["모델명", "시리얼", "제조사", "스펙"];

const CONFIDENCE_COLON: f32 = 0.9;
const CONFIDENCE_SPACE: f32 = 0.8;
const CONFIDENCE_PAREN: f32 = 0.7;
const CONFIDENCE_PREFIX: f32 = 0.7;
const CONFIDENCE_STRIPPED: f32 = 0.6;
const CONFIDENCE_FALLBACK: f32 = 0.5;

/// Classifies one OCR line into `{category, value, confidence}`.
///
/// Empty (or whitespace-only) input yields `{other, "", 0}`.
pub fn extract_value_from_text(text: &str) -> Extraction {
    let text = text.trim();
    if text.is_empty() {
        return Extraction::new(Category::Other, "", 0.0);
    }

    if let Some(caps) = COLON_RE.captures(text) {
        let title = caps[1].trim();
        let content = caps[2].trim();
        return Extraction::new(
            category_from_title(title),
            clean_content(content),
            CONFIDENCE_COLON,
        );
    }

    if let Some(caps) = SPACE_TITLE_RE.captures(text) {
        let title = caps[1].trim();
        let content = caps[2].trim();
        return Extraction::new(
            category_from_title(title),
            clean_content(content),
            CONFIDENCE_SPACE,
        );
    }

    if let Some(caps) = PAREN_CONTENT_RE.captures(text) {
        let inner = &caps[1];
        if inner.chars().count() > 1 && !PAREN_TITLE_WORDS.iter().any(|w| inner.contains(w)) {
            return Extraction::new(category_from_text(text), inner.trim(), CONFIDENCE_PAREN);
        }
    }

    if let Some(extraction) = extract_by_prefix(text) {
        return extraction;
    }

    let category = category_from_text(text);
    if category != Category::Other {
        let stripped = strip_category_prefix(category, text);
        if !stripped.is_empty() && stripped != text {
            return Extraction::new(category, stripped, CONFIDENCE_STRIPPED);
        }
    }

    Extraction::new(category, text, CONFIDENCE_FALLBACK)
}

/// Classifies an untyped JSON value.
///
/// Strings go through [`extract_value_from_text`]; null and every other
/// JSON type pass through unchanged with `{other, 0}`.
pub fn extract_json(value: &Value) -> JsonExtraction {
    match value {
        Value::String(s) => extract_value_from_text(s).into(),
        other => JsonExtraction {
            category: Category::Other,
            value: other.clone(),
            confidence: 0.0,
        },
    }
}

/// Maps a title (the text before a colon or a title keyword) to a category.
pub fn category_from_title(title: &str) -> Category {
    let lower = title.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if has(&["모델", "model", "기자재", "명칭", "제품명칭"]) {
        Category::Model
    } else if has(&["제조", "manufacturer", "상호명", "제조업체", "제조자"]) {
        Category::Manufacturer
    } else if has(&["시리얼", "serial", "s/n", "sn"]) {
        Category::Serial
    } else if has(&["전압", "voltage", "정격", "스펙"]) {
        Category::Spec
    } else {
        Category::Other
    }
}

/// Whole-string keyword classification, used when no title is present.
pub fn category_from_text(text: &str) -> Category {
    let lower = text.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if has(&["모델", "model"]) {
        Category::Model
    } else if has(&["제조", "manufacturer"]) {
        Category::Manufacturer
    } else if has(&["시리얼", "serial"]) {
        Category::Serial
    } else if has(&["번호", "number"]) {
        Category::Number
    } else if has(&["전압", "voltage"]) {
        Category::Spec
    } else if has(&["컴퓨터", "노트북"]) {
        Category::Product
    } else {
        Category::Other
    }
}

/// Cleans the content half of a `title: content` line.
///
/// Drops `(...)` and `[...]` groups, then decorative leading words, then
/// collapses whitespace.
pub fn clean_content(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    let mut value = PAREN_GROUP_RE.replace_all(content, "").trim().to_string();
    value = BRACKET_GROUP_RE.replace_all(&value, "").trim().to_string();

    for re in CONTENT_PREFIX_RES.iter() {
        value = re.replace(&value, "").trim().to_string();
    }

    // `상호명` is only decoration when glued to the following word.
    if let Some(rest) = value.strip_prefix("상호명") {
        if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
            value = rest.trim().to_string();
        }
    }

    value = MANUFACTURER_GLUED_RE.replace(&value, "").trim().to_string();
    value = COUNTRY_PREFIX_RE.replace(&value, "").trim().to_string();

    collapse_whitespace(&value)
}

fn extract_by_prefix(text: &str) -> Option<Extraction> {
    if let Some(rest) = text.strip_prefix("상호명") {
        return Some(Extraction::new(
            Category::Manufacturer,
            collapse_whitespace(rest),
            CONFIDENCE_PREFIX,
        ));
    }

    if text.starts_with("기자재") {
        let value = EQUIPMENT_PREFIX_RE.replace(text, "");
        let value = NAME_TOKEN_RE.replace_all(&value, "");
        let value = TITLE_PAREN_RE.replace_all(&value, "");
        return Some(Extraction::new(
            Category::Model,
            collapse_whitespace(&value),
            CONFIDENCE_PREFIX,
        ));
    }

    if let Some(rest) = text.strip_prefix("제조자") {
        let value = rest.replace("제조국가", "");
        return Some(Extraction::new(
            Category::Manufacturer,
            collapse_whitespace(&value),
            CONFIDENCE_PREFIX,
        ));
    }

    if let Some(rest) = text.strip_prefix("정격") {
        return Some(Extraction::new(
            Category::Spec,
            collapse_whitespace(rest),
            CONFIDENCE_PREFIX,
        ));
    }

    None
}

fn strip_category_prefix(category: Category, text: &str) -> String {
    let re = match category {
        Category::Model => &*MODEL_PREFIX_RE,
        Category::Manufacturer => &*MANUFACTURER_PREFIX_RE,
        Category::Spec => &*SPEC_PREFIX_RE,
        _ => return collapse_whitespace(text),
    };
    collapse_whitespace(&re.replace(text, ""))
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_extract(input: &str, category: Category, value: &str, confidence: f32) {
        let e = extract_value_from_text(input);
        assert_eq!(e.category, category, "category for {:?}", input);
        assert_eq!(e.value, value, "value for {:?}", input);
        assert_eq!(e.confidence, confidence, "confidence for {:?}", input);
    }

    #[test]
    fn colon_pattern() {
        assert_extract("모델명: 15U50R", Category::Model, "15U50R", 0.9);
        assert_extract("제조사: 엘지", Category::Manufacturer, "엘지", 0.9);
        assert_extract("시리얼번호: PC123456", Category::Serial, "PC123456", 0.9);
        assert_extract("정격전압: 220V", Category::Spec, "220V", 0.9);
        assert_extract("S/N: ABC-123", Category::Serial, "ABC-123", 0.9);
    }

    #[test]
    fn colon_pattern_cleans_content() {
        assert_extract(
            "모델명: 기자재의 명칭제품명칭 (모델명)",
            Category::Model,
            "명칭제품명칭",
            0.9,
        );
        assert_extract(
            "제조사: 상호명제조업체명",
            Category::Manufacturer,
            "제조업체명",
            0.9,
        );
        assert_extract("제조사: 상호명 엘지", Category::Manufacturer, "상호명 엘지", 0.9);
        assert_extract("제조사: 제조자 엘지전자 [KR]", Category::Manufacturer, "엘지전자", 0.9);
    }

    #[test]
    fn space_separated_title() {
        assert_extract("모델명 ThinkPad X1", Category::Model, "ThinkPad X1", 0.8);
        assert_extract("시리얼 SN998877", Category::Serial, "SN998877", 0.8);
        assert_extract("상호명 엘지전자", Category::Manufacturer, "엘지전자", 0.8);
    }

    #[test]
    fn parenthesized_content() {
        assert_extract("노트북 컴퓨터(15U50R)", Category::Product, "15U50R", 0.7);
        assert_extract("모델 (LG gram)", Category::Model, "LG gram", 0.7);
    }

    #[test]
    fn parenthesized_title_words_are_skipped() {
        // `(시리얼)` names a title, so the paren pattern does not apply.
        let e = extract_value_from_text("번호 (시리얼)");
        assert_ne!(e.value, "시리얼");
    }

    #[test]
    fn prefix_literals() {
        assert_extract("상호명제조업체명", Category::Manufacturer, "제조업체명", 0.7);
        assert_extract("제조자제조국가", Category::Manufacturer, "", 0.7);
        assert_extract("정격전압", Category::Spec, "전압", 0.7);
    }

    #[test]
    fn equipment_name_line_strips_title_tokens() {
        let e = extract_value_from_text("기자재의 명칭제품명칭 (모델명)");
        assert_eq!(e.category, Category::Model);
        assert_eq!(e.confidence, 0.7);
        assert!(!e.value.contains("(모델명)"));
        assert!(!e.value.contains("명칭"));
        assert_eq!(e.value, "");
    }

    #[test]
    fn whole_string_category_with_prefix_strip() {
        assert_extract("모델 ABC", Category::Model, "ABC", 0.6);
        assert_extract("스펙전압 19V", Category::Spec, "전압 19V", 0.6);
    }

    #[test]
    fn fallback() {
        assert_extract("일반 텍스트", Category::Other, "일반 텍스트", 0.5);
        assert_extract("19 V = - = 3.42 A", Category::Other, "19 V = - = 3.42 A", 0.5);
        assert_extract("엘지전자(주)중국", Category::Other, "엘지전자(주)중국", 0.5);
        assert_extract("Model X1", Category::Model, "Model X1", 0.5);
    }

    #[test]
    fn empty_input() {
        assert_extract("", Category::Other, "", 0.0);
        assert_extract("   ", Category::Other, "", 0.0);
    }

    #[test]
    fn json_non_string_passes_through() {
        for input in [json!(null), json!(42), json!(true), json!({"a": 1}), json!([1, 2])] {
            let e = extract_json(&input);
            assert_eq!(e.category, Category::Other);
            assert_eq!(e.confidence, 0.0);
            assert_eq!(e.value, input);
        }

        let e = extract_json(&json!("모델명: 15U50R"));
        assert_eq!(e.category, Category::Model);
        assert_eq!(e.value, json!("15U50R"));
    }

    #[test]
    fn cleaned_values_are_stable() {
        let inputs = [
            "모델명: 15U50R",
            "제조사: 엘지",
            "모델명 ThinkPad X1",
            "모델명: 기자재의 명칭제품명칭 (모델명)",
            "제조사: 상호명제조업체명",
            "시리얼번호: PC123456",
            "정격전압: 220V",
            "정격전압",
            "모델 ABC",
            "일반 텍스트",
        ];
        for input in inputs {
            let once = extract_value_from_text(input).value;
            if once.is_empty() {
                continue;
            }
            let twice = extract_value_from_text(&once).value;
            assert_eq!(once, twice, "re-classifying {:?} changed its value", input);
        }
    }

    #[test]
    fn keyword_led_values_clean_further() {
        // A value that still opens with a category keyword is not a fixed
        // point: the prefix rules strip the keyword on the next pass.
        let once = extract_value_from_text("모델명: 모델 X1");
        assert_eq!(once.value, "모델 X1");
        let twice = extract_value_from_text(&once.value);
        assert_eq!(twice.category, Category::Model);
        assert_eq!(twice.value, "X1");
        assert_eq!(extract_value_from_text(&twice.value).value, "X1");
    }

    #[test]
    fn title_keyword_lookup() {
        assert_eq!(category_from_title("모델명"), Category::Model);
        assert_eq!(category_from_title("제조사"), Category::Manufacturer);
        assert_eq!(category_from_title("시리얼번호"), Category::Serial);
        assert_eq!(category_from_title("정격전압"), Category::Spec);
        assert_eq!(category_from_title("Voltage"), Category::Spec);
        assert_eq!(category_from_title("기타"), Category::Other);
    }

    #[test]
    fn whole_string_lookup() {
        assert_eq!(category_from_text("관리 번호"), Category::Number);
        assert_eq!(category_from_text("노트북"), Category::Product);
        assert_eq!(category_from_text("MODEL"), Category::Model);
        assert_eq!(category_from_text("hello"), Category::Other);
    }
}
