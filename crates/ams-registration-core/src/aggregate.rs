//! OCR result aggregation: one best value per asset field.
//!
//! Takes the full `{results, confidence}` payload of an OCR job and picks
//! at most one line per category in [`Category::FIELDS`]:
//!
//! 1. Lines are sorted by visual order (`full_text` = 1, `text_<n>` = n);
//!    `combined_text` is never a line.
//! 2. Strict actual-value detectors run first, category by category, over
//!    the sorted lines. A line that matches is consumed for the later
//!    detectors only.
//! 3. Every category still empty is filled from the classifier
//!    ([`extract_value_from_text`]) over all lines, including detector
//!    lines, skipping lines that are nothing but title vocabulary.
//! 4. Filled fields are returned in line order.
//!
//! The detectors hardcode a short brand list and a handful of shapes
//! (model codes, serial runs, `V/A/W/Hz` units). They will misjudge
//! unseen vendors; that is accepted.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::classify::extract_value_from_text;
use crate::models::{AggregatedField, Category, FieldSource, OcrLine, OcrPayload};

/// Words that only ever appear as field titles on asset labels.
static TITLE_TOKENS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut tokens = vec![
        "기자재의",
        "기자재",
        "제품명칭",
        "명칭",
        "제품의",
        "모델명",
        "모델",
        "상호명",
        "제조업체명",
        "제조업체",
        "제조국가",
        "제조자",
        "제조사",
        "시리얼번호",
        "시리얼",
        "정격전압",
        "정격",
        "전압",
        "스펙",
        "model",
        "manufacturer",
        "serial",
        "voltage",
        "s/n",
    ];
    tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
    tokens
});

static MODEL_WITH_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[가-힣\s]*[가-힣]\s*\(([A-Z0-9][A-Z0-9\-]{2,})\)").expect("static regex")
});

static CODE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]+(?:-[A-Z0-9]+)*$").expect("static regex"));

static BRAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:LG|엘지|삼성|SAMSUNG|애플|APPLE|델|DELL|레노버|LENOVO|HP|ASUS|MSI)(전자|일렉트로닉스|\s+electronics)?(\s*\(주\))?",
    )
    .expect("static regex")
});

static KOREAN_COMPANY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[가-힣]{1,10}(?:전자|일렉트로닉스)(?:\s*\(주\))?").expect("static regex")
});

static KOREAN_CORP_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(주\)\s*[가-힣A-Za-z]+").expect("static regex"));

static LATIN_COMPANY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z][A-Za-z&.\-]*(?:\s+[A-Za-z][A-Za-z&.\-]*)*?\s+(?i:inc|corp|corporation|ltd|co)\.?)(?:$|[\s,/])",
    )
    .expect("static regex")
});

static SERIAL_ALPHA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,3}[0-9]{4,8}$").expect("static regex"));

static SERIAL_DIGITS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{8,12}$").expect("static regex"));

static SERIAL_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{10,20}$").expect("static regex"));

static SPEC_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)?(?:\s*[-~]\s*\d+(?:\.\d+)?)?\s*(?:V|A|W|Hz|GB|TB|MB)")
        .expect("static regex")
});

/// Resolves the OCR payload into at most one field per category.
pub fn analyze_ocr_results(payload: &OcrPayload) -> Vec<AggregatedField> {
    let lines = payload.lines();
    let titles: HashSet<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_category_title(&l.text))
        .map(|(i, _)| i)
        .collect();

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut filled: HashMap<Category, AggregatedField> = HashMap::new();

    for category in Category::FIELDS {
        let hit = lines.iter().enumerate().find_map(|(i, line)| {
            if titles.contains(&i) || consumed.contains(&i) {
                return None;
            }
            detect_actual_value(category, &line.text).map(|value| (i, value))
        });
        if let Some((i, value)) = hit {
            consumed.insert(i);
            filled.insert(
                category,
                make_field(&lines[i], category, value, FieldSource::ActualValue),
            );
        }
    }

    for (i, line) in lines.iter().enumerate() {
        if filled.len() == Category::FIELDS.len() {
            break;
        }
        // Lines taken by a detector stay eligible for other categories.
        if titles.contains(&i) {
            continue;
        }
        let extraction = extract_value_from_text(&line.text);
        let category = extraction.category;
        if !category.is_field() || filled.contains_key(&category) {
            continue;
        }
        if extraction.value.is_empty() || is_category_title(&extraction.value) {
            continue;
        }
        filled.insert(
            category,
            make_field(line, category, extraction.value, FieldSource::Extracted),
        );
    }

    let mut fields: Vec<AggregatedField> = filled.into_values().collect();
    fields.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.category.priority().cmp(&b.category.priority()))
    });
    fields
}

/// Whether a line is nothing but field-title vocabulary, e.g. `정격전압`,
/// `상호명제조업체명`, or `기자재의 명칭제품명칭 (모델명)`.
pub fn is_category_title(text: &str) -> bool {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ':' | '(' | ')' | '[' | ']'))
        .collect();
    if normalized.is_empty() {
        return false;
    }

    let mut rest = normalized.as_str();
    while !rest.is_empty() {
        match TITLE_TOKENS.iter().find(|t| rest.starts_with(**t)) {
            Some(token) => rest = &rest[token.len()..],
            None => return false,
        }
    }
    true
}

/// Strict check that a line holds an actual value of `category`, as
/// opposed to a title or free text. Returns the value to use.
pub fn detect_actual_value(category: Category, text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match category {
        Category::Model => detect_model(text),
        Category::Manufacturer => detect_manufacturer(text),
        Category::Serial => is_serial_shape(text).then(|| text.to_string()),
        Category::Spec => detect_spec(text),
        _ => None,
    }
}

fn detect_model(text: &str) -> Option<String> {
    if let Some(caps) = MODEL_WITH_CODE_RE.captures(text) {
        let code = &caps[1];
        if code.chars().any(|c| c.is_ascii_digit()) {
            return Some(code.to_string());
        }
    }

    let len = text.chars().count();
    if (4..=20).contains(&len)
        && CODE_TOKEN_RE.is_match(text)
        && has_letter_and_digit(text)
        && !is_serial_shape(text)
        && detect_spec(text).is_none()
    {
        return Some(text.to_string());
    }
    None
}

fn detect_manufacturer(text: &str) -> Option<String> {
    if let Some(caps) = BRAND_RE.captures(text) {
        let whole = caps.get(0)?;
        let has_suffix = caps.get(1).is_some() || caps.get(2).is_some();
        let next = text[whole.end()..].chars().next();
        if has_suffix || next.map_or(true, |c| !c.is_alphanumeric()) {
            return Some(whole.as_str().trim().to_string());
        }
    }

    if let Some(m) = KOREAN_COMPANY_RE.find(text) {
        return Some(m.as_str().trim().to_string());
    }

    if let Some(m) = KOREAN_CORP_PREFIX_RE.find(text) {
        return Some(m.as_str().trim().to_string());
    }

    LATIN_COMPANY_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

fn is_serial_shape(text: &str) -> bool {
    SERIAL_ALPHA_RE.is_match(text)
        || SERIAL_DIGITS_RE.is_match(text)
        || (SERIAL_RUN_RE.is_match(text) && has_letter_and_digit(text))
}

/// Collects `<number><unit>` readings, e.g. `19 V = - = 3.42 A` gives
/// `19V, 3.42A`.
fn detect_spec(text: &str) -> Option<String> {
    let readings: Vec<String> = SPEC_UNIT_RE
        .find_iter(text)
        .filter(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '.')
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        })
        .map(|m| m.as_str().split_whitespace().collect::<String>())
        .collect();

    if readings.is_empty() {
        None
    } else {
        Some(readings.join(", "))
    }
}

fn has_letter_and_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic()) && text.chars().any(|c| c.is_ascii_digit())
}

fn make_field(line: &OcrLine, category: Category, text: String, source: FieldSource) -> AggregatedField {
    AggregatedField {
        id: line.key.clone(),
        original_key: line.key.clone(),
        text,
        original_text: line.text.clone(),
        confidence: line.confidence,
        category,
        order: line.order,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> OcrPayload {
        OcrPayload::from_value(Some(&value))
    }

    fn field<'a>(fields: &'a [AggregatedField], category: Category) -> Option<&'a AggregatedField> {
        fields.iter().find(|f| f.category == category)
    }

    #[test]
    fn title_lines() {
        assert!(is_category_title("정격전압"));
        assert!(is_category_title("상호명제조업체명"));
        assert!(is_category_title("제조자제조국가"));
        assert!(is_category_title("기자재의 명칭제품명칭 (모델명)"));
        assert!(is_category_title("모델명:"));
        assert!(!is_category_title("15U50R"));
        assert!(!is_category_title("엘지전자(주)중국"));
        assert!(!is_category_title(""));
    }

    #[test]
    fn model_detector() {
        assert_eq!(
            detect_actual_value(Category::Model, "노트북 컴퓨터(15U50R)").as_deref(),
            Some("15U50R")
        );
        assert_eq!(
            detect_actual_value(Category::Model, "15Z90N-VR5BK").as_deref(),
            Some("15Z90N-VR5BK")
        );
        assert_eq!(detect_actual_value(Category::Model, "220V"), None);
        assert_eq!(detect_actual_value(Category::Model, "PC123456"), None);
        assert_eq!(detect_actual_value(Category::Model, "모델명: 15U50R"), None);
    }

    #[test]
    fn manufacturer_detector() {
        assert_eq!(
            detect_actual_value(
                Category::Manufacturer,
                "엘지전자(주)/Tech-Front (Chongqing) Computer Co."
            )
            .as_deref(),
            Some("엘지전자(주)")
        );
        assert_eq!(
            detect_actual_value(Category::Manufacturer, "삼성전자").as_deref(),
            Some("삼성전자")
        );
        assert_eq!(
            detect_actual_value(Category::Manufacturer, "LG Electronics Inc.").as_deref(),
            Some("LG Electronics")
        );
        assert_eq!(
            detect_actual_value(Category::Manufacturer, "Acme Corp").as_deref(),
            Some("Acme Corp")
        );
        assert_eq!(detect_actual_value(Category::Manufacturer, "HPE1234"), None);
        assert_eq!(detect_actual_value(Category::Manufacturer, "제조사: 엘지"), None);
    }

    #[test]
    fn serial_and_spec_detectors() {
        assert!(detect_actual_value(Category::Serial, "PC123456").is_some());
        assert!(detect_actual_value(Category::Serial, "308NDJF0K123").is_some());
        assert!(detect_actual_value(Category::Serial, "12345678").is_some());
        assert!(detect_actual_value(Category::Serial, "15U50R").is_none());

        assert_eq!(
            detect_actual_value(Category::Spec, "19 V = - = 3.42 A").as_deref(),
            Some("19V, 3.42A")
        );
        assert_eq!(
            detect_actual_value(Category::Spec, "100-240V~ 50/60Hz").as_deref(),
            Some("100-240V, 60Hz")
        );
        assert_eq!(detect_actual_value(Category::Spec, "15U50R"), None);
    }

    #[test]
    fn label_photo_resolves_all_fields() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": {
                "text_1": "기자재의 명칭제품명칭 (모델명)",
                "text_2": "노트북 컴퓨터(15U50R)",
                "text_3": "상호명제조업체명",
                "text_4": "엘지전자(주)/Tech-Front (Chongqing) Computer Co.",
                "text_5": "제조자제조국가",
                "text_6": "엘지전자(주)중국",
                "text_7": "정격전압",
                "text_8": "19 V = - = 3.42 A",
                "text_9": "시리얼번호: 308NDJF0K123",
                "combined_text": "everything joined"
            },
            "confidence": {
                "text_2": 0.91,
                "text_4": 0.77,
                "text_8": 0.65,
                "text_9": 0.88
            }
        })));

        let categories: Vec<Category> = fields.iter().map(|f| f.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Model,
                Category::Manufacturer,
                Category::Spec,
                Category::Serial
            ]
        );

        let model = field(&fields, Category::Model).unwrap();
        assert_eq!(model.text, "15U50R");
        assert_eq!(model.original_key, "text_2");
        assert_eq!(model.confidence, 0.91);
        assert_eq!(model.source, FieldSource::ActualValue);

        let maker = field(&fields, Category::Manufacturer).unwrap();
        assert_eq!(maker.text, "엘지전자(주)");
        assert_eq!(maker.order, 4);

        let spec = field(&fields, Category::Spec).unwrap();
        assert_eq!(spec.text, "19V, 3.42A");

        let serial = field(&fields, Category::Serial).unwrap();
        assert_eq!(serial.text, "308NDJF0K123");
        assert_eq!(serial.source, FieldSource::Extracted);
        assert_eq!(serial.original_text, "시리얼번호: 308NDJF0K123");
    }

    #[test]
    fn labeled_lines_fall_back_to_classifier() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": {
                "text_1": "모델명: 15U50R",
                "text_2": "제조사: 엘지",
                "text_3": "S/N: PC123456"
            },
            "confidence": { "text_1": 0.9, "text_2": 0.8, "text_3": 0.7 }
        })));

        assert_eq!(fields.len(), 3);
        assert_eq!(field(&fields, Category::Model).unwrap().text, "15U50R");
        assert_eq!(field(&fields, Category::Manufacturer).unwrap().text, "엘지");
        assert_eq!(field(&fields, Category::Serial).unwrap().text, "PC123456");
        assert!(fields.iter().all(|f| f.source == FieldSource::Extracted));
    }

    #[test]
    fn first_line_wins_per_category() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": {
                "text_1": "모델명: FIRST1",
                "text_2": "모델명: SECOND2"
            },
            "confidence": {}
        })));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].text, "FIRST1");
        assert_eq!(fields[0].confidence, 0.0);
    }

    #[test]
    fn combined_text_never_supplies_a_field() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": { "combined_text": "모델명: ZZ999" },
            "confidence": { "combined_text": 0.99 }
        })));
        assert!(fields.is_empty());
    }

    #[test]
    fn single_full_text_line() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": { "full_text": "모델명: 15U50R" },
            "confidence": { "full_text": 0.5 }
        })));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].original_key, "full_text");
        assert_eq!(fields[0].order, 1);
    }

    #[test]
    fn title_values_are_rejected() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": { "text_1": "모델명: 모델명", "text_2": "정격전압" },
            "confidence": {}
        })));
        assert!(fields.is_empty());
    }

    #[test]
    fn at_most_one_field_per_category() {
        let fields = analyze_ocr_results(&payload(json!({
            "results": {
                "text_1": "15U50R",
                "text_2": "15Z90N",
                "text_3": "삼성전자",
                "text_4": "엘지전자",
                "text_5": "220V",
                "text_6": "19V",
                "text_7": "PC123456",
                "text_8": "AB987654"
            },
            "confidence": {}
        })));
        let mut seen = HashSet::new();
        for f in &fields {
            assert!(seen.insert(f.category), "duplicate {:?}", f.category);
        }
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn unit_glued_to_a_code_is_not_a_spec() {
        assert_eq!(detect_actual_value(Category::Spec, "NT930QCG-K716A"), None);
        assert_eq!(
            detect_actual_value(Category::Spec, "입력 19V 3.42A").as_deref(),
            Some("19V, 3.42A")
        );

        let fields = analyze_ocr_results(&payload(json!({
            "results": {
                "text_1": "모델명: NT930QCG-K716A",
                "text_2": "시리얼번호: 2104NZ0001A"
            },
            "confidence": { "text_1": 0.9, "text_2": 0.8 }
        })));
        assert!(field(&fields, Category::Spec).is_none());
        assert_eq!(field(&fields, Category::Model).unwrap().text, "NT930QCG-K716A");
        assert_eq!(field(&fields, Category::Serial).unwrap().text, "2104NZ0001A");
    }

    #[test]
    fn detector_line_still_feeds_other_categories() {
        // The detector takes the spec reading; the title still names the model.
        let fields = analyze_ocr_results(&payload(json!({
            "results": { "text_1": "모델명: X 220V" },
            "confidence": { "text_1": 0.6 }
        })));
        let spec = field(&fields, Category::Spec).unwrap();
        assert_eq!(spec.text, "220V");
        assert_eq!(spec.source, FieldSource::ActualValue);
        let model = field(&fields, Category::Model).unwrap();
        assert_eq!(model.text, "X 220V");
        assert_eq!(model.source, FieldSource::Extracted);
        assert_eq!(model.original_key, spec.original_key);
    }

    #[test]
    fn empty_payload() {
        assert!(analyze_ocr_results(&OcrPayload::empty()).is_empty());
    }
}
