//! Core data models for the OCR-assisted registration workflow.
//!
//! These types describe the raw OCR payload carried on the `ocr_done`
//! event, the per-line classification result, and the aggregated
//! per-category fields that pre-fill the registration form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Key of the whole-image line produced when OCR finds exactly one region.
pub const FULL_TEXT_KEY: &str = "full_text";

/// Key of the space-joined text of all regions. Never treated as a line.
pub const COMBINED_TEXT_KEY: &str = "combined_text";

/// Prefix of the numbered per-region keys (`text_1`, `text_2`, ...).
pub const TEXT_KEY_PREFIX: &str = "text_";

/// Classification category of a single OCR line.
///
/// `Number` and `Product` are only produced by whole-string
/// classification; the aggregator fills `model`, `manufacturer`,
/// `serial`, and `spec` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Model,
    Manufacturer,
    Serial,
    Spec,
    Number,
    Product,
    Other,
}

impl Category {
    /// The aggregated categories, in fill priority order.
    pub const FIELDS: [Category; 4] = [
        Category::Model,
        Category::Manufacturer,
        Category::Serial,
        Category::Spec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Model => "model",
            Category::Manufacturer => "manufacturer",
            Category::Serial => "serial",
            Category::Spec => "spec",
            Category::Number => "number",
            Category::Product => "product",
            Category::Other => "other",
        }
    }

    /// Whether the aggregator produces a field for this category.
    pub fn is_field(&self) -> bool {
        Self::FIELDS.contains(self)
    }

    /// Position in [`Category::FIELDS`], used as a sort tie-breaker.
    pub fn priority(&self) -> usize {
        Self::FIELDS
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::FIELDS.len())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one raw OCR line.
///
/// `confidence` is the fixed heuristic score of the matching pattern
/// (0.9 down to 0.5), not the OCR engine's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub category: Category,
    pub value: String,
    pub confidence: f32,
}

impl Extraction {
    pub fn new(category: Category, value: impl Into<String>, confidence: f32) -> Self {
        Self {
            category,
            value: value.into(),
            confidence,
        }
    }
}

/// Classification of an untyped JSON input.
///
/// Null and non-string inputs pass through unchanged as `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExtraction {
    pub category: Category,
    pub value: Value,
    pub confidence: f32,
}

impl From<Extraction> for JsonExtraction {
    fn from(e: Extraction) -> Self {
        Self {
            category: e.category,
            value: Value::String(e.value),
            confidence: e.confidence,
        }
    }
}

/// Where an aggregated field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Matched by a strict actual-value detector.
    ActualValue,
    /// Produced by the text extraction classifier.
    Extracted,
}

/// One recognized OCR line, keyed as in the OCR payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub key: String,
    pub text: String,
    /// OCR engine confidence in [0, 1]; 0 when absent from the payload.
    pub confidence: f64,
    pub order: usize,
}

/// Highest order a numbered key can take; leaves room for unnumbered keys
/// to sort after it.
pub const MAX_LINE_ORDER: usize = usize::MAX / 2;

/// Sort position of a known line key: `full_text` is the first visual
/// line, `text_<n>` sorts as `n` (capped at [`MAX_LINE_ORDER`]).
pub fn line_order(key: &str) -> Option<usize> {
    if key == FULL_TEXT_KEY {
        return Some(1);
    }
    key.strip_prefix(TEXT_KEY_PREFIX)
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(MAX_LINE_ORDER))
}

/// OCR terminal result: `{ "results": {...}, "confidence": {...} }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPayload {
    #[serde(default)]
    pub results: BTreeMap<String, String>,
    #[serde(default)]
    pub confidence: BTreeMap<String, f64>,
}

impl OcrPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Leniently reads a payload from an event `result`.
    ///
    /// A missing or non-object value yields an empty payload. Non-string
    /// result entries are stringified, nulls dropped, and non-numeric
    /// confidences ignored.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(obj)) = value else {
            return Self::empty();
        };

        let results = obj
            .get("results")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) => Some((k.clone(), s.clone())),
                        Value::Null => None,
                        other => Some((k.clone(), other.to_string())),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let confidence = obj
            .get("confidence")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_f64().map(|c| (k.clone(), c)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            results,
            confidence,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// All extractable lines sorted by visual order.
    ///
    /// `combined_text` is excluded. Keys that are neither `full_text` nor
    /// `text_<n>` are placed after every numbered line, in key order.
    pub fn lines(&self) -> Vec<OcrLine> {
        let mut known = Vec::new();
        let mut unknown = Vec::new();

        for (key, text) in &self.results {
            if key == COMBINED_TEXT_KEY {
                continue;
            }
            let confidence = self.confidence.get(key).copied().unwrap_or(0.0);
            match line_order(key) {
                Some(order) => known.push(OcrLine {
                    key: key.clone(),
                    text: text.clone(),
                    confidence,
                    order,
                }),
                None => unknown.push((key.clone(), text.clone(), confidence)),
            }
        }

        let next = known
            .iter()
            .map(|l| l.order)
            .max()
            .unwrap_or(0)
            .saturating_add(1);
        known.extend(
            unknown
                .into_iter()
                .enumerate()
                .map(|(i, (key, text, confidence))| OcrLine {
                    key,
                    text,
                    confidence,
                    order: next.saturating_add(i),
                }),
        );

        known.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.key.cmp(&b.key)));
        known
    }
}

/// The single chosen value for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedField {
    pub id: String,
    pub original_key: String,
    pub text: String,
    pub original_text: String,
    /// OCR engine confidence of the supplying line.
    pub confidence: f64,
    pub category: Category,
    pub order: usize,
    pub source: FieldSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_order_known_keys() {
        assert_eq!(line_order("full_text"), Some(1));
        assert_eq!(line_order("text_1"), Some(1));
        assert_eq!(line_order("text_12"), Some(12));
        assert_eq!(line_order("text_0"), None);
        assert_eq!(line_order("text_x"), None);
        assert_eq!(line_order("combined_text"), None);
    }

    #[test]
    fn huge_line_numbers_are_capped() {
        assert_eq!(
            line_order("text_18446744073709551615"),
            Some(MAX_LINE_ORDER)
        );
        assert_eq!(line_order("text_99999999999999999999999"), None);

        let payload = OcrPayload::from_value(Some(&json!({
            "results": {
                "text_18446744073709551615": "모델명: X1",
                "weird": "y",
                "text_3": "three"
            },
            "confidence": {}
        })));
        let lines = payload.lines();
        let keys: Vec<&str> = lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["text_3", "text_18446744073709551615", "weird"]);
        assert_eq!(lines[2].order, MAX_LINE_ORDER + 1);
    }

    #[test]
    fn lines_skip_combined_text_and_sort_numerically() {
        let payload = OcrPayload::from_value(Some(&json!({
            "results": {
                "text_10": "ten",
                "text_2": "two",
                "text_1": "one",
                "combined_text": "one two ten"
            },
            "confidence": { "text_1": 0.8, "text_2": 0.5 }
        })));

        let lines = payload.lines();
        let keys: Vec<&str> = lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["text_1", "text_2", "text_10"]);
        assert_eq!(lines[0].confidence, 0.8);
        assert_eq!(lines[2].confidence, 0.0);
    }

    #[test]
    fn unknown_keys_sort_after_numbered_lines() {
        let payload = OcrPayload::from_value(Some(&json!({
            "results": { "model_name": "X", "text_3": "c", "serial": "Y" },
            "confidence": {}
        })));
        let lines = payload.lines();
        let keys: Vec<&str> = lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["text_3", "model_name", "serial"]);
        assert_eq!(lines[1].order, 4);
        assert_eq!(lines[2].order, 5);
    }

    #[test]
    fn from_value_tolerates_missing_and_malformed() {
        assert!(OcrPayload::from_value(None).is_empty());
        assert!(OcrPayload::from_value(Some(&json!("nope"))).is_empty());

        let payload = OcrPayload::from_value(Some(&json!({
            "results": { "text_1": 42, "text_2": null },
            "confidence": { "text_1": "high" }
        })));
        assert_eq!(payload.results.get("text_1").map(String::as_str), Some("42"));
        assert!(!payload.results.contains_key("text_2"));
        assert!(payload.confidence.is_empty());
    }

    #[test]
    fn aggregated_field_serializes_camel_case() {
        let field = AggregatedField {
            id: "text_1".into(),
            original_key: "text_1".into(),
            text: "15U50R".into(),
            original_text: "모델명: 15U50R".into(),
            confidence: 0.9,
            category: Category::Model,
            order: 1,
            source: FieldSource::Extracted,
        };
        let v = serde_json::to_value(&field).unwrap();
        assert_eq!(v["originalKey"], "text_1");
        assert_eq!(v["originalText"], "모델명: 15U50R");
        assert_eq!(v["category"], "model");
        assert_eq!(v["source"], "extracted");
    }
}
