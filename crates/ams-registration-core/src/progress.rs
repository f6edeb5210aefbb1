//! Job progress event model.
//!
//! One [`ProgressEvent`] is one JSON object on the progress channel:
//!
//! ```json
//! { "stage": "ocr_detection", "message": "detecting text", "progress": 30 }
//! ```
//!
//! Stage names are compared case-insensitively; `OCR_DONE` and
//! `ocr_done` parse to the same [`Stage`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// A stage tag carried on a progress event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stage {
    Connected,
    SegmentStart,
    SegmentDone,
    OcrStart,
    OcrPreprocessing,
    OcrDetection,
    OcrRecognition,
    OcrPostprocessing,
    OcrDone,
    RegisterStart,
    RegisterDone,
    Error,
    /// Any stage the client does not know, lowercased.
    Other(String),
}

impl Stage {
    pub fn parse(raw: &str) -> Stage {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.as_str() {
            "connected" => Stage::Connected,
            "segment_start" => Stage::SegmentStart,
            "segment_done" => Stage::SegmentDone,
            "ocr_start" => Stage::OcrStart,
            "ocr_preprocessing" => Stage::OcrPreprocessing,
            "ocr_detection" => Stage::OcrDetection,
            "ocr_recognition" => Stage::OcrRecognition,
            "ocr_postprocessing" => Stage::OcrPostprocessing,
            "ocr_done" => Stage::OcrDone,
            "register_start" => Stage::RegisterStart,
            "register_done" => Stage::RegisterDone,
            "error" => Stage::Error,
            _ => Stage::Other(lower),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Stage::Connected => "connected",
            Stage::SegmentStart => "segment_start",
            Stage::SegmentDone => "segment_done",
            Stage::OcrStart => "ocr_start",
            Stage::OcrPreprocessing => "ocr_preprocessing",
            Stage::OcrDetection => "ocr_detection",
            Stage::OcrRecognition => "ocr_recognition",
            Stage::OcrPostprocessing => "ocr_postprocessing",
            Stage::OcrDone => "ocr_done",
            Stage::RegisterStart => "register_start",
            Stage::RegisterDone => "register_done",
            Stage::Error => "error",
            Stage::Other(s) => s,
        }
    }

    /// Any stage whose name ends in `_done`, including unknown ones.
    pub fn is_done(&self) -> bool {
        self.as_str().ends_with("_done")
    }

    pub fn is_error(&self) -> bool {
        *self == Stage::Error
    }

    pub fn is_terminal(&self) -> bool {
        self.is_done() || self.is_error()
    }

    /// Maps an OCR engine substage to the stage and progress it reports.
    ///
    /// `completed` yields `None`: the job emits `ocr_done` itself.
    /// Unknown substages become `ocr_<name>` with no progress value.
    pub fn ocr_substage(name: &str) -> Option<(Stage, Option<u8>)> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "completed" => None,
            "preprocessing" => Some((Stage::OcrPreprocessing, Some(10))),
            "detection" => Some((Stage::OcrDetection, Some(30))),
            "recognition" => Some((Stage::OcrRecognition, Some(60))),
            "postprocessing" => Some((Stage::OcrPostprocessing, Some(90))),
            other => Some((Stage::parse(&format!("ocr_{other}")), None)),
        }
    }
}

impl From<String> for Stage {
    fn from(s: String) -> Self {
        Stage::parse(&s)
    }
}

impl From<Stage> for String {
    fn from(s: Stage) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The three asynchronous stages that run as jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Segment,
    Ocr,
    Register,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Segment => "segment",
            StageKind::Ocr => "ocr",
            StageKind::Register => "register",
        }
    }

    /// Path segment of the stage-start endpoint.
    pub fn path(&self) -> &'static str {
        self.as_str()
    }

    pub fn start_stage(&self) -> Stage {
        match self {
            StageKind::Segment => Stage::SegmentStart,
            StageKind::Ocr => Stage::OcrStart,
            StageKind::Register => Stage::RegisterStart,
        }
    }

    pub fn done_stage(&self) -> Stage {
        match self {
            StageKind::Segment => Stage::SegmentDone,
            StageKind::Ocr => Stage::OcrDone,
            StageKind::Register => Stage::RegisterDone,
        }
    }

    /// Result substituted when a `*_done` event arrives without one.
    pub fn empty_result(&self) -> Value {
        match self {
            StageKind::Segment => json!({ "segments": {}, "image_path": null }),
            StageKind::Ocr => json!({ "results": {}, "confidence": {} }),
            StageKind::Register => json!({}),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segment" | "segmentation" => Ok(StageKind::Segment),
            "ocr" => Ok(StageKind::Ocr),
            "register" | "registration" => Ok(StageKind::Register),
            other => Err(format!(
                "unknown stage kind '{other}' (expected segment, ocr, or register)"
            )),
        }
    }
}

/// One event on a job's progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_progress"
    )]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ProgressEvent {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: None,
            result: None,
            job_id: None,
            status: None,
            timestamp: None,
        }
    }

    /// The handshake event sent once a subscriber is attached.
    pub fn connected(job_id: impl Into<String>) -> Self {
        let mut event = Self::stage(Stage::Connected, "connected");
        event.job_id = Some(job_id.into());
        event.status = Some("connected".to_string());
        event
    }

    pub fn progress(stage: Stage, message: impl Into<String>, progress: u8) -> Self {
        let mut event = Self::stage(stage, message);
        event.progress = Some(progress.min(100));
        event
    }

    pub fn done(kind: StageKind, message: impl Into<String>, result: Value) -> Self {
        let mut event = Self::stage(kind.done_stage(), message);
        event.progress = Some(100);
        event.result = Some(result);
        event
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::stage(Stage::Error, message)
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({ "stage": self.stage.as_str(), "message": self.message }).to_string()
        })
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Any JSON number, clamped to 0..=100 and rounded. Anything else is
/// dropped.
fn lenient_progress<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0).round() as u8))
}
