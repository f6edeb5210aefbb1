//! Registration workflow controller.
//!
//! An explicit state machine for one asset registration:
//!
//! ```text
//! Upload ─▶ Segment ─▶ Ocr ─▶ Review ─▶ ChatbotAssist ─▶ Register ─▶ Label ─▶ Complete
//! ```
//!
//! `Segment`, `Ocr` and `Register` each run as a job. The controller
//! tracks at most one active job; starting a new one hands back the
//! previous job so the caller can close its channel. A `*_done` event for
//! the active job advances the step, an `error` event records the
//! message and leaves the step in place so the user can re-trigger it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::aggregate::analyze_ocr_results;
use crate::models::{AggregatedField, Category, OcrPayload};
use crate::progress::{ProgressEvent, StageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Upload,
    Segment,
    Ocr,
    Review,
    ChatbotAssist,
    Register,
    Label,
    Complete,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 8] = [
        WorkflowStep::Upload,
        WorkflowStep::Segment,
        WorkflowStep::Ocr,
        WorkflowStep::Review,
        WorkflowStep::ChatbotAssist,
        WorkflowStep::Register,
        WorkflowStep::Label,
        WorkflowStep::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::Upload => "upload",
            WorkflowStep::Segment => "segment",
            WorkflowStep::Ocr => "ocr",
            WorkflowStep::Review => "review",
            WorkflowStep::ChatbotAssist => "chatbot_assist",
            WorkflowStep::Register => "register",
            WorkflowStep::Label => "label",
            WorkflowStep::Complete => "complete",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WorkflowStep::Upload => "Upload a photo of the asset label",
            WorkflowStep::Segment => "Locate label fields in the image",
            WorkflowStep::Ocr => "Recognize text in each field",
            WorkflowStep::Review => "Review and edit the recognized values",
            WorkflowStep::ChatbotAssist => "Fill remaining fields with assistant suggestions",
            WorkflowStep::Register => "Register the asset",
            WorkflowStep::Label => "Generate the asset label",
            WorkflowStep::Complete => "Registration finished",
        }
    }

    /// The job kind that runs while in this step, if any.
    pub fn job_kind(&self) -> Option<StageKind> {
        match self {
            WorkflowStep::Segment => Some(StageKind::Segment),
            WorkflowStep::Ocr => Some(StageKind::Ocr),
            WorkflowStep::Register => Some(StageKind::Register),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("cannot {action} during step '{step}'")]
    InvalidTransition {
        step: WorkflowStep,
        action: &'static str,
    },
    #[error("a {kind} job cannot run during step '{step}'")]
    StageMismatch { step: WorkflowStep, kind: StageKind },
    #[error("unknown form field '{0}'")]
    UnknownField(String),
    #[error("required field '{0}' is empty")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub id: String,
    pub kind: StageKind,
}

/// The editable registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetForm {
    pub model_name: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub spec: String,
    pub site: String,
    pub asset_type: String,
    pub notes: String,
}

impl AssetForm {
    pub const FIELD_NAMES: [&'static str; 7] = [
        "model_name",
        "manufacturer",
        "serial_number",
        "spec",
        "site",
        "asset_type",
        "notes",
    ];

    fn slot(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "model_name" | "model" => Some(&mut self.model_name),
            "manufacturer" => Some(&mut self.manufacturer),
            "serial_number" | "serial" => Some(&mut self.serial_number),
            "spec" => Some(&mut self.spec),
            "site" => Some(&mut self.site),
            "asset_type" => Some(&mut self.asset_type),
            "notes" => Some(&mut self.notes),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "model_name" | "model" => &self.model_name,
            "manufacturer" => &self.manufacturer,
            "serial_number" | "serial" => &self.serial_number,
            "spec" => &self.spec,
            "site" => &self.site,
            "asset_type" => &self.asset_type,
            "notes" => &self.notes,
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), WorkflowError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| WorkflowError::UnknownField(name.to_string()))?;
        *slot = value.into();
        Ok(())
    }

    /// Copies aggregated OCR values into the matching form fields.
    pub fn prefill(&mut self, fields: &[AggregatedField]) {
        for field in fields {
            let slot = match field.category {
                Category::Model => &mut self.model_name,
                Category::Manufacturer => &mut self.manufacturer,
                Category::Serial => &mut self.serial_number,
                Category::Spec => &mut self.spec,
                _ => continue,
            };
            *slot = field.text.clone();
        }
    }

    /// Fills only fields that are still empty.
    pub fn fill_missing(&mut self, other: &AssetForm) {
        for name in Self::FIELD_NAMES {
            let current_empty = self.get(name).is_some_and(|v| v.trim().is_empty());
            let suggested = other.get(name).unwrap_or_default().trim().to_string();
            if current_empty && !suggested.is_empty() {
                if let Some(slot) = self.slot(name) {
                    *slot = suggested;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.model_name.trim().is_empty() {
            return Err(WorkflowError::MissingField("model_name"));
        }
        if self.site.trim().is_empty() {
            return Err(WorkflowError::MissingField("site"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAsset {
    pub asset_id: String,
    pub asset_number: String,
}

/// What [`Workflow::apply_event`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum EventEffect {
    /// The event belongs to a job that is not active.
    Ignored,
    Progress,
    Advanced(WorkflowStep),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    step: WorkflowStep,
    active_job: Option<ActiveJob>,
    image_path: Option<String>,
    segments: Option<Value>,
    ocr: Option<OcrPayload>,
    fields: Vec<AggregatedField>,
    form: AssetForm,
    registered: Option<RegisteredAsset>,
    label: Option<String>,
    last_error: Option<String>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            step: WorkflowStep::Upload,
            active_job: None,
            image_path: None,
            segments: None,
            ocr: None,
            fields: Vec::new(),
            form: AssetForm::default(),
            registered: None,
            label: None,
            last_error: None,
        }
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn active_job(&self) -> Option<&ActiveJob> {
        self.active_job.as_ref()
    }

    pub fn image_path(&self) -> Option<&str> {
        self.image_path.as_deref()
    }

    pub fn segments(&self) -> Option<&Value> {
        self.segments.as_ref()
    }

    pub fn ocr(&self) -> Option<&OcrPayload> {
        self.ocr.as_ref()
    }

    pub fn fields(&self) -> &[AggregatedField] {
        &self.fields
    }

    pub fn form(&self) -> &AssetForm {
        &self.form
    }

    pub fn registered(&self) -> Option<&RegisteredAsset> {
        self.registered.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn image_uploaded(&mut self, path: impl Into<String>) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::Upload, "upload an image")?;
        self.image_path = Some(path.into());
        self.step = WorkflowStep::Segment;
        Ok(())
    }

    /// Moves straight to OCR on the whole image.
    pub fn skip_segmentation(&mut self) -> Result<Option<ActiveJob>, WorkflowError> {
        self.expect_step(WorkflowStep::Segment, "skip segmentation")?;
        self.step = WorkflowStep::Ocr;
        Ok(self.active_job.take())
    }

    /// Records a newly started job. Returns the job it replaces, whose
    /// channel the caller must close.
    pub fn job_started(
        &mut self,
        kind: StageKind,
        job_id: impl Into<String>,
    ) -> Result<Option<ActiveJob>, WorkflowError> {
        self.expect_kind(kind)?;
        if kind == StageKind::Register {
            self.form.validate()?;
        }
        self.last_error = None;
        Ok(self.active_job.replace(ActiveJob {
            id: job_id.into(),
            kind,
        }))
    }

    pub fn apply_event(
        &mut self,
        job_id: &str,
        event: &ProgressEvent,
    ) -> Result<EventEffect, WorkflowError> {
        let Some(active) = self.active_job.clone() else {
            return Ok(EventEffect::Ignored);
        };
        if active.id != job_id {
            return Ok(EventEffect::Ignored);
        }

        if event.stage.is_error() {
            let message = if event.message.trim().is_empty() {
                format!("{} failed", active.kind)
            } else {
                event.message.clone()
            };
            self.active_job = None;
            self.last_error = Some(message.clone());
            return Ok(EventEffect::Failed(message));
        }

        if event.stage.is_done() {
            let result = match &event.result {
                Some(v) if !v.is_null() => v.clone(),
                _ => active.kind.empty_result(),
            };
            self.active_job = None;
            let step = self.complete(active.kind, result)?;
            return Ok(EventEffect::Advanced(step));
        }

        Ok(EventEffect::Progress)
    }

    /// Applies a stage result returned directly by the start call, for
    /// servers that answer without a job id.
    pub fn direct_result(
        &mut self,
        kind: StageKind,
        value: Value,
    ) -> Result<WorkflowStep, WorkflowError> {
        self.expect_kind(kind)?;
        if kind == StageKind::Register {
            self.form.validate()?;
        }
        self.active_job = None;
        self.last_error = None;
        self.complete(kind, value)
    }

    pub fn edit_field(&mut self, name: &str, value: impl Into<String>) -> Result<(), WorkflowError> {
        match self.step {
            WorkflowStep::Review | WorkflowStep::ChatbotAssist | WorkflowStep::Register => {
                self.form.set(name, value)
            }
            step => Err(WorkflowError::InvalidTransition {
                step,
                action: "edit fields",
            }),
        }
    }

    pub fn confirm_review(&mut self) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::Review, "confirm the review")?;
        self.step = WorkflowStep::ChatbotAssist;
        Ok(())
    }

    /// Accepts assistant suggestions for the fields still empty.
    pub fn apply_assist(&mut self, suggestions: &AssetForm) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::ChatbotAssist, "apply suggestions")?;
        self.form.fill_missing(suggestions);
        self.step = WorkflowStep::Register;
        Ok(())
    }

    pub fn skip_assist(&mut self) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::ChatbotAssist, "skip the assistant")?;
        self.step = WorkflowStep::Register;
        Ok(())
    }

    pub fn label_created(&mut self, label: impl Into<String>) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::Label, "record a label")?;
        self.label = Some(label.into());
        self.step = WorkflowStep::Complete;
        Ok(())
    }

    /// Starts over. Returns the active job, if any, to close.
    pub fn reset(&mut self) -> Option<ActiveJob> {
        let active = self.active_job.take();
        *self = Self::new();
        active
    }

    fn complete(&mut self, kind: StageKind, result: Value) -> Result<WorkflowStep, WorkflowError> {
        match kind {
            StageKind::Segment => {
                let segments = result.get("segments").cloned().unwrap_or(result);
                self.segments = Some(segments);
                self.step = WorkflowStep::Ocr;
            }
            StageKind::Ocr => {
                let payload = OcrPayload::from_value(Some(&result));
                self.fields = analyze_ocr_results(&payload);
                self.form.prefill(&self.fields);
                self.ocr = Some(payload);
                self.step = WorkflowStep::Review;
            }
            StageKind::Register => {
                let text = |key: &str| {
                    result
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                self.registered = Some(RegisteredAsset {
                    asset_id: text("asset_id"),
                    asset_number: text("asset_number"),
                });
                self.step = WorkflowStep::Label;
            }
        }
        Ok(self.step)
    }

    fn expect_step(&self, step: WorkflowStep, action: &'static str) -> Result<(), WorkflowError> {
        if self.step != step {
            return Err(WorkflowError::InvalidTransition {
                step: self.step,
                action,
            });
        }
        Ok(())
    }

    fn expect_kind(&self, kind: StageKind) -> Result<(), WorkflowError> {
        if self.step.job_kind() != Some(kind) {
            return Err(WorkflowError::StageMismatch {
                step: self.step,
                kind,
            });
        }
        Ok(())
    }
}
