//! # AMS Registration Core
//!
//! Shared, I/O-free logic for the asset registration workflow: OCR line
//! classification, per-category field aggregation, the job progress event
//! model, the progress channel consumer, SSE frame decoding, and the
//! registration workflow state machine.
//!
//! This crate contains no tokio, network, or filesystem dependencies.
//! Every function here is synchronous and free of shared state, so it is
//! safe to call concurrently for different jobs.
//!
//! ```text
//! OCR payload ──▶ aggregate ──(classify per line)──▶ AggregatedField[]
//!                                                        │
//! SSE bytes ──▶ sse ──▶ ProgressEvent ──▶ channel ──▶ workflow
//! ```

pub mod aggregate;
pub mod channel;
pub mod classify;
pub mod models;
pub mod progress;
pub mod sse;
pub mod workflow;

pub use aggregate::{analyze_ocr_results, detect_actual_value, is_category_title};
pub use channel::{ChannelError, ChannelState, IdlePolicy, Outcome, ProgressChannel};
pub use classify::{extract_json, extract_value_from_text};
pub use models::{
    AggregatedField, Category, Extraction, FieldSource, JsonExtraction, OcrLine, OcrPayload,
};
pub use progress::{ProgressEvent, Stage, StageKind};
pub use sse::{DecodeError, SseDecoder, SseFrame};
pub use workflow::{
    ActiveJob, AssetForm, EventEffect, RegisteredAsset, Workflow, WorkflowError, WorkflowStep,
};
