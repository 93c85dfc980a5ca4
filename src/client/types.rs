use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, SgcError};

/// Lifecycle states the cluster reports for a job.
///
/// Transitions are monotonic: requested -> assigned -> transcribing ->
/// completed. `Failed` is terminal and may be entered from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Requested,
    Assigned,
    Transcribing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Position in the monotonic lifecycle, used to detect regressions.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Requested => 0,
            JobStatus::Assigned => 1,
            JobStatus::Transcribing => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Requested => "requested",
            JobStatus::Assigned => "assigned",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One poll's view of a job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusSnapshot {
    #[serde(rename = "jobStatus")]
    pub status: JobStatus,

    /// Fractional completion in [0, 1], present while transcribing
    pub progress: Option<f64>,

    /// Source audio duration in seconds, present once known
    #[serde(rename = "audioLength")]
    pub audio_length: Option<f64>,
}

/// Known model identifiers, best quality first.
const MODEL_QUALITY_ORDER: &[&str] = &[
    "large-v3", "large-v2", "large", "medium", "medium.en", "small", "small.en", "base", "base.en",
    "tiny", "tiny.en",
];

/// A requested transcription model.
///
/// The identifier is kept as the wire string; ranking over the known set is
/// explicit so an unrecognized model sorts below every known one instead of
/// blowing up the ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Model(String);

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rank in the fixed quality order; lower is better. Unknown identifiers
    /// rank below all known models.
    pub fn quality_rank(&self) -> usize {
        MODEL_QUALITY_ORDER
            .iter()
            .position(|m| *m == self.0)
            .unwrap_or(MODEL_QUALITY_ORDER.len())
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Model {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A completed transcription result, decoded.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub requested_model: Model,

    /// Completion time as unix seconds
    pub completed_time: i64,

    /// Decoded transcript body (WebVTT text as produced by the cluster)
    pub text: String,
}

impl Transcript {
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.completed_time, 0)
    }
}

/// Lookup key for a source's transcripts: either the media URL or the
/// SHA-512 the cluster assigned to an uploaded file.
#[derive(Debug, Clone)]
pub enum SourceKey {
    Url(String),
    Sha512(String),
}

/// Select the transcript with the best model under the quality order.
/// Ties keep the earliest element.
pub fn select_best_model(transcripts: &[Transcript]) -> Option<&Transcript> {
    transcripts
        .iter()
        .min_by_key(|t| t.requested_model.quality_rank())
}

/// Select the most recently completed transcript, regardless of model.
pub fn select_latest(transcripts: &[Transcript]) -> Option<&Transcript> {
    transcripts.iter().max_by_key(|t| t.completed_time)
}

/// Credentials returned by account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub username: String,
    pub api_key: String,
}

/// Receipt for an uploaded file job. The sha512 is the cluster's stable
/// identity for the file's transcripts.
#[derive(Debug, Clone, Deserialize)]
pub struct FileJobReceipt {
    pub job_id: String,
    pub sha512: String,
}

// Wire payloads. Field names follow the cluster API exactly.

#[derive(Serialize)]
pub(crate) struct CreateAccountRequest<'a> {
    pub username: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UrlJobRequest<'a> {
    pub requested_model: &'a str,
    pub job_type: &'static str,
    pub audio_url: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct JobCreated {
    pub job_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatusRequest<'a> {
    pub job_identifier: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RetrieveTranscriptRequest<'a> {
    pub job_id: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct TranscriptPayload {
    pub transcript: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListTranscriptsRequest<'a> {
    pub transcript_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha512: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TranscriptEntry {
    pub requested_model: String,
    pub completed_time: i64,
    // Older cluster versions used "text" for this field
    #[serde(alias = "text")]
    pub transcript: String,
}

/// Decode the base64-encoded UTF-8 transcript body.
pub(crate) fn decode_transcript(raw: &str) -> Result<String> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|e| SgcError::Protocol(format!("transcript payload is not valid base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| SgcError::Protocol(format!("transcript is not valid UTF-8: {e}")))
}
