use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;

use crate::{Result, SgcError};

pub mod types;

pub use types::{
    select_best_model, select_latest, Account, FileJobReceipt, JobStatus, JobStatusSnapshot,
    Model, SourceKey, Transcript,
};

use types::{
    decode_transcript, CreateAccountRequest, JobCreated, JobStatusRequest, ListTranscriptsRequest,
    RetrieveTranscriptRequest, TranscriptEntry, TranscriptPayload, UrlJobRequest,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Error body the cluster attaches to rejected requests
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Typed request/response boundary to the SGC cluster.
///
/// Owns the base URL and bearer token. Never retries and never interprets
/// job state; that is the poller's job.
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// All calls except account creation require a configured key; fail
    /// before any network I/O when it is missing.
    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            SgcError::Auth(
                "no API key configured; create an account with `sgc account create <username>`"
                    .to_string(),
            )
        })
    }

    /// Map a non-success response to the error taxonomy.
    async fn failure(response: reqwest::Response, what: &str) -> SgcError {
        let status = response.status();
        let transport = response.error_for_status_ref().err();
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| status.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SgcError::Auth(message),
            StatusCode::NOT_FOUND => SgcError::NotFound(what.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                SgcError::Validation(message)
            }
            StatusCode::CONFLICT => SgcError::NotReady(what.to_string()),
            _ => match transport {
                Some(e) => SgcError::Transport(e.to_string()),
                None => SgcError::Protocol(format!("unexpected status {status} from {what}")),
            },
        }
    }

    /// Register a username with the cluster and obtain its API key.
    /// The caller persists the credentials; this call stores nothing.
    pub async fn create_account(&self, username: &str) -> Result<Account> {
        if username.trim().is_empty() {
            return Err(SgcError::Validation("username must not be empty".to_string()));
        }

        let response = self
            .http
            .post(self.endpoint("createAccount"))
            .json(&CreateAccountRequest { username })
            .send()
            .await?;

        if !response.status().is_success() {
            // Duplicate or rejected usernames come back as client errors
            return Err(match Self::failure(response, "createAccount").await {
                SgcError::Validation(m) | SgcError::NotFound(m) => SgcError::Auth(m),
                other => other,
            });
        }

        Ok(response.json::<Account>().await?)
    }

    /// Submit a public-URL transcription job. Returns the assigned job id.
    pub async fn submit_url_job(&self, media_url: &str, model: &Model) -> Result<String> {
        let key = self.api_key()?;
        validate_media_url(media_url)?;

        tracing::info!(url = media_url, model = %model, "submitting URL job");

        let response = self
            .http
            .post(self.endpoint("requestUrlTranscription"))
            .bearer_auth(key)
            .json(&UrlJobRequest {
                requested_model: model.as_str(),
                job_type: "public-url",
                audio_url: media_url,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "requestUrlTranscription").await);
        }

        Ok(response.json::<JobCreated>().await?.job_id)
    }

    /// Upload a normalized WAV file for transcription. The cluster computes
    /// a SHA-512 over the content and returns it alongside the job id; the
    /// hash is the stable identity for this file's transcripts.
    pub async fn submit_file_job(&self, wav_path: &Path, model: &Model) -> Result<FileJobReceipt> {
        let key = self.api_key()?;

        let file_name = wav_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        let content = fs_err::read(wav_path)?;

        tracing::info!(path = %wav_path.display(), bytes = content.len(), model = %model, "uploading file job");

        let form = reqwest::multipart::Form::new()
            .text("requestedModel", model.as_str().to_string())
            .text("jobType", "file")
            .part(
                "file",
                reqwest::multipart::Part::bytes(content)
                    .file_name(file_name)
                    .mime_str("audio/wav")
                    .map_err(|e| SgcError::Validation(e.to_string()))?,
            );

        let response = self
            .http
            .post(self.endpoint("requestFileTranscription"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "requestFileTranscription").await);
        }

        Ok(response.json::<FileJobReceipt>().await?)
    }

    /// Fetch the current status snapshot for a job.
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusSnapshot> {
        let key = self.api_key()?;

        let response = self
            .http
            .post(self.endpoint("getJobStatus"))
            .bearer_auth(key)
            .json(&JobStatusRequest { job_identifier: job_id })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, &format!("job {job_id}")).await);
        }

        Ok(response.json::<JobStatusSnapshot>().await?)
    }

    /// Retrieve and decode the transcript of a completed job.
    pub async fn retrieve_transcript(&self, job_id: &str) -> Result<String> {
        let key = self.api_key()?;

        let response = self
            .http
            .post(self.endpoint("retrieveTranscriptByJobId"))
            .bearer_auth(key)
            .json(&RetrieveTranscriptRequest { job_id })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, &format!("transcript for job {job_id}")).await);
        }

        let payload = response.json::<TranscriptPayload>().await?;
        decode_transcript(&payload.transcript)
    }

    /// List all completed transcripts for a source, best model first.
    /// A source with no transcripts yields an empty vec, not an error.
    pub async fn list_transcriptions(&self, key: &SourceKey) -> Result<Vec<Transcript>> {
        let api_key = self.api_key()?;

        let request = match key {
            SourceKey::Url(url) => ListTranscriptsRequest {
                transcript_type: "public-url",
                audio_url: Some(url),
                sha512: None,
            },
            SourceKey::Sha512(hash) => ListTranscriptsRequest {
                transcript_type: "file",
                audio_url: None,
                sha512: Some(hash),
            },
        };

        let response = self
            .http
            .post(self.endpoint("retrieveCompletedTranscripts"))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "retrieveCompletedTranscripts").await);
        }

        let entries = response.json::<Vec<TranscriptEntry>>().await?;
        let mut transcripts: Vec<Transcript> = entries
            .into_iter()
            .map(|entry| Transcript {
                requested_model: Model::new(entry.requested_model),
                completed_time: entry.completed_time,
                // Some deployments return the body unencoded under "text"
                text: decode_transcript(&entry.transcript)
                    .unwrap_or_else(|_| entry.transcript.clone()),
            })
            .collect();

        // Stable sort: equal-quality entries keep their server order
        transcripts.sort_by_key(|t| t.requested_model.quality_rank());
        Ok(transcripts)
    }
}

/// Reject obviously malformed media URLs before they reach the cluster.
fn validate_media_url(media_url: &str) -> Result<()> {
    let parsed = url::Url::parse(media_url)
        .map_err(|_| SgcError::Validation(format!("invalid URL format: {media_url}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SgcError::Validation(
            "URL must use HTTP or HTTPS protocol".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_media_url() {
        assert!(validate_media_url("https://example.com/video.mp4").is_ok());
        assert!(validate_media_url("http://example.com").is_ok());
        assert!(validate_media_url("ftp://example.com/a.mp3").is_err());
        assert!(validate_media_url("not-a-url").is_err());
    }

    #[test]
    fn test_endpoint_join_tolerates_trailing_slash() {
        let client = ServiceClient::new("http://localhost:8080/", None);
        assert_eq!(client.endpoint("getJobStatus"), "http://localhost:8080/getJobStatus");
    }

    #[tokio::test]
    async fn test_authenticated_calls_fail_fast_without_key() {
        let client = ServiceClient::new("http://localhost:1", None);
        // No listener on the port: an attempted request would surface as
        // Transport, so Auth here proves we failed before any network I/O.
        let err = client.get_job_status("job-1").await.unwrap_err();
        assert!(matches!(err, SgcError::Auth(_)));

        let err = client
            .submit_url_job("https://example.com/a.mp4", &Model::from("small"))
            .await
            .unwrap_err();
        assert!(matches!(err, SgcError::Auth(_)));

        let err = client
            .list_transcriptions(&SourceKey::Url("https://example.com/a.mp4".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, SgcError::Auth(_)));
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_url_before_network() {
        let client = ServiceClient::new("http://localhost:1", Some("key".to_string()));
        let err = client
            .submit_url_job("nonsense", &Model::from("small"))
            .await
            .unwrap_err();
        assert!(matches!(err, SgcError::Validation(_)));
    }
}
