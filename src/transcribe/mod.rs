use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha512};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

pub mod poller;

pub use poller::{JobPoller, JobStatusSource, PollConfig, PollObserver};

use crate::client::{
    select_best_model, select_latest, JobStatus, Model, ServiceClient, SourceKey, Transcript,
};
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::output;
use crate::resolver::{expand_manifest, YtDlpResolver};
use crate::transcoder::Transcoder;
use crate::{Result, SgcError};

/// Which stored transcript to pick for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    BestModel,
    Latest,
}

impl SelectionPolicy {
    /// Best-model is the default when neither flag is given.
    pub fn from_flags(_get_best_model: bool, get_latest: bool) -> Self {
        if get_latest {
            SelectionPolicy::Latest
        } else {
            SelectionPolicy::BestModel
        }
    }

    /// Both policies operate on the full transcript set, not a pre-sorted
    /// view, so "latest" can pick a worse model than "best".
    pub fn select<'a>(&self, transcripts: &'a [Transcript]) -> Option<&'a Transcript> {
        match self {
            SelectionPolicy::BestModel => select_best_model(transcripts),
            SelectionPolicy::Latest => select_latest(transcripts),
        }
    }
}

/// SHA-512 of a local file as lowercase hex, matching the identity the
/// cluster assigns to uploaded content.
pub fn sha512_hex(path: &Path) -> Result<String> {
    let bytes = fs_err::read(path)?;
    let digest = Sha512::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Top-level use cases: submit, poll, retrieve, list. Owns the console
/// side effects; holds no protocol state itself.
pub struct TranscriptionPipeline {
    client: ServiceClient,
    resolver: YtDlpResolver,
    transcoder: Transcoder,
    poll_config: PollConfig,
    cancel: watch::Receiver<bool>,
}

impl TranscriptionPipeline {
    pub fn new(config: &Config, cancel: watch::Receiver<bool>) -> Self {
        Self {
            client: ServiceClient::new(config.base_url(), config.api_key.clone()),
            resolver: YtDlpResolver::new(),
            transcoder: Transcoder::new(),
            poll_config: PollConfig::default(),
            cancel,
        }
    }

    /// Submit a URL job, poll to completion, retrieve the transcript and
    /// optionally save it.
    pub async fn transcribe_url(
        &self,
        media_url: &str,
        model: &Model,
        save: Option<&Path>,
    ) -> Result<String> {
        let job_id = self.client.submit_url_job(media_url, model).await?;
        let text = self.poll_and_retrieve(&job_id).await?;

        if let Some(path) = save {
            fs_err::write(path, &text)?;
            println!("Transcript saved to {}", path.display());
        }
        Ok(text)
    }

    /// Normalize a local file to WAV, upload it, poll to completion and
    /// retrieve the transcript.
    pub async fn transcribe_file(
        &self,
        input: &Path,
        model: &Model,
        save: Option<&Path>,
    ) -> Result<String> {
        if !self.transcoder.check_availability().await {
            return Err(SgcError::TranscoderUnavailable(
                "ffmpeg not found in PATH".to_string(),
            ));
        }

        let normalized = self.transcoder.to_wav(input).await?;
        let receipt = self
            .client
            .submit_file_job(&normalized.wav_path, model)
            .await?;
        println!(
            "File accepted as job {} (sha512 {})",
            receipt.job_id, receipt.sha512
        );

        let text = self.poll_and_retrieve(&receipt.job_id).await?;

        if let Some(path) = save {
            fs_err::write(path, &text)?;
            println!("Transcript saved to {}", path.display());
        }
        Ok(text)
    }

    /// Expand a manifest of URLs (channels and playlists become individual
    /// videos) and submit them sequentially. One bad line or failed job
    /// never aborts the rest; failures are summarized at the end.
    pub async fn transcribe_list(
        &self,
        manifest: &Path,
        model: &Model,
        skip_prompt: bool,
        save: Option<&Path>,
    ) -> Result<()> {
        if !self.resolver.check_availability().await {
            tracing::warn!("yt-dlp not found in PATH; channel and playlist lines will fail to expand");
        }

        let content = fs_err::read_to_string(manifest)?;
        let expansion = expand_manifest(&self.resolver, &content).await;

        for url in &expansion.video_urls {
            println!("{url}");
        }
        for failure in &expansion.failures {
            eprintln!(
                "Skipping line {} ({}): {}",
                failure.line_number, failure.line, failure.reason
            );
        }

        if expansion.video_urls.is_empty() {
            println!("No video URLs found in {}", manifest.display());
            return Ok(());
        }

        if !skip_prompt && !confirm(expansion.video_urls.len()).await? {
            return Ok(());
        }

        let mut failed_jobs = Vec::new();
        for (index, url) in expansion.video_urls.iter().enumerate() {
            let save_path = save.map(|base| numbered_save_path(base, index));
            match self.transcribe_url(url, model, save_path.as_deref()).await {
                Ok(_) => {}
                // An interrupt stops the whole batch
                Err(SgcError::Cancelled) => return Err(SgcError::Cancelled),
                Err(e) => {
                    eprintln!("Failed to transcribe {url}: {e}");
                    failed_jobs.push((url.clone(), e.to_string()));
                }
            }
        }

        if !failed_jobs.is_empty() {
            eprintln!(
                "{} of {} videos failed:",
                failed_jobs.len(),
                expansion.video_urls.len()
            );
            for (url, reason) in &failed_jobs {
                eprintln!("  {url}: {reason}");
            }
        }
        Ok(())
    }

    /// Print a summary of every stored transcript for a source.
    pub async fn list_existing(&self, key: &SourceKey) -> Result<()> {
        let transcripts = self.client.list_transcriptions(key).await?;

        if transcripts.is_empty() {
            println!("No transcriptions found");
            return Ok(());
        }

        for transcript in &transcripts {
            let date = transcript
                .completed_at()
                .map(|d| d.to_string())
                .unwrap_or_else(|| transcript.completed_time.to_string());
            println!("Date: {date}, Model: {}", transcript.requested_model);
        }
        Ok(())
    }

    /// Fetch one stored transcript per the selection policy and write it to
    /// a file, or stdout when the destination is `-`.
    pub async fn get_existing(
        &self,
        key: &SourceKey,
        policy: SelectionPolicy,
        format: OutputFormat,
        destination: &str,
    ) -> Result<()> {
        let transcripts = self.client.list_transcriptions(key).await?;

        let Some(transcript) = policy.select(&transcripts) else {
            println!("No transcriptions found");
            return Ok(());
        };

        let content = output::render(&transcript.text, format)?;
        output::write_output(&content, destination)
    }

    async fn poll_and_retrieve(&self, job_id: &str) -> Result<String> {
        let poller = JobPoller::new(&self.client, self.poll_config.clone())
            .with_cancel(self.cancel.clone());
        let mut observer = ConsoleObserver::new(job_id.to_string());

        match poller.run(job_id, &mut observer).await {
            Ok(_) => self.client.retrieve_transcript(job_id).await,
            Err(SgcError::Cancelled) => {
                observer.abandon();
                // The protocol has no cancel call: the remote job keeps running
                eprintln!(
                    "Interrupted; job {job_id} continues on the cluster. \
Fetch its transcript later with `sgc get`."
                );
                Err(SgcError::Cancelled)
            }
            Err(e) => {
                observer.abandon();
                Err(e)
            }
        }
    }
}

/// Renders poll events on the console: one line per status transition and a
/// progress bar in audio seconds while transcribing.
struct ConsoleObserver {
    job_id: String,
    bar: Option<ProgressBar>,
}

impl ConsoleObserver {
    fn new(job_id: String) -> Self {
        Self { job_id, bar: None }
    }

    fn abandon(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

impl PollObserver for ConsoleObserver {
    fn on_transition(&mut self, _old: Option<JobStatus>, new: JobStatus) {
        match new {
            JobStatus::Requested => {
                println!("Successfully queued under job id {}", self.job_id)
            }
            JobStatus::Assigned => println!("Job assigned to a worker node"),
            JobStatus::Transcribing => println!("Beginning transcript generation"),
            JobStatus::Completed => {
                if let Some(bar) = self.bar.take() {
                    bar.finish();
                }
                println!("Job {} completed", self.job_id);
            }
            JobStatus::Failed => self.abandon(),
        }
    }

    fn on_progress(&mut self, elapsed: f64, total: f64, rate: Option<f64>) {
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(total.round() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s {msg}")
                    .unwrap(),
            );
            bar
        });
        bar.set_position(elapsed.round() as u64);
        if let Some(rate) = rate {
            bar.set_message(format!("{rate:.2}x realtime"));
        }
    }
}

async fn confirm(count: usize) -> Result<bool> {
    print!("Do you want to transcribe {count} videos? [y/N] ");
    std::io::stdout().flush()?;

    // stdin reads block, so keep them off the runtime threads
    let answer = tokio::task::spawn_blocking(|| {
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        Ok::<_, std::io::Error>(answer)
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Per-video save path for batch runs: `out.vtt` becomes `out-001.vtt`,
/// `out-002.vtt`, ... so later videos do not overwrite earlier ones.
fn numbered_save_path(base: &Path, index: usize) -> PathBuf {
    let parent = base.parent().unwrap_or_else(|| Path::new(""));
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".to_string());

    match base.extension() {
        Some(ext) => parent.join(format!("{stem}-{:03}.{}", index + 1, ext.to_string_lossy())),
        None => parent.join(format!("{stem}-{:03}", index + 1)),
    }
}
