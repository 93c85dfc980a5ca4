use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use crate::client::{JobStatus, JobStatusSnapshot, ServiceClient};
use crate::{Result, SgcError};

/// Source of job status snapshots. Seam between the poll loop and the
/// cluster so the loop can be driven by a scripted source in tests.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusSnapshot>;
}

#[async_trait]
impl JobStatusSource for ServiceClient {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusSnapshot> {
        self.get_job_status(job_id).await
    }
}

/// Observer of poll events. Rendering (console messages, progress bar)
/// lives behind this seam; the poller owns only the protocol state.
pub trait PollObserver {
    /// Invoked exactly once per distinct status transition, in lifecycle
    /// order. `old` is `None` for the first observed status.
    fn on_transition(&mut self, old: Option<JobStatus>, new: JobStatus);

    /// Invoked while transcribing. `elapsed` and `total` are audio seconds;
    /// `elapsed` never decreases across the life of one job. `rate` is the
    /// realtime multiple once enough wall clock has passed to compute one.
    fn on_progress(&mut self, elapsed: f64, total: f64, rate: Option<f64>);
}

/// Timing discipline for the poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between consecutive status polls
    pub interval: Duration,

    /// Consecutive transport failures tolerated before giving up
    pub max_transport_retries: u32,

    /// Wall-clock bound on the whole poll; a hung job must not block forever
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_transport_retries: 5,
            timeout: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Drives one submitted job from its current status to a terminal status.
///
/// Transitions are monotonic (requested -> assigned -> transcribing ->
/// completed, any prefix skippable); a regression reported by the cluster is
/// a protocol violation, not something to paper over. Transport errors are
/// retried on the fixed interval up to a bound; every other error ends the
/// poll.
pub struct JobPoller<'a> {
    source: &'a dyn JobStatusSource,
    config: PollConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> JobPoller<'a> {
    pub fn new(source: &'a dyn JobStatusSource, config: PollConfig) -> Self {
        Self {
            source,
            config,
            cancel: None,
        }
    }

    /// Attach a cancellation flag. When it flips to true the poll stops with
    /// `SgcError::Cancelled`; the remote job is unaffected because the
    /// protocol has no cancel call.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Poll until the job reaches a terminal status. Returns
    /// `JobStatus::Completed` on success; a job the cluster reports as
    /// failed surfaces as `SgcError::JobFailed`.
    pub async fn run(&self, job_id: &str, observer: &mut dyn PollObserver) -> Result<JobStatus> {
        let started = Instant::now();
        let mut last_status: Option<JobStatus> = None;
        let mut last_elapsed = 0.0_f64;
        let mut rate_origin: Option<(Instant, f64)> = None;
        let mut transport_failures = 0_u32;
        let mut cancel = self.cancel.clone();

        loop {
            if started.elapsed() >= self.config.timeout {
                return Err(SgcError::Timeout(self.config.timeout.as_secs()));
            }

            let snapshot = match self.source.job_status(job_id).await {
                Ok(snapshot) => {
                    transport_failures = 0;
                    snapshot
                }
                Err(SgcError::Transport(reason)) => {
                    transport_failures += 1;
                    tracing::warn!(
                        job_id,
                        attempt = transport_failures,
                        %reason,
                        "status poll failed, retrying"
                    );
                    if transport_failures > self.config.max_transport_retries {
                        return Err(SgcError::Transport(reason));
                    }
                    self.wait(&mut cancel).await?;
                    continue;
                }
                Err(other) => return Err(other),
            };

            let status = snapshot.status;
            match last_status {
                Some(previous) if status == previous => {}
                Some(previous) if status.rank() < previous.rank() => {
                    return Err(SgcError::Protocol(format!(
                        "job {job_id} status regressed from {previous} to {status}"
                    )));
                }
                previous => {
                    observer.on_transition(previous, status);
                    last_status = Some(status);
                }
            }

            if status == JobStatus::Transcribing {
                if let (Some(progress), Some(total)) = (snapshot.progress, snapshot.audio_length) {
                    // Clamp so an observer never sees progress move backward
                    let elapsed = (progress.clamp(0.0, 1.0) * total).max(last_elapsed);
                    let rate = match rate_origin {
                        None => {
                            rate_origin = Some((Instant::now(), elapsed));
                            None
                        }
                        Some((origin, baseline)) => {
                            let wall = origin.elapsed().as_secs_f64();
                            (wall > 0.0).then(|| (elapsed - baseline) / wall)
                        }
                    };
                    observer.on_progress(elapsed, total, rate);
                    last_elapsed = elapsed;
                }
            }

            match status {
                JobStatus::Completed => return Ok(status),
                JobStatus::Failed => return Err(SgcError::JobFailed(job_id.to_string())),
                _ => {}
            }

            self.wait(&mut cancel).await?;
        }
    }

    /// Sleep one interval, waking early on cancellation.
    async fn wait(&self, cancel: &mut Option<watch::Receiver<bool>>) -> Result<()> {
        let Some(rx) = cancel.as_mut() else {
            sleep(self.config.interval).await;
            return Ok(());
        };

        if *rx.borrow() {
            return Err(SgcError::Cancelled);
        }

        let changed = tokio::select! {
            _ = sleep(self.config.interval) => None,
            changed = rx.changed() => Some(changed),
        };

        match changed {
            None => Ok(()),
            Some(Ok(())) if *rx.borrow() => Err(SgcError::Cancelled),
            // Flag cleared or sender gone: keep pacing
            Some(_) => {
                sleep(self.config.interval).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted status source: yields steps in order, repeating the final
    /// snapshot once the script is exhausted.
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        last: Mutex<Option<JobStatusSnapshot>>,
    }

    enum Step {
        Snapshot(JobStatusSnapshot),
        TransportError,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl JobStatusSource for ScriptedSource {
        async fn job_status(&self, _job_id: &str) -> Result<JobStatusSnapshot> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Snapshot(snapshot)) => {
                    *self.last.lock().unwrap() = Some(snapshot.clone());
                    Ok(snapshot)
                }
                Some(Step::TransportError) => {
                    Err(SgcError::Transport("connection reset".to_string()))
                }
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .expect("script exhausted with no prior snapshot")),
            }
        }
    }

    fn snap(status: JobStatus) -> Step {
        Step::Snapshot(JobStatusSnapshot {
            status,
            progress: None,
            audio_length: None,
        })
    }

    fn transcribing(progress: f64, audio_length: f64) -> Step {
        Step::Snapshot(JobStatusSnapshot {
            status: JobStatus::Transcribing,
            progress: Some(progress),
            audio_length: Some(audio_length),
        })
    }

    #[derive(Default)]
    struct Recorder {
        transitions: Vec<(Option<JobStatus>, JobStatus)>,
        progress: Vec<f64>,
    }

    impl PollObserver for Recorder {
        fn on_transition(&mut self, old: Option<JobStatus>, new: JobStatus) {
            self.transitions.push((old, new));
        }

        fn on_progress(&mut self, elapsed: f64, _total: f64, _rate: Option<f64>) {
            self.progress.push(elapsed);
        }
    }

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(1),
            max_transport_retries: 3,
            timeout: Duration::from_secs(600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_reports_each_transition_once() {
        let source = ScriptedSource::new(vec![
            snap(JobStatus::Requested),
            snap(JobStatus::Requested),
            snap(JobStatus::Assigned),
            transcribing(0.5, 100.0),
            snap(JobStatus::Completed),
        ]);
        let mut recorder = Recorder::default();

        let terminal = JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap();

        assert_eq!(terminal, JobStatus::Completed);
        assert_eq!(
            recorder.transitions,
            vec![
                (None, JobStatus::Requested),
                (Some(JobStatus::Requested), JobStatus::Assigned),
                (Some(JobStatus::Assigned), JobStatus::Transcribing),
                (Some(JobStatus::Transcribing), JobStatus::Completed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_observed_status_may_skip_earlier_states() {
        let source = ScriptedSource::new(vec![
            transcribing(0.1, 60.0),
            snap(JobStatus::Completed),
        ]);
        let mut recorder = Recorder::default();

        JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.transitions[0], (None, JobStatus::Transcribing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_regression_is_a_protocol_error() {
        let source = ScriptedSource::new(vec![
            snap(JobStatus::Transcribing),
            snap(JobStatus::Assigned),
        ]);
        let mut recorder = Recorder::default();

        let err = JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, SgcError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_never_goes_backward() {
        let source = ScriptedSource::new(vec![
            transcribing(0.5, 100.0),
            transcribing(0.4, 100.0),
            transcribing(0.6, 100.0),
            snap(JobStatus::Completed),
        ]);
        let mut recorder = Recorder::default();

        JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.progress, vec![50.0, 50.0, 60.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retried_up_to_bound() {
        let source = ScriptedSource::new(vec![
            snap(JobStatus::Requested),
            Step::TransportError,
            Step::TransportError,
            snap(JobStatus::Completed),
        ]);
        let mut recorder = Recorder::default();

        let terminal = JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap();

        assert_eq!(terminal, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_beyond_bound_are_fatal() {
        let source = ScriptedSource::new(vec![
            Step::TransportError,
            Step::TransportError,
            Step::TransportError,
            Step::TransportError,
            snap(JobStatus::Completed),
        ]);
        let mut recorder = Recorder::default();

        let err = JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, SgcError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_job_times_out() {
        let source = ScriptedSource::new(vec![snap(JobStatus::Requested)]);
        let mut recorder = Recorder::default();
        let config = PollConfig {
            timeout: Duration::from_secs(10),
            ..fast_config()
        };

        let err = JobPoller::new(&source, config)
            .run("job-1", &mut recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, SgcError::Timeout(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_surfaces_as_error() {
        let source = ScriptedSource::new(vec![
            snap(JobStatus::Requested),
            snap(JobStatus::Failed),
        ]);
        let mut recorder = Recorder::default();

        let err = JobPoller::new(&source, fast_config())
            .run("job-1", &mut recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, SgcError::JobFailed(id) if id == "job-1"));
        // The failed transition was still reported before the error
        assert_eq!(
            recorder.transitions.last(),
            Some(&(Some(JobStatus::Requested), JobStatus::Failed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_poll() {
        let source = ScriptedSource::new(vec![snap(JobStatus::Requested)]);
        let mut recorder = Recorder::default();
        let (tx, rx) = watch::channel(false);

        let poller = JobPoller::new(&source, fast_config()).with_cancel(rx);
        tx.send(true).unwrap();

        let err = poller.run("job-1", &mut recorder).await.unwrap_err();
        assert!(matches!(err, SgcError::Cancelled));
    }
}
