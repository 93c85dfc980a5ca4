use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

use crate::{Result, SgcError};

/// A normalized WAV produced by the transcoder. The scratch directory is
/// removed when this value is dropped, so keep it alive until the upload
/// finishes.
#[derive(Debug)]
pub struct NormalizedAudio {
    pub wav_path: PathBuf,
    _workdir: TempDir,
}

/// ffmpeg wrapper that normalizes arbitrary audio/video input to the
/// 16 kHz mono 16-bit PCM WAV the cluster expects.
pub struct Transcoder {
    ffmpeg_path: String,
}

impl Transcoder {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    #[cfg(test)]
    fn with_ffmpeg_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
        }
    }

    pub async fn check_availability(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Convert `input` to 16 kHz mono PCM WAV in a scratch directory.
    pub async fn to_wav(&self, input: &Path) -> Result<NormalizedAudio> {
        if !input.is_file() {
            return Err(SgcError::Validation(format!(
                "input file does not exist: {}",
                input.display()
            )));
        }

        let workdir = TempDir::new()?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let wav_path = workdir.path().join(format!("{stem}.wav"));

        tracing::debug!(input = %input.display(), output = %wav_path.display(), "normalizing audio");

        let output = Command::new(&self.ffmpeg_path)
            .args([
                "-i",
                &input.to_string_lossy(),
                "-ar",
                "16000",
                "-ac",
                "1",
                "-c:a",
                "pcm_s16le",
                "-loglevel",
                "error",
                "-y",
                &wav_path.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                SgcError::TranscoderUnavailable(format!(
                    "failed to run {}: {e}; is ffmpeg installed?",
                    self.ffmpeg_path
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SgcError::TranscoderUnavailable(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(NormalizedAudio {
            wav_path,
            _workdir: workdir,
        })
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_input_is_a_validation_error() {
        let transcoder = Transcoder::new();
        let err = transcoder
            .to_wav(Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, SgcError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_surfaced_distinctly() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(b"not really media").unwrap();

        let transcoder = Transcoder::with_ffmpeg_path("/nonexistent/ffmpeg-binary");
        let err = transcoder.to_wav(input.path()).await.unwrap_err();
        assert!(matches!(err, SgcError::TranscoderUnavailable(_)));
    }
}
