use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::{Result, SgcError};

/// Classification of one manifest line. Patterns are checked most specific
/// first so the categories are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `youtube.com/@handle` - must be resolved to a canonical channel URL
    ChannelHandle,
    /// Canonical channel URL carrying a channel id
    Channel { channel_id: String },
    /// Playlist URL carrying a playlist id
    Playlist { playlist_id: String },
    /// A single video URL, submitted as-is
    Video,
    /// Anything else; expansion of this line fails without touching others
    Unrecognized,
}

pub fn classify_line(line: &str) -> LineKind {
    if line.contains("youtube.com/@") {
        return LineKind::ChannelHandle;
    }
    if let Some((_, rest)) = line.split_once("/channel/") {
        let channel_id = rest
            .split(['/', '?', '&'])
            .next()
            .unwrap_or_default()
            .to_string();
        if !channel_id.is_empty() {
            return LineKind::Channel { channel_id };
        }
    }
    if let Some((_, rest)) = line.split_once("playlist?list=") {
        let playlist_id = rest.split('&').next().unwrap_or_default().to_string();
        if !playlist_id.is_empty() {
            return LineKind::Playlist { playlist_id };
        }
    }
    if line.contains("watch?v=") || line.contains("youtu.be/") {
        return LineKind::Video;
    }
    LineKind::Unrecognized
}

/// Expands one manifest line into individual video URLs.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn expand(&self, line: &str) -> Result<Vec<String>>;
}

/// Result of expanding a whole manifest. Failed lines are recorded and do
/// not abort the remaining ones.
#[derive(Debug, Default)]
pub struct ManifestExpansion {
    pub video_urls: Vec<String>,
    pub failures: Vec<LineFailure>,
}

#[derive(Debug)]
pub struct LineFailure {
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

/// Expand every non-empty manifest line, isolating per-line failures.
pub async fn expand_manifest(resolver: &dyn UrlResolver, content: &str) -> ManifestExpansion {
    let mut expansion = ManifestExpansion::default();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match resolver.expand(line).await {
            Ok(urls) => expansion.video_urls.extend(urls),
            Err(e) => {
                tracing::warn!(line_number = index + 1, line, error = %e, "manifest line skipped");
                expansion.failures.push(LineFailure {
                    line_number: index + 1,
                    line: line.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    expansion
}

/// Channel/playlist expansion backed by yt-dlp's flat playlist mode.
pub struct YtDlpResolver {
    yt_dlp_path: String,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }

    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn dump_json(&self, args: &[&str], url: &str) -> Result<serde_json::Value> {
        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SgcError::Resolver(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SgcError::Resolver(format!(
                "yt-dlp failed for {url}: {}",
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SgcError::Resolver(format!("yt-dlp returned invalid JSON for {url}: {e}")))
    }

    /// Resolve a handle-style URL to the canonical channel URL.
    async fn resolve_handle(&self, url: &str) -> Result<String> {
        tracing::info!(url, "resolving non-canonical URL");
        let info = self
            .dump_json(
                &["--quiet", "--flat-playlist", "--playlist-items", "1", "--dump-single-json"],
                url,
            )
            .await?;

        info["channel_url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| SgcError::Resolver(format!("no channel URL found for {url}")))
    }

    /// List every video of a channel or playlist without downloading anything.
    async fn flat_entries(&self, url: &str) -> Result<Vec<String>> {
        let info = self
            .dump_json(&["--quiet", "--flat-playlist", "--dump-single-json"], url)
            .await?;

        let entries = info["entries"]
            .as_array()
            .ok_or_else(|| SgcError::Resolver(format!("no entries found for {url}")))?;

        let mut urls = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(id) = entry["id"].as_str() {
                urls.push(format!("https://www.youtube.com/watch?v={id}"));
            } else if let Some(url) = entry["url"].as_str() {
                urls.push(url.to_string());
            }
        }
        Ok(urls)
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlResolver for YtDlpResolver {
    async fn expand(&self, line: &str) -> Result<Vec<String>> {
        match classify_line(line) {
            LineKind::ChannelHandle => {
                let canonical = self.resolve_handle(line).await?;
                self.flat_entries(&canonical).await
            }
            LineKind::Channel { channel_id } => {
                self.flat_entries(&format!("https://www.youtube.com/channel/{channel_id}"))
                    .await
            }
            LineKind::Playlist { playlist_id } => {
                self.flat_entries(&format!("https://www.youtube.com/playlist?list={playlist_id}"))
                    .await
            }
            LineKind::Video => Ok(vec![line.to_string()]),
            LineKind::Unrecognized => Err(SgcError::Resolver(format!(
                "unrecognized manifest line: {line}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_channel_handle() {
        assert_eq!(
            classify_line("https://www.youtube.com/@somecreator"),
            LineKind::ChannelHandle
        );
    }

    #[test]
    fn test_classify_channel_id() {
        assert_eq!(
            classify_line("https://www.youtube.com/channel/UCabc123/videos"),
            LineKind::Channel {
                channel_id: "UCabc123".to_string()
            }
        );
    }

    #[test]
    fn test_classify_playlist() {
        assert_eq!(
            classify_line("https://www.youtube.com/playlist?list=PLxyz&index=2"),
            LineKind::Playlist {
                playlist_id: "PLxyz".to_string()
            }
        );
    }

    #[test]
    fn test_classify_video() {
        assert_eq!(
            classify_line("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            LineKind::Video
        );
        assert_eq!(classify_line("https://youtu.be/dQw4w9WgXcQ"), LineKind::Video);
    }

    #[test]
    fn test_categories_are_mutually_exclusive() {
        // A plain watch URL must never match the channel or playlist arms
        let kind = classify_line("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(kind, LineKind::Video);
        assert!(!matches!(kind, LineKind::Channel { .. } | LineKind::Playlist { .. }));
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(classify_line("https://example.com/video.mp4"), LineKind::Unrecognized);
        assert_eq!(classify_line("garbage"), LineKind::Unrecognized);
    }

    /// Expands video lines to themselves, fails anything else.
    struct VideoOnlyResolver;

    #[async_trait]
    impl UrlResolver for VideoOnlyResolver {
        async fn expand(&self, line: &str) -> Result<Vec<String>> {
            match classify_line(line) {
                LineKind::Video => Ok(vec![line.to_string()]),
                _ => Err(SgcError::Resolver(format!("cannot expand {line}"))),
            }
        }
    }

    #[tokio::test]
    async fn test_bad_manifest_line_does_not_abort_the_rest() {
        let manifest = "\
https://www.youtube.com/watch?v=aaaaaaaaaaa

https://example.com/not-a-channel
https://www.youtube.com/watch?v=bbbbbbbbbbb
";
        let expansion = expand_manifest(&VideoOnlyResolver, manifest).await;

        assert_eq!(
            expansion.video_urls,
            vec![
                "https://www.youtube.com/watch?v=aaaaaaaaaaa",
                "https://www.youtube.com/watch?v=bbbbbbbbbbb",
            ]
        );
        assert_eq!(expansion.failures.len(), 1);
        assert_eq!(expansion.failures[0].line_number, 3);
    }
}
