use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sgc",
    about = "Command-line client for the SGC transcription cluster",
    version,
    long_about = "Submits audio/video to an SGC cluster for speech-to-text transcription, \
polls job progress, and retrieves completed transcripts. Channel and playlist URLs in \
manifests are expanded into individual videos via yt-dlp."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request transcriptions from the SGC cluster
    Transcribe {
        #[command(subcommand)]
        target: TranscribeTarget,
    },

    /// List existing transcriptions for a source
    List {
        #[command(subcommand)]
        target: ListTarget,
    },

    /// Retrieve generated transcriptions from the SGC cluster
    Get {
        #[command(subcommand)]
        target: GetTarget,
    },

    /// Account creation tools
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
pub enum TranscribeTarget {
    /// Transcribe audio from a public URL
    Url {
        video_url: String,

        /// Transcription model to request
        #[arg(long, default_value = "small")]
        model: String,

        /// Save the completed transcript to a file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },

    /// Send a local media file to the cluster for transcription
    File {
        file_path: PathBuf,

        /// Transcription model to request
        #[arg(long, default_value = "small")]
        model: String,

        /// Save the completed transcript to a file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },

    /// Transcribe a newline-delimited list of URLs; channel and playlist
    /// URLs are expanded into individual videos
    List {
        /// Text file containing URLs separated by newlines
        channel_list: PathBuf,

        /// Submit without asking for confirmation
        #[arg(long)]
        skip_prompt: bool,

        /// Transcription model to request
        #[arg(long, default_value = "small")]
        model: String,

        /// Save completed transcripts next to this path, numbered per video
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ListTarget {
    /// List existing transcriptions for a media URL
    Url { url: String },

    /// List existing transcriptions for a local file (matched by SHA-512)
    File { file_path: PathBuf },
}

#[derive(Subcommand)]
pub enum GetTarget {
    /// Fetch a stored transcript for a public media URL
    Url {
        /// Output path, or '-' for standard output
        output: String,

        media_url: String,

        /// Pick the transcript with the best model quality (default)
        #[arg(long, conflicts_with = "get_latest")]
        get_best_model: bool,

        /// Pick the most recently completed transcript
        #[arg(long)]
        get_latest: bool,

        #[arg(long, value_enum, default_value = "vtt")]
        output_format: OutputFormat,
    },
}

#[derive(Subcommand)]
pub enum AccountAction {
    /// Create an account and store its API key locally
    Create { username: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// WebVTT as stored by the cluster
    Vtt,
    /// SRT subtitles
    Srt,
    /// Plain text, cue timing stripped
    Txt,
    /// Tab-separated start/end/text rows
    Tsv,
    /// JSON with a segment array
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Vtt => write!(f, "vtt"),
            OutputFormat::Srt => write!(f, "srt"),
            OutputFormat::Txt => write!(f, "txt"),
            OutputFormat::Tsv => write!(f, "tsv"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
