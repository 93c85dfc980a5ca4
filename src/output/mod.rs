use serde::Serialize;

use crate::cli::OutputFormat;
use crate::{Result, SgcError};

/// One timed cue from a WebVTT transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Parse the cues out of a WebVTT document. Tolerant of headers, notes and
/// cue identifiers; anything without a timing line is skipped.
pub fn parse_vtt(text: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let Some((start_ms, end_ms)) = parse_cue_timing(line) else {
            continue;
        };
        let mut body = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            if let Some(text_line) = lines.next() {
                body.push(text_line.trim());
            }
        }
        cues.push(Cue {
            start_ms,
            end_ms,
            text: body.join(" "),
        });
    }

    cues
}

fn parse_cue_timing(line: &str) -> Option<(u64, u64)> {
    let (start, rest) = line.split_once(" --> ")?;
    // Cue settings may follow the end timestamp
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm` (comma accepted for the millis
/// separator) into milliseconds.
fn parse_timestamp(s: &str) -> Option<u64> {
    let (clock, millis) = match s.split_once(['.', ',']) {
        Some((clock, frac)) => (clock, parse_fractional_millis(frac)?),
        None => (s, 0),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, sec] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, sec.parse::<u64>().ok()?),
        [m, sec] => (0, m.parse::<u64>().ok()?, sec.parse::<u64>().ok()?),
        _ => return None,
    };

    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Scale a fractional-seconds field to milliseconds: `.5` is 500 ms, not
/// 5 ms. Digits past the third are truncated.
fn parse_fractional_millis(frac: &str) -> Option<u64> {
    let value = frac.parse::<u64>().ok()?;
    match frac.len() {
        1 => Some(value * 100),
        2 => Some(value * 10),
        3 => Some(value),
        n => Some(value / 10u64.pow((n - 3) as u32)),
    }
}

fn format_clock(ms: u64, millis_separator: char) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}{millis_separator}{millis:03}")
}

#[derive(Serialize)]
struct JsonSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Serialize)]
struct JsonDocument {
    text: String,
    segments: Vec<JsonSegment>,
}

/// Re-emit a stored transcript (WebVTT text) in the requested format.
pub fn render(transcript: &str, format: OutputFormat) -> Result<String> {
    if matches!(format, OutputFormat::Vtt) {
        return Ok(transcript.to_string());
    }

    let cues = parse_vtt(transcript);

    if let OutputFormat::Txt = format {
        if cues.is_empty() {
            // Plain-text transcript with no cue timing; pass it through
            return Ok(transcript.trim().to_string());
        }
        return Ok(cues
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"));
    }

    if cues.is_empty() {
        return Err(SgcError::Validation(format!(
            "transcript has no cue timing; cannot render as {format}"
        )));
    }

    match format {
        OutputFormat::Srt => {
            let mut out = String::new();
            for (index, cue) in cues.iter().enumerate() {
                out.push_str(&format!(
                    "{}\n{} --> {}\n{}\n\n",
                    index + 1,
                    format_clock(cue.start_ms, ','),
                    format_clock(cue.end_ms, ','),
                    cue.text
                ));
            }
            Ok(out)
        }
        OutputFormat::Tsv => {
            let mut out = String::from("start\tend\ttext\n");
            for cue in &cues {
                out.push_str(&format!("{}\t{}\t{}\n", cue.start_ms, cue.end_ms, cue.text));
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let document = JsonDocument {
                text: cues
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                segments: cues
                    .into_iter()
                    .map(|c| JsonSegment {
                        start: c.start_ms as f64 / 1000.0,
                        end: c.end_ms as f64 / 1000.0,
                        text: c.text,
                    })
                    .collect(),
            };
            serde_json::to_string_pretty(&document)
                .map_err(|e| SgcError::Protocol(format!("failed to encode JSON output: {e}")))
        }
        OutputFormat::Vtt | OutputFormat::Txt => unreachable!("handled above"),
    }
}

/// Write rendered content to a file, or to stdout when the destination is
/// the `-` sentinel.
pub fn write_output(content: &str, destination: &str) -> Result<()> {
    if destination == "-" {
        let stdout = std::io::stdout();
        write_stream(content, &mut stdout.lock())?;
        return Ok(());
    }

    fs_err::write(destination, content)?;
    println!("Transcript saved to {destination}");
    Ok(())
}

/// Stream the content, ensuring a trailing newline.
fn write_stream(content: &str, out: &mut impl std::io::Write) -> Result<()> {
    out.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_VTT: &str = "\
WEBVTT

00:00:01.000 --> 00:00:04.200
Hello there.

00:00:04.200 --> 00:01:02.500
General Kenobi.
";

    #[test]
    fn test_parse_vtt_cues() {
        let cues = parse_vtt(SAMPLE_VTT);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_ms, 1000);
        assert_eq!(cues[0].end_ms, 4200);
        assert_eq!(cues[0].text, "Hello there.");
        assert_eq!(cues[1].end_ms, 62_500);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(parse_timestamp("00:00:01.000"), Some(1000));
        assert_eq!(parse_timestamp("01:02.500"), Some(62_500));
        assert_eq!(parse_timestamp("01:00:00,250"), Some(3_600_250));
        assert_eq!(parse_timestamp("bogus"), None);
    }

    #[test]
    fn test_parse_timestamp_scales_short_fractions() {
        assert_eq!(parse_timestamp("01:02.5"), Some(62_500));
        assert_eq!(parse_timestamp("00:00:01.25"), Some(1250));
        assert_eq!(parse_timestamp("00:00:01.2345"), Some(1234));
    }

    #[test]
    fn test_render_vtt_is_passthrough() {
        assert_eq!(render(SAMPLE_VTT, OutputFormat::Vtt).unwrap(), SAMPLE_VTT);
    }

    #[test]
    fn test_render_txt_strips_timing() {
        let txt = render(SAMPLE_VTT, OutputFormat::Txt).unwrap();
        assert_eq!(txt, "Hello there.\nGeneral Kenobi.");
    }

    #[test]
    fn test_render_txt_passes_plain_text_through() {
        let txt = render("just words, no cues\n", OutputFormat::Txt).unwrap();
        assert_eq!(txt, "just words, no cues");
    }

    #[test]
    fn test_render_srt_renumbers_with_comma_millis() {
        let srt = render(SAMPLE_VTT, OutputFormat::Srt).unwrap();
        assert!(srt.starts_with("1\n00:00:01,000 --> 00:00:04,200\nHello there.\n"));
        assert!(srt.contains("\n2\n00:00:04,200 --> 00:01:02,500\nGeneral Kenobi.\n"));
    }

    #[test]
    fn test_render_tsv() {
        let tsv = render(SAMPLE_VTT, OutputFormat::Tsv).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], "start\tend\ttext");
        assert_eq!(lines[1], "1000\t4200\tHello there.");
    }

    #[test]
    fn test_render_json() {
        let json = render(SAMPLE_VTT, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["segments"][0]["start"], 1.0);
        assert_eq!(value["segments"][1]["text"], "General Kenobi.");
        assert_eq!(value["text"], "Hello there. General Kenobi.");
    }

    #[test]
    fn test_render_srt_without_cues_fails() {
        let err = render("no cues here", OutputFormat::Srt).unwrap_err();
        assert!(matches!(err, SgcError::Validation(_)));
    }

    #[test]
    fn test_write_stream_ensures_trailing_newline() {
        let mut buffer = Vec::new();
        write_stream("hello", &mut buffer).unwrap();
        assert_eq!(buffer, b"hello\n");

        let mut buffer = Vec::new();
        write_stream("hello\n", &mut buffer).unwrap();
        assert_eq!(buffer, b"hello\n");
    }

    #[test]
    fn test_write_output_stdout_sentinel_touches_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.vtt");
        write_output("body", &path.to_string_lossy()).unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "body");

        write_output("body", "-").unwrap();
        assert!(!dir.path().join("-").exists());
        assert!(!std::path::Path::new("-").exists());
    }
}
