use crate::api::assemblyai;
use crate::config::Config;
use crate::narration::NarrationSegment;
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

/// Maximum characters per displayed caption line after re-flow.
pub const MAX_LINE_CHARS: usize = 10;

/// The transcription provider speaks different language codes than the TTS
/// voices; Indonesian is not offered at all, so it falls back to English.
pub fn map_language_code(voice_prefix: &str) -> &str {
    match voice_prefix {
        "br" => "pt",
        "id" => "en",
        "jp" => "ja",
        "kr" => "ko",
        other => other,
    }
}

/// Renders an offset as `H:MM:SS`, with the
/// fractional part appended only when present, trailing zeros stripped and
/// the decimal point swapped for a comma. A zero offset is the fixed
/// literal `0:00:00,0`.
pub fn srt_timestamp(total_seconds: f64) -> String {
    if total_seconds == 0.0 {
        return "0:00:00,0".to_string();
    }

    let total_micros = (total_seconds * 1_000_000.0).round() as u64;
    let micros = total_micros % 1_000_000;
    let secs = total_micros / 1_000_000;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    let mut out = if micros > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}.{micros:06}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    };
    while out.ends_with('0') {
        out.pop();
    }
    out.replace('.', ",")
}

fn parse_timestamp(ts: &str) -> Option<f64> {
    let (hms, frac) = match ts.trim().split_once(',') {
        Some((a, b)) => (a, Some(b)),
        None => (ts.trim(), None),
    };

    let mut parts = hms.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds_raw = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }

    // Without a fraction the renderer may have stripped trailing zeros off
    // the seconds field ("0:00:1" means 10 s, "0:01:" means exactly one
    // minute). Pad it back to two digits before reading it.
    let seconds: f64 = match frac {
        None => format!("{seconds_raw:0<2}").parse().ok()?,
        Some(_) => seconds_raw.parse().ok()?,
    };

    let fraction = match frac {
        Some(f) if !f.trim().is_empty() => format!("0.{}", f.trim()).parse().ok()?,
        _ => 0.0,
    };

    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

/// Walks sentences and their segment durations in lockstep; every caption
/// entry is contiguous with the previous one.
pub fn build_local_srt(sentences: &[String], segments: &[NarrationSegment]) -> String {
    let mut start_time = 0.0;
    let mut entries = Vec::new();

    for (i, (sentence, segment)) in sentences.iter().zip(segments).enumerate() {
        let end_time = start_time + segment.duration;
        entries.push(format!(
            "{}\n{} --> {}\n{}\n",
            i + 1,
            srt_timestamp(start_time),
            srt_timestamp(end_time),
            sentence
        ));
        start_time = end_time;
    }

    entries.join("\n")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SrtEntry {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

fn timing_regex() -> &'static Regex {
    static TIMING_RE: OnceCell<Regex> = OnceCell::new();
    TIMING_RE.get_or_init(|| Regex::new(r"^(.+?)\s*-->\s*(.+)$").unwrap())
}

pub fn parse_srt(text: &str) -> Vec<SrtEntry> {
    let normalized = text.replace("\r\n", "\n");
    let mut entries = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().collect();
        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };
        let Some(caps) = timing_regex().captures(lines[timing_idx]) else {
            continue;
        };
        let (Some(start), Some(end)) = (parse_timestamp(&caps[1]), parse_timestamp(&caps[2])) else {
            continue;
        };

        let text = lines[timing_idx + 1..].join(" ").trim().to_string();
        if text.is_empty() {
            continue;
        }
        entries.push(SrtEntry { start, end, text });
    }

    entries
}

pub fn render_srt(entries: &[SrtEntry]) -> String {
    let mut out = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        out.push(format!(
            "{}\n{} --> {}\n{}\n",
            i + 1,
            srt_timestamp(entry.start),
            srt_timestamp(entry.end),
            entry.text
        ));
    }
    out.join("\n")
}

/// Greedy word wrap. A single word longer than the limit becomes its own
/// line rather than being split mid-word.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Splits oversized entries into shorter ones, apportioning each entry's
/// span across the new lines proportionally to their length. Total duration
/// coverage is unchanged.
pub fn equalize_entries(entries: &[SrtEntry], max_chars: usize) -> Vec<SrtEntry> {
    let mut out = Vec::new();

    for entry in entries {
        let lines = wrap_text(&entry.text, max_chars);
        if lines.len() <= 1 {
            out.push(entry.clone());
            continue;
        }

        let total_chars: usize = lines.iter().map(|l| l.chars().count()).sum();
        let span = entry.end - entry.start;
        let mut cursor = entry.start;

        for (i, line) in lines.iter().enumerate() {
            let end = if i == lines.len() - 1 {
                entry.end
            } else {
                cursor + span * (line.chars().count() as f64 / total_chars as f64)
            };
            out.push(SrtEntry {
                start: cursor,
                end,
                text: line.clone(),
            });
            cursor = end;
        }
    }

    out
}

/// Rewrites the caption file in place with the line-length limit enforced.
pub async fn equalize_srt_file(path: &Path, max_chars: usize) -> Result<()> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("read subtitles: {}", path.display()))?;

    let entries = parse_srt(&raw);
    let equalized = equalize_entries(&entries, max_chars);
    fs::write(path, render_srt(&equalized))
        .await
        .with_context(|| format!("write subtitles: {}", path.display()))?;
    Ok(())
}

/// Builds the caption file for a generation, remotely when a transcription
/// credential is configured and locally otherwise. Callers treat any error
/// here as "no subtitles", not as a failed generation.
pub async fn generate_subtitles(
    client: &Client,
    cfg: &Config,
    audio_path: &Path,
    sentences: &[String],
    segments: &[NarrationSegment],
    voice_prefix: &str,
    subtitles_dir: &Path,
) -> Result<PathBuf> {
    let subtitles_path = subtitles_dir.join(format!("{}.srt", Uuid::new_v4()));

    let subtitles = match &cfg.assemblyai_key {
        Some(api_key) => {
            info!("Creating subtitles using the transcription service");
            let language_code = map_language_code(voice_prefix);
            assemblyai::transcribe_to_srt(client, api_key, audio_path, language_code).await?
        }
        None => {
            info!("Creating subtitles locally");
            build_local_srt(sentences, segments)
        }
    };

    fs::write(&subtitles_path, subtitles)
        .await
        .with_context(|| format!("write subtitles: {}", subtitles_path.display()))?;

    equalize_srt_file(&subtitles_path, MAX_LINE_CHARS).await?;

    info!("Subtitles generated: {}", subtitles_path.display());
    Ok(subtitles_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn segment(duration: f64) -> NarrationSegment {
        NarrationSegment {
            path: PathBuf::from("unused.mp3"),
            duration,
        }
    }

    #[test]
    fn zero_offset_renders_fixed_literal() {
        assert_eq!(srt_timestamp(0.0), "0:00:00,0");
    }

    #[test]
    fn fractional_offsets_strip_trailing_zeros() {
        assert_eq!(srt_timestamp(1.5), "0:00:01,5");
        assert_eq!(srt_timestamp(62.25), "0:01:02,25");
        assert_eq!(srt_timestamp(3661.125), "1:01:01,125");
    }

    #[test]
    fn parse_accepts_both_timestamp_shapes() {
        assert_eq!(parse_timestamp("0:00:01,5"), Some(1.5));
        assert_eq!(parse_timestamp("00:01:02,250"), Some(62.25));
        assert_eq!(parse_timestamp("0:00:10"), Some(10.0));
        assert_eq!(parse_timestamp("nonsense"), None);
    }

    #[test]
    fn parse_inverts_stripped_whole_second_timestamps() {
        assert_eq!(srt_timestamp(10.0), "0:00:1");
        assert_eq!(parse_timestamp("0:00:1"), Some(10.0));
        assert_eq!(srt_timestamp(60.0), "0:01:");
        assert_eq!(parse_timestamp("0:01:"), Some(60.0));

        for offset in [4.0, 10.0, 60.0, 600.0, 3661.125] {
            assert_eq!(parse_timestamp(&srt_timestamp(offset)), Some(offset));
        }
    }

    #[test]
    fn local_entries_match_sentence_count_and_are_contiguous() {
        let sentences = vec![
            "Cats are great".to_string(),
            "They sleep a lot".to_string(),
            "Everyone loves them".to_string(),
        ];
        let segments = vec![segment(1.5), segment(2.25), segment(0.75)];

        let srt = build_local_srt(&sentences, &segments);
        let entries = parse_srt(&srt);

        assert_eq!(entries.len(), sentences.len());
        assert_eq!(entries[0].start, 0.0);
        for pair in entries.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-6);
        }
        assert!((entries[2].end - 4.5).abs() < 1e-6);
    }

    #[test]
    fn wrap_respects_line_limit() {
        let lines = wrap_text("cats sleep all day long", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "cats sleep all day long");
    }

    #[test]
    fn oversized_word_becomes_its_own_line() {
        let lines = wrap_text("extraordinarily big", 10);
        assert_eq!(lines, vec!["extraordinarily", "big"]);
    }

    #[test]
    fn equalize_preserves_total_coverage() {
        let entries = vec![SrtEntry {
            start: 2.0,
            end: 6.0,
            text: "cats sleep all day long".to_string(),
        }];

        let equalized = equalize_entries(&entries, 10);
        assert!(equalized.len() > 1);
        assert_eq!(equalized.first().unwrap().start, 2.0);
        assert_eq!(equalized.last().unwrap().end, 6.0);
        for pair in equalized.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-9);
        }
        assert!(equalized.iter().all(|e| e.text.chars().count() <= 10));
    }

    #[test]
    fn short_entries_pass_through_unchanged() {
        let entries = vec![SrtEntry {
            start: 0.0,
            end: 1.0,
            text: "short".to_string(),
        }];
        assert_eq!(equalize_entries(&entries, 10), entries);
    }

    #[test]
    fn language_mapping_covers_provider_gaps() {
        assert_eq!(map_language_code("br"), "pt");
        assert_eq!(map_language_code("id"), "en");
        assert_eq!(map_language_code("jp"), "ja");
        assert_eq!(map_language_code("kr"), "ko");
        assert_eq!(map_language_code("en"), "en");
        assert_eq!(map_language_code("de"), "de");
    }

    #[tokio::test]
    async fn equalize_file_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.srt");
        let entries = vec![SrtEntry {
            start: 0.0,
            end: 4.0,
            text: "cats sleep all day long".to_string(),
        }];
        tokio::fs::write(&path, render_srt(&entries)).await.unwrap();

        equalize_srt_file(&path, 10).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let reparsed = parse_srt(&raw);
        assert!(reparsed.len() > 1);
        assert_eq!(reparsed.first().unwrap().start, 0.0);
        assert!((reparsed.last().unwrap().end - 4.0).abs() < 1e-6);
        assert!(reparsed.iter().all(|e| e.text.chars().count() <= 10));
    }

    #[tokio::test]
    async fn equalize_file_keeps_whole_second_boundaries_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captions.srt");
        let entries = vec![
            SrtEntry {
                start: 0.0,
                end: 4.0,
                text: "cats sleep all day".to_string(),
            },
            SrtEntry {
                start: 4.0,
                end: 10.0,
                text: "and dream about sunny windows".to_string(),
            },
            SrtEntry {
                start: 10.0,
                end: 60.0,
                text: "purring".to_string(),
            },
        ];
        tokio::fs::write(&path, render_srt(&entries)).await.unwrap();

        equalize_srt_file(&path, 10).await.unwrap();

        let reparsed = parse_srt(&tokio::fs::read_to_string(&path).await.unwrap());
        assert_eq!(
            reparsed.iter().map(|e| e.text.as_str()).collect::<Vec<_>>().join(" "),
            "cats sleep all day and dream about sunny windows purring"
        );
        assert!(reparsed.iter().all(|e| e.end >= e.start));
        for pair in reparsed.windows(2) {
            assert!(pair[1].start >= pair[0].start);
            assert!((pair[0].end - pair[1].start).abs() < 1e-3);
        }
        assert_eq!(reparsed.first().unwrap().start, 0.0);
        assert!((reparsed.last().unwrap().end - 60.0).abs() < 1e-6);
    }

    #[test]
    fn parse_render_round_trip_keeps_entries() {
        let entries = vec![
            SrtEntry {
                start: 0.0,
                end: 1.5,
                text: "first".to_string(),
            },
            SrtEntry {
                start: 1.5,
                end: 3.0,
                text: "second".to_string(),
            },
        ];
        let parsed = parse_srt(&render_srt(&entries));
        assert_eq!(parsed, entries);
    }
}
