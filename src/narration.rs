use crate::api::tiktok;
use crate::config::Config;
use crate::ffmpeg;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// One synthesized speech clip for a single script sentence. Segment order
/// matches sentence order; subtitle timing depends on it.
#[derive(Debug, Clone)]
pub struct NarrationSegment {
    pub path: PathBuf,
    pub duration: f64,
}

/// Splits the script on the sentence delimiter and drops empties.
pub fn split_sentences(script: &str) -> Vec<String> {
    script
        .split(". ")
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Synthesizes one audio segment per sentence and concatenates them, in
/// order, into a single narration track. Any TTS failure propagates; per
/// sentence retries are deliberately absent.
pub async fn synthesize(
    client: &Client,
    cfg: &Config,
    sentences: &[String],
    voice: &str,
    temp_dir: &Path,
) -> Result<(Vec<NarrationSegment>, PathBuf)> {
    let mut segments = Vec::with_capacity(sentences.len());

    for sentence in sentences {
        let segment_path = temp_dir.join(format!("{}.mp3", Uuid::new_v4()));
        tiktok::tts(client, cfg, sentence, voice, &segment_path).await?;

        let duration = ffmpeg::ffprobe_duration_seconds(&segment_path)
            .await
            .with_context(|| format!("narration segment duration: {}", segment_path.display()))?;

        segments.push(NarrationSegment {
            path: segment_path,
            duration,
        });
    }

    let concat_list_path = temp_dir.join("narration_concat_list.txt");
    let mut listf = fs::File::create(&concat_list_path).await?;
    for segment in &segments {
        let name = segment
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .context("narration segment has no file name")?;
        listf.write_all(format!("file '{}'\n", name).as_bytes()).await?;
    }
    listf.flush().await?;

    let track_path = temp_dir.join(format!("{}.mp3", Uuid::new_v4()));
    ffmpeg::ffmpeg_concat_audio(&concat_list_path, &track_path).await?;

    info!("Narration synthesized: {} segments -> {}", segments.len(), track_path.display());
    Ok((segments, track_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_sentence_delimiter() {
        let script = "Cats are great. They sleep a lot. Everyone loves them";
        let sentences = split_sentences(script);
        assert_eq!(
            sentences,
            vec!["Cats are great", "They sleep a lot", "Everyone loves them"]
        );
    }

    #[test]
    fn drops_empty_fragments() {
        let sentences = split_sentences(". Leading fragment. ");
        assert_eq!(sentences, vec!["Leading fragment"]);

        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn single_sentence_passes_through() {
        assert_eq!(split_sentences("No delimiter here"), vec!["No delimiter here"]);
    }
}
