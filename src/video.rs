use crate::api::openai::VideoMetadata;
use crate::ffmpeg;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

pub const FINAL_VIDEOS_DIR: &str = "final_videos";

/// Each selected segment is capped at this many seconds.
pub const MAX_CLIP_DURATION: f64 = 5.0;

/// One slice of the clip rotation: which source clip and how much of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSelection {
    pub index: usize,
    pub duration: f64,
}

/// Cycles through the clip list, wrapping back to the first clip, until the
/// cumulative selected duration covers `target_duration`. Per-clip target is
/// an even share of the total; the remaining budget and the hard per-segment
/// cap both shorten a selection.
pub fn plan_clip_selection(
    durations: &[f64],
    target_duration: f64,
    max_clip_duration: f64,
) -> Result<Vec<ClipSelection>> {
    if durations.is_empty() {
        anyhow::bail!("No clips available to combine");
    }
    if durations.iter().any(|d| *d <= 0.0) {
        anyhow::bail!("Clip with non-positive duration");
    }

    let req_dur = target_duration / durations.len() as f64;
    let mut selections = Vec::new();
    let mut tot_dur = 0.0;

    'outer: while tot_dur < target_duration {
        for (index, clip_dur) in durations.iter().enumerate() {
            let remaining = target_duration - tot_dur;
            let mut take = if remaining < *clip_dur {
                remaining
            } else if req_dur < *clip_dur {
                req_dur
            } else {
                *clip_dur
            };
            if take > max_clip_duration {
                take = max_clip_duration;
            }

            selections.push(ClipSelection {
                index,
                duration: take,
            });
            tot_dur += take;

            if tot_dur >= target_duration {
                break 'outer;
            }
        }
    }

    Ok(selections)
}

/// Builds one silent 1080x1920 30 fps video covering the narration duration
/// out of the downloaded clips. A missing source file is fatal.
pub async fn combine(
    clip_paths: &[PathBuf],
    target_duration: f64,
    max_clip_duration: f64,
    threads: u32,
    work_dir: &Path,
) -> Result<PathBuf> {
    let mut durations = Vec::with_capacity(clip_paths.len());
    for path in clip_paths {
        if fs::metadata(path).await.is_err() {
            anyhow::bail!("Input video not found: {}", path.display());
        }
        durations.push(ffmpeg::ffprobe_duration_seconds(path).await?);
    }

    let selections = plan_clip_selection(&durations, target_duration, max_clip_duration)?;
    info!(
        "Combining videos: {} segments from {} clips to cover {:.2}s",
        selections.len(),
        clip_paths.len(),
        target_duration
    );

    let mut dimension_cache: HashMap<usize, (i32, i32)> = HashMap::new();
    let concat_list_path = work_dir.join("combine_concat_list.txt");
    let mut listf = fs::File::create(&concat_list_path).await?;

    for (seg_index, selection) in selections.iter().enumerate() {
        let source = &clip_paths[selection.index];
        let (w, h) = match dimension_cache.get(&selection.index) {
            Some(dims) => *dims,
            None => {
                let dims = ffmpeg::ffprobe_video_dimensions(source).await?;
                dimension_cache.insert(selection.index, dims);
                dims
            }
        };

        let part_name = format!("part_{seg_index}.mp4");
        let part_path = work_dir.join(&part_name);
        ffmpeg::ffmpeg_extract_segment(
            source,
            selection.duration,
            ffmpeg::crop_rect(w, h),
            threads,
            &part_path,
        )
        .await
        .with_context(|| format!("segment {seg_index} from {}", source.display()))?;

        listf.write_all(format!("file '{}'\n", part_name).as_bytes()).await?;
    }
    listf.flush().await?;

    let combined_path = work_dir.join(format!("{}.mp4", Uuid::new_v4()));
    ffmpeg::ffmpeg_concat_videos(&concat_list_path, threads, &combined_path).await?;

    info!("Combined video saved at: {}", combined_path.display());
    Ok(combined_path)
}

/// Overlays captions and narration onto the combined video and encodes the
/// final artifact. Returns the filename and the shared identifier stem used
/// for the metadata file.
pub async fn render(
    combined_video_path: &Path,
    narration_path: &Path,
    subtitles_path: Option<&Path>,
    threads: u32,
    subtitles_position: &str,
    text_color: &str,
) -> Result<(String, String)> {
    let narration_duration = ffmpeg::ffprobe_duration_seconds(narration_path).await?;

    fs::create_dir_all(FINAL_VIDEOS_DIR).await?;
    let final_video_id = Uuid::new_v4().to_string();
    let final_video_name = format!("{final_video_id}.mp4");
    let output_path = Path::new(FINAL_VIDEOS_DIR).join(&final_video_name);

    ffmpeg::ffmpeg_render_final(
        combined_video_path,
        narration_path,
        subtitles_path,
        narration_duration,
        threads,
        subtitles_position,
        text_color,
        &output_path,
    )
    .await
    .context("final render failed")?;

    Ok((final_video_name, final_video_id))
}

/// Rewrites the finished video in place with the song mixed underneath at
/// 10% volume. Duration and frame rate are pinned to the pre-mix values.
pub async fn mix_music(final_video_path: &Path, song_path: &Path, threads: u32) -> Result<()> {
    let original_duration = ffmpeg::ffprobe_duration_seconds(final_video_path).await?;

    let tmp_path = final_video_path.with_extension("mix.mp4");
    ffmpeg::ffmpeg_mix_music(final_video_path, song_path, original_duration, threads, &tmp_path)
        .await
        .context("music mix failed")?;

    fs::rename(&tmp_path, final_video_path)
        .await
        .with_context(|| format!("replace mixed video: {}", final_video_path.display()))?;
    Ok(())
}

pub fn format_metadata_content(metadata: &VideoMetadata) -> String {
    let tags_string = metadata
        .tags
        .iter()
        .map(|tag| tag.trim_start_matches('#'))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Title: {}\n\nDescription:\n{}\n\nTags:\n{}",
        metadata.title, metadata.description, tags_string
    )
}

/// Persists the metadata bundle next to the final video, sharing its
/// identifier stem. Failure here fails the generation.
pub async fn write_video_metadata(video_id: &str, metadata: &VideoMetadata) -> Result<PathBuf> {
    fs::create_dir_all(FINAL_VIDEOS_DIR).await?;
    let metadata_path = Path::new(FINAL_VIDEOS_DIR).join(format!("{video_id}.txt"));

    if let Err(err) = fs::write(&metadata_path, format_metadata_content(metadata)).await {
        error!("Error saving metadata: {}", err);
        return Err(err).with_context(|| format!("write metadata: {}", metadata_path.display()));
    }

    info!("Metadata saved at: {}", metadata_path.display());
    Ok(metadata_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(selections: &[ClipSelection]) -> f64 {
        selections.iter().map(|s| s.duration).sum()
    }

    #[test]
    fn selection_covers_target_exactly_when_uncapped() {
        // per-clip target is 4s, then the remaining-budget trim wins
        let selections = plan_clip_selection(&[10.0, 10.0, 10.0], 12.0, 100.0).unwrap();
        assert!((total(&selections) - 12.0).abs() < 1e-9);
        assert_eq!(selections.len(), 2);
        assert!((selections[0].duration - 4.0).abs() < 1e-9);
        assert!((selections[1].duration - 8.0).abs() < 1e-9);
    }

    #[test]
    fn selection_cycles_back_to_first_clip() {
        let selections = plan_clip_selection(&[2.0, 2.0], 7.0, 100.0).unwrap();
        let indices: Vec<usize> = selections.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1]);
        assert!(total(&selections) >= 7.0);
    }

    #[test]
    fn remaining_budget_trims_final_slice() {
        let selections = plan_clip_selection(&[10.0], 3.5, 100.0).unwrap();
        assert_eq!(selections.len(), 1);
        assert!((selections[0].duration - 3.5).abs() < 1e-9);
    }

    #[test]
    fn per_segment_cap_applies() {
        let selections = plan_clip_selection(&[30.0, 30.0], 40.0, 5.0).unwrap();
        assert!(selections.iter().all(|s| s.duration <= 5.0 + 1e-9));
        assert!(total(&selections) >= 40.0 - 1e-9);
    }

    #[test]
    fn short_clips_are_used_whole() {
        // per-clip target 6s exceeds each clip, so full clips are taken
        let selections = plan_clip_selection(&[3.0, 3.0], 12.0, 100.0).unwrap();
        assert_eq!(selections.len(), 4);
        assert!(selections.iter().all(|s| (s.duration - 3.0).abs() < 1e-9));
    }

    #[test]
    fn empty_or_degenerate_input_is_rejected() {
        assert!(plan_clip_selection(&[], 10.0, 5.0).is_err());
        assert!(plan_clip_selection(&[4.0, 0.0], 10.0, 5.0).is_err());
    }

    #[test]
    fn metadata_content_has_expected_sections() {
        let metadata = VideoMetadata {
            title: "Why cats rule".to_string(),
            description: "A short video about cats.".to_string(),
            tags: vec!["#cats".to_string(), "pets".to_string(), "#funny".to_string()],
        };
        let content = format_metadata_content(&metadata);
        assert!(content.starts_with("Title: Why cats rule\n\n"));
        assert!(content.contains("Description:\nA short video about cats."));
        assert!(content.ends_with("Tags:\ncats, pets, funny"));
    }
}
