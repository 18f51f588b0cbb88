use crate::api::{openai, youtube};
use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg;
use crate::footage;
use crate::music;
use crate::narration;
use crate::progress::GenerationStatus;
use crate::server::{AppState, GenerateRequest};
use crate::subtitles;
use crate::video;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Runs one end-to-end generation, then tears down the per-generation
/// scratch directories no matter how the pipeline exited.
pub async fn run_generation(
    state: &AppState,
    generation_id: Uuid,
    req: &GenerateRequest,
    cancel: &CancellationToken,
) -> PipelineResult<String> {
    let temp_dir = PathBuf::from(format!("temp/{generation_id}"));
    let subtitles_dir = PathBuf::from(format!("subtitles/{generation_id}"));
    fs::create_dir_all(&temp_dir).await.map_err(anyhow::Error::from)?;
    fs::create_dir_all(&subtitles_dir).await.map_err(anyhow::Error::from)?;

    let result = generate_inner(state, generation_id, req, cancel, &temp_dir, &subtitles_dir).await;

    let temp_cleaned = cleanup_directory(&temp_dir).await;
    let subtitles_cleaned = cleanup_directory(&subtitles_dir).await;
    if temp_cleaned && subtitles_cleaned {
        info!("Cleaned up temporary files for generation {}", generation_id);
    } else {
        warn!("Error cleaning up temporary files for generation {}", generation_id);
    }

    result
}

async fn generate_inner(
    state: &AppState,
    generation_id: Uuid,
    req: &GenerateRequest,
    cancel: &CancellationToken,
    temp_dir: &Path,
    subtitles_dir: &Path,
) -> PipelineResult<String> {
    let progress = &state.progress;
    let client = &state.client;
    let cfg = state.config.as_ref();

    progress.update(generation_id, GenerationStatus::Started, 5, "Starting video generation...");

    if req.use_music {
        let zip_url = req.zip_url.as_deref().unwrap_or(music::DEFAULT_SONGS_ZIP_URL);
        music::fetch_songs(client, zip_url).await?;
    }

    info!("[Video to be generated]");
    info!("   Subject: {}", req.video_subject);
    info!("   AI Model: {}", req.ai_model);
    info!("   Custom Prompt: {}", req.custom_prompt);

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let voice = req.voice();
    let voice_prefix: String = voice.chars().take(2).collect();

    progress.update(generation_id, GenerationStatus::Processing, 10, "Generating script...");
    let script = openai::generate_script(
        client,
        cfg,
        &req.video_subject,
        req.paragraph_number,
        &req.ai_model,
        &req.custom_prompt,
    )
    .await?;
    info!("Script generated!");

    progress.update(generation_id, GenerationStatus::Processing, 20, "Generating search terms...");
    let search_terms = openai::get_search_terms(
        client,
        cfg,
        &req.video_subject,
        footage::STOCK_VIDEO_COUNT,
        &script,
        &req.ai_model,
    )
    .await?;

    // One accepted URL per term at most, de-duplicated across terms.
    let mut video_urls: Vec<String> = Vec::new();
    for search_term in &search_terms {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let found_urls = match footage::search_stock_videos(client, &cfg.pexels_key, search_term).await {
            Ok(urls) => urls,
            Err(err) => {
                warn!("Stock search failed for \"{}\": {:#}", search_term, err);
                continue;
            }
        };
        for url in found_urls {
            if !video_urls.contains(&url) {
                video_urls.push(url);
                break;
            }
        }
    }

    if video_urls.is_empty() {
        return Err(PipelineError::NoFootage);
    }

    progress.update(
        generation_id,
        GenerationStatus::Processing,
        40,
        &format!("Downloading {} videos...", video_urls.len()),
    );

    let mut video_paths: Vec<PathBuf> = Vec::new();
    for video_url in &video_urls {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        match footage::save_video(client, video_url, temp_dir).await {
            Ok(path) => video_paths.push(path),
            Err(err) => warn!("Could not download video: {} ({:#})", video_url, err),
        }
    }
    info!("Videos downloaded!");

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let sentences = narration::split_sentences(&script);

    progress.update(generation_id, GenerationStatus::Processing, 50, "Generating audio...");
    let (segments, narration_path) =
        narration::synthesize(client, cfg, &sentences, voice, temp_dir).await?;

    progress.update(generation_id, GenerationStatus::Processing, 60, "Generating subtitles...");
    let subtitles_path = match subtitles::generate_subtitles(
        client,
        cfg,
        &narration_path,
        &sentences,
        &segments,
        &voice_prefix,
        subtitles_dir,
    )
    .await
    {
        Ok(path) => Some(path),
        Err(err) => {
            warn!("Error generating subtitles: {:#}", err);
            None
        }
    };

    let narration_duration = ffmpeg::ffprobe_duration_seconds(&narration_path)
        .await
        .context("narration track duration")?;

    let combined_video_path = video::combine(
        &video_paths,
        narration_duration,
        video::MAX_CLIP_DURATION,
        req.threads,
        temp_dir,
    )
    .await?;

    progress.update(generation_id, GenerationStatus::Processing, 80, "Adding subtitles and audio...");
    let (final_video_name, video_id) = video::render(
        &combined_video_path,
        &narration_path,
        subtitles_path.as_deref(),
        req.threads,
        &req.subtitles_position,
        &req.color,
    )
    .await?;

    let metadata = openai::generate_metadata(client, cfg, &req.video_subject, &script, &req.ai_model).await?;
    video::write_video_metadata(&video_id, &metadata).await?;

    let final_video_path = Path::new(video::FINAL_VIDEOS_DIR).join(&final_video_name);

    if req.use_music {
        progress.update(generation_id, GenerationStatus::Processing, 90, "Adding background music...");
        let song_path = music::choose_random_song().await?;
        video::mix_music(&final_video_path, &song_path, req.threads).await?;
    }

    if req.automate_youtube_upload {
        match &state.config.youtube_client_secret_file {
            Some(secret_file) if Path::new(secret_file).exists() => {
                progress.update(generation_id, GenerationStatus::Processing, 95, "Uploading video...");
                youtube::upload_video(
                    client,
                    Path::new(secret_file),
                    &final_video_path,
                    &metadata.title,
                    &metadata.description,
                    &metadata.tags,
                )
                .await;
            }
            _ => {
                warn!("Client secrets file missing. YouTube upload will be skipped.");
            }
        }
    }

    Ok(final_video_name)
}

/// Best-effort contents-first removal of a scratch directory.
async fn cleanup_directory(dir_path: &Path) -> bool {
    if fs::metadata(dir_path).await.map(|m| m.is_dir()).unwrap_or(false) {
        for entry in WalkDir::new(dir_path).min_depth(1).contents_first(true) {
            let Ok(entry) = entry else {
                return false;
            };
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir(path).await.ok();
            } else {
                fs::remove_file(path).await.ok();
            }
        }
        return fs::remove_dir(dir_path).await.is_ok();
    }
    true
}
