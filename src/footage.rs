use crate::api::pexels;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// How many search terms the script is distilled into.
pub const STOCK_VIDEO_COUNT: usize = 5;

/// Results requested from the provider per search term.
pub const RESULTS_PER_QUERY: usize = 15;

/// Minimum length of a usable stock clip, in seconds.
pub const MIN_CLIP_DURATION: u32 = 10;

/// Candidate clip URLs for one search term. A term with no usable results
/// contributes nothing; the caller decides whether the aggregate is empty.
pub async fn search_stock_videos(
    client: &Client,
    api_key: &str,
    search_term: &str,
) -> Result<Vec<String>> {
    pexels::search_videos(client, api_key, search_term, RESULTS_PER_QUERY, MIN_CLIP_DURATION).await
}

/// Downloads one clip into the generation's working directory.
pub async fn save_video(client: &Client, video_url: &str, directory: &Path) -> Result<PathBuf> {
    let video_path = directory.join(format!("{}.mp4", Uuid::new_v4()));

    let resp = client
        .get(video_url)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("Video download request failed")?
        .error_for_status()
        .context("Video download rejected")?;

    let bytes = resp.bytes().await.context("Video download read failed")?;
    fs::write(&video_path, &bytes)
        .await
        .with_context(|| format!("write clip: {}", video_path.display()))?;

    Ok(video_path)
}
