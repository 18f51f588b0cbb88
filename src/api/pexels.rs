use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

const SEARCH_URL: &str = "https://api.pexels.com/videos/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<StockVideo>,
}

#[derive(Debug, Deserialize)]
struct StockVideo {
    duration: u32,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    width: Option<u32>,
}

fn best_file_link(video: &StockVideo) -> Option<String> {
    video
        .video_files
        .iter()
        .filter(|f| f.file_type == "video/mp4")
        .max_by_key(|f| f.width.unwrap_or(0))
        .map(|f| f.link.clone())
}

/// Searches stock footage for a single term, keeping clips of at least
/// `min_duration` seconds and the widest MP4 rendition per hit.
pub async fn search_videos(
    client: &Client,
    api_key: &str,
    query: &str,
    per_page: usize,
    min_duration: u32,
) -> Result<Vec<String>> {
    let resp = client
        .get(SEARCH_URL)
        .query(&[("query", query), ("per_page", &per_page.to_string())])
        .header("Authorization", api_key)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .context("Stock footage search request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let raw = resp.text().await.unwrap_or_default();
        if !raw.is_empty() {
            let snippet = raw.chars().take(400).collect::<String>();
            warn!("Pexels raw body: {}", snippet);
        }
        anyhow::bail!("Stock footage search failed with HTTP {}", status.as_u16());
    }

    let parsed: SearchResponse = resp.json().await.context("Stock footage response parse failed")?;

    let mut urls = Vec::new();
    for video in &parsed.videos {
        if video.duration < min_duration {
            continue;
        }
        if let Some(link) = best_file_link(video) {
            urls.push(link);
        }
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_widest_mp4_rendition() {
        let video = StockVideo {
            duration: 15,
            video_files: vec![
                VideoFile {
                    link: "https://example.com/sd.mp4".into(),
                    file_type: "video/mp4".into(),
                    width: Some(640),
                },
                VideoFile {
                    link: "https://example.com/hls.m3u8".into(),
                    file_type: "application/x-mpegURL".into(),
                    width: Some(3840),
                },
                VideoFile {
                    link: "https://example.com/hd.mp4".into(),
                    file_type: "video/mp4".into(),
                    width: Some(1920),
                },
            ],
        };
        assert_eq!(best_file_link(&video).as_deref(), Some("https://example.com/hd.mp4"));
    }

    #[test]
    fn no_mp4_renditions_yields_none() {
        let video = StockVideo {
            duration: 15,
            video_files: vec![VideoFile {
                link: "https://example.com/hls.m3u8".into(),
                file_type: "application/x-mpegURL".into(),
                width: Some(1920),
            }],
        };
        assert!(best_file_link(&video).is_none());
    }
}
