use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";

// Science & Technology.
const VIDEO_CATEGORY_ID: &str = "28";
const PRIVACY_STATUS: &str = "private";

/// Pre-authorized OAuth credentials. The refresh token must have been
/// granted the youtube.upload scope out of band.
#[derive(Debug, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

async fn fetch_access_token(client: &Client, secret: &ClientSecret) -> Result<String> {
    let resp: serde_json::Value = client
        .post(TOKEN_URL)
        .form(&[
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("refresh_token", secret.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .context("OAuth token request failed")?
        .error_for_status()
        .context("OAuth token request rejected")?
        .json()
        .await?;

    resp.get("access_token")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .context("OAuth token response missing access_token")
}

async fn upload_inner(
    client: &Client,
    secret_path: &Path,
    video_path: &Path,
    title: &str,
    description: &str,
    tags: &[String],
) -> Result<String> {
    let secret_raw = fs::read_to_string(secret_path)
        .await
        .with_context(|| format!("read client secret: {}", secret_path.display()))?;
    let secret: ClientSecret =
        serde_json::from_str(&secret_raw).context("client secret file parse failed")?;

    let access_token = fetch_access_token(client, &secret).await?;

    let metadata = json!({
        "snippet": {
            "title": title,
            "description": description,
            "tags": tags,
            "categoryId": VIDEO_CATEGORY_ID,
        },
        "status": {
            "privacyStatus": PRIVACY_STATUS,
        },
    });

    let session = client
        .post(UPLOAD_URL)
        .bearer_auth(&access_token)
        .json(&metadata)
        .timeout(Duration::from_secs(60))
        .send()
        .await
        .context("Upload session request failed")?
        .error_for_status()
        .context("Upload session rejected")?;

    let session_url = session
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .context("Upload session response missing location header")?
        .to_string();

    let video_bytes = fs::read(video_path)
        .await
        .with_context(|| format!("read final video: {}", video_path.display()))?;

    let resp: serde_json::Value = client
        .put(&session_url)
        .bearer_auth(&access_token)
        .header("Content-Type", "video/mp4")
        .body(video_bytes)
        .timeout(Duration::from_secs(1800))
        .send()
        .await
        .context("Video upload failed")?
        .error_for_status()
        .context("Video upload rejected")?
        .json()
        .await?;

    resp.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .context("Upload response missing video id")
}

/// Uploads the finished video. Upload problems never fail the generation;
/// they are logged and swallowed here.
pub async fn upload_video(
    client: &Client,
    secret_path: &Path,
    video_path: &Path,
    title: &str,
    description: &str,
    tags: &[String],
) -> Option<String> {
    match upload_inner(client, secret_path, video_path, title, description, tags).await {
        Ok(id) => {
            info!("Uploaded video ID: {}", id);
            Some(id)
        }
        Err(err) => {
            warn!("YouTube upload failed: {:#}", err);
            None
        }
    }
}
