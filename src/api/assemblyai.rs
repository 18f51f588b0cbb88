use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const UPLOAD_URL: &str = "https://api.assemblyai.com/v2/upload";
const TRANSCRIPT_URL: &str = "https://api.assemblyai.com/v2/transcript";

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const MAX_POLLS: usize = 200;

/// Uploads the narration track, waits for the transcript and returns the
/// provider's ready-made SRT text.
pub async fn transcribe_to_srt(
    client: &Client,
    api_key: &str,
    audio_path: &Path,
    language_code: &str,
) -> Result<String> {
    let audio = fs::read(audio_path)
        .await
        .with_context(|| format!("read narration audio: {}", audio_path.display()))?;

    let upload_resp: serde_json::Value = client
        .post(UPLOAD_URL)
        .header("authorization", api_key)
        .body(audio)
        .timeout(Duration::from_secs(300))
        .send()
        .await
        .context("Transcription upload failed")?
        .error_for_status()
        .context("Transcription upload rejected")?
        .json()
        .await?;

    let upload_url = upload_resp
        .get("upload_url")
        .and_then(|v| v.as_str())
        .context("Transcription upload response missing upload_url")?;

    let create_resp: serde_json::Value = client
        .post(TRANSCRIPT_URL)
        .header("authorization", api_key)
        .json(&json!({
            "audio_url": upload_url,
            "language_code": language_code,
        }))
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .context("Transcript request failed")?
        .error_for_status()
        .context("Transcript request rejected")?
        .json()
        .await?;

    let transcript_id = create_resp
        .get("id")
        .and_then(|v| v.as_str())
        .context("Transcript response missing id")?
        .to_string();

    for _ in 0..MAX_POLLS {
        tokio::time::sleep(POLL_INTERVAL).await;

        let poll: serde_json::Value = client
            .get(format!("{TRANSCRIPT_URL}/{transcript_id}"))
            .header("authorization", api_key)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("Transcript poll failed")?
            .json()
            .await?;

        match poll.get("status").and_then(|v| v.as_str()) {
            Some("completed") => {
                let srt = client
                    .get(format!("{TRANSCRIPT_URL}/{transcript_id}/srt"))
                    .header("authorization", api_key)
                    .timeout(Duration::from_secs(30))
                    .send()
                    .await
                    .context("Transcript SRT export failed")?
                    .error_for_status()?
                    .text()
                    .await?;
                return Ok(srt);
            }
            Some("error") => {
                let reason = poll
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error");
                anyhow::bail!("Transcription failed: {reason}");
            }
            _ => continue,
        }
    }

    anyhow::bail!("Transcription did not complete in time")
}
