use crate::config::Config;
use anyhow::{Context, Result};
use base64::Engine;
use reqwest::Client;
use std::path::Path;
use tokio::fs;

const TTS_URL: &str = "https://api16-normal-c-useast1a.tiktokv.com/media/api/text/speech/invoke/";
const TTS_USER_AGENT: &str =
    "com.zhiliaoapp.musically/2022600030 (Linux; U; Android 7.1.2; es_ES; SM-G988N; Build/NRD90M;tt-ok/3.12.13.1)";

/// The speech endpoint mangles these characters, so they are spelled out
/// before the request is built.
fn sanitize_tts_text(text: &str) -> String {
    text.replace('+', "plus").replace('&', "and")
}

/// Synthesizes one sentence of speech and writes the MP3 to `out_path`.
/// Failures abort the whole generation; there is no retry.
pub async fn tts(client: &Client, cfg: &Config, text: &str, voice: &str, out_path: &Path) -> Result<()> {
    let req_text = sanitize_tts_text(text);

    let resp = client
        .post(TTS_URL)
        .query(&[
            ("text_speaker", voice),
            ("req_text", req_text.as_str()),
            ("speaker_map_type", "0"),
            ("aid", "1233"),
        ])
        .header("User-Agent", TTS_USER_AGENT)
        .header("Cookie", format!("sessionid={}", cfg.tiktok_session_id))
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await
        .context("TTS request failed")?;

    if !resp.status().is_success() {
        anyhow::bail!("TTS failed with HTTP {}", resp.status().as_u16());
    }

    let root: serde_json::Value = resp.json().await.context("TTS response read failed")?;

    let status_code = root.get("status_code").and_then(|v| v.as_i64()).unwrap_or(-1);
    if status_code != 0 {
        let message = root
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("TTS failed with status_code {status_code}: {message}");
    }

    let v_str = root
        .get("data")
        .and_then(|d| d.get("v_str"))
        .and_then(|v| v.as_str())
        .context("TTS response missing audio payload")?;

    let audio = base64::engine::general_purpose::STANDARD
        .decode(v_str)
        .context("TTS audio payload was not valid base64")?;

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    fs::write(out_path, &audio).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_reserved_characters() {
        assert_eq!(sanitize_tts_text("cats + dogs & more"), "cats plus dogs and more");
        assert_eq!(sanitize_tts_text("plain sentence"), "plain sentence");
    }
}
