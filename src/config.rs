use anyhow::{bail, Result};
use std::env;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_key: String,
    pub tiktok_session_id: String,
    pub pexels_key: String,
    /// When set, subtitles come from the transcription service instead of
    /// being timed locally.
    pub assemblyai_key: Option<String>,
    /// Path to the OAuth client secret file. When absent, upload requests
    /// are skipped.
    pub youtube_client_secret_file: Option<String>,
    pub listen_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai_key: required("OPENAI_API_KEY")?,
            tiktok_session_id: required("TIKTOK_SESSION_ID")?,
            pexels_key: required("PEXELS_API_KEY")?,
            assemblyai_key: optional("ASSEMBLYAI_API_KEY"),
            youtube_client_secret_file: optional("YOUTUBE_CLIENT_SECRET_FILE"),
            listen_addr: optional("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        })
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => bail!("{name} is not set"),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
