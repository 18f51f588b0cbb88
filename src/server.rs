use crate::config::Config;
use crate::error::PipelineError;
use crate::generator;
use crate::progress::{CancelRegistry, GenerationStatus, ProgressStore};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: reqwest::Client,
    pub progress: Arc<ProgressStore>,
    pub cancels: Arc<CancelRegistry>,
}

/// The generation request payload. Optional fields carry their documented
/// defaults so the pipeline never reaches into a loose map.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub video_subject: String,
    #[serde(default)]
    pub custom_prompt: String,
    #[serde(default = "default_paragraph_number")]
    pub paragraph_number: u32,
    pub ai_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_subtitles_position")]
    pub subtitles_position: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub use_music: bool,
    #[serde(default)]
    pub zip_url: Option<String>,
    #[serde(default)]
    pub automate_youtube_upload: bool,
}

impl GenerateRequest {
    /// An explicit empty string bypasses the serde default, so falsy voice
    /// values fall back here instead of reaching the speech endpoint.
    pub fn voice(&self) -> &str {
        if self.voice.trim().is_empty() {
            "en_us_001"
        } else {
            &self.voice
        }
    }
}

fn default_paragraph_number() -> u32 {
    1
}

fn default_voice() -> String {
    "en_us_001".to_string()
}

fn default_threads() -> u32 {
    2
}

fn default_subtitles_position() -> String {
    "center,center".to_string()
}

fn default_color() -> String {
    "#FFFF00".to_string()
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/cancel", post(cancel))
        .route("/api/progress/:generation_id", get(get_progress))
        .with_state(state)
}

fn success_envelope(final_video_name: &str, generation_id: Uuid) -> Value {
    json!({
        "status": "success",
        "message": format!("Video generated! See final_videos/{final_video_name} for result."),
        "data": final_video_name,
        "generation_id": generation_id,
    })
}

fn error_envelope(message: &str) -> Value {
    json!({
        "status": "error",
        "message": message,
        "data": [],
    })
}

/// Pipeline-level outcomes always come back as HTTP 200 with a status field
/// in the body.
async fn generate(State(state): State<AppState>, Json(req): Json<GenerateRequest>) -> Json<Value> {
    let generation_id = Uuid::new_v4();
    let cancel = state.cancels.register(generation_id);

    let result = generator::run_generation(&state, generation_id, &req, &cancel).await;
    state.cancels.unregister(&generation_id);

    match result {
        Ok(final_video_name) => Json(success_envelope(&final_video_name, generation_id)),
        Err(PipelineError::Cancelled) => {
            info!("Generation {} cancelled", generation_id);
            Json(error_envelope("Video generation was cancelled."))
        }
        Err(PipelineError::NoFootage) => {
            warn!("No videos found to download.");
            Json(error_envelope("No videos found to download."))
        }
        Err(PipelineError::Other(err)) => {
            warn!("Error: {:#}", err);
            let message = format!("Could not generate video: {err:#}");
            state
                .progress
                .update(generation_id, GenerationStatus::Error, 0, &message);
            Json(error_envelope(&message))
        }
    }
}

async fn cancel(State(state): State<AppState>) -> Json<Value> {
    warn!("Received cancellation request...");
    let cancelled = state.cancels.cancel_all();
    info!("Cancelled {} in-flight generations", cancelled);

    Json(json!({
        "status": "success",
        "message": "Cancelled video generation.",
    }))
}

async fn get_progress(
    State(state): State<AppState>,
    Path(generation_id): Path<String>,
) -> Json<Value> {
    let entry = Uuid::parse_str(&generation_id)
        .ok()
        .and_then(|id| state.progress.get(&id));

    match entry {
        Some(entry) => Json(json!({
            "status": entry.status,
            "progress": entry.progress,
            "message": entry.message,
        })),
        None => Json(json!({
            "status": "not_found",
            "progress": 0,
            "message": "Generation not found",
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_fills_documented_defaults() {
        let req: GenerateRequest = serde_json::from_str(
            r#"{"videoSubject": "cats", "aiModel": "gpt-4o-mini"}"#,
        )
        .unwrap();

        assert_eq!(req.video_subject, "cats");
        assert_eq!(req.custom_prompt, "");
        assert_eq!(req.paragraph_number, 1);
        assert_eq!(req.voice, "en_us_001");
        assert_eq!(req.threads, 2);
        assert_eq!(req.subtitles_position, "center,center");
        assert_eq!(req.color, "#FFFF00");
        assert!(!req.use_music);
        assert!(req.zip_url.is_none());
        assert!(!req.automate_youtube_upload);
    }

    #[test]
    fn full_request_overrides_defaults() {
        let req: GenerateRequest = serde_json::from_str(
            r##"{
                "videoSubject": "dogs",
                "customPrompt": "write a poem",
                "paragraphNumber": 3,
                "aiModel": "gpt-4o",
                "voice": "br_001",
                "threads": 8,
                "subtitlesPosition": "center,bottom",
                "color": "#FF0000",
                "useMusic": true,
                "zipUrl": "https://example.com/songs.zip",
                "automateYoutubeUpload": true
            }"##,
        )
        .unwrap();

        assert_eq!(req.paragraph_number, 3);
        assert_eq!(req.voice, "br_001");
        assert_eq!(req.subtitles_position, "center,bottom");
        assert_eq!(req.color, "#FF0000");
        assert!(req.use_music);
        assert_eq!(req.zip_url.as_deref(), Some("https://example.com/songs.zip"));
        assert!(req.automate_youtube_upload);
    }

    #[test]
    fn explicit_empty_voice_falls_back_to_default() {
        let req: GenerateRequest = serde_json::from_str(
            r#"{"videoSubject": "cats", "aiModel": "gpt-4o-mini", "voice": ""}"#,
        )
        .unwrap();
        assert_eq!(req.voice, "");
        assert_eq!(req.voice(), "en_us_001");

        let req: GenerateRequest = serde_json::from_str(
            r#"{"videoSubject": "cats", "aiModel": "gpt-4o-mini", "voice": "br_001"}"#,
        )
        .unwrap();
        assert_eq!(req.voice(), "br_001");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result: Result<GenerateRequest, _> = serde_json::from_str(r#"{"aiModel": "gpt-4o"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn success_envelope_matches_contract() {
        let id = Uuid::new_v4();
        let name = format!("{}.mp4", Uuid::new_v4());
        let envelope = success_envelope(&name, id);

        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["data"], name.as_str());
        assert_eq!(envelope["generation_id"], id.to_string());

        let data = envelope["data"].as_str().unwrap();
        let re = regex::Regex::new(r"^[0-9a-f-]{36}\.mp4$").unwrap();
        assert!(re.is_match(data));
    }

    #[test]
    fn error_envelope_has_empty_data_array() {
        let envelope = error_envelope("No videos found to download.");
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["message"], "No videos found to download.");
        assert_eq!(envelope["data"], json!([]));
    }
}
