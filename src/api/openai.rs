use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

fn extract_message_content(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            warn!("OpenAI error message: {}", msg);
        }
        if let Some(typ) = err.get("type").and_then(|v| v.as_str()) {
            warn!("OpenAI error type: {}", typ);
        }
        return None;
    }

    root.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Models often wrap JSON answers in markdown fences; peel them off before
/// handing the text to serde.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

async fn chat_completion(client: &Client, cfg: &Config, model: &str, prompt: &str) -> Result<String> {
    let body = json!({
        "model": model,
        "messages": [
            {"role": "user", "content": prompt},
        ],
    });

    let resp = client
        .post(CHAT_COMPLETIONS_URL)
        .bearer_auth(&cfg.openai_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        warn!("OpenAI HTTP {}", status.as_u16());
        if !raw.is_empty() {
            let snippet = raw.chars().take(800).collect::<String>();
            warn!("OpenAI raw body: {}", snippet);
        }
        anyhow::bail!("OpenAI request failed with HTTP {}", status.as_u16());
    }

    extract_message_content(&raw).context("OpenAI response contained no message content")
}

/// Generates the narration script. The custom prompt, when provided,
/// replaces the built-in one entirely.
pub async fn generate_script(
    client: &Client,
    cfg: &Config,
    subject: &str,
    paragraph_number: u32,
    model: &str,
    custom_prompt: &str,
) -> Result<String> {
    let prompt = if custom_prompt.is_empty() {
        format!(
            "Generate a script for a short narrated video based on the subject of the video.\n\
             Subject: {subject}\n\
             Number of paragraphs: {paragraph_number}\n\n\
             The script is to be returned as a string with the specified number of paragraphs.\n\
             Get straight to the point, don't start with unnecessary things like \"welcome to this video\".\n\
             Obviously, the script should be related to the subject of the video.\n\
             You must not include any markdown, headings or directions such as \"voiceover\" or \"narrator\" \
             in the script; only return the raw content."
        )
    } else {
        format!("{custom_prompt}\n\nSubject: {subject}\nNumber of paragraphs: {paragraph_number}")
    };

    let text = chat_completion(client, cfg, model, &prompt).await?;
    let script: String = text
        .chars()
        .filter(|c| *c != '*' && *c != '#')
        .collect::<String>()
        .trim()
        .to_string();

    if script.is_empty() {
        anyhow::bail!("Generated script was empty");
    }
    Ok(script)
}

/// Derives stock-footage search terms from the finished script.
pub async fn get_search_terms(
    client: &Client,
    cfg: &Config,
    subject: &str,
    amount: usize,
    script: &str,
    model: &str,
) -> Result<Vec<String>> {
    let prompt = format!(
        "Generate {amount} search terms for stock videos, depending on the subject of a video.\n\
         Subject: {subject}\n\n\
         The search terms are to be returned as a JSON array of strings, for example:\n\
         [\"search term 1\", \"search term 2\", \"search term 3\"]\n\n\
         Each search term should consist of 1-3 words, always add the main subject of the video.\n\
         Reply with ONLY the JSON array, no extra text.\n\n\
         Here is the full script of the video, use it to generate fitting search terms:\n{script}"
    );

    let text = chat_completion(client, cfg, model, &prompt).await?;
    let cleaned = strip_code_fences(&text);

    let terms: Vec<String> = serde_json::from_str(cleaned)
        .with_context(|| format!("Failed to parse search terms: {cleaned}"))?;
    Ok(terms)
}

/// Title, description and tags for the finished video.
pub async fn generate_metadata(
    client: &Client,
    cfg: &Config,
    subject: &str,
    script: &str,
    model: &str,
) -> Result<VideoMetadata> {
    let prompt = format!(
        "Generate metadata for a short video about the following subject.\n\
         Subject: {subject}\n\n\
         Script:\n{script}\n\n\
         Return STRICT JSON with this shape ONLY:\n\
         {{\"title\": \"...\", \"description\": \"...\", \"tags\": [\"...\", \"...\"]}}\n\
         The title must be at most 100 characters. Tags are short keywords without hash signs."
    );

    let text = chat_completion(client, cfg, model, &prompt).await?;
    let cleaned = strip_code_fences(&text);

    let metadata: VideoMetadata = serde_json::from_str(cleaned)
        .with_context(|| format!("Failed to parse video metadata: {cleaned}"))?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_chat_message_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(extract_message_content(raw).as_deref(), Some("hello"));
    }

    #[test]
    fn error_body_yields_none() {
        let raw = r#"{"error":{"message":"bad key","type":"auth"}}"#;
        assert!(extract_message_content(raw).is_none());
    }

    #[test]
    fn strips_json_code_fences() {
        assert_eq!(strip_code_fences("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_code_fences("```\n{\"x\":1}\n```"), "{\"x\":1}");
        assert_eq!(strip_code_fences("  [\"plain\"]  "), "[\"plain\"]");
    }
}
