use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mend_core::model::FixModel;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Calls the Gemini generateContent API.
///
/// Temperature is pinned low; the repair contract wants determinism, not
/// creativity. Transport or API failures come back as `Err` so the caller
/// treats the attempt as poisoned rather than silently fix-free.
pub struct GeminiModel {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 300,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct ContentBlock {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<ContentBlock>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

fn response_text(parsed: &GenerateResponse) -> String {
    parsed
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl FixModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request_body = GenerateRequest {
            contents: vec![ContentBlock {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.05,
                max_output_tokens: 8192,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        info!(model = %self.model, prompt_len = prompt.len(), "calling gemini generateContent");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "gemini returned non-200: {}", body);
            return Err(anyhow!("gemini error {status}: {body}"));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("failed to parse gemini response")?;
        let output = response_text(&parsed);
        if output.is_empty() {
            return Err(anyhow!("gemini returned no candidates"));
        }

        info!(output_len = output.len(), "gemini response received");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_shape() {
        let request = GenerateRequest {
            contents: vec![ContentBlock {
                parts: vec![Part {
                    text: "fix it".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.05,
                max_output_tokens: 8192,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "fix it");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "[SYNTAX] "}, {"text": "error"}]}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response_text(&parsed), "[SYNTAX] error");
    }

    #[test]
    fn test_response_text_empty_candidates() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response_text(&parsed), "");
    }
}
