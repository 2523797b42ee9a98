//! Google Gemini generation backend.
//!
//! Sends the composed prompt as a single user-role message to
//! `POST {base_url}/v1beta/models/{model}:generateContent` and returns the
//! concatenated text parts of the first candidate.
//!
//! The API key is read from the configured environment variable on every
//! call, so a missing key surfaces as a per-question failure instead of
//! stopping the shells from starting. Calls are never retried; the request
//! timeout from `[generation].timeout_secs` is the only deadline.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use panchakarma_core::{GenerationBackend, GenerationError};

use crate::config::GenerationConfig;

pub struct GeminiBackend {
    name: String,
    model: String,
    api_key_env: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: format!("gemini:{}", config.model),
            model: config.model.trim_start_matches("models/").to_string(),
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_key(&self) -> Result<String, GenerationError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingCredential {
                var: self.api_key_env.clone(),
            })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_hint(&self) -> &str {
        "Gemini API key"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key()?;
        let body = serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ]
        });

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Malformed(format!("invalid JSON: {}", e)))?;
        extract_text(&json)
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e.to_string())
    }
}

/// Pull `error.message` out of a Google API error body, falling back to the
/// raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Concatenate the text parts of the first candidate.
fn extract_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    let Some(candidate) = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    else {
        if let Some(reason) = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
        {
            return Err(GenerationError::Malformed(format!(
                "prompt blocked: {}",
                reason
            )));
        }
        return Err(GenerationError::EmptyResponse);
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            GenerationError::Malformed(format!("candidate has no content (finish reason: {})", reason))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

/// A model offered by the Gemini API.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
}

/// List models that support `generateContent`.
pub async fn list_models(config: &GenerationConfig) -> Result<Vec<ModelInfo>> {
    let api_key = std::env::var(&config.api_key_env)
        .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let url = format!("{}/v1beta/models", config.base_url.trim_end_matches('/'));
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut request = client
            .get(&url)
            .header("x-goog-api-key", &api_key)
            .query(&[("pageSize", "100")]);
        if let Some(token) = &page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let response = request.send().await.context("Failed to reach Gemini API")?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("Gemini API error {}: {}", status, api_error_message(&body));
        }

        let json: serde_json::Value = serde_json::from_str(&body)?;
        models.extend(parse_models(&json));

        page_token = json
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if page_token.is_none() {
            break;
        }
    }

    Ok(models)
}

fn parse_models(json: &serde_json::Value) -> Vec<ModelInfo> {
    json.get("models")
        .and_then(|m| m.as_array())
        .map(|models| {
            models
                .iter()
                .filter(|m| {
                    m.get("supportedGenerationMethods")
                        .and_then(|s| s.as_array())
                        .is_some_and(|methods| {
                            methods.iter().any(|x| x.as_str() == Some("generateContent"))
                        })
                })
                .filter_map(|m| {
                    Some(ModelInfo {
                        name: m.get("name")?.as_str()?.to_string(),
                        display_name: m
                            .get("displayName")
                            .and_then(|d| d.as_str())
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_joins_parts() {
        let body = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [ { "text": "- Rest\n" }, { "text": "- Eat light" } ] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_text(&body).unwrap(), "- Rest\n- Eat light");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_text(&body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_no_candidates() {
        assert!(matches!(
            extract_text(&json!({ "candidates": [] })),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_extract_text_candidate_without_content() {
        let body = json!({ "candidates": [ { "finishReason": "MAX_TOKENS" } ] });
        let err = extract_text(&body).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            api_error_message(body),
            "API key not valid. Please pass a valid API key."
        );
        assert_eq!(api_error_message("  gateway down "), "gateway down");
    }

    #[test]
    fn test_parse_models_filters_generate_content() {
        let body = json!({
            "models": [
                { "name": "models/gemini-1.5-flash", "displayName": "Gemini 1.5 Flash",
                  "supportedGenerationMethods": ["generateContent", "countTokens"] },
                { "name": "models/text-embedding-004",
                  "supportedGenerationMethods": ["embedContent"] }
            ]
        });
        let models = parse_models(&body);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "models/gemini-1.5-flash");
        assert_eq!(models[0].display_name.as_deref(), Some("Gemini 1.5 Flash"));
    }

    #[test]
    fn test_model_prefix_stripped() {
        let config = GenerationConfig {
            model: "models/gemini-1.5-flash".to_string(),
            base_url: "http://localhost:9/".to_string(),
            ..GenerationConfig::default()
        };
        let backend = GeminiBackend::new(&config).unwrap();
        assert_eq!(
            backend.generate_url(),
            "http://localhost:9/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_credential_error() {
        let config = GenerationConfig {
            api_key_env: "PANCHAKARMA_UNIT_TEST_UNSET_KEY".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            ..GenerationConfig::default()
        };
        let backend = GeminiBackend::new(&config).unwrap();
        let err = backend.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential { .. }));
    }
}
