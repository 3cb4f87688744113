use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::{ModelClient, ModelError, ModelRequest, ModelTier};
use crate::gate::RateGate;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// HTTP client for the Gemini generateContent API.
///
/// Model ids per tier come from config; the rate gate spaces successive
/// calls (~100ms) so bursts of concurrent requests don't trip the API's
/// per-minute limits.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    reasoning_model: String,
    fast_model: String,
    gate: RateGate,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        reasoning_model: String,
        fast_model: String,
        rate_interval: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            reasoning_model,
            fast_model,
            gate: RateGate::new(rate_interval),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Reasoning => &self.reasoning_model,
            ModelTier::Fast => &self.fast_model,
        }
    }

    async fn post_generate(
        &self,
        req: &ModelRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ModelError> {
        self.gate.acquire().await;

        let model = self.model_for(req.tier);
        let verb = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let url = format!("{}/v1beta/models/{}:{}", self.base_url, model, verb);

        debug!(model, stream, "sending request to Gemini");

        let body = build_request_body(req);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::QuotaExhausted(text));
        }
        if status == 401 || status == 403 {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Auth(text));
        }
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
            // The API reports per-project saturation as a 5xx with this
            // status string, not only as 429.
            if text.contains("RESOURCE_EXHAUSTED") {
                return Err(ModelError::QuotaExhausted(text));
            }
            return Err(ModelError::Api {
                status,
                message: text,
            });
        }

        Ok(resp)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, req: &ModelRequest) -> Result<String, ModelError> {
        let fut = async {
            let resp = self.post_generate(req, false).await?;
            let api_resp: ApiResponse = resp
                .json()
                .await
                .map_err(|e| ModelError::Parse(e.to_string()))?;
            extract_text(api_resp)
        };

        tokio::time::timeout(req.deadline, fut)
            .await
            .map_err(|_| ModelError::Timeout(req.deadline))?
    }

    async fn generate_streaming(
        &self,
        req: &ModelRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<String, ModelError> {
        let fut = async {
            let resp = self.post_generate(req, true).await?;
            let mut full = String::new();
            let mut buf = String::new();
            let mut stream = resp.bytes_stream();

            while let Some(part) = stream.next().await {
                let bytes = part?;
                buf.push_str(&String::from_utf8_lossy(&bytes));

                // SSE frames are newline-delimited `data: {json}` lines.
                while let Some(idx) = buf.find('\n') {
                    let line = buf[..idx].trim().to_string();
                    buf.drain(..=idx);
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload.is_empty() || payload == "[DONE]" {
                        continue;
                    }
                    if let Ok(event) = serde_json::from_str::<ApiResponse>(payload) {
                        if let Ok(text) = extract_text(event) {
                            full.push_str(&text);
                            // Receiver gone means the caller stopped caring
                            // about partials; keep accumulating the total.
                            let _ = chunks.send(text).await;
                        }
                    }
                }
            }

            if full.is_empty() {
                return Err(ModelError::Parse("empty streaming response".to_string()));
            }
            Ok(full)
        };

        tokio::time::timeout(req.deadline, fut)
            .await
            .map_err(|_| ModelError::Timeout(req.deadline))?
    }
}

fn build_request_body(req: &ModelRequest) -> serde_json::Value {
    serde_json::json!({
        "system_instruction": { "parts": [{ "text": req.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": req.user }] }],
        "generationConfig": {
            "temperature": req.temperature,
            "maxOutputTokens": req.max_tokens,
        }
    })
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn extract_text(resp: ApiResponse) -> Result<String, ModelError> {
    let text: String = resp
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .map(|p| p.text)
        .collect();

    if text.is_empty() {
        Err(ModelError::Parse("response carried no text parts".to_string()))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let req = ModelRequest::new("sys", "hello", ModelTier::Fast).with_max_tokens(256);
        let body = build_request_body(&req);
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn extract_text_joins_parts() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), "Hello world");
    }

    #[test]
    fn empty_candidates_is_parse_error() {
        let resp: ApiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_text(resp), Err(ModelError::Parse(_))));
    }
}
