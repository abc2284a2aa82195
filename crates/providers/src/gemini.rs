//! Google Gemini provider (`generateContent` REST API).
//!
//! Maps our transcript onto Gemini `contents` (assistant → `model`), sends
//! the behavioral instructions as `systemInstruction`, and turns blocked or
//! empty candidates into errors so the orchestrator can degrade.

use async_trait::async_trait;
use madoguchi_core::error::ProviderError;
use madoguchi_core::message::{Message, Role};
use madoguchi_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A Gemini provider authenticated with an API key.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

// ── API request/response types ────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl GeminiProvider {
    /// Create a provider against the public Gemini endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Create a provider against a custom endpoint (proxies, tests).
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        // Per-call deadlines are enforced by `RetryProvider`; this is a
        // transport-level backstop.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Convert a request into the Gemini body.
    ///
    /// System messages inside the transcript are merged into the system
    /// instruction after `request.system`.
    fn to_api_request(request: &ProviderRequest) -> GenerateContentRequest {
        let mut system_parts: Vec<Part> = request
            .system
            .iter()
            .map(|s| Part {
                text: Some(s.clone()),
            })
            .collect();

        let mut contents = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(Part {
                    text: Some(message.content.clone()),
                }),
                Role::User | Role::Assistant => contents.push(Self::to_content(message)),
            }
        }

        GenerateContentRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| Content {
                role: None,
                parts: system_parts,
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    fn to_content(message: &Message) -> Content {
        let role = match message.role {
            Role::Assistant => "model",
            _ => "user",
        };
        Content {
            role: Some(role.into()),
            parts: vec![Part {
                text: Some(message.content.clone()),
            }],
        }
    }

    /// Extract the reply from a decoded response.
    fn from_api_response(
        api_response: GenerateContentResponse,
        requested_model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Some(reason) = api_response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Err(ProviderError::Blocked(reason));
        }

        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No candidates in response".into()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(match candidate.finish_reason {
                Some(reason) if reason == "SAFETY" || reason == "RECITATION" => {
                    ProviderError::Blocked(reason)
                }
                other => ProviderError::MalformedResponse(format!(
                    "Empty candidate text (finish reason: {})",
                    other.as_deref().unwrap_or("unknown")
                )),
            });
        }

        let usage = api_response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage,
            model: api_response
                .model_version
                .unwrap_or_else(|| requested_model.to_string()),
            finish_reason: candidate.finish_reason,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key is empty; set GEMINI_API_KEY".into(),
            ));
        }

        let url = self.endpoint(&request.model);
        let body = Self::to_api_request(&request);

        debug!(model = %request.model, messages = body.contents.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        Self::from_api_response(api_response, &request.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            model: "gemini-1.5-flash".into(),
            system: Some("あなたは保育士です。".into()),
            messages,
            temperature: 0.7,
            max_tokens: Some(512),
        }
    }

    fn parse(json: &str) -> Result<ProviderResponse, ProviderError> {
        let api: GenerateContentResponse = serde_json::from_str(json).unwrap();
        GeminiProvider::from_api_response(api, "gemini-1.5-flash")
    }

    #[test]
    fn provider_name_is_gemini() {
        let provider = GeminiProvider::new("key");
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn endpoint_accepts_prefixed_model() {
        let provider = GeminiProvider::with_base_url("http://localhost:9999/", "key");
        assert_eq!(
            provider.endpoint("models/gemini-1.5-flash"),
            "http://localhost:9999/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(
            provider.endpoint("gemini-1.5-flash"),
            "http://localhost:9999/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn request_maps_roles_and_system() {
        let req = request(vec![
            Message::user("夜泣きがひどいです"),
            Message::assistant("大変ですね。"),
            Message::user("児童手当について教えて"),
        ]);
        let body = serde_json::to_value(GeminiProvider::to_api_request(&req)).unwrap();

        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "あなたは保育士です。"
        );
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn transcript_system_messages_join_instruction() {
        let mut req = request(vec![Message::system("追加ルール"), Message::user("hi")]);
        req.system = None;
        let body = serde_json::to_value(GeminiProvider::to_api_request(&req)).unwrap();
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "追加ルール");
    }

    #[test]
    fn parses_successful_response() {
        let resp = parse(
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "こんにちは"}, {"text": "！"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 3, "totalTokenCount": 13},
                "modelVersion": "gemini-1.5-flash-002"
            }"#,
        )
        .unwrap();
        assert_eq!(resp.message.content, "こんにちは！");
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.model, "gemini-1.5-flash-002");
        assert_eq!(resp.usage.unwrap().total_tokens, 13);
        assert_eq!(resp.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn blocked_prompt_is_error() {
        let err = parse(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Blocked(r) if r == "SAFETY"));
    }

    #[test]
    fn empty_candidates_is_malformed() {
        let err = parse(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn safety_stop_without_text_is_blocked() {
        let err = parse(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Blocked(_)));
    }

    #[tokio::test]
    async fn empty_key_is_not_configured() {
        let provider = GeminiProvider::new("");
        let err = provider.complete(request(vec![Message::user("hi")])).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
