use crate::config::Config;
use crate::error::OrionError;
use serde_json::{json, Value};

const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub response_schema: Option<Value>,
    pub thinking_budget: Option<u32>,
}

#[allow(async_fn_in_trait)]
pub trait GenerativeModel {
    async fn generate(&self, model: &str, content: &str, config: &GenerationConfig) -> Result<String, OrionError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key().ok().map(str::to_string),
        }
    }

    fn payload(content: &str, config: &GenerationConfig) -> Value {
        let mut generation = json!({});
        if let Some(t) = config.temperature {
            generation["temperature"] = json!(t);
        }
        if let Some(p) = config.top_p {
            generation["topP"] = json!(p);
        }
        if let Some(k) = config.top_k {
            generation["topK"] = json!(k);
        }
        if let Some(schema) = &config.response_schema {
            generation["responseMimeType"] = json!("application/json");
            generation["responseSchema"] = schema.clone();
        }
        if let Some(budget) = config.thinking_budget {
            generation["thinkingConfig"] = json!({ "thinkingBudget": budget });
        }

        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": content }]
            }],
            "generationConfig": generation
        });

        if let Some(system) = &config.system_instruction {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        payload
    }
}

fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn extract_text(body: &Value) -> Result<String, OrionError> {
    if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
        return Err(OrionError::Blocked(reason.to_string()));
    }

    let candidate = &body["candidates"][0];
    if let Some(reason) = candidate["finishReason"].as_str() {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            return Err(OrionError::Blocked(reason.to_string()));
        }
    }

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p["thought"].as_bool().unwrap_or(false))
                .filter_map(|p| p["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OrionError::EmptyResponse);
    }
    Ok(text)
}

impl GenerativeModel for GeminiClient {
    async fn generate(&self, model: &str, content: &str, config: &GenerationConfig) -> Result<String, OrionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OrionError::Config("GEMINI_API_KEY is not set".into()))?;

        let url = format!("{}/v1beta/models/{}:generateContent", self.api_base, model);
        log::debug!("POST {url}");

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::payload(content, config))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let err_text = res.text().await.unwrap_or_default();
            log::error!("API Error {status}: {err_text}");
            return Err(OrionError::Upstream { status, message: upstream_message(&err_text) });
        }

        let body: Value = res.json().await?;
        extract_text(&body)
    }
}
