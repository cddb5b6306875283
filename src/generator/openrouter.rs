use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::generator::{
    DEFAULT_QUERY_TITLE, PlanGenerator, QueryPlan, build_system_prompt, generation_error,
    parse_query_plan,
};
use crate::output_mode::detect_output_mode;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenAI-compatible chat-completions client.
pub struct OpenRouterGenerator {
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f64,
    referer: Option<String>,
    app_title: Option<String>,
    timeout: Duration,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug)]
pub struct OpenRouterSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: f64,
    pub referer: Option<String>,
    pub app_title: Option<String>,
    pub timeout: Duration,
}

impl OpenRouterGenerator {
    pub fn new(settings: OpenRouterSettings) -> Self {
        let base_url = match settings.base_url.trim().trim_end_matches('/') {
            "" => DEFAULT_BASE_URL.to_string(),
            url => url.to_string(),
        };
        Self {
            base_url,
            api_key: settings.api_key,
            model: settings.model,
            temperature: settings.temperature,
            referer: non_blank(settings.referer),
            app_title: non_blank(settings.app_title),
            timeout: settings.timeout,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }

    async fn complete(&self, prompt: &str, max_rows: usize) -> Result<String, GatewayError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(generation_error("api key is not configured"));
        }
        if self.model.trim().is_empty() {
            return Err(generation_error("model is not configured"));
        }

        let system_prompt = build_system_prompt(max_rows);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Authorization", self.auth_header())
            .timeout(self.timeout)
            .json(&request);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.app_title {
            builder = builder.header("X-Title", title);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                generation_error(&format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            } else {
                generation_error(&format!("request failed: {}", e))
            }
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| generation_error(&format!("failed to read response: {}", e)))?;
        if status.as_u16() >= 400 {
            return Err(generation_error(&format!(
                "request failed with HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| generation_error(&format!("failed to parse response: {}", e)))?;
        if let Some(message) = response.error.and_then(|e| e.message)
            && !message.is_empty()
        {
            return Err(generation_error(&format!("provider error: {}", message)));
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| generation_error("provider returned no choices"))?
            .message
            .content
            .unwrap_or_default();
        let content = content.trim();
        if content.is_empty() {
            return Err(generation_error("provider returned empty response"));
        }
        Ok(content.to_string())
    }
}

impl PlanGenerator for OpenRouterGenerator {
    async fn generate(&self, prompt: &str, max_rows: usize) -> Result<QueryPlan, GatewayError> {
        let content = self.complete(prompt, max_rows).await?;
        let mut plan = parse_query_plan(&content)?;
        plan.output_mode = detect_output_mode(prompt, &plan.output_mode).to_string();
        if plan.title.trim().is_empty() {
            plan.title = DEFAULT_QUERY_TITLE.to_string();
        }
        Ok(plan)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
