use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::config::Settings;
use crate::error::SkillError;

const LLM_TIMEOUT_SECS: u64 = 300;

/// Single-turn text completion.
pub trait CompletionApi: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OpenAiConfig {
    /// `None` when no API key is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let api_key = settings.llm_api_key.clone()?;
        Some(Self {
            api_key,
            model: settings.llm_model.clone(),
            base_url: settings.llm_base_url.clone(),
        })
    }
}

pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .build()
            .context("failed to build LLM HTTP client")?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn request_body(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

impl CompletionApi for OpenAiClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&Self::request_body(&self.config.model, prompt))
            .send()
            .map_err(|error| SkillError::RemoteService(format!("failed to call LLM API: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let snippet = body.chars().take(300).collect::<String>();
            return Err(SkillError::RemoteService(format!(
                "LLM API request failed with HTTP {status}: {snippet}"
            ))
            .into());
        }
        let payload: Value = response.json().map_err(|error| {
            SkillError::RemoteService(format!("failed to decode LLM API JSON response: {error}"))
        })?;
        parse_completion(&payload)
    }
}

/// Extracts `choices[0].message.content`, trimmed.
pub fn parse_completion(payload: &Value) -> Result<String> {
    let content = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| SkillError::RemoteService("LLM response has no message content".to_string()))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, error_kind};

    #[test]
    fn parse_completion_returns_trimmed_text() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "  ### Level 1–20\nTrain chickens  "}}]
        });
        assert_eq!(
            parse_completion(&payload).expect("content"),
            "### Level 1–20\nTrain chickens"
        );
    }

    #[test]
    fn parse_completion_rejects_empty_choices() {
        let error = parse_completion(&json!({"choices": []})).expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);
    }

    #[test]
    fn request_body_carries_single_user_message() {
        let body = OpenAiClient::request_body("gpt-5-mini", "summarize this");
        assert_eq!(body["model"], "gpt-5-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "summarize this");
    }

    fn loopback_client(base_url: &str) -> OpenAiClient {
        OpenAiClient::with_client(
            crate::test_support::direct_client(),
            OpenAiConfig {
                api_key: "sk-test".to_string(),
                model: "gpt-test".to_string(),
                base_url: format!("{base_url}/v1/"),
            },
        )
    }

    #[test]
    fn client_posts_chat_completion_with_bearer_key() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": " ### Level 1–20\n"}}]});
        let (base_url, server) =
            crate::test_support::serve_responses(vec![(200, body.to_string())]);

        let summary = loopback_client(&base_url)
            .complete("summarize this")
            .expect("completion");
        assert_eq!(summary, "### Level 1–20");

        let requests = server.join().expect("server thread");
        let request = &requests[0];
        assert!(request.starts_with("post /v1/chat/completions http/1.1"));
        assert!(request.contains("authorization: bearer sk-test"));
        assert!(request.contains(r#""model":"gpt-test""#));
        assert!(request.contains("summarize this"));
    }

    #[test]
    fn client_maps_http_failure_to_remote_service() {
        let (base_url, server) = crate::test_support::serve_responses(vec![(
            429,
            r#"{"error":"rate limited"}"#.to_string(),
        )]);

        let error = loopback_client(&base_url)
            .complete("summarize this")
            .expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);
        let message = error.to_string();
        assert!(message.contains("HTTP 429"));
        assert!(message.contains("rate limited"));
        server.join().expect("server thread");
    }

    #[test]
    fn client_maps_undecodable_body_to_remote_service() {
        let (base_url, server) =
            crate::test_support::serve_responses(vec![(200, "not json".to_string())]);

        let error = loopback_client(&base_url)
            .complete("summarize this")
            .expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);
        assert!(
            error
                .to_string()
                .contains("failed to decode LLM API JSON response")
        );
        server.join().expect("server thread");
    }

    #[test]
    fn config_requires_api_key() {
        let mut settings = crate::config::ServiceConfig::default()
            .resolve_with_lookup(|_| None)
            .expect("settings");
        assert!(OpenAiConfig::from_settings(&settings).is_none());
        settings.llm_api_key = Some("sk-test".to_string());
        let config = OpenAiConfig::from_settings(&settings).expect("config");
        assert_eq!(config.model, crate::config::DEFAULT_LLM_MODEL);
    }
}
