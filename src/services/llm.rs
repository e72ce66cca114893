use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String, // "dashscope", "openai" or "ollama"
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub api_key: String,
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: String::new(),
            base_url: None,
            timeout_seconds: default_timeout_seconds(),
            retry_count: 0,
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

fn default_provider() -> String {
    "dashscope".to_string()
}
fn default_model() -> String {
    "qwen3-235b-a22b".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_seconds() -> u64 {
    120
}
fn default_retry_delay() -> u64 {
    5
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for GenerationParams {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Generative text service. A non-success response is an `Err`.
#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let params = GenerationParams::from(config);
    match config.provider.as_str() {
        "dashscope" => Ok(Box::new(DashScopeClient::new(
            &config.api_key,
            config.base_url.as_deref(),
            params,
        ))),
        "openai" => Ok(Box::new(OpenAIClient::new(
            &config.api_key,
            config.base_url.as_deref(),
            params,
        ))),
        "ollama" => Ok(Box::new(OllamaClient::new(config.base_url.as_deref(), params))),
        _ => Err(anyhow!("Unknown LLM provider: {}", config.provider)),
    }
}

/// Calls the service under a timeout, retrying per `config`.
pub async fn generate_bounded(
    llm: &dyn LlmClient,
    config: &LlmConfig,
    system: &str,
    prompt: &str,
) -> Result<String> {
    let limit = Duration::from_secs(config.timeout_seconds);
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(limit, llm.generate(system, prompt)).await {
            Ok(r) => r,
            Err(_) => Err(anyhow!(
                "Generation timed out after {}s",
                config.timeout_seconds
            )),
        };

        match result {
            Ok(text) => return Ok(text),
            Err(e) if attempt < config.retry_count => {
                attempt += 1;
                log::warn!(
                    "Generation failed: {:#}, retrying ({}/{})...",
                    e,
                    attempt,
                    config.retry_count
                );
                tokio::time::sleep(Duration::from_secs(config.retry_delay_seconds)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// --- DashScope ---

const DASHSCOPE_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

#[derive(Debug)]
struct DashScopeClient {
    api_key: String,
    url: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl DashScopeClient {
    fn new(api_key: &str, url: Option<&str>, params: GenerationParams) -> Self {
        Self {
            api_key: api_key.to_string(),
            url: url.unwrap_or(DASHSCOPE_URL).to_string(),
            params,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct DashScopeRequest {
    model: String,
    input: DashScopeInput,
    parameters: DashScopeParameters,
}

#[derive(Serialize)]
struct DashScopeInput {
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct DashScopeParameters {
    temperature: f32,
    max_tokens: u32,
    result_format: String,
}

#[derive(Deserialize)]
struct DashScopeResponse {
    output: Option<DashScopeOutput>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct DashScopeOutput {
    text: Option<String>,
}

#[async_trait]
impl LlmClient for DashScopeClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let request_body = DashScopeRequest {
            model: self.params.model.clone(),
            input: DashScopeInput {
                messages: chat_messages(system, prompt),
            },
            parameters: DashScopeParameters {
                temperature: self.params.temperature,
                max_tokens: self.params.max_tokens,
                result_format: "text".to_string(),
            },
        };

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("DashScope request failed")?;

        let status = resp.status();
        let response_text = resp.text().await?;
        let result: DashScopeResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!(
                "Failed to parse DashScope response: {}. Body: {}",
                e,
                response_text
            )
        })?;

        if !status.is_success() {
            return Err(anyhow!(
                "DashScope API error ({}): {} {}",
                status,
                result.code.as_deref().unwrap_or("unknown"),
                result.message.as_deref().unwrap_or("")
            ));
        }

        result
            .output
            .and_then(|o| o.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("DashScope response empty. Body: {}", response_text))
    }
}

// --- OpenAI compatible ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    base_url: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, base_url: Option<&str>, params: GenerationParams) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            params,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

fn chat_messages(system: &str, prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        },
    ]
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: self.params.model.clone(),
            messages: chat_messages(system, prompt),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("OpenAI request failed")?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error: {}", error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI response empty or missing content"))
    }
}

// --- Ollama ---

#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: Option<&str>, params: GenerationParams) -> Self {
        Self {
            base_url: base_url
                .unwrap_or("http://127.0.0.1:11434")
                .trim_end_matches('/')
                .to_string(),
            params,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: self.params.model.clone(),
            messages: chat_messages(system, prompt),
            stream: false,
            options: OllamaOptions {
                temperature: self.params.temperature,
                num_predict: self.params.max_tokens,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .context("Ollama request failed")?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        Ok(result.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_dashscope_response_parsing_success() {
        let json = r#"{
            "output": { "text": "标题：星海", "finish_reason": "stop" },
            "usage": { "input_tokens": 10, "output_tokens": 5 },
            "request_id": "abc"
        }"#;

        let result: DashScopeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.output.unwrap().text.as_deref(), Some("标题：星海"));
    }

    #[test]
    fn test_dashscope_response_parsing_error() {
        let json = r#"{
            "code": "InvalidApiKey",
            "message": "Invalid API-key provided.",
            "request_id": "abc"
        }"#;

        let result: DashScopeResponse = serde_json::from_str(json).unwrap();
        assert!(result.output.is_none());
        assert_eq!(result.code.as_deref(), Some("InvalidApiKey"));
    }

    #[test]
    fn test_dashscope_request_shape() {
        let body = DashScopeRequest {
            model: "qwen-plus".to_string(),
            input: DashScopeInput {
                messages: chat_messages("sys", "hi"),
            },
            parameters: DashScopeParameters {
                temperature: 0.5,
                max_tokens: 100,
                result_format: "text".to_string(),
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "qwen-plus");
        assert_eq!(value["input"]["messages"][1]["content"], "hi");
        assert_eq!(value["parameters"]["max_tokens"], 100);
    }

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "大纲" },
                "finish_reason": "stop"
            }]
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.choices[0].message.content.as_deref(), Some("大纲"));
    }

    #[test]
    fn test_create_llm_rejects_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(create_llm(&config).is_err());
        assert!(create_llm(&LlmConfig::default()).is_ok());
    }

    #[derive(Debug)]
    struct FlakyLlm {
        failures_left: Arc<Mutex<usize>>,
        calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl LlmClient for FlakyLlm {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("503"));
            }
            Ok("ok".to_string())
        }
    }

    #[derive(Debug)]
    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_bounded_retries_then_succeeds() -> Result<()> {
        let calls = Arc::new(Mutex::new(0));
        let llm = FlakyLlm {
            failures_left: Arc::new(Mutex::new(2)),
            calls: calls.clone(),
        };
        let config = LlmConfig {
            retry_count: 2,
            retry_delay_seconds: 0,
            ..Default::default()
        };

        let text = generate_bounded(&llm, &config, "", "").await?;
        assert_eq!(text, "ok");
        assert_eq!(*calls.lock().unwrap(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_bounded_gives_up() {
        let llm = FlakyLlm {
            failures_left: Arc::new(Mutex::new(5)),
            calls: Arc::new(Mutex::new(0)),
        };
        let config = LlmConfig {
            retry_count: 1,
            retry_delay_seconds: 0,
            ..Default::default()
        };
        assert!(generate_bounded(&llm, &config, "", "").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_bounded_times_out() {
        let config = LlmConfig {
            timeout_seconds: 1,
            ..Default::default()
        };
        let err = generate_bounded(&SlowLlm, &config, "", "").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
