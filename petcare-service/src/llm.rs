use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const VISION_MAX_TOKENS: u32 = 2000;

/// One completion call: a system preamble, the user prompt and optional image URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub preamble: String,
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, preamble: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            preamble: preamble.into(),
            prompt: prompt.into(),
            image_urls: Vec::new(),
            temperature: 0.2,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn images(mut self, image_urls: &[String]) -> Self {
        self.image_urls = image_urls.to_vec();
        self
    }
}

/// Text in, text out. Errors are transport or provider failures only.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String>;
}

/// OpenRouter-backed model: rig agents for text, a raw chat-completions call for images.
pub struct OpenRouterModel {
    client: openrouter::Client,
    http: Client,
    api_key: String,
    timeout: Duration,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            http: Client::new(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    async fn complete_text(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let agent = self
            .client
            .agent(&request.model)
            .preamble(&request.preamble)
            .temperature(request.temperature)
            .build();

        Ok(agent.prompt(request.prompt.as_str()).await?)
    }

    async fn complete_with_images(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let mut content = vec![json!({
            "type": "text",
            "text": request.prompt,
        })];
        content.extend(request.image_urls.iter().map(|url| {
            json!({
                "type": "image_url",
                "image_url": { "url": url }
            })
        }));

        let payload = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.preamble },
                { "role": "user", "content": content }
            ],
            "temperature": request.temperature,
            "max_tokens": VISION_MAX_TOKENS
        });

        let response = self
            .http
            .post(OPENROUTER_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        let response_json: Value = response.json().await?;
        let text = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))?;

        Ok(text.to_string())
    }
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        debug!(
            model = %request.model,
            images = request.image_urls.len(),
            "Sending completion request"
        );

        let call = async {
            if request.image_urls.is_empty() {
                self.complete_text(&request).await
            } else {
                self.complete_with_images(&request).await
            }
        };

        let text = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| anyhow!("LLM call to {} timed out after {:?}", request.model, self.timeout))??;

        info!(model = %request.model, chars = text.len(), "Completion received");
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every request it receives.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                requests: Mutex::default(),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(anyhow!(message.to_string()))])),
                requests: Mutex::default(),
            }
        }

        pub fn last_request(&self) -> Option<CompletionRequest> {
            self.requests.lock().unwrap().last().cloned()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
        }
    }
}
