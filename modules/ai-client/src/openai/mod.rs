mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};

use crate::message::Message;
use client::OpenAiClient;

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Send a conversation and return the first choice's text.
    /// `temperature` is ignored for reasoning models.
    pub async fn chat(&self, messages: &[Message], temperature: Option<f32>) -> Result<String> {
        let mut request = types::ChatRequest::new(&self.model);
        for msg in messages {
            request = request.message(msg);
        }

        if types::is_reasoning_model(&self.model) {
            request = request.max_completion_tokens(4096);
        } else {
            request = request.max_tokens(4096);
            if let Some(t) = temperature {
                request = request.temperature(t);
            }
        }

        let response = self.client().chat(&request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from OpenAI"))
    }
}
