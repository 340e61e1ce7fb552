use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    config::{ProviderConfig, ProviderKind},
    provider::{ensure_success, http_client, lines, FragmentStream, ProviderError, TextProvider},
};

/// Local model server speaking the native newline-delimited JSON chat API.
#[derive(Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    chat_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .as_deref()
            .or_else(|| ProviderKind::Ollama.default_base_url())
            .unwrap_or_default();

        Ok(Self {
            client: http_client()?,
            chat_url: chat_url(base_url),
            model: config.model.clone(),
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

/// The descriptor carries the OpenAI-compatible `/v1` base; the native chat
/// route lives beside it at the server root.
fn chat_url(base_url: &str) -> String {
    let root = base_url.trim_end_matches('/');
    let root = root.strip_suffix("/v1").unwrap_or(root);
    format!("{root}/api/chat")
}

#[async_trait]
impl TextProvider for OllamaProvider {
    fn name(&self) -> &str {
        ProviderKind::Ollama.as_str()
    }

    async fn stream_text(&self, prompt: &str, system: &str) -> Result<FragmentStream, ProviderError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "stream": true
        });

        let response = self.client.post(&self.chat_url).json(&payload).send().await?;
        let response = ensure_success(response).await?;

        let mut upstream = lines(response.bytes_stream());
        let stream = async_stream::stream! {
            while let Some(next) = upstream.next().await {
                let line = match next {
                    Ok(line) => line,
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                };
                if let Some(fragment) = fragment_from_line(&line) {
                    yield Ok(fragment);
                }
            }
        };

        debug!(backend = self.name(), url = %self.chat_url, "stream prepared");
        Ok(stream.boxed())
    }
}

/// Extracts `message.content` from one NDJSON line. Blank, malformed and
/// empty-content lines produce nothing.
pub fn fragment_from_line(line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaChatChunk>(line) {
        Ok(chunk) => chunk
            .message
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty()),
        Err(error) => {
            debug!(error = %error, "skipping malformed ollama line");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: Option<String>,
}
