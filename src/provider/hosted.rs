use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    config::{ProviderConfig, ProviderKind},
    provider::{ensure_success, http_client, lines, FragmentStream, ProviderError, TextProvider},
};

/// OpenAI-compatible hosted completions API (Groq by default).
#[derive(Clone)]
pub struct HostedProvider {
    kind: ProviderKind,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl HostedProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| ProviderError::Config(format!("{} has no endpoint", config.kind)))?;

        Ok(Self {
            kind: config.kind,
            client: http_client()?,
            // A missing key is sent as-is; the upstream rejects it.
            api_key: config.api_key.clone().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl TextProvider for HostedProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
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

        let response = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
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

                match parse_sse_line(&line) {
                    SseLine::Fragment(content) => {
                        yield Ok(content);
                    }
                    SseLine::Done => break,
                    SseLine::Skip => {}
                }
            }
        };

        debug!(backend = self.name(), model = %self.model, "stream prepared");
        Ok(stream.boxed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

/// Interprets one server-sent-event line. Only `data: ` lines carry
/// content; `data: [DONE]` ends the stream.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Skip;
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let parsed: CompletionChunk = match serde_json::from_str(data) {
        Ok(parsed) => parsed,
        Err(error) => {
            debug!(error = %error, "skipping malformed completion chunk");
            return SseLine::Skip;
        }
    };

    let Some(choice) = parsed.choices.into_iter().next() else {
        debug!("skipping completion chunk without choices");
        return SseLine::Skip;
    };

    match choice.delta.content.filter(|content| !content.is_empty()) {
        Some(content) => SseLine::Fragment(content),
        None => SseLine::Skip,
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    delta: CompletionDelta,
}

#[derive(Debug, Deserialize)]
struct CompletionDelta {
    #[serde(default)]
    content: Option<String>,
}
