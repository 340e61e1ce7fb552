pub mod agent;
pub mod hosted;
pub mod ollama;

use std::{fmt::Display, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{stream::BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::config::{ProviderConfig, ProviderKind};

use self::{
    agent::{AgentProvider, AgentRunner, ClaudeCliRunner},
    hosted::HostedProvider,
    ollama::OllamaProvider,
};

/// Bounds the whole exchange, from connect until the last byte of the body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ordered, forward-only sequence of non-empty text fragments.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn stream_text(&self, prompt: &str, system: &str) -> Result<FragmentStream, ProviderError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Read(String),
    #[error("agent failed: {0}")]
    Agent(String),
    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            ProviderError::Connect(error.to_string())
        } else {
            ProviderError::Read(error.to_string())
        }
    }
}

/// Maps a resolved backend descriptor onto the provider that serves it.
#[derive(Clone)]
pub struct Dispatcher {
    agent: Arc<dyn AgentRunner>,
}

impl Dispatcher {
    pub fn new(agent: Arc<dyn AgentRunner>) -> Self {
        Self { agent }
    }

    pub fn from_env() -> Self {
        Self::new(Arc::new(ClaudeCliRunner::from_env()))
    }

    pub fn provider_for(&self, config: &ProviderConfig) -> Result<Box<dyn TextProvider>, ProviderError> {
        let provider: Box<dyn TextProvider> = match config.kind {
            ProviderKind::Ollama => Box::new(OllamaProvider::new(config)?),
            ProviderKind::Groq => Box::new(HostedProvider::new(config)?),
            ProviderKind::Anthropic => Box::new(AgentProvider::new(self.agent.clone(), config)),
        };
        Ok(provider)
    }

    pub async fn stream(
        &self,
        prompt: &str,
        system: &str,
        config: &ProviderConfig,
    ) -> Result<FragmentStream, ProviderError> {
        let provider = self.provider_for(config)?;
        debug!(provider = provider.name(), model = %config.model, "dispatching prompt");
        provider.stream_text(prompt, system).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_env()
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|error| ProviderError::Config(format!("failed to build HTTP client: {error}")))
}

pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown upstream error".to_owned());
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> ProviderError {
    let trimmed = body.chars().take(400).collect::<String>();
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Timeout(format!("upstream timeout: {trimmed}"))
        }
        _ => ProviderError::Status {
            status: status.as_u16(),
            body: trimmed,
        },
    }
}

/// Longest line kept while waiting for its newline. Anything longer is
/// discarded up to the next `\n`.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a chunked byte stream into lines without the trailing `\n` or `\r`.
///
/// Partial lines are carried across chunks and a final unterminated line is
/// still emitted when the transport closes. Lines that are not valid UTF-8
/// or longer than [`MAX_LINE_BYTES`] are dropped.
pub fn lines<S, B, E>(chunks: S) -> BoxStream<'static, Result<String, ProviderError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();
        // Prefix of `buffer` already known to contain no newline.
        let mut scanned = 0usize;
        let mut oversized = false;

        while let Some(next) = chunks.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(error) => {
                    yield Err(ProviderError::Read(error.to_string()));
                    buffer.clear();
                    break;
                }
            };
            buffer.extend_from_slice(bytes.as_ref());

            let mut start = 0usize;
            while let Some(offset) = buffer[scanned..].iter().position(|byte| *byte == b'\n') {
                let end = scanned + offset;
                if oversized {
                    oversized = false;
                } else if let Some(line) = decode_line(&buffer[start..end]) {
                    yield Ok(line);
                }
                start = end + 1;
                scanned = start;
            }
            buffer.drain(..start);
            scanned = buffer.len();

            if buffer.len() > MAX_LINE_BYTES {
                debug!(bytes = buffer.len(), "discarding line over the length limit");
                buffer.clear();
                scanned = 0;
                oversized = true;
            }
        }

        if !buffer.is_empty() && !oversized {
            if let Some(line) = decode_line(&buffer) {
                yield Ok(line);
            }
        }
    };
    stream.boxed()
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(line) => Some(line.to_owned()),
        Err(error) => {
            debug!(error = %error, "dropping non-UTF-8 line");
            None
        }
    }
}
