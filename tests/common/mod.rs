#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use nerd_research_agent::{
    config::{ProviderConfig, ProviderKind},
    provider::{
        agent::{AgentRequest, AgentRunner},
        FragmentStream, ProviderError,
    },
};

pub fn ollama_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::Ollama,
        api_key: None,
        base_url: Some(base_url.to_owned()),
        model: "phi3".to_owned(),
    }
}

pub fn groq_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::Groq,
        api_key: Some("gsk-test".to_owned()),
        base_url: Some(base_url.to_owned()),
        model: "llama-3.1-70b-versatile".to_owned(),
    }
}

pub fn agent_config() -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::Anthropic,
        api_key: None,
        base_url: None,
        model: "claude-sonnet-4-20250514".to_owned(),
    }
}

/// Agent that answers one fragment and then loses its transport.
pub struct InterruptedAgent;

#[async_trait]
impl AgentRunner for InterruptedAgent {
    async fn run(&self, _request: AgentRequest) -> Result<FragmentStream, ProviderError> {
        let items = vec![
            Ok("A".to_owned()),
            Err(ProviderError::Read("upstream reset".to_owned())),
            Ok("never delivered".to_owned()),
        ];
        Ok(stream::iter(items).boxed())
    }
}

/// Base URL of a port that was just released, so connecting to it is refused.
pub async fn refused_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}/v1")
}

pub async fn collect_fragments(stream: FragmentStream) -> Vec<String> {
    stream
        .map(|next| next.expect("fragment should not fail"))
        .collect()
        .await
}
