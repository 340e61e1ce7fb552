use serde::{Deserialize, Serialize};

use crate::{
    config::ProviderConfig,
    notes::AGENT_NAME,
    prompts::{ChatHistoryEntry, Depth},
};

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default = "default_depth")]
    pub depth: String,
}

fn default_depth() -> String {
    Depth::Standard.as_str().to_owned()
}

impl ResearchRequest {
    pub fn validated_topic(&self) -> Result<&str, String> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err("topic must not be empty".to_owned());
        }
        Ok(topic)
    }

    pub fn depth(&self) -> Depth {
        Depth::from_name(&self.depth)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Option<Vec<ChatHistoryEntry>>,
}

impl ChatRequest {
    pub fn validated_message(&self) -> Result<&str, String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_owned());
        }
        Ok(&self.message)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub agent: &'static str,
    pub provider: &'static str,
    pub model: String,
}

impl StatusResponse {
    pub fn for_config(config: &ProviderConfig) -> Self {
        Self {
            status: "ok",
            agent: AGENT_NAME,
            provider: config.kind.as_str(),
            model: config.model.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
