use std::{
    env, fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use tracing::warn;

pub const PROVIDER_VAR: &str = "RESEARCH_PROVIDER";
pub const MODEL_VAR: &str = "RESEARCH_MODEL";
pub const BASE_URL_VAR: &str = "RESEARCH_BASE_URL";
pub const ADDR_VAR: &str = "RESEARCH_AGENT_ADDR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Ollama,
    Groq,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Ollama, Self::Groq, Self::Anthropic];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Groq => "groq",
            Self::Anthropic => "anthropic",
        }
    }

    /// Case-insensitive match against the closed set of backend names.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "phi3",
            Self::Groq => "llama-3.1-70b-versatile",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Anthropic => None,
        }
    }

    fn credential_var(self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }

    pub fn cost_label(self) -> &'static str {
        match self {
            Self::Ollama => "FREE (local)",
            Self::Groq => "FREE tier available",
            Self::Anthropic => "Paid API",
        }
    }

    pub fn troubleshooting_hint(self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some(
                "Make sure Ollama is running: ollama serve\nAnd you have a model: ollama pull llama3.1",
            ),
            Self::Groq => Some("Check your GROQ_API_KEY in .env"),
            Self::Anthropic => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved, immutable description of the backend a request goes to.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl ProviderConfig {
    /// Reads the process environment every time; nothing is cached.
    pub fn from_env() -> Self {
        Self::resolve_with(|name| env::var(name).ok())
    }

    pub fn resolve_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let requested = lookup(PROVIDER_VAR).unwrap_or_else(|| ProviderKind::Ollama.as_str().to_owned());
        let kind = match ProviderKind::parse(&requested) {
            Some(kind) => kind,
            None => {
                warn!(
                    provider = %requested,
                    fallback = ProviderKind::Ollama.as_str(),
                    "unknown provider, defaulting to ollama"
                );
                ProviderKind::Ollama
            }
        };

        let api_key = kind.credential_var().and_then(|name| lookup(name));
        // The agent backend is reached through its CLI, never a raw endpoint.
        let base_url = kind.default_base_url().map(|default| {
            lookup(BASE_URL_VAR)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_owned())
                .trim_end_matches('/')
                .to_owned()
        });
        let model = lookup(MODEL_VAR).unwrap_or_else(|| kind.default_model().to_owned());

        Self {
            kind,
            api_key,
            base_url,
            model,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Provider: {}\nModel: {}\nCost: {}\n",
            self.kind,
            self.model,
            self.kind.cost_label()
        )
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl ServerConfig {
    pub const DEFAULT_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8100);

    pub fn from_env() -> Self {
        Self::resolve_with(|name| env::var(name).ok())
    }

    pub fn resolve_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = match lookup(ADDR_VAR) {
            None => Self::DEFAULT_ADDR,
            Some(value) => value.trim().parse::<SocketAddr>().unwrap_or_else(|error| {
                warn!(
                    var = ADDR_VAR,
                    value = %value,
                    error = %error,
                    fallback = %Self::DEFAULT_ADDR,
                    "invalid listen address, using default"
                );
                Self::DEFAULT_ADDR
            }),
        };
        Self { addr }
    }
}

#[derive(Debug, Clone)]
pub struct NotesConfig {
    pub output_dir: PathBuf,
}

impl NotesConfig {
    pub fn from_env() -> Self {
        let output_dir = env::var("RESEARCH_OUTPUT_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "./research_output".to_owned());
        Self {
            output_dir: PathBuf::from(output_dir),
        }
    }
}
