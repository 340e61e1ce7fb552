use std::io::{self, Write};

use chrono::Local;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::{
    config::ProviderConfig,
    prompts::{research_prompt, Depth, RESEARCH_SYSTEM_PROMPT},
    provider::{Dispatcher, ProviderError},
};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchOutcome {
    pub text: String,
    pub error: Option<String>,
}

impl ResearchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs one research query and renders it for a terminal. Backend failures
/// are reported inline; only writes to `out` can fail this function.
pub async fn run_research<W: Write>(
    dispatcher: &Dispatcher,
    config: &ProviderConfig,
    topic: &str,
    depth: Depth,
    out: &mut W,
) -> io::Result<ResearchOutcome> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{rule}")?;
    writeln!(out, "NERD RESEARCH AGENT")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "{}", config.describe())?;
    writeln!(out, "Topic: {topic}")?;
    writeln!(out, "Depth: {depth}")?;
    writeln!(out, "{rule}\n")?;

    let prompt = research_prompt(topic, depth);
    let mut text = String::new();
    let result = stream_into(dispatcher, config, &prompt, &mut text, out).await?;

    if let Err(error) = result {
        warn!(provider = %config.kind, error = %error, "research request failed");
        writeln!(out, "\nError: {error}")?;
        if let Some(hint) = config.kind.troubleshooting_hint() {
            writeln!(out, "\n{hint}")?;
        }
        out.flush()?;
        return Ok(ResearchOutcome {
            text,
            error: Some(error.to_string()),
        });
    }

    writeln!(out, "\n\n{rule}")?;
    writeln!(out, "Research complete - {}", Local::now().format("%H:%M:%S"))?;
    writeln!(out, "{rule}\n")?;
    out.flush()?;

    Ok(ResearchOutcome { text, error: None })
}

/// Writes one fragment for an interactive reader and flushes it so it shows
/// up immediately. Terminal write failures must not abort the session.
pub fn echo_fragment<W: Write>(out: &mut W, fragment: &str) {
    if let Err(error) = out.write_all(fragment.as_bytes()).and_then(|()| out.flush()) {
        debug!(error = %error, "failed to echo fragment");
    }
}

async fn stream_into<W: Write>(
    dispatcher: &Dispatcher,
    config: &ProviderConfig,
    prompt: &str,
    text: &mut String,
    out: &mut W,
) -> io::Result<Result<(), ProviderError>> {
    let mut fragments = match dispatcher.stream(prompt, RESEARCH_SYSTEM_PROMPT, config).await {
        Ok(fragments) => fragments,
        Err(error) => return Ok(Err(error)),
    };

    while let Some(next) = fragments.next().await {
        match next {
            Ok(fragment) => {
                write!(out, "{fragment}")?;
                out.flush()?;
                text.push_str(&fragment);
            }
            Err(error) => return Ok(Err(error)),
        }
    }

    Ok(Ok(()))
}
