use futures_util::StreamExt;
use tracing::info;

use crate::{
    config::ProviderConfig,
    prompts::{truncate_chars, DISCOVERY_PROMPT, RESEARCH_SYSTEM_PROMPT},
    provider::{Dispatcher, ProviderError},
};

const CONTEXT_TURNS: usize = 3;
const QUESTION_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub response: String,
}

/// Multi-turn research conversation. The full history is kept; only the
/// most recent turns feed the prompt.
pub struct ResearchSession {
    config: ProviderConfig,
    dispatcher: Dispatcher,
    history: Vec<ConversationTurn>,
}

impl ResearchSession {
    pub fn new(config: ProviderConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn record(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
    }

    pub fn context(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }

        let mut context = String::from("Previous discussion:\n");
        let start = self.history.len().saturating_sub(CONTEXT_TURNS);
        for turn in &self.history[start..] {
            context.push_str(&format!(
                "Q: {}...\n",
                truncate_chars(&turn.question, QUESTION_CHARS)
            ));
        }
        context
    }

    pub fn prompt_for(&self, question: &str) -> String {
        format!("{}\nNew question: {question}", self.context())
    }

    /// Streams the answer through `on_fragment` and records the turn once the
    /// backend finishes. A failed exchange leaves the history untouched.
    pub async fn ask<F>(&mut self, question: &str, mut on_fragment: F) -> Result<String, ProviderError>
    where
        F: FnMut(&str),
    {
        let prompt = self.prompt_for(question);
        let mut fragments = self
            .dispatcher
            .stream(&prompt, RESEARCH_SYSTEM_PROMPT, &self.config)
            .await?;

        let mut response = String::new();
        while let Some(next) = fragments.next().await {
            let fragment = next?;
            on_fragment(&fragment);
            response.push_str(&fragment);
        }

        info!(
            provider = %self.config.kind,
            turns = self.history.len() + 1,
            response_chars = response.chars().count(),
            "research turn completed"
        );
        self.record(ConversationTurn {
            question: question.to_owned(),
            response: response.clone(),
        });
        Ok(response)
    }

    /// Big Discovery Mode for a single question.
    pub async fn discover<F>(&mut self, question: &str, on_fragment: F) -> Result<String, ProviderError>
    where
        F: FnMut(&str),
    {
        let prompt = format!("{DISCOVERY_PROMPT}\n\nResearch question: {question}");
        self.ask(&prompt, on_fragment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ResearchSession {
        let config = ProviderConfig::resolve_with(|_| None);
        ResearchSession::new(config, Dispatcher::default())
    }

    fn turn(question: &str) -> ConversationTurn {
        ConversationTurn {
            question: question.to_owned(),
            response: "answer".to_owned(),
        }
    }

    #[test]
    fn empty_history_has_no_context() {
        let session = session();
        assert_eq!(session.context(), "");
        assert_eq!(session.prompt_for("why?"), "\nNew question: why?");
    }

    #[test]
    fn context_is_limited_to_three_most_recent_turns() {
        let mut session = session();
        for index in 1..=6 {
            session.record(turn(&format!("question {index}")));
        }

        let context = session.context();
        assert_eq!(
            context,
            "Previous discussion:\nQ: question 4...\nQ: question 5...\nQ: question 6...\n"
        );
        assert_eq!(session.history().len(), 6);
    }

    #[test]
    fn questions_are_cut_to_one_hundred_chars() {
        let mut session = session();
        session.record(turn(&"q".repeat(150)));
        let context = session.context();
        assert!(context.contains(&format!("Q: {}...\n", "q".repeat(100))));
        assert!(!context.contains(&"q".repeat(101)));
    }
}
