use std::fmt;

use serde::Deserialize;

pub const RESEARCH_SYSTEM_PROMPT: &str = "You are Nerd, an advanced AI research assistant. Your mission is to help users conduct thorough, accurate research.

## Core Capabilities
1. **Information Synthesis**: Combine knowledge into coherent insights
2. **Critical Analysis**: Evaluate sources and claims
3. **Big Discovery Mode**: Find novel connections between concepts

## Research Workflow
1. Clarify the research question
2. Break down into sub-questions
3. Analyze from multiple perspectives
4. Synthesize findings
5. Identify gaps and novel connections

## Guidelines
- Distinguish between facts and interpretations
- Acknowledge uncertainty and limitations
- Suggest follow-up questions
- Be concise but thorough

## Output Format
Structure your responses with clear sections:
- **Summary**: Brief overview (2-3 sentences)
- **Key Findings**: Numbered list of main points
- **Analysis**: Deeper examination
- **Gaps & Questions**: What remains unknown
- **Follow-up**: Suggested next steps
";

/// Big Discovery Mode preset.
pub const DISCOVERY_PROMPT: &str = "
## Big Discovery Mode

Analyze the research topic to identify:

### 1. Unexpected Connections
Look for surprising relationships between seemingly unrelated concepts.

### 2. Research Gaps
What questions remain unanswered? What hasn't been explored?

### 3. Novel Hypotheses
Based on the evidence, what new hypotheses could be tested?

### 4. Cross-Domain Insights
How might findings from one domain apply to another?

### 5. Contrarian Perspectives
What assumptions might be wrong? What's the opposite view?

Provide specific, actionable insights.
";

const CHAT_CONTEXT_TURNS: usize = 3;
const CHAT_CONTENT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl Depth {
    /// Unknown names fall back to `Standard`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "quick" => Self::Quick,
            "deep" => Self::Deep,
            _ => Self::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }

    pub fn instruction(self) -> String {
        match self {
            Self::Quick => "Provide a brief, focused overview.".to_owned(),
            Self::Standard => "Conduct thorough research with analysis.".to_owned(),
            Self::Deep => format!("Conduct exhaustive research.\n\n{DISCOVERY_PROMPT}"),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn research_prompt(topic: &str, depth: Depth) -> String {
    format!("Research Topic: {topic}\n\n{}", depth.instruction())
}

pub fn discover_prompt(topic: &str) -> String {
    format!(
        "\n{DISCOVERY_PROMPT}\n\nResearch question: {topic}\n\nAnalyze deeply and provide specific, actionable insights.\n"
    )
}

/// One prior message supplied by an HTTP chat client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatHistoryEntry {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_owned()
}

/// Chat-style context: the last three entries, each cut to 200 characters.
pub fn chat_prompt(history: &[ChatHistoryEntry], message: &str) -> String {
    let mut context = String::new();
    if !history.is_empty() {
        context.push_str("Previous conversation:\n");
        let start = history.len().saturating_sub(CHAT_CONTEXT_TURNS);
        for entry in &history[start..] {
            let content = truncate_chars(&entry.content, CHAT_CONTENT_CHARS);
            context.push_str(&format!("{}: {content}...\n", entry.role));
        }
        context.push('\n');
    }

    format!("{context}User: {message}")
}

/// Document-analysis template; the content is capped at 20 000 characters.
pub fn summary_prompt(content: &str, doc_type: &str) -> String {
    let content = truncate_chars(content, 20_000);
    format!(
        "
Analyze this {doc_type} and extract:

## Key Information
- **Title**: [Extract title]
- **Authors/Source**: [Extract if available]
- **Type**: {doc_type}

## Summary
[2-3 sentence overview]

## Key Points
1. [Main point 1]
2. [Main point 2]
3. [Main point 3]

## Key Findings
- [Finding 1]
- [Finding 2]

---
Content:
{content}
"
    )
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
