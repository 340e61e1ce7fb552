use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const AGENT_NAME: &str = "nerd-research-agent";

#[derive(Debug, Error)]
pub enum NotesError {
    #[error("failed to write research notes: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode research notes: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchNote {
    pub topic: String,
    pub timestamp: String,
    pub notes: String,
    pub sources: Vec<String>,
    pub metadata: NoteMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteMetadata {
    pub agent: String,
    pub version: String,
}

/// Writes `<safe topic>_<YYYYmmdd_HHMMSS>.json` under `output_dir`, creating
/// the directory when needed.
pub fn save_notes(
    output_dir: &Path,
    topic: &str,
    notes: &str,
    sources: &[String],
) -> Result<PathBuf, NotesError> {
    fs::create_dir_all(output_dir)?;

    let now = Local::now();
    let filename = format!("{}_{}.json", safe_topic(topic), now.format("%Y%m%d_%H%M%S"));
    let note = ResearchNote {
        topic: topic.to_owned(),
        timestamp: now.to_rfc3339(),
        notes: notes.to_owned(),
        sources: sources.to_vec(),
        metadata: NoteMetadata {
            agent: AGENT_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    };

    let path = output_dir.join(filename);
    fs::write(&path, serde_json::to_string_pretty(&note)?)?;
    info!(path = %path.display(), "research notes saved");
    Ok(path)
}

fn safe_topic(topic: &str) -> String {
    topic
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
