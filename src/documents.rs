use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read PDF: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Extracts text page by page, labelling each page and skipping pages that
/// carry no text.
pub fn extract_pdf_text(path: &Path) -> Result<String, DocumentError> {
    let document = lopdf::Document::load(path)?;

    let mut sections = Vec::new();
    for (index, page_number) in document.get_pages().keys().enumerate() {
        let text = match document.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(error) => {
                debug!(page = page_number, error = %error, "skipping unreadable page");
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        sections.push(format!("--- Page {} ---\n{}", index + 1, text.trim_end()));
    }

    Ok(sections.join("\n\n"))
}
