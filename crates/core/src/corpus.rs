//! The documentation under analysis, assembled once per run.

use crate::error::AnalysisError;

/// Ordered documentation chunks with two derived views: the original-case
/// text used for prompts and a lowercase copy used for pattern scanning.
#[derive(Debug, Clone)]
pub struct DocumentationCorpus {
    chunks: Vec<String>,
    text: String,
    lowered: String,
}

impl DocumentationCorpus {
    /// Assemble a corpus; fails with [`AnalysisError::NoDocumentation`] when
    /// every chunk is blank.
    pub fn from_chunks<I, S>(chunks: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks: Vec<String> = chunks
            .into_iter()
            .map(Into::into)
            .filter(|c| !c.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Err(AnalysisError::NoDocumentation);
        }
        let text = chunks.join("\n\n");
        let lowered = text.to_lowercase();
        Ok(Self {
            chunks,
            text,
            lowered,
        })
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lowered(&self) -> &str {
        &self.lowered
    }
}
