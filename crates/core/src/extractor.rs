use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One chunk of an ingested document with the metadata stored alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source: String,
    pub chunk_id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annex_number: Option<String>,
}

impl DocumentChunk {
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("source".into(), self.source.clone().into());
        map.insert("chunk_id".into(), self.chunk_id.into());
        if let Some(article) = &self.article_number {
            map.insert("article_number".into(), article.clone().into());
        }
        if let Some(annex) = &self.annex_number {
            map.insert("annex_number".into(), annex.clone().into());
        }
        map
    }
}

lazy_static! {
    static ref HTML_TAG: Regex =
        Regex::new(r"<[^>]*>").unwrap_or_else(|e| panic!("invalid tag pattern: {e}"));
    static ref ARTICLE: Regex = Regex::new(r"Article\s+(\d+(?:\s*\(\d+\))?)")
        .unwrap_or_else(|e| panic!("invalid article pattern: {e}"));
    static ref ANNEX: Regex =
        Regex::new(r"ANNEX\s+([IVX]+)").unwrap_or_else(|e| panic!("invalid annex pattern: {e}"));
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    match extension(path) {
        Some(ext) => {
            TEXT_EXTENSIONS.contains(&ext.as_str())
                || HTML_EXTENSIONS.contains(&ext.as_str())
                || ext == "pdf"
        }
        None => false,
    }
}

/// Plain text of one document, chosen by file extension.
pub fn extract_text(path: &Path) -> anyhow::Result<String> {
    let ext = extension(path).unwrap_or_default();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Ok(fs::read_to_string(path)?)
    } else if HTML_EXTENSIONS.contains(&ext.as_str()) {
        Ok(strip_html(&fs::read_to_string(path)?))
    } else if ext == "pdf" {
        pdf_text(path)
    } else {
        anyhow::bail!("unsupported document type: {}", path.display())
    }
}

pub fn strip_html(html: &str) -> String {
    HTML_TAG.replace_all(html, "").into_owned()
}

#[cfg(feature = "pdf")]
fn pdf_text(path: &Path) -> anyhow::Result<String> {
    Ok(pdf_extract::extract_text(path)?)
}

#[cfg(not(feature = "pdf"))]
fn pdf_text(path: &Path) -> anyhow::Result<String> {
    anyhow::bail!(
        "{}: PDF extraction needs the `pdf` feature",
        path.display()
    )
}

pub fn article_number(text: &str) -> Option<String> {
    ARTICLE
        .captures(text)
        .map(|c| c[1].trim().to_string())
}

pub fn annex_number(text: &str) -> Option<String> {
    ANNEX.captures(text).map(|c| c[1].to_string())
}

/// Byte offset `n` characters after `from`, clamped to the end.
fn advance(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte offset `n` characters before `to`, clamped to the start.
fn retreat(text: &str, to: usize, n: usize) -> usize {
    if n == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

const BREAKS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Split into windows of at most `size` characters. Each window ends at the
/// last paragraph, line, sentence or word break in its second half when one
/// exists; consecutive windows share `overlap` characters.
pub fn split_into_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let overlap = overlap.min(size / 2);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = advance(text, start, size);
        if end < text.len() {
            let min_break = advance(text, start, size / 2);
            let window = &text[min_break..end];
            if let Some(cut) = BREAKS
                .iter()
                .find_map(|b| window.rfind(b).map(|i| min_break + i + b.len()))
            {
                end = cut;
            }
        }
        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end >= text.len() {
            break;
        }
        let next = retreat(text, end, overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

pub fn chunk_document(
    text: &str,
    source: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    split_into_chunks(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(chunk_id, text)| DocumentChunk {
            article_number: article_number(&text),
            annex_number: annex_number(&text),
            source: source.to_string(),
            chunk_id,
            text,
        })
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Supported documents under `dir`, in sorted path order.
pub fn discover(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.exists() {
        anyhow::bail!("documentation directory not found: {}", dir.display());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_supported(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Read and chunk every supported document under `dir`. Files that fail to
/// extract are logged and skipped.
pub fn ingest_dir(dir: &Path, chunk_size: usize, overlap: usize) -> anyhow::Result<Vec<DocumentChunk>> {
    let mut chunks = Vec::new();
    for path in discover(dir)? {
        let text = match extract_text(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping document");
                continue;
            }
        };
        let source = path
            .strip_prefix(dir)
            .unwrap_or(path.as_path())
            .to_string_lossy()
            .to_string();
        let doc_chunks = chunk_document(&text, &source, chunk_size, overlap);
        tracing::info!(source = %source, chunks = doc_chunks.len(), "ingested document");
        chunks.extend(doc_chunks);
    }
    Ok(chunks)
}
