use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub vectors: VectorConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Text-completion provider. The API key comes from `OPENAI_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_openai")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            model: default_chat_model(),
            base_url: default_base_url(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_openai")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

/// `memory` or `qdrant`. The Qdrant key comes from `QDRANT_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: None,
            collection: default_collection(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub prompts_path: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            namespace: default_namespace(),
            prompts_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// When set, runs are also recorded in this SQLite database.
    #[serde(default)]
    pub database: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            database: None,
        }
    }
}

fn default_openai() -> String {
    "openai".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_vector_provider() -> String {
    "memory".to_string()
}

fn default_collection() -> String {
    "eu-ai-act-index".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_namespace() -> String {
    "eu_ai_act".to_string()
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_output_dir() -> String {
    "output".to_string()
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("AIACT").separator("__"));
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        let cfg = load(path.to_str()).unwrap();
        assert_eq!(cfg.oracle.model, "gpt-4o");
        assert_eq!(cfg.vectors.provider, "memory");
        assert_eq!(cfg.analysis.top_k, 5);
        assert_eq!(cfg.analysis.namespace, "eu_ai_act");
        assert_eq!(cfg.ingest.chunk_size, 800);
        assert_eq!(cfg.output.dir, "output");
        assert!(cfg.output.database.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[vectors]\nprovider = \"qdrant\"\nurl = \"http://localhost:6333\"\n\n[analysis]\ntop_k = 3\n",
        )
        .unwrap();
        let cfg = load(path.to_str()).unwrap();
        assert_eq!(cfg.vectors.provider, "qdrant");
        assert_eq!(cfg.vectors.url.as_deref(), Some("http://localhost:6333"));
        assert_eq!(cfg.vectors.collection, "eu-ai-act-index");
        assert_eq!(cfg.analysis.top_k, 3);
    }
}
