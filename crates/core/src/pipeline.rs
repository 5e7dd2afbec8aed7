use crate::analyzer::{AnalysisSettings, ComplianceAnalyzer};
use crate::classifier;
use crate::config::AppConfig;
use crate::corpus::DocumentationCorpus;
use crate::error::{AnalysisError, AnalysisPhase};
use crate::extractor;
use crate::models::{AnalysisResult, ClassificationResult};
use crate::prompts::{PromptCache, PromptSource};
use crate::report::{ReportRenderer, TextReportRenderer};
use crate::sink::{self, JsonFileSink, ResultSink, SqliteSink};
use crate::vectorstore::{ChunkStore, MemoryChunkStore, QdrantChunkStore};
use anyhow::Context;
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::qdrant::{QdrantClient, QdrantConfig};
use providers::{LlmProvider, ProviderRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::models::AnalysisSummary;
use storage::{connect, migrate};
use tracing::{info, warn};

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new()
        .with_embedding("noop", Arc::new(NoopProvider))
        .with_llm("noop", Arc::new(NoopProvider));

    if let Some(key) = std::env::var_os("OPENAI_API_KEY") {
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| config.oracle.base_url.clone());
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url,
            embedding_model: config.embeddings.model.clone(),
            chat_model: config.oracle.model.clone(),
            temperature: config.oracle.temperature,
        });
        reg = reg
            .with_embedding("openai", Arc::new(provider.clone()))
            .with_llm("openai", Arc::new(provider));
    }

    reg.set_preferred_embedding(&config.embeddings.provider)
        .set_preferred_llm(&config.oracle.provider)
}

pub fn build_chunk_store(
    config: &AppConfig,
    registry: &ProviderRegistry,
) -> anyhow::Result<Arc<dyn ChunkStore>> {
    match config.vectors.provider.as_str() {
        "qdrant" => {
            let url = config
                .vectors
                .url
                .clone()
                .context("vectors.url is required for the qdrant provider")?;
            let client = QdrantClient::new(QdrantConfig {
                url,
                collection: config.vectors.collection.clone(),
                api_key: std::env::var("QDRANT_API_KEY").ok(),
            });
            let embedder = registry.embedding(None).with_context(|| {
                format!("embedding provider '{}' unavailable", config.embeddings.provider)
            })?;
            Ok(Arc::new(QdrantChunkStore::new(
                client,
                embedder,
                config.embeddings.batch_size,
            )))
        }
        "memory" => Ok(Arc::new(MemoryChunkStore::new())),
        other => anyhow::bail!("unknown vector store provider: {other}"),
    }
}

pub fn build_prompts(config: &AppConfig) -> Arc<PromptCache> {
    let source = match &config.analysis.prompts_path {
        Some(path) => PromptSource::File(PathBuf::from(path)),
        None => PromptSource::Defaults,
    };
    let cache = PromptCache::new(source);
    cache.init();
    Arc::new(cache)
}

pub async fn build_sinks(config: &AppConfig) -> anyhow::Result<Vec<Box<dyn ResultSink>>> {
    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(JsonFileSink::new(&config.output.dir))];
    if let Some(db) = &config.output.database {
        let pool = connect(db).await.context("db connect")?;
        migrate(&pool).await.context("db migrate")?;
        sinks.push(Box::new(SqliteSink::new(pool)));
    }
    Ok(sinks)
}

/// Collaborators for one invocation, built from configuration or injected
/// directly.
pub struct Services {
    pub oracle: Arc<dyn LlmProvider>,
    pub store: Arc<dyn ChunkStore>,
    pub prompts: Arc<PromptCache>,
    pub sinks: Vec<Box<dyn ResultSink>>,
    pub settings: AnalysisSettings,
}

/// A persisted analysis and every location it was written to.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub locations: Vec<String>,
}

impl Services {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let registry = build_registry(config);
        let oracle = registry.llm(None).with_context(|| {
            format!(
                "oracle provider '{}' unavailable (is OPENAI_API_KEY set?)",
                config.oracle.provider
            )
        })?;
        Ok(Self {
            oracle,
            store: build_chunk_store(config, &registry)?,
            prompts: build_prompts(config),
            sinks: build_sinks(config).await?,
            settings: AnalysisSettings {
                top_k: config.analysis.top_k,
                namespace: config.analysis.namespace.clone(),
            },
        })
    }

    pub fn analyzer(&self) -> ComplianceAnalyzer {
        ComplianceAnalyzer::new(
            self.oracle.clone(),
            self.store.clone(),
            self.prompts.clone(),
            self.settings.clone(),
        )
    }

    /// Analyze, then hand the finished result to every sink. Nothing is
    /// persisted unless the analysis completed.
    pub async fn analyze(
        &self,
        system_name: &str,
        corpus: &DocumentationCorpus,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let result = self.analyzer().analyze(system_name, corpus).await?;
        let mut locations = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let location = sink
                .persist(&result)
                .await
                .map_err(AnalysisError::Persistence)?;
            locations.push(location);
        }
        Ok(AnalysisOutcome { result, locations })
    }

    pub async fn classify(
        &self,
        corpus: &DocumentationCorpus,
        use_oracle: bool,
    ) -> ClassificationResult {
        let oracle = use_oracle.then(|| self.oracle.as_ref());
        classifier::classify(corpus, oracle, &self.prompts).await
    }

    /// Chunk the regulation text and store it under the analysis namespace.
    pub async fn store_regulation(
        &self,
        path: &Path,
        chunk_size: usize,
        overlap: usize,
        force: bool,
    ) -> anyhow::Result<usize> {
        let text = extractor::extract_text(path)
            .with_context(|| format!("extract {}", path.display()))?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let chunks = extractor::chunk_document(&text, &source, chunk_size, overlap);
        if chunks.is_empty() {
            anyhow::bail!("no text extracted from {}", path.display());
        }
        let namespace = &self.settings.namespace;
        if force {
            info!(namespace = %namespace, "clearing namespace before indexing");
            self.store.delete(namespace).await?;
        }
        let stored = self.store.store(&chunks, namespace).await?;
        info!(namespace = %namespace, chunks = stored, source = %source, "regulation indexed");
        Ok(stored)
    }
}

/// Gather the documentation chunks under `docs_dir`.
pub fn load_corpus(config: &AppConfig, docs_dir: &Path) -> Result<DocumentationCorpus, AnalysisError> {
    let chunks = extractor::ingest_dir(
        docs_dir,
        config.ingest.chunk_size,
        config.ingest.chunk_overlap,
    )
    .map_err(|e| {
        warn!(dir = %docs_dir.display(), error = %e, "documentation not readable");
        AnalysisError::NoDocumentation
    })?;
    DocumentationCorpus::from_chunks(chunks.into_iter().map(|c| c.text))
}

pub async fn index_regulation(config: &AppConfig, path: &Path, force: bool) -> anyhow::Result<usize> {
    if config.vectors.provider == "memory" {
        warn!("vectors.provider is 'memory'; the index lives only as long as this process");
    }
    let registry = build_registry(config);
    let store = build_chunk_store(config, &registry)?;
    let services = Services {
        oracle: Arc::new(NoopProvider),
        store,
        prompts: Arc::new(PromptCache::defaults()),
        sinks: Vec::new(),
        settings: AnalysisSettings {
            top_k: config.analysis.top_k,
            namespace: config.analysis.namespace.clone(),
        },
    };
    services
        .store_regulation(
            path,
            config.ingest.chunk_size,
            config.ingest.chunk_overlap,
            force,
        )
        .await
}

pub async fn run_analysis(
    config: &AppConfig,
    docs_dir: &Path,
    system_name: &str,
) -> anyhow::Result<AnalysisOutcome> {
    let corpus = load_corpus(config, docs_dir)?;
    ensure_regulation_index(config)?;
    let services = Services::from_config(config).await?;
    Ok(services.analyze(system_name, &corpus).await?)
}

/// A `memory` store starts empty in every process, so category scoring
/// would run with no regulation context at all.
fn ensure_regulation_index(config: &AppConfig) -> Result<(), AnalysisError> {
    if config.vectors.provider == "memory" {
        return Err(AnalysisError::Retrieval {
            phase: AnalysisPhase::CategoryAnalysis,
            source: anyhow::anyhow!(
                "namespace '{}' is empty: set vectors.provider = \"qdrant\" and run index-act first",
                config.analysis.namespace
            ),
        });
    }
    Ok(())
}

pub async fn run_classification(
    config: &AppConfig,
    docs_dir: &Path,
    use_oracle: bool,
) -> anyhow::Result<ClassificationResult> {
    let corpus = load_corpus(config, docs_dir)?;
    if !use_oracle {
        return Ok(classifier::classify(&corpus, None, &build_prompts(config)).await);
    }
    let services = Services::from_config(config).await?;
    Ok(services.classify(&corpus, true).await)
}

pub fn write_report(result: &AnalysisResult, out: &Path) -> Result<(), AnalysisError> {
    let text = TextReportRenderer.render(result);
    sink::write_atomic(out, text.as_bytes()).map_err(AnalysisError::Rendering)?;
    info!(path = %out.display(), "report written");
    Ok(())
}

pub fn load_saved_analysis(path: &Path) -> anyhow::Result<AnalysisResult> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn render_saved_report(path: &Path) -> anyhow::Result<String> {
    let result = load_saved_analysis(path)?;
    Ok(TextReportRenderer.render(&result))
}

pub async fn history(config: &AppConfig) -> anyhow::Result<Vec<AnalysisSummary>> {
    let db = config
        .output
        .database
        .as_deref()
        .context("output.database is not configured")?;
    let pool = connect(db).await.context("db connect")?;
    migrate(&pool).await.context("db migrate")?;
    storage::list_analyses(&pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(dir: &Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.output.dir = dir.join("output").display().to_string();
        cfg
    }

    #[test]
    fn empty_docs_dir_is_input_absent() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(&AppConfig::default(), dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::NoDocumentation));
        let err = load_corpus(&AppConfig::default(), &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, AnalysisError::NoDocumentation));
    }

    #[tokio::test]
    async fn analysis_refuses_an_empty_memory_index() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("overview.md"), "MediScan supports radiologist review of MRI scans.")
            .unwrap();
        let cfg = config_with(dir.path());
        assert_eq!(cfg.vectors.provider, "memory");

        let err = run_analysis(&cfg, &docs, "MediScan").await.unwrap_err();
        let err = err.downcast_ref::<AnalysisError>().unwrap();
        assert!(matches!(err, AnalysisError::Retrieval { .. }));
        assert_eq!(err.phase(), AnalysisPhase::CategoryAnalysis);
        assert!(err.to_string().contains("index-act"));
        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn unknown_vector_provider_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.vectors.provider = "pinecone".into();
        assert!(build_chunk_store(&cfg, &build_registry(&cfg)).is_err());
        cfg.vectors.provider = "qdrant".into();
        assert!(build_chunk_store(&cfg, &build_registry(&cfg)).is_err());
    }

    #[tokio::test]
    async fn classification_without_oracle_uses_heuristics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("overview.md"),
            "ServiceBot is a chatbot answering every support ticket for our servicebot desk.",
        )
        .unwrap();
        let result = run_classification(&config_with(dir.path()), dir.path(), false)
            .await
            .unwrap();
        assert_eq!(result.category, crate::models::RiskCategory::LimitedRisk);
        assert_eq!(result.method, crate::models::ClassificationMethod::Heuristic);
    }

    #[tokio::test]
    async fn regulation_is_indexed_and_reindexed_with_force() {
        let dir = tempfile::tempdir().unwrap();
        let act = dir.path().join("act.txt");
        std::fs::write(
            &act,
            "Article 5\nProhibited practices.\n\nArticle 10\nData and data governance.",
        )
        .unwrap();
        let store = Arc::new(MemoryChunkStore::new());
        let services = Services {
            oracle: Arc::new(NoopProvider),
            store: store.clone(),
            prompts: Arc::new(PromptCache::defaults()),
            sinks: Vec::new(),
            settings: AnalysisSettings::default(),
        };
        let stored = services.store_regulation(&act, 40, 0, false).await.unwrap();
        assert!(stored >= 2);
        let before = store.len("eu_ai_act");
        services.store_regulation(&act, 40, 0, true).await.unwrap();
        assert_eq!(store.len("eu_ai_act"), before);
    }

    #[test]
    fn saved_analysis_renders_to_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        std::fs::write(
            &path,
            r#"{"system_name":"Toy","system_type":"minimal-risk",
               "classification":{"category":"minimal-risk","method":"default","evidence":[]},
               "overall_score":0.9,"category_scores":{"transparency":0.9},
               "analyzed_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let text = render_saved_report(&path).unwrap();
        assert!(text.contains("Overall Compliance Score: 90.0% (Highly Compliant)"));
        assert!(render_saved_report(&dir.path().join("missing.json")).is_err());
    }
}
