use crate::extractor::DocumentChunk;
use providers::qdrant::{namespace_filter, QdrantClient, QdrantPoint};
use providers::{EmbeddingProvider, ProviderError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A reference passage returned by a search, best match first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub score: f32,
}

/// Namespaced text-chunk storage with relevance search.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    async fn store(&self, chunks: &[DocumentChunk], namespace: &str) -> anyhow::Result<usize>;

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        namespace: &str,
    ) -> anyhow::Result<Vec<RetrievedPassage>>;

    /// Remove every chunk in `namespace`. Deleting an absent namespace succeeds.
    async fn delete(&self, namespace: &str) -> anyhow::Result<()>;
}

/// Stable point id for a chunk: a blake3 digest of namespace and text,
/// formatted as a UUID so Qdrant accepts it.
pub fn point_id(namespace: &str, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(namespace.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    let hex = hasher.finalize().to_hex();
    let h = hex.as_str();
    format!(
        "{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}

pub struct QdrantChunkStore {
    client: QdrantClient,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl QdrantChunkStore {
    pub fn new(client: QdrantClient, embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            client,
            embedder,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait::async_trait]
impl ChunkStore for QdrantChunkStore {
    async fn store(&self, chunks: &[DocumentChunk], namespace: &str) -> anyhow::Result<usize> {
        let mut stored = 0;
        let mut collection_ready = false;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let resp = self.embedder.embed(&texts).await?;
            if resp.vectors.len() != batch.len() {
                anyhow::bail!(
                    "embedding provider returned {} vectors for {} chunks",
                    resp.vectors.len(),
                    batch.len()
                );
            }
            if !collection_ready {
                let size = resp.vectors.first().map(Vec::len).unwrap_or_default();
                self.client.ensure_collection(size).await?;
                collection_ready = true;
            }
            let points: Vec<QdrantPoint> = batch
                .iter()
                .zip(resp.vectors)
                .map(|(chunk, vector)| {
                    let mut payload: HashMap<String, serde_json::Value> =
                        chunk.metadata().into_iter().collect();
                    payload.insert("text".into(), chunk.text.clone().into());
                    payload.insert("namespace".into(), namespace.into());
                    QdrantPoint {
                        id: point_id(namespace, &chunk.text),
                        vector,
                        payload,
                    }
                })
                .collect();
            stored += points.len();
            self.client.upsert(points).await?;
            tracing::debug!(namespace, stored, "upserted chunk batch");
        }
        Ok(stored)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        namespace: &str,
    ) -> anyhow::Result<Vec<RetrievedPassage>> {
        let resp = self.embedder.embed(&[query.to_string()]).await?;
        let vector = resp
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedding provider returned no vector for query"))?;
        let results = self
            .client
            .search(vector, top_k as u64, Some(namespace_filter(namespace)))
            .await?;
        Ok(results
            .result
            .into_iter()
            .filter_map(|hit| {
                let mut payload = match hit.payload {
                    Some(serde_json::Value::Object(map)) => map,
                    _ => return None,
                };
                let text = match payload.remove("text") {
                    Some(serde_json::Value::String(text)) => text,
                    _ => return None,
                };
                Some(RetrievedPassage {
                    text,
                    metadata: payload,
                    score: hit.score,
                })
            })
            .collect())
    }

    async fn delete(&self, namespace: &str) -> anyhow::Result<()> {
        match self.client.delete_by_filter(namespace_filter(namespace)).await {
            Ok(()) => Ok(()),
            Err(ProviderError::NotFound(what)) => {
                tracing::info!(namespace, collection = %what, "nothing to delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredChunk {
    id: String,
    text: String,
    metadata: serde_json::Map<String, serde_json::Value>,
    terms: HashSet<String>,
}

/// In-process store ranking passages by query-term overlap. Used when no
/// vector database is configured.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    namespaces: Mutex<HashMap<String, Vec<StoredChunk>>>,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .lock()
            .map(|ns| ns.get(namespace).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn store(&self, chunks: &[DocumentChunk], namespace: &str) -> anyhow::Result<usize> {
        let mut guard = self
            .namespaces
            .lock()
            .map_err(|_| anyhow::anyhow!("chunk store lock poisoned"))?;
        let entries = guard.entry(namespace.to_string()).or_default();
        for chunk in chunks {
            let id = point_id(namespace, &chunk.text);
            if entries.iter().any(|e| e.id == id) {
                continue;
            }
            entries.push(StoredChunk {
                id,
                terms: terms(&chunk.text),
                text: chunk.text.clone(),
                metadata: chunk.metadata(),
            });
        }
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        namespace: &str,
    ) -> anyhow::Result<Vec<RetrievedPassage>> {
        let guard = self
            .namespaces
            .lock()
            .map_err(|_| anyhow::anyhow!("chunk store lock poisoned"))?;
        let Some(entries) = guard.get(namespace) else {
            return Ok(Vec::new());
        };
        let query_terms = terms(query);
        let mut scored: Vec<(usize, &StoredChunk)> = entries
            .iter()
            .map(|e| (e.terms.intersection(&query_terms).count(), e))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let denom = query_terms.len().max(1) as f32;
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(hits, e)| RetrievedPassage {
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score: hits as f32 / denom,
            })
            .collect())
    }

    async fn delete(&self, namespace: &str) -> anyhow::Result<()> {
        let mut guard = self
            .namespaces
            .lock()
            .map_err(|_| anyhow::anyhow!("chunk store lock poisoned"))?;
        guard.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, id: usize) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source: "eu-ai-act.txt".to_string(),
            chunk_id: id,
            article_number: None,
            annex_number: None,
        }
    }

    #[test]
    fn point_ids_are_uuid_shaped_and_namespaced() {
        let a = point_id("eu_ai_act", "Article 5");
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
        assert_eq!(a, point_id("eu_ai_act", "Article 5"));
        assert_ne!(a, point_id("other", "Article 5"));
    }

    #[tokio::test]
    async fn memory_store_ranks_by_term_overlap() {
        let store = MemoryChunkStore::new();
        store
            .store(
                &[
                    chunk("Article 13 transparency obligations for providers", 0),
                    chunk("Article 10 data governance and data quality", 1),
                    chunk("Recitals on innovation", 2),
                ],
                "eu_ai_act",
            )
            .await
            .unwrap();
        let hits = store
            .search("data_governance requirements for high-risk data governance", 2, "eu_ai_act")
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("data governance"));
        assert!(hits[0].score > hits[1].score);
        assert!(store.search("anything", 5, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_is_idempotent_and_deletes_namespaces() {
        let store = MemoryChunkStore::new();
        let chunks = [chunk("Article 5 prohibited practices", 0)];
        store.store(&chunks, "eu_ai_act").await.unwrap();
        store.store(&chunks, "eu_ai_act").await.unwrap();
        assert_eq!(store.len("eu_ai_act"), 1);
        store.delete("eu_ai_act").await.unwrap();
        store.delete("eu_ai_act").await.unwrap();
        assert_eq!(store.len("eu_ai_act"), 0);
    }
}
