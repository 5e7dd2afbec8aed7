use crate::{EmbedResponse, EmbeddingProvider, LlmProvider, ProviderError};

#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for NoopProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        Ok(EmbedResponse {
            vectors: vec![vec![]; texts.len()],
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for NoopProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_embeds_one_empty_vector_per_text() {
        let resp = NoopProvider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(resp.vectors.len(), 2);
        assert!(resp.vectors.iter().all(|v| v.is_empty()));
    }

    #[tokio::test]
    async fn noop_completion_is_not_implemented() {
        let err = NoopProvider.complete("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotImplemented));
    }
}
