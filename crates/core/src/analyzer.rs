use crate::classifier;
use crate::corpus::DocumentationCorpus;
use crate::error::{AnalysisError, AnalysisPhase};
use crate::models::{
    AnalysisResult, CategoryScore, ClassificationResult, ComplianceCategory, ProhibitionAnalysis,
    RiskCategory,
};
use crate::narrative;
use crate::prompts::{self, PromptCache};
use crate::recommendations;
use crate::rules;
use crate::vectorstore::ChunkStore;
use chrono::Utc;
use providers::LlmProvider;
use std::collections::BTreeMap;
use std::sync::Arc;

const SOCIAL_SCORING_EXPLANATION: &str = "The system appears to be designed for social scoring of \
individuals, which is explicitly prohibited under Article 5(1)(c) of the EU AI Act. This type of \
system evaluates natural persons based on their social behavior or personal characteristics, \
leading to detrimental or unfavorable treatment in contexts unrelated to those in which the data \
was generated.";

const MANIPULATION_EXPLANATION: &str = "The system appears to deploy subliminal techniques beyond a \
person's consciousness or exploit vulnerabilities due to age, disability, or specific social or \
economic situations, which is prohibited under Article 5(1)(a) of the EU AI Act.";

const GENERIC_EXPLANATION: &str = "The documentation contains unambiguous indicators of a practice \
prohibited under Article 5 of the EU AI Act.";

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Reference passages retrieved per category.
    pub top_k: usize,
    /// Namespace holding the regulation text.
    pub namespace: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            namespace: "eu_ai_act".to_string(),
        }
    }
}

/// Runs one analysis: CLASSIFY, then either the prohibited branch or the
/// category loop, then AGGREGATE. Persisting is left to the caller so a
/// failed run never reaches storage.
pub struct ComplianceAnalyzer {
    oracle: Arc<dyn LlmProvider>,
    store: Arc<dyn ChunkStore>,
    prompts: Arc<PromptCache>,
    settings: AnalysisSettings,
}

impl ComplianceAnalyzer {
    pub fn new(
        oracle: Arc<dyn LlmProvider>,
        store: Arc<dyn ChunkStore>,
        prompts: Arc<PromptCache>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            oracle,
            store,
            prompts,
            settings,
        }
    }

    pub async fn classify(&self, corpus: &DocumentationCorpus) -> ClassificationResult {
        classifier::classify(corpus, Some(self.oracle.as_ref()), &self.prompts).await
    }

    pub async fn analyze(
        &self,
        system_name: &str,
        corpus: &DocumentationCorpus,
    ) -> Result<AnalysisResult, AnalysisError> {
        tracing::info!(system = system_name, chunks = corpus.chunks().len(), "analyzing compliance");
        let classification = self.classify(corpus).await;
        let system_type = classification.category;
        tracing::info!(system = system_name, category = %system_type, method = ?classification.method, "system classified");

        let result = if system_type == RiskCategory::Prohibited {
            let prohibition = self.analyze_prohibition(corpus).await;
            AnalysisResult {
                system_name: system_name.to_string(),
                system_type,
                classification,
                overall_score: 0.0,
                category_scores: ComplianceCategory::ALL
                    .iter()
                    .map(|c| (c.as_str().to_string(), 0.0))
                    .collect(),
                detailed_analysis: BTreeMap::new(),
                compliance_gaps: Vec::new(),
                recommendations: vec![recommendations::prohibited_use_recommendation()],
                prohibition_analysis: Some(prohibition),
                analyzed_at: Utc::now(),
            }
        } else {
            let mut category_scores = BTreeMap::new();
            let mut detailed_analysis = BTreeMap::new();
            for category in ComplianceCategory::ALL {
                let scored = self.analyze_category(category, system_type, corpus).await?;
                category_scores.insert(category.as_str().to_string(), scored.score);
                detailed_analysis.insert(category.as_str().to_string(), scored);
            }
            let overall_score =
                category_scores.values().sum::<f64>() / ComplianceCategory::ALL.len() as f64;
            let compliance_gaps = recommendations::identify_gaps(&detailed_analysis);
            let recommendations = recommendations::synthesize_recommendations(
                &compliance_gaps,
                system_type,
                self.oracle.as_ref(),
                &self.prompts,
            )
            .await;
            AnalysisResult {
                system_name: system_name.to_string(),
                system_type,
                classification,
                overall_score,
                category_scores,
                detailed_analysis,
                compliance_gaps,
                recommendations,
                prohibition_analysis: None,
                analyzed_at: Utc::now(),
            }
        };
        tracing::info!(system = system_name, overall_score = result.overall_score, "analysis complete");
        Ok(result)
    }

    /// Retrieve reference passages for one category, ask the oracle and
    /// extract a score. Failures here abort the run.
    pub async fn analyze_category(
        &self,
        category: ComplianceCategory,
        system_type: RiskCategory,
        corpus: &DocumentationCorpus,
    ) -> Result<CategoryScore, AnalysisError> {
        tracing::info!(category = %category, system_type = %system_type, "analyzing category");
        let query = format!("{category} requirements for {system_type} AI systems");
        let passages = self
            .store
            .search(&query, self.settings.top_k, &self.settings.namespace)
            .await
            .map_err(|source| AnalysisError::Retrieval {
                phase: AnalysisPhase::CategoryAnalysis,
                source,
            })?;
        if passages.is_empty() {
            tracing::warn!(
                category = %category,
                namespace = %self.settings.namespace,
                "no reference passages retrieved; scoring without regulation context"
            );
        }
        let context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let template = self.prompts.get(prompts::template_for(system_type, category));
        let prompt = prompts::render(
            template,
            &[
                ("documentation", corpus.text()),
                ("category", category.as_str()),
                ("system_type", system_type.as_str()),
                ("eu_act_context", context.as_str()),
            ],
        );
        let response = self
            .oracle
            .complete(&prompt)
            .await
            .map_err(|source| AnalysisError::Oracle {
                phase: AnalysisPhase::CategoryAnalysis,
                source,
            })?;
        let narrative = response.trim().to_string();
        let score = narrative::extract_score(&narrative);
        tracing::info!(category = %category, score, passages = passages.len(), "category scored");
        Ok(CategoryScore {
            category: category.as_str().to_string(),
            system_type,
            score,
            narrative,
        })
    }

    /// Social-scoring and manipulation sub-checks. Oracle failures leave the
    /// verdict to lexical evidence in the documentation.
    pub async fn analyze_prohibition(&self, corpus: &DocumentationCorpus) -> ProhibitionAnalysis {
        let social = self.sub_check(prompts::PROHIBITED_SOCIAL_SCORING, corpus).await;
        let manipulation = self.sub_check(prompts::PROHIBITED_MANIPULATION, corpus).await;

        let direct = rules::first_match(&rules::SOCIAL_SCORING_FEATURES, corpus.lowered());
        if let Some(rule) = direct {
            tracing::info!(rule = %rule.descriptor(), "direct social scoring evidence");
        }
        let is_social_scoring = narrative::affirms_prohibition(&social, direct.is_some());
        let is_manipulation = narrative::affirms_prohibition(&manipulation, false);

        let (prohibited_category, article_citation, explanation) = if is_social_scoring {
            (Some("social_scoring"), "Article 5(1)(c)", SOCIAL_SCORING_EXPLANATION)
        } else if is_manipulation {
            (Some("manipulation"), "Article 5(1)(a)", MANIPULATION_EXPLANATION)
        } else {
            (None, "Article 5", GENERIC_EXPLANATION)
        };
        tracing::info!(is_social_scoring, is_manipulation, article = article_citation, "prohibition analysis");

        ProhibitionAnalysis {
            is_social_scoring,
            is_manipulation,
            prohibited_category: prohibited_category.map(str::to_string),
            article_citation: article_citation.to_string(),
            explanation: explanation.to_string(),
            social_scoring_evidence: social,
            manipulation_evidence: manipulation,
        }
    }

    async fn sub_check(&self, prompt_name: &str, corpus: &DocumentationCorpus) -> String {
        let prompt = prompts::render(
            self.prompts.get(prompt_name),
            &[("documentation", corpus.text())],
        );
        match self.oracle.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(check = prompt_name, error = %e, "prohibition sub-check failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::MemoryChunkStore;
    use providers::noop::NoopProvider;
    use providers::ProviderError;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for Fixed {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn analyzer(oracle: Arc<dyn LlmProvider>) -> ComplianceAnalyzer {
        ComplianceAnalyzer::new(
            oracle,
            Arc::new(MemoryChunkStore::new()),
            Arc::new(PromptCache::defaults()),
            AnalysisSettings::default(),
        )
    }

    #[tokio::test]
    async fn prohibited_run_survives_oracle_failure() {
        let corpus = DocumentationCorpus::from_chunks([
            "We operate a social credit system that assigns citizen scores.",
        ])
        .unwrap();
        let result = analyzer(Arc::new(NoopProvider))
            .analyze("CitizenRank", &corpus)
            .await
            .unwrap();
        assert!(result.is_prohibited());
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.category_scores.len(), 6);
        let prohibition = result.prohibition_analysis.unwrap();
        assert!(prohibition.is_social_scoring);
        assert_eq!(prohibition.article_citation, "Article 5(1)(c)");
        assert_eq!(prohibition.prohibited_category.as_deref(), Some("social_scoring"));
    }

    #[tokio::test]
    async fn all_zero_scores_are_not_a_prohibition() {
        let corpus = DocumentationCorpus::from_chunks([
            "MediScan analyzes MRI and CT scans to support radiologist diagnostic decisions",
        ])
        .unwrap();
        let result = analyzer(Arc::new(Fixed("Compliance score: 0.0. Audit logging is missing.")))
            .analyze("MediScan", &corpus)
            .await
            .unwrap();
        assert_eq!(result.system_type, RiskCategory::HighRisk);
        assert_eq!(result.overall_score, 0.0);
        assert!(!result.is_prohibited());
        assert!(result.prohibition_analysis.is_none());
        assert_eq!(result.detailed_analysis.len(), 6);
        assert_eq!(result.compliance_gaps.len(), 6);
    }

    #[tokio::test]
    async fn category_oracle_failure_is_fatal() {
        let corpus = DocumentationCorpus::from_chunks(["MediScan supports radiologist review of MRI scans."])
            .unwrap();
        let err = analyzer(Arc::new(NoopProvider))
            .analyze("MediScan", &corpus)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), AnalysisPhase::CategoryAnalysis);
    }

    #[tokio::test]
    async fn sub_check_verdicts_follow_answer_phrasing() {
        let corpus = DocumentationCorpus::from_chunks(["Persuasion toolkit for ads."]).unwrap();
        let analysis = analyzer(Arc::new(Fixed("Yes. It is designed for subliminal influence.")))
            .analyze_prohibition(&corpus)
            .await;
        assert!(analysis.is_social_scoring);
        assert!(analysis.is_manipulation);

        let analysis = analyzer(Arc::new(Fixed("Unclear from the material.")))
            .analyze_prohibition(&corpus)
            .await;
        assert!(!analysis.is_social_scoring);
        assert!(!analysis.is_manipulation);
        assert_eq!(analysis.article_citation, "Article 5");
        assert!(analysis.prohibited_category.is_none());
    }
}
