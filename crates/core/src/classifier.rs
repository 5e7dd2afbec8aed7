use crate::corpus::DocumentationCorpus;
use crate::models::{ClassificationMethod, ClassificationResult, RiskCategory};
use crate::prompts::{self, PromptCache};
use crate::rules::{
    self, IndicatorSet, Tally, NEGATION, NEGATION_WINDOW, RESPONSE_CITATIONS, RESPONSE_DIRECT,
    RESPONSE_KEYWORDS,
};
use lazy_static::lazy_static;
use providers::LlmProvider;
use regex::{Regex, RegexBuilder};

/// Weights of every heuristic set against one corpus, kept even when no set
/// fires so the oracle parser can use them as a tie-break bonus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreCheck {
    pub prohibited: Tally,
    pub limited_risk: Tally,
    pub minimal_risk: Tally,
    pub high_risk: Tally,
}

impl PreCheck {
    pub fn run(text: &str) -> Self {
        Self {
            prohibited: rules::PROHIBITED.tally(text),
            limited_risk: rules::LIMITED_RISK.tally(text),
            minimal_risk: rules::MINIMAL_RISK.tally(text),
            high_risk: rules::HIGH_RISK.tally(text),
        }
    }

    /// First set, in priority order, whose weight clears its threshold.
    pub fn decision(&self) -> Option<ClassificationResult> {
        let ordered: [(&IndicatorSet, &Tally); 4] = [
            (&rules::PROHIBITED, &self.prohibited),
            (&rules::LIMITED_RISK, &self.limited_risk),
            (&rules::MINIMAL_RISK, &self.minimal_risk),
            (&rules::HIGH_RISK, &self.high_risk),
        ];
        ordered
            .into_iter()
            .find(|(set, tally)| set.fires(tally))
            .map(|(set, tally)| ClassificationResult {
                category: set.category,
                method: ClassificationMethod::Heuristic,
                evidence: tally.evidence.clone(),
            })
    }

    fn bonus(&self, category: RiskCategory) -> i64 {
        let tally = match category {
            RiskCategory::Prohibited => &self.prohibited,
            RiskCategory::LimitedRisk => &self.limited_risk,
            RiskCategory::MinimalRisk => &self.minimal_risk,
            RiskCategory::HighRisk => &self.high_risk,
            RiskCategory::GeneralPurpose => return 0,
        };
        i64::from(tally.weight / 3)
    }
}

pub fn classify_heuristically(text: &str) -> Option<ClassificationResult> {
    PreCheck::run(text).decision()
}

/// Force a category when the corpus contains an unambiguous proof phrase.
/// Prohibited phrases always win; medical and then chatbot phrasing only
/// apply to non-prohibited results, so a chatbot phrase has the last word.
pub fn apply_overrides(mut result: ClassificationResult, text: &str) -> ClassificationResult {
    if let Some(rule) = rules::first_match(&rules::OVERRIDE_PROHIBITED, text) {
        force(&mut result, RiskCategory::Prohibited, &rule.descriptor());
        return result;
    }
    if result.category == RiskCategory::Prohibited {
        return result;
    }
    if let Some(rule) = rules::first_match(&rules::OVERRIDE_HIGH_RISK, text) {
        force(&mut result, RiskCategory::HighRisk, &rule.descriptor());
    }
    if let Some(rule) = rules::first_match(&rules::OVERRIDE_LIMITED_RISK, text) {
        force(&mut result, RiskCategory::LimitedRisk, &rule.descriptor());
    }
    result
}

fn force(result: &mut ClassificationResult, category: RiskCategory, descriptor: &str) {
    if result.category == category {
        return;
    }
    tracing::info!(from = %result.category, to = %category, rule = descriptor, "override applied");
    result.category = category;
    result.evidence.push(format!("override {descriptor}"));
}

/// Which parsing layer settled an oracle answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLayer {
    Direct,
    Citation,
    Frequency,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClassification {
    pub category: RiskCategory,
    pub layer: ResponseLayer,
    pub detail: String,
}

lazy_static! {
    static ref KEYWORD_PATTERNS: Vec<(RiskCategory, Vec<Regex>)> = RESPONSE_KEYWORDS
        .iter()
        .map(|(category, keywords)| {
            let patterns = keywords
                .iter()
                .map(|kw| {
                    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(kw)))
                        .case_insensitive(true)
                        .build()
                        .unwrap_or_else(|e| panic!("invalid keyword {kw:?}: {e}"))
                })
                .collect();
            (*category, patterns)
        })
        .collect();
}

/// Resolve an oracle answer to a tier: direct statements, then statutory
/// citations, then negation-aware keyword counts plus the pre-check bonus.
pub fn parse_classification_response(response: &str, precheck: &PreCheck) -> ParsedClassification {
    let lowered = response.to_lowercase();

    if let Some(rule) = rules::first_match(&RESPONSE_DIRECT, &lowered) {
        return ParsedClassification {
            category: rule.category,
            layer: ResponseLayer::Direct,
            detail: rule.descriptor(),
        };
    }

    if let Some(rule) = rules::first_match(&RESPONSE_CITATIONS, &lowered) {
        return ParsedClassification {
            category: RiskCategory::Prohibited,
            layer: ResponseLayer::Citation,
            detail: rule.descriptor(),
        };
    }

    let mut best: Option<(RiskCategory, i64)> = None;
    for (category, patterns) in KEYWORD_PATTERNS.iter() {
        let score = keyword_score(&lowered, patterns) + precheck.bonus(*category);
        tracing::debug!(category = %category, score, "keyword frequency");
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((*category, score));
        }
    }

    match best {
        Some((category, score)) if score > 0 => ParsedClassification {
            category,
            layer: ResponseLayer::Frequency,
            detail: format!("{category}: keyword score {score}"),
        },
        _ => ParsedClassification {
            category: RiskCategory::MinimalRisk,
            layer: ResponseLayer::Fallback,
            detail: "no recognizable classification in oracle answer".to_string(),
        },
    }
}

/// +1 per keyword occurrence, -1 when a negation token sits in the preceding
/// window.
fn keyword_score(text: &str, patterns: &[Regex]) -> i64 {
    let mut score = 0;
    for pattern in patterns {
        for m in pattern.find_iter(text) {
            if is_negated(text, m.start()) {
                score -= 1;
            } else {
                score += 1;
            }
        }
    }
    score
}

/// Looks back `NEGATION_WINDOW` characters, not bytes, from `at`.
fn is_negated(text: &str, at: usize) -> bool {
    let from = text[..at]
        .char_indices()
        .rev()
        .nth(NEGATION_WINDOW - 1)
        .map_or(0, |(i, _)| i);
    NEGATION.is_match(&text[from..at])
}

/// Ask the oracle for a tier. Oracle failures resolve to MinimalRisk with
/// method `default`.
pub async fn classify_via_oracle(
    corpus: &DocumentationCorpus,
    precheck: &PreCheck,
    oracle: &dyn LlmProvider,
    prompts: &PromptCache,
) -> ClassificationResult {
    let prompt = prompts::render(
        prompts.get(prompts::SYSTEM_CLASSIFICATION),
        &[("documentation", corpus.text())],
    );
    match oracle.complete(&prompt).await {
        Ok(response) => {
            let parsed = parse_classification_response(&response, precheck);
            tracing::info!(category = %parsed.category, layer = ?parsed.layer, "oracle classification");
            let method = if parsed.layer == ResponseLayer::Fallback {
                ClassificationMethod::Default
            } else {
                ClassificationMethod::Llm
            };
            ClassificationResult {
                category: parsed.category,
                method,
                evidence: vec![parsed.detail],
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "classification oracle failed, defaulting to minimal-risk");
            default_result(format!("oracle unavailable: {e}"))
        }
    }
}

fn default_result(reason: String) -> ClassificationResult {
    ClassificationResult {
        category: RiskCategory::MinimalRisk,
        method: ClassificationMethod::Default,
        evidence: vec![reason],
    }
}

/// Full CLASSIFY stage: heuristics, then the oracle when nothing fired, then
/// the override pass.
pub async fn classify(
    corpus: &DocumentationCorpus,
    oracle: Option<&dyn LlmProvider>,
    prompts: &PromptCache,
) -> ClassificationResult {
    let precheck = PreCheck::run(corpus.lowered());
    let result = match precheck.decision() {
        Some(result) => {
            tracing::info!(category = %result.category, "heuristic classification");
            result
        }
        None => match oracle {
            Some(oracle) => classify_via_oracle(corpus, &precheck, oracle, prompts).await,
            None => default_result("no oracle configured".to_string()),
        },
    };
    apply_overrides(result, corpus.lowered())
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::noop::NoopProvider;
    use providers::ProviderError;

    struct Canned(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn corpus(text: &str) -> DocumentationCorpus {
        DocumentationCorpus::from_chunks([text]).unwrap()
    }

    #[test]
    fn prohibited_outranks_high_risk() {
        let text = "a social credit system with citizen score and medical diagnosis on mri scans";
        let result = classify_heuristically(text).unwrap();
        assert_eq!(result.category, RiskCategory::Prohibited);
        assert_eq!(result.method, ClassificationMethod::Heuristic);
    }

    #[test]
    fn limited_risk_carve_out_runs_before_high_risk() {
        let text = "servicebot is a chatbot that also reads patient data and mri notes";
        let result = classify_heuristically(text).unwrap();
        assert_eq!(result.category, RiskCategory::LimitedRisk);
    }

    #[test]
    fn minimal_risk_carve_out() {
        let text = "shopsmart is a product recommendation engine: customers who bought this also liked";
        assert_eq!(
            classify_heuristically(text).unwrap().category,
            RiskCategory::MinimalRisk
        );
    }

    #[test]
    fn below_threshold_defers() {
        assert!(classify_heuristically("a virtual assistant for calendars").is_none());
        assert!(classify_heuristically("").is_none());
    }

    #[test]
    fn heuristics_are_deterministic() {
        let text = "mediscan supports radiologist work on ct scans";
        assert_eq!(classify_heuristically(text), classify_heuristically(text));
    }

    #[test]
    fn overrides_force_prohibited_and_let_chatbot_win_over_medical() {
        let base = ClassificationResult {
            category: RiskCategory::MinimalRisk,
            method: ClassificationMethod::Llm,
            evidence: vec![],
        };
        let forced = apply_overrides(base.clone(), "scores determine travel permission");
        assert_eq!(forced.category, RiskCategory::Prohibited);
        assert_eq!(forced.evidence.len(), 1);

        let both = apply_overrides(base.clone(), "a chatbot offering medical diagnosis");
        assert_eq!(both.category, RiskCategory::LimitedRisk);
        assert_eq!(both.evidence.len(), 2);

        let prohibited = ClassificationResult {
            category: RiskCategory::Prohibited,
            ..base
        };
        let kept = apply_overrides(prohibited, "a chatbot");
        assert_eq!(kept.category, RiskCategory::Prohibited);
        assert!(kept.evidence.is_empty());
    }

    #[test]
    fn direct_statement_layer() {
        let pre = PreCheck::default();
        let parsed = parse_classification_response("Classification: limited-risk\nReasoning...", &pre);
        assert_eq!(parsed.category, RiskCategory::LimitedRisk);
        assert_eq!(parsed.layer, ResponseLayer::Direct);

        let parsed = parse_classification_response("After review:\nHigh-Risk\n", &pre);
        assert_eq!(parsed.category, RiskCategory::HighRisk);
    }

    #[test]
    fn citation_layer_settles_prohibited() {
        let parsed = parse_classification_response(
            "The system resembles practices covered by Article 5 of the Act.",
            &PreCheck::default(),
        );
        assert_eq!(parsed.category, RiskCategory::Prohibited);
        assert_eq!(parsed.layer, ResponseLayer::Citation);
    }

    #[test]
    fn negated_keywords_count_against_a_category() {
        let parsed = parse_classification_response(
            "It is not a chatbot. It is not customer service either. \
             Reviewers agree the deployment is clearly high risk in practice.",
            &PreCheck::default(),
        );
        assert_eq!(parsed.category, RiskCategory::HighRisk);
        assert_eq!(parsed.layer, ResponseLayer::Frequency);
    }

    #[test]
    fn precheck_bonus_breaks_ties() {
        let precheck = PreCheck::run("a virtual assistant handling customer query traffic");
        assert_eq!(precheck.limited_risk.weight, 9);
        let parsed = parse_classification_response(
            "Could be high risk or limited risk depending on deployment.",
            &precheck,
        );
        assert_eq!(parsed.category, RiskCategory::LimitedRisk);
    }

    #[test]
    fn unrecognizable_answer_defaults_to_minimal_risk() {
        let parsed = parse_classification_response("I am unsure.", &PreCheck::default());
        assert_eq!(parsed.category, RiskCategory::MinimalRisk);
        assert_eq!(parsed.layer, ResponseLayer::Fallback);
    }

    #[test]
    fn negation_window_respects_char_boundaries() {
        let text = "ééééééééééééééééééééééééé not chatbot";
        let at = text.find("chatbot").unwrap();
        assert!(is_negated(text, at));
    }

    #[test]
    fn negation_window_counts_characters_not_bytes() {
        let text = "it is not “quite”, “really”, “truly” a chatbot";
        let at = text.find("chatbot").unwrap();
        assert!(text[..at].len() > NEGATION_WINDOW);
        assert!(is_negated(text, at));

        let parsed = parse_classification_response(text, &PreCheck::default());
        assert_eq!(parsed.category, RiskCategory::MinimalRisk);
        assert_eq!(parsed.layer, ResponseLayer::Fallback);
    }

    #[tokio::test]
    async fn oracle_failure_defaults_to_minimal_risk() {
        let result = classify(
            &corpus("An internal tool for summarising meeting notes."),
            Some(&NoopProvider),
            &PromptCache::defaults(),
        )
        .await;
        assert_eq!(result.category, RiskCategory::MinimalRisk);
        assert_eq!(result.method, ClassificationMethod::Default);
    }

    #[tokio::test]
    async fn oracle_answer_is_used_when_heuristics_defer() {
        let oracle = Canned("This is a general-purpose AI system.\nClassification: general-purpose");
        let result = classify(
            &corpus("A foundation model trained on broad web data."),
            Some(&oracle),
            &PromptCache::defaults(),
        )
        .await;
        assert_eq!(result.category, RiskCategory::GeneralPurpose);
        assert_eq!(result.method, ClassificationMethod::Llm);
    }

    #[tokio::test]
    async fn override_beats_oracle_answer() {
        let oracle = Canned("Classification: minimal-risk");
        let result = classify(
            &corpus("Our government platform uses scoring of each citizen."),
            Some(&oracle),
            &PromptCache::defaults(),
        )
        .await;
        assert_eq!(result.category, RiskCategory::Prohibited);
    }
}
