//! Gap mining over low-scoring categories and oracle-backed remediation advice.

use crate::models::{
    CategoryScore, ComplianceCategory, ComplianceGap, Priority, Recommendation, RiskCategory,
    Severity,
};
use crate::narrative::{self, GAP_SCORE_CEILING};
use crate::prompts::{self, PromptCache};
use providers::LlmProvider;
use std::collections::BTreeMap;

pub const PROHIBITED_USE: &str = "prohibited_use";

const PROHIBITED_USE_TEXT: &str = "This AI system falls under prohibited uses in the EU AI Act. \
It should not be deployed in the EU without significant redesign to remove the prohibited elements.";

/// The single remediation emitted for a prohibited system.
pub fn prohibited_use_recommendation() -> Recommendation {
    Recommendation {
        category: PROHIBITED_USE.to_string(),
        text: PROHIBITED_USE_TEXT.to_string(),
        priority: Priority::High,
    }
}

/// Gap sentences from every category scoring below the gap ceiling, in
/// scoring order.
pub fn identify_gaps(detailed: &BTreeMap<String, CategoryScore>) -> Vec<ComplianceGap> {
    let mut gaps = Vec::new();
    for category in ComplianceCategory::ALL {
        let Some(analysis) = detailed.get(category.as_str()) else {
            continue;
        };
        if analysis.score >= GAP_SCORE_CEILING {
            continue;
        }
        let severity = Severity::for_score(analysis.score);
        for description in narrative::gap_sentences(&analysis.narrative) {
            gaps.push(ComplianceGap {
                category: category.as_str().to_string(),
                description,
                severity,
            });
        }
    }
    tracing::info!(count = gaps.len(), "identified compliance gaps");
    gaps
}

/// Gaps grouped by category, keeping first-seen category order.
fn group_by_category(gaps: &[ComplianceGap]) -> Vec<(&str, Vec<&ComplianceGap>)> {
    let mut groups: Vec<(&str, Vec<&ComplianceGap>)> = Vec::new();
    for gap in gaps {
        match groups.iter_mut().find(|(c, _)| *c == gap.category) {
            Some((_, members)) => members.push(gap),
            None => groups.push((gap.category.as_str(), vec![gap])),
        }
    }
    groups
}

/// One oracle call per category with gaps. A failed call costs that
/// category its recommendations and nothing more.
pub async fn synthesize_recommendations(
    gaps: &[ComplianceGap],
    system_type: RiskCategory,
    oracle: &dyn LlmProvider,
    prompts: &PromptCache,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    for (category, members) in group_by_category(gaps) {
        let bullets = members
            .iter()
            .map(|g| format!("- {}", g.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompts::render(
            prompts.get(prompts::RECOMMENDATIONS),
            &[
                ("system_type", system_type.as_str()),
                ("category", category),
                ("gaps", bullets.as_str()),
            ],
        );
        let response = match oracle.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(category, error = %e, "recommendation oracle failed, skipping category");
                continue;
            }
        };
        let priority = if members.iter().any(|g| g.severity == Severity::High) {
            Priority::High
        } else {
            Priority::Medium
        };
        let items = narrative::parse_recommendations(&response);
        if items.is_empty() {
            tracing::warn!(category, "no recommendations found in oracle answer");
        }
        recommendations.extend(items.into_iter().map(|text| Recommendation {
            category: category.to_string(),
            text,
            priority,
        }));
    }
    tracing::info!(count = recommendations.len(), "generated recommendations");
    recommendations
}
