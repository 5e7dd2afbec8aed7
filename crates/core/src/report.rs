//! Plain-text compliance report.

use crate::models::{AnalysisResult, RiskCategory};

pub trait ReportRenderer {
    fn render(&self, result: &AnalysisResult) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextReportRenderer;

pub fn compliance_level(result: &AnalysisResult) -> &'static str {
    if result.is_prohibited() {
        "Prohibited Use"
    } else if result.overall_score >= 0.8 {
        "Highly Compliant"
    } else if result.overall_score >= 0.6 {
        "Moderately Compliant"
    } else {
        "Significant Gaps"
    }
}

fn tier_summary(system_type: RiskCategory) -> &'static str {
    match system_type {
        RiskCategory::Prohibited => {
            "This AI system falls under the PROHIBITED category in the EU AI Act. Systems in this \
category cannot be legally deployed within the EU. See the prohibition analysis section for the \
specific prohibitions that apply."
        }
        RiskCategory::HighRisk => {
            "As a high-risk AI system, this application is subject to the strictest requirements \
under the EU AI Act, including risk assessment, data governance, technical documentation, human \
oversight, and transparency obligations."
        }
        RiskCategory::GeneralPurpose => {
            "As a general-purpose AI system, this application must comply with transparency \
requirements, copyright obligations, and certain technical documentation standards under the EU \
AI Act."
        }
        RiskCategory::LimitedRisk => {
            "As a limited-risk AI system with specific transparency obligations, this application \
must ensure users are aware when interacting with AI, and must comply with specific labeling and \
transparency requirements."
        }
        RiskCategory::MinimalRisk => {
            "As a minimal-risk AI system, this application has limited obligations under the EU AI \
Act, but should still maintain appropriate documentation and risk management practices."
        }
    }
}

/// `risk_assessment` -> `Risk Assessment`.
pub fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalized(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn percent(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

fn heading(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push(title.to_string());
    lines.push("=".repeat(title.len()));
}

impl ReportRenderer for TextReportRenderer {
    fn render(&self, result: &AnalysisResult) -> String {
        let mut lines = vec![
            format!("EU AI Act Compliance Analysis: {}", result.system_name),
            format!(
                "Analyzed on: {}",
                result.analyzed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ];

        heading(&mut lines, "EXECUTIVE SUMMARY");
        lines.push(format!(
            "System Type: {} AI System",
            capitalized(result.system_type.as_str())
        ));
        lines.push(format!(
            "Overall Compliance Score: {} ({})",
            percent(result.overall_score),
            compliance_level(result)
        ));
        lines.push(String::new());
        lines.push(tier_summary(result.system_type).to_string());

        heading(&mut lines, "COMPLIANCE SCORES BY CATEGORY");
        for (category, score) in &result.category_scores {
            lines.push(format!("{}: {}", display_name(category), percent(*score)));
        }

        heading(&mut lines, "COMPLIANCE GAPS");
        if result.compliance_gaps.is_empty() {
            lines.push("No specific compliance gaps identified.".to_string());
        }
        for gap in &result.compliance_gaps {
            lines.push(format!(
                "- {} ({}): {}",
                display_name(&gap.category),
                gap.severity.as_str().to_uppercase(),
                gap.description
            ));
        }

        heading(&mut lines, "RECOMMENDATIONS");
        if result.recommendations.is_empty() {
            lines.push("No specific recommendations provided.".to_string());
        }
        for rec in &result.recommendations {
            lines.push(format!(
                "- {} ({}): {}",
                display_name(&rec.category),
                rec.priority.as_str().to_uppercase(),
                rec.text
            ));
        }

        if let Some(prohibition) = &result.prohibition_analysis {
            heading(&mut lines, "PROHIBITION ANALYSIS");
            let category = prohibition
                .prohibited_category
                .as_deref()
                .map(display_name)
                .unwrap_or_else(|| "Unspecified".to_string());
            lines.push(format!("Prohibited Category: {category}"));
            lines.push(format!("Article: {}", prohibition.article_citation));
            lines.push(format!("Explanation: {}", prohibition.explanation));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClassificationMethod, ClassificationResult, ComplianceGap, Priority, ProhibitionAnalysis,
        Recommendation, Severity,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn result(system_type: RiskCategory, overall: f64) -> AnalysisResult {
        AnalysisResult {
            system_name: "MediScan".to_string(),
            system_type,
            classification: ClassificationResult {
                category: system_type,
                method: ClassificationMethod::Heuristic,
                evidence: vec![],
            },
            overall_score: overall,
            category_scores: BTreeMap::from([
                ("risk_assessment".to_string(), 0.25),
                ("transparency".to_string(), 0.9),
            ]),
            detailed_analysis: BTreeMap::new(),
            compliance_gaps: vec![ComplianceGap {
                category: "risk_assessment".into(),
                description: "No hazard log is maintained.".into(),
                severity: Severity::High,
            }],
            recommendations: vec![Recommendation {
                category: "risk_assessment".into(),
                text: "Maintain a hazard log".into(),
                priority: Priority::High,
            }],
            prohibition_analysis: None,
            analyzed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn levels_follow_score_bands() {
        assert_eq!(compliance_level(&result(RiskCategory::HighRisk, 0.85)), "Highly Compliant");
        assert_eq!(compliance_level(&result(RiskCategory::HighRisk, 0.6)), "Moderately Compliant");
        assert_eq!(compliance_level(&result(RiskCategory::HighRisk, 0.59)), "Significant Gaps");
        assert_eq!(compliance_level(&result(RiskCategory::Prohibited, 0.0)), "Prohibited Use");
    }

    #[test]
    fn report_lists_scores_gaps_and_recommendations() {
        let text = TextReportRenderer.render(&result(RiskCategory::HighRisk, 0.55));
        assert!(text.starts_with("EU AI Act Compliance Analysis: MediScan\n"));
        assert!(text.contains("System Type: High-risk AI System"));
        assert!(text.contains("Overall Compliance Score: 55.0% (Significant Gaps)"));
        assert!(text.contains("strictest requirements"));
        assert!(text.contains("Risk Assessment: 25.0%"));
        assert!(text.contains("- Risk Assessment (HIGH): No hazard log is maintained."));
        assert!(text.contains("- Risk Assessment (HIGH): Maintain a hazard log"));
        assert!(!text.contains("PROHIBITION ANALYSIS"));
    }

    #[test]
    fn prohibited_report_includes_prohibition_section() {
        let mut prohibited = result(RiskCategory::Prohibited, 0.0);
        prohibited.compliance_gaps.clear();
        prohibited.prohibition_analysis = Some(ProhibitionAnalysis {
            is_social_scoring: true,
            is_manipulation: false,
            prohibited_category: Some("social_scoring".into()),
            article_citation: "Article 5(1)(c)".into(),
            explanation: "Social scoring of natural persons.".into(),
            social_scoring_evidence: String::new(),
            manipulation_evidence: String::new(),
        });
        let text = TextReportRenderer.render(&prohibited);
        assert!(text.contains("(Prohibited Use)"));
        assert!(text.contains("No specific compliance gaps identified."));
        assert!(text.contains("PROHIBITION ANALYSIS\n===================="));
        assert!(text.contains("Prohibited Category: Social Scoring"));
        assert!(text.contains("Article: Article 5(1)(c)"));
    }
}
