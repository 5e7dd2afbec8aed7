//! Output helpers shared by the `ai-act-check` binary and its tests.

use compliance_core::error::AnalysisError;
use compliance_core::models::ClassificationResult;
use compliance_core::pipeline::AnalysisOutcome;
use compliance_core::report::compliance_level;
use storage::models::AnalysisSummary;

pub fn classification_json(result: &ClassificationResult) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "category": result.category,
        "method": result.method,
        "evidence": result.evidence,
    })
}

pub fn classification_lines(result: &ClassificationResult) -> Vec<String> {
    let mut lines = vec![format!(
        "category: {} (method: {})",
        result.category,
        serde_json::to_value(result.method)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    )];
    lines.extend(result.evidence.iter().map(|e| format!("  evidence: {e}")));
    lines
}

pub fn summary_json(outcome: &AnalysisOutcome) -> serde_json::Value {
    let result = &outcome.result;
    serde_json::json!({
        "status": "ok",
        "system_name": result.system_name,
        "system_type": result.system_type,
        "overall_score": result.overall_score,
        "compliance_level": compliance_level(result),
        "gaps": result.compliance_gaps.len(),
        "recommendations": result.recommendations.len(),
        "saved_to": outcome.locations,
    })
}

pub fn summary_banner(outcome: &AnalysisOutcome) -> String {
    let result = &outcome.result;
    let rule = "=".repeat(60);
    let mut lines = vec![
        rule.clone(),
        format!("EU AI Act compliance analysis: {}", result.system_name),
        rule.clone(),
        format!("System type:   {}", result.system_type),
        format!(
            "Overall score: {:.1}% ({})",
            result.overall_score * 100.0,
            compliance_level(result)
        ),
        format!(
            "Gaps: {}, recommendations: {}",
            result.compliance_gaps.len(),
            result.recommendations.len()
        ),
    ];
    if let Some(prohibition) = &result.prohibition_analysis {
        lines.push(format!("Prohibited under {}", prohibition.article_citation));
    }
    for location in &outcome.locations {
        lines.push(format!("Saved to:      {location}"));
    }
    lines.push(rule);
    lines.join("\n")
}

/// One-line failure report naming the phase when the error carries one.
pub fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AnalysisError>() {
        Some(e) => format!("analysis failed during {}: {e}", e.phase()),
        None => format!("error: {err:#}"),
    }
}

pub fn history_lines(rows: &[AnalysisSummary]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["no analyses recorded".to_string()];
    }
    rows.iter()
        .map(|row| {
            let when = chrono::DateTime::parse_from_rfc3339(&row.analyzed_at)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|_| row.analyzed_at.clone());
            format!(
                "{when}  {:<14} {:>6.1}%  {}",
                row.system_type,
                row.overall_score * 100.0,
                row.system_name
            )
        })
        .collect()
}
