use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One persisted analysis run, keyed by system name.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub system_name: String,
    pub system_type: String,
    pub overall_score: f64,
    pub result_json: String,
    pub analyzed_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub system_name: String,
    pub system_type: String,
    pub overall_score: f64,
    pub analyzed_at: String,
}
