//! Durable destinations for finished analyses.

use crate::models::AnalysisResult;
use anyhow::Context;
use sqlx::SqlitePool;
use std::io::Write;
use std::path::{Path, PathBuf};
use storage::models::AnalysisRow;

#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    /// Store `result` and return where it went.
    async fn persist(&self, result: &AnalysisResult) -> anyhow::Result<String>;
}

/// `<dir>/<System_Name>_compliance_analysis.json`.
pub fn result_file_name(system_name: &str) -> String {
    format!("{}_compliance_analysis.json", system_name.trim().replace(' ', "_"))
}

/// Writes one pretty-printed JSON file per system. The document is fully
/// serialized first and lands via rename, so readers never see a partial file.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, system_name: &str) -> PathBuf {
        self.dir.join(result_file_name(system_name))
    }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

#[async_trait::async_trait]
impl ResultSink for JsonFileSink {
    async fn persist(&self, result: &AnalysisResult) -> anyhow::Result<String> {
        let json = serde_json::to_vec_pretty(result)?;
        let path = self.path_for(&result.system_name);
        write_atomic(&path, &json)?;
        tracing::info!(path = %path.display(), "saved compliance analysis");
        Ok(path.display().to_string())
    }
}

/// Records runs in the `analyses` table, one row per system name.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub fn to_row(result: &AnalysisResult) -> anyhow::Result<AnalysisRow> {
    Ok(AnalysisRow {
        system_name: result.system_name.clone(),
        system_type: result.system_type.as_str().to_string(),
        overall_score: result.overall_score,
        result_json: serde_json::to_string(result)?,
        analyzed_at: result.analyzed_at.to_rfc3339(),
    })
}

#[async_trait::async_trait]
impl ResultSink for SqliteSink {
    async fn persist(&self, result: &AnalysisResult) -> anyhow::Result<String> {
        let row = to_row(result)?;
        storage::save_analysis(&self.pool, &row).await?;
        Ok(format!("sqlite:analyses/{}", result.system_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationMethod, ClassificationResult, RiskCategory};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn result(name: &str) -> AnalysisResult {
        AnalysisResult {
            system_name: name.to_string(),
            system_type: RiskCategory::LimitedRisk,
            classification: ClassificationResult {
                category: RiskCategory::LimitedRisk,
                method: ClassificationMethod::Heuristic,
                evidence: vec!["limited-risk: /chatbot/ (+5)".into()],
            },
            overall_score: 0.6,
            category_scores: BTreeMap::from([("transparency".to_string(), 0.6)]),
            detailed_analysis: BTreeMap::new(),
            compliance_gaps: vec![],
            recommendations: vec![],
            prohibition_analysis: None,
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn file_names_replace_spaces() {
        assert_eq!(
            result_file_name("Service Bot Pro"),
            "Service_Bot_Pro_compliance_analysis.json"
        );
    }

    #[tokio::test]
    async fn json_sink_writes_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("output"));
        let location = sink.persist(&result("Service Bot")).await.unwrap();
        assert!(location.ends_with("Service_Bot_compliance_analysis.json"));

        let raw = std::fs::read_to_string(sink.path_for("Service Bot")).unwrap();
        let parsed: AnalysisResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.system_type, RiskCategory::LimitedRisk);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("output"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn sqlite_sink_upserts_by_system_name() {
        let pool = storage::connect("sqlite::memory:").await.unwrap();
        storage::migrate(&pool).await.unwrap();
        let sink = SqliteSink::new(pool.clone());
        sink.persist(&result("ServiceBot")).await.unwrap();
        sink.persist(&result("ServiceBot")).await.unwrap();
        let rows = storage::list_analyses(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].system_type, "limited-risk");
    }
}
