//! Storage layer: SQLite schemas and helpers.
//!
//! Holds DB pool setup, the migration runner and the analysis-run table.

pub mod models;

use models::{AnalysisRow, AnalysisSummary};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}?mode=rwc", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}?mode=rwc", norm);
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert or replace the stored run for `row.system_name`.
pub async fn save_analysis(pool: &SqlitePool, row: &AnalysisRow) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO analyses (system_name, system_type, overall_score, result_json, analyzed_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(system_name) DO UPDATE SET
           system_type=excluded.system_type,
           overall_score=excluded.overall_score,
           result_json=excluded.result_json,
           analyzed_at=excluded.analyzed_at",
    )
    .bind(&row.system_name)
    .bind(&row.system_type)
    .bind(row.overall_score)
    .bind(&row.result_json)
    .bind(&row.analyzed_at)
    .execute(pool)
    .await?;
    tracing::debug!(system = %row.system_name, "analysis row saved");
    Ok(())
}

pub async fn load_analysis(
    pool: &SqlitePool,
    system_name: &str,
) -> anyhow::Result<Option<AnalysisRow>> {
    let row = sqlx::query_as::<_, AnalysisRow>("SELECT * FROM analyses WHERE system_name = ?")
        .bind(system_name)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_analyses(pool: &SqlitePool) -> anyhow::Result<Vec<AnalysisSummary>> {
    let rows = sqlx::query_as::<_, AnalysisSummary>(
        "SELECT system_name, system_type, overall_score, analyzed_at
         FROM analyses ORDER BY analyzed_at DESC, system_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
