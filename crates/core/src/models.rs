use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// EU AI Act risk tier. Exactly one is assigned per analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskCategory {
    Prohibited,
    HighRisk,
    GeneralPurpose,
    LimitedRisk,
    MinimalRisk,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 5] = [
        RiskCategory::Prohibited,
        RiskCategory::HighRisk,
        RiskCategory::GeneralPurpose,
        RiskCategory::LimitedRisk,
        RiskCategory::MinimalRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prohibited => "prohibited",
            Self::HighRisk => "high-risk",
            Self::GeneralPurpose => "general-purpose",
            Self::LimitedRisk => "limited-risk",
            Self::MinimalRisk => "minimal-risk",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "prohibited" => Ok(Self::Prohibited),
            "high-risk" => Ok(Self::HighRisk),
            "general-purpose" | "gpai" => Ok(Self::GeneralPurpose),
            "limited-risk" => Ok(Self::LimitedRisk),
            "minimal-risk" => Ok(Self::MinimalRisk),
            other => Err(format!("unknown risk category: {other}")),
        }
    }
}

/// Which stage of the cascade produced the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    Heuristic,
    Llm,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: RiskCategory,
    pub method: ClassificationMethod,
    /// Descriptors of the rules that matched, in evaluation order.
    pub evidence: Vec<String>,
}

/// The six scored compliance areas, in scoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCategory {
    RiskAssessment,
    DataGovernance,
    TechnicalRobustness,
    Transparency,
    HumanOversight,
    Accountability,
}

impl ComplianceCategory {
    pub const ALL: [ComplianceCategory; 6] = [
        ComplianceCategory::RiskAssessment,
        ComplianceCategory::DataGovernance,
        ComplianceCategory::TechnicalRobustness,
        ComplianceCategory::Transparency,
        ComplianceCategory::HumanOversight,
        ComplianceCategory::Accountability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RiskAssessment => "risk_assessment",
            Self::DataGovernance => "data_governance",
            Self::TechnicalRobustness => "technical_robustness",
            Self::Transparency => "transparency",
            Self::HumanOversight => "human_oversight",
            Self::Accountability => "accountability",
        }
    }
}

impl fmt::Display for ComplianceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score and narrative for one compliance area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub system_type: RiskCategory,
    /// Always within [0.0, 1.0].
    pub score: f64,
    #[serde(rename = "analysis")]
    pub narrative: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Severity band for a category score: <0.3 high, <0.5 medium, else low.
    pub fn for_score(score: f64) -> Self {
        if score < 0.3 {
            Severity::High
        } else if score < 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceGap {
    pub category: String,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    #[serde(rename = "recommendation")]
    pub text: String,
    pub priority: Priority,
}

/// Outcome of the Article 5 sub-checks for a prohibited system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProhibitionAnalysis {
    pub is_social_scoring: bool,
    pub is_manipulation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prohibited_category: Option<String>,
    #[serde(rename = "article")]
    pub article_citation: String,
    pub explanation: String,
    #[serde(default)]
    pub social_scoring_evidence: String,
    #[serde(default)]
    pub manipulation_evidence: String,
}

/// Root aggregate of one analysis run. Built once, persisted, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub system_name: String,
    pub system_type: RiskCategory,
    pub classification: ClassificationResult,
    pub overall_score: f64,
    pub category_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub detailed_analysis: BTreeMap<String, CategoryScore>,
    #[serde(default)]
    pub compliance_gaps: Vec<ComplianceGap>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prohibition_analysis: Option<ProhibitionAnalysis>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn is_prohibited(&self) -> bool {
        self.system_type == RiskCategory::Prohibited
    }
}
