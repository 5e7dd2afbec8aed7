use providers::ProviderError;
use std::fmt;
use thiserror::Error;

/// Pipeline phase in which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Input,
    /// Not produced yet: classification failures resolve to a default tier
    /// instead of failing the run.
    Classification,
    CategoryAnalysis,
    Persistence,
    Rendering,
}

impl AnalysisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Classification => "classification",
            Self::CategoryAnalysis => "category analysis",
            Self::Persistence => "persistence",
            Self::Rendering => "rendering",
        }
    }
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no documentation provided")]
    NoDocumentation,

    #[error("oracle call failed during {phase}: {source}")]
    Oracle {
        phase: AnalysisPhase,
        #[source]
        source: ProviderError,
    },

    #[error("retrieval failed during {phase}: {source}")]
    Retrieval {
        phase: AnalysisPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist analysis: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("failed to render report: {0}")]
    Rendering(#[source] anyhow::Error),
}

impl AnalysisError {
    pub fn phase(&self) -> AnalysisPhase {
        match self {
            Self::NoDocumentation => AnalysisPhase::Input,
            Self::Oracle { phase, .. } | Self::Retrieval { phase, .. } => *phase,
            Self::Persistence(_) => AnalysisPhase::Persistence,
            Self::Rendering(_) => AnalysisPhase::Rendering,
        }
    }
}
