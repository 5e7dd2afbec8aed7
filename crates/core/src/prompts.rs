//! Named prompt templates: loading, caching and slot rendering.

use crate::models::{ComplianceCategory, RiskCategory};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub const SYSTEM_CLASSIFICATION: &str = "system_classification";
pub const PROHIBITED_SOCIAL_SCORING: &str = "prohibited_social_scoring";
pub const PROHIBITED_MANIPULATION: &str = "prohibited_manipulation";
pub const HIGH_RISK_ASSESSMENT: &str = "high_risk_assessment";
pub const GPAI_ASSESSMENT: &str = "gpai_assessment";
pub const DATA_GOVERNANCE: &str = "data_governance";
pub const HUMAN_OVERSIGHT: &str = "human_oversight";
pub const CATEGORY_ASSESSMENT: &str = "category_assessment";
pub const RECOMMENDATIONS: &str = "recommendations";

#[derive(Debug, Error)]
pub enum PromptLoadError {
    #[error("prompt file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read prompt file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse prompt file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("prompt file defines no templates")]
    Empty,
}

/// Name to template map, as read from a TOML file of `name = "template"` pairs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PromptSet {
    templates: BTreeMap<String, String>,
}

impl PromptSet {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.values().all(|t| t.trim().is_empty())
    }
}

pub fn load_prompts(path: &Path) -> Result<PromptSet, PromptLoadError> {
    if !path.exists() {
        return Err(PromptLoadError::Missing(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    let set: PromptSet = toml::from_str(&raw)?;
    if set.is_empty() {
        return Err(PromptLoadError::Empty);
    }
    Ok(set)
}

/// Where a [`PromptCache`] gets its templates on first use.
#[derive(Debug, Clone)]
pub enum PromptSource {
    Defaults,
    File(PathBuf),
    Fixed(PromptSet),
}

/// Lazily initialised prompt set. Construct one per process (or per test) and
/// pass it to whatever needs templates.
#[derive(Debug)]
pub struct PromptCache {
    source: PromptSource,
    loaded: OnceLock<PromptSet>,
}

impl PromptCache {
    pub fn new(source: PromptSource) -> Self {
        Self {
            source,
            loaded: OnceLock::new(),
        }
    }

    pub fn defaults() -> Self {
        Self::new(PromptSource::Defaults)
    }

    /// Load the source once. Load failures fall back to the built-in set.
    pub fn init(&self) -> &PromptSet {
        self.loaded.get_or_init(|| match &self.source {
            PromptSource::Defaults => PromptSet::default(),
            PromptSource::Fixed(set) => set.clone(),
            PromptSource::File(path) => match load_prompts(path) {
                Ok(set) => {
                    tracing::info!(path = %path.display(), count = set.len(), "loaded prompt templates");
                    set
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "falling back to built-in prompts");
                    PromptSet::default()
                }
            },
        })
    }

    /// Loaded template for `name`, or the built-in default when the loaded
    /// set lacks it or leaves it blank.
    pub fn get(&self, name: &str) -> &str {
        match self.init().get(name) {
            Some(t) if !t.trim().is_empty() => t,
            _ => default_prompt(name).unwrap_or_else(|| {
                tracing::warn!(name, "no prompt template with this name");
                ""
            }),
        }
    }
}

/// Template name used to score `category` for a system of tier `system_type`.
pub fn template_for(system_type: RiskCategory, category: ComplianceCategory) -> &'static str {
    match (system_type, category) {
        (RiskCategory::HighRisk, ComplianceCategory::DataGovernance) => DATA_GOVERNANCE,
        (RiskCategory::HighRisk, ComplianceCategory::HumanOversight) => HUMAN_OVERSIGHT,
        (RiskCategory::HighRisk, _) => HIGH_RISK_ASSESSMENT,
        (RiskCategory::GeneralPurpose, _) => GPAI_ASSESSMENT,
        _ => CATEGORY_ASSESSMENT,
    }
}

/// Substitute `{slot}` occurrences in one pass. Slots without a value, and
/// braces inside substituted text, are left untouched.
pub fn render(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            slots
                .iter()
                .find(|(slot, _)| *slot == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn default_prompt(name: &str) -> Option<&'static str> {
    let template = match name {
        SYSTEM_CLASSIFICATION => SYSTEM_CLASSIFICATION_PROMPT,
        PROHIBITED_SOCIAL_SCORING => SOCIAL_SCORING_PROMPT,
        PROHIBITED_MANIPULATION => MANIPULATION_PROMPT,
        HIGH_RISK_ASSESSMENT => HIGH_RISK_ASSESSMENT_PROMPT,
        GPAI_ASSESSMENT => GPAI_ASSESSMENT_PROMPT,
        DATA_GOVERNANCE | HUMAN_OVERSIGHT | CATEGORY_ASSESSMENT => CATEGORY_ASSESSMENT_PROMPT,
        RECOMMENDATIONS => RECOMMENDATIONS_PROMPT,
        _ => return None,
    };
    Some(template)
}

const SYSTEM_CLASSIFICATION_PROMPT: &str = r#"You are an expert EU AI Act compliance analyst. Classify the AI system described in the documentation according to the EU AI Act risk categories.

Step 1: Extract Basic System Characteristics
From the AI system documentation, extract:
- Intended purpose of the system
- Target users (internal, external, public)
- Deployment context (e.g. public space, private sector, workplace)
- AI capabilities (e.g. classification, prediction, generation, recommendation)
- Use of biometric, emotion recognition, or decision-making on individuals
- General-purpose nature (i.e. trained for broad tasks, not purpose-specific)

Step 2: Classify the System Using EU AI Act Definitions
Use the extracted information to classify the system into one of the following categories:

A. Prohibited System (Article 5)
Check if the system appears to:
- Use subliminal techniques or manipulative behavior
- Exploit vulnerable groups (children, mentally impaired)
- Enable untargeted remote biometric ID in public spaces
- Implement social scoring by governments
- Use real-time biometric categorization without exemptions
If yes, classify as "Prohibited"

B. High-Risk System (Articles 6-7 + Annex III)
Check if the system falls into a category listed in Annex III, such as:
- Biometric identification
- Critical infrastructure (transport, water, energy)
- Education and vocational training
- Employment, HR, and worker management
- Access to essential services (banking, housing, insurance)
- Law enforcement and border control
- Administration of justice or democratic processes
- Safety components of regulated products (e.g. medical devices, cars)
If yes, classify as "High-Risk"

C. General-Purpose AI (GPAI) System (Articles 52-56)
Check if the system:
- Is trained on broad data sets
- Can perform a wide range of tasks (e.g. text, image, speech)
- Is adapted or fine-tuned for downstream use cases
- Does not have a narrowly defined, pre-specified purpose
If yes, classify as "GPAI" or "general-purpose"

D. Limited-Risk System (Article 52)
Check if the system:
- Is a chatbot, emotion detection system, deepfake generator, or similar interface
- Requires transparency obligations to inform users they are interacting with AI
If yes, classify as "Limited-Risk"

E. Minimal-Risk System
If none of the above apply, and the system is:
- A productivity tool (e.g. spam filter, calculator, AI in games)
- Not making decisions that impact individuals' rights or safety
- Not subject to any transparency, risk, or sectoral obligations
Then classify as "Minimal-Risk"

Documentation:
{documentation}

Provide your answer as one of: 'prohibited', 'high-risk', 'general-purpose', 'limited-risk', or 'minimal-risk'.
Include your reasoning for the classification, citing specific evidence from the documentation.
"#;

const HIGH_RISK_ASSESSMENT_PROMPT: &str = r#"You are an expert EU AI Act compliance analyst. The AI system has been classified as high-risk under the EU AI Act.
Assess the system's compliance with the {category} requirements for high-risk AI systems.

EU AI Act Context:
{eu_act_context}

System Documentation:
{documentation}

Consider the obligations for high-risk systems that bear on {category}:
1. Risk Management System (Article 9): lifecycle risk process, known and foreseeable risks, mitigation measures
2. Data Governance (Article 10): data quality, bias identification and mitigation, data security and privacy
3. Technical Documentation (Article 11): design specifications, methodology, performance metrics and limitations
4. Record-Keeping (Article 12): automated logging, monitoring of operation and unusual events
5. Transparency (Article 13): clear information to users, disclosed limitations and purpose
6. Human Oversight (Article 14): ability to intervene or override, monitoring tools
7. Accuracy, Robustness, Cybersecurity (Article 15): accuracy levels, resilience, security measures

Provide a detailed analysis citing specific evidence from the documentation, and name any gaps or missing measures.
Assign a compliance score from 0.0 (non-compliant) to 1.0 (fully compliant), written as "Compliance score: X.Y".
"#;

const GPAI_ASSESSMENT_PROMPT: &str = r#"You are an expert EU AI Act compliance analyst. The AI system has been classified as a general-purpose AI system under the EU AI Act.
Analyze the AI system documentation for compliance with {category} requirements for general-purpose AI systems.

EU AI Act Context:
{eu_act_context}

System Documentation:
{documentation}

Where relevant to {category}, consider:
1. Model Documentation (Articles 53-54): training summary, training data characteristics, architecture and capabilities
2. Transparency Obligations (Article 52): disclosure of AI-generated content, labeling of AI interactions, disclosed limitations
3. Copyright Compliance: documented training data sources, attribution measures
4. Risk Assessment (Article 9): risk identification, misuse mitigation, harm reduction

Provide a detailed analysis of compliance with {category} requirements.
Assign a compliance score from 0.0 (non-compliant) to 1.0 (fully compliant).
"#;

const CATEGORY_ASSESSMENT_PROMPT: &str = r#"You are an expert EU AI Act compliance analyst. Analyze the AI system documentation for compliance with {category} requirements for {system_type} AI systems.

EU AI Act Context:
{eu_act_context}

System Documentation:
{documentation}

Provide a detailed analysis of compliance with {category} requirements.
Assign a compliance score from 0.0 (non-compliant) to 1.0 (fully compliant).
"#;

const SOCIAL_SCORING_PROMPT: &str = r#"You are an expert EU AI Act compliance analyst. Evaluate whether the AI system implements social scoring as prohibited under Article 5(1)(c) of the EU AI Act.

System Documentation:
{documentation}

Check the following criteria:
1. Does the system evaluate or classify natural persons over time?
2. Is the evaluation based on social behavior or personality characteristics?
3. Could the evaluation lead to unfavorable or disproportionate treatment?
4. Is the system used by public authorities or on their behalf?

Provide a detailed analysis with specific evidence from the documentation, and conclude whether the system meets the definition of prohibited social scoring under Article 5(1)(c).
"#;

const MANIPULATION_PROMPT: &str = r#"You are an expert EU AI Act compliance analyst. Evaluate whether the AI system implements manipulative or subliminal techniques as prohibited under Article 5(1)(a) of the EU AI Act.

System Documentation:
{documentation}

Check the following criteria:
1. Does the system deploy subliminal components beyond a person's consciousness?
2. Does the system materially distort human behavior in a manner that causes harm?
3. Does the system exploit vulnerabilities due to age, disability, or social/economic situation?

Provide a detailed analysis with specific evidence from the documentation, and conclude whether the system meets the definition of prohibited manipulative or subliminal techniques under Article 5(1)(a).
"#;

const RECOMMENDATIONS_PROMPT: &str = r#"You are an expert EU AI Act compliance consultant. Generate specific recommendations to address the following compliance gaps for a {system_type} AI system in the {category} category:

{gaps}

Provide 1-3 specific, actionable recommendations to address these gaps and improve compliance with the EU AI Act.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn render_fills_known_slots_only() {
        let out = render(
            "Check {category} for {system_type}; keep {unknown} and {",
            &[("category", "transparency"), ("system_type", "high-risk")],
        );
        assert_eq!(out, "Check transparency for high-risk; keep {unknown} and {");
    }

    #[test]
    fn render_does_not_expand_slots_inside_values() {
        let out = render(
            "{documentation} / {category}",
            &[("documentation", "see {category}"), ("category", "accountability")],
        );
        assert_eq!(out, "see {category} / accountability");
    }

    #[test]
    fn blank_loaded_templates_fall_back_to_defaults() {
        let cache = PromptCache::new(PromptSource::Fixed(PromptSet::from_pairs([
            (DATA_GOVERNANCE, ""),
            (SYSTEM_CLASSIFICATION, "Classify: {documentation}"),
        ])));
        assert_eq!(cache.get(SYSTEM_CLASSIFICATION), "Classify: {documentation}");
        assert_eq!(cache.get(DATA_GOVERNANCE), CATEGORY_ASSESSMENT_PROMPT);
        assert_eq!(cache.get(HUMAN_OVERSIGHT), CATEGORY_ASSESSMENT_PROMPT);
        assert_eq!(cache.get("nonexistent"), "");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.toml");
        assert!(matches!(
            load_prompts(&path),
            Err(PromptLoadError::Missing(_))
        ));
        let cache = PromptCache::new(PromptSource::File(path));
        assert_eq!(cache.get(RECOMMENDATIONS), RECOMMENDATIONS_PROMPT);
    }

    #[test]
    fn prompt_file_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "category_assessment = \"Score {{category}}\"").unwrap();
        drop(f);

        let cache = PromptCache::new(PromptSource::File(path.clone()));
        assert_eq!(cache.get(CATEGORY_ASSESSMENT), "Score {category}");
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.get(CATEGORY_ASSESSMENT), "Score {category}");
    }

    #[test]
    fn empty_and_malformed_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.toml");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(load_prompts(&empty), Err(PromptLoadError::Empty)));
        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "name = ").unwrap();
        assert!(matches!(load_prompts(&broken), Err(PromptLoadError::Parse(_))));
    }

    #[test]
    fn templates_are_chosen_by_tier_and_category() {
        use ComplianceCategory::*;
        assert_eq!(template_for(RiskCategory::HighRisk, DataGovernance), DATA_GOVERNANCE);
        assert_eq!(template_for(RiskCategory::HighRisk, HumanOversight), HUMAN_OVERSIGHT);
        assert_eq!(template_for(RiskCategory::HighRisk, Transparency), HIGH_RISK_ASSESSMENT);
        assert_eq!(template_for(RiskCategory::GeneralPurpose, Accountability), GPAI_ASSESSMENT);
        assert_eq!(template_for(RiskCategory::LimitedRisk, DataGovernance), CATEGORY_ASSESSMENT);
    }
}
