//! Weighted indicator tables and the reducers that evaluate them.
//!
//! Every table is plain data: adding an indicator means adding a row, never a
//! new code path. The heuristic classifier, the override pass and the oracle
//! response parser all go through [`IndicatorSet::tally`] or
//! [`first_match`].

use crate::models::RiskCategory;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

/// One weighted pattern. Matching is presence-based: a rule contributes its
/// weight at most once per text.
#[derive(Debug, Clone)]
pub struct IndicatorRule {
    pub pattern: Regex,
    pub weight: u32,
    pub category: RiskCategory,
}

impl IndicatorRule {
    pub fn descriptor(&self) -> String {
        format!(
            "{}: /{}/ (+{})",
            self.category,
            self.pattern.as_str(),
            self.weight
        )
    }
}

/// Ordered rules for one category plus the weight needed to fire.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub category: RiskCategory,
    pub threshold: u32,
    pub rules: Vec<IndicatorRule>,
}

/// Accumulated weight of one set against one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub weight: u32,
    pub evidence: Vec<String>,
}

impl IndicatorSet {
    fn from_table(category: RiskCategory, threshold: u32, table: &[(&str, u32)]) -> Self {
        let rules = table
            .iter()
            .map(|(pattern, weight)| IndicatorRule {
                pattern: compile(pattern),
                weight: *weight,
                category,
            })
            .collect();
        Self {
            category,
            threshold,
            rules,
        }
    }

    pub fn tally(&self, text: &str) -> Tally {
        let mut tally = Tally::default();
        for rule in &self.rules {
            if rule.pattern.is_match(text) {
                tracing::debug!(
                    category = %rule.category,
                    pattern = rule.pattern.as_str(),
                    weight = rule.weight,
                    "indicator matched"
                );
                tally.weight += rule.weight;
                tally.evidence.push(rule.descriptor());
            }
        }
        tally
    }

    pub fn fires(&self, tally: &Tally) -> bool {
        tally.weight >= self.threshold
    }
}

/// First rule in `rules` whose pattern occurs in `text`.
pub fn first_match<'a>(rules: &'a [IndicatorRule], text: &str) -> Option<&'a IndicatorRule> {
    rules.iter().find(|r| r.pattern.is_match(text))
}

fn compile(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid indicator pattern {pattern:?}: {e}"))
}

fn unweighted(category: RiskCategory, patterns: &[&str]) -> Vec<IndicatorRule> {
    patterns
        .iter()
        .map(|p| IndicatorRule {
            pattern: compile(p),
            weight: 1,
            category,
        })
        .collect()
}

const PROHIBITED_TABLE: &[(&str, u32)] = &[
    (r"social(\s+)credit(\s+)system", 10),
    (r"social(\s+)scoring(\s+)system", 10),
    (r"citizen(\s+)score", 8),
    (r"citizen(\s+)rank", 8),
    (r"citizenrank", 8),
    (r"evaluate(\s+)citizens.*?behavior", 7),
    (r"rate(\s+)citizens(\s+)based(\s+)on", 7),
    (r"social(\s+)behavior.*?score", 7),
    (r"score.*?public(\s+)services", 6),
    (r"numerical(\s+)score.*?citizen", 6),
    (r"access(\s+)based(\s+)on(\s+)score", 5),
    (r"behavior(\s+)score", 5),
    (r"travel(\s+)restriction.*?score", 8),
];

const LIMITED_RISK_TABLE: &[(&str, u32)] = &[
    (r"chatbot", 5),
    (r"customer(\s+)service(\s+)(ai|assistant|agent)", 6),
    (r"customer(\s+)support(\s+)(ai|assistant|agent)", 6),
    (r"servicebot", 7),
    (r"conversation(al)?(\s+)ai", 5),
    (r"virtual(\s+)assistant", 5),
    (r"customer(\s+)interaction", 4),
    (r"support(\s+)ticket", 4),
    (r"customer(\s+)query", 4),
    (r"help(\s+)desk(\s+)automation", 5),
];

const MINIMAL_RISK_TABLE: &[(&str, u32)] = &[
    (r"product(\s+)recommendation(\s+)engine", 5),
    (r"e-commerce(\s+)recommendation", 5),
    (r"ecommerce(\s+)recommendation", 5),
    (r"online(\s+)shopping(\s+)recommendation", 4),
    (r"product(\s+)suggestion", 3),
    (r"recommend(\s+)products", 4),
    (r"shopping(\s+)experience", 2),
    (r"shopsmart", 6),
    (r"personalized(\s+)recommendation", 3),
    (r"you(\s+)might(\s+)(also|like)", 4),
    (r"customers(\s+)who(\s+)bought(\s+)this", 5),
];

const HIGH_RISK_TABLE: &[(&str, u32)] = &[
    (r"medical(\s+)diagnosis", 8),
    (r"mediscan", 8),
    (r"healthcare(\s+)decision", 7),
    (r"diagnostic(\s+)support(\s+)system", 7),
    (r"medical(\s+)image(\s+)analysis", 7),
    (r"patient(\s+)data", 6),
    (r"clinical(\s+)decision", 6),
    (r"mri", 5),
    (r"ct(\s+)scan", 5),
    (r"x-ray", 5),
    (r"radiologist", 6),
    (r"pathologist", 6),
    (r"medical(\s+)specialist", 6),
];

lazy_static! {
    pub static ref PROHIBITED: IndicatorSet =
        IndicatorSet::from_table(RiskCategory::Prohibited, 15, PROHIBITED_TABLE);
    pub static ref LIMITED_RISK: IndicatorSet =
        IndicatorSet::from_table(RiskCategory::LimitedRisk, 10, LIMITED_RISK_TABLE);
    pub static ref MINIMAL_RISK: IndicatorSet =
        IndicatorSet::from_table(RiskCategory::MinimalRisk, 10, MINIMAL_RISK_TABLE);
    pub static ref HIGH_RISK: IndicatorSet =
        IndicatorSet::from_table(RiskCategory::HighRisk, 10, HIGH_RISK_TABLE);

    /// Literal social-scoring features in the documentation itself; any hit
    /// forces an affirmative social-scoring verdict.
    pub static ref SOCIAL_SCORING_FEATURES: Vec<IndicatorRule> = PROHIBITED_TABLE
        .iter()
        .filter(|(p, _)| !p.starts_with("rate") && *p != "citizenrank")
        .map(|(p, w)| IndicatorRule {
            pattern: compile(p),
            weight: *w,
            category: RiskCategory::Prohibited,
        })
        .collect();

    pub static ref OVERRIDE_PROHIBITED: Vec<IndicatorRule> = unweighted(
        RiskCategory::Prohibited,
        &[
            r"social\s+credit\s+system",
            r"citizen\s+rank",
            r"citizenrank",
            r"evaluate\s+citizens.*?behavior.*?score",
            r"score.*?determine.*?access\s+to\s+public\s+services",
            r"score.*?travel\s+permission",
            r"numerical\s+score.*?social\s+behavior",
            r"government.*?scoring.*?citizen",
        ],
    );
    pub static ref OVERRIDE_HIGH_RISK: Vec<IndicatorRule> = unweighted(
        RiskCategory::HighRisk,
        &[
            r"medical\s+diagnosis",
            r"mediscan",
            r"diagnostic\s+support\s+system",
            r"medical\s+image\s+analysis",
            r"clinical\s+decision",
        ],
    );
    pub static ref OVERRIDE_LIMITED_RISK: Vec<IndicatorRule> = unweighted(
        RiskCategory::LimitedRisk,
        &[
            r"chatbot",
            r"servicebot",
            r"customer\s+service\s+ai",
            r"customer\s+support\s+assistant",
        ],
    );

    /// Direct statements in an oracle answer, in lookup order.
    pub static ref RESPONSE_DIRECT: Vec<IndicatorRule> = {
        let mut rules = Vec::new();
        for (category, names) in [
            (RiskCategory::Prohibited, r"prohibited"),
            (RiskCategory::HighRisk, r"high[\s-]risk"),
            (RiskCategory::LimitedRisk, r"limited[\s-]risk"),
            (RiskCategory::MinimalRisk, r"minimal[\s-]risk"),
            (RiskCategory::GeneralPurpose, r"general[\s-]purpose(?:\s+ai)?"),
        ] {
            let patterns = [
                format!(r#"classify\s+(?:it\s+)?as\s+(?:an?\s+)?["'*]*{names}\b"#),
                format!(r#"classification\s*:\s*["'*]*{names}\b"#),
                format!(r"^\W*{names}\W*$"),
                format!(r"this\s+is\s+an?\s+{names}\s+(?:ai\s+)?system"),
            ];
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            rules.extend(unweighted(category, &patterns));
            match category {
                RiskCategory::Prohibited => rules.extend(unweighted(
                    category,
                    &[
                        r"should\s+be\s+classified\s+as\s+prohibited",
                        r"falls\s+under\s+prohibited",
                        r"article\s+5.*?prohibit",
                        r"social\s+scoring.*?prohibit",
                        r"social\s+credit.*?prohibit",
                    ],
                )),
                RiskCategory::GeneralPurpose => {
                    rules.extend(unweighted(category, &[r"^\W*gpai\W*$"]))
                }
                _ => {}
            }
        }
        rules
    };

    /// Statutory citations that settle an oracle answer as prohibited.
    pub static ref RESPONSE_CITATIONS: Vec<IndicatorRule> = unweighted(
        RiskCategory::Prohibited,
        &[
            r"article\s+5",
            r"article\s+5\s*\(\s*1\s*\)\s*\(\s*c\s*\)",
            r"prohibited\s+under\s+article",
            r"social\s+scoring\s+system",
        ],
    );

    pub static ref NEGATION: Regex = compile(
        r"\b(?:not|isn't|isnt|doesn't|doesnt|shouldn't|shouldnt|wouldn't|wouldnt|cannot|can't|cant)\b"
    );
}

/// Keywords counted by the frequency layer, in tie-break order.
pub const RESPONSE_KEYWORDS: &[(RiskCategory, &[&str])] = &[
    (
        RiskCategory::Prohibited,
        &["prohibited", "social scoring", "social credit", "article 5"],
    ),
    (
        RiskCategory::HighRisk,
        &["high-risk", "high risk", "medical diagnosis", "healthcare decision"],
    ),
    (
        RiskCategory::LimitedRisk,
        &["limited-risk", "limited risk", "chatbot", "customer service"],
    ),
    (
        RiskCategory::MinimalRisk,
        &["minimal-risk", "minimal risk", "product recommendation"],
    ),
    (
        RiskCategory::GeneralPurpose,
        &["general-purpose", "general purpose", "gpai"],
    ),
];

/// Characters scanned before a keyword for a negation token.
pub const NEGATION_WINDOW: usize = 40;

/// Phrases in a prohibition sub-check answer that affirm the finding.
pub const AFFIRMATIVE_PHRASES: &[&str] = &[
    r"\byes\b",
    r"is a social scoring system",
    r"does qualify as",
    r"does involve",
    r"is designed for",
    r"could be classified as",
    r"exhibits characteristics of",
    r"could be considered",
    r"strong indications",
    r"shows clear signs of",
    r"matches the definition",
    r"meets the criteria",
    r"social credit system",
    r"citizen.*?score",
    r"rate.*?individuals",
    r"evaluate.*?citizens",
    r"numeric.*?score",
    r"unfavorable treatment",
    r"algorithmic.*?assess",
    r"article 5",
    r"prohibited under",
    r"clear evidence",
    r"classif.*?based on behavior",
    r"disproportionate treatment",
    r"government.*?scoring",
];

/// Phrases in a prohibition sub-check answer that deny the finding.
pub const NEGATIVE_PHRASES: &[&str] = &[
    r"\bno\b",
    r"not a social scoring system",
    r"not qualify as",
    r"does not qualify",
    r"does not involve",
    r"is not designed for",
    r"cannot be classified as",
    r"does not exhibit",
    r"should not be considered",
    r"no indications",
    r"shows no signs of",
    r"does not match",
    r"does not meet",
    r"clearly not",
    r"explicitly not",
    r"definitely not",
];

lazy_static! {
    pub static ref AFFIRMATIVE: Vec<Regex> = AFFIRMATIVE_PHRASES.iter().map(|p| compile(p)).collect();
    pub static ref NEGATIVE: Vec<Regex> = NEGATIVE_PHRASES.iter().map(|p| compile(p)).collect();
}
