//! Pure parsers over free-text oracle output. Each parser has an explicit
//! fallback and never fails.

use crate::rules::{AFFIRMATIVE, NEGATIVE};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

/// Score used when no template matches a narrative.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Scores below this are mined for gap sentences.
pub const GAP_SCORE_CEILING: f64 = 0.7;

const GAP_VOCABULARY: &[&str] = &["gap", "issue", "non-compliant", "missing", "lack"];

/// Ordered score templates; the capture is divided by the paired scale.
const SCORE_TEMPLATES: &[(&str, f64)] = &[
    (r"compliance score[^0-9]*([0-9]\.[0-9]+)", 1.0),
    (r"score[^0-9]*([0-9]\.[0-9]+)[^0-9]*/[^0-9]*1\.0", 1.0),
    (r"score[^0-9]*([0-9]\.[0-9]+|10|[0-9])\s*/\s*10\b", 10.0),
    (r"\b([0-9]{1,2}(?:\.[0-9]+)?|100)\s*%", 100.0),
    (r"compliance[^0-9]*([0-9]\.[0-9]+)", 1.0),
    (r"score[^0-9]*([0-9]\.[0-9]+)", 1.0),
    (r"\b([0-9]\.[0-9]+)\s*/\s*1\.0\b", 1.0),
    (r"\b([0-9]\.[0-9]+|10|[0-9])\s*/\s*10\b", 10.0),
];

lazy_static! {
    static ref SCORE_PATTERNS: Vec<(Regex, f64)> = SCORE_TEMPLATES
        .iter()
        .map(|(p, scale)| {
            let re = RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("invalid score template {p:?}: {e}"));
            (re, *scale)
        })
        .collect();
    // A span ends at a newline, or at `.`, `!`, `?` followed by whitespace
    // or end of line, so decimals like `0.4` stay intact.
    static ref SENTENCE: Regex = RegexBuilder::new(r"[^\n]+?(?:[.!?](?:[^\S\n]+|$)|$)")
        .multi_line(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid sentence pattern: {e}"));
    static ref LIST_ITEM: Regex = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$")
        .unwrap_or_else(|e| panic!("invalid list pattern: {e}"));
}

/// First in-range score found by the ordered templates, or [`NEUTRAL_SCORE`].
pub fn extract_score(narrative: &str) -> f64 {
    for (pattern, scale) in SCORE_PATTERNS.iter() {
        let Some(caps) = pattern.captures(narrative) else {
            continue;
        };
        let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
            continue;
        };
        let score = value / scale;
        if (0.0..=1.0).contains(&score) {
            return score;
        }
        tracing::debug!(template = pattern.as_str(), score, "score out of range, trying next template");
    }
    tracing::warn!("could not extract compliance score, using neutral default");
    NEUTRAL_SCORE
}

/// Sentence-ish spans with list markers stripped.
pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim()
                .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•' | '#'))
                .trim()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Sentences of a narrative that name a gap, issue or missing measure.
pub fn gap_sentences(narrative: &str) -> Vec<String> {
    sentences(narrative)
        .into_iter()
        .filter(|s| {
            let lowered = s.to_lowercase();
            GAP_VOCABULARY.iter().any(|w| lowered.contains(w))
        })
        .map(str::to_string)
        .collect()
}

/// Recommendation items from an oracle answer: list items when the answer
/// uses bullets or numbering, otherwise the capitalised sentences after the
/// first.
pub fn parse_recommendations(response: &str) -> Vec<String> {
    let items = list_items(response);
    if !items.is_empty() {
        return items;
    }
    sentences(response)
        .into_iter()
        .skip(1)
        .filter(|s| s.chars().next().is_some_and(char::is_uppercase))
        .map(str::to_string)
        .collect()
}

fn list_items(response: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut open = false;
    for line in response.lines() {
        if let Some(caps) = LIST_ITEM.captures(line) {
            items.push(caps[1].trim().to_string());
            open = true;
        } else if line.trim().is_empty() {
            open = false;
        } else if open {
            if let Some(last) = items.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
        }
    }
    items.retain(|i| !i.is_empty());
    items
}

/// Affirmative/negative reconciliation for an Article 5 sub-check answer.
/// Lexical evidence from the documentation forces the verdict.
pub fn affirms_prohibition(response: &str, direct_evidence: bool) -> bool {
    if direct_evidence {
        return true;
    }
    let affirmative = AFFIRMATIVE.iter().find(|p| p.is_match(response));
    let negative = NEGATIVE.iter().find(|p| p.is_match(response));
    if let Some(p) = affirmative {
        tracing::debug!(pattern = p.as_str(), "affirmative phrase in sub-check answer");
    }
    if let Some(p) = negative {
        tracing::debug!(pattern = p.as_str(), "negative phrase in sub-check answer");
    }
    affirmative.is_some() && negative.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_templates_cover_common_phrasings() {
        assert_eq!(extract_score("Overall compliance score: 0.8 given the gaps"), 0.8);
        assert_eq!(extract_score("The system meets roughly 75% of obligations"), 0.75);
        assert_eq!(extract_score("I would rate this 6/10"), 0.6);
        assert_eq!(extract_score("Score: 7/10"), 0.7);
        assert_eq!(extract_score("Score 0.45 / 1.0"), 0.45);
        assert_eq!(extract_score("Compliance is at 0.3 in practice"), 0.3);
        assert_eq!(extract_score("Compliance score: 7.5/10"), 0.75);
        assert_eq!(extract_score("Rated 8.5/10 overall"), 0.85);
        assert_eq!(extract_score("Coverage sits at 62.5% today"), 0.625);
    }

    #[test]
    fn missing_or_out_of_range_scores_fall_back() {
        assert_eq!(extract_score("No numbers here at all"), NEUTRAL_SCORE);
        assert_eq!(extract_score(""), NEUTRAL_SCORE);
        assert_eq!(extract_score("compliance score 4.5, or 40%"), 0.4);
    }

    #[test]
    fn sentences_keep_decimals_together() {
        let parts = sentences("Score is 0.4. Missing logs!\n- Lack of audit trail");
        assert_eq!(
            parts,
            vec!["Score is 0.4.", "Missing logs!", "Lack of audit trail"]
        );
        assert_eq!(
            sentences("Why? Because 1.5 is low.\n\n* Next step"),
            vec!["Why?", "Because 1.5 is low.", "Next step"]
        );
    }

    #[test]
    fn gap_sentences_match_vocabulary_case_insensitively() {
        let narrative = "Documentation is thorough. There is a LACK of bias testing. \
                         Logging is non-compliant with Article 12. Oversight is fine.";
        assert_eq!(
            gap_sentences(narrative),
            vec![
                "There is a LACK of bias testing.",
                "Logging is non-compliant with Article 12."
            ]
        );
    }

    #[test]
    fn recommendations_prefer_list_items() {
        let response = "Here is what to do:\n1. Add bias audits\n   every quarter\n2) Log decisions\n- Train operators\n\nThanks.";
        assert_eq!(
            parse_recommendations(response),
            vec![
                "Add bias audits every quarter",
                "Log decisions",
                "Train operators"
            ]
        );
    }

    #[test]
    fn recommendations_fall_back_to_sentences() {
        let response = "Several steps help. Establish a data review board. Document retention rules. then relax.";
        assert_eq!(
            parse_recommendations(response),
            vec!["Establish a data review board.", "Document retention rules."]
        );
    }

    #[test]
    fn negative_phrases_veto_affirmative_ones() {
        assert!(affirms_prohibition("Yes, it meets the criteria of Article 5.", false));
        assert!(!affirms_prohibition("This does not qualify; there is no scoring.", false));
        assert!(!affirms_prohibition("Unclear.", false));
        assert!(affirms_prohibition("No, it does not.", true));
    }
}
