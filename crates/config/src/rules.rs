//! Loading of the compliance rule set from a YAML fixture, plus a small
//! built-in default set so the scorer has something to evaluate before an
//! operator supplies a real rule set.

use callaudit_core::payloads::{Severity, Speaker};
use callaudit_core::rules::{Rule, RuleDefinition, RuleSet};
use std::path::Path;

use crate::error::ConfigError;

pub fn load<P: AsRef<Path>>(path: P) -> Result<RuleSet, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::Yaml {
        path: path.display().to_string(),
        source: e,
    })
}

/// Small, domain-agnostic default rule set exercising all three rule
/// kinds. Production deployments load their own rule set via
/// `Settings::rules_path`.
pub fn default_rules() -> RuleSet {
    RuleSet {
        rules: vec![
            Rule {
                id: "R_GREETING".into(),
                name: "Agent greets the caller".into(),
                category: "script".into(),
                severity: Severity::Low,
                is_active: true,
                definition: RuleDefinition::KeywordCheck {
                    keywords: vec!["thank you for calling".into(), "hello".into()],
                    speaker: Some(Speaker::Agent),
                    window: None,
                },
            },
            Rule {
                id: "R_PROHIBITED".into(),
                name: "Agent uses no prohibited language".into(),
                category: "conduct".into(),
                severity: Severity::Critical,
                is_active: true,
                definition: RuleDefinition::ProhibitedWords {
                    words: vec!["stupid".into(), "idiot".into(), "shut up".into()],
                    speaker: Some(Speaker::Agent),
                },
            },
            Rule {
                id: "R_EMPATHY".into(),
                name: "Agent responds to negative sentiment with empathy".into(),
                category: "service".into(),
                severity: Severity::Medium,
                is_active: true,
                definition: RuleDefinition::SentimentResponse {
                    trigger_sentiment: callaudit_core::payloads::Sentiment::Negative,
                    target_speaker: Speaker::Agent,
                    required_keywords: vec![
                        "understand".into(),
                        "sorry".into(),
                        "apologize".into(),
                    ],
                },
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_cover_all_three_kinds() {
        let set = default_rules();
        assert_eq!(set.rules.len(), 3);
        assert!(set
            .rules
            .iter()
            .any(|r| matches!(r.definition, RuleDefinition::KeywordCheck { .. })));
        assert!(set
            .rules
            .iter()
            .any(|r| matches!(r.definition, RuleDefinition::ProhibitedWords { .. })));
        assert!(set
            .rules
            .iter()
            .any(|r| matches!(r.definition, RuleDefinition::SentimentResponse { .. })));
    }
}
