//! Compliance rule shapes.
//!
//! A rule's `definition` is a tagged variant keyed by `type`, not a class
//! hierarchy: `callaudit-stages` pattern-matches it exhaustively and
//! unknown `type` values deserialize into [`RuleDefinition::Unknown`],
//! which evaluates to "no violation".

use crate::payloads::{Severity, Speaker};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub t0: f64,
    pub t1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDefinition {
    KeywordCheck {
        keywords: Vec<String>,
        #[serde(default)]
        speaker: Option<Speaker>,
        #[serde(default)]
        window: Option<TimeWindow>,
    },
    ProhibitedWords {
        words: Vec<String>,
        #[serde(default)]
        speaker: Option<Speaker>,
    },
    SentimentResponse {
        trigger_sentiment: crate::payloads::Sentiment,
        target_speaker: Speaker,
        required_keywords: Vec<String>,
    },
    /// Catch-all for forward compatibility: any `type` this build doesn't
    /// recognize lands here and evaluates to no violation.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub definition: RuleDefinition,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn active_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_active)
    }
}
