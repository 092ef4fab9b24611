//! Alert rule thresholds consumed by the alert engine (C7).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_escalation_alerts_enabled")]
    pub escalation_alerts_enabled: bool,
    #[serde(default = "default_churn_threshold")]
    pub churn_threshold: f64,
    #[serde(default = "default_high_churn_threshold")]
    pub high_churn_threshold: f64,
    #[serde(default = "default_compliance_floor")]
    pub compliance_floor: f64,
    #[serde(default = "default_low_compliance_threshold")]
    pub low_compliance_threshold: f64,
    #[serde(default = "default_critical_themes_threshold")]
    pub critical_themes_threshold: usize,
    /// Topics that count as a "critical theme" for the VoC alert rule.
    #[serde(default = "default_critical_themes")]
    pub critical_themes: Vec<String>,
    #[serde(default = "default_supervisor_email")]
    pub supervisor_email: String,
    #[serde(default = "default_manager_email")]
    pub manager_email: String,
    #[serde(default = "default_escalation_chat_channel")]
    pub escalation_chat_channel: String,
}

fn default_escalation_alerts_enabled() -> bool {
    true
}
fn default_churn_threshold() -> f64 {
    0.7
}
fn default_high_churn_threshold() -> f64 {
    0.8
}
fn default_compliance_floor() -> f64 {
    0.6
}
fn default_low_compliance_threshold() -> f64 {
    0.5
}
fn default_critical_themes_threshold() -> usize {
    3
}
fn default_critical_themes() -> Vec<String> {
    vec!["cancellation".into(), "legal".into(), "fraud".into()]
}
fn default_supervisor_email() -> String {
    "supervisor@example.com".to_string()
}
fn default_manager_email() -> String {
    "manager@example.com".to_string()
}
fn default_escalation_chat_channel() -> String {
    "#call-escalations".to_string()
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            escalation_alerts_enabled: default_escalation_alerts_enabled(),
            churn_threshold: default_churn_threshold(),
            high_churn_threshold: default_high_churn_threshold(),
            compliance_floor: default_compliance_floor(),
            low_compliance_threshold: default_low_compliance_threshold(),
            critical_themes_threshold: default_critical_themes_threshold(),
            critical_themes: default_critical_themes(),
            supervisor_email: default_supervisor_email(),
            manager_email: default_manager_email(),
            escalation_chat_channel: default_escalation_chat_channel(),
        }
    }
}

impl AlertConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
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
}
