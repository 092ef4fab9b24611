//! The compliance scorer (C5): evaluates every active rule against the
//! fused context, computes the three subscores, and maps the weighted
//! overall score to a `ComplianceStatus`. Pure, with no I/O beyond reading
//! the context.

use callaudit_config::ScoringConfig;
use callaudit_core::payloads::{ComplianceStatus, Intent, SatisfactionLevel, Violation};
use callaudit_core::rules::RuleSet;

use crate::context::FusedContext;
use crate::rules::evaluate as evaluate_rule;

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub overall_score: u8,
    pub compliance_status: ComplianceStatus,
    pub script_adherence: u8,
    pub customer_service: u8,
    pub resolution_effectiveness: u8,
    pub flags_for_review: bool,
    pub review_reason: Option<String>,
    pub violations: Vec<Violation>,
    pub processing_time_ms: u64,
}

pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, ctx: &FusedContext, rules: &RuleSet) -> ScoreOutcome {
        let started = std::time::Instant::now();

        let violations: Vec<Violation> = rules
            .active_rules()
            .filter_map(|rule| evaluate_rule(rule, ctx))
            .collect();

        let script_adherence = self.script_adherence(ctx);
        let customer_service = self.customer_service(ctx);
        let resolution_effectiveness = self.resolution_effectiveness(ctx);

        let overall_score = self.config.weighted_overall(
            script_adherence,
            customer_service,
            resolution_effectiveness,
        );

        let severities: Vec<_> = violations.iter().map(|v| v.severity).collect();
        let compliance_status = self.config.status_for(overall_score, &severities);
        let flags_for_review = !matches!(compliance_status, ComplianceStatus::Passed);

        let review_reason = flags_for_review.then(|| review_reason_for(compliance_status, &violations, overall_score, &self.config));

        ScoreOutcome {
            overall_score,
            compliance_status,
            script_adherence,
            customer_service,
            resolution_effectiveness,
            flags_for_review,
            review_reason,
            violations,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Baseline minus a per-phrase penalty for every expected phrase
    /// absent from the full transcript text.
    fn script_adherence(&self, ctx: &FusedContext) -> u8 {
        let cfg = &self.config.script_adherence;
        let text = ctx.transcription.full_text.to_lowercase();
        let penalty: u32 = cfg
            .expected_phrases
            .iter()
            .filter(|p| !text.contains(&p.phrase.to_lowercase()))
            .map(|p| p.weight as u32)
            .sum();
        (cfg.baseline as i32 - penalty as i32).clamp(0, 100) as u8
    }

    /// Base score, bonus for empathy cues present, penalty proportional to
    /// negative overall sentiment, fixed penalty on escalation.
    fn customer_service(&self, ctx: &FusedContext) -> u8 {
        let cfg = &self.config.customer_service;
        let mut score = cfg.base as f64;

        let full_text = ctx.transcription.full_text.to_lowercase();
        if cfg
            .empathy_cues
            .iter()
            .any(|cue| full_text.contains(&cue.to_lowercase()))
        {
            score += cfg.empathy_bonus as f64;
        }

        if ctx.sentiment.sentiment_score < 0.0 {
            score += ctx.sentiment.sentiment_score * cfg.negative_sentiment_penalty_per_unit;
        }

        if ctx.sentiment.escalation_detected {
            score -= cfg.escalation_penalty as f64;
        }

        score.round().clamp(0.0, 100.0) as u8
    }

    /// Baseline from customer satisfaction, bonus for a compliment intent,
    /// penalty for a complaint with no actionable items, penalty
    /// proportional to churn risk above the configured threshold.
    fn resolution_effectiveness(&self, ctx: &FusedContext) -> u8 {
        let cfg = &self.config.resolution;
        let mut score = match ctx.voc.customer_satisfaction {
            SatisfactionLevel::High => cfg.baseline_high as f64,
            SatisfactionLevel::Medium => cfg.baseline_medium as f64,
            SatisfactionLevel::Low => cfg.baseline_low as f64,
        };

        if ctx.voc.primary_intent == Intent::Compliment {
            score += cfg.compliment_bonus as f64;
        }
        if ctx.voc.primary_intent == Intent::Complaint && ctx.voc.actionable_items.is_empty() {
            score -= cfg.complaint_no_action_penalty as f64;
        }

        let excess_churn = (ctx.voc.predicted_churn_risk - cfg.churn_risk_threshold).max(0.0);
        score -= excess_churn * cfg.churn_penalty_per_unit;

        score.round().clamp(0.0, 100.0) as u8
    }
}

fn review_reason_for(
    status: ComplianceStatus,
    violations: &[Violation],
    overall_score: u8,
    config: &ScoringConfig,
) -> String {
    if violations
        .iter()
        .any(|v| v.severity == callaudit_core::payloads::Severity::Critical)
    {
        return "critical compliance violation".to_string();
    }
    if overall_score < config.thresholds.fail_threshold {
        return format!(
            "overall score {} below fail threshold {}",
            overall_score, config.thresholds.fail_threshold
        );
    }
    match status {
        ComplianceStatus::ReviewRequired => format!(
            "overall score {} below pass threshold {}",
            overall_score, config.thresholds.pass_threshold
        ),
        ComplianceStatus::Failed => "compliance checks failed".to_string(),
        ComplianceStatus::Passed => unreachable!("passed calls are never flagged for review"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_config::rules::default_rules;
    use callaudit_core::payloads::{
        CallTranscribed, SatisfactionLevel, Segment, SegmentSentiment, Sentiment, Speaker,
        SentimentAnalyzed, VocAnalyzed,
    };

    fn happy_path_ctx() -> FusedContext {
        FusedContext {
            call_id: "C1".into(),
            correlation_id: uuid::Uuid::new_v4(),
            transcription: CallTranscribed {
                call_id: "C1".into(),
                full_text: "Thank you for calling, may I have your name? How can I help? \
                    Is there anything else? Thank you for your time."
                    .into(),
                language: "en".into(),
                confidence: 0.95,
                word_count: 40,
                segments: vec![Segment {
                    speaker: Speaker::Agent,
                    start_time: 0.0,
                    end_time: 10.0,
                    text: "Thank you for calling, may I have your name?".into(),
                    confidence: Some(0.95),
                }],
            },
            sentiment: SentimentAnalyzed {
                call_id: "C1".into(),
                overall_sentiment: Sentiment::Positive,
                sentiment_score: 0.8,
                escalation_detected: false,
                escalation_details: None,
                segment_sentiments: vec![SegmentSentiment {
                    start_time: 0.0,
                    end_time: 10.0,
                    sentiment: Sentiment::Positive,
                    score: 0.8,
                    emotions: Default::default(),
                    speaker: Speaker::Agent,
                }],
                processing_time_ms: 20,
            },
            voc: VocAnalyzed {
                call_id: "C1".into(),
                primary_intent: Intent::Inquiry,
                topics: vec!["billing".into()],
                keywords: vec!["invoice".into()],
                customer_satisfaction: SatisfactionLevel::High,
                predicted_churn_risk: 0.2,
                actionable_items: vec![],
                summary: "routine inquiry resolved".into(),
            },
        }
    }

    #[test]
    fn happy_path_scores_high_and_passes() {
        let scorer = Scorer::new(ScoringConfig::default());
        let outcome = scorer.score(&happy_path_ctx(), &default_rules());
        assert!(outcome.overall_score >= 70, "expected a passing score, got {}", outcome.overall_score);
        assert_eq!(outcome.compliance_status, ComplianceStatus::Passed);
        assert!(!outcome.flags_for_review);
    }

    #[test]
    fn critical_violation_forces_failed_status_regardless_of_score() {
        let mut ctx = happy_path_ctx();
        ctx.transcription.segments.push(Segment {
            speaker: Speaker::Agent,
            start_time: 11.0,
            end_time: 12.0,
            text: "That's a stupid question.".into(),
            confidence: None,
        });
        ctx.transcription.full_text.push_str(" That's a stupid question.");

        let scorer = Scorer::new(ScoringConfig::default());
        let outcome = scorer.score(&ctx, &default_rules());

        assert_eq!(
            outcome.violations.iter().filter(|v| v.rule_id == "R_PROHIBITED").count(),
            1
        );
        assert_eq!(outcome.compliance_status, ComplianceStatus::Failed);
        assert!(outcome.flags_for_review);
    }
}
