//! Pure rule evaluation. No I/O: given a rule and the fused call context,
//! produce at most one violation. Unknown rule kinds and malformed
//! definitions evaluate to "no violation" rather than erroring.

use callaudit_core::payloads::{Segment, Sentiment, Severity, Speaker, Violation};
use callaudit_core::rules::{Rule, RuleDefinition, TimeWindow};

use crate::context::FusedContext;

fn speaker_matches(segment_speaker: Speaker, wanted: Option<Speaker>) -> bool {
    match wanted {
        None => true,
        Some(s) => s == segment_speaker,
    }
}

fn in_window(segment: &Segment, window: Option<&TimeWindow>) -> bool {
    match window {
        None => true,
        Some(w) => segment.start_time >= w.t0 && segment.end_time <= w.t1,
    }
}

fn contains_any(text: &str, needles: &[String]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|n| lower.contains(&n.to_lowercase()))
}

fn matching_segments<'a>(
    segments: &'a [Segment],
    speaker: Option<Speaker>,
    window: Option<&TimeWindow>,
) -> impl Iterator<Item = &'a Segment> {
    segments
        .iter()
        .filter(move |s| speaker_matches(s.speaker, speaker) && in_window(s, window))
}

/// Evaluate one rule against the fused context. Returns `None` for "no
/// violation", including unknown rule kinds and any condition this
/// evaluator cannot determine.
pub fn evaluate(rule: &Rule, ctx: &FusedContext) -> Option<Violation> {
    match &rule.definition {
        RuleDefinition::KeywordCheck {
            keywords,
            speaker,
            window,
        } => {
            let found = matching_segments(&ctx.transcription.segments, *speaker, window.as_ref())
                .any(|s| contains_any(&s.text, keywords));
            if found {
                None
            } else {
                Some(Violation {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    severity: rule.severity,
                    description: format!(
                        "none of the required keywords {:?} were found",
                        keywords
                    ),
                    timestamp_in_call: None,
                    evidence: None,
                })
            }
        }
        RuleDefinition::ProhibitedWords { words, speaker } => {
            matching_segments(&ctx.transcription.segments, *speaker, None)
                .find(|s| contains_any(&s.text, words))
                .map(|segment| Violation {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    severity: rule.severity,
                    description: format!("prohibited language detected: {:?}", words),
                    timestamp_in_call: Some(segment.start_time),
                    evidence: Some(segment.text.clone()),
                })
        }
        RuleDefinition::SentimentResponse {
            trigger_sentiment,
            target_speaker,
            required_keywords,
        } => evaluate_sentiment_response(
            rule,
            ctx,
            *trigger_sentiment,
            *target_speaker,
            required_keywords,
        ),
        RuleDefinition::Unknown => {
            tracing::debug!(rule_id = %rule.id, "unknown rule kind, evaluating as no violation");
            None
        }
    }
}

fn evaluate_sentiment_response(
    rule: &Rule,
    ctx: &FusedContext,
    trigger_sentiment: Sentiment,
    target_speaker: Speaker,
    required_keywords: &[String],
) -> Option<Violation> {
    let segment_sentiments = &ctx.sentiment.segment_sentiments;
    for (i, trigger) in segment_sentiments.iter().enumerate() {
        if trigger.sentiment != trigger_sentiment {
            continue;
        }

        // Find the response window: transcription segments by the target
        // speaker starting at or after the trigger's end, up to (but not
        // including) the next trigger occurrence.
        let next_trigger_start = segment_sentiments[i + 1..]
            .iter()
            .find(|s| s.sentiment == trigger_sentiment)
            .map(|s| s.start_time);

        let has_cue = ctx
            .transcription
            .segments
            .iter()
            .filter(|s| s.speaker == target_speaker && s.start_time >= trigger.end_time)
            .take_while(|s| next_trigger_start.map(|t| s.start_time < t).unwrap_or(true))
            .any(|s| contains_any(&s.text, required_keywords));

        if !has_cue {
            return Some(Violation {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                severity: rule.severity,
                description: format!(
                    "negative sentiment at {:.1}s was not followed by an empathy cue",
                    trigger.start_time
                ),
                timestamp_in_call: Some(trigger.start_time),
                evidence: None,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_core::payloads::{CallTranscribed, SegmentSentiment, VocAnalyzed};
    use callaudit_core::payloads::{Intent, SatisfactionLevel};

    fn rule(id: &str, severity: Severity, definition: RuleDefinition) -> Rule {
        Rule {
            id: id.to_string(),
            name: id.to_string(),
            category: "test".into(),
            severity,
            is_active: true,
            definition,
        }
    }

    fn ctx_with_segments(segments: Vec<Segment>, segment_sentiments: Vec<SegmentSentiment>) -> FusedContext {
        FusedContext {
            call_id: "c1".into(),
            correlation_id: uuid::Uuid::new_v4(),
            transcription: CallTranscribed {
                call_id: "c1".into(),
                full_text: segments.iter().map(|s| s.text.clone()).collect::<Vec<_>>().join(" "),
                language: "en".into(),
                confidence: 0.9,
                word_count: 10,
                segments,
            },
            sentiment: callaudit_core::payloads::SentimentAnalyzed {
                call_id: "c1".into(),
                overall_sentiment: Sentiment::Neutral,
                sentiment_score: 0.0,
                escalation_detected: false,
                escalation_details: None,
                segment_sentiments,
                processing_time_ms: 1,
            },
            voc: VocAnalyzed {
                call_id: "c1".into(),
                primary_intent: Intent::Inquiry,
                topics: vec![],
                keywords: vec![],
                customer_satisfaction: SatisfactionLevel::High,
                predicted_churn_risk: 0.1,
                actionable_items: vec![],
                summary: String::new(),
            },
        }
    }

    #[test]
    fn prohibited_words_finds_critical_violation() {
        let r = rule(
            "R_PROHIBITED",
            Severity::Critical,
            RuleDefinition::ProhibitedWords {
                words: vec!["stupid".into()],
                speaker: Some(Speaker::Agent),
            },
        );
        let ctx = ctx_with_segments(
            vec![Segment {
                speaker: Speaker::Agent,
                start_time: 3.0,
                end_time: 5.0,
                text: "That's a stupid question.".into(),
                confidence: None,
            }],
            vec![],
        );
        let violation = evaluate(&r, &ctx).expect("expected a violation");
        assert_eq!(violation.severity, Severity::Critical);
        assert_eq!(violation.timestamp_in_call, Some(3.0));
    }

    #[test]
    fn keyword_check_passes_when_phrase_present() {
        let r = rule(
            "R_GREETING",
            Severity::Low,
            RuleDefinition::KeywordCheck {
                keywords: vec!["thank you for calling".into()],
                speaker: Some(Speaker::Agent),
                window: None,
            },
        );
        let ctx = ctx_with_segments(
            vec![Segment {
                speaker: Speaker::Agent,
                start_time: 0.0,
                end_time: 2.0,
                text: "Thank you for calling support.".into(),
                confidence: None,
            }],
            vec![],
        );
        assert!(evaluate(&r, &ctx).is_none());
    }

    #[test]
    fn sentiment_response_flags_missing_empathy_cue() {
        let r = rule(
            "R_EMPATHY",
            Severity::Medium,
            RuleDefinition::SentimentResponse {
                trigger_sentiment: Sentiment::Negative,
                target_speaker: Speaker::Agent,
                required_keywords: vec!["sorry".into(), "understand".into()],
            },
        );
        let segments = vec![
            Segment {
                speaker: Speaker::Customer,
                start_time: 0.0,
                end_time: 2.0,
                text: "This is unacceptable.".into(),
                confidence: None,
            },
            Segment {
                speaker: Speaker::Agent,
                start_time: 2.0,
                end_time: 4.0,
                text: "Let me look into your account.".into(),
                confidence: None,
            },
        ];
        let sentiments = vec![SegmentSentiment {
            start_time: 0.0,
            end_time: 2.0,
            sentiment: Sentiment::Negative,
            score: -0.8,
            emotions: Default::default(),
            speaker: Speaker::Customer,
        }];
        let ctx = ctx_with_segments(segments, sentiments);
        assert!(evaluate(&r, &ctx).is_some());
    }

    #[test]
    fn unknown_rule_kind_is_no_violation() {
        let r = rule("R_UNKNOWN", Severity::Low, RuleDefinition::Unknown);
        let ctx = ctx_with_segments(vec![], vec![]);
        assert!(evaluate(&r, &ctx).is_none());
    }
}
