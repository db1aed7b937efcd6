//! Adaptive risk classifier
//!
//! Runs once when the baseline queue drains. Aggregates the terminal baseline
//! responses per domain, flags each domain, and maps the flag counts onto a
//! session risk level and a follow-up request.

use crate::config::ClassifierThresholds;
use crate::types::{BaselineFlag, Domain, Response, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Per-domain baseline statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStat {
    pub domain: Domain,
    pub total: u32,
    pub correct: u32,
    /// Percent correct (0-100)
    pub accuracy: f64,
    pub avg_latency_ms: f64,
    /// Sum of extra attempts over all questions
    pub retries: u32,
    /// Questions during which the pointer hesitated
    pub hesitation_count: u32,
    pub flag: BaselineFlag,
}

/// Output of the mid-session analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidSessionAnalysis {
    pub overall_risk: RiskLevel,
    pub continue_session: bool,
    /// Concern domains first, then watch domains
    pub focus_domains: Vec<Domain>,
    pub additional_questions: usize,
    pub rationale: String,
    pub domain_stats: Vec<DomainStat>,
    /// External stress ratio the analysis saw
    pub stress_ratio: f64,
    pub stress_escalated: bool,
    pub analyzed_at_ms: i64,
}

#[derive(Default)]
struct Accumulator {
    total: u32,
    correct: u32,
    latency_sum_ms: i64,
    retries: u32,
    hesitations: u32,
}

/// Baseline risk classifier
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    thresholds: ClassifierThresholds,
    max_followup: usize,
}

impl RiskClassifier {
    pub fn new(thresholds: ClassifierThresholds, max_followup: usize) -> Self {
        Self {
            thresholds,
            max_followup,
        }
    }

    /// Aggregate terminal responses per domain, in domain order
    pub fn domain_stats(&self, responses: &[Response]) -> Vec<DomainStat> {
        let mut by_domain: BTreeMap<Domain, Accumulator> = BTreeMap::new();
        for response in responses.iter().filter(|r| r.terminal) {
            let acc = by_domain.entry(response.domain).or_default();
            acc.total += 1;
            if response.correct {
                acc.correct += 1;
            }
            acc.latency_sum_ms += response.response_latency_ms;
            acc.retries += response.attempt_count.saturating_sub(1);
            if response.hesitated {
                acc.hesitations += 1;
            }
        }

        by_domain
            .into_iter()
            .map(|(domain, acc)| {
                let accuracy = acc.correct as f64 / acc.total as f64 * 100.0;
                let avg_latency_ms = acc.latency_sum_ms as f64 / acc.total as f64;
                let mut stat = DomainStat {
                    domain,
                    total: acc.total,
                    correct: acc.correct,
                    accuracy,
                    avg_latency_ms,
                    retries: acc.retries,
                    hesitation_count: acc.hesitations,
                    flag: BaselineFlag::Typical,
                };
                stat.flag = self.flag(&stat);
                stat
            })
            .collect()
    }

    fn flag(&self, stat: &DomainStat) -> BaselineFlag {
        let t = &self.thresholds;
        if stat.accuracy < t.concern_accuracy || stat.retries >= t.concern_retries {
            BaselineFlag::Concern
        } else if stat.accuracy < t.watch_accuracy
            || stat.hesitation_count > 0
            || stat.avg_latency_ms > t.watch_latency_ms
        {
            BaselineFlag::Watch
        } else {
            BaselineFlag::Typical
        }
    }

    /// Classify the baseline and size the follow-up
    pub fn classify(
        &self,
        responses: &[Response],
        stress_ratio: f64,
        analyzed_at_ms: i64,
    ) -> MidSessionAnalysis {
        let domain_stats = self.domain_stats(responses);
        let flagged = |flag: BaselineFlag| -> Vec<Domain> {
            domain_stats
                .iter()
                .filter(|s| s.flag == flag)
                .map(|s| s.domain)
                .collect()
        };
        let concern = flagged(BaselineFlag::Concern);
        let watch = flagged(BaselineFlag::Watch);

        let (mut overall_risk, mut continue_session, mut additional, mut rationale) =
            match (concern.len(), watch.len()) {
                (c, _) if c >= 2 => (
                    RiskLevel::Concern,
                    true,
                    8,
                    format!("Multiple domains need a closer look: {}", join(&concern)),
                ),
                (1, _) => (
                    RiskLevel::Watch,
                    true,
                    5,
                    format!("Pattern detected in {}", join(&concern)),
                ),
                (0, w) if w >= 2 => (
                    RiskLevel::Watch,
                    true,
                    4,
                    format!("Minor variations in {}", join(&watch)),
                ),
                (0, 1) => (
                    RiskLevel::Normal,
                    true,
                    2,
                    format!("Slight hesitation in {}", join(&watch)),
                ),
                _ => (
                    RiskLevel::Normal,
                    false,
                    0,
                    "All domains within the typical range".to_string(),
                ),
            };

        let mut focus_domains: Vec<Domain> = concern.into_iter().chain(watch).collect();

        let stress_escalated =
            overall_risk == RiskLevel::Normal && stress_ratio > self.thresholds.stress_escalation;
        if stress_escalated {
            overall_risk = RiskLevel::Watch;
            continue_session = true;
            additional = additional.max(self.thresholds.stress_min_extra);
            rationale.push_str("; elevated stress indicators observed");
            if focus_domains.is_empty() {
                let mut by_accuracy: Vec<&DomainStat> = domain_stats.iter().collect();
                by_accuracy.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
                focus_domains = by_accuracy.into_iter().map(|s| s.domain).collect();
            }
        }

        let additional_questions = additional.min(self.max_followup);
        info!(
            risk = ?overall_risk,
            continue_session,
            additional_questions,
            focus = %join(&focus_domains),
            "mid-session analysis complete"
        );

        MidSessionAnalysis {
            overall_risk,
            continue_session,
            focus_domains,
            additional_questions,
            rationale,
            domain_stats,
            stress_ratio,
            stress_escalated,
            analyzed_at_ms,
        }
    }
}

fn join(domains: &[Domain]) -> String {
    domains
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QuestionKind, QuestionPhase};
    use pretty_assertions::assert_eq;

    fn classifier() -> RiskClassifier {
        RiskClassifier::new(ClassifierThresholds::default(), 8)
    }

    fn response(domain: Domain, correct: bool, attempts: u32, latency_ms: i64) -> Response {
        Response {
            question_id: format!("{}_{}", domain, latency_ms),
            domain,
            phase: QuestionPhase::Baseline,
            kind: QuestionKind::Pattern,
            selected_answer: String::new(),
            correct,
            response_latency_ms: latency_ms,
            attempt_count: attempts,
            hesitated: false,
            terminal: true,
            timestamp_ms: 0,
        }
    }

    fn typical(domain: Domain) -> Response {
        response(domain, true, 1, 2000)
    }

    fn concern(domain: Domain) -> Response {
        response(domain, false, 3, 2000)
    }

    fn watch(domain: Domain) -> Response {
        response(domain, true, 1, 9000)
    }

    #[test]
    fn test_two_concerns_is_concern() {
        let responses = vec![
            concern(Domain::Reading),
            concern(Domain::Math),
            typical(Domain::Attention),
        ];
        let analysis = classifier().classify(&responses, 0.0, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Concern);
        assert!(analysis.continue_session);
        assert_eq!(analysis.additional_questions, 8);
        assert_eq!(analysis.focus_domains, vec![Domain::Reading, Domain::Math]);
    }

    #[test]
    fn test_one_concern_is_watch() {
        let responses = vec![concern(Domain::Visual), watch(Domain::Reading)];
        let analysis = classifier().classify(&responses, 0.0, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Watch);
        assert_eq!(analysis.additional_questions, 5);
        // Concern before watch
        assert_eq!(analysis.focus_domains, vec![Domain::Visual, Domain::Reading]);
    }

    #[test]
    fn test_two_watches_is_watch() {
        let responses = vec![watch(Domain::Reading), watch(Domain::Listening)];
        let analysis = classifier().classify(&responses, 0.0, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Watch);
        assert_eq!(analysis.additional_questions, 4);
    }

    #[test]
    fn test_one_watch_is_normal_with_check() {
        let responses = vec![watch(Domain::Attention), typical(Domain::Math)];
        let analysis = classifier().classify(&responses, 0.0, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Normal);
        assert!(analysis.continue_session);
        assert_eq!(analysis.additional_questions, 2);
    }

    #[test]
    fn test_all_typical_stops() {
        let responses: Vec<Response> = Domain::ALL.iter().map(|d| typical(*d)).collect();
        let analysis = classifier().classify(&responses, 0.0, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Normal);
        assert!(!analysis.continue_session);
        assert_eq!(analysis.additional_questions, 0);
        assert!(analysis.focus_domains.is_empty());
    }

    #[test]
    fn test_domain_flag_boundaries() {
        let c = classifier();
        // Exactly 50% is not a concern, exactly 80% is not a watch
        let half = vec![
            response(Domain::Math, true, 1, 1000),
            response(Domain::Math, false, 1, 1000),
        ];
        assert_eq!(c.domain_stats(&half)[0].flag, BaselineFlag::Watch);

        let mut eighty: Vec<Response> = (0..4).map(|_| typical(Domain::Math)).collect();
        eighty.push(response(Domain::Math, false, 1, 2000));
        assert_eq!(c.domain_stats(&eighty)[0].accuracy, 80.0);
        assert_eq!(c.domain_stats(&eighty)[0].flag, BaselineFlag::Typical);

        // Two retries on a correct answer is a concern
        let retried = vec![response(Domain::Math, true, 3, 1000)];
        assert_eq!(c.domain_stats(&retried)[0].flag, BaselineFlag::Concern);

        // Latency of exactly 8000ms is not slow
        let slow_edge = vec![response(Domain::Math, true, 1, 8000)];
        assert_eq!(c.domain_stats(&slow_edge)[0].flag, BaselineFlag::Typical);
    }

    #[test]
    fn test_hesitation_flags_watch() {
        let mut hesitant = typical(Domain::Reading);
        hesitant.hesitated = true;
        let stats = classifier().domain_stats(&[hesitant]);
        assert_eq!(stats[0].hesitation_count, 1);
        assert_eq!(stats[0].flag, BaselineFlag::Watch);
    }

    #[test]
    fn test_non_terminal_attempts_are_not_counted() {
        let mut first_try = response(Domain::Reading, false, 1, 1000);
        first_try.terminal = false;
        let responses = vec![first_try, response(Domain::Reading, true, 2, 3000)];
        let stats = classifier().domain_stats(&responses);
        assert_eq!(stats[0].total, 1);
        assert_eq!(stats[0].accuracy, 100.0);
        assert_eq!(stats[0].retries, 1);
    }

    #[test]
    fn test_stress_escalates_normal_session() {
        let responses = vec![typical(Domain::Reading), response(Domain::Math, true, 1, 3000)];
        let mut math_slower = responses.clone();
        math_slower.push(response(Domain::Math, false, 1, 1000));
        math_slower.extend((0..3).map(|_| typical(Domain::Math)));

        let analysis = classifier().classify(&math_slower, 0.5, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Watch);
        assert!(analysis.continue_session);
        assert!(analysis.stress_escalated);
        assert_eq!(analysis.additional_questions, 3);
        // No flagged domains: focus on every domain, weakest first
        assert_eq!(analysis.focus_domains, vec![Domain::Math, Domain::Reading]);
    }

    #[test]
    fn test_stress_does_not_change_watch_sessions() {
        let responses = vec![concern(Domain::Reading)];
        let analysis = classifier().classify(&responses, 0.9, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Watch);
        assert_eq!(analysis.additional_questions, 5);
        assert!(!analysis.stress_escalated);
    }

    #[test]
    fn test_stress_at_threshold_does_not_escalate() {
        let responses = vec![typical(Domain::Reading)];
        let analysis = classifier().classify(&responses, 0.3, 0);
        assert_eq!(analysis.overall_risk, RiskLevel::Normal);
        assert!(!analysis.continue_session);
    }

    #[test]
    fn test_additional_is_capped() {
        let responses = vec![concern(Domain::Reading), concern(Domain::Math)];
        let analysis = RiskClassifier::new(ClassifierThresholds::default(), 6).classify(&responses, 0.0, 0);
        assert_eq!(analysis.additional_questions, 6);
    }
}
