//! Clinical context builder
//!
//! Runs once over the complete response log after the question queue has
//! drained. Produces the structured screening report that an external
//! renderer turns into educator-facing prose. Statuses here describe observed
//! friction; the report never carries a diagnosis.

use crate::classifier::MidSessionAnalysis;
use crate::config::{AgeBaseline, AgeGroup, ContextThresholds};
use crate::signals::{FaceSummary, PointerSummary, SpeechSummary};
use crate::types::{Domain, DomainStatus, Pattern, QuestionPhase, Response, RiskLevel, SessionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Upper bound of the domain confidence score
pub const MAX_CONFIDENCE: u32 = 95;

/// Which sensors were available for the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub microphone: bool,
    pub camera: bool,
}

impl Default for SensorStatus {
    fn default() -> Self {
        Self {
            microphone: true,
            camera: true,
        }
    }
}

/// Age-group reference row and observed deviations from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeReference {
    pub age_group: AgeGroup,
    pub reference: AgeBaseline,
    /// Observed blink rate vs reference (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blink_rate_deviation_pct: Option<f64>,
    /// Observed mean hesitation vs reference (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hesitation_deviation_pct: Option<f64>,
}

impl AgeReference {
    pub fn compare(
        age_group: AgeGroup,
        pointer: &PointerSummary,
        face: Option<&FaceSummary>,
    ) -> Self {
        let reference = age_group.baseline();
        let blink_rate_deviation_pct = face
            .filter(|f| f.duration_ms > 0)
            .map(|f| deviation_pct(f.blink_rate_per_min, reference.blink_rate_per_min));
        let hesitation_deviation_pct = (pointer.hesitation_count > 0)
            .then(|| deviation_pct(pointer.avg_hesitation_ms, reference.hesitation_ms));
        Self {
            age_group,
            reference,
            blink_rate_deviation_pct,
            hesitation_deviation_pct,
        }
    }
}

fn deviation_pct(observed: f64, reference: f64) -> f64 {
    (observed - reference) * 100.0 / reference
}

/// Behavioral features gathered alongside the answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralSummary {
    pub pointer: PointerSummary,
    /// Absent when the microphone was unavailable
    pub speech: Option<SpeechSummary>,
    /// Absent when the camera was unavailable
    pub face: Option<FaceSummary>,
    pub stress_ratio: f64,
    pub sensors: SensorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_reference: Option<AgeReference>,
}

/// Final per-domain result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: Domain,
    pub display_name: String,
    pub clinical_name: String,
    pub baseline_questions: u32,
    pub follow_up_questions: u32,
    pub total_questions: u32,
    pub total_correct: u32,
    /// Percent correct (0-100)
    pub accuracy: f64,
    pub avg_latency_ms: f64,
    pub patterns: Vec<Pattern>,
    /// Confidence in the assessment (0-95)
    pub confidence: u32,
    pub status: DomainStatus,
}

/// Structured screening report handed to the external summarizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub domain_results: Vec<DomainResult>,
    pub total_questions: u32,
    pub overall_accuracy: f64,
    pub risk_level: RiskLevel,
    pub session_type: SessionType,
    pub behavioral_summary: BehavioralSummary,
    pub mid_session_analysis: Option<MidSessionAnalysis>,
    /// Always true: results are screening indicators for a human reviewer
    pub human_review_suggested: bool,
}

/// Confidence from question count, accuracy clarity and pattern count
pub fn domain_confidence(total_questions: u32, accuracy: f64, pattern_count: usize) -> u32 {
    let volume = total_questions.saturating_mul(15).min(60);
    let clarity = if accuracy >= 90.0 || accuracy <= 30.0 {
        25
    } else if accuracy >= 80.0 || accuracy <= 50.0 {
        15
    } else {
        0
    };
    let patterns = (pattern_count as u32).saturating_mul(5);
    volume
        .saturating_add(clarity)
        .saturating_add(patterns)
        .min(MAX_CONFIDENCE)
}

pub fn domain_status(accuracy: f64, pattern_count: usize) -> DomainStatus {
    if accuracy >= 85.0 && pattern_count == 0 {
        DomainStatus::Typical
    } else if accuracy >= 70.0 && pattern_count <= 1 {
        DomainStatus::Watch
    } else {
        DomainStatus::Elevated
    }
}

#[derive(Default)]
struct DomainTally<'a> {
    baseline: u32,
    follow_up: u32,
    correct: u32,
    latency_sum_ms: i64,
    responses: Vec<&'a Response>,
}

/// Builds the final report from the full response log
#[derive(Debug, Clone, Default)]
pub struct ClinicalContextBuilder {
    thresholds: ContextThresholds,
}

impl ClinicalContextBuilder {
    pub fn new(thresholds: ContextThresholds) -> Self {
        Self { thresholds }
    }

    /// Patterns from incorrect answers by subtype, plus slow attention responses
    fn patterns(&self, domain: Domain, tally: &DomainTally<'_>, avg_latency_ms: f64) -> Vec<Pattern> {
        let missed = |subtype: &str| {
            tally
                .responses
                .iter()
                .any(|r| !r.correct && r.kind.subtype() == subtype)
        };

        let mut patterns = Vec::new();
        match domain {
            Domain::Reading => {
                if missed("letter") {
                    patterns.push(Pattern::LetterReversal);
                }
                if missed("rhyme") {
                    patterns.push(Pattern::PhonologicalAwareness);
                }
            }
            Domain::Math => {
                if missed("counting") {
                    patterns.push(Pattern::CountingAccuracy);
                }
                if missed("arithmetic") {
                    patterns.push(Pattern::BasicArithmetic);
                }
            }
            Domain::Attention => {
                if missed("working_memory") {
                    patterns.push(Pattern::WorkingMemory);
                }
                if avg_latency_ms > self.thresholds.slow_processing_ms {
                    patterns.push(Pattern::ExtendedProcessingTime);
                }
            }
            Domain::Visual | Domain::Listening => {}
        }
        patterns
    }

    /// Aggregate terminal responses across both phases, in domain order
    pub fn domain_results(&self, responses: &[Response]) -> Vec<DomainResult> {
        let mut tallies: BTreeMap<Domain, DomainTally<'_>> = BTreeMap::new();
        for response in responses.iter().filter(|r| r.terminal) {
            let tally = tallies.entry(response.domain).or_default();
            match response.phase {
                QuestionPhase::Baseline => tally.baseline += 1,
                QuestionPhase::Followup => tally.follow_up += 1,
            }
            if response.correct {
                tally.correct += 1;
            }
            tally.latency_sum_ms += response.response_latency_ms;
            tally.responses.push(response);
        }

        tallies
            .into_iter()
            .map(|(domain, tally)| {
                let total_questions = tally.baseline + tally.follow_up;
                let accuracy = tally.correct as f64 / total_questions as f64 * 100.0;
                let avg_latency_ms = tally.latency_sum_ms as f64 / total_questions as f64;
                let patterns = self.patterns(domain, &tally, avg_latency_ms);
                DomainResult {
                    domain,
                    display_name: domain.display_name().to_string(),
                    clinical_name: domain.clinical_name().to_string(),
                    baseline_questions: tally.baseline,
                    follow_up_questions: tally.follow_up,
                    total_questions,
                    total_correct: tally.correct,
                    accuracy,
                    avg_latency_ms,
                    confidence: domain_confidence(total_questions, accuracy, patterns.len()),
                    status: domain_status(accuracy, patterns.len()),
                    patterns,
                }
            })
            .collect()
    }

    /// Build the final report
    pub fn build(
        &self,
        responses: &[Response],
        analysis: Option<&MidSessionAnalysis>,
        behavioral_summary: BehavioralSummary,
    ) -> ScreeningReport {
        let domain_results = self.domain_results(responses);
        let total_questions: u32 = domain_results.iter().map(|d| d.total_questions).sum();
        let total_correct: u32 = domain_results.iter().map(|d| d.total_correct).sum();
        let overall_accuracy = if total_questions > 0 {
            total_correct as f64 / total_questions as f64 * 100.0
        } else {
            0.0
        };
        let follow_up_ran = domain_results.iter().any(|d| d.follow_up_questions > 0);
        let session_type = if follow_up_ran {
            SessionType::Adaptive
        } else {
            SessionType::BaselineOnly
        };
        let risk_level = analysis.map(|a| a.overall_risk).unwrap_or(RiskLevel::Normal);

        info!(
            total_questions,
            overall_accuracy,
            session_type = ?session_type,
            "screening report built"
        );

        ScreeningReport {
            domain_results,
            total_questions,
            overall_accuracy,
            risk_level,
            session_type,
            behavioral_summary,
            mid_session_analysis: analysis.cloned(),
            human_review_suggested: true,
        }
    }
}
