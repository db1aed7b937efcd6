//! Tunable screening configuration
//!
//! Every threshold used by the extractors, the planner and the scoring layer
//! lives here. Defaults reproduce the demo constants the screening flow was
//! built around; none of them are calibrated against a population baseline.

use crate::error::ScreenError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Session sizing limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Attempts allowed per question before it becomes terminal
    pub max_tries: u32,
    /// Number of questions delivered before the classifier runs
    pub baseline_question_count: usize,
    /// Upper bound on follow-up questions
    pub max_followup_questions: usize,
    /// Hard cap on delivered questions per session
    pub max_total_questions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_tries: 3,
            baseline_question_count: 6,
            max_followup_questions: 8,
            max_total_questions: 15,
        }
    }
}

/// Pointer hesitation/jitter thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerThresholds {
    /// Displacement counted as a movement (px)
    pub movement_px: f64,
    /// Displacement below which the pointer is considered idle (px)
    pub idle_px: f64,
    /// Idle time before a hesitation event is emitted (ms)
    pub hesitation_ms: i64,
    /// Displacement of a rapid move (px)
    pub rapid_px: f64,
    /// Maximum interval of a rapid move (ms)
    pub rapid_interval_ms: i64,
    /// Consecutive rapid moves that must be exceeded to flag stress
    pub rapid_streak: u32,
}

impl Default for PointerThresholds {
    fn default() -> Self {
        Self {
            movement_px: 5.0,
            idle_px: 10.0,
            hesitation_ms: 2000,
            rapid_px: 30.0,
            rapid_interval_ms: 50,
            rapid_streak: 10,
        }
    }
}

/// Speech feature thresholds and lexicons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechThresholds {
    /// Gap since the last word that counts as a pause (ms)
    pub pause_ms: i64,
    /// Number of trailing words kept as the snippet preceding a pause
    pub snippet_words: usize,
    /// Whole-word filler lexicon (case-insensitive)
    pub filler_lexicon: Vec<String>,
    /// Extra stammer patterns (regex syntax, matched case-insensitively)
    pub stammer_patterns: Vec<String>,
    /// Self-correction markers (case-insensitive, whole word or phrase)
    pub correction_markers: Vec<String>,
}

impl Default for SpeechThresholds {
    fn default() -> Self {
        Self {
            pause_ms: 500,
            snippet_words: 4,
            filler_lexicon: ["um", "umm", "uh", "uhm", "er", "erm", "ah", "hmm", "like", "well"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stammer_patterns: vec![
                // Hyphenated syllable repeats: "b-b-ball", "ba-ba-banana"
                r"\b[a-z]{1,3}-(?:[a-z]{1,3}-)*[a-z]+\b".to_string(),
            ],
            correction_markers: ["i mean", "no", "actually", "sorry"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Face feature thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceThresholds {
    /// Eye aspect ratio below which the eyes count as closed
    pub blink_ear: f64,
    /// Eye-center offset from frame center (%) still counted as on screen
    pub gaze_offset_pct: f64,
    /// Minimum dominant-emotion confidence for a frame to count
    pub emotion_confidence: f64,
    /// Number of recent confident emotions kept for the summary
    pub recent_emotions: usize,
}

impl Default for FaceThresholds {
    fn default() -> Self {
        Self {
            blink_ear: 0.2,
            gaze_offset_pct: 30.0,
            emotion_confidence: 0.3,
            recent_emotions: 5,
        }
    }
}

/// Mid-session classifier thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Accuracy (%) below which a domain is a concern
    pub concern_accuracy: f64,
    /// Retries at or above which a domain is a concern
    pub concern_retries: u32,
    /// Accuracy (%) below which a domain is watched
    pub watch_accuracy: f64,
    /// Average latency (ms) above which a domain is watched
    pub watch_latency_ms: f64,
    /// External stress ratio above which a NORMAL session escalates
    pub stress_escalation: f64,
    /// Minimum follow-up size after stress escalation
    pub stress_min_extra: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            concern_accuracy: 50.0,
            concern_retries: 2,
            watch_accuracy: 80.0,
            watch_latency_ms: 8000.0,
            stress_escalation: 0.3,
            stress_min_extra: 3,
        }
    }
}

/// Final context builder thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextThresholds {
    /// Average latency (ms) that flags extended processing time
    pub slow_processing_ms: f64,
}

impl Default for ContextThresholds {
    fn default() -> Self {
        Self {
            slow_processing_ms: 10_000.0,
        }
    }
}

/// Age groups with reference interaction baselines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "6-8")]
    SixToEight,
    #[serde(rename = "9-11")]
    NineToEleven,
    #[serde(rename = "12-14")]
    TwelveToFourteen,
    #[serde(rename = "15+")]
    FifteenPlus,
}

/// Reference interaction values for an age group.
///
/// Informational only: the classifier does not consume these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBaseline {
    pub hesitation_ms: f64,
    pub jitter: f64,
    pub corrections: f64,
    pub blink_rate_per_min: f64,
    pub gaze_stability: f64,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::SixToEight => "6-8",
            AgeGroup::NineToEleven => "9-11",
            AgeGroup::TwelveToFourteen => "12-14",
            AgeGroup::FifteenPlus => "15+",
        }
    }

    /// Reference row for this age group
    pub fn baseline(&self) -> AgeBaseline {
        let (hesitation_ms, jitter, corrections, blink_rate_per_min, gaze_stability) = match self {
            AgeGroup::SixToEight => (2500.0, 0.4, 3.0, 18.0, 0.6),
            AgeGroup::NineToEleven => (1800.0, 0.3, 2.0, 16.0, 0.7),
            AgeGroup::TwelveToFourteen => (1200.0, 0.2, 1.5, 15.0, 0.75),
            AgeGroup::FifteenPlus => (800.0, 0.15, 1.0, 14.0, 0.8),
        };
        AgeBaseline {
            hesitation_ms,
            jitter,
            corrections,
            blink_rate_per_min,
            gaze_stability,
        }
    }
}

/// Complete screening configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub session: SessionLimits,
    pub pointer: PointerThresholds,
    pub speech: SpeechThresholds,
    pub face: FaceThresholds,
    pub classifier: ClassifierThresholds,
    pub context: ContextThresholds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_group: Option<AgeGroup>,
}

impl ScreenConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ScreenError> {
        let config: ScreenConfig = serde_json::from_str(json)
            .map_err(|e| ScreenError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ScreenError> {
        serde_json::to_string_pretty(self).map_err(ScreenError::JsonError)
    }

    /// Check internal consistency of the thresholds
    pub fn validate(&self) -> Result<(), ScreenError> {
        let session = &self.session;
        if session.max_tries == 0 {
            return Err(ScreenError::InvalidConfig(
                "max_tries must be at least 1".to_string(),
            ));
        }
        if session.baseline_question_count == 0 {
            return Err(ScreenError::InvalidConfig(
                "baseline_question_count must be at least 1".to_string(),
            ));
        }
        if session.baseline_question_count > session.max_total_questions {
            return Err(ScreenError::InvalidConfig(format!(
                "baseline_question_count ({}) exceeds max_total_questions ({})",
                session.baseline_question_count, session.max_total_questions
            )));
        }

        let pointer = &self.pointer;
        if pointer.movement_px <= 0.0 || pointer.idle_px <= 0.0 || pointer.rapid_px <= 0.0 {
            return Err(ScreenError::InvalidConfig(
                "pointer distance thresholds must be positive".to_string(),
            ));
        }
        if pointer.hesitation_ms <= 0 || pointer.rapid_interval_ms <= 0 {
            return Err(ScreenError::InvalidConfig(
                "pointer time thresholds must be positive".to_string(),
            ));
        }

        if self.speech.pause_ms <= 0 {
            return Err(ScreenError::InvalidConfig(
                "pause_ms must be positive".to_string(),
            ));
        }
        for pattern in &self.speech.stammer_patterns {
            Regex::new(pattern).map_err(|e| {
                ScreenError::InvalidConfig(format!("Invalid stammer pattern {:?}: {}", pattern, e))
            })?;
        }

        if !(0.0..=1.0).contains(&self.face.emotion_confidence) || self.face.blink_ear <= 0.0 {
            return Err(ScreenError::InvalidConfig(
                "face thresholds out of range".to_string(),
            ));
        }

        Ok(())
    }
}
