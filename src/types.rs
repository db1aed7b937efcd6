//! Core screening types
//!
//! Questions, responses and the classification enums shared by the planner,
//! the classifier and the context builder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cognitive area under screening
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Reading,
    Math,
    Attention,
    Visual,
    Listening,
}

impl Domain {
    /// All domains in bank order
    pub const ALL: [Domain; 5] = [
        Domain::Reading,
        Domain::Math,
        Domain::Attention,
        Domain::Visual,
        Domain::Listening,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Reading => "reading",
            Domain::Math => "math",
            Domain::Attention => "attention",
            Domain::Visual => "visual",
            Domain::Listening => "listening",
        }
    }

    /// Educator-facing name
    pub fn display_name(&self) -> &'static str {
        match self {
            Domain::Reading => "Reading & Words",
            Domain::Math => "Numbers & Counting",
            Domain::Attention => "Focus & Attention",
            Domain::Visual => "Visual Patterns",
            Domain::Listening => "Listening & Speaking",
        }
    }

    /// Screening area the domain maps to
    pub fn clinical_name(&self) -> &'static str {
        match self {
            Domain::Reading => "Phonological Processing",
            Domain::Math => "Numerical Cognition",
            Domain::Attention => "Executive Function",
            Domain::Visual => "Visual Processing",
            Domain::Listening => "Auditory Processing",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase a question belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPhase {
    Baseline,
    Followup,
}

/// Question subtype with the fields its pattern rule needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Letter discrimination (b/d/p/q)
    Letter { shown: char },
    /// Rhyme judgement
    Rhyme { target: String },
    /// Initial-sound matching
    Sound { target: String },
    /// Counting displayed items
    Counting { count: u32 },
    /// Single-step arithmetic
    Arithmetic { expression: String },
    /// Quantity comparison
    Quantity,
    /// Visual or numeric sequence continuation
    Pattern,
    /// Odd-one-out
    Matching { correct_index: usize },
    /// Digit span recall
    WorkingMemory { sequence: Vec<u8> },
    /// Color-word interference
    Stroop { word: String, ink: String },
    /// Odd sound out
    SoundMatch,
    /// Spoken word (voice check)
    Verbal { word: String },
}

impl QuestionKind {
    pub fn is_verbal(&self) -> bool {
        matches!(self, QuestionKind::Verbal { .. })
    }

    /// Stable subtype label
    pub fn subtype(&self) -> &'static str {
        match self {
            QuestionKind::Letter { .. } => "letter",
            QuestionKind::Rhyme { .. } => "rhyme",
            QuestionKind::Sound { .. } => "sound",
            QuestionKind::Counting { .. } => "counting",
            QuestionKind::Arithmetic { .. } => "arithmetic",
            QuestionKind::Quantity => "quantity",
            QuestionKind::Pattern => "pattern",
            QuestionKind::Matching { .. } => "matching",
            QuestionKind::WorkingMemory { .. } => "working_memory",
            QuestionKind::Stroop { .. } => "stroop",
            QuestionKind::SoundMatch => "sound_match",
            QuestionKind::Verbal { .. } => "verbal",
        }
    }
}

/// A single screening question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Globally unique identifier
    pub id: String,
    pub domain: Domain,
    pub difficulty: u8,
    pub phase: QuestionPhase,
    pub prompt: String,
    /// Answer options (empty for verbal items)
    #[serde(default)]
    pub options: Vec<String>,
    /// Correct option; verbal items are scored against their target word
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<String>,
    pub max_attempts: u32,
    pub kind: QuestionKind,
}

impl Question {
    /// Score a submitted answer
    pub fn is_correct(&self, answer: &str) -> bool {
        match (&self.kind, &self.correct) {
            (QuestionKind::Verbal { word }, _) => transcript_contains(answer, word),
            (_, Some(correct)) => answer.trim() == correct.as_str(),
            (_, None) => false,
        }
    }
}

/// Whole-word, case-insensitive containment ignoring punctuation and emoji
fn transcript_contains(transcript: &str, word: &str) -> bool {
    let target: String = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if target.is_empty() {
        return false;
    }
    transcript
        .split(|c: char| !c.is_alphabetic())
        .any(|token| token.to_lowercase() == target)
}

/// Answer submission from the UI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub question_id: String,
    pub selected_answer: String,
    pub timestamp_ms: i64,
}

/// One logged attempt at a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub question_id: String,
    pub domain: Domain,
    pub phase: QuestionPhase,
    pub kind: QuestionKind,
    pub selected_answer: String,
    pub correct: bool,
    /// Time since the question was presented (ms)
    pub response_latency_ms: i64,
    /// 1-based attempt number, never above the question's max attempts
    pub attempt_count: u32,
    /// Whether a pointer hesitation occurred while the question was shown
    pub hesitated: bool,
    /// Whether this attempt closed the question
    pub terminal: bool,
    pub timestamp_ms: i64,
}

/// Session-level risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Normal,
    Watch,
    Concern,
}

/// Per-domain flag assigned by the mid-session classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaselineFlag {
    Typical,
    Watch,
    Concern,
}

/// Per-domain status in the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    Typical,
    Watch,
    Elevated,
}

/// Whether follow-up questions ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Adaptive,
    BaselineOnly,
}

/// Session lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Baseline,
    Analyzing,
    Followup,
    Complete,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Baseline => "baseline",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::Followup => "followup",
            SessionPhase::Complete => "complete",
        }
    }

    /// Whether questions are being delivered
    pub fn accepts_answers(&self) -> bool {
        matches!(self, SessionPhase::Baseline | SessionPhase::Followup)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed difficulty pattern; a friction indicator, never a diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    LetterReversal,
    PhonologicalAwareness,
    CountingAccuracy,
    BasicArithmetic,
    WorkingMemory,
    ExtendedProcessingTime,
}

impl Pattern {
    pub fn description(&self) -> &'static str {
        match self {
            Pattern::LetterReversal => "Letter reversal difficulty observed (b/d/p/q confusion)",
            Pattern::PhonologicalAwareness => "Phonological awareness difficulty (rhyming)",
            Pattern::CountingAccuracy => "Counting accuracy difficulty",
            Pattern::BasicArithmetic => "Basic arithmetic difficulty",
            Pattern::WorkingMemory => "Working memory difficulty (digit span)",
            Pattern::ExtendedProcessingTime => "Extended processing time observed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter_question() -> Question {
        Question {
            id: "base_letter_b".to_string(),
            domain: Domain::Reading,
            difficulty: 1,
            phase: QuestionPhase::Baseline,
            prompt: "Which letter is this?".to_string(),
            options: vec!["b".into(), "d".into(), "p".into(), "q".into()],
            correct: Some("b".to_string()),
            max_attempts: 3,
            kind: QuestionKind::Letter { shown: 'b' },
        }
    }

    #[test]
    fn test_domain_serialization() {
        let json = serde_json::to_string(&Domain::Listening).unwrap();
        assert_eq!(json, "\"listening\"");
        let parsed: Domain = serde_json::from_str("\"math\"").unwrap();
        assert_eq!(parsed, Domain::Math);
    }

    #[test]
    fn test_question_kind_is_tagged() {
        let json = serde_json::to_value(QuestionKind::WorkingMemory { sequence: vec![3, 7, 2] }).unwrap();
        assert_eq!(json["type"], "working_memory");
        assert_eq!(json["sequence"][1], 7);
    }

    #[test]
    fn test_option_scoring() {
        let question = letter_question();
        assert!(question.is_correct("b"));
        assert!(question.is_correct(" b "));
        assert!(!question.is_correct("d"));
    }

    #[test]
    fn test_verbal_scoring() {
        let question = Question {
            id: "base_voice_check".to_string(),
            domain: Domain::Listening,
            difficulty: 1,
            phase: QuestionPhase::Baseline,
            prompt: "Say this word out loud:".to_string(),
            options: vec![],
            correct: None,
            max_attempts: 3,
            kind: QuestionKind::Verbal { word: "HELLO 👋".to_string() },
        };
        assert!(question.is_correct("hello there"));
        assert!(question.is_correct("Hello!"));
        assert!(!question.is_correct("yellow"));
        assert!(!question.is_correct(""));
    }

    #[test]
    fn test_risk_level_serialization() {
        assert_eq!(serde_json::to_string(&RiskLevel::Concern).unwrap(), "\"CONCERN\"");
        assert_eq!(
            serde_json::to_string(&SessionType::BaselineOnly).unwrap(),
            "\"BASELINE_ONLY\""
        );
    }

    #[test]
    fn test_phase_order_is_forward() {
        assert!(SessionPhase::Baseline < SessionPhase::Analyzing);
        assert!(SessionPhase::Analyzing < SessionPhase::Followup);
        assert!(SessionPhase::Followup < SessionPhase::Complete);
        assert!(!SessionPhase::Complete.accepts_answers());
    }
}
