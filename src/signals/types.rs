//! Signal sample and summary types
//!
//! Samples arrive from external capture adapters (pointer listeners, speech
//! recognizers, face landmark models). Summaries are what the extractors
//! publish to the session and the final report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Pointer
// ============================================================================

/// One pointer position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: i64,
}

/// Sustained idle pointer period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HesitationEvent {
    /// When the hesitation was detected
    pub timestamp_ms: i64,
    /// Idle duration in milliseconds
    pub duration_ms: i64,
}

/// Source of a stress indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressKind {
    /// Burst of rapid, large pointer movements
    RapidPointer,
}

/// Behavioral stress indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressIndicator {
    pub kind: StressKind,
    pub timestamp_ms: i64,
}

/// Aggregated pointer features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerSummary {
    /// Samples that moved more than the movement threshold
    pub movement_count: u32,
    pub hesitation_count: u32,
    pub total_hesitation_ms: i64,
    pub avg_hesitation_ms: f64,
    pub stress_indicator_count: u32,
    pub hesitation_events: Vec<HesitationEvent>,
    pub stress_indicators: Vec<StressIndicator>,
}

// ============================================================================
// Speech
// ============================================================================

/// Incremental transcript result from a speech recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub transcript: String,
    /// Recognizer confidence (0-1)
    pub confidence: f64,
    /// Whether the recognizer will not revise this segment
    #[serde(default)]
    pub is_final: bool,
    pub timestamp_ms: i64,
}

/// Speech boundary kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    Start,
    End,
}

/// Speech start/end boundary reported by the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechBoundary {
    pub kind: BoundaryKind,
    pub timestamp_ms: i64,
}

/// Input accepted by the speech extractor
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechInput {
    Segment(SpeechSegment),
    Boundary(SpeechBoundary),
}

/// Gap between words
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechPause {
    pub timestamp_ms: i64,
    pub duration_ms: i64,
    /// Last words heard before the pause
    pub preceding_snippet: String,
}

/// Matched filler or stammer fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedToken {
    pub text: String,
    pub timestamp_ms: i64,
}

/// Self-correction form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Explicit marker such as "I mean" or "sorry"
    Marker { marker: String },
    /// "<word> no <word>" replacement
    Replacement { from: String, to: String },
}

/// Detected self-correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfCorrection {
    #[serde(flatten)]
    pub kind: CorrectionKind,
    pub timestamp_ms: i64,
}

/// Aggregated speech features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechSummary {
    pub total_words: u32,
    pub filler_word_count: u32,
    pub stammer_count: u32,
    pub self_corrections: u32,
    pub speech_rate_wpm: f64,
    pub avg_pause_duration_ms: f64,
    /// Silent share of time between speech boundaries (0-1)
    pub silence_ratio: f64,
    pub pauses: Vec<SpeechPause>,
    pub fillers: Vec<DetectedToken>,
    pub stammers: Vec<DetectedToken>,
    pub corrections: Vec<SelfCorrection>,
}

// ============================================================================
// Face
// ============================================================================

/// 2-D landmark point in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Expression classes produced by the landmark/expression model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Emotion {
    /// Emotions counted toward the stress ratio
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Emotion::Angry | Emotion::Sad | Emotion::Fearful | Emotion::Disgusted
        )
    }
}

/// One face detection frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceFrame {
    pub face_detected: bool,
    /// Six-point eye contour, p1..p6
    #[serde(default)]
    pub left_eye: Vec<Point>,
    #[serde(default)]
    pub right_eye: Vec<Point>,
    #[serde(default)]
    pub nose: Vec<Point>,
    #[serde(default)]
    pub jaw: Vec<Point>,
    /// Expression confidences (0-1)
    #[serde(default)]
    pub emotions: BTreeMap<Emotion, f64>,
    pub frame_width: f64,
    pub frame_height: f64,
    pub timestamp_ms: i64,
}

/// Approximate head orientation in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Aggregated face features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSummary {
    pub duration_ms: i64,
    pub total_frames: u32,
    pub face_frames: u32,
    pub face_presence_pct: f64,
    pub blink_count: u32,
    pub blink_rate_per_min: f64,
    pub gaze_on_screen_pct: f64,
    pub dominant_emotion: Emotion,
    /// Share of confident frames per emotion (%)
    pub emotion_distribution: BTreeMap<Emotion, f64>,
    /// Negative confident frames / confident frames
    pub stress_ratio: f64,
    pub recent_emotions: Vec<Emotion>,
    /// Mean absolute head pose over frames with pose landmarks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_head_pose: Option<HeadPose>,
}

impl Default for FaceSummary {
    fn default() -> Self {
        Self {
            duration_ms: 0,
            total_frames: 0,
            face_frames: 0,
            face_presence_pct: 0.0,
            blink_count: 0,
            blink_rate_per_min: 0.0,
            gaze_on_screen_pct: 0.0,
            dominant_emotion: Emotion::Neutral,
            emotion_distribution: BTreeMap::new(),
            stress_ratio: 0.0,
            recent_emotions: Vec::new(),
            mean_head_pose: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_frame_deserialization() {
        let json = r#"{
            "face_detected": true,
            "emotions": { "happy": 0.8, "neutral": 0.15 },
            "frame_width": 320,
            "frame_height": 240,
            "timestamp_ms": 1000
        }"#;
        let frame: FaceFrame = serde_json::from_str(json).unwrap();
        assert!(frame.face_detected);
        assert!(frame.left_eye.is_empty());
        assert_eq!(frame.emotions.get(&Emotion::Happy), Some(&0.8));
    }

    #[test]
    fn test_correction_serialization() {
        let correction = SelfCorrection {
            kind: CorrectionKind::Replacement {
                from: "cat".to_string(),
                to: "hat".to_string(),
            },
            timestamp_ms: 10,
        };
        let json = serde_json::to_value(&correction).unwrap();
        assert_eq!(json["form"], "replacement");
        assert_eq!(json["to"], "hat");
        assert_eq!(json["timestamp_ms"], 10);
    }

    #[test]
    fn test_negative_emotions() {
        assert!(Emotion::Fearful.is_negative());
        assert!(!Emotion::Surprised.is_negative());
        assert!(!Emotion::Neutral.is_negative());
    }
}
