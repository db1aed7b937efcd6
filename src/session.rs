//! Screening session state machine
//!
//! Owns one session's extractors, question queue and response log. Phases
//! only move forward: baseline, analyzing, follow-up, complete. The
//! classifier runs exactly once when the baseline queue drains and the report
//! is built exactly once when the last question closes.
//!
//! A session is driven by events from capture adapters and the UI. Nothing
//! here reads a clock; every event carries its own timestamp.

use crate::bank::{QuestionBank, SessionPlanner};
use crate::classifier::{MidSessionAnalysis, RiskClassifier};
use crate::config::ScreenConfig;
use crate::context::{AgeReference, BehavioralSummary, ClinicalContextBuilder, ScreeningReport, SensorStatus};
use crate::error::ScreenError;
use crate::signals::types::{Emotion, FaceFrame, PointerSample, SpeechBoundary, SpeechInput, SpeechSegment};
use crate::signals::{FaceExtractor, PointerExtractor, SignalExtractor, SpeechExtractor};
use crate::types::{AnswerSubmission, Question, Response, SessionPhase};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Capture device that can be denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Microphone,
    Camera,
}

/// One recorded input to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session start; only meaningful as the first event of a recording
    SessionStart {
        timestamp_ms: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    Pointer(PointerSample),
    SpeechSegment(SpeechSegment),
    SpeechBoundary(SpeechBoundary),
    FaceFrame(FaceFrame),
    Answer(AnswerSubmission),
    SensorUnavailable { sensor: Sensor },
}

impl SessionEvent {
    pub fn timestamp_ms(&self) -> Option<i64> {
        match self {
            SessionEvent::SessionStart { timestamp_ms, .. } => Some(*timestamp_ms),
            SessionEvent::Pointer(s) => Some(s.timestamp_ms),
            SessionEvent::SpeechSegment(s) => Some(s.timestamp_ms),
            SessionEvent::SpeechBoundary(b) => Some(b.timestamp_ms),
            SessionEvent::FaceFrame(f) => Some(f.timestamp_ms),
            SessionEvent::Answer(a) => Some(a.timestamp_ms),
            SessionEvent::SensorUnavailable { .. } => None,
        }
    }
}

/// Result of an accepted answer submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub question_id: String,
    pub correct: bool,
    pub attempt_count: u32,
    /// Whether the question is closed
    pub terminal: bool,
    /// Phase after the submission was processed
    pub phase: SessionPhase,
    /// Question now presented, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<Question>,
}

/// Running speech counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechStats {
    pub total_words: u32,
    pub filler_word_count: u32,
    pub stammer_count: u32,
    pub self_corrections: u32,
    pub speech_rate_wpm: f64,
}

/// Running face counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceStats {
    pub face_presence_pct: f64,
    pub blink_count: u32,
    pub gaze_on_screen_pct: f64,
    pub dominant_emotion: Emotion,
    pub stress_ratio: f64,
}

/// Pollable view of a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub phase: SessionPhase,
    pub questions_delivered: usize,
    pub questions_remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question_id: Option<String>,
    pub movement_count: u32,
    pub hesitation_count: u32,
    pub stress_indicator_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceStats>,
}

/// Question currently shown to the learner
#[derive(Debug, Clone)]
struct Presented {
    question: Question,
    presented_at_ms: i64,
    attempts: u32,
    hesitations_at_start: usize,
}

/// One screening session
#[derive(Debug)]
pub struct ScreeningSession {
    config: ScreenConfig,
    planner: SessionPlanner,
    classifier: RiskClassifier,
    context_builder: ClinicalContextBuilder,
    rng: StdRng,
    phase: SessionPhase,
    queue: VecDeque<Question>,
    current: Option<Presented>,
    delivered: HashSet<String>,
    responses: Vec<Response>,
    pointer: PointerExtractor,
    speech: SpeechExtractor,
    face: FaceExtractor,
    sensors: SensorStatus,
    analysis: Option<MidSessionAnalysis>,
    report: Option<ScreeningReport>,
    cancelled: bool,
}

impl ScreeningSession {
    /// Start a session on the standard bank with an entropy-seeded shuffle
    pub fn new(config: ScreenConfig, started_at_ms: i64) -> Result<Self, ScreenError> {
        Self::with_bank(config, QuestionBank::standard(), StdRng::from_entropy(), started_at_ms)
    }

    /// Start a session whose question order is reproducible from `seed`
    pub fn with_seed(config: ScreenConfig, seed: u64, started_at_ms: i64) -> Result<Self, ScreenError> {
        Self::with_bank(config, QuestionBank::standard(), StdRng::seed_from_u64(seed), started_at_ms)
    }

    pub fn with_bank(
        config: ScreenConfig,
        bank: Arc<QuestionBank>,
        mut rng: StdRng,
        started_at_ms: i64,
    ) -> Result<Self, ScreenError> {
        config.validate()?;
        let planner = SessionPlanner::new(bank, config.session.clone())?;
        let queue: VecDeque<Question> = planner.generate_baseline(&mut rng).into();

        let mut session = Self {
            classifier: RiskClassifier::new(
                config.classifier.clone(),
                config.session.max_followup_questions,
            ),
            context_builder: ClinicalContextBuilder::new(config.context.clone()),
            pointer: PointerExtractor::new(config.pointer.clone()),
            speech: SpeechExtractor::new(&config.speech),
            face: FaceExtractor::new(config.face.clone()),
            config,
            planner,
            rng,
            phase: SessionPhase::Baseline,
            queue,
            current: None,
            delivered: HashSet::new(),
            responses: Vec::new(),
            sensors: SensorStatus::default(),
            analysis: None,
            report: None,
            cancelled: false,
        };
        info!(
            baseline_questions = session.queue.len(),
            started_at_ms, "screening session started"
        );
        session.present_next(started_at_ms)?;
        Ok(session)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current.as_ref().map(|p| &p.question)
    }

    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    pub fn analysis(&self) -> Option<&MidSessionAnalysis> {
        self.analysis.as_ref()
    }

    /// Questions presented so far, including the current one
    pub fn questions_delivered(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn sampling(&self) -> bool {
        !self.cancelled && self.phase != SessionPhase::Complete
    }

    pub fn ingest_pointer(&mut self, sample: &PointerSample) {
        if self.sampling() {
            self.pointer.ingest(sample);
        }
    }

    pub fn ingest_speech(&mut self, input: &SpeechInput) {
        if !self.sensors.microphone {
            debug!("dropping speech input, microphone unavailable");
            return;
        }
        if self.sampling() {
            self.speech.ingest(input);
        }
    }

    pub fn ingest_face(&mut self, frame: &FaceFrame) {
        if !self.sensors.camera {
            debug!("dropping face frame, camera unavailable");
            return;
        }
        if self.sampling() {
            self.face.ingest(frame);
        }
    }

    /// Degrade a denied sensor's feature set to absent; never fails the session
    pub fn mark_sensor_unavailable(&mut self, sensor: Sensor) {
        warn!(?sensor, "sensor unavailable, continuing without it");
        match sensor {
            Sensor::Microphone => {
                self.sensors.microphone = false;
                self.speech.reset();
            }
            Sensor::Camera => {
                self.sensors.camera = false;
                self.face.reset();
            }
        }
    }

    /// Apply one recorded event
    pub fn apply(&mut self, event: &SessionEvent) -> Result<Option<AnswerOutcome>, ScreenError> {
        match event {
            SessionEvent::SessionStart { .. } => {
                warn!("session start event applied to a running session");
                return Err(ScreenError::InvalidPhase {
                    phase: self.phase.to_string(),
                    action: "start the session".to_string(),
                });
            }
            SessionEvent::Pointer(sample) => self.ingest_pointer(sample),
            SessionEvent::SpeechSegment(segment) => {
                self.ingest_speech(&SpeechInput::Segment(segment.clone()))
            }
            SessionEvent::SpeechBoundary(boundary) => {
                self.ingest_speech(&SpeechInput::Boundary(*boundary))
            }
            SessionEvent::FaceFrame(frame) => self.ingest_face(frame),
            SessionEvent::Answer(submission) => return self.submit_answer(submission).map(Some),
            SessionEvent::SensorUnavailable { sensor } => self.mark_sensor_unavailable(*sensor),
        }
        Ok(None)
    }

    /// Score an answer for the presented question.
    ///
    /// Rejected submissions (wrong phase, wrong question) leave the session
    /// untouched.
    pub fn submit_answer(&mut self, submission: &AnswerSubmission) -> Result<AnswerOutcome, ScreenError> {
        let phase = self.phase;
        let hesitations_now = self.pointer.hesitation_count();
        let Some(presented) = self.current.as_mut().filter(|_| phase.accepts_answers()) else {
            warn!(
                question_id = %submission.question_id,
                phase = %phase,
                "rejecting answer outside of question delivery"
            );
            return Err(ScreenError::InvalidPhase {
                phase: phase.to_string(),
                action: "submit an answer".to_string(),
            });
        };
        if presented.question.id != submission.question_id {
            warn!(
                expected = %presented.question.id,
                received = %submission.question_id,
                "rejecting answer for a question that is not presented"
            );
            return Err(ScreenError::UnexpectedQuestion {
                expected: presented.question.id.clone(),
                received: submission.question_id.clone(),
            });
        }

        presented.attempts += 1;
        let question = &presented.question;
        let correct = question.is_correct(&submission.selected_answer);
        let attempt_count = presented.attempts;
        let terminal = correct || attempt_count >= question.max_attempts;
        let hesitated = hesitations_now > presented.hesitations_at_start;

        let response = Response {
            question_id: question.id.clone(),
            domain: question.domain,
            phase: question.phase,
            kind: question.kind.clone(),
            selected_answer: submission.selected_answer.clone(),
            correct,
            response_latency_ms: (submission.timestamp_ms - presented.presented_at_ms).max(0),
            attempt_count,
            hesitated,
            terminal,
            timestamp_ms: submission.timestamp_ms,
        };
        debug!(
            question_id = %response.question_id,
            correct,
            attempt_count,
            terminal,
            "answer recorded"
        );
        self.responses.push(response);

        if terminal {
            self.advance(submission.timestamp_ms)?;
        }

        Ok(AnswerOutcome {
            question_id: submission.question_id.clone(),
            correct,
            attempt_count,
            terminal,
            phase: self.phase,
            next_question: if terminal {
                self.current_question().cloned()
            } else {
                None
            },
        })
    }

    /// Close the current question and move the queue along
    fn advance(&mut self, at_ms: i64) -> Result<(), ScreenError> {
        self.current = None;
        if self.phase == SessionPhase::Baseline && self.queue.is_empty() {
            self.phase = SessionPhase::Analyzing;
            self.run_analysis(at_ms);
            if !self.queue.is_empty() {
                self.phase = SessionPhase::Followup;
                info!(follow_up_questions = self.queue.len(), "follow-up phase started");
            }
        }

        self.present_next(at_ms)?;
        if self.current.is_none() {
            self.complete();
        }
        Ok(())
    }

    fn run_analysis(&mut self, at_ms: i64) {
        let stress_ratio = if self.sensors.camera {
            self.face.stress_ratio()
        } else {
            0.0
        };
        let analysis = self.classifier.classify(&self.responses, stress_ratio, at_ms);
        let budget = self
            .config
            .session
            .max_total_questions
            .saturating_sub(self.delivered.len());
        let follow_up = self.planner.generate_follow_up(&analysis, budget, &mut self.rng);
        self.queue.extend(follow_up);
        self.analysis = Some(analysis);
    }

    fn present_next(&mut self, at_ms: i64) -> Result<(), ScreenError> {
        if self.delivered.len() >= self.config.session.max_total_questions {
            debug!("question cap reached, dropping the rest of the queue");
            self.queue.clear();
        }
        let Some(question) = self.queue.pop_front() else {
            return Ok(());
        };
        if !self.delivered.insert(question.id.clone()) {
            error!(question_id = %question.id, "question scheduled twice, halting delivery");
            self.queue.clear();
            self.phase = SessionPhase::Complete;
            self.cancelled = true;
            return Err(ScreenError::DuplicateQuestion(question.id));
        }
        debug!(question_id = %question.id, phase = ?question.phase, "question presented");
        self.current = Some(Presented {
            question,
            presented_at_ms: at_ms,
            attempts: 0,
            hesitations_at_start: self.pointer.hesitation_count(),
        });
        Ok(())
    }

    fn complete(&mut self) {
        self.phase = SessionPhase::Complete;
        let behavioral = self.behavioral_summary();
        let report = self
            .context_builder
            .build(&self.responses, self.analysis.as_ref(), behavioral);
        self.report = Some(report);
        info!(questions = self.delivered.len(), "screening session complete");
    }

    /// Behavioral features so far; denied sensors are absent
    pub fn behavioral_summary(&self) -> BehavioralSummary {
        let pointer = self.pointer.summary();
        let speech = self.sensors.microphone.then(|| self.speech.summary());
        let face = self.sensors.camera.then(|| self.face.summary());
        let stress_ratio = face.as_ref().map(|f| f.stress_ratio).unwrap_or(0.0);
        let age_reference = self
            .config
            .age_group
            .map(|group| AgeReference::compare(group, &pointer, face.as_ref()));
        BehavioralSummary {
            pointer,
            speech,
            face,
            stress_ratio,
            sensors: self.sensors,
            age_reference,
        }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let pointer = self.pointer.summary();
        let speech = self.sensors.microphone.then(|| {
            let s = self.speech.summary();
            SpeechStats {
                total_words: s.total_words,
                filler_word_count: s.filler_word_count,
                stammer_count: s.stammer_count,
                self_corrections: s.self_corrections,
                speech_rate_wpm: s.speech_rate_wpm,
            }
        });
        let face = self.sensors.camera.then(|| {
            let f = self.face.summary();
            FaceStats {
                face_presence_pct: f.face_presence_pct,
                blink_count: f.blink_count,
                gaze_on_screen_pct: f.gaze_on_screen_pct,
                dominant_emotion: f.dominant_emotion,
                stress_ratio: f.stress_ratio,
            }
        });
        LiveSnapshot {
            phase: self.phase,
            questions_delivered: self.delivered.len(),
            questions_remaining: self.queue.len(),
            current_question_id: self.current.as_ref().map(|p| p.question.id.clone()),
            movement_count: pointer.movement_count,
            hesitation_count: pointer.hesitation_count,
            stress_indicator_count: pointer.stress_indicator_count,
            speech,
            face,
        }
    }

    /// Final report, available once the session completed normally
    pub fn report(&self) -> Result<&ScreeningReport, ScreenError> {
        if self.cancelled {
            return Err(ScreenError::SessionCancelled);
        }
        self.report.as_ref().ok_or(ScreenError::ReportUnavailable)
    }

    /// Stop the session at any phase. Idempotent.
    ///
    /// A session torn down before completion is cancelled and yields no
    /// report; a completed session keeps its report.
    pub fn teardown(&mut self) {
        if self.report.is_none() && !self.cancelled {
            info!(phase = %self.phase, "screening session cancelled");
            self.cancelled = true;
        }
        self.pointer.reset();
        self.speech.reset();
        self.face.reset();
        self.queue.clear();
        self.current = None;
        self.phase = SessionPhase::Complete;
    }
}
