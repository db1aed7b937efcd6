//! Drive a screening session end to end and print the report payload
//!
//! The simulated learner misses every reading and math item, which pushes the
//! classifier to CONCERN and triggers an adaptive follow-up.

use synheart_screen::signals::{PointerSample, SpeechInput, SpeechSegment};
use synheart_screen::types::{AnswerSubmission, Domain, QuestionKind};
use synheart_screen::{ReportEncoder, ScreenConfig, ScreenError, ScreeningSession};

fn main() -> Result<(), ScreenError> {
    let mut session = ScreeningSession::with_seed(ScreenConfig::default(), 7, 0)?;
    let mut t = 0;

    while let Some(question) = session.current_question().cloned() {
        // A slow, wandering pointer before each answer
        for step in 0..5 {
            t += 400;
            session.ingest_pointer(&PointerSample {
                x: 100.0 + step as f64 * 3.0,
                y: 200.0,
                timestamp_ms: t,
            });
        }

        let answer = match (&question.kind, question.domain) {
            (QuestionKind::Verbal { word }, _) => {
                let transcript = format!("um {} {}", word, word);
                session.ingest_speech(&SpeechInput::Segment(SpeechSegment {
                    transcript: transcript.clone(),
                    confidence: 0.9,
                    is_final: true,
                    timestamp_ms: t,
                }));
                transcript
            }
            (_, Domain::Reading | Domain::Math) => question
                .options
                .iter()
                .find(|o| Some(*o) != question.correct.as_ref())
                .cloned()
                .unwrap_or_default(),
            _ => question.correct.clone().unwrap_or_default(),
        };

        t += 1_000;
        let outcome = session.submit_answer(&AnswerSubmission {
            question_id: question.id.clone(),
            selected_answer: answer,
            timestamp_ms: t,
        })?;
        println!(
            "{:<22} attempt {} correct {:<5} phase {}",
            outcome.question_id,
            outcome.attempt_count,
            outcome.correct,
            outcome.phase
        );
    }

    if let Some(analysis) = session.analysis() {
        println!("\nMid-session: {:?} ({})", analysis.overall_risk, analysis.rationale);
    }

    let payload = ReportEncoder::new().encode_to_json(session.report()?)?;
    println!("\n{payload}");
    Ok(())
}
