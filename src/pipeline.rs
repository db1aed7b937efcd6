//! Replay orchestration
//!
//! Stateless entry points that run a recorded event stream through a fresh
//! session and return the encoded report. Streams are accepted either as a
//! JSON array of events or as newline-delimited JSON.

use crate::config::ScreenConfig;
use crate::context::ScreeningReport;
use crate::encoder::ReportEncoder;
use crate::error::ScreenError;
use crate::session::{ScreeningSession, SessionEvent};
use tracing::{debug, info};

/// Seed used when a recording carries no `session_start` event
pub const DEFAULT_REPLAY_SEED: u64 = 0;

/// Parse an event stream (JSON array or NDJSON)
pub fn parse_events(input: &str) -> Result<Vec<SessionEvent>, ScreenError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ScreenError::ParseError(format!("Invalid event array: {}", e)));
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| ScreenError::ParseError(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Build a session from a recording and apply every remaining event.
///
/// A leading `session_start` event fixes the start time and shuffle seed;
/// otherwise the first timestamped event starts the session with the
/// default seed.
pub fn replay_session(
    events: &[SessionEvent],
    config: ScreenConfig,
) -> Result<ScreeningSession, ScreenError> {
    let (started_at_ms, seed, rest) = match events.split_first() {
        Some((SessionEvent::SessionStart { timestamp_ms, seed }, rest)) => {
            (*timestamp_ms, seed.unwrap_or(DEFAULT_REPLAY_SEED), rest)
        }
        _ => (
            events.iter().find_map(SessionEvent::timestamp_ms).unwrap_or(0),
            DEFAULT_REPLAY_SEED,
            events,
        ),
    };

    let mut session = ScreeningSession::with_seed(config, seed, started_at_ms)?;
    for event in rest {
        session.apply(event)?;
    }
    debug!(events = events.len(), phase = %session.phase(), "replay finished");
    Ok(session)
}

/// Replay a recording and return the final report
pub fn replay_to_report(
    events: &[SessionEvent],
    config: ScreenConfig,
) -> Result<ScreeningReport, ScreenError> {
    let session = replay_session(events, config)?;
    let report = session.report()?.clone();
    info!(total_questions = report.total_questions, "replayed session to report");
    Ok(report)
}

/// Replay a JSON/NDJSON recording into an encoded report payload.
///
/// # Arguments
/// * `events_json` - Recorded session events
/// * `config_json` - Optional configuration overrides; defaults when `None`
///
/// # Example
/// ```ignore
/// let payload = replay_to_report_json(&recording, None)?;
/// ```
pub fn replay_to_report_json(
    events_json: &str,
    config_json: Option<&str>,
) -> Result<String, ScreenError> {
    let config = match config_json {
        Some(json) => ScreenConfig::from_json(json)?,
        None => ScreenConfig::default(),
    };
    let events = parse_events(events_json)?;
    let report = replay_to_report(&events, config)?;
    ReportEncoder::new().encode_to_json(&report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::signals::types::PointerSample;
    use crate::types::{AnswerSubmission, QuestionKind, SessionType};
    use pretty_assertions::assert_eq;

    /// Record a full session that answers everything correctly, applying
    /// every event to the live session as it is recorded
    pub(crate) fn record_session(seed: u64) -> (Vec<SessionEvent>, ScreeningSession) {
        let mut session = ScreeningSession::with_seed(ScreenConfig::default(), seed, 1_000).unwrap();
        let mut events = vec![SessionEvent::SessionStart {
            timestamp_ms: 1_000,
            seed: Some(seed),
        }];
        let mut t = 1_000;
        let mut x = 10.0;
        while let Some(question) = session.current_question().cloned() {
            t += 1_500;
            // Keep the pointer moving so no hesitation is recorded
            x += 50.0;
            let pointer = SessionEvent::Pointer(PointerSample {
                x,
                y: 20.0,
                timestamp_ms: t - 500,
            });
            session.apply(&pointer).unwrap();
            events.push(pointer);

            let selected_answer = match &question.kind {
                QuestionKind::Verbal { word } => word.clone(),
                _ => question.correct.clone().unwrap_or_default(),
            };
            let answer = SessionEvent::Answer(AnswerSubmission {
                question_id: question.id.clone(),
                selected_answer,
                timestamp_ms: t,
            });
            session.apply(&answer).unwrap();
            events.push(answer);
        }
        (events, session)
    }

    pub(crate) fn recorded_events(seed: u64) -> Vec<SessionEvent> {
        record_session(seed).0
    }

    fn to_ndjson(events: &[SessionEvent]) -> String {
        events
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parse_array_and_ndjson() {
        let events = recorded_events(3);
        let array = serde_json::to_string(&events).unwrap();
        assert_eq!(parse_events(&array).unwrap(), events);
        assert_eq!(parse_events(&to_ndjson(&events)).unwrap(), events);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let input = "{\"type\":\"sensor_unavailable\",\"sensor\":\"camera\"}\n\n{not json}";
        let err = parse_events(input).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_replay_to_report() {
        let report = replay_to_report(&recorded_events(21), ScreenConfig::default()).unwrap();
        assert_eq!(report.total_questions, 6);
        assert_eq!(report.session_type, SessionType::BaselineOnly);
        assert_eq!(report.domain_results.len(), 5);
    }

    #[test]
    fn test_replay_reproduces_live_report() {
        for seed in [2, 21, 40] {
            let (events, live) = record_session(seed);
            assert_eq!(live.snapshot().hesitation_count, 0);
            let replayed = replay_session(&events, ScreenConfig::default()).unwrap();
            assert_eq!(replayed.report().unwrap(), live.report().unwrap());
        }
    }

    #[test]
    fn test_replay_with_wrong_seed_fails() {
        let mut events = recorded_events(21);
        // Find a seed whose first question differs from the recording
        let recorded_first = ScreeningSession::with_seed(ScreenConfig::default(), 21, 0)
            .unwrap()
            .current_question()
            .unwrap()
            .id
            .clone();
        let other = (0..100)
            .find(|s| {
                ScreeningSession::with_seed(ScreenConfig::default(), *s, 0)
                    .unwrap()
                    .current_question()
                    .unwrap()
                    .id
                    != recorded_first
            })
            .unwrap();
        events[0] = SessionEvent::SessionStart {
            timestamp_ms: 1_000,
            seed: Some(other),
        };
        assert!(matches!(
            replay_to_report(&events, ScreenConfig::default()),
            Err(ScreenError::UnexpectedQuestion { .. })
        ));
    }

    #[test]
    fn test_incomplete_recording_has_no_report() {
        let mut events = recorded_events(5);
        events.truncate(4);
        assert!(matches!(
            replay_to_report(&events, ScreenConfig::default()),
            Err(ScreenError::ReportUnavailable)
        ));
    }

    #[test]
    fn test_replay_to_report_json() {
        let ndjson = to_ndjson(&recorded_events(8));
        let payload = replay_to_report_json(&ndjson, Some(r#"{"age_group":"9-11"}"#)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["schema_version"], "screen.report.v1");
        assert_eq!(value["report"]["total_questions"], 6);
        assert_eq!(
            value["report"]["behavioral_summary"]["age_reference"]["age_group"],
            "9-11"
        );
    }
}
