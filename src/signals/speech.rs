//! Speech feature extraction
//!
//! Consumes incremental transcript segments and speech boundary events and
//! derives pause, filler, stammer and self-correction features plus running
//! rate and silence aggregates.
//!
//! Only final segments are analysed lexically; interim segments still count
//! as voice activity for pause detection.

use crate::config::SpeechThresholds;
use crate::signals::types::{
    BoundaryKind, CorrectionKind, DetectedToken, SelfCorrection, SpeechBoundary, SpeechInput,
    SpeechPause, SpeechSegment, SpeechSummary,
};
use crate::signals::SignalExtractor;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// "<word> no <word>" replacement form
static REPLACEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z']+)\s+no\s+([a-z']+)\b").expect("replacement pattern is valid")
});

/// Consecutive identical letters that count as a prolongation ("sssun")
const PROLONGATION_RUN: usize = 3;

/// Speech feature extractor
#[derive(Debug, Clone)]
pub struct SpeechExtractor {
    snippet_words: usize,
    pause_ms: i64,
    filler_pattern: Option<Regex>,
    marker_pattern: Option<Regex>,
    stammer_patterns: Vec<Regex>,

    first_event_ms: Option<i64>,
    last_event_ms: Option<i64>,
    last_voice_ms: Option<i64>,
    recent_words: VecDeque<String>,
    total_words: u32,
    pauses: Vec<SpeechPause>,
    fillers: Vec<DetectedToken>,
    stammers: Vec<DetectedToken>,
    corrections: Vec<SelfCorrection>,

    speaking_since_ms: Option<i64>,
    last_end_ms: Option<i64>,
    spoken_ms: i64,
    silent_ms: i64,
}

impl Default for SpeechExtractor {
    fn default() -> Self {
        Self::new(&SpeechThresholds::default())
    }
}

impl SpeechExtractor {
    pub fn new(thresholds: &SpeechThresholds) -> Self {
        let stammer_patterns = thresholds
            .stammer_patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid stammer pattern");
                    None
                }
            })
            .collect();

        Self {
            snippet_words: thresholds.snippet_words,
            pause_ms: thresholds.pause_ms,
            filler_pattern: phrase_pattern(&thresholds.filler_lexicon),
            marker_pattern: phrase_pattern(&thresholds.correction_markers),
            stammer_patterns,
            first_event_ms: None,
            last_event_ms: None,
            last_voice_ms: None,
            recent_words: VecDeque::new(),
            total_words: 0,
            pauses: Vec::new(),
            fillers: Vec::new(),
            stammers: Vec::new(),
            corrections: Vec::new(),
            speaking_since_ms: None,
            last_end_ms: None,
            spoken_ms: 0,
            silent_ms: 0,
        }
    }

    /// Accept an event timestamp; false when it goes backwards
    fn advance_clock(&mut self, timestamp_ms: i64) -> bool {
        if let Some(last) = self.last_event_ms {
            if timestamp_ms < last {
                debug!(timestamp_ms, previous_ms = last, "skipping out-of-order speech event");
                return false;
            }
        }
        self.first_event_ms.get_or_insert(timestamp_ms);
        self.last_event_ms = Some(timestamp_ms);
        true
    }

    fn ingest_segment(&mut self, segment: &SpeechSegment) {
        if !(0.0..=1.0).contains(&segment.confidence) {
            debug!(confidence = segment.confidence, "skipping speech segment with invalid confidence");
            return;
        }
        let text = segment.transcript.trim();
        if text.is_empty() || !self.advance_clock(segment.timestamp_ms) {
            return;
        }

        let ts = segment.timestamp_ms;
        if let Some(last_voice) = self.last_voice_ms {
            let gap = ts - last_voice;
            if gap > self.pause_ms {
                self.pauses.push(SpeechPause {
                    timestamp_ms: ts,
                    duration_ms: gap,
                    preceding_snippet: self.recent_words.iter().cloned().collect::<Vec<_>>().join(" "),
                });
            }
        }
        self.last_voice_ms = Some(ts);

        if segment.is_final {
            self.analyse_final(text, ts);
        }
    }

    fn analyse_final(&mut self, text: &str, ts: i64) {
        let words = words_of(text);
        self.total_words += words.len() as u32;

        if let Some(pattern) = &self.filler_pattern {
            for m in pattern.find_iter(text) {
                self.fillers.push(DetectedToken {
                    text: m.as_str().to_lowercase(),
                    timestamp_ms: ts,
                });
            }
        }

        for fragment in detect_stammers(&words, &self.stammer_patterns, text) {
            self.stammers.push(DetectedToken {
                text: fragment,
                timestamp_ms: ts,
            });
        }

        for kind in detect_corrections(text, self.marker_pattern.as_ref()) {
            self.corrections.push(SelfCorrection { kind, timestamp_ms: ts });
        }

        for word in words {
            self.recent_words.push_back(word);
            while self.recent_words.len() > self.snippet_words {
                self.recent_words.pop_front();
            }
        }
    }

    fn ingest_boundary(&mut self, boundary: &SpeechBoundary) {
        if !self.advance_clock(boundary.timestamp_ms) {
            return;
        }
        let ts = boundary.timestamp_ms;
        match boundary.kind {
            BoundaryKind::Start => {
                if self.speaking_since_ms.is_some() {
                    debug!(timestamp_ms = ts, "ignoring repeated speech start");
                    return;
                }
                if let Some(end) = self.last_end_ms {
                    self.silent_ms += ts - end;
                }
                self.speaking_since_ms = Some(ts);
            }
            BoundaryKind::End => {
                let Some(start) = self.speaking_since_ms.take() else {
                    debug!(timestamp_ms = ts, "ignoring speech end without start");
                    return;
                };
                self.spoken_ms += ts - start;
                self.last_end_ms = Some(ts);
            }
        }
    }
}

impl SignalExtractor for SpeechExtractor {
    type Sample = SpeechInput;
    type Summary = SpeechSummary;

    fn ingest(&mut self, sample: &SpeechInput) {
        match sample {
            SpeechInput::Segment(segment) => self.ingest_segment(segment),
            SpeechInput::Boundary(boundary) => self.ingest_boundary(boundary),
        }
    }

    fn summary(&self) -> SpeechSummary {
        let elapsed_min = match (self.first_event_ms, self.last_event_ms) {
            (Some(first), Some(last)) => (last - first) as f64 / 60_000.0,
            _ => 0.0,
        };
        let speech_rate_wpm = if elapsed_min > 0.0 {
            self.total_words as f64 / elapsed_min
        } else {
            0.0
        };

        let avg_pause_duration_ms = if self.pauses.is_empty() {
            0.0
        } else {
            self.pauses.iter().map(|p| p.duration_ms).sum::<i64>() as f64 / self.pauses.len() as f64
        };

        let measured_ms = self.spoken_ms + self.silent_ms;
        let silence_ratio = if measured_ms > 0 {
            self.silent_ms as f64 / measured_ms as f64
        } else {
            0.0
        };

        SpeechSummary {
            total_words: self.total_words,
            filler_word_count: self.fillers.len() as u32,
            stammer_count: self.stammers.len() as u32,
            self_corrections: self.corrections.len() as u32,
            speech_rate_wpm,
            avg_pause_duration_ms,
            silence_ratio,
            pauses: self.pauses.clone(),
            fillers: self.fillers.clone(),
            stammers: self.stammers.clone(),
            corrections: self.corrections.clone(),
        }
    }

    fn reset(&mut self) {
        self.first_event_ms = None;
        self.last_event_ms = None;
        self.last_voice_ms = None;
        self.recent_words.clear();
        self.total_words = 0;
        self.pauses.clear();
        self.fillers.clear();
        self.stammers.clear();
        self.corrections.clear();
        self.speaking_since_ms = None;
        self.last_end_ms = None;
        self.spoken_ms = 0;
        self.silent_ms = 0;
    }
}

/// Case-insensitive whole-word alternation over a phrase list
fn phrase_pattern(phrases: &[String]) -> Option<Regex> {
    let mut alternatives: Vec<String> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    // Longest first so "i mean" wins over a shorter overlapping entry
    alternatives.sort_by_key(|a| std::cmp::Reverse(a.len()));
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
}

/// Lowercased whitespace tokens with edge punctuation stripped; hyphens kept
fn words_of(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Word repetitions, letter prolongations and configured pattern matches
fn detect_stammers(words: &[String], patterns: &[Regex], text: &str) -> Vec<String> {
    let mut found = Vec::new();

    let mut i = 0;
    while i + 1 < words.len() {
        if words[i] == words[i + 1] {
            let mut j = i + 1;
            while j + 1 < words.len() && words[j + 1] == words[i] {
                j += 1;
            }
            found.push(words[i..=j].join(" "));
            i = j + 1;
        } else {
            i += 1;
        }
    }

    for word in words {
        if has_prolongation(word) {
            found.push(word.clone());
        }
    }

    for pattern in patterns {
        for m in pattern.find_iter(text) {
            found.push(m.as_str().to_lowercase());
        }
    }

    found
}

fn has_prolongation(word: &str) -> bool {
    let chars: Vec<char> = word.chars().collect();
    chars
        .windows(PROLONGATION_RUN)
        .any(|w| w[0].is_alphabetic() && w.iter().all(|c| *c == w[0]))
}

/// Replacement forms first; markers inside a replacement are not recounted
fn detect_corrections(text: &str, markers: Option<&Regex>) -> Vec<CorrectionKind> {
    let mut found = Vec::new();
    let mut replacement_spans = Vec::new();

    for caps in REPLACEMENT_PATTERN.captures_iter(text) {
        let (Some(whole), Some(from), Some(to)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        replacement_spans.push(whole.range());
        found.push(CorrectionKind::Replacement {
            from: from.as_str().to_lowercase(),
            to: to.as_str().to_lowercase(),
        });
    }

    if let Some(markers) = markers {
        for m in markers.find_iter(text) {
            let inside = replacement_spans
                .iter()
                .any(|span| span.start <= m.start() && m.end() <= span.end);
            if !inside {
                found.push(CorrectionKind::Marker {
                    marker: m.as_str().to_lowercase(),
                });
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::types::BoundaryKind;
    use pretty_assertions::assert_eq;

    fn final_segment(text: &str, timestamp_ms: i64) -> SpeechInput {
        SpeechInput::Segment(SpeechSegment {
            transcript: text.to_string(),
            confidence: 0.9,
            is_final: true,
            timestamp_ms,
        })
    }

    fn interim_segment(text: &str, timestamp_ms: i64) -> SpeechInput {
        SpeechInput::Segment(SpeechSegment {
            transcript: text.to_string(),
            confidence: 0.6,
            is_final: false,
            timestamp_ms,
        })
    }

    fn boundary(kind: BoundaryKind, timestamp_ms: i64) -> SpeechInput {
        SpeechInput::Boundary(SpeechBoundary { kind, timestamp_ms })
    }

    #[test]
    fn test_filler_and_word_repetition() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("um the the ball", 1000));

        let summary = extractor.summary();
        assert!(summary.filler_word_count >= 1);
        assert!(summary.stammer_count >= 1);
        assert_eq!(summary.fillers[0].text, "um");
        assert_eq!(summary.stammers[0].text, "the the");
        assert_eq!(summary.total_words, 4);
    }

    #[test]
    fn test_fillers_are_whole_words() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("Umbrella wellness likes", 0));
        assert_eq!(extractor.summary().filler_word_count, 0);

        extractor.ingest(&final_segment("UM, I like, uh, cats", 100));
        assert_eq!(extractor.summary().filler_word_count, 3);
    }

    #[test]
    fn test_hyphenated_and_prolonged_stammers() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("b-b-ball and sssun", 0));

        let stammers: Vec<String> = extractor.summary().stammers.into_iter().map(|s| s.text).collect();
        assert!(stammers.contains(&"sssun".to_string()));
        assert!(stammers.contains(&"b-b-ball".to_string()));
        assert_eq!(stammers.len(), 2);
    }

    #[test]
    fn test_repetition_run_counts_once() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("I I I want it", 0));
        let summary = extractor.summary();
        assert_eq!(summary.stammer_count, 1);
        assert_eq!(summary.stammers[0].text, "i i i");
    }

    #[test]
    fn test_self_corrections() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("the cat no hat", 0));
        extractor.ingest(&final_segment("it is red I mean blue sorry", 100));

        let summary = extractor.summary();
        assert_eq!(summary.self_corrections, 3);
        assert_eq!(
            summary.corrections[0].kind,
            CorrectionKind::Replacement {
                from: "cat".to_string(),
                to: "hat".to_string()
            }
        );
        assert_eq!(
            summary.corrections[1].kind,
            CorrectionKind::Marker {
                marker: "i mean".to_string()
            }
        );
    }

    #[test]
    fn test_standalone_no_is_marker() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("no", 0));
        assert_eq!(
            extractor.summary().corrections[0].kind,
            CorrectionKind::Marker {
                marker: "no".to_string()
            }
        );
    }

    #[test]
    fn test_pause_detection_with_snippet() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("the big red", 1000));
        extractor.ingest(&interim_segment("ball", 1300));
        extractor.ingest(&final_segment("ball", 2100));

        let summary = extractor.summary();
        assert_eq!(summary.pauses.len(), 1);
        assert_eq!(summary.pauses[0].duration_ms, 800);
        assert_eq!(summary.pauses[0].preceding_snippet, "the big red");
        assert_eq!(summary.avg_pause_duration_ms, 800.0);
    }

    #[test]
    fn test_speech_rate() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&final_segment("one two three", 0));
        extractor.ingest(&final_segment("four five six", 30_000));
        // 6 words over half a minute
        assert!((extractor.summary().speech_rate_wpm - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_silence_ratio_between_boundaries() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&boundary(BoundaryKind::Start, 0));
        extractor.ingest(&boundary(BoundaryKind::End, 3000));
        extractor.ingest(&boundary(BoundaryKind::Start, 4000));
        extractor.ingest(&boundary(BoundaryKind::End, 6000));
        // 5000ms spoken, 1000ms silent
        assert!((extractor.summary().silence_ratio - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbalanced_boundaries_are_ignored() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&boundary(BoundaryKind::End, 0));
        extractor.ingest(&boundary(BoundaryKind::Start, 100));
        extractor.ingest(&boundary(BoundaryKind::Start, 200));
        extractor.ingest(&boundary(BoundaryKind::End, 1100));
        assert_eq!(extractor.summary().silence_ratio, 0.0);
    }

    #[test]
    fn test_malformed_segments_are_skipped() {
        let mut extractor = SpeechExtractor::default();
        extractor.ingest(&SpeechInput::Segment(SpeechSegment {
            transcript: "um um".to_string(),
            confidence: 1.5,
            is_final: true,
            timestamp_ms: 0,
        }));
        extractor.ingest(&final_segment("   ", 10));
        assert_eq!(extractor.summary(), SpeechSummary::default());
    }

    #[test]
    fn test_reset_and_replay_is_identical() {
        let stream = vec![
            boundary(BoundaryKind::Start, 0),
            interim_segment("um", 200),
            final_segment("um the the dog no cat", 900),
            boundary(BoundaryKind::End, 1200),
            boundary(BoundaryKind::Start, 2600),
            final_segment("well I mean b-b-bird", 3500),
            boundary(BoundaryKind::End, 3900),
        ];

        let mut extractor = SpeechExtractor::default();
        stream.iter().for_each(|s| extractor.ingest(s));
        let first = extractor.summary();

        extractor.reset();
        stream.iter().for_each(|s| extractor.ingest(s));
        assert_eq!(extractor.summary(), first);
        assert!(first.pauses.len() >= 1);
    }
}
