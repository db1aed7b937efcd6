//! Signal feature extraction
//!
//! Pure, deterministic transforms from timestamped sample streams to derived
//! metrics. Each extractor owns its buffers, is fed through `ingest`, and
//! publishes only through `summary`.
//!
//! Extractors: pointer (hesitation/jitter) · speech (pauses, fillers,
//! stammers, self-corrections) · face (blink, gaze, emotion)

pub mod face;
pub mod pointer;
pub mod speech;
pub mod types;

pub use face::FaceExtractor;
pub use pointer::PointerExtractor;
pub use speech::SpeechExtractor;
pub use types::{
    BoundaryKind, Emotion, FaceFrame, FaceSummary, HeadPose, HesitationEvent, Point,
    PointerSample, PointerSummary, SpeechBoundary, SpeechInput, SpeechSegment, SpeechSummary,
    StressIndicator,
};

/// Common interface of the feature extractors.
///
/// Capture adapters call `ingest` from their own event source; an extractor
/// is never fed concurrently. Malformed samples are skipped, never fatal.
pub trait SignalExtractor {
    type Sample;
    type Summary;

    /// Feed one sample
    fn ingest(&mut self, sample: &Self::Sample);

    /// Aggregate view of everything ingested since the last reset
    fn summary(&self) -> Self::Summary;

    /// Drop all buffered state. Idempotent.
    fn reset(&mut self);
}
