//! Synheart Screen - On-device adaptive screening engine for young learners
//!
//! Screen turns the raw behavioral streams of a short question session into a
//! per-domain context report: signal extraction → baseline delivery →
//! mid-session risk classification → adaptive follow-up → clinical context.
//!
//! ## Modules
//!
//! - **Signals**: Pointer hesitation/jitter, speech disfluency and face metrics
//! - **Bank**: Question bank and seeded session planner
//! - **Classifier**: Mid-session risk decision over baseline responses
//! - **Context**: Per-domain results, confidence and review flags
//! - **Session**: Phase machine that ties the above together
//!
//! The report is decision support only; every report asks for human review.

pub mod bank;
pub mod classifier;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod signals;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use bank::{QuestionBank, SessionPlanner};
pub use classifier::{MidSessionAnalysis, RiskClassifier};
pub use config::{AgeGroup, ScreenConfig};
pub use context::{ClinicalContextBuilder, ScreeningReport};
pub use encoder::{ReportEncoder, ReportPayload};
pub use error::ScreenError;
pub use pipeline::{parse_events, replay_session, replay_to_report, replay_to_report_json};
pub use session::{LiveSnapshot, ScreeningSession, SessionEvent};

// Signal exports
pub use signals::{FaceExtractor, PointerExtractor, SignalExtractor, SpeechExtractor};

/// Screen version embedded in all report payloads
pub const SCREEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report payloads
pub const PRODUCER_NAME: &str = "synheart-screen";
