//! Report encoding
//!
//! Wraps a screening report in a versioned payload carrying producer
//! metadata, so downstream renderers can tell which engine build produced it.

use crate::context::ScreeningReport;
use crate::error::ScreenError;
use crate::{PRODUCER_NAME, SCREEN_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report payload schema
pub const REPORT_SCHEMA_VERSION: &str = "screen.report.v1";

/// Engine that produced a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    /// Unique per encoder instance
    pub instance_id: String,
}

/// Versioned report payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub schema_version: String,
    pub producer: ReportProducer,
    /// RFC 3339 encoding time
    pub computed_at_utc: String,
    pub report: ScreeningReport,
}

/// Report encoder
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, report: &ScreeningReport) -> ReportPayload {
        ReportPayload {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: SCREEN_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            report: report.clone(),
        }
    }

    /// Encode to pretty JSON
    pub fn encode_to_json(&self, report: &ScreeningReport) -> Result<String, ScreenError> {
        let payload = self.encode(report);
        serde_json::to_string_pretty(&payload).map_err(|e| ScreenError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BehavioralSummary, ClinicalContextBuilder, SensorStatus};
    use crate::signals::PointerSummary;

    fn empty_report() -> ScreeningReport {
        let behavior = BehavioralSummary {
            pointer: PointerSummary::default(),
            speech: None,
            face: None,
            stress_ratio: 0.0,
            sensors: SensorStatus::default(),
            age_reference: None,
        };
        ClinicalContextBuilder::default().build(&[], None, behavior)
    }

    #[test]
    fn test_encode_report_payload() {
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let payload = encoder.encode(&empty_report());

        assert_eq!(payload.schema_version, REPORT_SCHEMA_VERSION);
        assert_eq!(payload.producer.name, "synheart-screen");
        assert_eq!(payload.producer.instance_id, "test-instance");
        assert!(chrono::DateTime::parse_from_rfc3339(&payload.computed_at_utc).is_ok());
    }

    #[test]
    fn test_encode_to_json() {
        let json = ReportEncoder::new().encode_to_json(&empty_report()).unwrap();
        let parsed: ReportPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.report, empty_report());
        assert!(json.contains("\"human_review_suggested\": true"));
        assert!(json.contains("\"session_type\": \"BASELINE_ONLY\""));
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = ReportEncoder::new().encode(&empty_report());
        let b = ReportEncoder::new().encode(&empty_report());
        assert_ne!(a.producer.instance_id, b.producer.instance_id);
    }
}
