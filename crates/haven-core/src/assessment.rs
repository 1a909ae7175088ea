use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::AssessmentId;
use crate::severity::Severity;

/// A single scored risk assessment. Immutable once created; persisted
/// append-only for trend analysis.
///
/// `indicators` is a BTreeSet so the set is deterministically ordered —
/// identical input must serialize identically (the escalation coordinator's
/// de-duplication relies on it).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: AssessmentId,
    pub timestamp: String,
    pub level: Severity,
    pub confidence: f64,
    pub indicators: BTreeSet<String>,
    pub source_text_length: usize,
}

impl RiskAssessment {
    pub fn new(
        level: Severity,
        confidence: f64,
        indicators: BTreeSet<String>,
        source_text_length: usize,
    ) -> Self {
        Self {
            id: AssessmentId::new(),
            timestamp: Utc::now().to_rfc3339(),
            level,
            confidence: confidence.clamp(0.0, 1.0),
            indicators,
            source_text_length,
        }
    }

    /// The fallback result for malformed or empty input. Scoring never fails.
    pub fn safe(source_text_length: usize) -> Self {
        Self::new(Severity::Safe, 0.0, BTreeSet::new(), source_text_length)
    }

    pub fn is_actionable(&self) -> bool {
        self.level >= Severity::High
    }

    pub fn has_indicator(&self, phrase: &str) -> bool {
        self.indicators.contains(phrase)
    }
}
