//! Risk triage: maps free text or structured screening answers to a
//! [`RiskAssessment`]. Pure and deterministic; identical input always
//! yields an identical result, and malformed input degrades to `Safe`
//! instead of erroring.

pub mod lexicon;
mod scorer;

pub use scorer::{RiskScorer, ScoringConfig};
