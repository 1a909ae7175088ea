use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use haven_core::assessment::RiskAssessment;
use haven_core::severity::Severity;

use super::lexicon;

/// Tunable scoring weights and level thresholds. Nothing in the scorer is
/// hard-coded at the use site; the defaults here are the shipped tuning.
#[derive(Clone, Debug)]
pub struct ScoringConfig {
    pub ideation_weight: u32,
    pub plan_weight: u32,
    pub medical_weight: u32,
    pub high_weight: u32,
    pub moderate_weight: u32,
    pub low_weight: u32,
    pub critical_threshold: u32,
    pub high_threshold: u32,
    pub moderate_threshold: u32,
    /// Low-tier matches alone promote to `Low` at this count even when the
    /// weighted score stays under the low threshold.
    pub low_tier_promote_count: usize,
    /// Bonus applied when structured answers report both a self-harm plan
    /// and the means to carry it out.
    pub plan_means_bonus: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ideation_weight: 18,
            plan_weight: 12,
            medical_weight: 30,
            high_weight: 8,
            moderate_weight: 4,
            low_weight: 1,
            critical_threshold: 30,
            high_threshold: 20,
            moderate_threshold: 10,
            low_tier_promote_count: 3,
            plan_means_bonus: 10,
        }
    }
}

/// Pure risk scorer. Holds only configuration, so scoring the same input
/// twice always produces the same level, confidence, and indicator set.
#[derive(Clone, Debug, Default)]
pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score free text. Empty or whitespace-only input is `Safe`, never an
    /// error.
    pub fn score_text(&self, text: &str) -> RiskAssessment {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return RiskAssessment::safe(0);
        }

        let tokens = trimmed.split_whitespace().count();
        let mut indicators = BTreeSet::new();
        let mut score: u32 = 0;

        let ideation_hits = lexicon::IDEATION.matches(trimmed);
        let ideation_present = !ideation_hits.is_empty();

        for phrase in ideation_hits {
            score += self.config.ideation_weight;
            indicators.insert(phrase.to_string());
        }
        // Plan/means language only counts alongside ideation; a method word
        // on its own is not a signal.
        if ideation_present {
            for phrase in lexicon::PLAN_MEANS.matches(trimmed) {
                score += self.config.plan_weight;
                indicators.insert(phrase.to_string());
            }
        }
        for phrase in lexicon::MEDICAL_EMERGENCY.matches(trimmed) {
            score += self.config.medical_weight;
            indicators.insert(phrase.to_string());
        }
        for phrase in lexicon::HIGH.matches(trimmed) {
            score += self.config.high_weight;
            indicators.insert(phrase.to_string());
        }
        for phrase in lexicon::MODERATE.matches(trimmed) {
            score += self.config.moderate_weight;
            indicators.insert(phrase.to_string());
        }
        let low_hits = lexicon::LOW.matches(trimmed);
        let low_matches = low_hits.len();
        for phrase in low_hits {
            score += self.config.low_weight;
            indicators.insert(phrase.to_string());
        }

        let level = self.level_for(score, low_matches);
        let confidence = self.confidence(score, tokens);
        debug!(%level, score, confidence, indicators = indicators.len(), "text scored");

        RiskAssessment::new(level, confidence, indicators, trimmed.chars().count())
    }

    /// Score structured screening answers keyed by question id. Unknown
    /// questions and out-of-range answers are ignored, so a malformed map
    /// degrades toward `Safe` rather than failing.
    pub fn score_answers(&self, answers: &BTreeMap<String, i64>) -> RiskAssessment {
        if answers.is_empty() {
            return RiskAssessment::safe(0);
        }

        let mut indicators = BTreeSet::new();
        let mut score: u32 = 0;

        for (question, answer) in answers {
            if let Some((weight, indicator)) = answer_weight(question, *answer) {
                score += weight;
                indicators.insert(indicator.to_string());
            }
        }

        // Plan AND means together is far more dangerous than either alone.
        if answers.get("self-harm-plan") == Some(&1) && answers.get("self-harm-means") == Some(&1) {
            score += self.config.plan_means_bonus;
            indicators.insert("plan-with-means".to_string());
        }

        let level = self.level_for(score, 0);
        let confidence = self.confidence(score, answers.len());
        debug!(%level, score, confidence, "answers scored");

        RiskAssessment::new(level, confidence, indicators, answers.len())
    }

    fn level_for(&self, score: u32, low_matches: usize) -> Severity {
        if score >= self.config.critical_threshold {
            Severity::Critical
        } else if score >= self.config.high_threshold {
            Severity::High
        } else if score >= self.config.moderate_threshold {
            Severity::Moderate
        } else if score >= 1 || low_matches >= self.config.low_tier_promote_count {
            Severity::Low
        } else {
            Severity::Safe
        }
    }

    /// Base confidence grows with the score; very short inputs are marked
    /// down 30% and long inputs up 10%, clamped to [0, 1].
    fn confidence(&self, score: u32, tokens: usize) -> f64 {
        if score == 0 {
            return 0.0;
        }
        let mut confidence = 0.35 + f64::from(score) / 50.0;
        if tokens < 3 {
            confidence *= 0.7;
        } else if tokens > 50 {
            confidence *= 1.1;
        }
        confidence.clamp(0.0, 1.0)
    }
}

/// Answer-specific weights. Answer `1` is always the most severe option on
/// the screening scale.
fn answer_weight(question: &str, answer: i64) -> Option<(u32, &'static str)> {
    match (question, answer) {
        ("safety", 1) => Some((15, "feels-unsafe")),
        ("safety", 2) => Some((8, "safety-concern")),
        ("self-harm-plan", 1) => Some((10, "self-harm-plan")),
        ("self-harm-means", 1) => Some((8, "self-harm-means")),
        ("prior-attempt", 1) => Some((12, "prior-attempt")),
        ("support", 1) => Some((5, "no-support")),
        ("substance-use", 1) => Some((6, "substance-use")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RiskScorer {
        RiskScorer::default()
    }

    #[test]
    fn empty_input_is_safe() {
        for input in ["", "   ", "\n\t"] {
            let a = scorer().score_text(input);
            assert_eq!(a.level, Severity::Safe);
            assert_eq!(a.confidence, 0.0);
            assert!(a.indicators.is_empty());
        }
    }

    #[test]
    fn neutral_text_is_safe() {
        let a = scorer().score_text("the weather is nice today");
        assert_eq!(a.level, Severity::Safe);
        assert!(a.indicators.is_empty());
    }

    #[test]
    fn ideation_with_means_is_critical() {
        let a = scorer().score_text("I want to kill myself and I have pills");
        assert_eq!(a.level, Severity::Critical);
        assert!(a.has_indicator("kill myself"));
        assert!(a.has_indicator("pills"));
    }

    #[test]
    fn means_without_ideation_does_not_count() {
        let a = scorer().score_text("I picked up my pills from the pharmacy");
        assert_eq!(a.level, Severity::Safe);
        assert!(!a.has_indicator("pills"));
    }

    #[test]
    fn embedded_words_do_not_score() {
        let a = scorer().score_text("her sadness in that upsetting scene moved everyone");
        assert_eq!(a.level, Severity::Safe);
        assert!(a.indicators.is_empty());
    }

    #[test]
    fn matching_ignores_letter_case() {
        let a = scorer().score_text("I WANT TO KILL MYSELF");
        assert!(a.level >= Severity::High);
        assert!(a.has_indicator("kill myself"));
    }

    #[test]
    fn sad_and_lonely_is_low() {
        let a = scorer().score_text("I feel really sad and lonely today");
        assert_eq!(a.level, Severity::Low);
        assert!(a.has_indicator("sad"));
        assert!(a.has_indicator("lonely"));
    }

    #[test]
    fn overdose_language_is_critical_and_medical() {
        let a = scorer().score_text("I think I took too many of my sleeping pills");
        assert_eq!(a.level, Severity::Critical);
        assert!(a.indicators.iter().any(|i| lexicon::is_medical_signal(i)));
    }

    #[test]
    fn self_harm_language_scores_high_tier() {
        let a = scorer().score_text("I've been cutting again and I feel hopeless and worthless");
        assert!(a.level >= Severity::High);
        assert!(a.has_indicator("cutting"));
    }

    #[test]
    fn short_input_reduces_confidence() {
        let long = scorer().score_text("I have been feeling hopeless for a while now");
        let short = scorer().score_text("hopeless");
        assert_eq!(long.level, short.level);
        assert!(short.confidence < long.confidence);
    }

    #[test]
    fn scoring_is_deterministic() {
        let input = "I want to die and I have a plan for tonight";
        let a = scorer().score_text(input);
        for _ in 0..10 {
            let b = scorer().score_text(input);
            assert_eq!(a.level, b.level);
            assert_eq!(a.confidence, b.confidence);
            assert_eq!(a.indicators, b.indicators);
        }
    }

    #[test]
    fn empty_answers_are_safe() {
        let a = scorer().score_answers(&BTreeMap::new());
        assert_eq!(a.level, Severity::Safe);
    }

    #[test]
    fn unknown_questions_are_ignored() {
        let answers = BTreeMap::from([("favorite-color".to_string(), 1)]);
        let a = scorer().score_answers(&answers);
        assert_eq!(a.level, Severity::Safe);
        assert!(a.indicators.is_empty());
    }

    #[test]
    fn plan_and_means_answers_are_critical_with_combo_indicator() {
        let answers = BTreeMap::from([
            ("safety".to_string(), 1),
            ("self-harm-plan".to_string(), 1),
            ("self-harm-means".to_string(), 1),
        ]);
        let a = scorer().score_answers(&answers);
        assert_eq!(a.level, Severity::Critical);
        assert!(a.indicators.len() >= 4);
        assert!(a.has_indicator("plan-with-means"));
        assert!(a.has_indicator("feels-unsafe"));
    }

    #[test]
    fn plan_without_means_is_not_critical() {
        let answers = BTreeMap::from([
            ("self-harm-plan".to_string(), 1),
            ("support".to_string(), 1),
        ]);
        let a = scorer().score_answers(&answers);
        assert!(a.level < Severity::Critical);
        assert!(!a.has_indicator("plan-with-means"));
    }

    #[test]
    fn answer_scoring_is_deterministic() {
        let answers = BTreeMap::from([
            ("safety".to_string(), 2),
            ("prior-attempt".to_string(), 1),
        ]);
        let a = scorer().score_answers(&answers);
        let b = scorer().score_answers(&answers);
        assert_eq!(a.level, b.level);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.indicators, b.indicators);
    }

    #[test]
    fn thresholds_come_from_config() {
        let strict = RiskScorer::new(ScoringConfig {
            critical_threshold: 2,
            high_threshold: 1,
            ..ScoringConfig::default()
        });
        let a = strict.score_text("I feel sad and lonely");
        assert_eq!(a.level, Severity::Critical);
    }
}
