//! Phrase tiers for the risk scorer and the indicator sets the escalation
//! coordinator keys on. Each tier compiles to a case-insensitive
//! [`RegexSet`] with word-boundary anchors, so "sadness" never matches
//! "sad"; no language understanding beyond that.

use std::sync::OnceLock;

use regex::RegexSet;

/// One tier of crisis phrases, lazily compiled into a single `RegexSet`
/// so a scan tests every phrase in one pass.
pub struct PhraseTier {
    phrases: &'static [&'static str],
    set: OnceLock<RegexSet>,
}

impl PhraseTier {
    const fn new(phrases: &'static [&'static str]) -> Self {
        Self {
            phrases,
            set: OnceLock::new(),
        }
    }

    fn set(&self) -> &RegexSet {
        self.set.get_or_init(|| {
            let patterns: Vec<String> = self
                .phrases
                .iter()
                .map(|p| format!(r"(?i)\b{}\b", regex::escape(p)))
                .collect();
            RegexSet::new(&patterns).expect("lexicon phrase patterns compile")
        })
    }

    /// Phrases from this tier present in `text`.
    pub fn matches(&self, text: &str) -> Vec<&'static str> {
        self.set()
            .matches(text)
            .iter()
            .map(|i| self.phrases[i])
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.set().is_match(text)
    }

    /// Exact-phrase membership, for classifying recorded indicators.
    pub fn contains_phrase(&self, indicator: &str) -> bool {
        self.phrases.contains(&indicator)
    }

    pub fn phrases(&self) -> &'static [&'static str] {
        self.phrases
    }
}

/// Suicidal-ideation phrases. Highest tier.
pub static IDEATION: PhraseTier = PhraseTier::new(&[
    "kill myself",
    "end my life",
    "suicide",
    "want to die",
    "better off dead",
    "no reason to live",
]);

/// Plan/means language. Only counts when an ideation phrase co-occurs in
/// the same input, so a method word alone never scores.
pub static PLAN_MEANS: PhraseTier = PhraseTier::new(&[
    "have a plan",
    "pills",
    "gun",
    "rope",
    "jump off",
    "tonight",
]);

/// Medical-emergency language. A distinct set from suicide risk: these
/// route to 911, not 988.
pub static MEDICAL_EMERGENCY: PhraseTier = PhraseTier::new(&[
    "overdose",
    "overdosed",
    "took too many",
    "can't breathe",
    "chest pain",
]);

pub static HIGH: PhraseTier = PhraseTier::new(&[
    "self harm",
    "hurt myself",
    "cutting",
    "hopeless",
    "can't go on",
    "worthless",
]);

pub static MODERATE: PhraseTier = PhraseTier::new(&[
    "depressed",
    "can't sleep",
    "no one cares",
    "empty inside",
    "overwhelmed",
    "panic",
]);

pub static LOW: PhraseTier = PhraseTier::new(&[
    "sad",
    "lonely",
    "anxious",
    "stressed",
    "struggling",
    "upset",
]);

/// Structured-answer indicators that count as plan/immediate-danger
/// signals for escalation, alongside the raw [`PLAN_MEANS`] phrases.
pub const STRUCTURED_DANGER: &[&str] = &["self-harm-plan", "plan-with-means", "feels-unsafe"];

/// Returns true if `indicator` signals a plan or immediate danger.
pub fn is_danger_signal(indicator: &str) -> bool {
    PLAN_MEANS.contains_phrase(indicator) || STRUCTURED_DANGER.contains(&indicator)
}

/// Returns true if `indicator` belongs to the medical-emergency set.
pub fn is_medical_signal(indicator: &str) -> bool {
    MEDICAL_EMERGENCY.contains_phrase(indicator) || indicator == "medical-emergency"
}

/// Returns true if `indicator` suggests active self-harm, used to pick a
/// trauma-informed specialist hand-off at high severity.
pub fn is_trauma_signal(indicator: &str) -> bool {
    matches!(indicator, "self harm" | "hurt myself" | "cutting")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_do_not_overlap() {
        let tiers: [&[&str]; 6] = [
            IDEATION.phrases(),
            PLAN_MEANS.phrases(),
            MEDICAL_EMERGENCY.phrases(),
            HIGH.phrases(),
            MODERATE.phrases(),
            LOW.phrases(),
        ];
        let mut all: Vec<&str> = tiers.iter().flat_map(|t| t.iter().copied()).collect();
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before, "a phrase appears in two tiers");
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(IDEATION.is_match("I want to KILL MYSELF"));
        assert_eq!(LOW.matches("So Sad and So Lonely"), vec!["sad", "lonely"]);
    }

    #[test]
    fn word_boundaries_reject_embedded_phrases() {
        assert!(!LOW.is_match("the movie's sadness stayed with me"));
        assert!(!LOW.is_match("that show is upsetting to watch"));
        assert!(PLAN_MEANS.is_match("I have pills at home"));
        assert!(!PLAN_MEANS.is_match("a pillsbury recipe"));
    }

    #[test]
    fn multi_word_phrases_match_across_spaces() {
        assert!(MEDICAL_EMERGENCY.is_match("I took too many last night"));
        assert!(HIGH.is_match("I just can't go on"));
    }

    #[test]
    fn danger_signals_cover_plan_phrases() {
        assert!(is_danger_signal("pills"));
        assert!(is_danger_signal("have a plan"));
        assert!(is_danger_signal("self-harm-plan"));
        assert!(!is_danger_signal("sad"));
    }

    #[test]
    fn medical_signals_are_distinct_from_ideation() {
        assert!(is_medical_signal("overdose"));
        assert!(!is_medical_signal("kill myself"));
    }
}
