//! Escalation coordination: decides whether a fresh assessment fires an
//! emergency action and suppresses duplicate firings inside a per-action
//! de-duplication window.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use haven_core::assessment::RiskAssessment;
use haven_core::emergency::{EmergencyAction, EmergencyEvent};
use haven_core::ids::SessionId;
use haven_core::severity::{Priority, Severity};

use crate::triage::lexicon;

#[derive(Clone, Debug)]
pub struct EscalationConfig {
    /// Within this window the same action is not re-fired for a session.
    pub dedup_window: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(30),
        }
    }
}

/// Outcome of evaluating one assessment.
#[derive(Clone, Debug)]
pub enum EscalationDecision {
    /// A threshold was crossed; dispatch this emergency event.
    Fire(EmergencyEvent),
    /// A threshold was crossed but the action already fired inside the
    /// dedup window.
    Suppressed(EmergencyAction),
    /// No threshold crossed.
    NoAction,
}

impl EscalationDecision {
    pub fn fired(self) -> Option<EmergencyEvent> {
        match self {
            Self::Fire(event) => Some(event),
            _ => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }
}

/// One coordinator per session, owned by its actor. Tracks when each
/// action last fired so rapid consecutive critical messages produce one
/// emergency event, not a storm.
pub struct EscalationCoordinator {
    session_id: SessionId,
    config: EscalationConfig,
    state: Mutex<DedupState>,
}

#[derive(Default)]
struct DedupState {
    last_fired: HashMap<EmergencyAction, DateTime<Utc>>,
    suppressed: HashMap<EmergencyAction, u32>,
}

impl EscalationCoordinator {
    pub fn new(session_id: SessionId, config: EscalationConfig) -> Self {
        Self {
            session_id,
            config,
            state: Mutex::new(DedupState::default()),
        }
    }

    /// Evaluate a fresh assessment at `now`. The caller supplies the time
    /// from its [`Clock`](haven_core::clock::Clock) so paused-clock tests
    /// stay deterministic. Assessments that don't cross a threshold are a
    /// no-op, so callers may invoke this on every message.
    pub fn evaluate(
        &self,
        priority: Priority,
        assessment: &RiskAssessment,
        now: DateTime<Utc>,
    ) -> EscalationDecision {
        let Some(action) = select_action(assessment) else {
            return EscalationDecision::NoAction;
        };
        let trigger = assessment
            .indicators
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(|| assessment.level.to_string());

        let window = chrono::Duration::from_std(self.config.dedup_window)
            .unwrap_or(chrono::Duration::MAX);
        let mut state = self.state.lock();
        if let Some(fired_at) = state.last_fired.get(&action) {
            if now.signed_duration_since(*fired_at) < window {
                let count = state.suppressed.entry(action).or_insert(0);
                *count += 1;
                warn!(
                    session_id = %self.session_id,
                    %action,
                    suppressed = *count,
                    "duplicate escalation suppressed inside dedup window"
                );
                return EscalationDecision::Suppressed(action);
            }
        }

        let coalesced = state.suppressed.remove(&action).unwrap_or(0);
        state.last_fired.insert(action, now);
        drop(state);

        info!(
            session_id = %self.session_id,
            %action,
            %priority,
            level = %assessment.level,
            %trigger,
            coalesced,
            "emergency escalation fired"
        );

        EscalationDecision::Fire(
            EmergencyEvent::new(self.session_id.clone(), trigger, action)
                .with_deduped(coalesced > 0),
        )
    }

    /// Triggers suppressed for an action since it last fired.
    pub fn suppressed_count(&self, action: EmergencyAction) -> u32 {
        self.state
            .lock()
            .suppressed
            .get(&action)
            .copied()
            .unwrap_or(0)
    }
}

/// Action selection. Medical emergencies route to 911 and take precedence;
/// critical suicide risk with a plan/immediate-danger signal dials 988;
/// critical risk without a concrete plan runs the safety protocol; high
/// severity with active self-harm signals hands off to a specialist.
fn select_action(assessment: &RiskAssessment) -> Option<EmergencyAction> {
    if assessment
        .indicators
        .iter()
        .any(|i| lexicon::is_medical_signal(i))
    {
        return Some(EmergencyAction::AutoDial911);
    }
    match assessment.level {
        Severity::Critical => {
            if assessment
                .indicators
                .iter()
                .any(|i| lexicon::is_danger_signal(i))
            {
                Some(EmergencyAction::AutoDial988)
            } else {
                Some(EmergencyAction::SafetyProtocol)
            }
        }
        Severity::High => {
            if assessment
                .indicators
                .iter()
                .any(|i| lexicon::is_trauma_signal(i))
            {
                Some(EmergencyAction::SpecialistHandoff)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::RiskScorer;
    use chrono::TimeZone;

    fn coordinator() -> EscalationCoordinator {
        EscalationCoordinator::new(SessionId::new(), EscalationConfig::default())
    }

    fn critical_with_plan() -> RiskAssessment {
        RiskScorer::default().score_text("I want to kill myself and I have pills")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn critical_with_plan_dials_988() {
        let evt = coordinator()
            .evaluate(Priority::Critical, &critical_with_plan(), at(0))
            .fired()
            .unwrap();
        assert_eq!(evt.action, EmergencyAction::AutoDial988);
        assert!(!evt.deduped);
    }

    #[test]
    fn medical_emergency_dials_911() {
        let assessment = RiskScorer::default().score_text("I overdosed on my medication");
        let evt = coordinator()
            .evaluate(Priority::Critical, &assessment, at(0))
            .fired()
            .unwrap();
        assert_eq!(evt.action, EmergencyAction::AutoDial911);
    }

    #[test]
    fn low_severity_is_a_no_op() {
        let assessment = RiskScorer::default().score_text("I feel really sad and lonely today");
        let decision = coordinator().evaluate(Priority::Low, &assessment, at(0));
        assert!(matches!(decision, EscalationDecision::NoAction));
    }

    #[test]
    fn high_with_self_harm_hands_off_to_specialist() {
        let assessment =
            RiskScorer::default().score_text("I've been cutting and I feel hopeless and worthless");
        let evt = coordinator()
            .evaluate(Priority::High, &assessment, at(0))
            .fired()
            .unwrap();
        assert_eq!(evt.action, EmergencyAction::SpecialistHandoff);
    }

    #[test]
    fn duplicate_inside_window_is_suppressed() {
        let coord = coordinator();
        let assessment = critical_with_plan();

        assert!(matches!(
            coord.evaluate(Priority::Critical, &assessment, at(0)),
            EscalationDecision::Fire(_)
        ));

        let decision = coord.evaluate(Priority::Critical, &assessment, at(2));
        assert!(decision.is_suppressed());
        assert_eq!(coord.suppressed_count(EmergencyAction::AutoDial988), 1);
    }

    #[test]
    fn refire_after_window_is_marked_deduped() {
        let coord = coordinator();
        let assessment = critical_with_plan();

        assert!(matches!(
            coord.evaluate(Priority::Critical, &assessment, at(0)),
            EscalationDecision::Fire(_)
        ));
        assert!(coord
            .evaluate(Priority::Critical, &assessment, at(5))
            .is_suppressed());

        let evt = coord
            .evaluate(Priority::Critical, &assessment, at(36))
            .fired()
            .unwrap();
        assert!(evt.deduped, "coalesced firing must carry the dedup flag");
        assert_eq!(coord.suppressed_count(EmergencyAction::AutoDial988), 0);
    }

    #[test]
    fn distinct_actions_dedup_independently() {
        let coord = coordinator();
        let suicide = critical_with_plan();
        let medical = RiskScorer::default().score_text("I overdosed on my medication");

        assert!(matches!(
            coord.evaluate(Priority::Critical, &suicide, at(0)),
            EscalationDecision::Fire(_)
        ));
        // Different action, same window: must still fire.
        assert!(matches!(
            coord.evaluate(Priority::Critical, &medical, at(1)),
            EscalationDecision::Fire(_)
        ));
    }

    #[test]
    fn window_is_configurable() {
        let coord = EscalationCoordinator::new(
            SessionId::new(),
            EscalationConfig {
                dedup_window: Duration::from_secs(5),
            },
        );
        let assessment = critical_with_plan();

        assert!(matches!(
            coord.evaluate(Priority::Critical, &assessment, at(0)),
            EscalationDecision::Fire(_)
        ));
        let evt = coord
            .evaluate(Priority::Critical, &assessment, at(6))
            .fired()
            .unwrap();
        assert!(!evt.deduped, "nothing was suppressed before the refire");
    }
}
