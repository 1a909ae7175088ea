//! Pure session state machine. Owned exclusively by the session's actor;
//! every mutation goes through a transition method here so the lifecycle
//! invariants live in one place.

use chrono::{DateTime, Utc};
use tracing::debug;

use haven_core::counselor::CounselorRef;
use haven_core::ids::{SessionId, UserId};
use haven_core::messages::SessionMessage;
use haven_core::session::{EndReason, SessionState};
use haven_core::severity::{Priority, Severity};

use crate::error::EngineError;

/// One crisis conversation's state. `priority` is the high-water mark of
/// every assessment the session has seen; it never decreases except through
/// [`Session::reset_priority`].
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub counselor: Option<CounselorRef>,
    pub priority: Priority,
    pub state: SessionState,
    pub messages: Vec<SessionMessage>,
    pub end_reason: Option<EndReason>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, user_id: UserId, priority: Priority, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            counselor: None,
            priority,
            state: SessionState::Queued,
            messages: Vec::new(),
            end_reason: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Bind a counselor: `Queued -> Assigned`.
    pub fn assign(&mut self, counselor: CounselorRef) -> Result<(), EngineError> {
        self.transition(SessionState::Queued, SessionState::Assigned)?;
        self.counselor = Some(counselor);
        Ok(())
    }

    /// Open the conversation: `Assigned -> Active`.
    pub fn activate(&mut self) -> Result<(), EngineError> {
        self.transition(SessionState::Assigned, SessionState::Active)
    }

    /// Enter the escalated state: `Active -> Escalated`. Already-escalated
    /// sessions stay escalated, so repeated firings are not transitions.
    pub fn escalate(&mut self) -> Result<(), EngineError> {
        if self.state == SessionState::Escalated {
            return Ok(());
        }
        self.transition(SessionState::Active, SessionState::Escalated)
    }

    /// Acknowledge the emergency action: `Escalated -> Active`. Priority
    /// stays at its high-water mark.
    pub fn acknowledge_escalation(&mut self) -> Result<(), EngineError> {
        self.transition(SessionState::Escalated, SessionState::Active)
    }

    /// Terminal transition. Valid from every non-terminal state.
    pub fn end(&mut self, reason: EndReason) -> Result<(), EngineError> {
        if self.state.is_terminal() {
            return Err(EngineError::SessionEnded(self.id.as_str().to_string()));
        }
        debug!(session_id = %self.id, from = %self.state, ?reason, "session ended");
        self.state = SessionState::Ended;
        self.end_reason = Some(reason);
        Ok(())
    }

    /// Raise the priority high-water mark from an assessment level.
    /// Returns true when the priority actually changed.
    pub fn raise_priority(&mut self, level: Severity) -> bool {
        let candidate = Priority::from(level);
        if candidate > self.priority {
            debug!(session_id = %self.id, from = %self.priority, to = %candidate, "priority raised");
            self.priority = candidate;
            true
        } else {
            false
        }
    }

    /// Explicit operator reset. The only path by which priority decreases.
    pub fn reset_priority(&mut self, priority: Priority) {
        debug!(session_id = %self.id, from = %self.priority, to = %priority, "priority reset");
        self.priority = priority;
    }

    /// Append to the message log and refresh the activity clock.
    pub fn append(&mut self, message: SessionMessage, now: DateTime<Utc>) {
        self.messages.push(message);
        self.last_activity_at = now;
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), EngineError> {
        if self.state != from {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(session_id = %self.id, %from, %to, "session transition");
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::counselor::{CounselorProfile, Personality};
    use haven_core::ids::CounselorId;

    fn counselor_ref() -> CounselorRef {
        CounselorRef {
            profile: CounselorProfile {
                id: CounselorId::from_raw("counselor_test"),
                name: "Test".into(),
                specialties: Default::default(),
                personality: Personality::Calm,
                avg_response_secs: 1,
                experience_years: 5,
            },
            fallback: false,
        }
    }

    fn session() -> Session {
        Session::new(SessionId::new(), UserId::new(), Priority::Low, Utc::now())
    }

    #[test]
    fn full_lifecycle() {
        let mut s = session();
        assert_eq!(s.state, SessionState::Queued);
        s.assign(counselor_ref()).unwrap();
        s.activate().unwrap();
        s.escalate().unwrap();
        s.acknowledge_escalation().unwrap();
        assert_eq!(s.state, SessionState::Active);
        s.end(EndReason::UserEnded).unwrap();
        assert!(s.is_ended());
        assert_eq!(s.end_reason, Some(EndReason::UserEnded));
    }

    #[test]
    fn cannot_activate_before_assignment() {
        let mut s = session();
        assert!(matches!(
            s.activate(),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn ended_is_terminal() {
        let mut s = session();
        s.end(EndReason::InactivityTimeout).unwrap();
        assert!(matches!(
            s.end(EndReason::UserEnded),
            Err(EngineError::SessionEnded(_))
        ));
        assert!(s.assign(counselor_ref()).is_err());
    }

    #[test]
    fn repeated_escalation_is_not_a_transition() {
        let mut s = session();
        s.assign(counselor_ref()).unwrap();
        s.activate().unwrap();
        s.escalate().unwrap();
        s.escalate().unwrap();
        assert_eq!(s.state, SessionState::Escalated);
    }

    #[test]
    fn priority_is_monotonic() {
        let mut s = session();
        assert!(s.raise_priority(Severity::High));
        assert_eq!(s.priority, Priority::High);

        // De-escalating signals never erase unresolved risk.
        assert!(!s.raise_priority(Severity::Low));
        assert_eq!(s.priority, Priority::High);

        assert!(s.raise_priority(Severity::Critical));
        assert_eq!(s.priority, Priority::Critical);
    }

    #[test]
    fn priority_survives_acknowledgement() {
        let mut s = session();
        s.assign(counselor_ref()).unwrap();
        s.activate().unwrap();
        s.raise_priority(Severity::Critical);
        s.escalate().unwrap();
        s.acknowledge_escalation().unwrap();
        assert_eq!(s.priority, Priority::Critical);
    }

    #[test]
    fn reset_is_the_only_decrease() {
        let mut s = session();
        s.raise_priority(Severity::Critical);
        s.reset_priority(Priority::Low);
        assert_eq!(s.priority, Priority::Low);
    }

    #[test]
    fn append_refreshes_activity() {
        let mut s = session();
        let created = s.last_activity_at;
        let later = created + chrono::Duration::seconds(30);
        s.append(SessionMessage::user(s.id.clone(), "user_1", "hi"), later);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.last_activity_at, later);
    }
}
