use serde::{Deserialize, Serialize};

use crate::counselor::CounselorProfile;
use crate::emergency::EmergencyAction;
use crate::ids::{CounselorId, SessionId};
use crate::messages::SessionMessage;

/// Session lifecycle events broadcast to the UI collaborator.
/// These are the internal engine events; the server maps them to the wire
/// names (`message:new`, `queue:update`, ...) before sending to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "message_new")]
    MessageNew {
        session_id: SessionId,
        message: SessionMessage,
    },

    #[serde(rename = "typing_start")]
    TypingStart {
        session_id: SessionId,
        counselor_id: CounselorId,
    },

    #[serde(rename = "typing_stop")]
    TypingStop {
        session_id: SessionId,
        counselor_id: CounselorId,
    },

    #[serde(rename = "queue_update")]
    QueueUpdate {
        session_id: SessionId,
        position: u32,
        estimated_wait_secs: u64,
    },

    #[serde(rename = "counselor_assigned")]
    CounselorAssigned {
        session_id: SessionId,
        counselor: CounselorProfile,
        fallback: bool,
    },

    #[serde(rename = "crisis_escalated")]
    CrisisEscalated {
        session_id: SessionId,
        action: EmergencyAction,
        reason: String,
    },

    /// Emergency action could not be dispatched. Carries manual-dial
    /// instructions; must never be dropped silently.
    #[serde(rename = "escalation_dispatch_failed")]
    EscalationDispatchFailed {
        session_id: SessionId,
        action: EmergencyAction,
        instructions: String,
    },

    #[serde(rename = "session_ended")]
    SessionEnded {
        session_id: SessionId,
        reason: String,
    },

    #[serde(rename = "connection_lost")]
    ConnectionLost { session_id: SessionId },

    #[serde(rename = "connection_restored")]
    ConnectionRestored { session_id: SessionId },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::MessageNew { session_id, .. }
            | Self::TypingStart { session_id, .. }
            | Self::TypingStop { session_id, .. }
            | Self::QueueUpdate { session_id, .. }
            | Self::CounselorAssigned { session_id, .. }
            | Self::CrisisEscalated { session_id, .. }
            | Self::EscalationDispatchFailed { session_id, .. }
            | Self::SessionEnded { session_id, .. }
            | Self::ConnectionLost { session_id }
            | Self::ConnectionRestored { session_id } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message_new",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::QueueUpdate { .. } => "queue_update",
            Self::CounselorAssigned { .. } => "counselor_assigned",
            Self::CrisisEscalated { .. } => "crisis_escalated",
            Self::EscalationDispatchFailed { .. } => "escalation_dispatch_failed",
            Self::SessionEnded { .. } => "session_ended",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::ConnectionRestored { .. } => "connection_restored",
        }
    }
}
