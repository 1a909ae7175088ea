use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    User,
    Counselor,
    System,
}

impl std::fmt::Display for SenderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Counselor => write!(f, "counselor"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for SenderRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "counselor" => Ok(Self::Counselor),
            "system" => Ok(Self::System),
            other => Err(format!("unknown sender role: {other}")),
        }
    }
}

/// Message category on the wire and at rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
    CrisisAlert,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::System => write!(f, "system"),
            Self::CrisisAlert => write!(f, "crisis_alert"),
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "system" => Ok(Self::System),
            "crisis_alert" => Ok(Self::CrisisAlert),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// One message in a session's log. Append-only; ordering is the order of
/// arrival into the session, not wall-clock send time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub content: String,
    pub timestamp: String,
    pub kind: MessageKind,
}

impl SessionMessage {
    fn new(
        session_id: SessionId,
        sender_id: impl Into<String>,
        sender_role: SenderRole,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            sender_id: sender_id.into(),
            sender_role,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            kind,
        }
    }

    pub fn user(session_id: SessionId, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, user_id, SenderRole::User, content, MessageKind::Text)
    }

    pub fn counselor(
        session_id: SessionId,
        counselor_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(session_id, counselor_id, SenderRole::Counselor, content, MessageKind::Text)
    }

    pub fn system(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, "system", SenderRole::System, content, MessageKind::System)
    }

    pub fn crisis_alert(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, "system", SenderRole::System, content, MessageKind::CrisisAlert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_has_role_and_kind() {
        let sid = SessionId::new();
        let msg = SessionMessage::user(sid.clone(), "user_1", "hello");
        assert_eq!(msg.session_id, sid);
        assert_eq!(msg.sender_role, SenderRole::User);
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.id.as_str().starts_with("msg_"));
    }

    #[test]
    fn crisis_alert_is_system_sender() {
        let msg = SessionMessage::crisis_alert(SessionId::new(), "escalating");
        assert_eq!(msg.sender_role, SenderRole::System);
        assert_eq!(msg.kind, MessageKind::CrisisAlert);
        assert_eq!(msg.sender_id, "system");
    }

    #[test]
    fn kind_display_parse_roundtrip() {
        for kind in [MessageKind::Text, MessageKind::System, MessageKind::CrisisAlert] {
            let parsed: MessageKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn serde_roundtrip() {
        let msg = SessionMessage::counselor(SessionId::new(), "counselor_a", "I'm here with you");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: SessionMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
