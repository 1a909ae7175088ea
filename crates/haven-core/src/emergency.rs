use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::{EmergencyId, SessionId};

/// Emergency protocol selected by the escalation coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyAction {
    #[serde(rename = "auto_dial_988")]
    AutoDial988,
    #[serde(rename = "auto_dial_911")]
    AutoDial911,
    SpecialistHandoff,
    SafetyProtocol,
}

impl EmergencyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoDial988 => "auto_dial_988",
            Self::AutoDial911 => "auto_dial_911",
            Self::SpecialistHandoff => "specialist_handoff",
            Self::SafetyProtocol => "safety_protocol",
        }
    }

    /// Instructions shown to the user when automatic dispatch fails.
    /// Must always give a manually dialable number.
    pub fn manual_instructions(&self) -> &'static str {
        match self {
            Self::AutoDial988 => "Please call or text 988 now to reach the Suicide & Crisis Lifeline.",
            Self::AutoDial911 => "Please call 911 now for immediate medical help.",
            Self::SpecialistHandoff => {
                "Please call 988 and ask for a crisis specialist, or text HOME to 741741."
            }
            Self::SafetyProtocol => "Please call 988 if you feel unsafe, or text HOME to 741741.",
        }
    }
}

impl std::fmt::Display for EmergencyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmergencyAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_dial_988" => Ok(Self::AutoDial988),
            "auto_dial_911" => Ok(Self::AutoDial911),
            "specialist_handoff" => Ok(Self::SpecialistHandoff),
            "safety_protocol" => Ok(Self::SafetyProtocol),
            other => Err(format!("unknown emergency action: {other}")),
        }
    }
}

/// A fired emergency escalation. Immutable after creation.
///
/// `deduped` is true when this firing coalesced suppressed duplicate
/// triggers from earlier in the de-duplication window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub id: EmergencyId,
    pub session_id: SessionId,
    pub trigger: String,
    pub action: EmergencyAction,
    pub timestamp: String,
    pub deduped: bool,
}

impl EmergencyEvent {
    pub fn new(session_id: SessionId, trigger: impl Into<String>, action: EmergencyAction) -> Self {
        Self {
            id: EmergencyId::new(),
            session_id,
            trigger: trigger.into(),
            action,
            timestamp: Utc::now().to_rfc3339(),
            deduped: false,
        }
    }

    pub fn with_deduped(mut self, deduped: bool) -> Self {
        self.deduped = deduped;
        self
    }
}
