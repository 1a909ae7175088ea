use serde::{Deserialize, Serialize};

/// Lifecycle state of a support session. `Ended` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Queued,
    Assigned,
    Active,
    Escalated,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Active => "active",
            Self::Escalated => "escalated",
            Self::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "assigned" => Ok(Self::Assigned),
            "active" => Ok(Self::Active),
            "escalated" => Ok(Self::Escalated),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserEnded,
    CounselorEnded,
    InactivityTimeout,
    Shutdown,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserEnded => "user_ended",
            Self::CounselorEnded => "counselor_ended",
            Self::InactivityTimeout => "inactivity_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_ended" => Ok(Self::UserEnded),
            "counselor_ended" => Ok(Self::CounselorEnded),
            "inactivity_timeout" => Ok(Self::InactivityTimeout),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(format!("unknown end reason: {other}")),
        }
    }
}
