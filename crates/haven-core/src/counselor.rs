use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::CounselorId;

/// How a counselor persona carries a conversation. Drives both assignment
/// preferences and reply tone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Personality {
    TraumaInformed,
    Empathetic,
    Direct,
    Warm,
    Calm,
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TraumaInformed => "trauma-informed",
            Self::Empathetic => "empathetic",
            Self::Direct => "direct",
            Self::Warm => "warm",
            Self::Calm => "calm",
        };
        f.write_str(s)
    }
}

impl Personality {
    /// Personalities preferred for high-priority assignments.
    pub fn is_crisis_preferred(&self) -> bool {
        matches!(self, Self::TraumaInformed | Self::Empathetic)
    }
}

/// Static counselor persona profile. Read-only reference data; assignment
/// never mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounselorProfile {
    pub id: CounselorId,
    pub name: String,
    pub specialties: BTreeSet<String>,
    pub personality: Personality,
    pub avg_response_secs: u64,
    pub experience_years: u32,
}

/// Availability of a counselor in the shared pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounselorStatus {
    Available,
    Busy,
    Offline,
}

/// A counselor bound to a session, with whether the pool had to fall back
/// past availability to make the assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounselorRef {
    pub profile: CounselorProfile,
    pub fallback: bool,
}
