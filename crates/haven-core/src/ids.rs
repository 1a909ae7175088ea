//! Prefixed entity ids. The prefix makes an id self-describing in logs
//! and in the SQLite store; the UUIDv7 tail keeps ids of one kind
//! time-sortable, which the message timeline relies on.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident => $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Mint a fresh id.
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Wrap an id that arrived over the wire or from the store.
            /// No shape validation: anonymous device ids and seeded
            /// roster ids are legitimate raw values.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// One crisis-support conversation.
    SessionId => "sess"
);
entity_id!(
    /// A single message in a session timeline.
    MessageId => "msg"
);
entity_id!(
    /// One risk assessment produced by the triage scorer.
    AssessmentId => "asmt"
);
entity_id!(
    /// A counselor in the roster. Seeded roster entries use readable
    /// raw ids like `counselor_maya`.
    CounselorId => "counselor"
);
entity_id!(
    /// The person seeking support. Typically an anonymous device id.
    UserId => "user"
);
entity_id!(
    /// An emergency escalation record.
    EmergencyId => "emg"
);
