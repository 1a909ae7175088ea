pub mod actor;
pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod queue;
pub mod session;
pub mod triage;

pub use actor::{
    ActorDeps, SessionActor, SessionCommand, SessionHandle, SessionSnapshot, SessionTimings,
};
pub use dispatch::{EmergencyDispatcher, MockDispatcher, SimulatedDispatcher};
pub use error::EngineError;
pub use escalation::{EscalationConfig, EscalationCoordinator, EscalationDecision};
pub use queue::WaitQueue;
pub use session::Session;
pub use triage::{RiskScorer, ScoringConfig};
