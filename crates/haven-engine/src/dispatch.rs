//! Emergency dispatch seam. The actor hands a fired [`EmergencyEvent`] to
//! a dispatcher; a failure here must surface as a distinct event so the UI
//! can show manual-dial instructions, never silently disappear.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use haven_core::emergency::EmergencyEvent;

use crate::error::EngineError;

#[async_trait]
pub trait EmergencyDispatcher: Send + Sync {
    async fn dispatch(&self, event: &EmergencyEvent) -> Result<(), EngineError>;
}

/// Simulated dispatcher for the demo deployment: the dial is logged, not
/// placed. Always succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedDispatcher;

#[async_trait]
impl EmergencyDispatcher for SimulatedDispatcher {
    async fn dispatch(&self, event: &EmergencyEvent) -> Result<(), EngineError> {
        info!(
            session_id = %event.session_id,
            action = %event.action,
            trigger = %event.trigger,
            "simulated emergency dispatch"
        );
        Ok(())
    }
}

/// Test dispatcher: records every dispatched event and can be told to fail.
#[derive(Default)]
pub struct MockDispatcher {
    fail: AtomicBool,
    calls: AtomicUsize,
    dispatched: Mutex<Vec<EmergencyEvent>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.fail.store(true, Ordering::Relaxed);
        dispatcher
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> Vec<EmergencyEvent> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl EmergencyDispatcher for MockDispatcher {
    async fn dispatch(&self, event: &EmergencyEvent) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(EngineError::EscalationDispatch(
                "transport unavailable".to_string(),
            ));
        }
        self.dispatched.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::emergency::EmergencyAction;
    use haven_core::ids::SessionId;

    fn event() -> EmergencyEvent {
        EmergencyEvent::new(SessionId::new(), "pills", EmergencyAction::AutoDial988)
    }

    #[tokio::test]
    async fn simulated_dispatch_succeeds() {
        assert!(SimulatedDispatcher.dispatch(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn mock_records_dispatches() {
        let mock = MockDispatcher::new();
        mock.dispatch(&event()).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.dispatched().len(), 1);
    }

    #[tokio::test]
    async fn failing_mock_errors_but_still_counts() {
        let mock = MockDispatcher::failing();
        let err = mock.dispatch(&event()).await.unwrap_err();
        assert!(matches!(err, EngineError::EscalationDispatch(_)));
        assert_eq!(mock.call_count(), 1);
        assert!(mock.dispatched().is_empty());
    }
}
