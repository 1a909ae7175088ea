//! Service boundary between the RPC handlers and the session engine.
//!
//! Handlers talk to a [`CrisisService`] trait object, so they can be
//! tested against a mock without spinning up real session actors.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use haven_core::events::SessionEvent;
use haven_core::ids::{SessionId, UserId};
use haven_core::session::EndReason;
use haven_core::severity::Priority;
use haven_engine::{ActorDeps, EngineError, SessionActor, SessionHandle, SessionSnapshot};

/// Operations the RPC layer needs from the engine.
#[async_trait]
pub trait CrisisService: Send + Sync {
    /// Spawn a new session actor and return its ID.
    async fn create_session(
        &self,
        user_id: UserId,
        priority: Priority,
    ) -> Result<SessionId, EngineError>;

    fn submit_message(&self, session_id: &SessionId, text: &str) -> Result<(), EngineError>;

    fn submit_answers(
        &self,
        session_id: &SessionId,
        answers: BTreeMap<String, i64>,
    ) -> Result<(), EngineError>;

    fn acknowledge_escalation(&self, session_id: &SessionId) -> Result<(), EngineError>;

    fn end_session(&self, session_id: &SessionId, reason: EndReason) -> Result<(), EngineError>;

    /// Snapshot of a live session. Ended or unknown sessions are an error;
    /// callers fall back to the store for history.
    async fn snapshot(&self, session_id: &SessionId) -> Result<SessionSnapshot, EngineError>;

    /// Number of sessions with a live actor.
    fn active_count(&self) -> usize;

    /// Tell live sessions the store connection dropped or came back.
    fn notify_connectivity(&self, online: bool);
}

/// Production service: one [`SessionActor`] per session, tracked by handle.
pub struct EngineService {
    deps: ActorDeps,
    sessions: DashMap<SessionId, SessionHandle>,
}

impl EngineService {
    pub fn new(deps: ActorDeps) -> Self {
        Self {
            deps,
            sessions: DashMap::new(),
        }
    }

    fn lookup(&self, session_id: &SessionId) -> Result<SessionHandle, EngineError> {
        let handle = match self.sessions.get(session_id) {
            Some(entry) => entry.value().clone(),
            None => {
                return Err(EngineError::SessionNotFound(
                    session_id.as_str().to_string(),
                ))
            }
        };
        if handle.is_ended() {
            self.sessions.remove(session_id);
            return Err(EngineError::SessionEnded(session_id.as_str().to_string()));
        }
        Ok(handle)
    }

    /// Drop handles whose actors have shut down.
    fn prune_ended(&self) {
        self.sessions.retain(|_, handle| !handle.is_ended());
    }

    fn record_active(&self) {
        if let Some(m) = &self.deps.metrics {
            m.sessions_active(self.active_count());
        }
    }
}

#[async_trait]
impl CrisisService for EngineService {
    async fn create_session(
        &self,
        user_id: UserId,
        priority: Priority,
    ) -> Result<SessionId, EngineError> {
        self.prune_ended();
        let id = SessionId::new();
        let handle = SessionActor::spawn(id.clone(), user_id, priority, self.deps.clone());
        self.sessions.insert(id.clone(), handle);
        if let Some(m) = &self.deps.metrics {
            m.session_created();
        }
        self.record_active();
        tracing::info!(session_id = %id, active = self.sessions.len(), "session created");
        Ok(id)
    }

    fn submit_message(&self, session_id: &SessionId, text: &str) -> Result<(), EngineError> {
        self.lookup(session_id)?.submit_message(text)
    }

    fn submit_answers(
        &self,
        session_id: &SessionId,
        answers: BTreeMap<String, i64>,
    ) -> Result<(), EngineError> {
        self.lookup(session_id)?.submit_answers(answers)
    }

    fn acknowledge_escalation(&self, session_id: &SessionId) -> Result<(), EngineError> {
        self.lookup(session_id)?.acknowledge_escalation()
    }

    fn end_session(&self, session_id: &SessionId, reason: EndReason) -> Result<(), EngineError> {
        let handle = self.lookup(session_id)?;
        handle.end(reason)?;
        self.sessions.remove(session_id);
        self.record_active();
        Ok(())
    }

    async fn snapshot(&self, session_id: &SessionId) -> Result<SessionSnapshot, EngineError> {
        self.lookup(session_id)?.snapshot().await
    }

    fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_ended())
            .count()
    }

    fn notify_connectivity(&self, online: bool) {
        for entry in self.sessions.iter() {
            if entry.value().is_ended() {
                continue;
            }
            let session_id = entry.key().clone();
            let event = if online {
                SessionEvent::ConnectionRestored { session_id }
            } else {
                SessionEvent::ConnectionLost { session_id }
            };
            let _ = self.deps.events.send(event);
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use haven_core::session::SessionState;

    /// Test double for handler tests: records calls, optionally fails.
    pub struct MockService {
        pub created: AtomicUsize,
        pub messages: AtomicUsize,
        pub ended: AtomicUsize,
        pub connectivity: Mutex<Vec<bool>>,
        fail_with: Mutex<Option<String>>,
    }

    impl MockService {
        pub fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                messages: AtomicUsize::new(0),
                ended: AtomicUsize::new(0),
                connectivity: Mutex::new(Vec::new()),
                fail_with: Mutex::new(None),
            }
        }

        pub fn failing(message: &str) -> Self {
            let service = Self::new();
            *service.fail_with.lock().unwrap() = Some(message.to_string());
            service
        }

        fn check(&self) -> Result<(), EngineError> {
            if let Some(msg) = self.fail_with.lock().unwrap().clone() {
                return Err(EngineError::SessionEnded(msg));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CrisisService for MockService {
        async fn create_session(
            &self,
            _user_id: UserId,
            _priority: Priority,
        ) -> Result<SessionId, EngineError> {
            self.check()?;
            self.created.fetch_add(1, Ordering::Relaxed);
            Ok(SessionId::from_raw("sess_mock"))
        }

        fn submit_message(&self, _session_id: &SessionId, _text: &str) -> Result<(), EngineError> {
            self.check()?;
            self.messages.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn submit_answers(
            &self,
            _session_id: &SessionId,
            _answers: BTreeMap<String, i64>,
        ) -> Result<(), EngineError> {
            self.check()
        }

        fn acknowledge_escalation(&self, _session_id: &SessionId) -> Result<(), EngineError> {
            self.check()
        }

        fn end_session(
            &self,
            _session_id: &SessionId,
            _reason: EndReason,
        ) -> Result<(), EngineError> {
            self.check()?;
            self.ended.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn snapshot(&self, session_id: &SessionId) -> Result<SessionSnapshot, EngineError> {
            self.check()?;
            Ok(SessionSnapshot {
                id: session_id.clone(),
                user_id: UserId::from_raw("user_mock"),
                state: SessionState::Active,
                priority: Priority::Low,
                counselor: None,
                message_count: 0,
                created_at: "2026-08-27T12:00:00Z".into(),
                last_activity_at: "2026-08-27T12:00:00Z".into(),
            })
        }

        fn active_count(&self) -> usize {
            self.created.load(Ordering::Relaxed) - self.ended.load(Ordering::Relaxed)
        }

        fn notify_connectivity(&self, online: bool) {
            self.connectivity.lock().unwrap().push(online);
        }
    }

    use tokio::sync::{broadcast, watch};

    use haven_core::clock::SystemClock;
    use haven_counselor::{CounselorPool, MockResponder};
    use haven_engine::{EscalationConfig, MockDispatcher, RiskScorer, SessionTimings};
    use haven_store::{Database, StoreSpool};
    use haven_telemetry::MetricsRecorder;

    fn engine_service() -> (EngineService, broadcast::Sender<SessionEvent>, Arc<MetricsRecorder>) {
        let (event_tx, _) = broadcast::channel(256);
        let (_online_tx, online_rx) = watch::channel(true);
        let metrics = Arc::new(MetricsRecorder::in_memory().unwrap());
        let deps = ActorDeps {
            pool: Arc::new(CounselorPool::default()),
            responder: Arc::new(MockResponder::new(vec!["I'm listening.".into()])),
            dispatcher: Arc::new(MockDispatcher::new()),
            scorer: RiskScorer::default(),
            escalation: EscalationConfig::default(),
            clock: Arc::new(SystemClock),
            events: event_tx.clone(),
            spool: StoreSpool::spawn(Database::in_memory().unwrap(), online_rx),
            metrics: Some(Arc::clone(&metrics)),
            timings: SessionTimings::default(),
        };
        (EngineService::new(deps), event_tx, metrics)
    }

    #[tokio::test]
    async fn session_lifecycle_updates_metrics() {
        let (service, _events, metrics) = engine_service();

        let sid = service
            .create_session(UserId::new(), Priority::Low)
            .await
            .unwrap();
        assert_eq!(metrics.current("sessions.created"), Some(1.0));
        assert_eq!(metrics.current("sessions.active"), Some(1.0));

        service.end_session(&sid, EndReason::UserEnded).unwrap();
        assert_eq!(metrics.current("sessions.active"), Some(0.0));
    }

    #[tokio::test]
    async fn connectivity_changes_reach_live_sessions() {
        let (service, events, _metrics) = engine_service();

        let sid = service
            .create_session(UserId::new(), Priority::Low)
            .await
            .unwrap();
        let mut rx = events.subscribe();

        service.notify_connectivity(false);
        service.notify_connectivity(true);

        let mut lost = None;
        let mut restored = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::ConnectionLost { session_id } => lost = Some(session_id),
                SessionEvent::ConnectionRestored { session_id } => restored = Some(session_id),
                _ => {}
            }
        }
        assert_eq!(lost.as_ref(), Some(&sid));
        assert_eq!(restored.as_ref(), Some(&sid));
    }
}
