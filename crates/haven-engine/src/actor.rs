//! Actor-per-session runtime. One tokio task owns each [`Session`];
//! commands arrive on an mpsc channel and every outbound notification goes
//! through one broadcast channel. All timers live inside the actor's
//! select loop and die with its cancellation token, so nothing fires after
//! the session ends.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use haven_core::assessment::RiskAssessment;
use haven_core::clock::Clock;
use haven_core::counselor::CounselorRef;
use haven_core::emergency::EmergencyAction;
use haven_core::events::SessionEvent;
use haven_core::ids::{CounselorId, SessionId, UserId};
use haven_core::messages::SessionMessage;
use haven_core::session::{EndReason, SessionState};
use haven_core::severity::Priority;
use haven_counselor::{CounselorPool, CounselorResponder};
use haven_store::{StoreSpool, WriteOp};
use haven_telemetry::MetricsRecorder;

use crate::dispatch::EmergencyDispatcher;
use crate::error::EngineError;
use crate::escalation::{EscalationConfig, EscalationCoordinator, EscalationDecision};
use crate::queue::WaitQueue;
use crate::session::Session;
use crate::triage::RiskScorer;

/// Timer configuration for one session actor.
#[derive(Clone, Debug)]
pub struct SessionTimings {
    /// Interval between queue-position updates while waiting.
    pub queue_tick: Duration,
    /// Idle time after which the session ends itself. Reset by every
    /// inbound command.
    pub inactivity_timeout: Duration,
    /// Pause between announcing an escalation and dispatching the
    /// emergency action, so the warning renders before the (simulated)
    /// dial happens.
    pub dispatch_delay: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            queue_tick: Duration::from_secs(5),
            inactivity_timeout: Duration::from_secs(300),
            dispatch_delay: Duration::from_secs(2),
        }
    }
}

/// Commands a session actor accepts. `ReplyReady` and `DispatchFailed`
/// are sent by the actor's own spawned timer tasks, never by handles.
pub enum SessionCommand {
    Message { text: String },
    Answers { answers: BTreeMap<String, i64> },
    AcknowledgeEscalation,
    End { reason: EndReason },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    ReplyReady { counselor_id: CounselorId, content: String },
    DispatchFailed { action: EmergencyAction, instructions: String, error: String },
}

/// Read-only view of a session's current state.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: UserId,
    pub state: SessionState,
    pub priority: Priority,
    pub counselor: Option<CounselorRef>,
    pub message_count: usize,
    pub created_at: String,
    pub last_activity_at: String,
}

/// Cheap handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn submit_message(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.send(SessionCommand::Message { text: text.into() })
    }

    pub fn submit_answers(&self, answers: BTreeMap<String, i64>) -> Result<(), EngineError> {
        self.send(SessionCommand::Answers { answers })
    }

    pub fn acknowledge_escalation(&self) -> Result<(), EngineError> {
        self.send(SessionCommand::AcknowledgeEscalation)
    }

    pub fn end(&self, reason: EndReason) -> Result<(), EngineError> {
        self.send(SessionCommand::End { reason })
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply })?;
        rx.await
            .map_err(|_| EngineError::SessionEnded(self.session_id.as_str().to_string()))
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the actor has shut down.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::SessionEnded(self.session_id.as_str().to_string()));
        }
        self.tx
            .send(cmd)
            .map_err(|_| EngineError::SessionEnded(self.session_id.as_str().to_string()))
    }
}

/// Everything a session actor needs from the rest of the system. One copy
/// per process, cloned per session.
#[derive(Clone)]
pub struct ActorDeps {
    pub pool: Arc<CounselorPool>,
    pub responder: Arc<dyn CounselorResponder>,
    pub dispatcher: Arc<dyn EmergencyDispatcher>,
    pub scorer: RiskScorer,
    pub escalation: EscalationConfig,
    pub clock: Arc<dyn Clock>,
    pub events: broadcast::Sender<SessionEvent>,
    pub spool: StoreSpool,
    pub metrics: Option<Arc<MetricsRecorder>>,
    pub timings: SessionTimings,
}

pub struct SessionActor {
    session: Session,
    rx: mpsc::UnboundedReceiver<SessionCommand>,
    /// Loopback sender for the actor's own spawned timer tasks.
    tx: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
    coordinator: EscalationCoordinator,
    deps: ActorDeps,
}

impl SessionActor {
    /// Spawn the actor task for a fresh session and return its handle.
    pub fn spawn(
        id: SessionId,
        user_id: UserId,
        priority: Priority,
        deps: ActorDeps,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = Session::new(id.clone(), user_id.clone(), priority, deps.clock.now());

        deps.spool.submit(WriteOp::CreateSession {
            id: id.clone(),
            user_id,
        });
        if priority > Priority::Low {
            deps.spool.submit(WriteOp::SessionPriority {
                id: id.clone(),
                priority,
            });
        }

        let coordinator = EscalationCoordinator::new(id.clone(), deps.escalation.clone());
        let actor = SessionActor {
            session,
            rx,
            tx: tx.clone(),
            cancel: cancel.clone(),
            coordinator,
            deps,
        };
        tokio::spawn(actor.run());

        SessionHandle {
            session_id: id,
            tx,
            cancel,
        }
    }

    async fn run(mut self) {
        if self.queue_phase().await {
            self.active_phase().await;
        }
        self.cancel.cancel();
    }

    /// Queued state: emit countdown updates until the front of the queue,
    /// then bind a counselor. Returns false if the session ended while
    /// waiting.
    async fn queue_phase(&mut self) -> bool {
        let initial_position = if self.deps.pool.available_count() == 0 {
            3
        } else {
            1
        };
        let mut queue = WaitQueue::new(initial_position);
        let clock = Arc::clone(&self.deps.clock);
        let cancel = self.cancel.clone();
        let tick = self.deps.timings.queue_tick;
        let mut last_emitted = None;

        // The tick sleep outlives select iterations: handling a command
        // must not reset the countdown deadline, or a client polling
        // status faster than the tick would starve the queue forever.
        let mut tick_sleep = clock.sleep(tick);
        while !queue.is_front() {
            let (position, estimated_wait_secs) = queue.status();
            // Commands also wake this loop; only a real countdown step is
            // worth an update.
            if last_emitted != Some(position) {
                self.emit(SessionEvent::QueueUpdate {
                    session_id: self.session.id.clone(),
                    position,
                    estimated_wait_secs,
                });
                last_emitted = Some(position);
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut tick_sleep => {
                    queue.advance();
                    tick_sleep = clock.sleep(tick);
                }
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle(cmd) {
                            return false;
                        }
                    }
                    None => {
                        self.end_session(EndReason::Shutdown);
                        return false;
                    }
                },
            }
        }

        match self.deps.pool.assign(self.session.priority) {
            Some(counselor) => {
                self.emit(SessionEvent::CounselorAssigned {
                    session_id: self.session.id.clone(),
                    counselor: counselor.profile.clone(),
                    fallback: counselor.fallback,
                });
                self.deps.spool.submit(WriteOp::AssignCounselor {
                    id: self.session.id.clone(),
                    counselor_id: counselor.profile.id.clone(),
                    fallback: counselor.fallback,
                });

                let greeting = format!("You're connected with {}.", counselor.profile.name);
                if let Err(e) = self.session.assign(counselor) {
                    warn!(session_id = %self.session.id, error = %e, "assignment transition failed");
                    return false;
                }
                if let Err(e) = self.session.activate() {
                    warn!(session_id = %self.session.id, error = %e, "activation transition failed");
                    return false;
                }
                self.deps.spool.submit(WriteOp::SessionState {
                    id: self.session.id.clone(),
                    state: SessionState::Active,
                });
                self.append_system(SessionMessage::system(self.session.id.clone(), greeting));
                true
            }
            None => {
                warn!(session_id = %self.session.id, "no counselors configured, ending session");
                self.end_session(EndReason::Shutdown);
                false
            }
        }
    }

    /// Active/Escalated states: message exchange until the session ends.
    /// The inactivity timer restarts on every inbound command.
    async fn active_phase(&mut self) {
        let clock = Arc::clone(&self.deps.clock);
        let cancel = self.cancel.clone();
        let idle = self.deps.timings.inactivity_timeout;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = clock.sleep(idle) => {
                    info!(session_id = %self.session.id, "session idle, timing out");
                    self.end_session(EndReason::InactivityTimeout);
                    return;
                }
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle(cmd) {
                            return;
                        }
                    }
                    None => {
                        self.end_session(EndReason::Shutdown);
                        return;
                    }
                },
            }
        }
    }

    /// Returns true when the command ended the session. Nothing here
    /// awaits: timers run in spawned tasks so the command loop keeps
    /// receiving and scoring while a reply or dispatch pause is pending.
    fn handle(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Message { text } => {
                self.handle_message(text);
                false
            }
            SessionCommand::Answers { answers } => {
                let assessment = self.deps.scorer.score_answers(&answers);
                self.record_assessment(assessment);
                false
            }
            SessionCommand::AcknowledgeEscalation => {
                match self.session.acknowledge_escalation() {
                    Ok(()) => {
                        self.deps.spool.submit(WriteOp::SessionState {
                            id: self.session.id.clone(),
                            state: SessionState::Active,
                        });
                        self.append_system(SessionMessage::system(
                            self.session.id.clone(),
                            "Emergency protocol acknowledged. Your counselor is still here with you.",
                        ));
                    }
                    Err(e) => {
                        warn!(session_id = %self.session.id, error = %e, "acknowledge outside escalated state");
                    }
                }
                false
            }
            SessionCommand::End { reason } => {
                self.end_session(reason);
                true
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                false
            }
            SessionCommand::ReplyReady { counselor_id, content } => {
                self.finish_reply(counselor_id, content);
                false
            }
            SessionCommand::DispatchFailed { action, instructions, error } => {
                warn!(
                    session_id = %self.session.id,
                    %action,
                    error = %error,
                    "emergency dispatch failed, surfacing manual instructions"
                );
                self.emit(SessionEvent::EscalationDispatchFailed {
                    session_id: self.session.id.clone(),
                    action,
                    instructions,
                });
                false
            }
        }
    }

    /// One inbound user message: append, score, escalate if needed, and
    /// only then compose the counselor reply. The typing simulation runs
    /// in a spawned task, so a follow-up message is scored the moment it
    /// arrives rather than after the previous reply's delay.
    fn handle_message(&mut self, text: String) {
        let message = SessionMessage::user(
            self.session.id.clone(),
            self.session.user_id.as_str(),
            text.clone(),
        );
        self.session.append(message.clone(), self.deps.clock.now());
        self.emit(SessionEvent::MessageNew {
            session_id: self.session.id.clone(),
            message: message.clone(),
        });
        self.deps.spool.submit(WriteOp::Interaction(message));

        let assessment = self.deps.scorer.score_text(&text);
        let level = assessment.level;
        self.record_assessment(assessment);

        let Some(counselor) = self.session.counselor.clone() else {
            return; // still queued, reply once a counselor is bound
        };
        let reply = self
            .deps
            .responder
            .compose(&counselor.profile, level, &text);

        self.emit(SessionEvent::TypingStart {
            session_id: self.session.id.clone(),
            counselor_id: counselor.profile.id.clone(),
        });

        let tx = self.tx.clone();
        let clock = Arc::clone(&self.deps.clock);
        let cancel = self.cancel.clone();
        let counselor_id = counselor.profile.id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = clock.sleep(reply.delay) => {
                    let _ = tx.send(SessionCommand::ReplyReady {
                        counselor_id,
                        content: reply.content,
                    });
                }
            }
        });
    }

    /// Typing simulation finished: land the counselor reply.
    fn finish_reply(&mut self, counselor_id: CounselorId, content: String) {
        self.emit(SessionEvent::TypingStop {
            session_id: self.session.id.clone(),
            counselor_id: counselor_id.clone(),
        });
        let message =
            SessionMessage::counselor(self.session.id.clone(), counselor_id.as_str(), content);
        self.session.append(message.clone(), self.deps.clock.now());
        self.emit(SessionEvent::MessageNew {
            session_id: self.session.id.clone(),
            message: message.clone(),
        });
        self.deps.spool.submit(WriteOp::Interaction(message));
    }

    /// Persist an assessment, raise the priority high-water mark, and run
    /// escalation. The pre-dispatch pause runs in a spawned task so the
    /// command loop never blocks on it.
    fn record_assessment(&mut self, assessment: RiskAssessment) {
        self.deps.spool.submit(WriteOp::Assessment {
            session_id: self.session.id.clone(),
            assessment: assessment.clone(),
        });
        if let Some(m) = &self.deps.metrics {
            m.assessment_scored(assessment.level.as_str());
        }
        if self.session.raise_priority(assessment.level) {
            self.deps.spool.submit(WriteOp::SessionPriority {
                id: self.session.id.clone(),
                priority: self.session.priority,
            });
        }

        let now = self.deps.clock.now();
        let event = match self
            .coordinator
            .evaluate(self.session.priority, &assessment, now)
        {
            EscalationDecision::Fire(event) => event,
            EscalationDecision::Suppressed(action) => {
                if let Some(m) = &self.deps.metrics {
                    m.escalation_suppressed(action.as_str());
                }
                return;
            }
            EscalationDecision::NoAction => return,
        };

        if self.session.state == SessionState::Active {
            if self.session.escalate().is_ok() {
                self.deps.spool.submit(WriteOp::SessionState {
                    id: self.session.id.clone(),
                    state: SessionState::Escalated,
                });
            }
        }

        self.append_system(SessionMessage::crisis_alert(
            self.session.id.clone(),
            format!(
                "Emergency protocol activated ({}). You are not alone — support is being connected now.",
                event.action
            ),
        ));
        self.emit(SessionEvent::CrisisEscalated {
            session_id: self.session.id.clone(),
            action: event.action,
            reason: event.trigger.clone(),
        });
        self.deps.spool.submit(WriteOp::Emergency(event.clone()));
        if let Some(m) = &self.deps.metrics {
            m.escalation_fired(event.action.as_str(), event.deduped);
        }

        // Let the UI render the warning before the action runs. The pause
        // dies with the cancellation token like every other timer.
        let tx = self.tx.clone();
        let clock = Arc::clone(&self.deps.clock);
        let cancel = self.cancel.clone();
        let dispatcher = Arc::clone(&self.deps.dispatcher);
        let delay = self.deps.timings.dispatch_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = clock.sleep(delay) => {
                    if let Err(e) = dispatcher.dispatch(&event).await {
                        let _ = tx.send(SessionCommand::DispatchFailed {
                            action: event.action,
                            instructions: event.action.manual_instructions().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        });
    }

    fn end_session(&mut self, reason: EndReason) {
        if self.session.is_ended() {
            return;
        }
        self.append_system(SessionMessage::system(
            self.session.id.clone(),
            "This session has ended. Support is always available: call or text 988 anytime.",
        ));
        if let Err(e) = self.session.end(reason) {
            warn!(session_id = %self.session.id, error = %e, "end transition failed");
            return;
        }
        self.deps.spool.submit(WriteOp::EndSession {
            id: self.session.id.clone(),
            reason,
        });
        if let Some(counselor) = &self.session.counselor {
            self.deps.pool.release(&counselor.profile.id);
        }
        if let Some(m) = &self.deps.metrics {
            m.session_ended(reason.as_str());
        }
        self.emit(SessionEvent::SessionEnded {
            session_id: self.session.id.clone(),
            reason: reason.as_str().to_string(),
        });
        self.cancel.cancel();
    }

    fn append_system(&mut self, message: SessionMessage) {
        self.session.append(message.clone(), self.deps.clock.now());
        self.emit(SessionEvent::MessageNew {
            session_id: self.session.id.clone(),
            message: message.clone(),
        });
        self.deps.spool.submit(WriteOp::Interaction(message));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are best-effort notifications.
        let _ = self.deps.events.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.session.id.clone(),
            user_id: self.session.user_id.clone(),
            state: self.session.state,
            priority: self.session.priority,
            counselor: self.session.counselor.clone(),
            message_count: self.session.messages.len(),
            created_at: self.session.created_at.to_rfc3339(),
            last_activity_at: self.session.last_activity_at.to_rfc3339(),
        }
    }
}
