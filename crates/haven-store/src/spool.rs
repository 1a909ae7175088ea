use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use haven_core::assessment::RiskAssessment;
use haven_core::emergency::EmergencyEvent;
use haven_core::ids::{CounselorId, SessionId, UserId};
use haven_core::messages::SessionMessage;
use haven_core::session::{EndReason, SessionState};
use haven_core::severity::Priority;
use haven_telemetry::MetricsRecorder;

use crate::assessments::AssessmentRepo;
use crate::database::Database;
use crate::emergencies::EmergencyRepo;
use crate::error::StoreError;
use crate::interactions::InteractionRepo;
use crate::safety_plans::{SafetyPlan, SafetyPlanRepo};
use crate::sessions::SessionRepo;

/// One persistence operation. Everything the engine writes goes through
/// here so session actors never wait on the database.
#[derive(Clone, Debug)]
pub enum WriteOp {
    CreateSession {
        id: SessionId,
        user_id: UserId,
    },
    SessionState {
        id: SessionId,
        state: SessionState,
    },
    SessionPriority {
        id: SessionId,
        priority: Priority,
    },
    AssignCounselor {
        id: SessionId,
        counselor_id: CounselorId,
        fallback: bool,
    },
    EndSession {
        id: SessionId,
        reason: EndReason,
    },
    Interaction(SessionMessage),
    Assessment {
        session_id: SessionId,
        assessment: RiskAssessment,
    },
    Emergency(EmergencyEvent),
    SafetyPlan {
        user_id: UserId,
        plan: SafetyPlan,
    },
}

enum SpoolCmd {
    Write(WriteOp),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget write spool. `submit` never blocks and never returns an
/// error: while connectivity is down (or a write fails) ops are held in an
/// in-memory buffer and replayed once the connectivity watch flips back to
/// online.
#[derive(Clone)]
pub struct StoreSpool {
    tx: mpsc::UnboundedSender<SpoolCmd>,
    buffered: Arc<AtomicUsize>,
}

impl StoreSpool {
    /// Spawn the consumer task and return the submit handle. The task runs
    /// until every handle is dropped.
    pub fn spawn(db: Database, online: watch::Receiver<bool>) -> Self {
        Self::spawn_with_metrics(db, online, None)
    }

    /// Like [`spawn`](Self::spawn), reporting buffer depth and replay
    /// counts to the metrics recorder.
    pub fn spawn_with_metrics(
        db: Database,
        online: watch::Receiver<bool>,
        metrics: Option<Arc<MetricsRecorder>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));

        let repos = Repos::new(db);
        tokio::spawn(run(repos, rx, online, buffered.clone(), metrics));

        Self { tx, buffered }
    }

    /// Queue a write. Failures here mean the consumer is gone; the op is
    /// dropped with a warning rather than surfaced to the caller.
    pub fn submit(&self, op: WriteOp) {
        if self.tx.send(SpoolCmd::Write(op)).is_err() {
            warn!("store spool closed, dropping write");
        }
    }

    /// Wait until every previously submitted op has been applied or
    /// buffered. Mostly useful in tests and at shutdown.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SpoolCmd::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Number of ops currently held waiting for connectivity.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }
}

struct Repos {
    sessions: SessionRepo,
    assessments: AssessmentRepo,
    interactions: InteractionRepo,
    emergencies: EmergencyRepo,
    safety_plans: SafetyPlanRepo,
}

impl Repos {
    fn new(db: Database) -> Self {
        Self {
            sessions: SessionRepo::new(db.clone()),
            assessments: AssessmentRepo::new(db.clone()),
            interactions: InteractionRepo::new(db.clone()),
            emergencies: EmergencyRepo::new(db.clone()),
            safety_plans: SafetyPlanRepo::new(db),
        }
    }
}

async fn run(
    repos: Repos,
    mut rx: mpsc::UnboundedReceiver<SpoolCmd>,
    mut online: watch::Receiver<bool>,
    buffered: Arc<AtomicUsize>,
    metrics: Option<Arc<MetricsRecorder>>,
) {
    let mut buffer: Vec<WriteOp> = Vec::new();
    let mut watch_alive = true;

    loop {
        let cmd = tokio::select! {
            changed = online.changed(), if watch_alive => {
                if changed.is_err() {
                    watch_alive = false;
                }
                None
            }
            cmd = rx.recv() => match cmd {
                Some(cmd) => Some(cmd),
                None => break,
            },
        };

        // Whatever woke us, drain the buffer first if we're back online.
        if !buffer.is_empty() && *online.borrow() {
            replay(&repos, &mut buffer, metrics.as_deref());
        }

        match cmd {
            Some(SpoolCmd::Write(op)) => {
                if *online.borrow() {
                    if let Err(e) = apply(&repos, &op) {
                        warn!(error = %e, "store write failed, buffering");
                        buffer.push(op);
                    }
                } else {
                    buffer.push(op);
                }
            }
            Some(SpoolCmd::Flush(ack)) => {
                let _ = ack.send(());
            }
            None => {}
        }

        buffered.store(buffer.len(), Ordering::Relaxed);
        if let Some(m) = &metrics {
            m.spool_depth(buffer.len());
        }
    }

    // Channel closed: one last replay attempt before giving up.
    if !buffer.is_empty() && *online.borrow() {
        replay(&repos, &mut buffer, metrics.as_deref());
    }
    if !buffer.is_empty() {
        warn!(dropped = buffer.len(), "store spool shutting down with unsynced writes");
    }
    buffered.store(buffer.len(), Ordering::Relaxed);
}

fn replay(repos: &Repos, buffer: &mut Vec<WriteOp>, metrics: Option<&MetricsRecorder>) {
    let pending = std::mem::take(buffer);
    let total = pending.len();
    for op in pending {
        if let Err(e) = apply(repos, &op) {
            warn!(error = %e, "replay failed, keeping buffered");
            buffer.push(op);
        }
    }
    let replayed = total - buffer.len();
    if let Some(m) = metrics {
        m.spool_replayed(replayed);
    }
    debug!(replayed, remaining = buffer.len(), "spool replay");
}

fn apply(repos: &Repos, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::CreateSession { id, user_id } => {
            repos.sessions.create(id, user_id).map(|_| ())
        }
        WriteOp::SessionState { id, state } => repos.sessions.update_state(id, *state),
        WriteOp::SessionPriority { id, priority } => {
            repos.sessions.update_priority(id, *priority)
        }
        WriteOp::AssignCounselor {
            id,
            counselor_id,
            fallback,
        } => repos.sessions.assign_counselor(id, counselor_id, *fallback),
        WriteOp::EndSession { id, reason } => repos.sessions.end(id, *reason),
        WriteOp::Interaction(message) => repos.interactions.append(message).map(|_| ()),
        WriteOp::Assessment {
            session_id,
            assessment,
        } => repos.assessments.append(session_id, assessment),
        WriteOp::Emergency(event) => repos.emergencies.record(event),
        WriteOp::SafetyPlan { user_id, plan } => repos.safety_plans.save(user_id, plan),
    }
}
