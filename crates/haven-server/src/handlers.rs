//! RPC method handlers organized by domain.

use std::collections::BTreeMap;
use std::sync::Arc;

use haven_core::ids::{SessionId, UserId};
use haven_core::session::{EndReason, SessionState};
use haven_core::severity::Priority;
use haven_engine::{EngineError, SessionSnapshot};
use haven_resources::ResourceCatalog;
use haven_store::{Database, InteractionRepo, SafetyPlan, SafetyPlanRepo, SessionRepo, SessionRow};
use haven_telemetry::TelemetryGuard;

use crate::connectivity::Connectivity;
use crate::rpc::{self, RpcResponse};
use crate::service::CrisisService;
use crate::wire;

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub db: Database,
    pub catalog: Arc<ResourceCatalog>,
    pub service: Option<Arc<dyn CrisisService>>,
    pub telemetry: Option<Arc<TelemetryGuard>>,
    pub connectivity: Option<Arc<Connectivity>>,
}

impl HandlerState {
    pub fn new(db: Database, catalog: Arc<ResourceCatalog>) -> Self {
        Self {
            db,
            catalog,
            service: None,
            telemetry: None,
            connectivity: None,
        }
    }

    pub fn with_service(mut self, service: Arc<dyn CrisisService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryGuard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }
}

/// Dispatch an RPC method to the appropriate handler.
///
/// Normalizes camelCase params to snake_case before routing, so all
/// handlers receive consistent snake_case keys.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params = wire::normalize_params(params);

    match method {
        // Session lifecycle (engine-dependent)
        "session.create" => session_create(state, &params, id).await,
        "session.end" => session_end(state, &params, id),
        "session.get" => session_get(state, &params, id).await,
        "session.list" => session_list(state, &params, id),
        "session.acknowledgeEscalation" => session_acknowledge(state, &params, id),

        // Conversation
        "message.submit" => message_submit(state, &params, id),
        "assessment.submit" => assessment_submit(state, &params, id),

        // Resources (offline set, always answerable)
        "resources.immediate" => resources_immediate(state, id),
        "resources.emergencyContacts" => resources_emergency_contacts(state, id),
        "resources.search" => resources_search(state, &params, id),

        // Safety plan
        "safetyPlan.get" => safety_plan_get(state, &params, id),
        "safetyPlan.save" => safety_plan_save(state, &params, id),

        // Transcript
        "events.list" => events_list(state, &params, id),

        // Telemetry
        "telemetry.logs" => telemetry_logs(state, &params, id),
        "telemetry.metrics" => telemetry_metrics(state, &params, id),

        // System
        "system.connectivity" => system_connectivity(state, &params, id),
        "system.ping" | "health" => health(state, id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

fn engine_error_response(id: Option<serde_json::Value>, err: &EngineError) -> RpcResponse {
    let code = match err {
        EngineError::SessionNotFound(_) => rpc::NOT_FOUND,
        EngineError::SessionEnded(_) => rpc::SESSION_ENDED,
        _ => rpc::INTERNAL_ERROR,
    };
    RpcResponse::error(id, code, err.to_string())
}

/// A live-session miss may mean the session ended and its actor is gone.
/// The store still knows; report SESSION_ENDED for those instead of
/// NOT_FOUND so late submissions get the right rejection.
fn submit_error_response(
    state: &Arc<HandlerState>,
    session_id: &SessionId,
    id: Option<serde_json::Value>,
    err: &EngineError,
) -> RpcResponse {
    if matches!(err, EngineError::SessionNotFound(_)) {
        let repo = SessionRepo::new(state.db.clone());
        if let Ok(row) = repo.get(session_id) {
            if row.state == SessionState::Ended {
                return RpcResponse::error(
                    id,
                    rpc::SESSION_ENDED,
                    format!("session {session_id} has ended"),
                );
            }
        }
    }
    engine_error_response(id, err)
}

fn snapshot_response(s: &SessionSnapshot) -> serde_json::Value {
    serde_json::json!({
        "sessionId": s.id.as_str(),
        "userId": s.user_id.as_str(),
        "state": s.state.to_string(),
        "priority": s.priority.to_string(),
        "counselor": s.counselor,
        "messageCount": s.message_count,
        "createdAt": s.created_at,
        "lastActivityAt": s.last_activity_at,
    })
}

fn session_row_response(row: &SessionRow) -> serde_json::Value {
    serde_json::json!({
        "sessionId": row.id.as_str(),
        "userId": row.user_id.as_str(),
        "state": row.state.to_string(),
        "priority": row.priority.to_string(),
        "counselorId": row.counselor_id.as_ref().map(|c| c.as_str()),
        "counselorFallback": row.counselor_fallback,
        "endReason": row.end_reason.as_ref().map(|r| r.to_string()),
        "createdAt": row.created_at,
        "lastActivityAt": row.last_activity_at,
        "endedAt": row.ended_at,
    })
}

// ── Session handlers ──

async fn session_create(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(ref service) = state.service else {
        return RpcResponse::internal_error(id, "Session engine not configured");
    };

    let user_id = match rpc::optional_str(params, "user_id") {
        Some(raw) => UserId::from_raw(raw),
        None => UserId::new(),
    };

    let priority = match rpc::optional_str(params, "priority") {
        Some(raw) => match raw.parse::<Priority>() {
            Ok(p) => p,
            Err(e) => return RpcResponse::invalid_params(id, e),
        },
        None => Priority::Low,
    };

    match service.create_session(user_id.clone(), priority).await {
        Ok(session_id) => RpcResponse::success(
            id,
            serde_json::json!({
                "sessionId": session_id.as_str(),
                "userId": user_id.as_str(),
                "priority": priority.to_string(),
            }),
        ),
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

fn session_end(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(ref service) = state.service else {
        return RpcResponse::internal_error(id, "Session engine not configured");
    };

    let session_id = match rpc::require_str(params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let reason = match rpc::optional_str(params, "reason") {
        Some(raw) => match raw.parse::<EndReason>() {
            Ok(r) => r,
            Err(e) => return RpcResponse::invalid_params(id, e),
        },
        None => EndReason::UserEnded,
    };

    match service.end_session(&session_id, reason) {
        Ok(()) => RpcResponse::success(id, serde_json::json!({"ended": true})),
        Err(e) => submit_error_response(state, &session_id, id, &e),
    }
}

async fn session_get(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let session_id = match rpc::require_str(params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    // Live actor first; ended sessions come from the store.
    if let Some(ref service) = state.service {
        if let Ok(snapshot) = service.snapshot(&session_id).await {
            return RpcResponse::success(id, snapshot_response(&snapshot));
        }
    }

    let repo = SessionRepo::new(state.db.clone());
    match repo.get(&session_id) {
        Ok(row) => RpcResponse::success(id, session_row_response(&row)),
        Err(e) => RpcResponse::error(id, rpc::NOT_FOUND, e.to_string()),
    }
}

fn session_list(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let filter = match rpc::optional_str(params, "state") {
        Some(raw) => match raw.parse::<SessionState>() {
            Ok(s) => Some(s),
            Err(e) => return RpcResponse::invalid_params(id, e),
        },
        None => None,
    };
    let limit = rpc::optional_i64(params, "limit").unwrap_or(50) as u32;
    let offset = rpc::optional_i64(params, "offset").unwrap_or(0) as u32;

    let repo = SessionRepo::new(state.db.clone());
    match repo.list(filter, limit, offset) {
        Ok(rows) => {
            let sessions: Vec<serde_json::Value> = rows.iter().map(session_row_response).collect();
            let count = sessions.len();
            RpcResponse::success(
                id,
                serde_json::json!({
                    "sessions": sessions,
                    "totalCount": count,
                }),
            )
        }
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

fn session_acknowledge(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(ref service) = state.service else {
        return RpcResponse::internal_error(id, "Session engine not configured");
    };

    let session_id = match rpc::require_str(params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match service.acknowledge_escalation(&session_id) {
        Ok(()) => RpcResponse::success(id, serde_json::json!({"acknowledged": true})),
        Err(e) => submit_error_response(state, &session_id, id, &e),
    }
}

// ── Conversation handlers ──

fn message_submit(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(ref service) = state.service else {
        return RpcResponse::internal_error(id, "Session engine not configured");
    };

    let session_id = match rpc::require_str(params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let content = match rpc::require_str(params, "content") {
        Ok(c) => c,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match service.submit_message(&session_id, content) {
        Ok(()) => RpcResponse::success(id, serde_json::json!({"accepted": true})),
        Err(e) => submit_error_response(state, &session_id, id, &e),
    }
}

fn assessment_submit(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(ref service) = state.service else {
        return RpcResponse::internal_error(id, "Session engine not configured");
    };

    let session_id = match rpc::require_str(params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let Some(raw) = params.get("answers").and_then(|v| v.as_object()) else {
        return RpcResponse::invalid_params(id, "Missing required parameter: answers");
    };

    let mut answers = BTreeMap::new();
    for (key, value) in raw {
        let Some(n) = value.as_i64() else {
            return RpcResponse::invalid_params(
                id,
                format!("Answer for {key} must be an integer"),
            );
        };
        answers.insert(key.clone(), n);
    }

    match service.submit_answers(&session_id, answers) {
        Ok(()) => RpcResponse::success(id, serde_json::json!({"accepted": true})),
        Err(e) => submit_error_response(state, &session_id, id, &e),
    }
}

// ── Resource handlers ──

fn resources_immediate(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let resources = state.catalog.immediate();
    let count = resources.len();
    RpcResponse::success(
        id,
        serde_json::json!({
            "resources": resources,
            "totalCount": count,
            "offlineAvailable": state.catalog.is_available_offline(),
        }),
    )
}

fn resources_emergency_contacts(
    state: &Arc<HandlerState>,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let contacts = state.catalog.emergency_contacts();
    let count = contacts.len();
    RpcResponse::success(
        id,
        serde_json::json!({
            "contacts": contacts,
            "totalCount": count,
        }),
    )
}

fn resources_search(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let query = match rpc::require_str(params, "query") {
        Ok(q) => q,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let results = state.catalog.search(query);
    let count = results.len();
    RpcResponse::success(
        id,
        serde_json::json!({
            "resources": results,
            "totalCount": count,
        }),
    )
}

// ── Safety plan handlers ──

fn safety_plan_get(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let user_id = match rpc::require_str(params, "user_id") {
        Ok(u) => UserId::from_raw(u),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let repo = SafetyPlanRepo::new(state.db.clone());
    match repo.get(&user_id) {
        Ok(Some(plan)) => RpcResponse::success(
            id,
            serde_json::json!({"plan": plan, "exists": true}),
        ),
        Ok(None) => RpcResponse::success(
            id,
            serde_json::json!({"plan": SafetyPlan::default(), "exists": false}),
        ),
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

fn safety_plan_save(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let user_id = match rpc::require_str(params, "user_id") {
        Ok(u) => UserId::from_raw(u),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let Some(raw) = params.get("plan").or_else(|| params.get("safety_plan")) else {
        return RpcResponse::invalid_params(id, "Missing required parameter: plan");
    };

    let plan: SafetyPlan = match serde_json::from_value(raw.clone()) {
        Ok(p) => p,
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid plan: {e}")),
    };

    let repo = SafetyPlanRepo::new(state.db.clone());
    match repo.save(&user_id, &plan) {
        Ok(()) => RpcResponse::success(id, serde_json::json!({"saved": true})),
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

// ── Transcript handlers ──

fn events_list(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let session_id = match rpc::require_str(params, "session_id") {
        Ok(s) => SessionId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let limit = rpc::optional_i64(params, "limit").map(|v| v as u32);
    let offset = rpc::optional_i64(params, "offset").map(|v| v as u32);

    let repo = InteractionRepo::new(state.db.clone());
    match repo.list(&session_id, limit, offset) {
        Ok(rows) => {
            let count = rows.len();
            RpcResponse::success(
                id,
                serde_json::json!({
                    "events": rows,
                    "totalCount": count,
                }),
            )
        }
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

// ── Telemetry handlers ──

fn telemetry_logs(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(log_sink) = state.telemetry.as_ref().and_then(|t| t.logs()) else {
        return RpcResponse::success(
            id,
            serde_json::json!({
                "logs": [],
                "totalCount": 0,
                "enabled": false,
            }),
        );
    };

    let query = haven_telemetry::LogQuery {
        level: rpc::optional_str(params, "level").map(|l| l.to_uppercase()),
        target: rpc::optional_str(params, "target").map(|s| s.to_string()),
        session_id: rpc::optional_str(params, "session_id").map(|s| s.to_string()),
        since: rpc::optional_str(params, "since").map(|s| s.to_string()),
        limit: rpc::optional_i64(params, "limit").map(|v| v as u32),
    };

    match log_sink.query(&query) {
        Ok(records) => {
            let count = records.len();
            RpcResponse::success(
                id,
                serde_json::json!({
                    "logs": records,
                    "totalCount": count,
                    "enabled": true,
                }),
            )
        }
        Err(e) => RpcResponse::internal_error(id, format!("Failed to query logs: {e}")),
    }
}

fn telemetry_metrics(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(metrics) = state.telemetry.as_ref().and_then(|t| t.metrics()) else {
        return RpcResponse::success(
            id,
            serde_json::json!({
                "metrics": [],
                "totalCount": 0,
                "enabled": false,
            }),
        );
    };

    let query = haven_telemetry::MetricsQuery {
        name: rpc::optional_str(params, "name").map(|s| s.to_string()),
        since: rpc::optional_str(params, "since").map(|s| s.to_string()),
        limit: rpc::optional_i64(params, "limit").map(|v| v as u32),
    };

    match metrics.query(&query) {
        Ok(snapshots) => {
            let count = snapshots.len();
            RpcResponse::success(
                id,
                serde_json::json!({
                    "metrics": snapshots,
                    "totalCount": count,
                    "enabled": true,
                }),
            )
        }
        Err(e) => RpcResponse::internal_error(id, format!("Failed to query metrics: {e}")),
    }
}

// ── System ──

/// Flip the store connectivity signal. The spool reacts through the
/// shared watch channel; live sessions hear about it through the service.
fn system_connectivity(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(ref connectivity) = state.connectivity else {
        return RpcResponse::internal_error(id, "Connectivity control not configured");
    };

    let Some(online) = params.get("online").and_then(|v| v.as_bool()) else {
        return RpcResponse::invalid_params(id, "Missing required parameter: online");
    };

    let changed = connectivity.set_online(online);
    if changed {
        if let Some(ref service) = state.service {
            service.notify_connectivity(online);
        }
    }

    RpcResponse::success(
        id,
        serde_json::json!({"online": online, "changed": changed}),
    )
}

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let db_ok = state
        .db
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);
    let resources_ok = state.catalog.is_available_offline();
    // Without a connectivity signal the store is assumed reachable.
    let store_online = state
        .connectivity
        .as_ref()
        .map(|c| c.is_online())
        .unwrap_or(true);
    let active_sessions = state
        .service
        .as_ref()
        .map(|s| s.active_count())
        .unwrap_or(0);

    RpcResponse::success(
        id,
        serde_json::json!({
            "status": if db_ok && resources_ok && store_online { "healthy" } else { "degraded" },
            "activeSessions": active_sessions,
            "components": {
                "database": if db_ok { "ok" } else { "error" },
                "resources": if resources_ok { "ok" } else { "error" },
                "store": if store_online { "ok" } else { "offline" },
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::MockService;

    fn setup() -> Arc<HandlerState> {
        let db = Database::in_memory().unwrap();
        Arc::new(HandlerState::new(db, Arc::new(ResourceCatalog::new())))
    }

    fn setup_with_service(service: MockService) -> Arc<HandlerState> {
        let db = Database::in_memory().unwrap();
        Arc::new(
            HandlerState::new(db, Arc::new(ResourceCatalog::new()))
                .with_service(Arc::new(service)),
        )
    }

    #[tokio::test]
    async fn dispatch_unknown_method() {
        let state = setup();
        let resp = dispatch(
            &state,
            "foo.bar",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert!(resp.error.is_some());
        assert_eq!(resp.error.as_ref().unwrap().code, "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn session_create_returns_ids() {
        let state = setup_with_service(MockService::new());
        let resp = dispatch(
            &state,
            "session.create",
            &serde_json::json!({"user_id": "user_demo"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["sessionId"], "sess_mock");
        assert_eq!(result["userId"], "user_demo");
        assert_eq!(result["priority"], "low");
    }

    #[tokio::test]
    async fn session_create_rejects_bad_priority() {
        let state = setup_with_service(MockService::new());
        let resp = dispatch(
            &state,
            "session.create",
            &serde_json::json!({"priority": "urgent"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn session_create_without_engine_errors() {
        let state = setup();
        let resp = dispatch(
            &state,
            "session.create",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn camel_case_params_accepted() {
        let state = setup_with_service(MockService::new());
        let resp = dispatch(
            &state,
            "message.submit",
            &serde_json::json!({"sessionId": "sess_1", "content": "hello"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["accepted"], true);
    }

    #[tokio::test]
    async fn message_submit_requires_content() {
        let state = setup_with_service(MockService::new());
        let resp = dispatch(
            &state,
            "message.submit",
            &serde_json::json!({"session_id": "sess_1"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn message_submit_to_ended_session() {
        let state = setup_with_service(MockService::failing("sess_gone"));
        let resp = dispatch(
            &state,
            "message.submit",
            &serde_json::json!({"session_id": "sess_gone", "content": "too late"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "SESSION_ENDED");
    }

    #[tokio::test]
    async fn message_submit_maps_stale_handle_to_session_ended() {
        // Actor handle is gone but the store remembers the ended session.
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db.clone());
        let sid = SessionId::from_raw("sess_stale");
        repo.create(&sid, &UserId::from_raw("user_1")).unwrap();
        repo.end(&sid, EndReason::InactivityTimeout).unwrap();

        let state = Arc::new(
            HandlerState::new(db, Arc::new(ResourceCatalog::new()))
                .with_service(Arc::new(MockServiceNotFound)),
        );
        let resp = dispatch(
            &state,
            "message.submit",
            &serde_json::json!({"session_id": "sess_stale", "content": "hello?"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "SESSION_ENDED");
    }

    /// Service that knows no sessions at all.
    struct MockServiceNotFound;

    #[async_trait::async_trait]
    impl CrisisService for MockServiceNotFound {
        async fn create_session(
            &self,
            _user_id: UserId,
            _priority: Priority,
        ) -> Result<SessionId, EngineError> {
            Ok(SessionId::new())
        }
        fn submit_message(&self, session_id: &SessionId, _text: &str) -> Result<(), EngineError> {
            Err(EngineError::SessionNotFound(session_id.as_str().to_string()))
        }
        fn submit_answers(
            &self,
            session_id: &SessionId,
            _answers: BTreeMap<String, i64>,
        ) -> Result<(), EngineError> {
            Err(EngineError::SessionNotFound(session_id.as_str().to_string()))
        }
        fn acknowledge_escalation(&self, session_id: &SessionId) -> Result<(), EngineError> {
            Err(EngineError::SessionNotFound(session_id.as_str().to_string()))
        }
        fn end_session(
            &self,
            session_id: &SessionId,
            _reason: EndReason,
        ) -> Result<(), EngineError> {
            Err(EngineError::SessionNotFound(session_id.as_str().to_string()))
        }
        async fn snapshot(&self, session_id: &SessionId) -> Result<SessionSnapshot, EngineError> {
            Err(EngineError::SessionNotFound(session_id.as_str().to_string()))
        }
        fn active_count(&self) -> usize {
            0
        }
        fn notify_connectivity(&self, _online: bool) {}
    }

    #[tokio::test]
    async fn assessment_submit_validates_answers() {
        let state = setup_with_service(MockService::new());
        let resp = dispatch(
            &state,
            "assessment.submit",
            &serde_json::json!({"session_id": "sess_1", "answers": {"safety": "yes"}}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");

        let resp = dispatch(
            &state,
            "assessment.submit",
            &serde_json::json!({"session_id": "sess_1", "answers": {"safety": 1}}),
            Some(serde_json::json!(2)),
        )
        .await;
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn session_get_falls_back_to_store() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db.clone());
        let sid = SessionId::from_raw("sess_hist");
        repo.create(&sid, &UserId::from_raw("user_1")).unwrap();
        repo.end(&sid, EndReason::UserEnded).unwrap();

        let state = Arc::new(HandlerState::new(db, Arc::new(ResourceCatalog::new())));
        let resp = dispatch(
            &state,
            "session.get",
            &serde_json::json!({"session_id": "sess_hist"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["sessionId"], "sess_hist");
        assert_eq!(result["state"], "ended");
        assert_eq!(result["endReason"], "user_ended");
    }

    #[tokio::test]
    async fn session_get_unknown_is_not_found() {
        let state = setup();
        let resp = dispatch(
            &state,
            "session.get",
            &serde_json::json!({"session_id": "sess_nope"}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn session_list_filters_by_state() {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db.clone());
        let open = SessionId::from_raw("sess_open");
        let done = SessionId::from_raw("sess_done");
        repo.create(&open, &UserId::from_raw("user_1")).unwrap();
        repo.create(&done, &UserId::from_raw("user_2")).unwrap();
        repo.end(&done, EndReason::UserEnded).unwrap();

        let state = Arc::new(HandlerState::new(db, Arc::new(ResourceCatalog::new())));
        let resp = dispatch(
            &state,
            "session.list",
            &serde_json::json!({"state": "ended"}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["totalCount"], 1);
        assert_eq!(result["sessions"][0]["sessionId"], "sess_done");
    }

    #[tokio::test]
    async fn resources_immediate_always_answers() {
        let state = setup();
        let resp = dispatch(
            &state,
            "resources.immediate",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["offlineAvailable"], true);
        assert!(result["totalCount"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn resources_emergency_contacts_include_hotlines() {
        let state = setup();
        let resp = dispatch(
            &state,
            "resources.emergencyContacts",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        let json = serde_json::to_string(&resp.result.unwrap()).unwrap();
        assert!(json.contains("988"));
        assert!(json.contains("911"));
    }

    #[tokio::test]
    async fn resources_search_requires_query() {
        let state = setup();
        let resp = dispatch(
            &state,
            "resources.search",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn safety_plan_roundtrip() {
        let state = setup();
        let resp = dispatch(
            &state,
            "safetyPlan.save",
            &serde_json::json!({
                "userId": "user_1",
                "plan": {
                    "warning_signs": ["isolating"],
                    "coping_strategies": ["box breathing"],
                },
            }),
            Some(serde_json::json!(1)),
        )
        .await;
        assert!(resp.error.is_none());

        let resp = dispatch(
            &state,
            "safetyPlan.get",
            &serde_json::json!({"user_id": "user_1"}),
            Some(serde_json::json!(2)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["exists"], true);
        assert_eq!(result["plan"]["warning_signs"][0], "isolating");
    }

    #[tokio::test]
    async fn safety_plan_get_missing_user() {
        let state = setup();
        let resp = dispatch(
            &state,
            "safetyPlan.get",
            &serde_json::json!({"user_id": "user_unknown"}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["exists"], false);
    }

    #[tokio::test]
    async fn events_list_returns_transcript() {
        use haven_core::messages::SessionMessage;

        let db = Database::in_memory().unwrap();
        let sid = SessionId::from_raw("sess_t");
        SessionRepo::new(db.clone())
            .create(&sid, &UserId::from_raw("user_1"))
            .unwrap();
        let interactions = InteractionRepo::new(db.clone());
        interactions
            .append(&SessionMessage::user(sid.clone(), "user_1", "first"))
            .unwrap();
        interactions
            .append(&SessionMessage::user(sid.clone(), "user_1", "second"))
            .unwrap();

        let state = Arc::new(HandlerState::new(db, Arc::new(ResourceCatalog::new())));
        let resp = dispatch(
            &state,
            "events.list",
            &serde_json::json!({"session_id": "sess_t"}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["totalCount"], 2);
        assert_eq!(result["events"][0]["sequence"], 0);
        assert_eq!(result["events"][0]["message"]["content"], "first");
    }

    #[tokio::test]
    async fn telemetry_disabled_reports_empty() {
        let state = setup();
        for method in &["telemetry.logs", "telemetry.metrics"] {
            let resp = dispatch(
                &state,
                method,
                &serde_json::json!({}),
                Some(serde_json::json!(1)),
            )
            .await;
            assert!(resp.error.is_none(), "method {method} should not error");
            assert_eq!(resp.result.unwrap()["enabled"], false);
        }
    }

    #[tokio::test]
    async fn connectivity_toggle_notifies_sessions() {
        let (online_tx, _online_rx) = tokio::sync::watch::channel(true);
        let service = Arc::new(MockService::new());
        let db = Database::in_memory().unwrap();
        let state = Arc::new(
            HandlerState::new(db, Arc::new(ResourceCatalog::new()))
                .with_service(Arc::clone(&service) as Arc<dyn CrisisService>)
                .with_connectivity(Arc::new(Connectivity::new(online_tx))),
        );

        let resp = dispatch(
            &state,
            "system.connectivity",
            &serde_json::json!({"online": false}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["online"], false);
        assert_eq!(result["changed"], true);
        assert_eq!(*service.connectivity.lock().unwrap(), vec![false]);

        // Repeating the same state is a no-op and does not re-notify
        let resp = dispatch(
            &state,
            "system.connectivity",
            &serde_json::json!({"online": false}),
            Some(serde_json::json!(2)),
        )
        .await;
        assert_eq!(resp.result.unwrap()["changed"], false);
        assert_eq!(*service.connectivity.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn connectivity_requires_online_flag() {
        let (online_tx, _online_rx) = tokio::sync::watch::channel(true);
        let db = Database::in_memory().unwrap();
        let state = Arc::new(
            HandlerState::new(db, Arc::new(ResourceCatalog::new()))
                .with_connectivity(Arc::new(Connectivity::new(online_tx))),
        );

        let resp = dispatch(
            &state,
            "system.connectivity",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn health_degrades_when_store_offline() {
        let (online_tx, _online_rx) = tokio::sync::watch::channel(true);
        let connectivity = Arc::new(Connectivity::new(online_tx));
        let db = Database::in_memory().unwrap();
        let state = Arc::new(
            HandlerState::new(db, Arc::new(ResourceCatalog::new()))
                .with_connectivity(Arc::clone(&connectivity)),
        );

        connectivity.set_online(false);
        let resp = dispatch(
            &state,
            "health",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "degraded");
        assert_eq!(result["components"]["store"], "offline");
    }

    #[tokio::test]
    async fn health_reports_components() {
        let state = setup_with_service(MockService::new());
        let resp = dispatch(
            &state,
            "system.ping",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "healthy");
        assert_eq!(result["components"]["database"], "ok");
        assert_eq!(result["components"]["resources"], "ok");
    }
}
