//! Wire format for the web client.
//!
//! Internal event names use snake_case; the client expects colon-separated
//! names (`message:new`, `queue:update`, ...) and camelCase payload keys.
//! All translation lives here so the rest of the server stays clean.

use serde::Serialize;

use haven_core::events::SessionEvent;

/// Mapping of client camelCase param keys to snake_case equivalents.
const CAMEL_TO_SNAKE: &[(&str, &str)] = &[
    ("sessionId", "session_id"),
    ("userId", "user_id"),
    ("counselorId", "counselor_id"),
    ("safetyPlan", "safety_plan"),
    ("endReason", "end_reason"),
];

/// Normalize camelCase params to snake_case for the handlers.
/// If the snake_case key already exists, the existing value takes precedence.
pub fn normalize_params(params: &serde_json::Value) -> serde_json::Value {
    let Some(obj) = params.as_object() else {
        return params.clone();
    };
    let mut result = obj.clone();
    for &(camel, snake) in CAMEL_TO_SNAKE {
        if !result.contains_key(snake) {
            if let Some(val) = result.remove(camel) {
                result.insert(snake.to_string(), val);
            }
        } else {
            // snake_case already present, drop the camelCase duplicate
            result.remove(camel);
        }
    }
    serde_json::Value::Object(result)
}

/// Envelope for events pushed over the WebSocket:
/// `{ type, sessionId, timestamp, data }`.
#[derive(Debug, Serialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}

/// Map internal event type names to the client's colon-separated names.
pub fn wire_event_type(internal_type: &str) -> String {
    match internal_type {
        "message_new" => "message:new".into(),
        "typing_start" => "typing:start".into(),
        "typing_stop" => "typing:stop".into(),
        "queue_update" => "queue:update".into(),
        "counselor_assigned" => "counselor:assigned".into(),
        "crisis_escalated" => "crisis:escalated".into(),
        "escalation_dispatch_failed" => "escalation:dispatch_failed".into(),
        "session_ended" => "session:ended".into(),
        "connection_lost" => "connection:lost".into(),
        "connection_restored" => "connection:restored".into(),
        other => other.replace('_', ":"),
    }
}

fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Convert an internal session event to the client wire format.
pub fn session_event_to_wire(event: &SessionEvent) -> WireEvent {
    let event_type = wire_event_type(event.event_type());
    let session_id = event.session_id().to_string();
    let timestamp = now_iso8601();

    let data = match event {
        SessionEvent::MessageNew { message, .. } => serde_json::json!({
            "message": message,
        }),
        SessionEvent::TypingStart { counselor_id, .. }
        | SessionEvent::TypingStop { counselor_id, .. } => serde_json::json!({
            "counselorId": counselor_id.as_str(),
        }),
        SessionEvent::QueueUpdate {
            position,
            estimated_wait_secs,
            ..
        } => serde_json::json!({
            "position": position,
            "estimatedWaitSeconds": estimated_wait_secs,
        }),
        SessionEvent::CounselorAssigned {
            counselor, fallback, ..
        } => serde_json::json!({
            "counselor": counselor,
            "fallback": fallback,
        }),
        SessionEvent::CrisisEscalated { action, reason, .. } => serde_json::json!({
            "action": action.as_str(),
            "reason": reason,
        }),
        SessionEvent::EscalationDispatchFailed {
            action,
            instructions,
            ..
        } => serde_json::json!({
            "action": action.as_str(),
            "instructions": instructions,
        }),
        SessionEvent::SessionEnded { reason, .. } => serde_json::json!({
            "reason": reason,
        }),
        SessionEvent::ConnectionLost { .. } | SessionEvent::ConnectionRestored { .. } => {
            serde_json::json!({})
        }
    };

    WireEvent {
        event_type,
        session_id,
        timestamp,
        data,
    }
}
