use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use haven_core::ids::{CounselorId, SessionId, UserId};
use haven_core::session::{EndReason, SessionState};
use haven_core::severity::Priority;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub user_id: UserId,
    pub counselor_id: Option<CounselorId>,
    pub counselor_fallback: bool,
    pub priority: Priority,
    pub state: SessionState,
    pub end_reason: Option<EndReason>,
    pub created_at: String,
    pub last_activity_at: String,
    pub ended_at: Option<String>,
}

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new queued session.
    #[instrument(skip(self), fields(session_id = %id, user_id = %user_id))]
    pub fn create(&self, id: &SessionId, user_id: &UserId) -> Result<SessionRow, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, priority, state, created_at, last_activity_at)
                 VALUES (?1, ?2, 'low', 'queued', ?3, ?3)",
                rusqlite::params![id.as_str(), user_id.as_str(), now],
            )?;

            Ok(SessionRow {
                id: id.clone(),
                user_id: user_id.clone(),
                counselor_id: None,
                counselor_fallback: false,
                priority: Priority::Low,
                state: SessionState::Queued,
                end_reason: None,
                created_at: now.clone(),
                last_activity_at: now,
                ended_at: None,
            })
        })
    }

    /// Get a session by ID.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, counselor_id, counselor_fallback, priority, state,
                        end_reason, created_at, last_activity_at, ended_at
                 FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// List sessions, newest first, optionally filtered by state.
    #[instrument(skip(self))]
    pub fn list(
        &self,
        state: Option<SessionState>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let (sql, params): (&str, Vec<String>) = match state {
                Some(s) => (
                    "SELECT id, user_id, counselor_id, counselor_fallback, priority, state,
                            end_reason, created_at, last_activity_at, ended_at
                     FROM sessions WHERE state = ?1
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                    vec![s.to_string(), limit.to_string(), offset.to_string()],
                ),
                None => (
                    "SELECT id, user_id, counselor_id, counselor_fallback, priority, state,
                            end_reason, created_at, last_activity_at, ended_at
                     FROM sessions
                     ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                    vec![limit.to_string(), offset.to_string()],
                ),
            };

            let mut stmt = conn.prepare(sql)?;
            let params_refs: Vec<&dyn rusqlite::types::ToSql> = params
                .iter()
                .map(|p| p as &dyn rusqlite::types::ToSql)
                .collect();
            let mut rows = stmt.query(params_refs.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }

    /// Update the lifecycle state.
    #[instrument(skip(self), fields(session_id = %session_id, state = %state))]
    pub fn update_state(
        &self,
        session_id: &SessionId,
        state: SessionState,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE sessions SET state = ?1, last_activity_at = ?2 WHERE id = ?3",
                rusqlite::params![state.to_string(), now, session_id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Update the priority high-water mark.
    #[instrument(skip(self), fields(session_id = %session_id, priority = %priority))]
    pub fn update_priority(
        &self,
        session_id: &SessionId,
        priority: Priority,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET priority = ?1 WHERE id = ?2",
                rusqlite::params![priority.to_string(), session_id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Record the counselor assignment.
    #[instrument(skip(self), fields(session_id = %session_id, counselor_id = %counselor_id))]
    pub fn assign_counselor(
        &self,
        session_id: &SessionId,
        counselor_id: &CounselorId,
        fallback: bool,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE sessions SET counselor_id = ?1, counselor_fallback = ?2,
                        state = 'assigned', last_activity_at = ?3
                 WHERE id = ?4",
                rusqlite::params![
                    counselor_id.as_str(),
                    fallback as i64,
                    now,
                    session_id.as_str()
                ],
            )?;
            Ok(())
        })
    }

    /// Mark a session ended.
    #[instrument(skip(self), fields(session_id = %session_id, reason = %reason))]
    pub fn end(&self, session_id: &SessionId, reason: EndReason) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE sessions SET state = 'ended', end_reason = ?1, ended_at = ?2,
                        last_activity_at = ?2
                 WHERE id = ?3",
                rusqlite::params![reason.to_string(), now, session_id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Bump the activity timestamp.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn touch(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE sessions SET last_activity_at = ?1 WHERE id = ?2",
                rusqlite::params![now, session_id.as_str()],
            )?;
            Ok(())
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let priority_str: String = row_helpers::get(row, 4, "sessions", "priority")?;
    let state_str: String = row_helpers::get(row, 5, "sessions", "state")?;
    let end_reason_str: Option<String> = row_helpers::get_opt(row, 6, "sessions", "end_reason")?;

    Ok(SessionRow {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "sessions", "user_id")?),
        counselor_id: row_helpers::get_opt::<String>(row, 2, "sessions", "counselor_id")?
            .map(CounselorId::from_raw),
        counselor_fallback: row_helpers::get::<i64>(row, 3, "sessions", "counselor_fallback")? != 0,
        priority: row_helpers::parse_enum(&priority_str, "sessions", "priority")?,
        state: row_helpers::parse_enum(&state_str, "sessions", "state")?,
        end_reason: end_reason_str
            .map(|s| row_helpers::parse_enum(&s, "sessions", "end_reason"))
            .transpose()?,
        created_at: row_helpers::get(row, 7, "sessions", "created_at")?,
        last_activity_at: row_helpers::get(row, 8, "sessions", "last_activity_at")?,
        ended_at: row_helpers::get_opt(row, 9, "sessions", "ended_at")?,
    })
}
