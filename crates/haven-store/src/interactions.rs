use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use haven_core::ids::{MessageId, SessionId};
use haven_core::messages::SessionMessage;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A stored interaction: one session message plus its position in the
/// session transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractionRow {
    pub sequence: i64,
    pub message: SessionMessage,
}

/// Per-session append lock so transcript sequences are gapless even under
/// concurrent appends.
struct SessionLocks {
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    fn new() -> Self {
        Self {
            locks: HashMap::new(),
        }
    }

    fn get(&mut self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Append-only transcript store. Sequence numbers are assigned here, not
/// by callers; the order of rows is the order of arrival.
pub struct InteractionRepo {
    db: Database,
    session_locks: Mutex<SessionLocks>,
}

impl InteractionRepo {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            session_locks: Mutex::new(SessionLocks::new()),
        }
    }

    /// Append a message to its session transcript. Atomically:
    /// 1. Acquires per-session lock
    /// 2. Reads max sequence
    /// 3. Inserts with sequence = max + 1
    #[instrument(skip(self, message), fields(session_id = %message.session_id, kind = %message.kind))]
    pub fn append(&self, message: &SessionMessage) -> Result<InteractionRow, StoreError> {
        let lock = self
            .session_locks
            .lock()
            .get(message.session_id.as_str());
        let _guard = lock.lock();

        self.db.with_conn(|conn| {
            let max_seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sequence), -1) FROM interactions WHERE session_id = ?1",
                [message.session_id.as_str()],
                |row| row.get(0),
            )?;
            let sequence = max_seq + 1;

            conn.execute(
                "INSERT INTO interactions (id, session_id, sequence, sender_id, sender_role,
                                           kind, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    message.id.as_str(),
                    message.session_id.as_str(),
                    sequence,
                    message.sender_id,
                    message.sender_role.to_string(),
                    message.kind.to_string(),
                    message.content,
                    message.timestamp,
                ],
            )?;

            Ok(InteractionRow {
                sequence,
                message: message.clone(),
            })
        })
    }

    /// List a session transcript in sequence order.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list(
        &self,
        session_id: &SessionId,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<InteractionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let limit = limit.unwrap_or(1000);
            let offset = offset.unwrap_or(0);
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sequence, sender_id, sender_role, kind, content, timestamp
                 FROM interactions WHERE session_id = ?1
                 ORDER BY sequence ASC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let mut rows = stmt.query(rusqlite::params![session_id.as_str(), limit, offset])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_interaction(row)?);
            }
            Ok(results)
        })
    }

    /// List interactions after a given sequence, for clients catching up.
    #[instrument(skip(self), fields(session_id = %session_id, after_sequence))]
    pub fn list_after_sequence(
        &self,
        session_id: &SessionId,
        after_sequence: i64,
        limit: u32,
    ) -> Result<Vec<InteractionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sequence, sender_id, sender_role, kind, content, timestamp
                 FROM interactions WHERE session_id = ?1 AND sequence > ?2
                 ORDER BY sequence ASC
                 LIMIT ?3",
            )?;
            let mut rows =
                stmt.query(rusqlite::params![session_id.as_str(), after_sequence, limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_interaction(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn count(&self, session_id: &SessionId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM interactions WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?)
        })
    }
}

fn row_to_interaction(row: &rusqlite::Row<'_>) -> Result<InteractionRow, StoreError> {
    let role_str: String = row_helpers::get(row, 4, "interactions", "sender_role")?;
    let kind_str: String = row_helpers::get(row, 5, "interactions", "kind")?;

    Ok(InteractionRow {
        sequence: row_helpers::get(row, 2, "interactions", "sequence")?,
        message: SessionMessage {
            id: MessageId::from_raw(row_helpers::get::<String>(row, 0, "interactions", "id")?),
            session_id: SessionId::from_raw(row_helpers::get::<String>(
                row,
                1,
                "interactions",
                "session_id",
            )?),
            sender_id: row_helpers::get(row, 3, "interactions", "sender_id")?,
            sender_role: row_helpers::parse_enum(&role_str, "interactions", "sender_role")?,
            kind: row_helpers::parse_enum(&kind_str, "interactions", "kind")?,
            content: row_helpers::get(row, 6, "interactions", "content")?,
            timestamp: row_helpers::get(row, 7, "interactions", "timestamp")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionRepo;
    use haven_core::ids::UserId;
    use haven_core::messages::{MessageKind, SenderRole};

    fn setup() -> (Database, SessionId) {
        let db = Database::in_memory().unwrap();
        let sessions = SessionRepo::new(db.clone());
        let id = SessionId::new();
        sessions.create(&id, &UserId::from_raw("user_test")).unwrap();
        (db, id)
    }

    #[test]
    fn append_assigns_sequences_in_order() {
        let (db, sid) = setup();
        let repo = InteractionRepo::new(db);

        let r1 = repo.append(&SessionMessage::user(sid.clone(), "user_1", "first")).unwrap();
        let r2 = repo.append(&SessionMessage::system(sid.clone(), "assigned")).unwrap();
        let r3 = repo.append(&SessionMessage::user(sid.clone(), "user_1", "second")).unwrap();

        assert_eq!(r1.sequence, 0);
        assert_eq!(r2.sequence, 1);
        assert_eq!(r3.sequence, 2);
    }

    #[test]
    fn list_preserves_arrival_order() {
        let (db, sid) = setup();
        let repo = InteractionRepo::new(db);

        for i in 0..5 {
            repo.append(&SessionMessage::user(sid.clone(), "user_1", format!("msg {i}")))
                .unwrap();
        }

        let all = repo.list(&sid, None, None).unwrap();
        assert_eq!(all.len(), 5);
        for (i, row) in all.iter().enumerate() {
            assert_eq!(row.sequence, i as i64);
            assert_eq!(row.message.content, format!("msg {i}"));
        }
    }

    #[test]
    fn list_after_sequence() {
        let (db, sid) = setup();
        let repo = InteractionRepo::new(db);
        for i in 0..5 {
            repo.append(&SessionMessage::user(sid.clone(), "user_1", format!("{i}")))
                .unwrap();
        }
        let after_2 = repo.list_after_sequence(&sid, 2, 100).unwrap();
        assert_eq!(after_2.len(), 2);
        assert_eq!(after_2[0].sequence, 3);
        assert_eq!(after_2[1].sequence, 4);
    }

    #[test]
    fn crisis_alert_roundtrips() {
        let (db, sid) = setup();
        let repo = InteractionRepo::new(db);
        repo.append(&SessionMessage::crisis_alert(sid.clone(), "escalating now"))
            .unwrap();
        let all = repo.list(&sid, None, None).unwrap();
        assert_eq!(all[0].message.kind, MessageKind::CrisisAlert);
        assert_eq!(all[0].message.sender_role, SenderRole::System);
    }

    #[test]
    fn concurrent_appends_are_gapless() {
        let (db, sid) = setup();
        let repo = Arc::new(InteractionRepo::new(db));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let repo = repo.clone();
                let sid = sid.clone();
                std::thread::spawn(move || {
                    repo.append(&SessionMessage::user(sid, "user_1", format!("t{i}")))
                        .unwrap()
                })
            })
            .collect();

        let rows: Vec<InteractionRow> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut seqs: Vec<i64> = rows.iter().map(|r| r.sequence).collect();
        seqs.sort();
        assert_eq!(seqs, (0..10).collect::<Vec<i64>>());
    }

    #[test]
    fn count_tracks_appends() {
        let (db, sid) = setup();
        let repo = InteractionRepo::new(db);
        assert_eq!(repo.count(&sid).unwrap(), 0);
        repo.append(&SessionMessage::user(sid.clone(), "user_1", "hi"))
            .unwrap();
        assert_eq!(repo.count(&sid).unwrap(), 1);
    }
}
