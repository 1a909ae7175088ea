use tracing::instrument;

use haven_core::emergency::EmergencyEvent;
use haven_core::ids::{EmergencyId, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Append-only record of fired escalations.
pub struct EmergencyRepo {
    db: Database,
}

impl EmergencyRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, event), fields(session_id = %event.session_id, action = %event.action))]
    pub fn record(&self, event: &EmergencyEvent) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO emergencies (id, session_id, action, trigger, deduped, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    event.id.as_str(),
                    event.session_id.as_str(),
                    event.action.as_str(),
                    event.trigger,
                    event.deduped as i64,
                    event.timestamp,
                ],
            )?;
            Ok(())
        })
    }

    /// List escalations for a session, oldest first.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list(&self, session_id: &SessionId) -> Result<Vec<EmergencyEvent>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, action, trigger, deduped, timestamp
                 FROM emergencies WHERE session_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_emergency(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn count(&self, session_id: &SessionId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM emergencies WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?)
        })
    }
}

fn row_to_emergency(row: &rusqlite::Row<'_>) -> Result<EmergencyEvent, StoreError> {
    let action_str: String = row_helpers::get(row, 2, "emergencies", "action")?;

    Ok(EmergencyEvent {
        id: EmergencyId::from_raw(row_helpers::get::<String>(row, 0, "emergencies", "id")?),
        session_id: SessionId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "emergencies",
            "session_id",
        )?),
        action: row_helpers::parse_enum(&action_str, "emergencies", "action")?,
        trigger: row_helpers::get(row, 3, "emergencies", "trigger")?,
        deduped: row_helpers::get::<i64>(row, 4, "emergencies", "deduped")? != 0,
        timestamp: row_helpers::get(row, 5, "emergencies", "timestamp")?,
    })
}
