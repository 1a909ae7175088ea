use std::collections::BTreeSet;

use tracing::instrument;

use haven_core::assessment::RiskAssessment;
use haven_core::ids::{AssessmentId, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Append-only store of risk assessments. Rows are never updated or
/// deleted; trend queries read them back in scoring order.
pub struct AssessmentRepo {
    db: Database,
}

impl AssessmentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, assessment), fields(session_id = %session_id, level = %assessment.level))]
    pub fn append(
        &self,
        session_id: &SessionId,
        assessment: &RiskAssessment,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO assessments (id, session_id, level, confidence, indicators,
                                          source_text_length, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    assessment.id.as_str(),
                    session_id.as_str(),
                    assessment.level.as_str(),
                    assessment.confidence,
                    serde_json::to_string(&assessment.indicators)?,
                    assessment.source_text_length as i64,
                    assessment.timestamp,
                ],
            )?;
            Ok(())
        })
    }

    /// List assessments for a session in scoring order.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list(&self, session_id: &SessionId) -> Result<Vec<RiskAssessment>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, confidence, indicators, source_text_length, timestamp
                 FROM assessments WHERE session_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_assessment(row)?);
            }
            Ok(results)
        })
    }

    /// The most recent assessment for a session, if any.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn latest(&self, session_id: &SessionId) -> Result<Option<RiskAssessment>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, confidence, indicators, source_text_length, timestamp
                 FROM assessments WHERE session_id = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_assessment(row)?)),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn count(&self, session_id: &SessionId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM assessments WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?)
        })
    }
}

fn row_to_assessment(row: &rusqlite::Row<'_>) -> Result<RiskAssessment, StoreError> {
    let level_str: String = row_helpers::get(row, 1, "assessments", "level")?;
    let indicators_str: String = row_helpers::get(row, 3, "assessments", "indicators")?;
    let indicators: BTreeSet<String> =
        row_helpers::parse_json(&indicators_str, "assessments", "indicators")?;

    Ok(RiskAssessment {
        id: AssessmentId::from_raw(row_helpers::get::<String>(row, 0, "assessments", "id")?),
        level: row_helpers::parse_enum(&level_str, "assessments", "level")?,
        confidence: row_helpers::get(row, 2, "assessments", "confidence")?,
        indicators,
        source_text_length: row_helpers::get::<i64>(row, 4, "assessments", "source_text_length")?
            as usize,
        timestamp: row_helpers::get(row, 5, "assessments", "timestamp")?,
    })
}
