use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use haven_core::ids::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A user's personal safety plan. One per user; saving replaces the
/// previous version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyPlan {
    #[serde(default)]
    pub warning_signs: Vec<String>,
    #[serde(default)]
    pub coping_strategies: Vec<String>,
    #[serde(default)]
    pub support_contacts: Vec<String>,
    #[serde(default)]
    pub safe_environment_steps: Vec<String>,
}

pub struct SafetyPlanRepo {
    db: Database,
}

impl SafetyPlanRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace the plan for a user.
    #[instrument(skip(self, plan), fields(user_id = %user_id))]
    pub fn save(&self, user_id: &UserId, plan: &SafetyPlan) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO safety_plans (user_id, plan, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET plan = ?2, updated_at = ?3",
                rusqlite::params![user_id.as_str(), serde_json::to_string(plan)?, now],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn get(&self, user_id: &UserId) -> Result<Option<SafetyPlan>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT plan FROM safety_plans WHERE user_id = ?1")?;
            let mut rows = stmt.query([user_id.as_str()])?;
            match rows.next()? {
                Some(row) => {
                    let raw: String = row_helpers::get(row, 0, "safety_plans", "plan")?;
                    Ok(Some(row_helpers::parse_json(&raw, "safety_plans", "plan")?))
                }
                None => Ok(None),
            }
        })
    }
}
