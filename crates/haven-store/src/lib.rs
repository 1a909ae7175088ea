pub mod assessments;
pub mod database;
pub mod emergencies;
pub mod error;
pub mod interactions;
pub mod row_helpers;
pub mod safety_plans;
pub mod schema;
pub mod sessions;
pub mod spool;

pub use assessments::AssessmentRepo;
pub use database::Database;
pub use emergencies::EmergencyRepo;
pub use error::StoreError;
pub use interactions::{InteractionRepo, InteractionRow};
pub use safety_plans::{SafetyPlan, SafetyPlanRepo};
pub use sessions::{SessionRepo, SessionRow};
pub use spool::{StoreSpool, WriteOp};
