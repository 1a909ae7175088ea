pub mod assessment;
pub mod clock;
pub mod counselor;
pub mod emergency;
pub mod events;
pub mod ids;
pub mod messages;
pub mod session;
pub mod severity;
