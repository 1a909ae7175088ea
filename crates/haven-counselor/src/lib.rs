//! Counselor personas: the static directory, the shared assignment pool,
//! and the reply generator seam.

mod directory;
mod pool;
mod responder;

pub use directory::builtin_counselors;
pub use pool::CounselorPool;
pub use responder::{CounselorReply, CounselorResponder, MockResponder, PersonaResponder};
