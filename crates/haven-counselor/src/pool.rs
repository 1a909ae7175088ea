use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use haven_core::counselor::{CounselorProfile, CounselorRef, CounselorStatus};
use haven_core::ids::CounselorId;
use haven_core::severity::Priority;

/// Shared counselor pool. Assignment and release both take the single
/// internal lock, so two concurrent assigns can never hand out the same
/// available counselor.
pub struct CounselorPool {
    inner: Mutex<PoolState>,
}

struct PoolState {
    roster: Vec<CounselorProfile>,
    status: HashMap<CounselorId, CounselorStatus>,
}

impl Default for CounselorPool {
    fn default() -> Self {
        Self::new(crate::directory::builtin_counselors())
    }
}

impl CounselorPool {
    pub fn new(roster: Vec<CounselorProfile>) -> Self {
        let status = roster
            .iter()
            .map(|c| (c.id.clone(), CounselorStatus::Available))
            .collect();
        Self {
            inner: Mutex::new(PoolState { roster, status }),
        }
    }

    /// Assign a counselor for a session at the given priority. Exhaustion
    /// never blocks: when nobody is available we fall back to the best
    /// match over the whole roster and flag the assignment.
    ///
    /// Returns `None` only for an empty roster.
    pub fn assign(&self, priority: Priority) -> Option<CounselorRef> {
        let mut state = self.inner.lock();

        let available: Vec<CounselorProfile> = state
            .roster
            .iter()
            .filter(|c| state.status.get(&c.id) == Some(&CounselorStatus::Available))
            .cloned()
            .collect();

        let (candidates, fallback) = if available.is_empty() {
            warn!(%priority, "counselor pool exhausted, assigning over capacity");
            (state.roster.clone(), true)
        } else {
            (available, false)
        };

        let chosen = select(priority, &candidates)?;
        state.status.insert(chosen.id.clone(), CounselorStatus::Busy);
        debug!(counselor_id = %chosen.id, %priority, fallback, "counselor assigned");

        Some(CounselorRef {
            profile: chosen,
            fallback,
        })
    }

    /// Return a counselor to the pool. Unknown ids are ignored.
    pub fn release(&self, id: &CounselorId) {
        let mut state = self.inner.lock();
        if let Some(status) = state.status.get_mut(id) {
            *status = CounselorStatus::Available;
            debug!(counselor_id = %id, "counselor released");
        }
    }

    pub fn set_status(&self, id: &CounselorId, status: CounselorStatus) {
        self.inner.lock().status.insert(id.clone(), status);
    }

    pub fn available_count(&self) -> usize {
        let state = self.inner.lock();
        state
            .status
            .values()
            .filter(|s| **s == CounselorStatus::Available)
            .count()
    }

    pub fn roster(&self) -> Vec<CounselorProfile> {
        self.inner.lock().roster.clone()
    }
}

/// Priority-driven selection. Critical sessions get the most experienced
/// counselor; high-priority sessions prefer crisis-suited personalities;
/// everything else optimizes response time. Ties break on id so repeated
/// runs pick the same counselor.
fn select(priority: Priority, candidates: &[CounselorProfile]) -> Option<CounselorProfile> {
    match priority {
        Priority::Critical => candidates
            .iter()
            .max_by(|a, b| {
                a.experience_years
                    .cmp(&b.experience_years)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .cloned(),
        Priority::High => {
            let preferred: Vec<&CounselorProfile> = candidates
                .iter()
                .filter(|c| c.personality.is_crisis_preferred())
                .collect();
            let pool: Vec<&CounselorProfile> = if preferred.is_empty() {
                candidates.iter().collect()
            } else {
                preferred
            };
            pool.into_iter()
                .min_by(|a, b| {
                    a.avg_response_secs
                        .cmp(&b.avg_response_secs)
                        .then_with(|| a.id.cmp(&b.id))
                })
                .cloned()
        }
        Priority::Low | Priority::Medium => candidates
            .iter()
            .min_by(|a, b| {
                a.avg_response_secs
                    .cmp(&b.avg_response_secs)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn critical_gets_most_experienced() {
        let pool = CounselorPool::default();
        let assigned = pool.assign(Priority::Critical).unwrap();
        let max_exp = pool
            .roster()
            .iter()
            .map(|c| c.experience_years)
            .max()
            .unwrap();
        assert_eq!(assigned.profile.experience_years, max_exp);
        assert!(!assigned.fallback);
    }

    #[test]
    fn high_prefers_crisis_suited_personality() {
        let pool = CounselorPool::default();
        let assigned = pool.assign(Priority::High).unwrap();
        assert!(assigned.profile.personality.is_crisis_preferred());
    }

    #[test]
    fn low_gets_fastest_responder() {
        let pool = CounselorPool::default();
        let assigned = pool.assign(Priority::Low).unwrap();
        let min_rt = pool
            .roster()
            .iter()
            .map(|c| c.avg_response_secs)
            .min()
            .unwrap();
        assert_eq!(assigned.profile.avg_response_secs, min_rt);
    }

    #[test]
    fn exhausted_pool_falls_back_instead_of_failing() {
        let pool = CounselorPool::default();
        let roster_len = pool.roster().len();

        let mut assigned = Vec::new();
        for _ in 0..roster_len {
            let a = pool.assign(Priority::Medium).unwrap();
            assert!(!a.fallback);
            assigned.push(a);
        }
        assert_eq!(pool.available_count(), 0);

        // One more than capacity: still assigned, flagged as fallback.
        let overflow = pool.assign(Priority::Critical).unwrap();
        assert!(overflow.fallback);
    }

    #[test]
    fn no_double_assignment_of_an_available_counselor() {
        let pool = CounselorPool::default();
        let a = pool.assign(Priority::Medium).unwrap();
        let b = pool.assign(Priority::Medium).unwrap();
        assert_ne!(a.profile.id, b.profile.id);
    }

    #[test]
    fn release_makes_counselor_assignable_again() {
        let pool = CounselorPool::default();
        let a = pool.assign(Priority::Low).unwrap();
        let before = pool.available_count();
        pool.release(&a.profile.id);
        assert_eq!(pool.available_count(), before + 1);

        let b = pool.assign(Priority::Low).unwrap();
        assert_eq!(a.profile.id, b.profile.id);
    }

    #[test]
    fn offline_counselors_are_skipped() {
        let pool = CounselorPool::default();
        let roster = pool.roster();
        for c in &roster[..roster.len() - 1] {
            pool.set_status(&c.id, CounselorStatus::Offline);
        }
        let only = roster.last().unwrap();
        let assigned = pool.assign(Priority::Critical).unwrap();
        assert_eq!(assigned.profile.id, only.id);
        assert!(!assigned.fallback);
    }

    #[test]
    fn concurrent_assigns_never_share_a_counselor() {
        let pool = Arc::new(CounselorPool::default());
        let roster_len = pool.roster().len();

        let handles: Vec<_> = (0..roster_len)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.assign(Priority::Medium).unwrap())
            })
            .collect();

        let mut ids: Vec<CounselorId> = handles
            .into_iter()
            .map(|h| h.join().unwrap().profile.id)
            .collect();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before, "a counselor was assigned twice");
    }
}
