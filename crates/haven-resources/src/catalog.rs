use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use haven_core::severity::Severity;

use crate::builtin;

/// Contact type, in escalation order. Sorting for contact lists puts
/// `Emergency` first within an availability band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Emergency,
    CrisisLine,
    Professional,
    Personal,
    Technique,
}

/// One support resource: a hotline, text line, professional service or
/// self-help technique.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    pub contact: Option<String>,
    pub description: String,
    pub available_24_7: bool,
    /// Minimum urgency at which this resource is surfaced.
    pub urgency: Severity,
}

/// Catalog of support resources. The critical set is compiled into the
/// binary, so it is reachable with zero network and zero prior cache.
/// User-added resources merge in but can never shadow or remove a
/// critical-set entry.
pub struct ResourceCatalog {
    critical: Vec<Resource>,
    custom: RwLock<HashMap<String, Resource>>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self {
            critical: builtin::critical_resources(),
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// The critical set ships in the artifact itself; no network, no cache.
    pub fn is_available_offline(&self) -> bool {
        !self.critical.is_empty()
    }

    /// Add or replace a custom resource. Rejected if the id collides with a
    /// critical-set entry.
    pub fn add_custom(&self, resource: Resource) -> bool {
        if self.critical.iter().any(|r| r.id == resource.id) {
            tracing::warn!(id = %resource.id, "custom resource shadows critical set, rejected");
            return false;
        }
        let _ = self.custom.write().insert(resource.id.clone(), resource);
        true
    }

    /// Remove a custom resource. Critical entries cannot be removed.
    pub fn remove_custom(&self, id: &str) -> bool {
        self.custom.write().remove(id).is_some()
    }

    fn merged(&self) -> Vec<Resource> {
        let mut all = self.critical.clone();
        all.extend(self.custom.read().values().cloned());
        all
    }

    /// Resources appropriate at or below the given urgency, contact-sorted.
    pub fn for_urgency(&self, urgency: Severity) -> Vec<Resource> {
        let mut out: Vec<Resource> = self
            .merged()
            .into_iter()
            .filter(|r| r.urgency <= urgency)
            .collect();
        sort_contacts(&mut out);
        out
    }

    pub fn of_kind(&self, kind: ResourceKind) -> Vec<Resource> {
        let mut out: Vec<Resource> = self.merged().into_iter().filter(|r| r.kind == kind).collect();
        sort_contacts(&mut out);
        out
    }

    /// The hotline set shown during an escalation. Always non-empty.
    pub fn emergency_contacts(&self) -> Vec<Resource> {
        let mut out: Vec<Resource> = self
            .merged()
            .into_iter()
            .filter(|r| matches!(r.kind, ResourceKind::Emergency | ResourceKind::CrisisLine))
            .collect();
        sort_contacts(&mut out);
        out
    }

    /// Resources surfaced immediately on any session start.
    pub fn immediate(&self) -> Vec<Resource> {
        self.for_urgency(Severity::Critical)
    }

    /// Case-insensitive substring search over name and description.
    pub fn search(&self, query: &str) -> Vec<Resource> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<Resource> = self
            .merged()
            .into_iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle)
                    || r.description.to_lowercase().contains(&needle)
            })
            .collect();
        sort_contacts(&mut out);
        out
    }
}

/// Contact-list sort contract: 24/7 entries first; within an availability
/// band, emergency < crisis line < professional < personal.
fn sort_contacts(resources: &mut [Resource]) {
    resources.sort_by(|a, b| {
        b.available_24_7
            .cmp(&a.available_24_7)
            .then(a.kind.cmp(&b.kind))
            .then(a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(id: &str, kind: ResourceKind, always_open: bool) -> Resource {
        Resource {
            id: id.into(),
            name: format!("resource {id}"),
            kind,
            contact: Some("555-0100".into()),
            description: "a test resource".into(),
            available_24_7: always_open,
            urgency: Severity::Safe,
        }
    }

    #[test]
    fn offline_guarantee_holds_with_no_setup() {
        let catalog = ResourceCatalog::new();
        assert!(catalog.is_available_offline());

        let contacts = catalog.emergency_contacts();
        assert!(contacts.len() >= 3, "got {} contacts", contacts.len());

        let numbers: Vec<&str> = contacts.iter().filter_map(|r| r.contact.as_deref()).collect();
        assert!(numbers.iter().any(|n| n.contains("988")), "988 missing: {numbers:?}");
        assert!(numbers.iter().any(|n| n.contains("911")), "911 missing: {numbers:?}");
    }

    #[test]
    fn custom_cannot_shadow_critical() {
        let catalog = ResourceCatalog::new();
        let critical_id = catalog.emergency_contacts()[0].id.clone();

        let mut impostor = custom("x", ResourceKind::Personal, false);
        impostor.id = critical_id.clone();
        assert!(!catalog.add_custom(impostor));

        // Critical entry untouched
        assert!(catalog.emergency_contacts().iter().any(|r| r.id == critical_id));
    }

    #[test]
    fn custom_cannot_remove_critical() {
        let catalog = ResourceCatalog::new();
        let critical_id = catalog.emergency_contacts()[0].id.clone();
        assert!(!catalog.remove_custom(&critical_id));
        assert!(catalog.emergency_contacts().iter().any(|r| r.id == critical_id));
    }

    #[test]
    fn custom_merges_and_removes() {
        let catalog = ResourceCatalog::new();
        assert!(catalog.add_custom(custom("my-therapist", ResourceKind::Personal, false)));
        assert!(catalog.search("resource my-therapist").iter().any(|r| r.id == "my-therapist"));
        assert!(catalog.remove_custom("my-therapist"));
        assert!(!catalog.search("my-therapist").iter().any(|r| r.id == "my-therapist"));
    }

    #[test]
    fn contact_sort_availability_then_kind() {
        let catalog = ResourceCatalog::new();
        catalog.add_custom(custom("a-personal-24", ResourceKind::Personal, true));
        catalog.add_custom(custom("b-emergency-day", ResourceKind::Emergency, false));

        let sorted = catalog.emergency_contacts();
        // Every 24/7 entry precedes every non-24/7 entry
        let first_closed = sorted.iter().position(|r| !r.available_24_7);
        if let Some(idx) = first_closed {
            assert!(sorted[idx..].iter().all(|r| !r.available_24_7));
        }
        // Within the 24/7 band, emergency before crisis lines
        let open: Vec<&Resource> = sorted.iter().filter(|r| r.available_24_7).collect();
        let last_emergency = open.iter().rposition(|r| r.kind == ResourceKind::Emergency);
        let first_line = open.iter().position(|r| r.kind == ResourceKind::CrisisLine);
        if let (Some(e), Some(l)) = (last_emergency, first_line) {
            assert!(e < l, "emergency entries must sort before crisis lines");
        }
    }

    #[test]
    fn search_is_case_insensitive() {
        let catalog = ResourceCatalog::new();
        let hits = catalog.search("LIFELINE");
        assert!(!hits.is_empty());
        assert!(catalog.search("   ").is_empty());
        assert!(catalog.search("zzz-no-such-resource").is_empty());
    }

    #[test]
    fn urgency_filter_is_inclusive() {
        let catalog = ResourceCatalog::new();
        let safe = catalog.for_urgency(Severity::Safe);
        let critical = catalog.for_urgency(Severity::Critical);
        assert!(critical.len() >= safe.len());
        // Everything critical-urgency must include the full hotline set
        assert!(critical.iter().any(|r| r.kind == ResourceKind::Emergency));
    }
}
