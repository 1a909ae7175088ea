use haven_core::severity::Severity;

use crate::catalog::{Resource, ResourceKind};

/// The compiled-in critical set. Must always contain the 988 Lifeline,
/// 911, and a text-based crisis line; everything here satisfies the
/// offline guarantee with zero network access.
pub fn critical_resources() -> Vec<Resource> {
    vec![
        Resource {
            id: "lifeline-988".into(),
            name: "988 Suicide & Crisis Lifeline".into(),
            kind: ResourceKind::CrisisLine,
            contact: Some("988".into()),
            description: "Free, confidential crisis support by phone or text, 24/7.".into(),
            available_24_7: true,
            urgency: Severity::Safe,
        },
        Resource {
            id: "emergency-911".into(),
            name: "Emergency Services".into(),
            kind: ResourceKind::Emergency,
            contact: Some("911".into()),
            description: "Police, fire and medical emergency dispatch.".into(),
            available_24_7: true,
            urgency: Severity::Safe,
        },
        Resource {
            id: "crisis-text-line".into(),
            name: "Crisis Text Line".into(),
            kind: ResourceKind::CrisisLine,
            contact: Some("Text HOME to 741741".into()),
            description: "Text-based crisis counseling, 24/7.".into(),
            available_24_7: true,
            urgency: Severity::Safe,
        },
        Resource {
            id: "veterans-crisis-line".into(),
            name: "Veterans Crisis Line".into(),
            kind: ResourceKind::CrisisLine,
            contact: Some("988, then press 1".into()),
            description: "Crisis support for veterans and their families, 24/7.".into(),
            available_24_7: true,
            urgency: Severity::Low,
        },
        Resource {
            id: "samhsa-helpline".into(),
            name: "SAMHSA National Helpline".into(),
            kind: ResourceKind::Professional,
            contact: Some("1-800-662-4357".into()),
            description: "Treatment referral for mental health and substance use, 24/7.".into(),
            available_24_7: true,
            urgency: Severity::Low,
        },
        Resource {
            id: "trevor-project".into(),
            name: "The Trevor Project".into(),
            kind: ResourceKind::CrisisLine,
            contact: Some("1-866-488-7386".into()),
            description: "Crisis support for LGBTQ+ young people, 24/7.".into(),
            available_24_7: true,
            urgency: Severity::Low,
        },
        Resource {
            id: "grounding-54321".into(),
            name: "5-4-3-2-1 Grounding".into(),
            kind: ResourceKind::Technique,
            contact: None,
            description: "Name 5 things you can see, 4 you can touch, 3 you can hear, \
                          2 you can smell, 1 you can taste."
                .into(),
            available_24_7: true,
            urgency: Severity::Safe,
        },
        Resource {
            id: "box-breathing".into(),
            name: "Box Breathing".into(),
            kind: ResourceKind::Technique,
            contact: None,
            description: "Breathe in for 4, hold for 4, out for 4, hold for 4. Repeat.".into(),
            available_24_7: true,
            urgency: Severity::Safe,
        },
    ]
}
