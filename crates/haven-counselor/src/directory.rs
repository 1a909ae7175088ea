use haven_core::counselor::{CounselorProfile, Personality};
use haven_core::ids::CounselorId;

fn profile(
    id: &str,
    name: &str,
    specialties: &[&str],
    personality: Personality,
    avg_response_secs: u64,
    experience_years: u32,
) -> CounselorProfile {
    CounselorProfile {
        id: CounselorId::from_raw(id),
        name: name.into(),
        specialties: specialties.iter().map(|s| s.to_string()).collect(),
        personality,
        avg_response_secs,
        experience_years,
    }
}

/// The static persona roster. Read-only; the pool tracks availability
/// separately so these are never mutated.
pub fn builtin_counselors() -> Vec<CounselorProfile> {
    vec![
        profile(
            "counselor_rivera",
            "Dr. Rivera",
            &["crisis intervention", "trauma"],
            Personality::TraumaInformed,
            6,
            15,
        ),
        profile(
            "counselor_maya",
            "Maya",
            &["depression", "self-harm"],
            Personality::Empathetic,
            3,
            9,
        ),
        profile(
            "counselor_jordan",
            "Jordan",
            &["panic", "de-escalation"],
            Personality::Calm,
            5,
            11,
        ),
        profile(
            "counselor_sage",
            "Sage",
            &["anxiety", "grief"],
            Personality::Warm,
            4,
            7,
        ),
        profile(
            "counselor_alex",
            "Alex",
            &["substance use", "problem solving"],
            Personality::Direct,
            2,
            5,
        ),
    ]
}
