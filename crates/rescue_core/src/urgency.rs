//! Deterministic urgency scoring and resource suggestion.
//!
//! This is the fallback prioritization used whenever external enrichment is
//! unavailable or fails. Pure lookups, no error states.
//!
//! Score = 5 (base) + injury weight + crowd bonus + hazard weight, capped at 10.

use serde::{Deserialize, Serialize};

use crate::model::{HazardKind, HelpRequest, InjuryLevel};

/// Priority bucket derived from the urgency score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

/// Urgency score for a request, in [1, 10].
pub fn urgency_score(request: &HelpRequest) -> u8 {
    let mut score: u32 = 5;

    score += match request.injury_level {
        Some(InjuryLevel::Critical) => 4,
        Some(InjuryLevel::Severe) => 3,
        Some(InjuryLevel::Moderate) => 2,
        Some(InjuryLevel::Minor) => 1,
        None => 0,
    };

    if request.people_affected > 5 {
        score += 2;
    }

    score += match request.hazard {
        HazardKind::BuildingCollapse
        | HazardKind::Fire
        | HazardKind::Drowning
        | HazardKind::Earthquake => 3,
        HazardKind::Landslide => 2,
        HazardKind::Flooding | HazardKind::Unknown => 0,
    };

    score.min(10) as u8
}

/// Priority bucket for a score: ≥8 CRITICAL, ≥6 HIGH, ≥4 MEDIUM, else LOW.
pub fn priority_for(score: u8) -> Priority {
    match score {
        8..=u8::MAX => Priority::Critical,
        6..=7 => Priority::High,
        4..=5 => Priority::Medium,
        _ => Priority::Low,
    }
}

fn hazard_resources(hazard: HazardKind) -> &'static [&'static str] {
    match hazard {
        HazardKind::BuildingCollapse => &["rescue_team", "medical_team", "heavy_equipment"],
        HazardKind::Fire => &["fire_truck", "paramedics", "evacuation_team"],
        HazardKind::Drowning => &["rescue_swimmers", "boats", "defibrillator"],
        HazardKind::Earthquake => &["rescue_dogs", "medical_team", "water", "shelter"],
        HazardKind::Landslide => &["excavators", "rescue_team", "medical_team"],
        HazardKind::Flooding => &["boats", "pumps", "sandbags", "water_purification"],
        HazardKind::Unknown => &[],
    }
}

/// Resource tags needed for a request: medical support when injuries were
/// reported, plus the hazard-specific kit. Deduplicated, insertion order
/// preserved.
pub fn suggest_resources(request: &HelpRequest) -> Vec<String> {
    let mut resources: Vec<&'static str> = Vec::new();

    if request.injury_level.is_some() {
        resources.push("medical_team");
        resources.push("ambulance");
    }

    for tag in hazard_resources(request.hazard) {
        if !resources.contains(tag) {
            resources.push(tag);
        }
    }

    resources.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::model::{Accessibility, RequestStatus};
    use chrono::Utc;

    fn request(
        hazard: HazardKind,
        injury: Option<InjuryLevel>,
        people_affected: u32,
    ) -> HelpRequest {
        HelpRequest {
            id: "req-1".into(),
            requester_ref: "user-1".into(),
            location: Coordinate::new(20.0, 78.0).expect("coordinate"),
            hazard,
            description: String::new(),
            people_affected,
            injury_level: injury,
            accessibility: Accessibility::Unknown,
            status: RequestStatus::Open,
            created_at: Utc::now(),
            assigned_responder_id: None,
        }
    }

    #[test]
    fn critical_fire_with_crowd_maxes_out() {
        // 5 + 4 (critical) + 2 (>5 people) + 3 (fire) = 14, capped at 10.
        let req = request(HazardKind::Fire, Some(InjuryLevel::Critical), 10);
        assert_eq!(urgency_score(&req), 10);
        assert_eq!(priority_for(10), Priority::Critical);
    }

    #[test]
    fn baseline_unknown_request_is_medium() {
        let req = request(HazardKind::Unknown, None, 1);
        assert_eq!(urgency_score(&req), 5);
        assert_eq!(priority_for(5), Priority::Medium);
    }

    #[test]
    fn landslide_with_minor_injuries() {
        // 5 + 1 + 0 + 2 = 8 -> CRITICAL boundary.
        let req = request(HazardKind::Landslide, Some(InjuryLevel::Minor), 2);
        assert_eq!(urgency_score(&req), 8);
        assert_eq!(priority_for(8), Priority::Critical);
    }

    #[test]
    fn priority_buckets_cover_the_range() {
        assert_eq!(priority_for(3), Priority::Low);
        assert_eq!(priority_for(4), Priority::Medium);
        assert_eq!(priority_for(6), Priority::High);
        assert_eq!(priority_for(7), Priority::High);
        assert_eq!(priority_for(8), Priority::Critical);
    }

    #[test]
    fn resources_dedupe_and_keep_order() {
        // Earthquake already includes medical_team; injury adds it first.
        let req = request(HazardKind::Earthquake, Some(InjuryLevel::Severe), 3);
        let resources = suggest_resources(&req);
        assert_eq!(
            resources,
            vec![
                "medical_team",
                "ambulance",
                "rescue_dogs",
                "water",
                "shelter"
            ]
        );
    }

    #[test]
    fn uninjured_unknown_hazard_needs_nothing_specific() {
        let req = request(HazardKind::Unknown, None, 1);
        assert!(suggest_resources(&req).is_empty());
    }
}
