use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::backend::{RecordStore, ReportType};
use crate::route_geometry::haversine_m;
use crate::route_vector::GeoPoint;

/* Heuristic safety scorer for a candidate route, the logic behind the
deployable scoring function. Pure functions; the HTTP wrapper lives in
`score_server`. */

/// Safe havens and reports are counted within this radius of the route start.
pub const SEARCH_RADIUS_KM: f64 = 1.0;

const BASE_SCORE: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyFactors {
    pub safe_havens_nearby: u32,
    pub unsafe_reports_nearby: u32,
    pub verified_safe_spots: u32,
    /// Start-to-end great-circle distance in kilometers.
    pub route_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Recommendation {
    #[strum(serialize = "Safe route")]
    #[serde(rename = "Safe route")]
    SafeRoute,
    #[strum(serialize = "Moderate caution advised")]
    #[serde(rename = "Moderate caution advised")]
    ModerateCaution,
    #[strum(serialize = "Consider alternative route")]
    #[serde(rename = "Consider alternative route")]
    ConsiderAlternative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAssessment {
    pub safety_score: u8,
    pub factors: SafetyFactors,
    pub recommendation: Recommendation,
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine_m(a, b) / 1000.0
}

/// Base 50, capped additions for nearby havens and verified safe spots,
/// capped subtraction for nearby hazard reports, short-route bonus and
/// long-route penalty, clamped to [0, 100].
pub fn score_route(factors: &SafetyFactors) -> u8 {
    let mut score = BASE_SCORE;
    score += 30.min(factors.safe_havens_nearby as i32 * 5);
    score += 20.min(factors.verified_safe_spots as i32 * 10);
    score -= 40.min(factors.unsafe_reports_nearby as i32 * 8);

    if factors.route_length < 2.0 {
        score += 10;
    } else if factors.route_length > 5.0 {
        score -= 10;
    }

    score.clamp(0, 100) as u8
}

pub fn recommendation_for(score: u8) -> Recommendation {
    if score >= 70 {
        Recommendation::SafeRoute
    } else if score >= 40 {
        Recommendation::ModerateCaution
    } else {
        Recommendation::ConsiderAlternative
    }
}

// Count the contributing factors around the route's start point. Callers
// must have validated that at least two points are present.
fn collect_factors(store: &dyn RecordStore, route_points: &[GeoPoint]) -> Result<SafetyFactors> {
    let start = route_points[0];
    let end = route_points[route_points.len() - 1];

    let mut safe_havens_nearby = 0;
    for haven in store.verified_safe_havens()? {
        let at = GeoPoint::new(haven.latitude, haven.longitude);
        if haversine_km(start, at) <= SEARCH_RADIUS_KM {
            safe_havens_nearby += 1;
        }
    }

    let mut unsafe_reports_nearby = 0;
    let mut verified_safe_spots = 0;
    for report in store.actionable_safety_reports()? {
        let at = GeoPoint::new(report.latitude, report.longitude);
        if haversine_km(start, at) > SEARCH_RADIUS_KM {
            continue;
        }
        match report.report_type {
            ReportType::SafeSpot => verified_safe_spots += 1,
            ReportType::UnsafeArea | ReportType::BrokenLight => unsafe_reports_nearby += 1,
            ReportType::SosAlert => (),
        }
    }

    Ok(SafetyFactors {
        safe_havens_nearby,
        unsafe_reports_nearby,
        verified_safe_spots,
        route_length: haversine_km(start, end),
    })
}

/// Score a candidate route. Fails with a validation error on fewer than two
/// points.
pub fn assess_route(store: &dyn RecordStore, route_points: &[GeoPoint]) -> Result<SafetyAssessment> {
    if route_points.len() < 2 {
        bail!("Invalid route points");
    }
    let factors = collect_factors(store, route_points)?;
    let safety_score = score_route(&factors);
    Ok(SafetyAssessment {
        safety_score,
        factors,
        recommendation: recommendation_for(safety_score),
    })
}
