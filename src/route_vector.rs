use serde::{Deserialize, Serialize};

/// WGS84 decimal degrees. Wire names (`lat`/`lng`) match the routing service
/// and the scoring function contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng", alias = "lon")]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }
}

/// Ordered vertex sequence describing the planned path. Insertion order is
/// travel order. Replaced wholesale on reroute, never edited in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoutePolyline {
    pub points: Vec<GeoPoint>,
}

impl RoutePolyline {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        RoutePolyline { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first(&self) -> Option<GeoPoint> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<GeoPoint> {
        self.points.last().copied()
    }
}

/// One turn-by-turn instruction. `index` is the authoritative sequencing key.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep {
    pub index: usize,
    pub instruction: Option<String>,
    /// Distance covered by this step before the next one begins.
    pub distance_m: f64,
    pub target: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSummary {
    pub total_distance_m: f64,
    pub total_time_s: f64,
}
