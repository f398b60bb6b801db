use anyhow::{Context, Result};
use serde_json::Value;

use crate::route_vector::{GeoPoint, RoutePolyline, RouteStep, RouteSummary};

/* The routing and geocoding services are external collaborators. Their
payloads are loosely shaped JSON; everything is translated into the narrow
internal types right here at the boundary and the external shape never
propagates inward. */

/// External routing service: ordered waypoints in, raw "routes found" payload
/// out. The payload goes through [`parse_route_response`] before anything
/// else touches it.
pub trait RoutingService: Send {
    fn find_route(&mut self, waypoints: &[GeoPoint]) -> Result<Value>;
}

/// External geocoding service.
pub trait GeocodingService: Send {
    /// Text to coordinates plus a display label.
    fn forward(&mut self, query: &str) -> Result<Option<(GeoPoint, String)>>;
    /// Coordinates to a display label.
    fn reverse(&mut self, point: GeoPoint) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub polyline: RoutePolyline,
    pub steps: Vec<RouteStep>,
    pub summary: RouteSummary,
}

/// Translate a routing-service response into internal types.
///
/// Expected shape (first route wins):
/// `{"routes": [{"coordinates": [{"lat", "lng"}, ...],
///               "instructions": [{"text", "distance"}, ...],
///               "summary": {"totalDistance", "totalTime"}}]}`
pub fn parse_route_response(raw: &Value) -> Result<RoutePlan> {
    let route = raw
        .get("routes")
        .and_then(|r| r.get(0))
        .context("route response contains no routes")?;

    let coordinates = route
        .get("coordinates")
        .and_then(Value::as_array)
        .context("route has no coordinates")?;
    let mut points = Vec::with_capacity(coordinates.len());
    for coord in coordinates {
        points.push(parse_point(coord).context("bad route coordinate")?);
    }

    let mut steps = Vec::new();
    if let Some(instructions) = route.get("instructions").and_then(Value::as_array) {
        for (index, instruction) in instructions.iter().enumerate() {
            steps.push(RouteStep {
                index,
                instruction: instruction
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                distance_m: instruction
                    .get("distance")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                target: instruction.get("location").and_then(|l| parse_point(l).ok()),
            });
        }
    }

    let summary = RouteSummary {
        total_distance_m: route
            .pointer("/summary/totalDistance")
            .and_then(Value::as_f64)
            .unwrap_or_else(|| steps.iter().map(|s| s.distance_m).sum()),
        total_time_s: route
            .pointer("/summary/totalTime")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    };

    Ok(RoutePlan {
        polyline: RoutePolyline::new(points),
        steps,
        summary,
    })
}

fn parse_point(value: &Value) -> Result<GeoPoint> {
    let latitude = value
        .get("lat")
        .and_then(Value::as_f64)
        .context("missing lat")?;
    let longitude = value
        .get("lng")
        .or_else(|| value.get("lon"))
        .and_then(Value::as_f64)
        .context("missing lng")?;
    Ok(GeoPoint::new(latitude, longitude))
}
