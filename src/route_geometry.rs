use itertools::Itertools;

use crate::route_vector::{GeoPoint, RoutePolyline, RouteStep};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine).
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

// Equirectangular projection centered on `origin`: longitude is scaled by
// cos(origin latitude) so one unit is roughly one meter. Only valid for the
// small distances a deviation check cares about.
fn to_local_xy(p: GeoPoint, origin: GeoPoint) -> (f64, f64) {
    let x = (p.longitude - origin.longitude).to_radians()
        * EARTH_RADIUS_M
        * origin.latitude.to_radians().cos();
    let y = (p.latitude - origin.latitude).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

// Distance from `p` to the segment a-b in the locally flattened metric, with
// the projection parameter clamped to [0, 1]. A degenerate segment (a == b)
// degrades to point distance.
fn point_to_segment_m(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> f64 {
    let (ax, ay) = to_local_xy(a, p);
    let (bx, by) = to_local_xy(b, p);

    let vx = bx - ax;
    let vy = by - ay;
    let len_sq = vx * vx + vy * vy;
    if len_sq == 0.0 {
        return (ax * ax + ay * ay).sqrt();
    }

    // `p` is the local origin, so the point being projected is (0, 0).
    let t = (-(ax * vx + ay * vy) / len_sq).clamp(0.0, 1.0);
    let px = ax + t * vx;
    let py = ay + t * vy;
    (px * px + py * py).sqrt()
}

/// Minimum distance from `p` to the polyline, in meters. `None` for an empty
/// polyline ("unknown"); a one-point polyline returns point-to-point distance.
pub fn min_distance_to_route_m(p: GeoPoint, route: &RoutePolyline) -> Option<f64> {
    match route.points.len() {
        0 => None,
        1 => {
            let (x, y) = to_local_xy(route.points[0], p);
            Some((x * x + y * y).sqrt())
        }
        _ => route
            .points
            .iter()
            .tuple_windows()
            .map(|(a, b)| point_to_segment_m(p, *a, *b))
            .fold(None, |min, d| match min {
                None => Some(d),
                Some(m) => Some(m.min(d)),
            }),
    }
}

/// Travel distance left along the route, in meters: from the projection of
/// `p` onto the nearest segment, through every following vertex, to the end.
/// `None` for an empty polyline; 0 for a one-point polyline.
pub fn remaining_distance_m(p: GeoPoint, route: &RoutePolyline) -> Option<f64> {
    if route.points.is_empty() {
        return None;
    }
    if route.points.len() == 1 {
        return Some(0.0);
    }

    // Nearest segment plus the clamped projection parameter on it, in the
    // same flattened metric the deviation check uses.
    let mut best: Option<(f64, usize, f64)> = None;
    for (i, (a, b)) in route.points.iter().tuple_windows().enumerate() {
        let (ax, ay) = to_local_xy(*a, p);
        let (bx, by) = to_local_xy(*b, p);
        let vx = bx - ax;
        let vy = by - ay;
        let len_sq = vx * vx + vy * vy;
        let t = if len_sq == 0.0 {
            0.0
        } else {
            (-(ax * vx + ay * vy) / len_sq).clamp(0.0, 1.0)
        };
        let px = ax + t * vx;
        let py = ay + t * vy;
        let dist = (px * px + py * py).sqrt();
        if best.map(|(d, _, _)| dist < d).unwrap_or(true) {
            best = Some((dist, i, t));
        }
    }
    let (_, seg, t) = best?;

    let seg_len = haversine_m(route.points[seg], route.points[seg + 1]);
    let after: f64 = route.points[seg + 1..]
        .iter()
        .tuple_windows()
        .map(|(a, b)| haversine_m(*a, *b))
        .sum();
    Some((1.0 - t) * seg_len + after)
}

/// Total geodesic length of the polyline in meters.
pub fn route_length_m(route: &RoutePolyline) -> f64 {
    route
        .points
        .iter()
        .tuple_windows()
        .map(|(a, b)| haversine_m(*a, *b))
        .sum()
}

/// Derive the active step from how far along the route the user is.
///
/// Traveled distance is the total step distance minus `remaining_m`; the
/// active step is the latest one whose cumulative distance-from-start the
/// traveled distance has not yet exceeded. Falls back to step 0 when the step
/// distances sum to zero or the remaining distance is unknown.
pub fn infer_step_index(steps: &[RouteStep], remaining_m: Option<f64>) -> usize {
    let total: f64 = steps.iter().map(|s| s.distance_m).sum();
    let remaining = match remaining_m {
        Some(r) if total > 0.0 => r,
        _ => return 0,
    };
    let traveled = (total - remaining).max(0.0);

    let mut cumulative = 0.0;
    let mut index = 0;
    for (i, step) in steps.iter().enumerate() {
        if cumulative <= traveled {
            index = i;
        } else {
            break;
        }
        cumulative += step.distance_m;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // one degree of latitude is ~111.2 km
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = haversine_m(a, b);
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn degenerate_segment_is_point_distance() {
        let a = GeoPoint::new(0.0, 0.0);
        let p = GeoPoint::new(0.001, 0.0);
        let d = point_to_segment_m(p, a, a);
        assert!((d - haversine_m(p, a)).abs() < 1.0);
    }

    #[test]
    fn step_inference_defaults_to_zero() {
        assert_eq!(infer_step_index(&[], Some(100.0)), 0);
        let steps = vec![RouteStep {
            index: 0,
            instruction: None,
            distance_m: 0.0,
            target: None,
        }];
        assert_eq!(infer_step_index(&steps, Some(50.0)), 0);
        assert_eq!(infer_step_index(&steps, None), 0);
    }
}
