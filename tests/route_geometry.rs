use assert_float_eq::assert_float_absolute_eq;
use sakhi_core::route_geometry::{
    haversine_m, infer_step_index, min_distance_to_route_m, remaining_distance_m, route_length_m,
};
use sakhi_core::route_vector::{GeoPoint, RoutePolyline, RouteStep};

fn step(index: usize, distance_m: f64) -> RouteStep {
    RouteStep {
        index,
        instruction: None,
        distance_m,
        target: None,
    }
}

fn zigzag_route() -> RoutePolyline {
    RoutePolyline::new(vec![
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.001, 0.002),
        GeoPoint::new(0.0, 0.004),
        GeoPoint::new(0.002, 0.006),
        GeoPoint::new(0.001, 0.008),
    ])
}

#[test]
fn min_distance_never_exceeds_any_vertex_distance() {
    let route = zigzag_route();
    let queries = [
        GeoPoint::new(0.0005, 0.001),
        GeoPoint::new(0.003, 0.003),
        GeoPoint::new(-0.002, 0.007),
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.01, 0.01),
    ];
    for q in queries {
        let min = min_distance_to_route_m(q, &route).unwrap();
        for v in &route.points {
            // small slack for the flattened metric vs the geodesic one
            assert!(
                min <= haversine_m(q, *v) + 1.0,
                "min {} exceeds vertex distance {}",
                min,
                haversine_m(q, *v)
            );
        }
    }
}

#[test]
fn on_route_midpoint_scores_zero_deviation() {
    // ~1.11 km segment along the equator
    let route = RoutePolyline::new(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)]);
    let midpoint = GeoPoint::new(0.0, 0.005);

    let min = min_distance_to_route_m(midpoint, &route).unwrap();
    assert!(min < 1.0, "midpoint should be on the route, got {}m", min);

    let remaining = remaining_distance_m(midpoint, &route).unwrap();
    assert!(
        (remaining - 556.0).abs() < 10.0,
        "expected ~0.55km remaining, got {}m",
        remaining
    );
}

#[test]
fn remaining_distance_at_route_endpoints() {
    let route = zigzag_route();
    let total = route_length_m(&route);
    assert!(total > 0.0);

    let at_start = remaining_distance_m(route.first().unwrap(), &route).unwrap();
    assert_float_absolute_eq!(at_start, total, 1.0);

    let at_end = remaining_distance_m(route.last().unwrap(), &route).unwrap();
    assert_float_absolute_eq!(at_end, 0.0, 1.0);
}

#[test]
fn degenerate_polylines() {
    let empty = RoutePolyline::default();
    let q = GeoPoint::new(0.0, 0.0);
    assert_eq!(min_distance_to_route_m(q, &empty), None);
    assert_eq!(remaining_distance_m(q, &empty), None);

    let single = RoutePolyline::new(vec![GeoPoint::new(0.001, 0.0)]);
    let d = min_distance_to_route_m(q, &single).unwrap();
    assert_float_absolute_eq!(d, haversine_m(q, single.points[0]), 1.0);
    assert_eq!(remaining_distance_m(q, &single), Some(0.0));
}

#[test]
fn step_index_follows_traveled_distance() {
    let steps = vec![step(0, 100.0), step(1, 200.0), step(2, 50.0)];

    // nothing traveled yet
    assert_eq!(infer_step_index(&steps, Some(350.0)), 0);
    // 150m traveled, inside the second step
    assert_eq!(infer_step_index(&steps, Some(200.0)), 1);
    // 320m traveled, inside the last step
    assert_eq!(infer_step_index(&steps, Some(30.0)), 2);
    // past the end
    assert_eq!(infer_step_index(&steps, Some(0.0)), 2);

    // index is non-decreasing as remaining distance shrinks
    let mut last = 0;
    let mut remaining = 350.0;
    while remaining >= 0.0 {
        let idx = infer_step_index(&steps, Some(remaining));
        assert!(idx >= last, "index regressed at remaining {}", remaining);
        last = idx;
        remaining -= 10.0;
    }
}
