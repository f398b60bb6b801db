#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use sakhi_core::narrator::SpeechOutput;
use sakhi_core::position_tracker::{
    GeolocationError, GeolocationProvider, PositionFix, WatchEvent, WatchSubscription,
};
use sakhi_core::route_vector::GeoPoint;
use sakhi_core::routing::{GeocodingService, RoutingService};
use serde_json::{json, Value};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap()
}

pub fn fix(
    latitude: f64,
    longitude: f64,
    accuracy_m: Option<f64>,
    timestamp: DateTime<Utc>,
) -> PositionFix {
    PositionFix {
        point: GeoPoint::new(latitude, longitude),
        accuracy_m,
        timestamp,
    }
}

/// Meters of northward offset expressed in degrees of latitude.
pub fn meters_as_lat_deg(meters: f64) -> f64 {
    meters / 111_195.0
}

pub struct MockGeolocation {
    pub supported: bool,
    pub queue: Arc<Mutex<VecDeque<WatchEvent>>>,
    pub active_watches: Arc<Mutex<usize>>,
    pub one_shot: Option<PositionFix>,
}

impl MockGeolocation {
    pub fn new() -> Self {
        MockGeolocation {
            supported: true,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            active_watches: Arc::new(Mutex::new(0)),
            one_shot: None,
        }
    }

    pub fn push(&self, event: WatchEvent) {
        self.queue.lock().unwrap().push_back(event);
    }

    pub fn active_watches(&self) -> usize {
        *self.active_watches.lock().unwrap()
    }
}

impl GeolocationProvider for MockGeolocation {
    fn request_fix(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<PositionFix, GeolocationError> {
        self.one_shot.clone().ok_or(GeolocationError::Timeout)
    }

    fn start_watch(&mut self) -> Result<Box<dyn WatchSubscription>, GeolocationError> {
        if !self.supported {
            return Err(GeolocationError::Unsupported);
        }
        *self.active_watches.lock().unwrap() += 1;
        Ok(Box::new(MockWatch {
            queue: self.queue.clone(),
            active: self.active_watches.clone(),
        }))
    }
}

struct MockWatch {
    queue: Arc<Mutex<VecDeque<WatchEvent>>>,
    active: Arc<Mutex<usize>>,
}

impl WatchSubscription for MockWatch {
    fn try_next(&mut self) -> Option<WatchEvent> {
        self.queue.lock().unwrap().pop_front()
    }
}

impl Drop for MockWatch {
    fn drop(&mut self) {
        *self.active.lock().unwrap() -= 1;
    }
}

/// Speech sink shared with the test through an `Arc`, for the boxed-binding
/// seams where the test cannot keep the mock itself.
pub struct SharedSpeech(pub Arc<Mutex<Vec<String>>>);

impl SpeechOutput for SharedSpeech {
    fn speak(&mut self, text: &str) {
        self.0.lock().unwrap().push(text.to_owned());
    }

    fn cancel_all(&mut self) {}
}

/// Routing service that always returns the same canned payload.
pub struct StubRouting(pub Value);

impl RoutingService for StubRouting {
    fn find_route(&mut self, _waypoints: &[GeoPoint]) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

pub struct StubGeocoding;

impl GeocodingService for StubGeocoding {
    fn forward(&mut self, query: &str) -> anyhow::Result<Option<(GeoPoint, String)>> {
        if query == "central station" {
            Ok(Some((GeoPoint::new(0.0, 0.01), "Central Station".to_owned())))
        } else {
            Ok(None)
        }
    }

    fn reverse(&mut self, _point: GeoPoint) -> anyhow::Result<Option<String>> {
        Ok(Some("Central Station".to_owned()))
    }
}

/// Straight ~1.11km two-step route along the equator, in the routing
/// service's wire shape.
pub fn straight_route_payload() -> Value {
    let coordinates: Vec<Value> = (0..=10)
        .map(|i| json!({"lat": 0.0, "lng": i as f64 * 0.001}))
        .collect();
    json!({
        "routes": [{
            "coordinates": coordinates,
            "instructions": [
                {"text": "Head east along the route", "distance": 600.0},
                {"text": "You have arrived", "distance": 512.0},
            ],
            "summary": {"totalDistance": 1112.0, "totalTime": 900.0},
        }]
    })
}

#[derive(Default)]
pub struct MockSpeech {
    pub spoken: Vec<String>,
    /// Ordered log of every call, `cancel` and `speak:<text>`.
    pub calls: Vec<String>,
}

impl SpeechOutput for MockSpeech {
    fn speak(&mut self, text: &str) {
        self.spoken.push(text.to_owned());
        self.calls.push(format!("speak:{}", text));
    }

    fn cancel_all(&mut self) {
        self.calls.push("cancel".to_owned());
    }
}
