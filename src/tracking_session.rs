use chrono::{DateTime, Duration, Utc};
use strum_macros::{Display, EnumString};

use crate::position_tracker::{FixUpdate, PositionFix};
use crate::route_geometry::{
    haversine_m, infer_step_index, min_distance_to_route_m, remaining_distance_m,
};
use crate::route_vector::{GeoPoint, RoutePolyline, RouteStep};

/* The session is the single owner of all trip state. The tracker owns the
position slice and the geometry engine is pure, so every mutation of route,
deviation and alert flags goes through here. All timestamps are passed in
explicitly, which keeps the whole machine deterministic under test. */

/// Empirical tuning values, kept configurable rather than baked in.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// A fix closer than this to the last moved position is GPS jitter.
    pub movement_threshold_m: f64,
    /// Deviation is not evaluated until this long after travel start...
    pub grace_period: Duration,
    /// ...unless the user is already this far from the route start.
    pub grace_radius_m: f64,
    /// Fixes with worse reported accuracy are ignored for deviation.
    pub max_fix_accuracy_m: f64,
    pub threshold_accuracy_factor: f64,
    pub threshold_floor_m: f64,
    pub threshold_ceiling_m: f64,
    /// No qualifying movement for this long raises the stationary alert.
    pub stationary_window: Duration,
    pub stationary_poll: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            movement_threshold_m: 5.0,
            grace_period: Duration::seconds(15),
            grace_radius_m: 80.0,
            max_fix_accuracy_m: 120.0,
            threshold_accuracy_factor: 1.5,
            threshold_floor_m: 50.0,
            threshold_ceiling_m: 120.0,
            stationary_window: Duration::minutes(3),
            stationary_poll: Duration::seconds(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    TrackingClean,
    TrackingDeviated,
    Paused,
}

/// Map panel size selected by the user. The stationary detector only runs in
/// the high-detail guardian view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DisplayMode {
    Compact,
    Standard,
    Guardian,
}

/// What changed while handling one fix, for the UI and the narrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionUpdate {
    pub deviation_changed: Option<bool>,
    pub step_index: usize,
    pub step_changed: bool,
}

pub struct TrackingSession {
    cfg: TrackingConfig,
    route: RoutePolyline,
    steps: Vec<RouteStep>,
    destination: Option<GeoPoint>,
    route_start: Option<GeoPoint>,
    started_at: Option<DateTime<Utc>>,
    travelling: bool,
    paused: bool,
    deviated: bool,
    stationary_alerted: bool,
    last_stationary_poll: Option<DateTime<Utc>>,
    current_step_index: usize,
    display_mode: DisplayMode,
    route_request_seq: u64,
    min_distance_to_route_m: Option<f64>,
    remaining_distance_m: Option<f64>,
}

impl TrackingSession {
    pub fn new(cfg: TrackingConfig) -> Self {
        TrackingSession {
            cfg,
            route: RoutePolyline::default(),
            steps: Vec::new(),
            destination: None,
            route_start: None,
            started_at: None,
            travelling: false,
            paused: false,
            deviated: false,
            stationary_alerted: false,
            last_stationary_poll: None,
            current_step_index: 0,
            display_mode: DisplayMode::Standard,
            route_request_seq: 0,
            min_distance_to_route_m: None,
            remaining_distance_m: None,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.cfg
    }

    pub fn state(&self) -> SessionState {
        if !self.travelling {
            SessionState::Idle
        } else if self.paused {
            SessionState::Paused
        } else if self.deviated {
            SessionState::TrackingDeviated
        } else {
            SessionState::TrackingClean
        }
    }

    pub fn is_travelling(&self) -> bool {
        self.travelling
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_deviated(&self) -> bool {
        self.deviated
    }

    pub fn stationary_alerted(&self) -> bool {
        self.stationary_alerted
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    pub fn route(&self) -> &RoutePolyline {
        &self.route
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.destination
    }

    /// Sequence number of the route request currently awaiting a response.
    pub fn route_request_seq(&self) -> u64 {
        self.route_request_seq
    }

    pub fn min_distance_to_route(&self) -> Option<f64> {
        self.min_distance_to_route_m
    }

    pub fn remaining_distance(&self) -> Option<f64> {
        self.remaining_distance_m
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    /// `idle -> tracking-clean`. Clears every flag and all route state from a
    /// previous trip, then opens a fresh route request sequence.
    pub fn start_travel(&mut self, destination: GeoPoint, now: DateTime<Utc>) -> u64 {
        self.route = RoutePolyline::default();
        self.steps.clear();
        self.destination = Some(destination);
        self.route_start = None;
        self.started_at = Some(now);
        self.travelling = true;
        self.paused = false;
        self.deviated = false;
        self.stationary_alerted = false;
        self.last_stationary_poll = None;
        self.current_step_index = 0;
        self.min_distance_to_route_m = None;
        self.remaining_distance_m = None;
        self.route_request_seq += 1;
        info!(
            "travel started towards ({:.5}, {:.5})",
            destination.latitude, destination.longitude
        );
        self.route_request_seq
    }

    /// `* -> idle`. Route coordinates, deviation, pause and alert flags are
    /// all dropped; a later restart carries nothing over.
    pub fn stop_travel(&mut self) {
        self.route = RoutePolyline::default();
        self.steps.clear();
        self.destination = None;
        self.route_start = None;
        self.started_at = None;
        self.travelling = false;
        self.paused = false;
        self.deviated = false;
        self.stationary_alerted = false;
        self.last_stationary_poll = None;
        self.current_step_index = 0;
        self.min_distance_to_route_m = None;
        self.remaining_distance_m = None;
        info!("travel stopped");
    }

    /// Freezes deviation evaluation and the stationary timer without
    /// clearing accumulated route/step state.
    pub fn pause(&mut self) {
        if self.travelling {
            self.paused = true;
        }
    }

    /// Resumes evaluation with prior state intact.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Install a route received from the routing service. Stale responses
    /// (superseded sequence) and responses arriving after stop are dropped.
    pub fn install_route(
        &mut self,
        seq: u64,
        polyline: RoutePolyline,
        steps: Vec<RouteStep>,
    ) -> bool {
        if !self.travelling || seq != self.route_request_seq {
            debug!(
                "dropping route response (seq {} vs {}, travelling={})",
                seq, self.route_request_seq, self.travelling
            );
            return false;
        }
        self.route_start = polyline.first();
        self.route = polyline;
        self.steps = steps;
        self.current_step_index = 0;
        info!(
            "route installed: {} points, {} steps",
            self.route.len(),
            self.steps.len()
        );
        true
    }

    /// Manual reroute: drops the current geometry and deviation flag, resets
    /// the grace-period timer, and supersedes any in-flight route request.
    pub fn request_reroute(&mut self, now: DateTime<Utc>) -> u64 {
        self.route = RoutePolyline::default();
        self.steps.clear();
        self.route_start = None;
        self.deviated = false;
        self.current_step_index = 0;
        self.started_at = Some(now);
        self.min_distance_to_route_m = None;
        self.remaining_distance_m = None;
        self.route_request_seq += 1;
        info!("reroute requested (seq {})", self.route_request_seq);
        self.route_request_seq
    }

    /// threshold = clamp(accuracy * factor, floor, ceiling); floor when the
    /// accuracy is unknown.
    pub fn adaptive_threshold_m(&self, accuracy_m: Option<f64>) -> f64 {
        match accuracy_m {
            None => self.cfg.threshold_floor_m,
            Some(acc) => (acc * self.cfg.threshold_accuracy_factor)
                .clamp(self.cfg.threshold_floor_m, self.cfg.threshold_ceiling_m),
        }
    }

    /// Run the geometry engine and the deviation evaluation for one fix.
    ///
    /// `has_live_fix` comes from the tracker: before the first live fix the
    /// deviation flag must stay false no matter what the distance math says.
    pub fn handle_fix(
        &mut self,
        update: &FixUpdate,
        has_live_fix: bool,
        now: DateTime<Utc>,
    ) -> SessionUpdate {
        let previous_step = self.current_step_index;
        let previously_deviated = self.deviated;

        if self.travelling && !self.paused && !self.route.is_empty() {
            self.min_distance_to_route_m = min_distance_to_route_m(update.fix.point, &self.route);
            self.remaining_distance_m = remaining_distance_m(update.fix.point, &self.route);

            // Step index never regresses within one route; noisy
            // remaining-distance fluctuations must not walk it backwards.
            let inferred = infer_step_index(&self.steps, self.remaining_distance_m);
            self.current_step_index = self.current_step_index.max(inferred);
        }

        if self.should_evaluate_deviation(&update.fix, has_live_fix, now) {
            let threshold = self.adaptive_threshold_m(update.fix.accuracy_m);
            let distance = self.min_distance_to_route_m.unwrap_or(f64::INFINITY);
            let deviated = distance > threshold;
            if deviated && !self.deviated {
                warn!(
                    "route deviation: {:.0}m from route (threshold {:.0}m)",
                    distance, threshold
                );
            }
            self.deviated = deviated;
        }

        SessionUpdate {
            deviation_changed: (self.deviated != previously_deviated).then_some(self.deviated),
            step_index: self.current_step_index,
            step_changed: self.current_step_index != previous_step,
        }
    }

    fn should_evaluate_deviation(
        &self,
        fix: &PositionFix,
        has_live_fix: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.travelling || self.paused || self.route.is_empty() || !has_live_fix {
            return false;
        }
        let (Some(started_at), Some(route_start)) = (self.started_at, self.route_start) else {
            return false;
        };
        // Grace gate: suppress alarms while the first fixes stabilize near
        // the origin, unless the user is already clearly away from it.
        let past_grace = now - started_at > self.cfg.grace_period;
        let away_from_start = haversine_m(fix.point, route_start) > self.cfg.grace_radius_m;
        if !past_grace && !away_from_start {
            return false;
        }
        // An inaccurate fix keeps the previous verdict.
        if let Some(acc) = fix.accuracy_m {
            if acc > self.cfg.max_fix_accuracy_m {
                return false;
            }
        }
        true
    }

    /// Stationary detector, polled on a coarse timer. One-shot per travel
    /// session, guardian view only, suspended while paused.
    ///
    /// `last_movement` is the tracker's last qualifying-movement timestamp.
    pub fn tick(&mut self, last_movement: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if self.display_mode != DisplayMode::Guardian
            || !self.travelling
            || self.paused
            || self.stationary_alerted
        {
            return false;
        }
        if let Some(last_poll) = self.last_stationary_poll {
            if now - last_poll < self.cfg.stationary_poll {
                return false;
            }
        }
        self.last_stationary_poll = Some(now);

        let Some(last_movement) = last_movement else {
            return false;
        };
        if now - last_movement > self.cfg.stationary_window {
            self.stationary_alerted = true;
            warn!(
                "stationary alert: no movement since {}",
                last_movement.to_rfc3339()
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_threshold_clamps() {
        let session = TrackingSession::new(TrackingConfig::default());
        assert_eq!(session.adaptive_threshold_m(None), 50.0);
        assert_eq!(session.adaptive_threshold_m(Some(10.0)), 50.0);
        assert_eq!(session.adaptive_threshold_m(Some(60.0)), 90.0);
        assert_eq!(session.adaptive_threshold_m(Some(200.0)), 120.0);
    }

    #[test]
    fn display_mode_round_trips_as_string() {
        assert_eq!(DisplayMode::Guardian.to_string(), "guardian");
        assert_eq!("compact".parse::<DisplayMode>().unwrap(), DisplayMode::Compact);
    }
}
