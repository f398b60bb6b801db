use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::route_geometry::haversine_m;
use crate::route_vector::GeoPoint;

/// A single reported device position. Superseded by each new fix, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// The two failure classes matter to callers in different ways: a missing
/// capability disables the feature entirely, while a failed or timed-out fix
/// is reported and tracking continues with the stale position.
#[derive(Debug, Error)]
pub enum GeolocationError {
    #[error("geolocation is not supported on this device")]
    Unsupported,
    #[error("position fix failed: {0}")]
    FixFailed(String),
    #[error("position fix timed out")]
    Timeout,
}

impl GeolocationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GeolocationError::Unsupported)
    }
}

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Fix(PositionFix),
    /// A fix error inside an active watch. Never terminates the session.
    Error(String),
}

/// Device geolocation capability, implemented by the host shell.
pub trait GeolocationProvider: Send {
    /// One-shot fix. Must resolve within `timeout` or return
    /// `GeolocationError::Timeout`.
    fn request_fix(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<PositionFix, GeolocationError>;

    /// Continuous watch. The watch has no timeout; fix errors are delivered
    /// as `WatchEvent::Error`.
    fn start_watch(&mut self) -> Result<Box<dyn WatchSubscription>, GeolocationError>;
}

/// Handle for an active watch. Dropping it must cancel the underlying
/// platform watcher; disposal is explicit, not implicit.
pub trait WatchSubscription: Send {
    fn try_next(&mut self) -> Option<WatchEvent>;
}

/// A fix after the movement filter has looked at it.
#[derive(Debug, Clone)]
pub struct FixUpdate {
    pub fix: PositionFix,
    /// True only when the fix cleared the movement threshold. Jitter below
    /// the threshold must not reset the stationary timer.
    pub moved: bool,
}

/// Owns the live position slice of the session: current fix, accuracy,
/// whether a live fix has arrived yet, and the last-movement timestamp the
/// stationary detector reads.
pub struct PositionTracker {
    movement_threshold_m: f64,
    watch: Option<Box<dyn WatchSubscription>>,
    current: Option<PositionFix>,
    has_live_fix: bool,
    last_moved_point: Option<GeoPoint>,
    last_movement: Option<DateTime<Utc>>,
}

impl PositionTracker {
    pub fn new(movement_threshold_m: f64) -> Self {
        PositionTracker {
            movement_threshold_m,
            watch: None,
            current: None,
            has_live_fix: false,
            last_moved_point: None,
            last_movement: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.watch.is_some()
    }

    pub fn current_fix(&self) -> Option<&PositionFix> {
        self.current.as_ref()
    }

    pub fn has_live_fix(&self) -> bool {
        self.has_live_fix
    }

    pub fn last_movement(&self) -> Option<DateTime<Utc>> {
        self.last_movement
    }

    /// Treat `now` as a movement for stationary-timer purposes. Called at
    /// travel start so the timer counts from the session, not from the last
    /// fix of a previous one.
    pub fn mark_movement(&mut self, now: DateTime<Utc>) {
        self.last_movement = Some(now);
    }

    /// Starting when already tracking is a no-op.
    pub fn start(
        &mut self,
        provider: &mut dyn GeolocationProvider,
    ) -> Result<(), GeolocationError> {
        if self.watch.is_some() {
            debug!("position tracker already running, start ignored");
            return Ok(());
        }
        self.watch = Some(provider.start_watch()?);
        info!("position tracking started");
        Ok(())
    }

    /// Stopping when not tracking is a no-op. Dropping the subscription
    /// releases the underlying watcher synchronously.
    pub fn stop(&mut self) {
        if self.watch.take().is_some() {
            info!("position tracking stopped");
        }
        self.has_live_fix = false;
        self.current = None;
        self.last_moved_point = None;
        self.last_movement = None;
    }

    /// Drain pending watch events, applying fixes and logging fix errors.
    pub fn poll(&mut self) -> Vec<FixUpdate> {
        let mut updates = Vec::new();
        let Some(watch) = self.watch.as_mut() else {
            return updates;
        };
        let mut events = Vec::new();
        while let Some(ev) = watch.try_next() {
            events.push(ev);
        }
        for ev in events {
            if let Some(update) = self.on_event(ev) {
                updates.push(update);
            }
        }
        updates
    }

    /// Apply one watch event. Errors are surfaced in the log and dropped;
    /// the session keeps its stale position.
    pub fn on_event(&mut self, event: WatchEvent) -> Option<FixUpdate> {
        match event {
            WatchEvent::Error(message) => {
                warn!("position fix failed, keeping last position: {}", message);
                None
            }
            WatchEvent::Fix(fix) => {
                let moved = match self.last_moved_point {
                    None => true,
                    Some(prev) => haversine_m(prev, fix.point) > self.movement_threshold_m,
                };
                if moved {
                    self.last_moved_point = Some(fix.point);
                    self.last_movement = Some(fix.timestamp);
                }
                self.current = Some(fix.clone());
                self.has_live_fix = true;
                Some(FixUpdate { fix, moved })
            }
        }
    }
}
