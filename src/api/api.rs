use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{Ok, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::backend::{
    BlobStore, DangerZone, GuardianSessionRow, IdentityProvider, RecordStore, ReportStatus,
    ReportType, SafeHaven, SafetyReport,
};
use crate::logs;
use crate::narrator::{Narrator, SpeechOutput};
use crate::position_tracker::{GeolocationError, GeolocationProvider, PositionTracker, WatchEvent};
use crate::prefs_db::{PrefsDb, Setting};
use crate::route_vector::GeoPoint;
use crate::routing::{parse_route_response, GeocodingService, RoutingService};
use crate::tracking_session::{DisplayMode, SessionState, TrackingConfig, TrackingSession};

/* Bridge surface for the host UI shell. The shell delivers geolocation watch
events, timer ticks and routing responses into this module; everything runs on
the host's event loop, so each entry point re-checks the session flags instead
of assuming anything about ordering. */

const FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the host shell must provide at init.
pub struct HostBindings {
    pub geolocation: Box<dyn GeolocationProvider>,
    pub speech: Box<dyn SpeechOutput>,
    pub routing: Box<dyn RoutingService>,
    pub geocoding: Box<dyn GeocodingService>,
    pub store: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<dyn BlobStore>,
}

struct MainState {
    prefs: Mutex<PrefsDb>,
    tracker: Mutex<PositionTracker>,
    session: Mutex<TrackingSession>,
    narrator: Mutex<Narrator>,
    geolocation: Mutex<Box<dyn GeolocationProvider>>,
    speech: Mutex<Box<dyn SpeechOutput>>,
    routing: Mutex<Box<dyn RoutingService>>,
    geocoding: Mutex<Box<dyn GeocodingService>>,
    store: Arc<dyn RecordStore>,
    identity: Arc<dyn IdentityProvider>,
    blobs: Arc<dyn BlobStore>,
    guardian_session_id: Mutex<Option<String>>,
}

static MAIN_STATE: OnceLock<MainState> = OnceLock::new();

pub fn init(support_dir: String, cache_dir: String, bindings: HostBindings) {
    let mut already_initialized = true;
    MAIN_STATE.get_or_init(|| {
        already_initialized = false;

        if let Err(e) = logs::init(&cache_dir) {
            eprintln!("failed to initialize logging: {}", e);
        }

        let mut prefs = PrefsDb::open(&support_dir).expect("failed to open prefs db");
        let muted = prefs.get_setting_with_default(Setting::VoiceMuted, false);
        let display_mode =
            prefs.get_setting_with_default(Setting::DisplayMode, DisplayMode::Standard);

        let cfg = TrackingConfig::default();
        let mut session = TrackingSession::new(cfg.clone());
        session.set_display_mode(display_mode);
        info!("initialized");

        MainState {
            prefs: Mutex::new(prefs),
            tracker: Mutex::new(PositionTracker::new(cfg.movement_threshold_m)),
            session: Mutex::new(session),
            narrator: Mutex::new(Narrator::new(muted)),
            geolocation: Mutex::new(bindings.geolocation),
            speech: Mutex::new(bindings.speech),
            routing: Mutex::new(bindings.routing),
            geocoding: Mutex::new(bindings.geocoding),
            store: bindings.store,
            identity: bindings.identity,
            blobs: bindings.blobs,
            guardian_session_id: Mutex::new(None),
        }
    });
    if already_initialized {
        warn!("`init` is called multiple times");
    }
}

fn get() -> &'static MainState {
    MAIN_STATE.get().expect("main state is not initialized")
}

pub fn session_state() -> SessionState {
    get().session.lock().unwrap().state()
}

/// Start a monitored walk towards `destination`: begin the watch, reset the
/// session, request a route from the current position and log a guardian
/// session row (best effort).
pub fn start_safe_travel(destination: GeoPoint) -> Result<()> {
    let state = get();
    let now = Utc::now();

    {
        let mut tracker = state.tracker.lock().unwrap();
        let mut geolocation = state.geolocation.lock().unwrap();
        match tracker.start(geolocation.as_mut()) {
            Err(e @ GeolocationError::Unsupported) => {
                error!("cannot start safe travel: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                // Recoverable: the watch may still come up on a later start.
                warn!("watch failed to start: {}", e);
            }
            Result::Ok(()) => (),
        }
        tracker.mark_movement(now);
    }

    let seq = {
        let mut session = state.session.lock().unwrap();
        session.start_travel(destination, now)
    };
    state.narrator.lock().unwrap().reset();

    open_guardian_session(now);
    request_route_internal(seq, destination)?;
    Ok(())
}

/// Stop travel: release the watch synchronously, cancel pending narration and
/// close the guardian session row.
pub fn stop_safe_travel() {
    let state = get();
    state.tracker.lock().unwrap().stop();
    state.session.lock().unwrap().stop_travel();
    state.narrator.lock().unwrap().reset();
    state.speech.lock().unwrap().cancel_all();
    close_guardian_session(Utc::now());
}

pub fn pause_travel() {
    get().session.lock().unwrap().pause();
}

pub fn resume_travel() {
    get().session.lock().unwrap().resume();
}

/// Manual reroute from the current position to the original destination.
/// The new request supersedes any in-flight one.
pub fn request_reroute() -> Result<()> {
    let state = get();
    let now = Utc::now();
    let (seq, destination) = {
        let mut session = state.session.lock().unwrap();
        let Some(destination) = session.destination() else {
            bail!("no active trip to reroute");
        };
        (session.request_reroute(now), destination)
    };
    state.narrator.lock().unwrap().reset();
    request_route_internal(seq, destination)
}

fn request_route_internal(seq: u64, destination: GeoPoint) -> Result<()> {
    let state = get();
    let origin = {
        let tracker = state.tracker.lock().unwrap();
        tracker.current_fix().map(|f| f.point)
    };
    let origin = match origin {
        Some(p) => p,
        None => {
            let mut geolocation = state.geolocation.lock().unwrap();
            match geolocation.request_fix(FIX_TIMEOUT) {
                Result::Ok(fix) => fix.point,
                Err(e) => {
                    warn!("route request deferred, no current position: {}", e);
                    return Ok(());
                }
            }
        }
    };

    let raw = {
        let mut routing = state.routing.lock().unwrap();
        routing.find_route(&[origin, destination])
    };
    match raw {
        Result::Ok(raw) => on_route_found(seq, &raw),
        Err(e) => {
            // Network failure leaves the session consistent; the user can
            // retry via reroute.
            error!("routing request failed: {:#}", e);
            Ok(())
        }
    }
}

/// Apply a "routes found" payload. Stale responses (superseded `seq` or trip
/// already stopped) are dropped inside the session.
pub fn on_route_found(seq: u64, raw: &serde_json::Value) -> Result<()> {
    let state = get();
    let plan = parse_route_response(raw)?;
    let mut session = state.session.lock().unwrap();
    session.install_route(seq, plan.polyline, plan.steps);
    Ok(())
}

/// Drain pending geolocation events and run one evaluation round. Called by
/// the host whenever the platform signals new fixes.
pub fn pump_location_updates() {
    let state = get();
    let now = Utc::now();

    let (updates, has_live_fix) = {
        let mut tracker = state.tracker.lock().unwrap();
        let updates = tracker.poll();
        (updates, tracker.has_live_fix())
    };
    if updates.is_empty() {
        return;
    }

    let pending_route = {
        let mut session = state.session.lock().unwrap();
        let mut narrator = state.narrator.lock().unwrap();
        let mut speech = state.speech.lock().unwrap();

        for update in updates {
            let outcome = session.handle_fix(&update, has_live_fix, now);
            if let Some(deviated) = outcome.deviation_changed {
                if deviated {
                    warn!("guardian alert: user deviated from the safe path");
                } else {
                    info!("back on the safe path");
                }
            }
            // The narrator dedupes against the last-announced index, so the
            // first evaluation after travel start narrates step 0.
            if !session.steps().is_empty() {
                narrator.announce_step(
                    session.is_travelling(),
                    session.is_paused(),
                    session.steps(),
                    outcome.step_index,
                    speech.as_mut(),
                );
            }
        }

        pending_route_request(&session)
    };

    retry_route_request(pending_route);
}

/// Host-delivered watch event (for shells that push instead of letting the
/// core poll a subscription).
pub fn on_watch_event(event: WatchEvent) {
    let state = get();
    let now = Utc::now();

    let (update, has_live_fix) = {
        let mut tracker = state.tracker.lock().unwrap();
        (tracker.on_event(event), tracker.has_live_fix())
    };
    let Some(update) = update else { return };

    let pending_route = {
        let mut session = state.session.lock().unwrap();
        let outcome = session.handle_fix(&update, has_live_fix, now);
        if !session.steps().is_empty() {
            let mut narrator = state.narrator.lock().unwrap();
            let mut speech = state.speech.lock().unwrap();
            narrator.announce_step(
                session.is_travelling(),
                session.is_paused(),
                session.steps(),
                outcome.step_index,
                speech.as_mut(),
            );
        }
        pending_route_request(&session)
    };

    retry_route_request(pending_route);
}

// A route request that was deferred for want of a position is retried once a
// live fix is in: travelling with an empty route means no response was ever
// installed for the current request sequence.
fn pending_route_request(session: &TrackingSession) -> Option<(u64, GeoPoint)> {
    if session.is_travelling() && session.route().is_empty() {
        session
            .destination()
            .map(|destination| (session.route_request_seq(), destination))
    } else {
        None
    }
}

fn retry_route_request(pending: Option<(u64, GeoPoint)>) {
    let Some((seq, destination)) = pending else {
        return;
    };
    if let Err(e) = request_route_internal(seq, destination) {
        error!("deferred route request failed: {:#}", e);
    }
}

/// Coarse timer tick (the host fires this every few seconds). Returns true
/// when the stationary alert was raised this tick.
pub fn on_timer_tick() -> bool {
    let state = get();
    let now = Utc::now();
    let last_movement = state.tracker.lock().unwrap().last_movement();
    state.session.lock().unwrap().tick(last_movement, now)
}

pub fn set_voice_muted(muted: bool) -> Result<()> {
    let state = get();
    state.narrator.lock().unwrap().set_muted(muted);
    if muted {
        state.speech.lock().unwrap().cancel_all();
    }
    state
        .prefs
        .lock()
        .unwrap()
        .set_setting(Setting::VoiceMuted, muted)
}

pub fn set_display_mode(mode: DisplayMode) -> Result<()> {
    let state = get();
    state.session.lock().unwrap().set_display_mode(mode);
    state
        .prefs
        .lock()
        .unwrap()
        .set_setting(Setting::DisplayMode, mode)
}

/// Resolve a destination search to coordinates plus a display label.
pub fn search_destination(query: &str) -> Result<Option<(GeoPoint, String)>> {
    let query = query.trim();
    if query.is_empty() {
        bail!("search query is required");
    }
    get().geocoding.lock().unwrap().forward(query)
}

/// Emergency SOS: log a report at the current (or freshly requested)
/// position so guardians can be notified.
pub fn trigger_sos() -> Result<()> {
    let state = get();
    let user = state.identity.current_user();
    let position = {
        let tracker = state.tracker.lock().unwrap();
        tracker.current_fix().map(|f| f.point)
    };
    let position = match position {
        Some(p) => p,
        None => {
            let mut geolocation = state.geolocation.lock().unwrap();
            geolocation
                .request_fix(FIX_TIMEOUT)
                .map_err(|e| anyhow!("cannot determine position for SOS: {}", e))?
                .point
        }
    };

    // Best effort: a failed reverse lookup must never block the alert.
    let address = {
        let mut geocoding = state.geocoding.lock().unwrap();
        geocoding.reverse(position).unwrap_or_else(|e| {
            warn!("reverse geocoding failed for SOS: {}", e);
            None
        })
    };
    let description = match address {
        Some(address) => format!("Emergency SOS triggered by user near {}", address),
        None => "Emergency SOS triggered by user".to_string(),
    };

    state.store.insert_safety_report(SafetyReport {
        id: Uuid::new_v4().as_hyphenated().to_string(),
        user_id: user.map(|u| u.id),
        report_type: ReportType::SosAlert,
        status: ReportStatus::Pending,
        description,
        latitude: position.latitude,
        longitude: position.longitude,
        photo_url: None,
        created_at: Utc::now(),
    })?;
    warn!("SOS alert logged at ({:.5}, {:.5})", position.latitude, position.longitude);
    Ok(())
}

/// Submit a community hazard report, optionally with a photo.
pub fn submit_safety_report(
    report_type: ReportType,
    description: String,
    position: GeoPoint,
    photo: Option<(String, Vec<u8>)>,
) -> Result<()> {
    if description.trim().is_empty() {
        bail!("description is required");
    }

    let state = get();
    let photo_url = match photo {
        None => None,
        Some((name, bytes)) => {
            let path = format!("report-photos/{}-{}", Uuid::new_v4(), name);
            Some(state.blobs.upload(&path, &bytes)?)
        }
    };

    state.store.insert_safety_report(SafetyReport {
        id: Uuid::new_v4().as_hyphenated().to_string(),
        user_id: state.identity.current_user().map(|u| u.id),
        report_type,
        status: ReportStatus::Pending,
        description,
        latitude: position.latitude,
        longitude: position.longitude,
        photo_url,
        created_at: Utc::now(),
    })?;
    info!("safety report submitted: {}", report_type);
    Ok(())
}

/// Verified safe havens and danger zones for the map overlay.
pub fn load_safety_overlay() -> Result<(Vec<SafeHaven>, Vec<DangerZone>)> {
    let state = get();
    let havens = state.store.verified_safe_havens()?;
    let zones = state.store.danger_zones()?;
    Ok((havens, zones))
}

/// Score an ad-hoc candidate route (same heuristic the deployed function
/// runs) for in-app display.
pub fn score_candidate_route(points: Vec<GeoPoint>) -> Result<crate::safety_score::SafetyAssessment> {
    crate::safety_score::assess_route(get().store.as_ref(), &points)
}

fn open_guardian_session(now: chrono::DateTime<Utc>) {
    let state = get();
    let Some(user) = state.identity.current_user() else {
        return;
    };
    let id = Uuid::new_v4().as_hyphenated().to_string();
    let row = GuardianSessionRow {
        id: id.clone(),
        user_id: user.id,
        status: "active".to_string(),
        start_time: now,
        end_time: None,
    };
    match state.store.insert_guardian_session(row) {
        Result::Ok(()) => *state.guardian_session_id.lock().unwrap() = Some(id),
        Err(e) => warn!("failed to record guardian session start: {:#}", e),
    }
}

fn close_guardian_session(now: chrono::DateTime<Utc>) {
    let state = get();
    let Some(id) = state.guardian_session_id.lock().unwrap().take() else {
        return;
    };
    if let Err(e) = state.store.close_guardian_session(&id, "completed", now) {
        warn!("failed to record guardian session end: {:#}", e);
    }
}
