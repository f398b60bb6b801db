use std::sync::Arc;
use std::thread;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use tokio::runtime::Runtime;

use crate::backend::{IdentityProvider, RecordStore};
use crate::route_vector::GeoPoint;
use crate::safety_score;

/* HTTP wrapper around the safety scorer. Deployed as its own unit; callers
are cross-origin browsers, so every response (including errors and the
preflight) carries permissive CORS headers. */

const CORS_ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");
const CORS_ALLOW_METHODS: (&str, &str) = (
    "Access-Control-Allow-Methods",
    "GET, POST, PUT, DELETE, OPTIONS",
);
const CORS_ALLOW_HEADERS: (&str, &str) = (
    "Access-Control-Allow-Headers",
    "Content-Type, Authorization, X-Client-Info, Apikey",
);

pub struct ScoreAppState {
    pub store: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

#[derive(Debug, Deserialize)]
struct ScoreRequest {
    #[serde(rename = "routePoints")]
    route_points: Vec<GeoPoint>,
}

fn with_cors(mut builder: actix_web::HttpResponseBuilder) -> actix_web::HttpResponseBuilder {
    builder
        .insert_header(CORS_ALLOW_ORIGIN)
        .insert_header(CORS_ALLOW_METHODS)
        .insert_header(CORS_ALLOW_HEADERS);
    builder
}

async fn preflight() -> HttpResponse {
    with_cors(HttpResponse::Ok()).finish()
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// The body is parsed by hand so that malformed requests get the same
// CORS-tagged `{"error": ...}` shape as every other failure.
async fn calculate_safety_score(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<ScoreAppState>,
) -> HttpResponse {
    let result = (|| -> anyhow::Result<safety_score::SafetyAssessment> {
        let user = bearer_token(&req)
            .and_then(|token| data.identity.verify_token(token))
            .ok_or_else(|| anyhow!("Unauthorized"))?;
        debug!("scoring request from user {}", user.id);

        let request: ScoreRequest =
            serde_json::from_slice(&body).map_err(|_| anyhow!("Invalid route points"))?;
        safety_score::assess_route(data.store.as_ref(), &request.route_points)
    })();

    match result {
        Ok(assessment) => with_cors(HttpResponse::Ok()).json(assessment),
        Err(e) => {
            info!("scoring request rejected: {}", e);
            with_cors(HttpResponse::BadRequest())
                .json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// Route table, shared between the embedded server and tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/calculate-safety-score",
        web::post().to(calculate_safety_score),
    )
    .route("/calculate-safety-score", web::route().method(actix_web::http::Method::OPTIONS).to(preflight));
}

pub struct ScoreServer {
    host: String,
    port: u16,
    store: Arc<dyn RecordStore>,
    identity: Arc<dyn IdentityProvider>,
    handle: Option<thread::JoinHandle<()>>,
    server_handle: Option<actix_web::dev::ServerHandle>,
}

impl ScoreServer {
    pub fn new(
        host: &str,
        port: u16,
        store: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            store,
            identity,
            handle: None,
            server_handle: None,
        }
    }

    /// Start the server on a background thread, returning the bound port
    /// (useful when constructed with port 0).
    pub fn start(&mut self) -> std::io::Result<u16> {
        let host = self.host.clone();
        let port = self.port;
        let store = self.store.clone();
        let identity = self.identity.clone();

        let (tx, rx) = std::sync::mpsc::channel();

        let handle = thread::spawn(move || {
            let runtime = Runtime::new().expect("failed to create tokio runtime");
            runtime.block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(web::Data::new(ScoreAppState {
                            store: store.clone(),
                            identity: identity.clone(),
                        }))
                        .configure(routes)
                })
                .bind(format!("{}:{}", host, port))
                .expect("failed to bind score server");

                let bound_port = server
                    .addrs()
                    .first()
                    .map(|addr| addr.port())
                    .unwrap_or(port);

                let server = server.run();
                tx.send((bound_port, server.handle()))
                    .expect("failed to report bound port");

                info!("score server listening on {}:{}", host, bound_port);
                server.await.expect("score server failed to run");
            });
        });

        let (bound_port, server_handle) = rx.recv().expect("score server did not start");
        self.port = bound_port;
        self.handle = Some(handle);
        self.server_handle = Some(server_handle);
        Ok(bound_port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Graceful shutdown: stop accepting, drain in-flight requests, join the
    /// server thread. Stopping a server that is not running is a no-op.
    pub fn stop(&mut self) {
        if let Some(server_handle) = self.server_handle.take() {
            let runtime = Runtime::new().expect("failed to create tokio runtime");
            runtime.block_on(server_handle.stop(true));
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("score server stopped");
        }
    }
}

impl Drop for ScoreServer {
    fn drop(&mut self) {
        self.stop();
    }
}
