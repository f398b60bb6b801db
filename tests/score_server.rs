use std::sync::Arc;

use actix_web::{http::Method, test, web, App};
use sakhi_core::backend::{MemoryBackend, SafeHaven, HavenKind, User};
use sakhi_core::score_server::{routes, ScoreAppState, ScoreServer};
use serde_json::{json, Value};

fn backend_with_user() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user(
        "token-1",
        User {
            id: "user-1".to_owned(),
            email: Some("user@example.com".to_owned()),
        },
    );
    backend
}

macro_rules! score_app {
    ($backend:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(ScoreAppState {
                    store: $backend.clone(),
                    identity: $backend.clone(),
                }))
                .configure(routes),
        )
        .await
    };
}

fn route_body() -> Value {
    json!({
        "routePoints": [
            {"lat": 0.0, "lng": 0.0},
            {"lat": 0.0, "lng": 0.009},
        ]
    })
}

#[actix_web::test]
async fn preflight_carries_cors_headers() {
    let backend = backend_with_user();
    let app = score_app!(backend);

    let req = test::TestRequest::with_uri("/calculate-safety-score")
        .method(Method::OPTIONS)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
    assert_eq!(
        headers.get("Access-Control-Allow-Headers").unwrap(),
        "Content-Type, Authorization, X-Client-Info, Apikey"
    );
}

#[actix_web::test]
async fn missing_or_bad_bearer_token_is_rejected() {
    let backend = backend_with_user();
    let app = score_app!(backend);

    let req = test::TestRequest::post()
        .uri("/calculate-safety-score")
        .set_json(route_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    // errors carry CORS headers too
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unauthorized");

    let req = test::TestRequest::post()
        .uri("/calculate-safety-score")
        .insert_header(("Authorization", "Bearer wrong-token"))
        .set_json(route_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn malformed_or_short_routes_are_rejected() {
    let backend = backend_with_user();
    let app = score_app!(backend);

    let req = test::TestRequest::post()
        .uri("/calculate-safety-score")
        .insert_header(("Authorization", "Bearer token-1"))
        .set_json(json!({"routePoints": [{"lat": 0.0, "lng": 0.0}]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid route points");

    let req = test::TestRequest::post()
        .uri("/calculate-safety-score")
        .insert_header(("Authorization", "Bearer token-1"))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid route points");
}

#[actix_web::test]
async fn successful_assessment_has_the_contract_shape() {
    let backend = backend_with_user();
    backend.havens.lock().unwrap().push(SafeHaven {
        id: "h1".to_owned(),
        name: "Night pharmacy".to_owned(),
        kind: HavenKind::AllDayBusiness,
        latitude: 0.001,
        longitude: 0.0,
        is_verified: true,
        address: None,
        phone: None,
    });
    let app = score_app!(backend);

    let req = test::TestRequest::post()
        .uri("/calculate-safety-score")
        .insert_header(("Authorization", "Bearer token-1"))
        .set_json(route_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    // 50 base + 5 for one haven + 10 short-route bonus
    assert_eq!(body["safetyScore"], 65);
    assert_eq!(body["recommendation"], "Moderate caution advised");
    assert_eq!(body["factors"]["safeHavensNearby"], 1);
    assert_eq!(body["factors"]["unsafeReportsNearby"], 0);
    assert_eq!(body["factors"]["verifiedSafeSpots"], 0);
    assert!(body["factors"]["routeLength"].as_f64().unwrap() < 2.0);
}

#[::core::prelude::v1::test]
fn server_starts_on_an_ephemeral_port_and_stops() {
    let backend = backend_with_user();
    let mut server = ScoreServer::new("127.0.0.1", 0, backend.clone(), backend.clone());
    let port = server.start().unwrap();
    assert_ne!(port, 0);
    assert_eq!(server.port(), port);

    // graceful shutdown joins the server thread and releases the port
    server.stop();
    let rebound = std::net::TcpListener::bind(("127.0.0.1", port));
    assert!(rebound.is_ok(), "port {} still held after stop", port);

    // stopping twice is a no-op (and drop will call it once more)
    server.stop();
}
