use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use download_gate::config::GatePolicy;
use download_gate::errors::{AdFetchError, VerificationError};
use download_gate::models::PendingDownload;
use download_gate::services::{
    AdService, AdSource, ApiClient, FlowState, MemorySessionStorage, NavigationRequest, Navigator,
    PendingDownloadStore, RedirectFlow, VerificationClient, ViewVerifier,
};

#[derive(Clone, Default)]
struct Backend {
    ad: Option<Value>,
    verify_bodies: Arc<Mutex<Vec<Value>>>,
}

async fn random_ad(
    State(backend): State<Backend>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let wanted = query.get("type").map(String::as_str) == Some("download")
        && query.get("placement").map(String::as_str) == Some("button_click");
    match backend.ad.filter(|_| wanted) {
        Some(ad) => Json(json!({ "success": true, "data": { "advertisement": ad } })),
        None => Json(json!({ "success": false, "message": "No advertisement available" })),
    }
}

async fn verify_view(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.verify_bodies.lock().unwrap().push(body.clone());
    if body["adId"] == "invalid_id" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Invalid advertisement" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": { "unlockToken": "tok1", "expiresAt": "2099-01-01T00:00:00Z" }
        })),
    )
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test backend");
    });
    format!("http://{addr}/api")
}

async fn start_backend(backend: Backend) -> ApiClient {
    let router = Router::new()
        .route("/api/advertisements/random", get(random_ad))
        .route("/api/advertisements/verify-view", post(verify_view))
        .with_state(backend);
    ApiClient::new(serve(router).await, Duration::from_secs(5))
}

fn ad_fixture() -> Value {
    json!({ "_id": "ad1", "name": "Sponsor", "settings": { "countdown": 1 } })
}

#[tokio::test]
async fn fetches_download_button_ad() {
    let api = start_backend(Backend {
        ad: Some(ad_fixture()),
        ..Backend::default()
    })
    .await;

    let ad = AdService::new(api)
        .fetch_download_ad()
        .await
        .expect("fetch ad")
        .expect("ad available");
    assert_eq!(ad.id.as_deref(), Some("ad1"));
    assert_eq!(ad.settings.countdown_secs(), Some(1));
}

#[tokio::test]
async fn unsuccessful_ad_envelope_means_no_ad() {
    let api = start_backend(Backend::default()).await;
    let ad = AdService::new(api).fetch_download_ad().await.expect("fetch ad");
    assert!(ad.is_none());
}

#[tokio::test]
async fn missing_route_means_no_ad_and_garbage_is_an_error() {
    let api = ApiClient::new(serve(Router::new()).await, Duration::from_secs(5));
    assert!(AdService::new(api).fetch_download_ad().await.unwrap().is_none());

    let router = Router::new().route(
        "/api/advertisements/random",
        get(|| async { (StatusCode::OK, "<html>maintenance</html>") }),
    );
    let api = ApiClient::new(serve(router).await, Duration::from_secs(5));
    assert!(AdService::new(api).fetch_download_ad().await.is_err());
}

#[tokio::test]
async fn verify_sends_contract_body_with_fresh_tokens() {
    let backend = Backend::default();
    let bodies = backend.verify_bodies.clone();
    let verifier = VerificationClient::new(start_backend(backend).await);

    let grant = verifier
        .verify_view("ad1", "https://x.test/a.apk")
        .await
        .expect("verify");
    assert_eq!(grant.unlock_token, "tok1");
    verifier
        .verify_view("ad1", "https://x.test/a.apk")
        .await
        .expect("verify again");

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["adId"], "ad1");
    assert_eq!(bodies[0]["downloadUrl"], "https://x.test/a.apk");
    assert!(bodies[0]["downloadToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert_ne!(bodies[0]["downloadToken"], bodies[1]["downloadToken"]);
}

#[tokio::test]
async fn invalid_ad_id_is_rejected() {
    let verifier = VerificationClient::new(start_backend(Backend::default()).await);
    let err = verifier
        .verify_view("invalid_id", "https://x.test/a.apk")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VerificationError::Rejected("Invalid advertisement".to_string())
    );
}

#[tokio::test]
async fn unreadable_success_body_is_malformed() {
    let router = Router::new().route(
        "/api/advertisements/verify-view",
        post(|| async { (StatusCode::OK, "ok") }),
    );
    let api = ApiClient::new(serve(router).await, Duration::from_secs(5));
    let err = VerificationClient::new(api)
        .verify_view("ad1", "https://x.test/a.apk")
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::MalformedResponse(_)));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let api = ApiClient::new(format!("http://{addr}/api"), Duration::from_secs(2));
    let err = VerificationClient::new(api)
        .verify_view("ad1", "https://x.test/a.apk")
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::Network(_)));
}

#[tokio::test]
async fn unreachable_ad_backend_reports_transport_error_once() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let api = ApiClient::new(format!("http://{addr}/api"), Duration::from_secs(2));
    let err = AdService::new(api).fetch_download_ad().await.unwrap_err();
    assert!(matches!(err, AdFetchError::Network(_)));
    let message = err.to_string();
    assert!(message.starts_with("advertisement request failed: "), "{message}");
    assert!(!message.contains("Network error"), "{message}");
}

#[tokio::test]
async fn ad_with_null_settings_uses_default_countdown() {
    let api = start_backend(Backend {
        ad: Some(json!({ "_id": "ad1", "settings": null })),
        ..Backend::default()
    })
    .await;

    let ad = AdService::new(api)
        .fetch_download_ad()
        .await
        .expect("fetch ad")
        .expect("ad available");
    assert_eq!(ad.id.as_deref(), Some("ad1"));
    assert_eq!(ad.settings.countdown_secs(), None);
}

#[derive(Clone, Default)]
struct RecordingNavigator {
    requests: Arc<Mutex<Vec<NavigationRequest>>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, request: &NavigationRequest) -> io::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

#[tokio::test]
async fn redirect_flow_unlocks_against_http_backend() {
    let backend = Backend {
        ad: Some(ad_fixture()),
        ..Backend::default()
    };
    let bodies = backend.verify_bodies.clone();
    let api = start_backend(backend).await;

    let store = PendingDownloadStore::new(Arc::new(MemorySessionStorage::new()));
    store
        .set(&PendingDownload {
            url: "https://x.test/a.apk".to_string(),
            app_name: "Test App".to_string(),
            app_slug: None,
            app_id: None,
            size: None,
            version: None,
            timestamp: 1_700_000_000_000,
        })
        .unwrap();

    let navigator = RecordingNavigator::default();
    let requests = navigator.requests.clone();
    let mut flow = RedirectFlow::new(
        AdService::new(api.clone()),
        VerificationClient::new(api),
        navigator,
        store.clone(),
        GatePolicy::default(),
    );

    let (_events_tx, mut events) = mpsc::channel(1);
    let state = flow.run(&mut events).await;

    assert!(matches!(state, FlowState::Unlocked { .. }), "{state:?}");
    assert_eq!(bodies.lock().unwrap().len(), 1);
    assert_eq!(requests.lock().unwrap()[0].unlock_token, "tok1");
    assert_eq!(store.get(), None);
}
