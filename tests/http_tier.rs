//! HTTP tier against a local listing server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Html;
use axum::routing::get;
use axum::Router;

use jobharvest::config::{HarvestSettings, ProxyConfig};
use jobharvest::models::{PageRequest, Tier};
use jobharvest::scrapers::{BlockReason, HttpTier, Pacer, PageOutcome, PageSource};

#[derive(Clone, Default)]
struct Server {
    hits: Arc<AtomicUsize>,
    seen_headers: Arc<Mutex<Vec<(String, String)>>>,
}

fn listing_html() -> String {
    format!(
        "<html><head><title>Chef jobs</title></head><body><main>{}</main>\
         <script>window.__PRELOADED_STATE__ = window.__PRELOADED_STATE__ || {{}};\
         window.__PRELOADED_STATE__[\"app-unifiedResultlist\"] = {{\"searchResults\":{{\
         \"items\":[{{\"title\":\"Head Chef\",\"url\":\"/job/head-chef-job1\"}},\
         {{\"title\":\"Commis Chef\",\"url\":\"/job/commis-chef-job2\"}}],\
         \"pagination\":{{\"currentPage\":1,\"pageCount\":4}}}}}};</script></body></html>",
        "<div class=\"card\">listing</div>".repeat(200)
    )
}

async fn jobs(State(server): State<Server>, headers: HeaderMap) -> Html<String> {
    server.hits.fetch_add(1, Ordering::SeqCst);
    let mut seen = server.seen_headers.lock().unwrap();
    for name in ["user-agent", "accept-language", "sec-fetch-mode"] {
        if let Some(v) = headers.get(name).and_then(|v| v.to_str().ok()) {
            seen.push((name.to_string(), v.to_string()));
        }
    }
    Html(listing_html())
}

async fn forbidden(State(server): State<Server>) -> (StatusCode, Html<String>) {
    server.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FORBIDDEN, Html(listing_html()))
}

async fn unavailable(State(server): State<Server>) -> StatusCode {
    server.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn flaky(State(server): State<Server>) -> Result<Html<String>, StatusCode> {
    if server.hits.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(StatusCode::BAD_GATEWAY)
    } else {
        Ok(Html(listing_html()))
    }
}

async fn short() -> Html<&'static str> {
    Html("<html><body>Please wait</body></html>")
}

async fn serve() -> (SocketAddr, Server) {
    let server = Server::default();
    let app = Router::new()
        .route("/jobs", get(jobs))
        .route("/forbidden", get(forbidden))
        .route("/unavailable", get(unavailable))
        .route("/flaky", get(flaky))
        .route("/short", get(short))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

fn tier() -> HttpTier {
    HttpTier::with_pacer(&HarvestSettings::default(), &ProxyConfig::default(), Pacer::disabled())
}

fn request(addr: SocketAddr, path: &str) -> PageRequest {
    PageRequest::new(format!("http://{}{}", addr, path), 1, Tier::Http)
}

#[tokio::test]
async fn parses_listing_and_sends_browser_headers() {
    let (addr, server) = serve().await;

    let outcome = tier().load(&request(addr, "/jobs")).await;

    let PageOutcome::Parsed(state) = outcome else {
        panic!("expected parsed page, got {:?}", outcome);
    };
    assert_eq!(state.items().len(), 2);
    assert_eq!(state.pagination().page_count, 4);

    let seen = server.seen_headers.lock().unwrap().clone();
    let get = |name: &str| seen.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone());
    assert!(get("user-agent").unwrap().starts_with("Mozilla/5.0"));
    assert_eq!(get("accept-language").as_deref(), Some("en-GB,en;q=0.9"));
    assert_eq!(get("sec-fetch-mode").as_deref(), Some("navigate"));
}

#[tokio::test]
async fn forbidden_is_blocked_without_retry() {
    let (addr, server) = serve().await;

    let outcome = tier().load(&request(addr, "/forbidden")).await;

    assert!(matches!(outcome, PageOutcome::Blocked(BlockReason::Forbidden)));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn short_body_is_blocked() {
    let (addr, _) = serve().await;

    let outcome = tier().load(&request(addr, "/short")).await;

    assert!(matches!(outcome, PageOutcome::Blocked(BlockReason::ShortBody(_))));
}

#[tokio::test]
async fn server_errors_retry_then_fail() {
    let (addr, server) = serve().await;

    let outcome = tier().load(&request(addr, "/unavailable")).await;

    assert!(matches!(outcome, PageOutcome::Failed(ref m) if m.contains("503")));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn transient_error_recovers_on_retry() {
    let (addr, server) = serve().await;

    let outcome = tier().load(&request(addr, "/flaky")).await;

    assert!(outcome.is_parsed());
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}
