//! Message Bus round trips, including the Page Integrator on top of it.

mod common;

use std::time::Instant;

use serde_json::json;
use tokio::sync::broadcast;

use orp_core::config::PageSettings;
use orp_core::{BusRequest, BusResponse, ResolveChannel, TransportFailure};
use orp_interceptor::bus::{self, BusHandle};
use orp_page::{ClickOutcome, Document, PageIntegrator, ERROR_CLASS};

fn start_bus(known: &[&'static str]) -> (BusHandle, broadcast::Sender<()>) {
    let (resolver, _) = common::resolver(known);
    let (handle, rx) = BusHandle::channel(8);
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(bus::serve(resolver, rx, shutdown_tx.subscribe()));
    (handle, shutdown_tx)
}

#[tokio::test]
async fn resolve_returns_resolved_url() {
    let (bus, _shutdown) = start_bus(&["node-1"]);

    let answer = bus.resolve("orp://node-1/profile").await.expect("answer");
    assert!(answer.success);
    assert_eq!(answer.url(), Some("http://localhost:9001/profile"));
    assert_eq!(
        serde_json::to_value(&answer).expect("json"),
        json!({"success": true, "resolvedUrl": "http://localhost:9001/profile"})
    );
}

#[tokio::test]
async fn unresolved_address_answers_success_false_with_error() {
    let (bus, _shutdown) = start_bus(&[]);

    let answer = bus.resolve("orp://ghost/x").await.expect("answer");
    assert!(!answer.success);
    assert_eq!(answer.url(), None);
    assert!(answer.error.as_deref().unwrap_or_default().contains("orp://ghost/x"));
}

#[tokio::test]
async fn cache_stats_and_clear() {
    let (bus, _shutdown) = start_bus(&["node-1"]);
    bus.resolve("orp://node-1/a").await.expect("resolve");

    let stats = bus.cache_stats().await.expect("stats");
    assert_eq!(stats.cache_size, 1);
    assert_eq!(stats.entries[0].url, "orp://node-1/a");
    assert_eq!(stats.entries[0].resolved_url, "http://localhost:9001/a");

    let wire = serde_json::to_value(&stats).expect("json");
    assert!(wire.get("cacheSize").is_some());
    assert!(wire["entries"][0].get("resolvedUrl").is_some());
    assert!(wire["entries"][0]["timestamp"].as_u64().expect("timestamp") > 0);

    assert!(bus.clear_cache().await.expect("clear").success);
    assert_eq!(bus.cache_stats().await.expect("stats").cache_size, 0);
}

#[tokio::test]
async fn concurrent_callers_each_get_their_own_answer() {
    let (bus, _shutdown) = start_bus(&["a", "b"]);

    let (a, b, stats) = tokio::join!(
        bus.resolve("orp://a/one"),
        bus.resolve("orp://b/two"),
        bus.stats(),
    );
    assert_eq!(a.expect("a").url(), Some("http://localhost:9001/one"));
    assert_eq!(b.expect("b").url(), Some("http://localhost:9001/two"));
    stats.expect("stats");
}

#[tokio::test]
async fn shutdown_is_refused_in_process() {
    let (bus, _shutdown) = start_bus(&[]);
    let response = bus.call(BusRequest::Shutdown).await.expect("response");
    assert!(matches!(response, BusResponse::Rejected { success: false, .. }));
}

#[tokio::test]
async fn stopped_bus_is_a_transport_failure() {
    let (bus, shutdown) = start_bus(&["node-1"]);
    shutdown.send(()).expect("shutdown");
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    let err = bus.resolve("orp://node-1/").await.unwrap_err();
    assert!(matches!(
        err,
        TransportFailure::Closed(_) | TransportFailure::NoResponse(_)
    ));
}

#[tokio::test]
async fn page_click_resolves_over_the_bus() {
    let (bus, _shutdown) = start_bus(&["node-1"]);
    let doc = Document::parse(
        r#"<body><p>Visit <a id="ok" href="orp://node-1/profile">me</a> or orp://ghost/page</p></body>"#,
    );
    let (mut page, report) = PageIntegrator::attach(doc, &PageSettings::default());
    assert_eq!(report.links_created, 1);

    let ok = page.document().element_by_id("ok").expect("anchor");
    let outcome = page.handle_click(ok, &bus).await;
    assert_eq!(
        outcome,
        ClickOutcome::Navigated("http://localhost:9001/profile".to_string())
    );

    let doc = page.document();
    let ghost = doc
        .elements_with_class(doc.root(), orp_page::AUTO_LINK_CLASS)
        .first()
        .copied()
        .expect("detected link");
    let outcome = page.handle_click(ghost, &bus).await;
    assert!(matches!(outcome, ClickOutcome::Failed { .. }));
    let doc = page.document();
    assert_eq!(doc.elements_with_class(ghost, ERROR_CLASS).len(), 1);

    assert_eq!(page.expire_annotations(Instant::now() + std::time::Duration::from_secs(6)), 1);
    assert!(page.document().elements_with_class(ghost, ERROR_CLASS).is_empty());
}
