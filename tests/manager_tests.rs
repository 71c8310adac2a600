//! Fan-out searches through the indexer manager

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use common::*;
use indexer_core::config::parse_indexer_settings;
use indexer_core::indexer::{RawResponse, SearchCriteria};
use indexer_core::{CoreConfig, IndexerError, IndexerManager, IndexerSettings};

fn config() -> CoreConfig {
    CoreConfig {
        default_rate_limit: Duration::ZERO,
        ..Default::default()
    }
}

fn manager(transport: Arc<MockTransport>, config: CoreConfig) -> IndexerManager {
    let executor = executor(transport, config.default_rate_limit);
    IndexerManager::with_executor(config, executor)
}

fn host_of(url: &str) -> &str {
    url.trim_start_matches("https://")
        .split('/')
        .next()
        .unwrap_or_default()
}

#[tokio::test]
async fn test_failing_indexer_does_not_affect_others() {
    let transport = MockTransport::new(|req| {
        if host_of(&req.url) == "broken.example" {
            return Ok(RawResponse::new(req, 503, "down for maintenance"));
        }
        if is_login(&req) {
            Ok(login_ok(req))
        } else {
            Ok(html(req, gazelle_page(1, 3)))
        }
    });
    let manager = manager(transport, config());
    manager.register(gazelle("good"));
    manager.register(newznab("broken"));

    let results = manager.search_all(&SearchCriteria::search("release")).await;

    let ids: Vec<_> = results.iter().map(|r| r.indexer_id.as_str()).collect();
    assert_eq!(ids, vec!["broken", "good"]);

    assert!(results[0].releases.is_empty());
    assert_matches!(
        results[0].warnings.as_slice(),
        [IndexerError::HttpStatus { status: 503, .. }]
    );
    assert!(results[1].is_complete());
    assert_eq!(results[1].releases.len(), 3);
}

#[tokio::test]
async fn test_complete_results_are_cached() {
    let transport = MockTransport::new(|req| {
        if is_login(&req) {
            Ok(login_ok(req))
        } else {
            Ok(html(req, gazelle_page(1, 3)))
        }
    });
    let manager = manager(transport.clone(), config());
    manager.register(gazelle("bb"));
    let criteria = SearchCriteria::search("release");

    let first = manager.search_indexers(&["bb"], &criteria).await;
    let second = manager.search_indexers(&["bb"], &criteria).await;

    assert!(!first[0].from_cache);
    assert!(second[0].from_cache);
    assert_eq!(first[0].releases, second[0].releases);
    assert_eq!(transport.count("torrents.php"), 1);

    let fresh = manager.search_indexers(&["bb"], &criteria.clone().without_cache()).await;
    assert!(!fresh[0].from_cache);
    assert_eq!(transport.count("torrents.php"), 2);

    manager.clear_cache();
    let after_clear = manager.search_indexers(&["bb"], &criteria).await;
    assert!(!after_clear[0].from_cache);
}

#[tokio::test]
async fn test_partial_results_are_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let transport = MockTransport::new(move |req| {
        if is_login(&req) {
            return Ok(login_ok(req));
        }
        counter.fetch_add(1, Ordering::SeqCst);
        match page_of(&req) {
            1 => Ok(html(req, gazelle_page(1, 50))),
            _ => Ok(RawResponse::new(req, 404, "gone")),
        }
    });
    let manager = manager(transport, config());
    manager.register(gazelle("bb"));
    let criteria = SearchCriteria::search("release");

    let first = manager.search_all(&criteria).await;
    assert!(first[0].is_partial());
    let second = manager.search_all(&criteria).await;
    assert!(!second[0].from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_search_timeout_cancels_slow_indexers() {
    let transport = MockTransport::with_latency(Duration::from_millis(500), |req| {
        Ok(RawResponse::new(req, 200, newznab_feed(&["Slow.Release"])))
    });
    let config = CoreConfig {
        search_timeout: Some(Duration::from_millis(100)),
        ..config()
    };
    let manager = manager(transport, config);
    manager.register(newznab("slow"));

    let start = Instant::now();
    let results = manager.search_all(&SearchCriteria::search("release")).await;

    assert!(start.elapsed() < Duration::from_millis(400));
    assert_eq!(results[0].warnings, vec![IndexerError::Cancelled]);
}

#[tokio::test]
async fn test_caller_cancellation() {
    let transport = MockTransport::with_latency(Duration::from_millis(300), |req| {
        Ok(RawResponse::new(req, 200, newznab_feed(&["Release"])))
    });
    let manager = manager(transport, config());
    manager.register(newznab("a"));
    manager.register(newznab("b"));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let results = manager
        .search_with_cancel(None, &SearchCriteria::search("release"), &cancel)
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.warnings == vec![IndexerError::Cancelled]));
}

#[tokio::test]
async fn test_dropped_search_stops_dispatching() {
    let transport = MockTransport::with_latency(Duration::from_millis(100), |req| {
        if is_login(&req) {
            Ok(login_ok(req))
        } else {
            Ok(html(req, gazelle_page(1, 50)))
        }
    });
    let manager = manager(transport.clone(), config());
    manager.register(gazelle("bb"));

    let outcome = tokio::time::timeout(
        Duration::from_millis(30),
        manager.search_all(&SearchCriteria::search("release")),
    )
    .await;
    assert!(outcome.is_err());

    let at_drop = transport.sent().len();
    assert_eq!(at_drop, 1);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.sent().len(), at_drop);
    assert_eq!(
        manager.auth().state("bb"),
        indexer_core::indexer::AuthState::Unauthenticated
    );
}

#[tokio::test]
async fn test_load_indexers_from_yaml() {
    let transport = MockTransport::new(|req| Ok(RawResponse::new(req, 200, newznab_feed(&[]))));
    let manager = manager(transport, config());

    let settings = parse_indexer_settings(
        r#"
indexers:
  - id: bb
    implementation: gazelle
    name: BaconBits
    base_url: https://bb.example/
    username: alice
    password: hunter2
    rate_limit_ms: 5000
  - id: geek
    implementation: newznab
    name: NZBGeek
    base_url: https://api.geek.example
    api_key: abc
  - id: nokey
    implementation: newznab
    name: Missing key
    base_url: https://nokey.example
  - id: off
    implementation: newznab
    name: Disabled
    enabled: false
    base_url: https://off.example
    api_key: abc
"#,
    )
    .unwrap();

    assert_eq!(manager.load_indexers(&settings), 2);
    let ids: Vec<_> = manager
        .get_all_indexers()
        .iter()
        .map(|i| i.id().to_string())
        .collect();
    assert_eq!(ids, vec!["bb", "geek"]);
    assert!(manager.get_indexer("nokey").is_none());

    manager.unload_indexer("geek");
    assert!(manager.get_indexer("geek").is_none());
}

#[tokio::test]
async fn test_load_indexer_applies_rate_limit() {
    let transport = MockTransport::new(|req| Ok(RawResponse::new(req, 200, "")));
    let executor = executor(transport, Duration::ZERO);
    let manager = IndexerManager::with_executor(config(), executor.clone());

    let mut settings = IndexerSettings::new("geek", "newznab", "https://geek.example");
    settings.api_key = Some("abc".into());
    settings.rate_limit_ms = Some(750);
    assert_ok!(manager.load_indexer(&settings));

    assert_eq!(executor.rate_limit("geek"), Duration::from_millis(750));
    assert_eq!(executor.rate_limit("other"), Duration::ZERO);
}

#[tokio::test]
async fn test_indexer_health_check() {
    let transport = MockTransport::new(|req| {
        if host_of(&req.url) == "bad.example" {
            Ok(html(req, LOGIN_FORM.to_string()))
        } else if is_login(&req) {
            Ok(login_ok(req))
        } else {
            Ok(html(req, gazelle_page(1, 1)))
        }
    });
    let manager = manager(transport, config());
    manager.register(gazelle("good"));
    manager.register(gazelle("bad"));

    assert!(manager.test_indexer("good").await.unwrap());
    assert!(manager.test_indexer("bad").await.is_err());
    assert!(manager.test_indexer("missing").await.is_err());
}
