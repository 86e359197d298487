//! Integration tests for the monitoring loop
//!
//! Drives scans against a scripted API and checks what reaches the attached
//! session and the registry.

mod common;

use common::{GatedSink, RecordingSink, ScriptedApi};
use guepard_lib::api::ApiError;
use guepard_lib::subscriptions::dispatcher::CHANGE_LOGGER;
use guepard_lib::subscriptions::monitor::MIN_INTERVAL;
use guepard_lib::subscriptions::{MonitoringLoop, NotificationDispatcher, SubscriptionRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    api: Arc<ScriptedApi>,
    sink: Arc<RecordingSink>,
    registry: SubscriptionRegistry,
    monitor: MonitoringLoop,
}

fn setup() -> Fixture {
    let api = ScriptedApi::new();
    let sink = RecordingSink::new();
    let registry = SubscriptionRegistry::new();
    let dispatcher = NotificationDispatcher::new();
    dispatcher.attach("session-test", sink.clone());
    let monitor = MonitoringLoop::new(
        registry.clone(),
        api.clone(),
        dispatcher,
        Duration::from_secs(10),
    );
    Fixture {
        api,
        sink,
        registry,
        monitor,
    }
}

#[tokio::test]
async fn test_first_observation_is_baseline_only() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "active", Some("running"));

    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.events, 0);
    assert!(f.sink.all().is_empty());

    // Unchanged state stays quiet
    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.events, 0);
    assert!(f.sink.all().is_empty());
}

#[tokio::test]
async fn test_status_transition_is_reported_once() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "pending", None);
    f.monitor.scan_once().await;

    f.api.set_status("dep-a", "active", None);
    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.events, 1);

    let logs = f.sink.logs(CHANGE_LOGGER);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["event"], "status_changed");
    assert_eq!(logs[0]["deployment_id"], "dep-a");
    assert_eq!(logs[0]["old_value"], "pending");
    assert_eq!(logs[0]["new_value"], "active");

    // Baseline advanced to the new state
    f.monitor.scan_once().await;
    assert_eq!(f.sink.logs(CHANGE_LOGGER).len(), 1);
}

#[tokio::test]
async fn test_both_fields_changing_emit_two_events_in_order() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "stopped", Some("stopped"));
    f.monitor.scan_once().await;

    f.api.set_status("dep-a", "active", Some("running"));
    f.monitor.scan_once().await;

    let logs = f.sink.logs(CHANGE_LOGGER);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["event"], "status_changed");
    assert_eq!(logs[1]["event"], "compute_status_changed");
    assert_eq!(logs[1]["new_value"], "running");
}

#[tokio::test]
async fn test_failure_is_isolated_per_deployment() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.registry.subscribe("dep-b", None);
    f.api.fail("dep-a", ApiError::Status {
        code: 500,
        message: "boom".to_string(),
    });
    f.api.set_status("dep-b", "pending", None);
    f.monitor.scan_once().await;

    f.api.set_status("dep-b", "active", None);
    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.events, 1);

    let logs = f.sink.logs(CHANGE_LOGGER);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["deployment_id"], "dep-b");

    // A failed fetch leaves no baseline; recovery establishes one silently
    assert!(f.registry.snapshot("dep-a").is_none());
    f.api.set_status("dep-a", "active", None);
    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.failed, 0);
    assert_eq!(f.sink.logs(CHANGE_LOGGER).len(), 1);
    assert!(f.registry.snapshot("dep-a").is_some());
}

#[tokio::test]
async fn test_failure_keeps_previous_baseline() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "active", None);
    f.monitor.scan_once().await;

    f.api.fail("dep-a", ApiError::Network("reset".to_string()));
    f.monitor.scan_once().await;
    assert_eq!(
        f.registry.snapshot("dep-a").unwrap().status(),
        Some(&json!("active"))
    );

    // Same status after the outage: nothing to report
    f.api.set_status("dep-a", "active", None);
    f.monitor.scan_once().await;
    assert!(f.sink.all().is_empty());
}

#[tokio::test]
async fn test_unsubscribe_during_scan_discards_result() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.registry.subscribe("dep-b", None);
    f.api.set_status("dep-a", "pending", None);
    f.api.set_status("dep-b", "pending", None);
    f.monitor.scan_once().await;

    f.api.set_status("dep-a", "active", None);
    f.api.set_status("dep-b", "active", None);
    let gate = f.api.gate("dep-a");

    let monitor = f.monitor.clone();
    let scan = tokio::spawn(async move { monitor.scan_once().await });

    // Wait until the fetch for dep-a is in flight
    while f.api.calls("dep-a") < 2 {
        tokio::task::yield_now().await;
    }
    assert!(f.registry.unsubscribe("dep-a"));
    gate.notify_one();

    let summary = scan.await.unwrap();
    assert_eq!(summary.discarded, 1);
    assert!(!f.registry.contains("dep-a"));
    assert!(f.registry.entry("dep-a").is_none());

    let logs = f.sink.logs(CHANGE_LOGGER);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["deployment_id"], "dep-b");
}

#[tokio::test]
async fn test_subscribe_during_scan_joins_next_cycle() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "pending", None);
    let gate = f.api.gate("dep-a");

    let monitor = f.monitor.clone();
    let scan = tokio::spawn(async move { monitor.scan_once().await });
    while f.api.calls("dep-a") < 1 {
        tokio::task::yield_now().await;
    }

    f.registry.subscribe("dep-b", None);
    f.api.set_status("dep-b", "active", None);
    gate.notify_one();

    // The running cycle works from the list it started with
    let summary = scan.await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(f.api.calls("dep-b"), 0);
    assert!(f.registry.snapshot("dep-b").is_none());

    gate.notify_one();
    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.scanned, 2);
    assert_eq!(f.api.calls("dep-b"), 1);
    assert_eq!(
        f.registry.snapshot("dep-b").unwrap().status(),
        Some(&json!("active"))
    );
    assert!(f.sink.all().is_empty());
}

#[tokio::test]
async fn test_scan_without_session_still_tracks_state() {
    let api = ScriptedApi::new();
    let registry = SubscriptionRegistry::new();
    let monitor = MonitoringLoop::new(
        registry.clone(),
        api.clone(),
        NotificationDispatcher::new(),
        Duration::from_secs(10),
    );
    registry.subscribe("dep-a", None);
    api.set_status("dep-a", "pending", None);
    monitor.scan_once().await;

    api.set_status("dep-a", "active", None);
    let summary = monitor.scan_once().await;
    assert_eq!(summary.events, 1);
    assert_eq!(
        registry.snapshot("dep-a").unwrap().status(),
        Some(&json!("active"))
    );
}

#[tokio::test]
async fn test_empty_registry_scan_is_noop() {
    let f = setup();
    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.scanned, 0);
    assert!(!summary.cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_start_is_single_flight() {
    let f = setup();
    assert!(!f.monitor.is_running().await);
    assert_eq!(f.monitor.interval().await, None);

    assert!(f.monitor.start(Duration::ZERO).await);
    assert!(!f.monitor.start(Duration::from_secs(60)).await);
    assert!(f.monitor.is_running().await);
    assert_eq!(f.monitor.interval().await, Some(MIN_INTERVAL));

    assert!(f.monitor.stop().await);
    assert!(!f.monitor.stop().await);
    assert!(!f.monitor.is_running().await);

    // Restart after stop is allowed
    assert!(f.monitor.start(Duration::from_secs(5)).await);
    assert!(f.monitor.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_loop_reports_changes_until_stopped() {
    let f = setup();
    let interval = Duration::from_secs(5);
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "pending", None);

    assert!(f.monitor.start(interval).await);

    // First scan runs immediately and only records the baseline
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.api.calls("dep-a"), 1);
    assert!(f.sink.all().is_empty());

    f.api.set_status("dep-a", "active", None);
    tokio::time::sleep(interval).await;
    assert_eq!(f.sink.logs(CHANGE_LOGGER).len(), 1);

    assert!(f.monitor.stop().await);
    let calls_at_stop = f.api.calls("dep-a");

    f.api.set_status("dep-a", "stopped", None);
    tokio::time::sleep(interval * 3).await;
    assert_eq!(f.api.calls("dep-a"), calls_at_stop);
    assert_eq!(f.sink.logs(CHANGE_LOGGER).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_blocked_scan() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.api.set_status("dep-a", "pending", None);
    let _gate = f.api.gate("dep-a");

    assert!(f.monitor.start(Duration::from_secs(5)).await);
    while f.api.calls("dep-a") == 0 {
        tokio::task::yield_now().await;
    }

    // The fetch never completes; stop must still return
    assert!(f.monitor.stop().await);
    assert!(f.registry.snapshot("dep-a").is_none());
    assert!(f.sink.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_times_out() {
    let f = setup();
    f.registry.subscribe("dep-a", None);
    f.registry.subscribe("dep-b", None);
    f.api.set_status("dep-a", "pending", None);
    f.api.set_status("dep-b", "pending", None);
    let _gate = f.api.gate("dep-a");

    let summary = f.monitor.scan_once().await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.updated, 1);
    assert!(f.registry.snapshot("dep-b").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_change_being_dispatched() {
    let api = ScriptedApi::new();
    let sink = GatedSink::new();
    let registry = SubscriptionRegistry::new();
    let dispatcher = NotificationDispatcher::new();
    dispatcher.attach("session-test", sink.clone());
    let monitor = MonitoringLoop::new(
        registry.clone(),
        api.clone(),
        dispatcher,
        Duration::from_secs(10),
    );
    registry.subscribe("dep-a", None);
    api.set_status("dep-a", "pending", None);

    assert!(monitor.start(Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.snapshot("dep-a").is_some());

    // Next cycle swaps in "active" and blocks while delivering the change
    api.set_status("dep-a", "active", None);
    while sink.entered() == 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let stopper = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.stop().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!stopper.is_finished());

    sink.open();
    assert!(stopper.await.unwrap());
    assert_eq!(sink.recorded().logs(CHANGE_LOGGER).len(), 1);
    assert_eq!(
        registry.snapshot("dep-a").unwrap().status(),
        Some(&json!("active"))
    );

    // A restarted loop sees no further change and reports nothing twice
    assert!(monitor.start(Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(monitor.stop().await);
    assert_eq!(sink.entered(), 1);
    assert_eq!(sink.recorded().logs(CHANGE_LOGGER).len(), 1);
}
