//! Integration tests - detection ingest through the full engine
//!
//! Exercises the pipeline end-to-end without HTTP: telemetry in,
//! detections in, resolved notifications and catalog merges out, with
//! push and polling observers reconciling to the same live set.

use roadmark_common::detection::{DetectionFrame, RawDetection, VehicleTelemetry};
use roadmark_common::geo::{self, Coordinate};
use roadmark_common::notification::{CatalogVerdict, Notification, NotificationPhase};
use roadmark_common::observer::ObserverView;
use roadmark_gt::catalog::PotholeCatalog;
use roadmark_gt::config::RuntimeSettings;
use roadmark_gt::db::init_database;
use roadmark_gt::engine::GeotagEngine;
use std::sync::Arc;
use tempfile::TempDir;

async fn test_engine(dir: &TempDir) -> Arc<GeotagEngine> {
    let pool = init_database(&dir.path().join("catalog.db"))
        .await
        .expect("database init");
    let settings = RuntimeSettings::default();
    let catalog = PotholeCatalog::open(pool, &settings)
        .await
        .expect("catalog open");
    Arc::new(GeotagEngine::new(catalog, &settings))
}

fn eastbound_telemetry() -> VehicleTelemetry {
    VehicleTelemetry {
        position: Coordinate::new(0.0, 0.0),
        next_waypoint: Coordinate::new(0.0, 0.001),
    }
}

fn frame(detections: Vec<RawDetection>) -> DetectionFrame {
    DetectionFrame {
        frame_index: 1,
        detections,
        total_frames: None,
        timestamp_ms: 1_700_000_000_000,
    }
}

fn detection(track_id: i64, forward_m: f64, lateral_m: f64) -> RawDetection {
    RawDetection {
        track_id,
        forward_distance_m: forward_m,
        lateral_offset_m: lateral_m,
        size_m2: 0.03,
        coordinate: None,
    }
}

#[tokio::test]
async fn test_eastbound_detection_resolves_ahead_and_right() {
    // Vehicle at the origin heading ~111 m east; defect 15.5 m ahead and
    // 0.2 m to the right lands ~15.5 m east, ~0.2 m south
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();
    let notifications = engine
        .ingest_frame(frame(vec![detection(1, 15.5, 0.2)]))
        .await;

    assert_eq!(notifications.len(), 1);
    let n = &notifications[0];
    assert_eq!(n.phase, NotificationPhase::DistanceTracking);
    assert_eq!(n.verdict, Some(CatalogVerdict::NewEntry));

    let coordinate = n.coordinate.expect("resolved coordinate");
    assert!(coordinate.longitude > 0.0);
    assert!(coordinate.latitude < 0.0);

    let expected = (15.5f64.powi(2) + 0.2f64.powi(2)).sqrt();
    let distance = n.current_distance_m.expect("tracked distance");
    assert!(
        (distance - expected).abs() < 0.01,
        "distance {} vs expected {}",
        distance,
        expected
    );

    assert_eq!(engine.catalog().len().await, 1);
}

#[tokio::test]
async fn test_pending_detection_is_reconciled_on_next_tick() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;
    let mut rx = engine.hub().subscribe();

    // No telemetry yet: the detection must register pending, not be lost
    let notifications = engine
        .ingest_frame(frame(vec![detection(2, 10.0, -0.3)]))
        .await;
    let id = notifications[0].id;
    assert_eq!(notifications[0].phase, NotificationPhase::PendingCoordinate);
    assert!(notifications[0].coordinate.is_none());
    assert_eq!(engine.catalog().len().await, 0);

    // First tick resolves it, merges the catalog, and tells observers
    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();

    let resolved = engine.hub().get(id).await.expect("still live");
    assert_eq!(resolved.phase, NotificationPhase::DistanceTracking);
    assert!(resolved.coordinate.is_some());
    assert_eq!(engine.catalog().len().await, 1);

    let mut saw_coordinate_update = false;
    while let Ok(event) = rx.try_recv() {
        if event.event_type() == "coordinate_updated" && event.notification_id() == id {
            saw_coordinate_update = true;
        }
    }
    assert!(saw_coordinate_update, "late resolution must reach push observers");
}

#[tokio::test]
async fn test_polling_rederives_unresolved_coordinates() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();

    // A notification that slipped through resolution (e.g. raced the first
    // telemetry tick) must not depend on the push path to resolve
    let stuck = Notification::new(
        roadmark_common::detection::DetectionSnapshot {
            track_id: 9,
            forward_distance_m: 8.0,
            lateral_offset_m: 0.0,
            size_m2: 0.02,
            frame_index: 3,
            frame_fraction: None,
            explicit_coordinate: None,
            timestamp_ms: 0,
        },
        chrono::Utc::now(),
    );
    let id = stuck.id;
    engine.hub().register(stuck).await;

    let polled = engine.poll_notifications().await;
    let n = polled.iter().find(|n| n.id == id).expect("still live");
    assert!(n.coordinate.is_some(), "poll path must re-derive coordinates");
    assert_eq!(engine.catalog().len().await, 1);
}

#[tokio::test]
async fn test_dismissal_leaves_catalog_untouched() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();
    let notifications = engine
        .ingest_frame(frame(vec![detection(3, 12.0, 0.1)]))
        .await;
    let id = notifications[0].id;

    let before = engine.catalog().entries().await;
    assert_eq!(before.len(), 1);

    assert!(engine.dismiss(id).await);
    assert_eq!(engine.hub().len().await, 0);
    assert!(!engine.dismiss(id).await, "dismissal is terminal");

    let after = engine.catalog().entries().await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].detection_count, before[0].detection_count);
}

#[tokio::test]
async fn test_concurrent_ingest_creates_one_entry() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .ingest_frame(frame(vec![detection(i, 15.5, 0.2)]))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Eight live notifications, one physical defect
    assert_eq!(engine.hub().len().await, 8);
    assert_eq!(engine.catalog().len().await, 1);
}

#[tokio::test]
async fn test_push_and_poll_observers_converge() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    let mut rx = engine.hub().subscribe();

    // A realistic mutation sequence: telemetry, two detections, another
    // tick (distance updates), one dismissal
    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();
    let first = engine
        .ingest_frame(frame(vec![detection(1, 15.5, 0.2)]))
        .await;
    engine
        .ingest_frame(frame(vec![detection(2, 40.0, -1.0)]))
        .await;
    engine
        .telemetry_tick(VehicleTelemetry {
            position: Coordinate::new(0.0, 0.00002),
            next_waypoint: Coordinate::new(0.0, 0.001),
        })
        .await
        .unwrap();
    engine.dismiss(first[0].id).await;

    // Push-only observer: applies every event it received
    let mut push_view = ObserverView::new();
    while let Ok(event) = rx.try_recv() {
        push_view.apply_event(&event);
    }

    // Poll-only observer: one reconciliation against the live set
    let mut poll_view = ObserverView::new();
    poll_view.apply_snapshot(&engine.poll_notifications().await);

    assert_eq!(push_view.len(), 1);
    assert!(push_view.converged_with(&poll_view));
    assert!(poll_view.converged_with(&push_view));
}

#[tokio::test]
async fn test_distance_updates_follow_the_vehicle() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();
    let notifications = engine
        .ingest_frame(frame(vec![detection(1, 15.5, 0.0)]))
        .await;
    let id = notifications[0].id;
    let target = notifications[0].coordinate.unwrap();
    let initial = notifications[0].current_distance_m.unwrap();

    // Vehicle advances ~5.5 m east; the defect is now closer
    let advanced = VehicleTelemetry {
        position: Coordinate::new(0.0, 0.00005),
        next_waypoint: Coordinate::new(0.0, 0.001),
    };
    engine.telemetry_tick(advanced).await.unwrap();

    let updated = engine.hub().get(id).await.unwrap();
    let distance = updated.current_distance_m.unwrap();
    assert!(distance < initial, "{} should shrink below {}", distance, initial);
    assert!(
        (distance - geo::distance(advanced.position, target)).abs() < 1e-9,
        "distance recomputed from latest telemetry"
    );
}

#[tokio::test]
async fn test_invalid_coordinates_are_rejected_and_counted() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    // Non-finite explicit coordinate: rejected, detection survives pending
    let bad = RawDetection {
        track_id: 5,
        forward_distance_m: 9.0,
        lateral_offset_m: 0.0,
        size_m2: 0.01,
        coordinate: Some(Coordinate::new(f64::NAN, 0.0)),
    };
    let notifications = engine.ingest_frame(frame(vec![bad])).await;
    assert_eq!(notifications[0].phase, NotificationPhase::PendingCoordinate);
    assert_eq!(engine.invalid_coordinate_count(), 1);
    assert_eq!(engine.catalog().len().await, 0);

    // Out-of-range telemetry: rejected, counted, not fatal
    let result = engine
        .telemetry_tick(VehicleTelemetry {
            position: Coordinate::new(95.0, 0.0),
            next_waypoint: Coordinate::new(0.0, 0.001),
        })
        .await;
    assert!(result.is_err());
    assert_eq!(engine.invalid_coordinate_count(), 2);

    // The pipeline keeps working afterwards
    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();
    assert_eq!(engine.catalog().len().await, 1);
}

#[tokio::test]
async fn test_explicit_detector_coordinate_is_authoritative() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir).await;

    engine.telemetry_tick(eastbound_telemetry()).await.unwrap();

    let supplied = Coordinate::new(0.0005, 0.0005);
    let raw = RawDetection {
        track_id: 6,
        forward_distance_m: 50.0,
        lateral_offset_m: 3.0,
        size_m2: 0.02,
        coordinate: Some(supplied),
    };
    let notifications = engine.ingest_frame(frame(vec![raw])).await;

    // Dead reckoning would land elsewhere; the explicit coordinate wins
    assert_eq!(notifications[0].coordinate, Some(supplied));
}
