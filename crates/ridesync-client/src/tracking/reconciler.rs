//! Keeps the map supplied with validated positions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info};

use super::feed::FeedEvent;
use super::geo::{Coordinate, ServiceArea, Viewport};
use super::sample::{NearbyEntity, PositionSample, SampleRejection};
use crate::protocol::ProtocolError;

/// The map-rendering surface.
pub trait MapSurface: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn animate_to(&self, viewport: Viewport);
}

/// Tracks whether the user is panning or zooming.
#[derive(Debug, Clone)]
pub struct GestureGate {
    cooldown: Duration,
    last_gesture: Option<Instant>,
}

impl GestureGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_gesture: None,
        }
    }

    /// Start or extend the cooldown.
    pub fn note(&mut self, at: Instant) {
        self.last_gesture = Some(at);
    }

    pub fn is_interacting(&self, at: Instant) -> bool {
        self.last_gesture
            .is_some_and(|last| at.saturating_duration_since(last) < self.cooldown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecenterOutcome {
    Applied(Viewport),
    SuppressedByGesture,
    SurfaceNotReady,
    NothingToShow,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub gesture_cooldown: Duration,
    /// Fraction of the span added on each side of a viewport.
    pub viewport_padding: f64,
    pub service_area: Option<ServiceArea>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            gesture_cooldown: Duration::from_secs(3),
            viewport_padding: 0.2,
            service_area: None,
        }
    }
}

pub struct PositionReconciler {
    config: ReconcilerConfig,
    surface: Arc<dyn MapSurface>,
    /// Latest accepted sample per tracked entity.
    positions: HashMap<String, PositionSample>,
    nearby: HashMap<String, NearbyEntity>,
    gate: GestureGate,
    out_of_range: bool,
}

impl PositionReconciler {
    pub fn new(config: ReconcilerConfig, surface: Arc<dyn MapSurface>) -> Self {
        let gate = GestureGate::new(config.gesture_cooldown);
        Self {
            config,
            surface,
            positions: HashMap::new(),
            nearby: HashMap::new(),
            gate,
            out_of_range: false,
        }
    }

    /// Store `sample` as its entity's current position.
    ///
    /// Invalid samples and samples older than the stored one are dropped.
    pub fn ingest(&mut self, sample: PositionSample) -> Result<(), SampleRejection> {
        if let Err(reason) = sample.validate() {
            debug!(entity = %sample.entity_id, %reason, "Dropping position sample");
            return Err(reason);
        }
        if let Some(current) = self.positions.get(&sample.entity_id) {
            if sample.is_older_than(current) {
                debug!(entity = %sample.entity_id, "Dropping stale position sample");
                return Err(SampleRejection::Stale);
            }
        }
        self.positions.insert(sample.entity_id.clone(), sample);
        Ok(())
    }

    pub fn ingest_wire(
        &mut self,
        payload: &Value,
        default_id: Option<&str>,
    ) -> Result<(), SampleRejection> {
        match PositionSample::from_wire(payload, default_id) {
            Ok(sample) => self.ingest(sample),
            Err(reason) => {
                debug!(%reason, "Dropping position payload");
                Err(reason)
            }
        }
    }

    /// Replace the nearby set with the valid entries of one broadcast.
    /// Returns how many were kept.
    pub fn ingest_broadcast_set(&mut self, entities: Vec<NearbyEntity>) -> usize {
        let mut next = HashMap::with_capacity(entities.len());
        for entity in entities {
            match entity.position.validate() {
                Ok(()) => {
                    next.insert(entity.id.clone(), entity);
                }
                Err(reason) => debug!(entity = %entity.id, %reason, "Dropping nearby entity"),
            }
        }
        self.nearby = next;
        self.nearby.len()
    }

    /// Accepts a bare array or one wrapped under `riders`/`drivers`.
    /// A payload that is not a list leaves the set untouched.
    pub fn ingest_broadcast_wire(&mut self, payload: &Value) -> Result<usize, ProtocolError> {
        let items = payload
            .as_array()
            .or_else(|| {
                ["riders", "drivers"]
                    .iter()
                    .find_map(|key| payload.get(key).and_then(Value::as_array))
            })
            .ok_or(ProtocolError::InvalidField {
                field: "data",
                reason: "expected a list of nearby riders".into(),
            })?;

        let entities = items
            .iter()
            .filter_map(|item| match NearbyEntity::from_wire(item) {
                Ok(entity) => Some(entity),
                Err(reason) => {
                    debug!(%reason, "Dropping nearby entry");
                    None
                }
            })
            .collect();
        Ok(self.ingest_broadcast_set(entities))
    }

    /// Route one feed event. `tracked_rider` names the rider whose
    /// location updates arrive without an id.
    pub fn apply(&mut self, event: &FeedEvent, tracked_rider: Option<&str>) {
        match event {
            FeedEvent::RiderLocation(payload) => {
                let _ = self.ingest_wire(payload, tracked_rider);
            }
            FeedEvent::Nearby(payload) => {
                if let Err(e) = self.ingest_broadcast_wire(payload) {
                    debug!(error = %e, "Ignoring nearby broadcast");
                }
            }
        }
    }

    pub fn position(&self, entity_id: &str) -> Option<&PositionSample> {
        self.positions.get(entity_id)
    }

    pub fn nearby(&self, entity_id: &str) -> Option<&NearbyEntity> {
        self.nearby.get(entity_id)
    }

    /// Nearby entities sorted by id.
    pub fn nearby_entities(&self) -> Vec<&NearbyEntity> {
        let mut entities: Vec<_> = self.nearby.values().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn tracked_coordinates(&self) -> Vec<Coordinate> {
        self.positions.values().map(|s| s.coordinate).collect()
    }

    pub fn note_gesture(&mut self) {
        self.note_gesture_at(Instant::now());
    }

    pub fn note_gesture_at(&mut self, at: Instant) {
        self.gate.note(at);
    }

    pub fn is_interacting(&self) -> bool {
        self.gate.is_interacting(Instant::now())
    }

    pub fn recenter(&self, targets: &[Coordinate]) -> RecenterOutcome {
        self.recenter_at(targets, Instant::now())
    }

    /// Animate the surface to cover `targets`. Suppressed calls are not
    /// retried.
    pub fn recenter_at(&self, targets: &[Coordinate], at: Instant) -> RecenterOutcome {
        if self.gate.is_interacting(at) {
            debug!("User is interacting; recenter suppressed");
            return RecenterOutcome::SuppressedByGesture;
        }
        if !self.surface.is_loaded() {
            debug!("Map not loaded; recenter skipped");
            return RecenterOutcome::SurfaceNotReady;
        }
        match Viewport::covering(targets, self.config.viewport_padding) {
            Some(viewport) => {
                self.surface.animate_to(viewport);
                RecenterOutcome::Applied(viewport)
            }
            None => RecenterOutcome::NothingToShow,
        }
    }

    /// Classify `location` against the service area and remember the
    /// result. Always in range when no area is configured.
    pub fn check_service_range(&mut self, location: Coordinate) -> bool {
        let out = self
            .config
            .service_area
            .is_some_and(|area| location.is_valid() && !area.contains(&location));
        if out != self.out_of_range {
            info!(%location, out_of_range = out, "Service range changed");
        }
        self.out_of_range = out;
        out
    }

    pub fn out_of_service_range(&self) -> bool {
        self.out_of_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::geo::Distance;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeMap {
        loaded: bool,
        animations: Mutex<Vec<Viewport>>,
    }

    impl MapSurface for FakeMap {
        fn is_loaded(&self) -> bool {
            self.loaded
        }

        fn animate_to(&self, viewport: Viewport) {
            self.animations.lock().unwrap().push(viewport);
        }
    }

    fn reconciler(loaded: bool) -> (PositionReconciler, Arc<FakeMap>) {
        let map = Arc::new(FakeMap {
            loaded,
            ..FakeMap::default()
        });
        (
            PositionReconciler::new(ReconcilerConfig::default(), map.clone()),
            map,
        )
    }

    #[test]
    fn ingest_accepts_only_valid_coordinates() {
        let (mut rec, _) = reconciler(true);
        let cases = [
            (14.6, 120.9, true),
            (90.0, -180.0, true),
            (90.1, 0.0, false),
            (0.0, -180.1, false),
            (f64::NAN, 0.0, false),
            (0.0, f64::NEG_INFINITY, false),
        ];
        for (lat, lon, ok) in cases {
            let before = rec.position("r1").cloned();
            let result = rec.ingest(PositionSample::new("r1", Coordinate::new(lat, lon)));
            assert_eq!(result.is_ok(), ok, "({lat}, {lon})");
            if !ok {
                assert_eq!(rec.position("r1").cloned(), before);
            }
        }
    }

    #[test]
    fn later_sample_replaces_earlier() {
        let (mut rec, _) = reconciler(true);
        rec.ingest(PositionSample::new("r1", Coordinate::new(1.0, 1.0))).unwrap();
        rec.ingest(PositionSample::new("r1", Coordinate::new(2.0, 2.0))).unwrap();
        assert_eq!(rec.position("r1").unwrap().coordinate, Coordinate::new(2.0, 2.0));
        assert_eq!(rec.tracked_coordinates().len(), 1);
    }

    #[test]
    fn stale_timestamped_sample_is_rejected() {
        let (mut rec, _) = reconciler(true);
        let newer = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 5).unwrap();
        let older = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        rec.ingest(PositionSample::new("r1", Coordinate::new(2.0, 2.0)).with_recorded_at(newer))
            .unwrap();
        assert_eq!(
            rec.ingest(
                PositionSample::new("r1", Coordinate::new(1.0, 1.0)).with_recorded_at(older)
            ),
            Err(SampleRejection::Stale)
        );
        assert_eq!(rec.position("r1").unwrap().coordinate, Coordinate::new(2.0, 2.0));

        // Untimestamped samples keep last-write-wins.
        rec.ingest(PositionSample::new("r1", Coordinate::new(3.0, 3.0))).unwrap();
        assert_eq!(rec.position("r1").unwrap().coordinate, Coordinate::new(3.0, 3.0));
    }

    #[test]
    fn broadcast_keeps_only_valid_entries() {
        let (mut rec, _) = reconciler(true);
        let kept = rec
            .ingest_broadcast_wire(&json!([
                { "id": "r1", "lat": 91, "lon": 0 },
                { "id": "r2", "lat": 14.6, "lon": 120.9 }
            ]))
            .unwrap();
        assert_eq!(kept, 1);
        let ids: Vec<_> = rec.nearby_entities().iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["r2"]);
    }

    #[test]
    fn broadcast_replaces_wholesale_without_duplicates() {
        let (mut rec, _) = reconciler(true);
        rec.ingest_broadcast_wire(&json!([
            { "id": "a", "lat": 1, "lon": 1 },
            { "id": "b", "lat": 2, "lon": 2 }
        ]))
        .unwrap();
        rec.ingest_broadcast_wire(&json!({ "riders": [
            { "id": "b", "lat": 3, "lon": 3 },
            { "id": "b", "lat": 4, "lon": 4 }
        ]}))
        .unwrap();

        assert!(rec.nearby("a").is_none());
        assert_eq!(rec.nearby_entities().len(), 1);
        assert_eq!(rec.nearby("b").unwrap().position.coordinate, Coordinate::new(4.0, 4.0));
    }

    #[test]
    fn malformed_broadcast_leaves_set_alone() {
        let (mut rec, _) = reconciler(true);
        rec.ingest_broadcast_wire(&json!([{ "id": "a", "lat": 1, "lon": 1 }])).unwrap();
        assert!(rec.ingest_broadcast_wire(&json!("oops")).is_err());
        assert!(rec.nearby("a").is_some());
    }

    #[test]
    fn recenter_is_gated_by_gesture_cooldown() {
        let (mut rec, map) = reconciler(true);
        let targets = [Coordinate::new(14.6, 120.9), Coordinate::new(14.7, 121.0)];
        let t0 = Instant::now();

        rec.note_gesture_at(t0);
        assert_eq!(
            rec.recenter_at(&targets, t0 + Duration::from_millis(2999)),
            RecenterOutcome::SuppressedByGesture
        );
        assert!(map.animations.lock().unwrap().is_empty());

        // A further gesture restarts the window.
        rec.note_gesture_at(t0 + Duration::from_secs(2));
        assert_eq!(
            rec.recenter_at(&targets, t0 + Duration::from_millis(4000)),
            RecenterOutcome::SuppressedByGesture
        );

        let applied = rec.recenter_at(&targets, t0 + Duration::from_secs(5));
        assert!(matches!(applied, RecenterOutcome::Applied(_)));
        assert_eq!(map.animations.lock().unwrap().len(), 1);
    }

    #[test]
    fn recenter_waits_for_loaded_surface_and_valid_targets() {
        let (rec, map) = reconciler(false);
        assert_eq!(
            rec.recenter(&[Coordinate::new(1.0, 1.0)]),
            RecenterOutcome::SurfaceNotReady
        );
        assert!(map.animations.lock().unwrap().is_empty());

        let (rec, _) = reconciler(true);
        assert_eq!(
            rec.recenter(&[Coordinate::new(100.0, 1.0)]),
            RecenterOutcome::NothingToShow
        );
    }

    #[test]
    fn apply_routes_feed_events() {
        let (mut rec, _) = reconciler(true);
        rec.apply(&FeedEvent::RiderLocation(json!({ "lat": 14.6, "lng": 120.9 })), Some("rider-9"));
        rec.apply(&FeedEvent::Nearby(json!([{ "id": "n1", "lat": 1, "lon": 1 }])), None);
        assert!(rec.position("rider-9").is_some());
        assert!(rec.nearby("n1").is_some());
    }

    #[test]
    fn service_range_flag() {
        let map = Arc::new(FakeMap::default());
        let config = ReconcilerConfig {
            service_area: Some(ServiceArea::new(
                Coordinate::new(14.5995, 120.9842),
                Distance::from_kilometers(10.0),
            )),
            ..ReconcilerConfig::default()
        };
        let mut rec = PositionReconciler::new(config, map);

        assert!(!rec.check_service_range(Coordinate::new(14.61, 120.99)));
        assert!(rec.check_service_range(Coordinate::new(15.2, 121.5)));
        assert!(rec.out_of_service_range());

        let (mut open, _) = reconciler(true);
        assert!(!open.check_service_range(Coordinate::new(15.2, 121.5)));
    }
}
