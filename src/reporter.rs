//! Activation telemetry.
//!
//! Every sensor that reaches the screen opens an activation session. When the
//! sensor leaves the screen the session closes and one record
//! `{sensor_id, duration}` is posted to the backend.
//!
//! Reporting is at-most-once and best effort: a failed post is logged and dropped,
//! never retried, and never reaches the caller. While a report for a sensor is still
//! in flight, further reports for that sensor are skipped.

use crate::backend::{ActivationRecord, KioskBackend};
use crate::sensors::SensorId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Removes a sensor from the in-flight set when its report settles.
struct InFlight {
    set: Arc<Mutex<HashSet<SensorId>>>,
    sensor: SensorId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.lock().remove(&self.sensor);
    }
}

/// Tracks activation sessions and posts their durations.
pub struct ActivationReporter {
    backend: Arc<dyn KioskBackend>,
    in_flight: Arc<Mutex<HashSet<SensorId>>>,
    sessions: Mutex<HashMap<SensorId, Instant>>,
}

impl ActivationReporter {
    /// Reporter posting to `backend`.
    pub fn new(backend: Arc<dyn KioskBackend>) -> Self {
        Self {
            backend,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Post one activation record without waiting for it.
    ///
    /// Returns `None` when a report for `sensor` is already pending.
    pub fn report(&self, sensor: SensorId, duration_ms: u64) -> Option<JoinHandle<()>> {
        if !self.in_flight.lock().insert(sensor) {
            tracing::debug!(%sensor, "activation report already pending, skipping");
            return None;
        }
        let guard = InFlight {
            set: Arc::clone(&self.in_flight),
            sensor,
        };
        let backend = Arc::clone(&self.backend);
        Some(tokio::spawn(async move {
            let _guard = guard;
            let record = ActivationRecord {
                sensor_id: sensor,
                duration: duration_ms,
            };
            match backend.register_activation(record).await {
                Ok(()) => tracing::debug!(%sensor, duration_ms, "activation registered"),
                Err(e) => tracing::warn!(%sensor, duration_ms, error = %e, "activation report lost"),
            }
        }))
    }

    /// Reconcile sessions with the sensors now on screen.
    ///
    /// Sensors that appeared open a session at `now`; sensors that disappeared close
    /// theirs and are reported with the session length.
    pub fn track(&self, now_playing: &[SensorId], now: Instant) -> Vec<JoinHandle<()>> {
        let closed: Vec<(SensorId, Instant)> = {
            let mut sessions = self.sessions.lock();
            let closed: Vec<(SensorId, Instant)> = sessions
                .iter()
                .filter(|(sensor, _)| !now_playing.contains(sensor))
                .map(|(sensor, started)| (*sensor, *started))
                .collect();
            for (sensor, _) in &closed {
                sessions.remove(sensor);
            }
            for sensor in now_playing {
                sessions.entry(*sensor).or_insert_with(|| {
                    tracing::debug!(%sensor, "activation session opened");
                    now
                });
            }
            closed
        };

        closed
            .into_iter()
            .filter_map(|(sensor, started)| {
                let duration_ms = now.saturating_duration_since(started).as_millis() as u64;
                self.report(sensor, duration_ms)
            })
            .collect()
    }

    /// Whether a report for `sensor` is in flight.
    pub fn is_pending(&self, sensor: SensorId) -> bool {
        self.in_flight.lock().contains(&sensor)
    }

    /// Sensors with an open session.
    pub fn open_sessions(&self) -> Vec<SensorId> {
        let mut sensors: Vec<SensorId> = self.sessions.lock().keys().copied().collect();
        sensors.sort();
        sensors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn pending_report_suppresses_duplicates() {
        let backend = Arc::new(MockBackend::new());
        backend.set_activation_delay(Duration::from_millis(500));
        let reporter = ActivationReporter::new(backend.clone());

        let first = reporter.report(SensorId(17), 6000).unwrap();
        assert!(reporter.is_pending(SensorId(17)));
        assert!(reporter.report(SensorId(17), 7000).is_none());

        first.await.unwrap();
        assert!(!reporter.is_pending(SensorId(17)));
        assert_eq!(
            backend.activations(),
            vec![ActivationRecord {
                sensor_id: SensorId(17),
                duration: 6000
            }]
        );
        assert!(reporter.report(SensorId(17), 7000).is_some());
    }

    #[tokio::test]
    async fn failures_are_not_retried() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_activations(true);
        let reporter = ActivationReporter::new(backend.clone());

        reporter.report(SensorId(5), 9000).unwrap().await.unwrap();
        assert!(backend.activations().is_empty());
        assert!(!reporter.is_pending(SensorId(5)));
        assert!(reporter.report(SensorId(5), 9000).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_report_on_close() {
        let backend = Arc::new(MockBackend::new());
        let reporter = ActivationReporter::new(backend.clone());
        let t0 = Instant::now();

        assert!(reporter.track(&[SensorId(3), SensorId(9)], t0).is_empty());
        assert_eq!(reporter.open_sessions(), vec![SensorId(3), SensorId(9)]);

        let handles = reporter.track(&[SensorId(9)], t0 + Duration::from_millis(6500));
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(
            backend.activations(),
            vec![ActivationRecord {
                sensor_id: SensorId(3),
                duration: 6500
            }]
        );

        for handle in reporter.track(&[], t0 + Duration::from_secs(10)) {
            handle.await.unwrap();
        }
        assert_eq!(backend.activations().len(), 2);
        assert_eq!(backend.activations()[1].duration, 10_000);
        assert!(reporter.open_sessions().is_empty());
    }
}
