//! Periodic sensor polling.
//!
//! The poller issues one `/sensor_status` request per tick without waiting for the
//! previous one, so a slow response never delays the schedule. Responses may come
//! back out of order; [`PollSequencer`] applies only results newer than the freshest
//! one already applied. Failed polls are logged and skipped, they never stop the loop.
//!
//! Applied readings are ordered by activation time ([`ActivationOrder`]) and queued
//! as [`SensorSetObserved`] events when they differ from the previous reading.

use super::{ActiveSensorSet, SensorId, SensorSetObserved};
use crate::backend::{KioskBackend, SensorStatus};
use crate::error::KioskResult;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Timing and filtering for [`SensorPoller`].
#[derive(Debug, Clone)]
pub struct SensorPollerConfig {
    /// Time between polls.
    pub interval: Duration,
    /// Upper bound on concurrently outstanding status requests.
    pub max_in_flight: usize,
    /// Known sensor pins; readings for other pins are ignored. Empty accepts all.
    pub pins: Vec<SensorId>,
}

impl Default for SensorPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            max_in_flight: 4,
            pins: Vec::new(),
        }
    }
}

/// Remembers when each sensor became active and orders sets oldest-first.
#[derive(Debug, Default, Clone)]
pub struct ActivationOrder {
    first_seen: HashMap<SensorId, Instant>,
}

impl ActivationOrder {
    /// Empty order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Order a raw reading by activation time.
    ///
    /// Sensors appearing in the same reading keep the backend's order. Sensors missing
    /// from the reading lose their activation time.
    pub fn order(&mut self, raw: &[SensorId], at: Instant) -> ActiveSensorSet {
        let present: HashSet<SensorId> = raw.iter().copied().collect();
        self.first_seen.retain(|sensor, _| present.contains(sensor));
        for sensor in raw {
            self.first_seen.entry(*sensor).or_insert(at);
        }

        let mut ordered: Vec<SensorId> = ActiveSensorSet::new(raw.iter().copied())
            .as_slice()
            .to_vec();
        ordered.sort_by_key(|sensor| self.first_seen.get(sensor).copied().unwrap_or(at));
        ActiveSensorSet::new(ordered)
    }

    /// When `sensor` was first seen in its current activation.
    pub fn activated_at(&self, sensor: SensorId) -> Option<Instant> {
        self.first_seen.get(&sensor).copied()
    }
}

/// Discards poll results that are older than the freshest applied one.
#[derive(Debug, Default, Clone)]
pub struct PollSequencer {
    next_seq: u64,
    latest_applied: Option<u64>,
}

impl PollSequencer {
    /// Sequencer starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for the next request.
    pub fn issue(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// True when a result for `seq` is fresher than everything applied so far.
    pub fn accept(&mut self, seq: u64) -> bool {
        match self.latest_applied {
            Some(latest) if seq <= latest => false,
            _ => {
                self.latest_applied = Some(seq);
                true
            }
        }
    }
}

/// Polls the backend and queues sensor-set observations.
pub struct SensorPoller {
    backend: Arc<dyn KioskBackend>,
    config: SensorPollerConfig,
    sequencer: PollSequencer,
    order: ActivationOrder,
    last_emitted: Option<ActiveSensorSet>,
}

impl SensorPoller {
    /// Poller over `backend`.
    pub fn new(backend: Arc<dyn KioskBackend>, config: SensorPollerConfig) -> Self {
        Self {
            backend,
            config,
            sequencer: PollSequencer::new(),
            order: ActivationOrder::new(),
            last_emitted: None,
        }
    }

    /// Fold one completed poll into the poller state.
    ///
    /// Returns an observation when the result is fresh, successful and differs from
    /// the previously queued reading.
    pub fn apply(
        &mut self,
        seq: u64,
        result: KioskResult<SensorStatus>,
        at: Instant,
    ) -> Option<SensorSetObserved> {
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(seq, error = %e, "sensor poll failed, skipping cycle");
                return None;
            }
        };
        if !self.sequencer.accept(seq) {
            tracing::debug!(seq, "discarding stale sensor poll");
            return None;
        }

        let known: Vec<SensorId> = status
            .active_sensors
            .into_iter()
            .filter(|sensor| {
                let known = self.config.pins.is_empty() || self.config.pins.contains(sensor);
                if !known {
                    tracing::debug!(sensor = %sensor, "ignoring reading from unconfigured pin");
                }
                known
            })
            .collect();
        let set = self.order.order(&known, at);

        if self.last_emitted.as_ref() == Some(&set) {
            return None;
        }
        self.last_emitted = Some(set.clone());
        Some(SensorSetObserved { seq, set, at })
    }

    /// Poll until the receiving side of `tx` is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<SensorSetObserved>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = FuturesUnordered::new();

        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "sensor polling started"
        );

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = ticker.tick() => {
                    if in_flight.len() >= self.config.max_in_flight.max(1) {
                        tracing::warn!(outstanding = in_flight.len(), "sensor polls backing up, skipping tick");
                        continue;
                    }
                    let seq = self.sequencer.issue();
                    let backend = Arc::clone(&self.backend);
                    in_flight.push(async move { (seq, backend.sensor_status().await) });
                }
                Some((seq, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Some(observed) = self.apply(seq, result, Instant::now()) {
                        tracing::debug!(seq, set = %observed.set, "sensor reading changed");
                        if tx.send(observed).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("sensor polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::error::KioskError;
    use tracing_test::traced_test;

    fn status(pins: &[u32]) -> KioskResult<SensorStatus> {
        Ok(SensorStatus {
            active_sensors: pins.iter().copied().map(SensorId).collect(),
        })
    }

    fn poller(pins: &[u32]) -> SensorPoller {
        SensorPoller::new(
            Arc::new(MockBackend::new()),
            SensorPollerConfig {
                pins: pins.iter().copied().map(SensorId).collect(),
                ..SensorPollerConfig::default()
            },
        )
    }

    #[test]
    fn activation_order_keeps_oldest_first() {
        let t0 = Instant::now();
        let mut order = ActivationOrder::new();
        order.order(&[SensorId(9)], t0);
        let set = order.order(
            &[SensorId(3), SensorId(9)],
            t0 + Duration::from_millis(200),
        );
        assert_eq!(set, ActiveSensorSet::from_pins([9, 3]));
    }

    #[test]
    fn simultaneous_activations_keep_backend_order() {
        let mut order = ActivationOrder::new();
        let set = order.order(&[SensorId(3), SensorId(9)], Instant::now());
        assert_eq!(set, ActiveSensorSet::from_pins([3, 9]));
    }

    #[test]
    fn reactivation_counts_as_new() {
        let t0 = Instant::now();
        let mut order = ActivationOrder::new();
        order.order(&[SensorId(3), SensorId(9)], t0);
        order.order(&[SensorId(9)], t0 + Duration::from_millis(100));
        let set = order.order(
            &[SensorId(3), SensorId(9)],
            t0 + Duration::from_millis(200),
        );
        assert_eq!(set, ActiveSensorSet::from_pins([9, 3]));
        assert_eq!(
            order.activated_at(SensorId(3)),
            Some(t0 + Duration::from_millis(200))
        );
    }

    #[test]
    fn sequencer_rejects_stale_results() {
        let mut sequencer = PollSequencer::new();
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(sequencer.accept(second));
        assert!(!sequencer.accept(first));
        assert!(!sequencer.accept(second));
    }

    #[test]
    fn stale_result_does_not_override_fresh_one() {
        let mut poller = poller(&[]);
        let t0 = Instant::now();
        let fresh = poller.apply(1, status(&[17]), t0);
        assert!(fresh.is_some());
        assert_eq!(poller.apply(0, status(&[]), t0), None);
    }

    #[test]
    #[traced_test]
    fn failed_poll_is_skipped() {
        let mut poller = poller(&[]);
        let failed = poller.apply(
            0,
            Err(KioskError::Status {
                endpoint: "sensor_status".into(),
                status: 500,
            }),
            Instant::now(),
        );
        assert_eq!(failed, None);
        assert!(logs_contain("sensor poll failed"));
        assert!(poller.apply(1, status(&[5]), Instant::now()).is_some());
    }

    #[test]
    fn repeated_readings_are_not_requeued() {
        let mut poller = poller(&[]);
        let t0 = Instant::now();
        assert!(poller.apply(0, status(&[5]), t0).is_some());
        assert!(poller.apply(1, status(&[5]), t0).is_none());
        assert!(poller.apply(2, status(&[]), t0).is_some());
    }

    #[test]
    fn unknown_pins_are_filtered() {
        let mut poller = poller(&[17, 27]);
        let observed = poller
            .apply(0, status(&[4, 17]), Instant::now())
            .unwrap();
        assert_eq!(observed.set, ActiveSensorSet::from_pins([17]));
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_failures_and_queues_changes() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_sensor_status(true);
        let poller = SensorPoller::new(backend.clone(), SensorPollerConfig::default());
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(poller.run(tx));

        tokio::time::sleep(Duration::from_millis(650)).await;
        assert!(backend.status_calls() >= 3);
        assert!(rx.try_recv().is_err());

        backend.fail_sensor_status(false);
        backend.set_active(&[17]);
        let observed = rx.recv().await.unwrap();
        assert_eq!(observed.set, ActiveSensorSet::from_pins([17]));

        drop(rx);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(task.is_finished());
    }
}
