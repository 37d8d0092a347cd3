//! Debounce stage between the poller and the display controller.
//!
//! The debouncer remembers the latest observed set and how long it has been stable.
//! A set is forwarded once it has stayed unchanged for the quiet window *and*
//! differs from the set the controller last acted upon. Comparing against the
//! acted-upon set (instead of the previous raw reading) is what keeps a sensor
//! that flickers back to its old state from ever reaching the controller.
//!
//! The stage is clock-free: callers pass `Instant`s, so tests drive it with
//! arbitrary timestamps.

use super::ActiveSensorSet;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Observed {
    set: ActiveSensorSet,
    since: Instant,
}

/// Coalesces noisy sensor readings into genuine changes.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    immediate_single: bool,
    latest: Option<Observed>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window.
    ///
    /// With `immediate_single`, a set holding exactly one sensor is forwarded as
    /// soon as it is observed.
    pub fn new(window: Duration, immediate_single: bool) -> Self {
        Self {
            window,
            immediate_single,
            latest: None,
        }
    }

    /// Quiet window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a poll result. Repeating the current reading keeps its stability timer.
    pub fn observe(&mut self, set: ActiveSensorSet, at: Instant) {
        match &self.latest {
            Some(observed) if observed.set == set => {}
            _ => self.latest = Some(Observed { set, since: at }),
        }
    }

    /// Return the set to forward at `now`, if any.
    ///
    /// Keeps returning the same set on later calls until `acted` catches up, so a
    /// forward that the controller dropped is retried on the next evaluation.
    pub fn poll(&self, now: Instant, acted: &ActiveSensorSet) -> Option<ActiveSensorSet> {
        let observed = self.latest.as_ref()?;
        if observed.set == *acted {
            return None;
        }
        if self.immediate_single && observed.set.len() == 1 {
            return Some(observed.set.clone());
        }
        if now.saturating_duration_since(observed.since) >= self.window {
            return Some(observed.set.clone());
        }
        None
    }

    /// Earliest instant at which [`poll`](Self::poll) may start forwarding.
    pub fn deadline(&self, acted: &ActiveSensorSet) -> Option<Instant> {
        let observed = self.latest.as_ref()?;
        if observed.set == *acted {
            return None;
        }
        if self.immediate_single && observed.set.len() == 1 {
            Some(observed.since)
        } else {
            Some(observed.since + self.window)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(250);

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn flicker_inside_window_forwards_nothing() {
        let t0 = Instant::now();
        let acted = ActiveSensorSet::empty();
        let mut debouncer = Debouncer::new(WINDOW, false);

        debouncer.observe(ActiveSensorSet::from_pins([5]), t0);
        assert_eq!(debouncer.poll(ms(t0, 100), &acted), None);
        debouncer.observe(ActiveSensorSet::empty(), ms(t0, 120));
        debouncer.observe(ActiveSensorSet::from_pins([5]), ms(t0, 180));
        debouncer.observe(ActiveSensorSet::empty(), ms(t0, 220));

        for offset in [250, 400, 1000] {
            assert_eq!(debouncer.poll(ms(t0, offset), &acted), None);
        }
    }

    #[test]
    fn stable_change_forwards_after_window() {
        let t0 = Instant::now();
        let acted = ActiveSensorSet::empty();
        let mut debouncer = Debouncer::new(WINDOW, false);

        debouncer.observe(ActiveSensorSet::from_pins([5]), t0);
        debouncer.observe(ActiveSensorSet::from_pins([5]), ms(t0, 200));
        assert_eq!(debouncer.poll(ms(t0, 249), &acted), None);
        assert_eq!(
            debouncer.poll(ms(t0, 250), &acted),
            Some(ActiveSensorSet::from_pins([5]))
        );
        assert_eq!(debouncer.deadline(&acted), Some(ms(t0, 250)));
    }

    #[test]
    fn nothing_forwarded_once_acted_upon() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW, false);
        debouncer.observe(ActiveSensorSet::from_pins([7]), t0);

        let acted = ActiveSensorSet::from_pins([7]);
        assert_eq!(debouncer.poll(ms(t0, 500), &acted), None);
        assert_eq!(debouncer.deadline(&acted), None);
    }

    #[test]
    fn unacted_forward_is_repeated() {
        let t0 = Instant::now();
        let acted = ActiveSensorSet::empty();
        let mut debouncer = Debouncer::new(WINDOW, false);
        debouncer.observe(ActiveSensorSet::from_pins([3, 9]), t0);

        let first = debouncer.poll(ms(t0, 300), &acted);
        let second = debouncer.poll(ms(t0, 500), &acted);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn immediate_single_skips_window() {
        let t0 = Instant::now();
        let acted = ActiveSensorSet::empty();
        let mut debouncer = Debouncer::new(WINDOW, true);

        debouncer.observe(ActiveSensorSet::from_pins([5]), t0);
        assert_eq!(
            debouncer.poll(t0, &acted),
            Some(ActiveSensorSet::from_pins([5]))
        );

        debouncer.observe(ActiveSensorSet::from_pins([5, 6]), ms(t0, 10));
        assert_eq!(debouncer.poll(ms(t0, 20), &acted), None);
    }
}
