//! Device heartbeat.
//!
//! Posts `device_id=<id>` (form-encoded) to a monitoring endpoint at a fixed
//! interval so operators can see which kiosks are alive. Failures are logged and
//! the next beat is attempted on schedule.

use crate::config::BeaconConfig;
use crate::error::{KioskError, KioskResult};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Periodic heartbeat to a device monitor.
pub struct Beacon {
    client: reqwest::Client,
    url: String,
    device_id: String,
    interval: Duration,
}

impl Beacon {
    /// Build the HTTP client for `config`.
    pub fn new(config: &BeaconConfig, request_timeout: Duration) -> KioskResult<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            device_id: config.device_id.clone(),
            interval: Duration::from_secs(config.interval_secs.max(1)),
        })
    }

    /// Time between heartbeats.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Send one heartbeat.
    pub async fn send(&self) -> KioskResult<()> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("device_id", self.device_id.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KioskError::Status {
                endpoint: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Beat until `shutdown` flips to `true`. The first beat is sent immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(device_id = %self.device_id, url = %self.url, "device beacon started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.send().await {
                        Ok(()) => tracing::debug!(device_id = %self.device_id, "beacon sent"),
                        Err(e) => tracing::warn!(error = %e, "beacon failed"),
                    }
                }
            }
        }
        tracing::info!("device beacon stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn config() -> BeaconConfig {
        BeaconConfig {
            url: "http://127.0.0.1:9/beacon".to_string(),
            device_id: "vitrina-01".to_string(),
            interval_secs: 60,
        }
    }

    #[test]
    fn zero_interval_is_clamped() {
        let beacon = Beacon::new(
            &BeaconConfig {
                interval_secs: 0,
                ..config()
            },
            Duration::from_millis(200),
        )
        .unwrap();
        assert_eq!(beacon.interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unreachable_monitor_is_a_transient_error() {
        let beacon = Beacon::new(&config(), Duration::from_millis(200)).unwrap();
        assert!(beacon.send().await.unwrap_err().is_transient());
    }

    #[tokio::test]
    #[traced_test]
    async fn run_survives_failures_and_stops_on_shutdown() {
        let beacon = Beacon::new(&config(), Duration::from_millis(200)).unwrap();
        let (tx, rx) = watch::channel(false);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(true).unwrap();
        };

        tokio::join!(beacon.run(rx), stop);
        assert!(logs_contain("beacon failed"));
        assert!(logs_contain("device beacon stopped"));
    }
}
