//! reqwest-based client for the kiosk backend API.

use super::{
    ActivationRecord, ExtraContent, KioskBackend, PlaylistEntry, SensorStatus, SystemConfig,
    VideoAssignment,
};
use crate::config::BackendConfig;
use crate::error::{KioskError, KioskResult};
use crate::sensors::SensorId;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP implementation of [`KioskBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    /// Build a client from the `[backend]` configuration section.
    pub fn new(config: &BackendConfig) -> KioskResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        let base = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.api_prefix.trim_matches('/')
        );
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    async fn get_value(&self, path: &str) -> KioskResult<serde_json::Value> {
        let url = self.url(path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KioskError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| KioskError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> KioskResult<T> {
        let value = self.get_value(path).await?;
        serde_json::from_value(value).map_err(|e| KioskError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Probe `/system-config` until the backend answers.
    ///
    /// Makes `attempts` tries spaced by `delay`; returns the last error when all fail.
    pub async fn wait_until_reachable(&self, attempts: u32, delay: Duration) -> KioskResult<()> {
        let attempts = attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.system_config().await {
                Ok(_) => {
                    tracing::info!(attempt, "backend reachable");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "backend not reachable yet");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            KioskError::Configuration("no connection attempts were made".into())
        }))
    }
}

#[async_trait]
impl KioskBackend for HttpBackend {
    async fn sensor_status(&self) -> KioskResult<SensorStatus> {
        const PATH: &str = "sensor_status";
        let value = self.get_value(PATH).await?;
        SensorStatus::from_json(PATH, value)
    }

    async fn system_config(&self) -> KioskResult<SystemConfig> {
        const PATH: &str = "system-config";
        let value = self.get_value(PATH).await?;
        SystemConfig::from_json(PATH, value)
    }

    async fn sensor_video(&self, sensor: SensorId) -> KioskResult<VideoAssignment> {
        let path = format!("sensor_video/{sensor}");
        let value = self.get_value(&path).await?;
        VideoAssignment::from_json(&path, sensor, value)
    }

    async fn background_videos(&self) -> KioskResult<Vec<PlaylistEntry>> {
        self.get_json("background_videos").await
    }

    async fn extra_content(&self) -> KioskResult<ExtraContent> {
        self.get_json("extra-content").await
    }

    async fn register_activation(&self, record: ActivationRecord) -> KioskResult<()> {
        const PATH: &str = "register_activation";
        let response = self.client.post(self.url(PATH)).json(&record).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KioskError::Status {
                endpoint: PATH.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
