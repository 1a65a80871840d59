use crate::poller::PollSettings;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_POLL_SECS: u64 = 15;

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    // Base path of the control service, e.g. "http://10.0.0.20:5000/api".
    pub base_url: String,
    pub status_poll_secs: u64,
    pub sensor_poll_secs: u64,
    // Whether sensor data is polled at all. Older service builds lack
    // /sensor-data.
    pub sensors: bool,
    // Used to decide when daily usage counters start over.
    pub timezone: Option<String>,
    // No timeout unless set.
    pub request_timeout_secs: Option<u64>,
    // Re-read the operation mode on every status poll instead of trusting the
    // value last sent.
    pub reconcile_mode_on_poll: bool,
}

impl DashboardConfig {
    pub fn new_with_reasonable_defaults() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            status_poll_secs: DEFAULT_POLL_SECS,
            sensor_poll_secs: DEFAULT_POLL_SECS,
            sensors: true,
            timezone: Some(crate::usage::DEFAULT_TIMEZONE.to_string()),
            request_timeout_secs: None,
            reconcile_mode_on_poll: false,
        }
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: DashboardConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("Reading {}: {err}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url can not be empty"));
        }
        if self.status_poll_secs == 0 {
            return Err(anyhow!("status_poll_secs must be at least 1"));
        }
        if self.sensors && self.sensor_poll_secs == 0 {
            return Err(anyhow!("sensor_poll_secs must be at least 1"));
        }
        if let Some(tz) = &self.timezone {
            if jiff::tz::TimeZone::get(tz).is_err() {
                return Err(anyhow!("Unknown timezone '{tz}'"));
            }
        }
        if self.request_timeout_secs == Some(0) {
            return Err(anyhow!("request_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            status_interval: Duration::from_secs(self.status_poll_secs),
            sensor_interval: self
                .sensors
                .then(|| Duration::from_secs(self.sensor_poll_secs)),
            reconcile_mode: self.reconcile_mode_on_poll,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::new_with_reasonable_defaults()
    }
}
