// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2026 Vallés Puig, Ramon

//! Scheduler configuration.

use crate::error::{Error, Result};
use crate::solar::Coordinates;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide scheduler settings.
///
/// Every field has a default, so `{}` is a valid configuration.
///
/// ```
/// use suntimer::Config;
///
/// let config = Config::from_json_str(r#"{ "latitude": 51.48, "longitude": 0.0 }"#).unwrap();
/// assert_eq!(config.heartbeat_hour, 0);
/// assert_eq!(config.recalculate_delay_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default latitude, degrees north.
    #[serde(default = "d_latitude")]
    pub latitude: f64,
    /// Default longitude, degrees east.
    #[serde(default = "d_longitude")]
    pub longitude: f64,
    /// Local hour of the daily recompute heartbeat.
    #[serde(default)]
    pub heartbeat_hour: u32,
    #[serde(default)]
    pub heartbeat_minute: u32,
    /// Pause between a heartbeat firing and the recompute it triggers.
    /// Must be positive.
    #[serde(default = "d_1000")]
    pub recalculate_delay_ms: u64,
}

fn d_latitude() -> f64 {
    43.7001
}
fn d_longitude() -> f64 {
    -79.4163
}
fn d_1000() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: d_latitude(),
            longitude: d_longitude(),
            heartbeat_hour: 0,
            heartbeat_minute: 0,
            recalculate_delay_ms: d_1000(),
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::Config(format!("latitude {} out of range", self.latitude)));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::Config(format!("longitude {} out of range", self.longitude)));
        }
        if self.heartbeat_hour > 23 || self.heartbeat_minute > 59 {
            return Err(Error::Config(format!(
                "heartbeat at {}:{:02} is not a time of day",
                self.heartbeat_hour, self.heartbeat_minute
            )));
        }
        if self.recalculate_delay_ms == 0 {
            return Err(Error::Config(
                "recalculate_delay_ms must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// The default coordinate.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn recalculate_delay(&self) -> Duration {
        Duration::from_millis(self.recalculate_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default() {
        assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_override() {
        let config = Config::from_json_str(r#"{"heartbeat_hour": 3, "recalculate_delay_ms": 250}"#)
            .unwrap();
        assert_eq!(config.heartbeat_hour, 3);
        assert_eq!(config.recalculate_delay(), Duration::from_millis(250));
        assert_eq!(config.coordinates(), Config::default().coordinates());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            Config::from_json_str(r#"{"latitude": 91.0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"heartbeat_minute": 60}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"recalculate_delay_ms": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::from_json_str("not json"), Err(Error::Config(_))));
    }
}
