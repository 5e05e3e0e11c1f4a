use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Timing knobs for progress tracking.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    pub heartbeat_interval: Duration,
    pub dwell_threshold: Duration,
    pub dwell_tick: Duration,
    pub seek_poll_interval: Duration,
    /// Largest forward jump (seconds) per poll that still counts as playback.
    pub seek_tolerance_secs: f64,
    pub seek_warning_duration: Duration,
    pub countdown_tick: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            dwell_threshold: Duration::from_secs(30),
            dwell_tick: Duration::from_secs(1),
            seek_poll_interval: Duration::from_secs(1),
            seek_tolerance_secs: 2.0,
            seek_warning_duration: Duration::from_secs(3),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

impl TrackerConfig {
    /// Read overrides from `LEARN_HEARTBEAT_SECS`, `LEARN_DWELL_SECS`,
    /// `LEARN_SEEK_TOLERANCE_SECS` and `LEARN_SEEK_WARNING_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = parse_secs(&lookup, "LEARN_HEARTBEAT_SECS")? {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "LEARN_DWELL_SECS")? {
            config.dwell_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "LEARN_SEEK_WARNING_SECS")? {
            config.seek_warning_duration = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("LEARN_SEEK_TOLERANCE_SECS") {
            config.seek_tolerance_secs = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(ConfigError::Invalid {
                    key: "LEARN_SEEK_TOLERANCE_SECS",
                    value: raw,
                })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` for zero periods or a seek tolerance that does
    /// not exceed the poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, period) in [
            ("heartbeat_interval", self.heartbeat_interval),
            ("dwell_tick", self.dwell_tick),
            ("seek_poll_interval", self.seek_poll_interval),
            ("countdown_tick", self.countdown_tick),
        ] {
            if period.is_zero() {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        let poll = self.seek_poll_interval.as_secs_f64();
        if self.seek_tolerance_secs <= poll {
            return Err(ConfigError::ToleranceTooSmall {
                tolerance: self.seek_tolerance_secs,
                poll,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_dwell_threshold(mut self, threshold: Duration) -> Self {
        self.dwell_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_seek_tolerance(mut self, tolerance_secs: f64) -> Self {
        self.seek_tolerance_secs = tolerance_secs;
        self
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.dwell_threshold, Duration::from_secs(30));
        assert!((config.seek_tolerance_secs - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.seek_warning_duration, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_are_applied() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("LEARN_HEARTBEAT_SECS", "5"),
            ("LEARN_DWELL_SECS", " 45 "),
            ("LEARN_SEEK_TOLERANCE_SECS", "2.5"),
        ]))
        .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.dwell_threshold, Duration::from_secs(45));
        assert!((config.seek_tolerance_secs - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = TrackerConfig::from_lookup(lookup(&[("LEARN_DWELL_SECS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "LEARN_DWELL_SECS",
                value: "soon".into()
            }
        );
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let err =
            TrackerConfig::from_lookup(lookup(&[("LEARN_HEARTBEAT_SECS", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroInterval("heartbeat_interval"));
    }

    #[test]
    fn tolerance_must_exceed_poll_interval() {
        let err = TrackerConfig::from_lookup(lookup(&[("LEARN_SEEK_TOLERANCE_SECS", "1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ToleranceTooSmall { .. }));
    }
}
