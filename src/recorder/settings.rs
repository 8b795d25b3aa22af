use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::format::AudioFormat;
use crate::error::ConfigError;
use crate::time_format::time_to_milliseconds;
use crate::timer::DEFAULT_TICK_INTERVAL;

/// Recorder settings as they come from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// MIME type of the recording (e.g. "audio/mpeg")
    pub format: String,
    /// Maximum duration as "hh:mm:ss", "mm:ss" or "ss"
    pub max_duration: String,
    /// Timer tick interval in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::default().mime_type().to_string(),
            max_duration: "15:00".to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
        }
    }
}

/// Settings after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedSettings {
    pub format: AudioFormat,
    pub max_duration: Duration,
    pub tick_interval: Duration,
}

impl RecorderSettings {
    pub fn validate(&self) -> Result<ValidatedSettings, ConfigError> {
        let format = self.format.parse()?;
        let max_duration = Duration::from_millis(time_to_milliseconds(&self.max_duration)?);
        let tick_interval = Duration::from_millis(self.tick_interval_ms);

        if tick_interval.is_zero() || max_duration <= tick_interval {
            return Err(ConfigError::InvalidTimer {
                max_ms: max_duration.as_millis() as u64,
                interval_ms: self.tick_interval_ms,
            });
        }

        Ok(ValidatedSettings {
            format,
            max_duration,
            tick_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = RecorderSettings::default().validate().unwrap();
        assert_eq!(settings.format, AudioFormat::Mp3);
        assert_eq!(settings.max_duration, Duration::from_secs(15 * 60));
        assert_eq!(settings.tick_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_settings() {
        let bad_format = RecorderSettings {
            format: "audio/flac".into(),
            ..Default::default()
        };
        assert!(matches!(bad_format.validate(), Err(ConfigError::UnsupportedFormat(_))));

        let bad_time = RecorderSettings {
            max_duration: "1:75".into(),
            ..Default::default()
        };
        assert!(matches!(bad_time.validate(), Err(ConfigError::InvalidTime(_))));

        let zero = RecorderSettings {
            max_duration: "0".into(),
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidTimer { .. })));
    }
}
