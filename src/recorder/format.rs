use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Container format of a recording, identified by its MIME type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Aac,
    Midi,
    Ogg,
    Wav,
    Webm,
    ThreeGp,
    ThreeG2,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 8] = [
        AudioFormat::Mp3,
        AudioFormat::Aac,
        AudioFormat::Midi,
        AudioFormat::Ogg,
        AudioFormat::Wav,
        AudioFormat::Webm,
        AudioFormat::ThreeGp,
        AudioFormat::ThreeG2,
    ];

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Midi => "audio/midi",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Wav => "audio/x-wav",
            AudioFormat::Webm => "audio/webm",
            AudioFormat::ThreeGp => "audio/3gpp",
            AudioFormat::ThreeG2 => "audio/3gpp2",
        }
    }

    /// Conventional file extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Midi => "mid",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::ThreeGp => "3gp",
            AudioFormat::ThreeG2 => "3g2",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AudioFormat::ALL
            .into_iter()
            .find(|format| format.mime_type().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnsupportedFormat(s.to_string()))
    }
}

impl TryFrom<String> for AudioFormat {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AudioFormat> for String {
    fn from(format: AudioFormat) -> Self {
        format.mime_type().to_string()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}
