use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::format::AudioFormat;

/// Scheme and authority of local recording references
const URL_PREFIX: &str = "blob:audrec/";

/// A finished recording, delivered with the `stop` event
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    pub id: Uuid,
    pub format: AudioFormat,
    /// Local reference URL (`blob:audrec/<id>`)
    pub url: String,
    /// Captured time, excluding pauses
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub created_at: DateTime<Utc>,
    /// Number of fragments the data was assembled from
    pub chunk_count: usize,
    #[serde(skip)]
    data: Arc<[u8]>,
}

impl Recording {
    /// Assemble fragments, in arrival order, into one recording
    pub fn assemble(format: AudioFormat, chunks: Vec<Vec<u8>>, duration: Duration) -> Self {
        let id = Uuid::new_v4();
        let chunk_count = chunks.len();
        let data: Vec<u8> = chunks.concat();

        Self {
            id,
            format,
            url: format!("{}{}", URL_PREFIX, id),
            duration,
            created_at: Utc::now(),
            chunk_count,
            data: data.into(),
        }
    }

    /// Raw recorded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Suggested file name, e.g. `recording-<id>.mp3`
    pub fn file_name(&self) -> String {
        format!("recording-{}.{}", self.id, self.format.extension())
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
