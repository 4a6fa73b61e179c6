//! Wire format on a result channel.
//!
//! A worker sends exactly one newline-terminated JSON message.

use crate::histogram::Histogram;
use serde::{Deserialize, Serialize};

/// Message from worker to coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// The completed letter histogram.
    #[serde(rename = "histogram")]
    Histogram { counts: Histogram },
}

impl WorkerMessage {
    pub fn histogram(counts: Histogram) -> Self {
        Self::Histogram { counts }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_message_shape() {
        let mut h = Histogram::new();
        h.record_bytes(b"ab");
        let line = WorkerMessage::histogram(h).to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""type":"histogram""#));
        assert!(line.contains(r#""counts":[1,1,0"#));

        let WorkerMessage::Histogram { counts } = WorkerMessage::from_line(&line).unwrap();
        assert_eq!(counts, h);
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(WorkerMessage::from_line(r#"{"type":"ready"}"#).is_err());
    }

    #[test]
    fn test_rejects_short_counts() {
        assert!(WorkerMessage::from_line(r#"{"type":"histogram","counts":[1,2,3]}"#).is_err());
    }
}
