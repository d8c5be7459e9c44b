//! Detection source abstraction for feed ingestion.
//!
//! Provides a unified trait for reading raw detections from different
//! sources: stdin (NDJSON from a co-located detector process) and replay
//! (pre-loaded vectors, for demos and tests).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::types::RawDetection;

/// Events produced by a detection source.
pub enum SourceEvent {
    /// A parseable detection was read.
    Detection(RawDetection),
    /// Source reached end of data (EOF for files/stdin).
    Eof,
}

/// Trait abstracting where raw detections come from.
///
/// Implementations handle format parsing and pacing internally. The ingest
/// loop calls [`next_detection`] in a select! with cancellation.
#[async_trait]
pub trait DetectionSource: Send + 'static {
    /// Read the next detection from the source.
    ///
    /// Returns `SourceEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable errors.
    async fn next_detection(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "stdin", "replay").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Stdin Source (JSON detections, one per line)
// ============================================================================

/// Reads JSON-formatted detections from stdin.
///
/// The standard deployment shape: an upstream detector process pipes NDJSON
/// into the gateway. `received_at` is stamped here, at ingestion — the wire
/// value, if any, is not trusted.
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(2048),
        }
    }
}

#[async_trait]
impl DetectionSource for StdinSource {
    async fn next_detection(&mut self) -> Result<SourceEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SourceEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawDetection>(line) {
                Ok(mut detection) => {
                    detection.received_at = Utc::now();
                    return Ok(SourceEvent::Detection(detection));
                }
                Err(e) => {
                    tracing::warn!("[StdinSource] Failed to parse detection: {}", e);
                    // Skip malformed lines and keep reading
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// Replay Source (pre-loaded detections)
// ============================================================================

/// Replays pre-loaded detections with optional inter-detection delay.
///
/// Drives demos and integration tests without a live detector attached.
pub struct ReplaySource {
    detections: std::vec::IntoIter<RawDetection>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(detections: Vec<RawDetection>, delay_ms: u64) -> Self {
        Self {
            detections: detections.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }

    /// Load newline-delimited JSON detections from a file.
    ///
    /// Malformed lines are skipped with a warning rather than aborting the
    /// replay.
    pub fn from_ndjson_file(path: &std::path::Path, delay_ms: u64) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading detections from {}", path.display()))?;

        let mut detections = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawDetection>(line) {
                Ok(d) => detections.push(d),
                Err(e) => tracing::warn!(
                    line = lineno + 1,
                    error = %e,
                    "Skipping malformed detection line"
                ),
            }
        }

        Ok(Self::new(detections, delay_ms))
    }
}

#[async_trait]
impl DetectionSource for ReplaySource {
    async fn next_detection(&mut self) -> Result<SourceEvent> {
        // Delay between detections, skipped before the first so replays
        // start immediately.
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.detections.next() {
            Some(mut d) => {
                self.yielded_first = true;
                d.received_at = Utc::now();
                Ok(SourceEvent::Detection(d))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawConfidence;
    use std::io::Write;

    fn make_detection(source_id: &str) -> RawDetection {
        RawDetection {
            source_id: source_id.to_string(),
            object_class: "vehicle".to_string(),
            latitude: 34.05,
            longitude: -118.24,
            confidence: RawConfidence::numeric(0.9, "0-1"),
            accuracy_meters: 40.0,
            detected_at: Utc::now(),
            received_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_replay_yields_in_order_then_eof() {
        let mut source =
            ReplaySource::new(vec![make_detection("a"), make_detection("b")], 0);

        match source.next_detection().await.unwrap() {
            SourceEvent::Detection(d) => assert_eq!(d.source_id, "a"),
            SourceEvent::Eof => panic!("expected detection"),
        }
        match source.next_detection().await.unwrap() {
            SourceEvent::Detection(d) => assert_eq!(d.source_id, "b"),
            SourceEvent::Eof => panic!("expected detection"),
        }
        assert!(matches!(
            source.next_detection().await.unwrap(),
            SourceEvent::Eof
        ));
    }

    #[tokio::test]
    async fn test_replay_restamps_received_at() {
        let mut stale = make_detection("a");
        stale.received_at = Utc::now() - chrono::Duration::hours(6);
        let before = Utc::now();

        let mut source = ReplaySource::new(vec![stale], 0);
        match source.next_detection().await.unwrap() {
            SourceEvent::Detection(d) => assert!(d.received_at >= before),
            SourceEvent::Eof => panic!("expected detection"),
        }
    }

    #[tokio::test]
    async fn test_ndjson_file_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&make_detection("a")).unwrap()).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, "{}", serde_json::to_string(&make_detection("b")).unwrap()).unwrap();
        file.flush().unwrap();

        let mut source = ReplaySource::from_ndjson_file(file.path(), 0).unwrap();
        let mut seen = Vec::new();
        while let SourceEvent::Detection(d) = source.next_detection().await.unwrap() {
            seen.push(d.source_id);
        }
        assert_eq!(seen, vec!["a", "b"]);
    }
}
