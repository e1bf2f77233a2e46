//! Event Stream Adapters
//!
//! Where normalized events come from: a JSONL file (replay), standard input
//! (live pipe from the upstream parsers), or the synthetic scenario
//! generator. One event per line, `{"type": "swap" | "liquidity" |
//! "authority", ...}`.

pub mod synthetic;

pub use synthetic::{coil_scenario, coil_scenario_seeded, CoilScenario};

use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::domain::NormalizedEvent;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to read event file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no parseable events in {0}")]
    Empty(String),
}

/// Load a whole JSONL event file for replay. Unparseable lines are skipped
/// with a warning rather than aborting the replay.
pub fn read_events_file(path: &Path) -> Result<Vec<NormalizedEvent>, StreamError> {
    let body = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    for (lineno, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<NormalizedEvent>(line) {
            Ok(ev) => events.push(ev),
            Err(err) => {
                tracing::warn!(lineno = lineno + 1, %err, "skipping malformed event line");
            }
        }
    }
    if events.is_empty() {
        return Err(StreamError::Empty(path.display().to_string()));
    }
    Ok(events)
}

/// Pump JSONL events from stdin into the engine channel until EOF or the
/// receiver goes away.
pub async fn pump_stdin(tx: mpsc::Sender<NormalizedEvent>) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut parsed = 0u64;
    let mut skipped = 0u64;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<NormalizedEvent>(line) {
                    Ok(ev) => {
                        parsed += 1;
                        if tx.send(ev).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        skipped += 1;
                        tracing::warn!(%err, "skipping malformed event line");
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%err, "stdin read failed");
                break;
            }
        }
    }
    tracing::info!(parsed, skipped, "event input drained");
}

/// Serialize events as JSONL, one per line.
pub fn to_jsonl(events: &[NormalizedEvent]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for ev in events {
        out.push_str(&serde_json::to_string(ev)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    #[test]
    fn round_trips_a_jsonl_file() {
        let scenario = coil_scenario("POOL1", Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let body = to_jsonl(&scenario.events).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();

        let events = read_events_file(file.path()).unwrap();
        assert_eq!(events.len(), scenario.events.len());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(
            file,
            r#"{{"type":"authority","ts":"2025-06-01T00:00:00Z","mint":"M","pool":"P","tax_flag":false}}"#
        )
        .unwrap();

        let events = read_events_file(file.path()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            read_events_file(file.path()),
            Err(StreamError::Empty(_))
        ));
    }
}
