use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Session event log: one compact JSON object per line in `events.jsonl`.
///
/// Each event carries `type`, `session_id` and `ts`; payload keys are merged
/// after those and win on collision. Clones append to the same file.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<SharedLog>,
}

#[derive(Debug)]
struct SharedLog {
    path: PathBuf,
    session_id: String,
    append: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SharedLog {
                path: path.into(),
                session_id: session_id.into(),
                append: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one event and returns the object that was written.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = self.envelope(event_type);
        event.extend(payload);
        let event = Value::Object(event);
        self.append_line(&event)?;
        Ok(event)
    }

    /// Like [`EventWriter::emit`], but a failed write is only logged.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            tracing::warn!(
                event = event_type,
                path = %self.shared.path.display(),
                error = %err,
                "failed to append event"
            );
        }
    }

    fn envelope(&self, event_type: &str) -> EventPayload {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(event_type));
        event.insert(
            "session_id".to_string(),
            Value::from(self.shared.session_id.as_str()),
        );
        event.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        event
    }

    fn append_line(&self, event: &Value) -> anyhow::Result<()> {
        let path = &self.shared.path;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let _append = self
            .shared
            .append
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed opening {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer(&mut out, event)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventPayload, EventWriter};

    fn read_rows(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        let raw = fs::read_to_string(path)?;
        raw.lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[test]
    fn events_carry_session_envelope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-a");

        let mut payload = EventPayload::new();
        payload.insert("history_len".to_string(), json!(3));
        let written = writer.emit("session_started", payload)?;

        let rows = read_rows(&path)?;
        assert_eq!(rows, vec![written]);
        assert_eq!(rows[0]["type"], "session_started");
        assert_eq!(rows[0]["session_id"], "session-a");
        assert_eq!(rows[0]["history_len"], 3);
        DateTime::parse_from_rfc3339(rows[0]["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn payload_wins_over_envelope_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-a");

        let mut payload = EventPayload::new();
        payload.insert("session_id".to_string(), json!("replayed"));
        let written = writer.emit("mode_changed", payload)?;
        assert_eq!(written["session_id"], "replayed");
        assert_eq!(written["type"], "mode_changed");
        Ok(())
    }

    #[test]
    fn clones_share_one_file_and_record_tolerates_failures() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-a");
        let clone = writer.clone();

        writer.record("generation_started", EventPayload::new());
        clone.record("image_created", EventPayload::new());
        let types: Vec<Value> = read_rows(&path)?
            .into_iter()
            .map(|row| row["type"].clone())
            .collect();
        assert_eq!(types, vec![json!("generation_started"), json!("image_created")]);

        // A directory cannot be opened for appending.
        let unwritable = EventWriter::new(temp.path(), "session-a");
        unwritable.record("lost", EventPayload::new());
        assert!(unwritable.emit("lost", EventPayload::new()).is_err());
        Ok(())
    }
}
