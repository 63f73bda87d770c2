//! Frame normalization and dispatch to the store.

use chrono::{DateTime, Local};
use serde_json::Value;

use super::{frame_type, Frame};
use crate::storage::{SchemaStore, StoreResult};

/// Arrival timestamp layout: day/month/year hour:minute:second, numeric only so it
/// does not depend on the host locale.
pub const TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIME_FORMAT).to_string()
}

/// Result of a successfully persisted frame.
#[derive(Debug, Clone)]
pub struct StoredFrame {
    pub kind: String,
    pub row_id: i64,
    pub frame: Frame,
}

/// Fill in the fields every stored frame must carry.
///
/// `src` falls back to `local_callsign` when missing, null or empty; `time` is
/// always replaced with `at`, discarding any device-supplied value. Returns the
/// frame's classification.
pub fn normalize(frame: &mut Frame, local_callsign: &str, at: &DateTime<Local>) -> String {
    let kind = frame_type(frame);
    let has_src = match frame.get("src") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };
    if !has_src {
        frame.insert("src".to_string(), Value::String(local_callsign.to_string()));
    }
    frame.insert("time".to_string(), Value::String(format_timestamp(at)));
    kind
}

/// Normalizes frames and writes them into the table named after their type.
pub struct FrameProcessor {
    store: SchemaStore,
    local_callsign: String,
}

impl FrameProcessor {
    pub fn new(store: SchemaStore, local_callsign: impl Into<String>) -> Self {
        Self {
            store,
            local_callsign: local_callsign.into(),
        }
    }

    pub fn process(&mut self, frame: Frame) -> StoreResult<StoredFrame> {
        self.process_at(frame, &Local::now())
    }

    /// [`process`](Self::process) with an explicit arrival time.
    pub fn process_at(&mut self, mut frame: Frame, at: &DateTime<Local>) -> StoreResult<StoredFrame> {
        let kind = normalize(&mut frame, &self.local_callsign, at);
        let row_id = self.store.insert(&kind, &frame)?;
        Ok(StoredFrame {
            kind,
            row_id,
            frame,
        })
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn local_callsign(&self) -> &str {
        &self.local_callsign
    }
}
