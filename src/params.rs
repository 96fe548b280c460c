//! Per-session parameter record.
//!
//! The audit trail of one synchronization: rates, channel indices, the
//! confirmed artifact times and which method found them. Stored as a flat
//! JSON object in `<session_id>_sync_parameters.json`.
//!
//! Every write is an upsert by key followed by an atomic rewrite of the
//! whole file, so re-running a step overwrites only its own keys and a
//! failed write leaves the previous file intact.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ResyncError, Result};

pub const KEY_SESSION_ID: &str = "session_id";
pub const KEY_SF_INTRACRANIAL: &str = "sf_intracranial";
pub const KEY_CH_IDX_INTRACRANIAL: &str = "ch_idx_intracranial";
pub const KEY_FNAME_EXTERNAL: &str = "fname_external";
pub const KEY_SF_EXTERNAL_RAW: &str = "sf_external_raw";
pub const KEY_SF_EXTERNAL: &str = "sf_external";
pub const KEY_CH_IDX_EXTERNAL: &str = "ch_idx_external";
pub const KEY_ART_TIME_EXTERNAL: &str = "art_time_external";
pub const KEY_ART_TIME_INTRACRANIAL: &str = "art_time_intracranial";
pub const KEY_METHOD: &str = "method";
pub const KEY_EXTERNAL_METHOD: &str = "external_method";
pub const KEY_DRIFT_SECONDS: &str = "drift_seconds";
pub const KEY_DRIFT_MEASURED_OVER: &str = "drift_measured_over_seconds";
pub const KEY_DRIFT_RATE_PPM: &str = "drift_rate_ppm";

/// Keys written by a drift estimate.
pub const DRIFT_KEYS: [&str; 3] = [KEY_DRIFT_SECONDS, KEY_DRIFT_MEASURED_OVER, KEY_DRIFT_RATE_PPM];

/// File name of a session's record.
pub fn file_name(session_id: &str) -> String {
    format!("{session_id}_sync_parameters.json")
}

#[derive(Debug, Clone)]
pub struct ParamStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl ParamStore {
    /// Open the record of `session_id` in `dir`, loading any previous run.
    ///
    /// Nothing is written until the first upsert.
    pub fn open<P: AsRef<Path>>(dir: P, session_id: &str) -> Result<Self> {
        let path = dir.as_ref().join(file_name(session_id));
        let values = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|e| {
                ResyncError::InputInconsistency(format!("parameter file {}: {e}", path.display()))
            })?
        } else {
            Map::new()
        };
        let mut store = Self { path, values };
        store.values.insert(KEY_SESSION_ID.into(), Value::from(session_id));
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set one key and persist.
    pub fn upsert<V: Serialize>(&mut self, key: &str, value: V) -> Result<()> {
        self.upsert_many([(key, to_value(key, value)?)])
    }

    /// Set several keys and persist once.
    ///
    /// The in-memory record is only updated once the file write succeeds.
    pub fn upsert_many<'k, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'k str, Value)>,
    {
        let mut next = self.values.clone();
        for (key, value) in entries {
            next.insert(key.to_string(), value);
        }
        self.save(next)
    }

    /// Drop keys a previous run left behind and persist if any was present.
    pub fn remove_many<'k, I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let mut next = self.values.clone();
        let before = next.len();
        for key in keys {
            next.remove(key);
        }
        if next.len() == before {
            return Ok(());
        }
        self.save(next)
    }

    fn save(&mut self, next: Map<String, Value>) -> Result<()> {
        let text = serde_json::to_string_pretty(&next)
            .map_err(|e| ResyncError::InputInconsistency(format!("parameter record: {e}")))?;
        atomic_write(&self.path, text.as_bytes())?;
        debug!(path = %self.path.display(), keys = next.len(), "parameters saved");
        self.values = next;
        Ok(())
    }
}

/// Serialize `value` for `key`.
pub fn to_value<V: Serialize>(key: &str, value: V) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ResyncError::InputInconsistency(format!("parameter '{key}': {e}")))
}

/// Write `bytes` to `path` through a sibling temp file and a rename.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist = |source| ResyncError::Persistence { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(persist)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut file = fs::File::create(&tmp).map_err(persist)?;
        file.write_all(bytes).map_err(persist)?;
        file.sync_all().map_err(persist)?;
    }
    fs::rename(&tmp, path).map_err(persist)?;
    Ok(())
}
