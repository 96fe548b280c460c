//! Safetensors recording files.
//!
//! One [`Signal`] per file:
//!
//! | key           | dtype | shape  | content                          |
//! |---------------|-------|--------|----------------------------------|
//! | `data`        | F64   | [C, T] | samples (F32 accepted on read)   |
//! | `sfreq`       | F64   | [1]    | sampling rate, Hz                |
//! | `ch_names`    | U8    | [n]    | newline-joined channel names     |
//! | `annot_onset` | F64   | [N]    | annotation onsets, s             |
//! | `annot_desc`  | U8    | [n]    | newline-joined descriptions      |
//!
//! The annotation keys are optional on read. Writes go through a temp file
//! and a rename.
use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use serde_json::Value;

use crate::detect::RecordingKind;
use crate::error::{ResyncError, Result};
use crate::params::atomic_write;
use crate::signal::{Annotation, Signal};

/// Extension of every recording this crate reads and writes.
pub const EXTENSION: &str = "safetensors";

// ── Low-level safetensors parser ─────────────────────────────────────────────

struct Tensors<'a> {
    header: HashMap<String, Value>,
    body: &'a [u8],
}

impl<'a> Tensors<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(bad("safetensors file too small"));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        let end = 8usize
            .checked_add(n)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| bad("truncated header"))?;
        let header: HashMap<String, Value> = serde_json::from_slice(&bytes[8..end])
            .map_err(|e| bad(format!("failed to parse safetensors header: {e}")))?;
        Ok(Self { header, body: &bytes[end..] })
    }

    fn entry(&self, key: &str) -> Option<&Value> {
        self.header.get(key)
    }

    fn raw(&self, key: &str) -> Result<(&'a [u8], &str, Vec<usize>)> {
        let entry = self.entry(key).ok_or_else(|| bad(format!("missing '{key}' key")))?;
        let dtype = entry["dtype"].as_str().ok_or_else(|| bad(format!("'{key}': no dtype")))?;
        let offsets = entry["data_offsets"]
            .as_array()
            .filter(|o| o.len() == 2)
            .ok_or_else(|| bad(format!("'{key}': bad data_offsets")))?;
        let s = offsets[0].as_u64().unwrap_or(u64::MAX) as usize;
        let e = offsets[1].as_u64().unwrap_or(u64::MAX) as usize;
        if s > e || e > self.body.len() {
            return Err(bad(format!("'{key}': offsets {s}..{e} beyond body")));
        }
        let shape = entry["shape"]
            .as_array()
            .ok_or_else(|| bad(format!("'{key}': no shape")))?
            .iter()
            .map(|v| {
                v.as_u64()
                    .map(|d| d as usize)
                    .ok_or_else(|| bad(format!("'{key}': bad shape")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((&self.body[s..e], dtype, shape))
    }

    fn f64s(&self, key: &str) -> Result<(Vec<f64>, Vec<usize>)> {
        let (raw, dtype, shape) = self.raw(key)?;
        let values = match dtype {
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            other => return Err(bad(format!("'{key}': unsupported dtype {other}"))),
        };
        Ok((values, shape))
    }

    fn lines(&self, key: &str) -> Result<Vec<String>> {
        let (raw, _, _) = self.raw(key)?;
        let text = std::str::from_utf8(raw).map_err(|e| bad(format!("'{key}': {e}")))?;
        Ok(if text.is_empty() { Vec::new() } else { text.split('\n').map(String::from).collect() })
    }
}

fn bad(msg: impl Into<String>) -> ResyncError {
    ResyncError::Signal(msg.into())
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Load a recording written by [`write_signal`] (or any producer of the same
/// layout).
pub fn read_signal<P: AsRef<Path>>(path: P) -> Result<Signal> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let t = Tensors::parse(&bytes)?;

    let (values, shape) = t.f64s("data")?;
    let &[n_chan, n_times] = shape.as_slice() else {
        return Err(bad(format!("'data' must be 2-D, got shape {shape:?}")));
    };
    let data = Array2::from_shape_vec((n_chan, n_times), values)
        .map_err(|e| bad(format!("'data': {e}")))?;

    let sfreq = *t.f64s("sfreq")?.0.first().ok_or_else(|| bad("empty 'sfreq'"))?;
    let ch_names = t.lines("ch_names")?;

    let annotations = if t.entry("annot_onset").is_some() {
        let (onsets, _) = t.f64s("annot_onset")?;
        let descs = t.lines("annot_desc")?;
        if descs.len() != onsets.len() {
            return Err(bad(format!(
                "{} annotation onsets but {} descriptions",
                onsets.len(),
                descs.len()
            )));
        }
        onsets.into_iter().zip(descs).map(|(o, d)| Annotation::new(o, d)).collect()
    } else {
        Vec::new()
    };

    Signal::new(data, sfreq, ch_names)?.with_annotations(annotations)
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Safetensors file writer for F64 and U8 tensors.
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    /// Newline-joined UTF-8 strings as a U8 tensor.
    pub fn add_lines<S: AsRef<str>>(&mut self, name: &str, lines: &[S]) {
        let joined = lines.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n");
        let bytes = joined.into_bytes();
        let len = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![len]));
    }

    /// Serialize header and tensors.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let mut hdr = serde_json::to_vec(&header_map).map_err(|e| bad(format!("header: {e}")))?;
        let pad = (8 - hdr.len() % 8) % 8;
        hdr.extend(std::iter::repeat(b' ').take(pad));

        let mut out = Vec::with_capacity(8 + hdr.len() + offset);
        out.extend_from_slice(&(hdr.len() as u64).to_le_bytes());
        out.extend_from_slice(&hdr);
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    /// Write atomically to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write(path, &self.to_bytes()?)
    }
}

/// Write `signal` to `path`.
pub fn write_signal<P: AsRef<Path>>(path: P, signal: &Signal) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_arr2("data", signal.data());
    w.add_f64("sfreq", &[signal.sfreq()], &[1]);
    w.add_lines("ch_names", signal.ch_names());
    let onsets: Vec<f64> = signal.annotations().iter().map(|a| a.onset).collect();
    let descs: Vec<&str> = signal.annotations().iter().map(|a| a.description.as_str()).collect();
    w.add_f64("annot_onset", &onsets, &[onsets.len()]);
    w.add_lines("annot_desc", &descs);
    w.write(path.as_ref())
}

/// `SYNCHRONIZED_<KIND>_<stem>.safetensors` for an input file name.
pub fn synchronized_file_name(kind: RecordingKind, source: &Path) -> String {
    let stem = source.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let tag = match kind {
        RecordingKind::External => "EXTERNAL",
        RecordingKind::Intracranial => "INTRACRANIAL",
    };
    format!("SYNCHRONIZED_{tag}_{stem}.{EXTENSION}")
}
