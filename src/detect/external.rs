//! External bipolar-channel detector.
//!
//! # Algorithm
//! 1. Optional zero-phase highpass (`highpass_hz`).
//! 2. First difference `d[q] = x[q] - x[q-1]`.
//! 3. Baseline envelope `E = max |d|` over
//!    `[start_index, start_index + baseline_seconds·sfreq)`.
//! 4. First `q` after the baseline whose polarity-signed difference exceeds
//!    `threshold_factor · E`, moved forward to the local extremum.
//!
//! The baseline must be free of artifacts; `start_index` lets a caller skip
//! a leading segment where stimulation is already on.
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{seconds_to_samples, Detection, Method};
use crate::config::ExternalDetectorConfig;
use crate::error::{ResyncError, Result};
use crate::filter::highpass_zero_phase;

/// Direction of the onset transient in the bipolar channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Negative,
    Positive,
    Either,
}

impl Polarity {
    #[inline]
    fn signed(self, d: f64) -> f64 {
        match self {
            Polarity::Negative => -d,
            Polarity::Positive => d,
            Polarity::Either => d.abs(),
        }
    }
}

/// Locate the stimulation onset in `channel` at or after `start_index`.
///
/// Always returns a candidate: when nothing clears the threshold, the
/// largest excursion after `start_index` is returned with
/// `above_threshold = false` and the reviewer decides.
///
/// # Errors
/// `InputInconsistency` if `start_index >= channel.len()`.
pub fn detect_external(
    channel: &[f64],
    sfreq: f64,
    start_index: usize,
    cfg: &ExternalDetectorConfig,
) -> Result<Detection> {
    let len = channel.len();
    if start_index >= len {
        return Err(ResyncError::InputInconsistency(format!(
            "external start index {start_index} beyond channel length {len}"
        )));
    }

    let filtered;
    let x: &[f64] = match cfg.highpass_hz {
        Some(hz) => {
            filtered = highpass_zero_phase(channel, hz, sfreq);
            &filtered
        }
        None => channel,
    };
    let diff = |q: usize| x[q] - x[q - 1];
    let signed = |q: usize| cfg.polarity.signed(diff(q));

    let first = start_index.max(1);
    let base_end = (start_index + seconds_to_samples(cfg.baseline_seconds, sfreq)).min(len);
    let envelope = (first..base_end).map(|q| diff(q).abs()).fold(0.0_f64, f64::max);
    let threshold = cfg.threshold_factor * envelope;
    debug!(start_index, base_end, envelope, threshold, "external baseline");

    if let Some(mut q) = (base_end.max(1)..len).find(|&q| signed(q) > threshold) {
        while q + 1 < len && signed(q + 1) > signed(q) {
            q += 1;
        }
        return Ok(Detection::new(q, sfreq, Method::Threshold, len, threshold, true));
    }

    // best effort: strongest excursion after start_index
    let mut best = start_index;
    let mut best_val = f64::NEG_INFINITY;
    for q in first..len {
        let v = signed(q);
        if v > best_val {
            best = q;
            best_val = v;
        }
    }
    debug!(best, best_val, "no external onset above threshold");
    Ok(Detection::new(best, sfreq, Method::Threshold, len, threshold, false))
}
