//! Clock-drift check on a second, later artifact.
//!
//! After synchronization both recordings agree at the first artifact. A
//! second stimulation onset later in the session is detected in each
//! cropped recording; any disagreement there is clock drift:
//!
//! ```text
//! drift_seconds  = (t_intra2 − t_ext2) − (t_intra1 − t_ext1)
//! measured_over  = t_ext2 − t_ext1
//! drift_rate_ppm = drift_seconds / measured_over · 1e6
//! ```
//!
//! Positive drift: the intracranial clock counted more time than the
//! external one. The recordings are never modified.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ResyncConfig;
use crate::detect::{detect_external, detect_intracranial, Method, RecordingKind};
use crate::error::{ResyncError, Result};
use crate::params::{self, ParamStore};
use crate::sync::SyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftEstimate {
    pub drift_seconds: f64,
    pub measured_over_seconds: f64,
    pub drift_rate_ppm: f64,
}

impl DriftEstimate {
    /// From the fiducial times (seconds, cropped time bases) of both
    /// artifacts.
    ///
    /// # Errors
    /// `DetectionMiss` on the external recording when the second artifact
    /// is not after the first.
    pub fn from_fiducials(t_ext1: f64, t_intra1: f64, t_ext2: f64, t_intra2: f64) -> Result<Self> {
        let measured_over_seconds = t_ext2 - t_ext1;
        if !(measured_over_seconds > 0.0) {
            return Err(ResyncError::DetectionMiss {
                recording: RecordingKind::External,
                method: Method::Threshold,
                start_index: 0,
            });
        }
        let drift_seconds = (t_intra2 - t_ext2) - (t_intra1 - t_ext1);
        Ok(Self {
            drift_seconds,
            measured_over_seconds,
            drift_rate_ppm: drift_seconds / measured_over_seconds * 1e6,
        })
    }

    /// Upsert the three drift keys.
    pub fn record(&self, store: &mut ParamStore) -> Result<()> {
        store.upsert_many([
            (params::KEY_DRIFT_SECONDS, Value::from(self.drift_seconds)),
            (params::KEY_DRIFT_MEASURED_OVER, Value::from(self.measured_over_seconds)),
            (params::KEY_DRIFT_RATE_PPM, Value::from(self.drift_rate_ppm)),
        ])
    }
}

/// Where the artifact lives in each cropped recording.
#[derive(Debug, Clone, Copy)]
pub struct DriftChannels<'a> {
    /// Bipolar selector of the external recording.
    pub external: &'a str,
    /// Row of the intracranial recording.
    pub intracranial: usize,
    /// Method confirmed at synchronization time.
    pub intracranial_method: Method,
}

/// Detect the second artifact in both synchronized recordings, compare it
/// with the first, and record the estimate in `store`.
///
/// The search starts at `cfg.drift.search_from_seconds` (cropped time),
/// by default half of the shorter recording. A manual intracranial method
/// is replaced by `threshold`; this pass never prompts.
///
/// # Errors
/// `DetectionMiss` when either recording has no qualifying second artifact.
pub fn estimate_drift(
    sync: &SyncResult,
    channels: DriftChannels<'_>,
    cfg: &ResyncConfig,
    store: &mut ParamStore,
) -> Result<DriftEstimate> {
    let ext = &sync.external;
    let intra = &sync.intracranial;
    let search_from = cfg
        .drift
        .search_from_seconds
        .unwrap_or_else(|| ext.duration_secs().min(intra.duration_secs()) / 2.0);

    let ext_channel = ext.bipolar(channels.external)?.samples;
    let ext_start = ext.time_to_index(search_from);
    let ext_miss = ResyncError::DetectionMiss {
        recording: RecordingKind::External,
        method: Method::Threshold,
        start_index: ext_start,
    };
    if ext_start >= ext_channel.len() {
        return Err(ext_miss);
    }
    let d_ext = detect_external(&ext_channel, ext.sfreq(), ext_start, &cfg.external)?;
    if !d_ext.above_threshold {
        return Err(ext_miss);
    }

    let method = match channels.intracranial_method {
        Method::Manual => Method::Threshold,
        m => m,
    };
    let intra_channel = intra.channel(channels.intracranial)?;
    let intra_start = intra.time_to_index(search_from);
    let intra_miss = ResyncError::DetectionMiss {
        recording: RecordingKind::Intracranial,
        method,
        start_index: intra_start,
    };
    if intra_start >= intra_channel.len() {
        return Err(intra_miss);
    }
    let d_intra =
        detect_intracranial(&intra_channel, intra.sfreq(), method, intra_start, &cfg.intracranial)?
            .ok_or(intra_miss)?;

    let estimate = DriftEstimate::from_fiducials(
        sync.external_fiducial,
        sync.intracranial_fiducial,
        d_ext.time,
        d_intra.time,
    )?;

    if estimate.drift_seconds.abs() * 1e3 > cfg.drift.warn_threshold_ms {
        warn!(
            drift_ms = estimate.drift_seconds * 1e3,
            threshold_ms = cfg.drift.warn_threshold_ms,
            "drift between recordings exceeds threshold"
        );
    }
    info!(
        drift_seconds = estimate.drift_seconds,
        measured_over = estimate.measured_over_seconds,
        ppm = estimate.drift_rate_ppm,
        %method,
        "drift estimated"
    );
    estimate.record(store)?;
    Ok(estimate)
}
