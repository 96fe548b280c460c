//! Cross-recording synchronization.
//!
//! Both recordings are cropped to start [`PRE_ARTIFACT_SECONDS`] before
//! their own confirmed artifact, then every external event is carried into
//! the intracranial time base:
//!
//! ```text
//! sample_ext ─÷ sf_ext─▶ seconds ─− ext_offset─▶ seconds (cropped) ─× sf_intra─▶ sample_intra
//! ```
//!
//! Seconds come first: raw sample counts are never rescaled across rates.
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ResyncError, Result};
use crate::signal::{Annotation, Signal};

/// Context kept before the artifact in each cropped recording.
pub const PRE_ARTIFACT_SECONDS: f64 = 1.0;

/// Crop start of each recording, in its own original clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncOffset {
    pub external_offset_seconds: f64,
    pub intracranial_offset_seconds: f64,
}

impl SyncOffset {
    /// `max(artifact_time - 1 s, 0)` for each recording.
    pub fn new(external_artifact_time: f64, intracranial_artifact_time: f64) -> Self {
        Self {
            external_offset_seconds: crop_start(external_artifact_time),
            intracranial_offset_seconds: crop_start(intracranial_artifact_time),
        }
    }
}

#[inline]
fn crop_start(artifact_time: f64) -> f64 {
    (artifact_time - PRE_ARTIFACT_SECONDS).max(0.0)
}

/// Output of [`synchronize`].
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub external: Signal,
    pub intracranial: Signal,
    /// Realised crop starts: the start sample divided by the rate.
    pub offset: SyncOffset,
    /// Artifact time in the cropped external recording (≈ 1 s).
    pub external_fiducial: f64,
    /// Artifact time in the cropped intracranial recording (≈ 1 s).
    pub intracranial_fiducial: f64,
    /// External events that fell outside the cropped intracranial recording.
    pub dropped_events: usize,
}

/// Align `external` and `intracranial` on their confirmed artifacts.
///
/// The inputs are left untouched. The cropped intracranial recording's
/// annotations are replaced as a whole by the transferred external events;
/// the cropped external recording keeps its own, re-based.
///
/// # Errors
/// `InputInconsistency` if an artifact time is negative, non-finite or
/// past the end of its recording.
pub fn synchronize(
    external: &Signal,
    external_artifact_time: f64,
    intracranial: &Signal,
    intracranial_artifact_time: f64,
) -> Result<SyncResult> {
    check_artifact_time("external", external, external_artifact_time)?;
    check_artifact_time("intracranial", intracranial, intracranial_artifact_time)?;

    let requested = SyncOffset::new(external_artifact_time, intracranial_artifact_time);
    let external_cropped = external.crop(requested.external_offset_seconds, external.tmax())?;
    let mut intracranial_cropped =
        intracranial.crop(requested.intracranial_offset_seconds, intracranial.tmax())?;

    let offset = SyncOffset {
        external_offset_seconds: realised_start(external, requested.external_offset_seconds),
        intracranial_offset_seconds: realised_start(
            intracranial,
            requested.intracranial_offset_seconds,
        ),
    };

    let (transferred, dropped_events) =
        transfer_events(external, offset.external_offset_seconds, &intracranial_cropped);
    if dropped_events > 0 {
        debug!(dropped_events, "external events outside the cropped intracranial recording");
    }
    intracranial_cropped.set_annotations(transferred)?;

    info!(
        external_offset = offset.external_offset_seconds,
        intracranial_offset = offset.intracranial_offset_seconds,
        events = intracranial_cropped.annotations().len(),
        "recordings synchronized"
    );

    Ok(SyncResult {
        external_fiducial: external_artifact_time - offset.external_offset_seconds,
        intracranial_fiducial: intracranial_artifact_time - offset.intracranial_offset_seconds,
        external: external_cropped,
        intracranial: intracranial_cropped,
        offset,
        dropped_events,
    })
}

/// Map every event of `external` into sample indices of `target`.
///
/// Returns the annotations that land inside `target` and the number dropped.
fn transfer_events(
    external: &Signal,
    external_offset: f64,
    target: &Signal,
) -> (Vec<Annotation>, usize) {
    let sf_ext = external.sfreq();
    let sf_intra = target.sfreq();
    let duration = target.duration_secs();

    let mut dropped = 0;
    let annotations = external
        .events_from_annotations()
        .into_iter()
        .filter_map(|ev| {
            let seconds = ev.sample as f64 / sf_ext - external_offset;
            let sample = (seconds * sf_intra).round() as i64;
            let onset = sample as f64 / sf_intra;
            if sample < 0 || onset > duration {
                dropped += 1;
                None
            } else {
                Some(Annotation::new(onset, ev.description))
            }
        })
        .collect();
    (annotations, dropped)
}

fn realised_start(signal: &Signal, tmin: f64) -> f64 {
    signal.time_to_index(tmin) as f64 / signal.sfreq()
}

fn check_artifact_time(what: &str, signal: &Signal, t: f64) -> Result<()> {
    if !t.is_finite() || t < 0.0 || t > signal.tmax() {
        return Err(ResyncError::InputInconsistency(format!(
            "{what} artifact time {t} s outside recording [0, {}] s",
            signal.tmax()
        )));
    }
    Ok(())
}
