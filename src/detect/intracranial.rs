//! Intracranial channel detectors.
//!
//! | method      | rule                                                       |
//! |-------------|------------------------------------------------------------|
//! | `threshold` | last sample inside the baseline range before it is exited  |
//! | `kernel1`   | first drop response above the baseline envelope            |
//! | `kernel2`   | as `kernel1`, with a recovery term `L` samples later       |
//! | `manual`    | no automatic rule; the reviewer picks the onset            |
//!
//! The baseline is always the `baseline_seconds` window starting at
//! `start_index`, so a restarted search never reports an index before it.
//! The flip side: an onset inside that first window is part of the
//! baseline and none of the automatic rules can find it. Such recordings
//! end in manual selection.
use tracing::debug;

use super::{seconds_to_samples, Detection, Kernel, Method};
use crate::config::IntracranialDetectorConfig;
use crate::error::{ResyncError, Result};

/// Run `method` on `channel` from `start_index`.
///
/// `Ok(None)` is a detection miss, and so is `Method::Manual`, which has no
/// automatic rule.
///
/// # Errors
/// `InputInconsistency` if `start_index >= channel.len()`.
pub fn detect_intracranial(
    channel: &[f64],
    sfreq: f64,
    method: Method,
    start_index: usize,
    cfg: &IntracranialDetectorConfig,
) -> Result<Option<Detection>> {
    if start_index >= channel.len() {
        return Err(ResyncError::InputInconsistency(format!(
            "intracranial start index {start_index} beyond channel length {}",
            channel.len()
        )));
    }
    let found = match method {
        Method::Threshold => baseline_boundary(channel, sfreq, start_index, cfg),
        Method::SteepDecrease => {
            kernel_onset(channel, sfreq, &Kernel::steep_decrease(), start_index, cfg)
        }
        Method::SteepDecreaseSlowRecovery => {
            let lag = seconds_to_samples(cfg.recovery_seconds, sfreq);
            let kernel = Kernel::steep_decrease_slow_recovery(lag);
            kernel_onset(channel, sfreq, &kernel, start_index, cfg)
        }
        Method::Manual => None,
    };
    let found = found.map(|mut d| {
        d.method = method;
        d
    });
    debug!(
        %method,
        start_index,
        sample = ?found.as_ref().map(|d| d.sample_index),
        "intracranial detection"
    );
    Ok(found)
}

/// Threshold method.
fn baseline_boundary(
    x: &[f64],
    sfreq: f64,
    start: usize,
    cfg: &IntracranialDetectorConfig,
) -> Option<Detection> {
    let base_end = start + seconds_to_samples(cfg.baseline_seconds, sfreq);
    if base_end >= x.len() {
        return None;
    }
    let (lo, hi) = x[start..base_end]
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let margin = cfg.threshold_tolerance * (hi - lo);
    let (lo, hi) = (lo - margin, hi + margin);

    let exit = (base_end..x.len()).find(|&e| x[e] < lo || x[e] > hi)?;
    Some(Detection::new(exit - 1, sfreq, Method::Threshold, x.len(), hi - lo, true))
}

/// Shared search for both kernels.
fn kernel_onset(
    x: &[f64],
    sfreq: f64,
    kernel: &Kernel,
    start: usize,
    cfg: &IntracranialDetectorConfig,
) -> Option<Detection> {
    let valid = kernel.valid_range(x.len());
    let first = start.max(valid.start);
    let base_end = first + seconds_to_samples(cfg.baseline_seconds, sfreq);
    if base_end >= valid.end {
        return None;
    }
    let envelope = (first..base_end)
        .map(|n| kernel.response(x, n).abs())
        .fold(0.0_f64, f64::max);
    let threshold = cfg.kernel_threshold_factor * envelope;

    let mut n = (base_end..valid.end).find(|&n| kernel.response(x, n) > threshold)?;
    while n + 1 < valid.end && kernel.response(x, n + 1) > kernel.response(x, n) {
        n += 1;
    }
    Some(Detection::new(n, sfreq, Method::SteepDecrease, x.len(), threshold, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SF: f64 = 1000.0;

    /// Flat baseline, drop of `depth` at `at`, exponential recovery.
    fn lfp(len: usize, at: usize, depth: f64, tau: f64) -> Vec<f64> {
        (0..len)
            .map(|i| if i < at { 0.0 } else { -depth * (-((i - at) as f64) / tau).exp() })
            .collect()
    }

    fn cfg() -> IntracranialDetectorConfig {
        IntracranialDetectorConfig::default()
    }

    #[test]
    fn kernels_hit_the_onset() {
        let x = lfp(10_000, 3500, 100.0, 100.0);
        for m in [Method::SteepDecrease, Method::SteepDecreaseSlowRecovery] {
            let d = detect_intracranial(&x, SF, m, 0, &cfg()).unwrap().unwrap();
            assert_eq!(d.sample_index, 3500, "{m}");
            assert_eq!(d.method, m);
        }
    }

    #[test]
    fn threshold_returns_boundary_sample() {
        let x = lfp(10_000, 3500, 100.0, 100.0);
        let d = detect_intracranial(&x, SF, Method::Threshold, 0, &cfg()).unwrap().unwrap();
        assert_eq!(d.sample_index, 3499);
    }

    #[test]
    fn manual_has_no_rule() {
        let x = lfp(10_000, 3500, 100.0, 100.0);
        assert!(detect_intracranial(&x, SF, Method::Manual, 0, &cfg()).unwrap().is_none());
    }

    #[test]
    fn short_channel_is_a_miss() {
        let x = lfp(1500, 1000, 100.0, 100.0);
        for m in [Method::Threshold, Method::SteepDecrease, Method::SteepDecreaseSlowRecovery] {
            assert!(detect_intracranial(&x, SF, m, 0, &cfg()).unwrap().is_none(), "{m}");
        }
    }

    #[test]
    fn onset_inside_baseline_is_missed() {
        let x = lfp(10_000, 1_000, 100.0, 100.0);
        for m in [Method::Threshold, Method::SteepDecrease, Method::SteepDecreaseSlowRecovery] {
            assert!(detect_intracranial(&x, SF, m, 0, &cfg()).unwrap().is_none(), "{m}");
        }
    }

    #[test]
    fn start_past_end_is_rejected() {
        let x = vec![0.0; 100];
        assert!(detect_intracranial(&x, SF, Method::Threshold, 100, &cfg()).is_err());
    }
}
