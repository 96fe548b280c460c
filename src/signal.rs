//! Channel-labelled, rate-tagged recordings.
//!
//! [`Signal`] is the in-memory form every other module works on: a `[C, T]`
//! `f64` array, its sampling rate, one name per row and a set of labelled
//! annotations whose onsets are seconds relative to sample 0.
//!
//! ```text
//! index:   0 ........................ T-1
//! time:    0 s ...................... (T-1) / sfreq
//! onsets:  0 ≤ onset ≤ T / sfreq
//! ```
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ResyncError, Result};

/// A timestamped label, onset in seconds from sample 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub onset: f64,
    pub description: String,
}

impl Annotation {
    pub fn new(onset: f64, description: impl Into<String>) -> Self {
        Self { onset, description: description.into() }
    }
}

/// An annotation expressed as a sample index at the owning signal's rate.
///
/// Mirrors the `events` array of `mne.events_from_annotations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sample: i64,
    pub description: String,
}

/// A 1-D channel extracted for artifact detection.
#[derive(Debug, Clone)]
pub struct BipolarChannel {
    /// Selector as given by the session metadata.
    pub label: String,
    /// Row(s) of the source signal: one for a recorded bipolar channel,
    /// two (`a`, `b`) for a derived `a - b` pair.
    pub indices: Vec<usize>,
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Signal {
    data: Array2<f64>,
    sfreq: f64,
    ch_names: Vec<String>,
    annotations: Vec<Annotation>,
}

impl Signal {
    /// Build a signal without annotations.
    ///
    /// # Errors
    /// If `ch_names.len() != data.nrows()` or `sfreq` is not a positive,
    /// finite number.
    pub fn new(data: Array2<f64>, sfreq: f64, ch_names: Vec<String>) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(ResyncError::Signal(format!("sampling rate must be positive, got {sfreq}")));
        }
        if ch_names.len() != data.nrows() {
            return Err(ResyncError::Signal(format!(
                "{} channel names for {} data rows",
                ch_names.len(),
                data.nrows()
            )));
        }
        Ok(Self { data, sfreq, ch_names, annotations: Vec::new() })
    }

    /// Builder-style variant of [`Signal::set_annotations`].
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Result<Self> {
        self.set_annotations(annotations)?;
        Ok(self)
    }

    /// Re-tag the samples with a new rate, keeping every annotation on its
    /// sample.
    pub fn with_sfreq(mut self, sfreq: f64) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(ResyncError::Signal(format!("sampling rate must be positive, got {sfreq}")));
        }
        let scale = self.sfreq / sfreq;
        for a in &mut self.annotations {
            a.onset *= scale;
        }
        self.sfreq = sfreq;
        Ok(self)
    }

    #[inline]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    #[inline]
    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    #[inline]
    pub fn ch_names(&self) -> &[String] {
        &self.ch_names
    }

    #[inline]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[inline]
    pub fn n_chan(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Total duration in seconds (`n_times / sfreq`).
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq
    }

    /// Time of the last sample (`(n_times - 1) / sfreq`), MNE's `tmax`.
    #[inline]
    pub fn tmax(&self) -> f64 {
        self.n_times().saturating_sub(1) as f64 / self.sfreq
    }

    /// Nearest sample index for time `t` (seconds), clamped at 0.
    #[inline]
    pub fn time_to_index(&self, t: f64) -> usize {
        (t * self.sfreq).round().max(0.0) as usize
    }

    /// Replace the whole annotation set.
    ///
    /// Validation happens before anything is touched: on error the previous
    /// set is left as it was.
    pub fn set_annotations(&mut self, annotations: Vec<Annotation>) -> Result<()> {
        let duration = self.duration_secs();
        if let Some(bad) = annotations
            .iter()
            .find(|a| !a.onset.is_finite() || a.onset < 0.0 || a.onset > duration)
        {
            return Err(ResyncError::Signal(format!(
                "annotation '{}' at {} s outside [0, {duration}] s",
                bad.description, bad.onset
            )));
        }
        self.annotations = annotations;
        Ok(())
    }

    /// Annotations as sample indices at this signal's rate.
    pub fn events_from_annotations(&self) -> Vec<Event> {
        self.annotations
            .iter()
            .map(|a| Event {
                sample: (a.onset * self.sfreq).round() as i64,
                description: a.description.clone(),
            })
            .collect()
    }

    /// Copy the samples between `tmin` and `tmax` (inclusive, seconds).
    ///
    /// Index 0 of the result is the sample nearest `tmin`. Annotations inside
    /// the window are kept and re-based onto the crop; the rest are dropped.
    /// `self` is not modified.
    pub fn crop(&self, tmin: f64, tmax: f64) -> Result<Signal> {
        if !(tmin.is_finite() && tmax.is_finite()) || tmin < 0.0 || tmax < tmin {
            return Err(ResyncError::Signal(format!("invalid crop window [{tmin}, {tmax}] s")));
        }
        if self.n_times() == 0 {
            return Err(ResyncError::Signal("cannot crop an empty signal".into()));
        }
        let start = self.time_to_index(tmin);
        let stop = self.time_to_index(tmax).min(self.n_times() - 1);
        if start > stop {
            return Err(ResyncError::Signal(format!(
                "crop start {tmin} s lies after the last sample ({} s)",
                self.tmax()
            )));
        }
        Ok(self.crop_samples(start, stop))
    }

    /// Sample-index form of [`Signal::crop`]; `stop` is inclusive and must be
    /// in range.
    pub(crate) fn crop_samples(&self, start: usize, stop: usize) -> Signal {
        let data = self.data.slice(s![.., start..=stop]).to_owned();
        let t0 = start as f64 / self.sfreq;
        let new_duration = (stop - start + 1) as f64 / self.sfreq;
        let annotations = self
            .annotations
            .iter()
            .filter_map(|a| {
                let onset = a.onset - t0;
                (onset >= 0.0 && onset <= new_duration)
                    .then(|| Annotation::new(onset, a.description.clone()))
            })
            .collect();
        Signal {
            data,
            sfreq: self.sfreq,
            ch_names: self.ch_names.clone(),
            annotations,
        }
    }

    /// Copy of row `idx`.
    pub fn channel(&self, idx: usize) -> Result<Vec<f64>> {
        if idx >= self.n_chan() {
            return Err(ResyncError::InputInconsistency(format!(
                "channel index {idx} out of range ({} channels)",
                self.n_chan()
            )));
        }
        Ok(self.data.row(idx).to_vec())
    }

    /// Index of the channel called `name`.
    ///
    /// Name normalisation: lowercase + strip spaces, so `"bip 01"` matches
    /// `"BIP01"`.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        let norm = |s: &str| s.replace(' ', "").to_lowercase();
        let wanted = norm(name);
        self.ch_names.iter().position(|n| norm(n) == wanted)
    }

    /// Extract the bipolar channel carrying the artifact.
    ///
    /// `selector` is either the name of a recorded channel or a derived pair
    /// `"A-B"`, computed as `A - B`.
    pub fn bipolar(&self, selector: &str) -> Result<BipolarChannel> {
        if let Some(idx) = self.channel_index(selector) {
            return Ok(BipolarChannel {
                label: selector.to_string(),
                indices: vec![idx],
                samples: self.channel(idx)?,
            });
        }
        let pair = selector
            .split_once('-')
            .and_then(|(a, b)| Some((self.channel_index(a)?, self.channel_index(b)?)));
        match pair {
            Some((a, b)) => {
                let samples = (&self.data.row(a) - &self.data.row(b)).to_vec();
                Ok(BipolarChannel { label: selector.to_string(), indices: vec![a, b], samples })
            }
            None => Err(ResyncError::InputInconsistency(format!(
                "bipolar channel '{selector}' not found in {:?}",
                self.ch_names
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(n_ch: usize, n_t: usize, sfreq: f64) -> Signal {
        let data = Array2::from_shape_fn((n_ch, n_t), |(c, t)| (c * 1000 + t) as f64);
        let names = (0..n_ch).map(|c| format!("CH {c}")).collect();
        Signal::new(data, sfreq, names).unwrap()
    }

    #[test]
    fn rejects_mismatched_names() {
        let err = Signal::new(Array2::zeros((3, 10)), 250.0, vec!["a".into()]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(Signal::new(Array2::zeros((1, 10)), 0.0, vec!["a".into()]).is_err());
        assert!(Signal::new(Array2::zeros((1, 10)), f64::NAN, vec!["a".into()]).is_err());
    }

    #[test]
    fn crop_copies_and_leaves_original() {
        let sig = ramp(2, 1000, 100.0);
        let cropped = sig.crop(2.0, sig.tmax()).unwrap();
        assert_eq!(cropped.n_times(), 800);
        assert_eq!(cropped.data()[[0, 0]], 200.0);
        assert_eq!(cropped.data()[[1, 0]], 1200.0);
        assert_eq!(sig.n_times(), 1000);
        assert_eq!(sig.data()[[0, 0]], 0.0);
    }

    #[test]
    fn crop_rebases_annotations() {
        let sig = ramp(1, 1000, 100.0)
            .with_annotations(vec![Annotation::new(1.0, "early"), Annotation::new(5.5, "task")])
            .unwrap();
        let cropped = sig.crop(2.0, sig.tmax()).unwrap();
        assert_eq!(cropped.annotations().len(), 1);
        assert_eq!(cropped.annotations()[0].description, "task");
        assert_abs_diff_eq!(cropped.annotations()[0].onset, 3.5, epsilon = 1e-12);
        // the source keeps both
        assert_eq!(sig.annotations().len(), 2);
    }

    #[test]
    fn crop_rejects_negative_start() {
        let sig = ramp(1, 100, 100.0);
        assert!(sig.crop(-0.5, 0.5).is_err());
    }

    #[test]
    fn set_annotations_is_all_or_nothing() {
        let mut sig = ramp(1, 1000, 100.0);
        sig.set_annotations(vec![Annotation::new(1.0, "keep")]).unwrap();
        let res =
            sig.set_annotations(vec![Annotation::new(2.0, "ok"), Annotation::new(11.0, "late")]);
        assert!(res.is_err());
        assert_eq!(sig.annotations(), &[Annotation::new(1.0, "keep")]);
    }

    #[test]
    fn events_use_own_rate() {
        let sig = ramp(1, 2000, 250.0)
            .with_annotations(vec![Annotation::new(2.0, "stim")])
            .unwrap();
        let ev = sig.events_from_annotations();
        assert_eq!(ev[0].sample, 500);
    }

    #[test]
    fn retagging_rate_keeps_annotation_samples() {
        let sig = ramp(1, 4096, 4095.5)
            .with_annotations(vec![Annotation::new(0.5, "stim")])
            .unwrap();
        let before = sig.events_from_annotations()[0].sample;
        let sig = sig.with_sfreq(4096.0).unwrap();
        assert_eq!(sig.sfreq(), 4096.0);
        assert_eq!(sig.events_from_annotations()[0].sample, before);
    }

    #[test]
    fn channel_lookup_ignores_case_and_spaces() {
        let sig = ramp(3, 10, 100.0);
        assert_eq!(sig.channel_index("ch2"), Some(2));
        assert_eq!(sig.channel_index("Ch 1"), Some(1));
        assert_eq!(sig.channel_index("nope"), None);
    }

    #[test]
    fn derived_bipolar_is_difference() {
        let sig = ramp(3, 10, 100.0);
        let bip = sig.bipolar("CH 2-CH 0").unwrap();
        assert_eq!(bip.indices, vec![2, 0]);
        assert!(bip.samples.iter().all(|&v| v == 2000.0));
    }

    #[test]
    fn unknown_bipolar_is_input_error() {
        let sig = ramp(2, 10, 100.0);
        assert!(matches!(sig.bipolar("BIP 01"), Err(ResyncError::InputInconsistency(_))));
    }
}
