//! Stimulation-onset artifact detection.
//!
//! Two detector families share the types in this module:
//!
//! - [`external`]: one rule on the external bipolar channel, with a
//!   best-effort fallback so the reviewer always has a candidate to judge.
//! - [`intracranial`]: interchangeable strategies ([`Method`]) on the
//!   intracranial channel; a strategy that finds nothing returns `None`.
//!
//! Detectors are stateless. They never look before `start_index`, and the
//! retry/escalation policy around them lives in [`crate::confirm`].
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResyncError;

pub mod external;
pub mod intracranial;
pub mod kernel;

pub use external::{detect_external, Polarity};
pub use intracranial::detect_intracranial;
pub use kernel::Kernel;

/// Half-width of the window handed to the reviewer around a candidate.
pub const REVIEW_HALF_WINDOW_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingKind {
    External,
    Intracranial,
}

impl fmt::Display for RecordingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingKind::External => write!(f, "external"),
            RecordingKind::Intracranial => write!(f, "intracranial"),
        }
    }
}

/// Detection strategy that produced an artifact mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Boundary of the baseline amplitude distribution.
    #[serde(rename = "threshold")]
    Threshold,
    /// Kernel 1: steep decrease only.
    #[serde(rename = "kernel1")]
    SteepDecrease,
    /// Kernel 2: steep decrease followed by a slower partial recovery.
    #[serde(rename = "kernel2")]
    SteepDecreaseSlowRecovery,
    /// Onset picked by the reviewer.
    #[serde(rename = "manual")]
    Manual,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Threshold => "threshold",
            Method::SteepDecrease => "kernel1",
            Method::SteepDecreaseSlowRecovery => "kernel2",
            Method::Manual => "manual",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ResyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "threshold" | "thresh" => Ok(Method::Threshold),
            "kernel1" | "1" => Ok(Method::SteepDecrease),
            "kernel2" | "2" => Ok(Method::SteepDecreaseSlowRecovery),
            "manual" => Ok(Method::Manual),
            other => Err(ResyncError::InputInconsistency(format!(
                "unknown detection method '{other}'"
            ))),
        }
    }
}

/// Raw output of one detector call.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub sample_index: usize,
    /// `sample_index / sfreq`.
    pub time: f64,
    pub method: Method,
    /// Samples to show the reviewer, `±REVIEW_HALF_WINDOW_SECONDS` around
    /// the candidate, clamped to the channel.
    pub window: Range<usize>,
    /// Threshold the detector compared against.
    pub threshold: f64,
    /// `false` only for a best-effort external candidate.
    pub above_threshold: bool,
}

impl Detection {
    pub(crate) fn new(
        sample_index: usize,
        sfreq: f64,
        method: Method,
        len: usize,
        threshold: f64,
        above_threshold: bool,
    ) -> Self {
        let half = (REVIEW_HALF_WINDOW_SECONDS * sfreq).round() as usize;
        let window = sample_index.saturating_sub(half)..(sample_index + half + 1).min(len);
        Self {
            sample_index,
            time: sample_index as f64 / sfreq,
            method,
            window,
            threshold,
            above_threshold,
        }
    }
}

/// One recording's synchronization fiducial.
///
/// Created as a candidate; [`ArtifactMark::confirm`] consumes it and the
/// confirmed mark exposes no mutators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactMark {
    recording: RecordingKind,
    sample_index: usize,
    method: Method,
    confirmed: bool,
}

impl ArtifactMark {
    pub fn candidate(recording: RecordingKind, detection: &Detection) -> Self {
        Self {
            recording,
            sample_index: detection.sample_index,
            method: detection.method,
            confirmed: false,
        }
    }

    pub fn manual(recording: RecordingKind, sample_index: usize) -> Self {
        Self { recording, sample_index, method: Method::Manual, confirmed: false }
    }

    #[must_use]
    pub fn confirm(self) -> Self {
        Self { confirmed: true, ..self }
    }

    pub fn recording(&self) -> RecordingKind {
        self.recording
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Onset in seconds on the recording's own clock.
    pub fn time(&self, sfreq: f64) -> f64 {
        self.sample_index as f64 / sfreq
    }
}

/// Number of samples in `seconds` at `sfreq`, at least one.
pub(crate) fn seconds_to_samples(seconds: f64, sfreq: f64) -> usize {
    ((seconds * sfreq).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_legacy_names() {
        assert_eq!("thresh".parse::<Method>().unwrap(), Method::Threshold);
        assert_eq!("2".parse::<Method>().unwrap(), Method::SteepDecreaseSlowRecovery);
        assert_eq!("Kernel1".parse::<Method>().unwrap(), Method::SteepDecrease);
        assert!("kernel3".parse::<Method>().is_err());
    }

    #[test]
    fn review_window_is_clamped() {
        let d = Detection::new(100, 250.0, Method::Threshold, 200, 0.0, true);
        assert_eq!(d.window, 0..200);
        assert_eq!(d.time, 0.4);
    }

    #[test]
    fn confirm_keeps_fields() {
        let d = Detection::new(625, 250.0, Method::Threshold, 10_000, 0.0, true);
        let mark = ArtifactMark::candidate(RecordingKind::External, &d);
        assert!(!mark.is_confirmed());
        let mark = mark.confirm();
        assert!(mark.is_confirmed());
        assert_eq!(mark.sample_index(), 625);
        assert_eq!(mark.time(250.0), 2.5);
    }
}
