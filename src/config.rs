//! Pipeline configuration.
//!
//! [`ResyncConfig`] holds every tunable of the detectors, the kernel order
//! and the drift pass. All fields have defaults, so a TOML file only needs
//! the values it changes:
//!
//! ```toml
//! check_drift = false
//!
//! [external]
//! highpass_hz = 1.0
//!
//! [intracranial]
//! recovery_seconds = 0.1
//! ```
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detect::{Method, Polarity};
use crate::error::{ResyncError, Result};

/// Top-level configuration.
///
/// All fields are `pub`, so struct-update syntax works:
///
/// ```
/// use resync::ResyncConfig;
///
/// let cfg = ResyncConfig {
///     check_drift: false,
///     ..ResyncConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResyncConfig {
    pub external: ExternalDetectorConfig,
    pub intracranial: IntracranialDetectorConfig,
    /// Priority order of the intracranial strategies.
    pub methods: MethodOrder,
    pub drift: DriftConfig,

    /// Round the external sampling rate to the nearest integer before use.
    ///
    /// LSL reports the measured rate (e.g. `4095.998`), while the amplifier
    /// runs at a nominal integer rate. The raw value is still recorded.
    ///
    /// Default: `true`.
    pub round_external_sfreq: bool,

    /// Run the drift pass after synchronization.
    ///
    /// Default: `true`.
    pub check_drift: bool,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            external: ExternalDetectorConfig::default(),
            intracranial: IntracranialDetectorConfig::default(),
            methods: MethodOrder::default(),
            drift: DriftConfig::default(),
            round_external_sfreq: true,
            check_drift: true,
        }
    }
}

impl ResyncConfig {
    /// Read and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg: ResyncConfig = toml::from_str(&text).map_err(|e| {
            ResyncError::InputInconsistency(format!("config {}: {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject windows, factors or rates that would make a detector
    /// meaningless.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("external.baseline_seconds", self.external.baseline_seconds),
            ("external.threshold_factor", self.external.threshold_factor),
            ("intracranial.baseline_seconds", self.intracranial.baseline_seconds),
            ("intracranial.kernel_threshold_factor", self.intracranial.kernel_threshold_factor),
            ("intracranial.recovery_seconds", self.intracranial.recovery_seconds),
            ("drift.warn_threshold_ms", self.drift.warn_threshold_ms),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(ResyncError::InputInconsistency(format!("{name} must be > 0, got {v}")));
            }
        }
        if !(self.intracranial.threshold_tolerance >= 0.0) {
            return Err(ResyncError::InputInconsistency(
                "intracranial.threshold_tolerance must be >= 0".into(),
            ));
        }
        if let Some(hz) = self.external.highpass_hz {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(ResyncError::InputInconsistency(format!(
                    "external.highpass_hz must be > 0, got {hz}"
                )));
            }
        }
        Ok(())
    }
}

/// External bipolar-channel detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalDetectorConfig {
    /// Length of the artifact-free window after `start_index` (seconds).
    ///
    /// Default: `2.0` s.
    pub baseline_seconds: f64,

    /// Threshold = `threshold_factor × max |Δx|` over the baseline.
    ///
    /// Default: `1.5`.
    pub threshold_factor: f64,

    /// Direction of the onset transient.
    ///
    /// Default: [`Polarity::Negative`].
    pub polarity: Polarity,

    /// Zero-phase FIR highpass cutoff applied before detection, in Hz.
    ///
    /// Default: `None` (no filtering).
    pub highpass_hz: Option<f64>,
}

impl Default for ExternalDetectorConfig {
    fn default() -> Self {
        Self {
            baseline_seconds: 2.0,
            threshold_factor: 1.5,
            polarity: Polarity::Negative,
            highpass_hz: None,
        }
    }
}

/// Intracranial detector strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntracranialDetectorConfig {
    /// Length of the baseline window after `start_index` (seconds).
    ///
    /// An onset earlier than this cannot be detected automatically; lower it
    /// for recordings where stimulation starts right away.
    ///
    /// Default: `2.0` s.
    pub baseline_seconds: f64,

    /// Threshold method: the baseline range `[min, max]` is widened by
    /// `threshold_tolerance × (max - min)` on each side.
    ///
    /// Default: `0.5`.
    pub threshold_tolerance: f64,

    /// Kernel methods: threshold = factor × max |response| over the baseline.
    ///
    /// Default: `2.0`.
    pub kernel_threshold_factor: f64,

    /// Kernel 2 recovery lag `L` (seconds).
    ///
    /// Default: `0.05` s.
    pub recovery_seconds: f64,
}

impl Default for IntracranialDetectorConfig {
    fn default() -> Self {
        Self {
            baseline_seconds: 2.0,
            threshold_tolerance: 0.5,
            kernel_threshold_factor: 2.0,
            recovery_seconds: 0.05,
        }
    }
}

/// Drift pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Where to start looking for the second artifact, in the cropped time
    /// base. `None` = half of the shorter cropped recording.
    pub search_from_seconds: Option<f64>,

    /// Log a warning when the measured drift exceeds this many ms.
    ///
    /// Default: `200.0` ms.
    pub warn_threshold_ms: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { search_from_seconds: None, warn_threshold_ms: 200.0 }
    }
}

/// Priority order of the intracranial strategies with `manual` last.
///
/// Construction appends `manual` when it is missing and rejects duplicates
/// or a `manual` anywhere but last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Method>", into = "Vec<Method>")]
pub struct MethodOrder(Vec<Method>);

impl MethodOrder {
    pub fn new(mut methods: Vec<Method>) -> Result<Self> {
        for (i, m) in methods.iter().enumerate() {
            if methods[..i].contains(m) {
                return Err(ResyncError::InputInconsistency(format!("method '{m}' listed twice")));
            }
        }
        match methods.iter().position(|&m| m == Method::Manual) {
            Some(i) if i + 1 != methods.len() => {
                return Err(ResyncError::InputInconsistency(
                    "'manual' must be the last method".into(),
                ));
            }
            Some(_) => {}
            None => methods.push(Method::Manual),
        }
        Ok(Self(methods))
    }

    pub fn methods(&self) -> &[Method] {
        &self.0
    }
}

impl Default for MethodOrder {
    /// threshold → kernel 2 → kernel 1 → manual.
    fn default() -> Self {
        Self(vec![
            Method::Threshold,
            Method::SteepDecreaseSlowRecovery,
            Method::SteepDecrease,
            Method::Manual,
        ])
    }
}

impl TryFrom<Vec<Method>> for MethodOrder {
    type Error = ResyncError;

    fn try_from(v: Vec<Method>) -> Result<Self> {
        MethodOrder::new(v)
    }
}

impl From<MethodOrder> for Vec<Method> {
    fn from(o: MethodOrder) -> Self {
        o.0
    }
}
