//! Zero-phase FIR highpass used to strip slow drift from the external
//! bipolar channel before artifact detection.
//!
//! - [`design`]: Hamming-windowed sinc highpass, MNE `firwin` conventions.
//! - [`apply`]: overlap-add convolution with a `(N-1)/2` shift.

pub mod apply;
pub mod design;

pub use apply::filter_1d;
pub use design::{auto_filter_length, auto_trans_bandwidth, design_highpass, firwin, hamming};

/// Highpass `x` at `l_freq` Hz with a zero-phase FIR designed for `sfreq`.
pub fn highpass_zero_phase(x: &[f64], l_freq: f64, sfreq: f64) -> Vec<f64> {
    let h = design_highpass(l_freq, sfreq);
    filter_1d(x, &h)
}
