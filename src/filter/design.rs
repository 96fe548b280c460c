//! FIR highpass design.
//!
//! For a cutoff `l_freq` at sampling rate `sfreq`:
//!   • transition bandwidth = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • length N             = ceil(3.3 / trans_bw * sfreq), forced odd
//!   • Hamming-windowed sinc lowpass, spectrally inverted
use std::f64::consts::PI;

/// Transition bandwidth for a highpass at `l_freq` Hz.
pub fn auto_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// Odd number of taps for the given transition bandwidth.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n = (3.3 / trans_bw * sfreq).ceil() as usize;
    n | 1
}

/// Highpass impulse response with its cutoff at the middle of the
/// transition band.
pub fn design_highpass(l_freq: f64, sfreq: f64) -> Vec<f64> {
    let trans_bw = auto_trans_bandwidth(l_freq);
    let n = auto_filter_length(trans_bw, sfreq);
    let cutoff_hz = l_freq - trans_bw / 2.0;
    firwin(n, cutoff_hz, sfreq, false)
}

/// Windowed-sinc FIR with unit DC gain; `pass_zero = false` inverts the
/// lowpass into a highpass (`delta[N/2] - h_lp`).
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    debug_assert!(n % 2 == 1, "linear-phase design needs an odd length");
    let centre = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0);
    let win = hamming(n);

    let mut h: Vec<f64> = win
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let x = i as f64 - centre;
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * w
        })
        .collect();

    let gain: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= gain);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_odd_across_rates() {
        for sfreq in [250.0, 512.0, 4000.0] {
            let n = auto_filter_length(auto_trans_bandwidth(1.0), sfreq);
            assert_eq!(n % 2, 1, "N={n} at {sfreq} Hz");
        }
    }

    #[test]
    fn highpass_blocks_dc() {
        let h = design_highpass(1.0, 250.0);
        let dc: f64 = h.iter().sum();
        assert!(dc.abs() < 1e-9, "DC gain {dc}");
    }

    #[test]
    fn highpass_is_symmetric() {
        let h = design_highpass(1.0, 250.0);
        let n = h.len();
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-12);
        }
    }
}
