//! Overlap-add FIR convolution, zero-phase by a `(N-1)/2` output shift.
//!
//! Edges are padded by odd reflection (`2·x[0] - x[i]`) so the filter
//! transient does not pull the first and last samples towards zero.
use rustfft::{num_complex::Complex, FftPlanner};

/// Filter `x` with the odd-length FIR `h`; the output has `x.len()` samples.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Vec<f64> {
    let n_x = x.len();
    let n_h = h.len();
    if n_x == 0 || n_h == 0 {
        return x.to_vec();
    }

    let shift = (n_h - 1) / 2;
    let n_edge = n_h - 1;
    let x_ext = odd_reflect_pad(x, n_edge);
    let n_ext = x_ext.len();

    let n_fft = block_len(n_h, n_ext);
    let n_seg = n_fft - n_h + 1;

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fwd = planner.plan_fft_forward(n_fft);
    let inv = planner.plan_fft_inverse(n_fft);

    let mut h_fft = zero_padded(h, n_fft);
    fwd.process(&mut h_fft);

    let scale = 1.0 / n_fft as f64;
    let mut y = vec![0.0_f64; n_ext];
    for start in (0..n_ext).step_by(n_seg) {
        let stop = (start + n_seg).min(n_ext);
        let mut buf = zero_padded(&x_ext[start..stop], n_fft);
        fwd.process(&mut buf);
        buf.iter_mut().zip(&h_fft).for_each(|(b, hf)| *b *= hf);
        inv.process(&mut buf);

        // Output sample `o` takes product sample `o - start + shift`.
        for (k, v) in buf.iter().enumerate() {
            let Some(o) = (start + k).checked_sub(shift) else { continue };
            if o >= n_ext {
                break;
            }
            y[o] += v.re * scale;
        }
    }

    y[n_edge..n_edge + n_x].to_vec()
}

/// Pad `n` samples on both sides by odd reflection; zeros beyond the signal.
fn odd_reflect_pad(x: &[f64], n: usize) -> Vec<f64> {
    let len = x.len();
    let avail = n.min(len - 1);
    let first = x[0];
    let last = x[len - 1];

    let mut out = Vec::with_capacity(len + 2 * n);
    out.extend(std::iter::repeat(0.0).take(n - avail));
    out.extend((1..=avail).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=avail).map(|i| 2.0 * last - x[len - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(n - avail));
    out
}

/// Smallest power-of-two block that holds the kernel, grown while the
/// segment count dominates the cost.
fn block_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = (2 * n_h - 1).next_power_of_two();
    let max_fft = (n_x + n_h).next_power_of_two().max(min_fft);
    let cost = |n: usize| {
        let segments = (n_x as f64 / (n - n_h + 1) as f64).ceil();
        segments * n as f64 * ((n as f64).log2() + 1.0) + 4e-5 * n as f64 * n_x as f64
    };
    let mut best = min_fft;
    let mut n = min_fft;
    while n <= max_fft {
        if cost(n) < cost(best) {
            best = n;
        }
        n *= 2;
    }
    best
}

fn zero_padded(x: &[f64], n: usize) -> Vec<Complex<f64>> {
    x.iter()
        .map(|&re| Complex { re, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n)
        .collect()
}
