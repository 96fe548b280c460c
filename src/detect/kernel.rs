//! Sparse matched-filter kernels for the intracranial onset.
//!
//! A kernel is a list of `(offset, weight)` taps; its response at `n` is
//! `Σ weight · x[n + offset]`. Both kernels are oriented so that a drop in
//! amplitude at `n` gives a positive response.
//!
//! ```text
//! kernel 1   r[n] = x[n-1] - x[n]
//! kernel 2   r[n] = (x[n-1] - x[n]) + (x[n+L] - x[n])
//! ```
//! `L` is the recovery lag in samples.

#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    taps: Vec<(isize, f64)>,
}

impl Kernel {
    /// Kernel 1: the steep decrease alone.
    pub fn steep_decrease() -> Self {
        Self { taps: vec![(-1, 1.0), (0, -1.0)] }
    }

    /// Kernel 2: steep decrease plus partial recovery `lag` samples later.
    pub fn steep_decrease_slow_recovery(lag: usize) -> Self {
        let lag = lag.max(2) as isize;
        Self { taps: vec![(-1, 1.0), (0, -2.0), (lag, 1.0)] }
    }

    /// Most negative tap offset, as a positive count.
    pub fn lead(&self) -> usize {
        self.taps.iter().map(|&(o, _)| (-o).max(0) as usize).max().unwrap_or(0)
    }

    /// Largest positive tap offset.
    pub fn lag(&self) -> usize {
        self.taps.iter().map(|&(o, _)| o.max(0) as usize).max().unwrap_or(0)
    }

    /// Indices `n` where every tap falls inside a channel of `len` samples.
    pub fn valid_range(&self, len: usize) -> std::ops::Range<usize> {
        let lead = self.lead();
        let end = len.saturating_sub(self.lag());
        lead..end.max(lead)
    }

    /// Response at `n`; the caller keeps `n` inside [`Kernel::valid_range`].
    #[inline]
    pub fn response(&self, x: &[f64], n: usize) -> f64 {
        self.taps
            .iter()
            .map(|&(o, w)| w * x[(n as isize + o) as usize])
            .sum()
    }
}
