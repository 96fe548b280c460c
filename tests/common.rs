/// Shared synthetic-recording builders.
use ndarray::Array2;
use resync::{Annotation, Signal};

pub const SF_EXT: f64 = 250.0;
pub const SF_INTRA: f64 = 4000.0;

/// Intracranial recovery constant, in samples.
pub const TAU_INTRA: f64 = 400.0;

#[allow(unused)]
/// External recording with a `BIP 01` channel that drops by 50 while
/// stimulation is on, plus a flat `EMG` channel.
///
/// `stim` holds `(on, off)` sample pairs; `off = None` keeps stimulation on
/// until the end.
pub fn external(n_times: usize, stim: &[(usize, Option<usize>)]) -> Signal {
    let mut data = Array2::<f64>::zeros((2, n_times));
    for &(on, off) in stim {
        let off = off.unwrap_or(n_times).min(n_times);
        for t in on..off {
            data[[0, t]] = -50.0;
        }
    }
    Signal::new(data, SF_EXT, vec!["BIP 01".into(), "EMG".into()]).unwrap()
}

#[allow(unused)]
/// 1-D intracranial trace: a drop of 100 at every onset followed by an
/// exponential recovery with [`TAU_INTRA`].
pub fn lfp_trace(n_times: usize, onsets: &[usize]) -> Vec<f64> {
    (0..n_times)
        .map(|n| {
            onsets
                .iter()
                .filter(|&&o| n >= o)
                .map(|&o| -100.0 * (-((n - o) as f64) / TAU_INTRA).exp())
                .sum()
        })
        .collect()
}

#[allow(unused)]
/// Two-channel intracranial recording (`LFP L`, `LFP R`) with the same
/// artifact trace on both sides.
pub fn intracranial(n_times: usize, onsets: &[usize]) -> Signal {
    let trace = lfp_trace(n_times, onsets);
    let mut data = Array2::<f64>::zeros((2, n_times));
    for (t, &v) in trace.iter().enumerate() {
        data[[0, t]] = v;
        data[[1, t]] = v;
    }
    Signal::new(data, SF_INTRA, vec!["LFP L".into(), "LFP R".into()]).unwrap()
}

#[allow(unused)]
/// 20 s external recording, stimulation on at 2.5 s (sample 625), with a
/// task annotation at 3.0 s.
pub fn end_to_end_external() -> Signal {
    external(5_000, &[(625, None)])
        .with_annotations(vec![Annotation::new(3.0, "task")])
        .unwrap()
}

#[allow(unused)]
/// 20 s intracranial recording, stimulation on at 3.5 s (sample 14000).
pub fn end_to_end_intracranial() -> Signal {
    intracranial(80_000, &[14_000])
}

#[allow(unused)]
/// Session with a second stimulation onset 60 s after the first.
///
/// External: on at 2.5 s, off at 30 s, on again at 62.5 s (80 s total).
/// Intracranial: onsets at 3.5 s and 63.5 s plus `skew` samples (66 s
/// total). `skew = 24` is a +100 ppm clock error.
pub fn drift_pair(skew: isize) -> (Signal, Signal) {
    let ext = external(20_000, &[(625, Some(7_500)), (15_625, None)]);
    let second = (254_000 + skew) as usize;
    let intra = intracranial(264_000, &[14_000, second]);
    (ext, intra)
}
