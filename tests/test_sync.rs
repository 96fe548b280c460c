mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use resync::{
    detect_external, detect_intracranial, synchronize, Annotation, ExternalDetectorConfig,
    IntracranialDetectorConfig, Method, Signal,
};

fn flat(n_times: usize, sfreq: f64) -> Signal {
    Signal::new(Array2::zeros((1, n_times)), sfreq, vec!["ch".into()]).unwrap()
}

#[test]
fn external_event_lands_on_exact_intracranial_sample() {
    // event at sample 500 (2.0 s), external crop starts at 1.0 s
    let ext = flat(2_500, 250.0).with_annotations(vec![Annotation::new(2.0, "cue")]).unwrap();
    let intra = flat(40_000, 4000.0);
    let res = synchronize(&ext, 2.0, &intra, 1.0).unwrap();
    assert_abs_diff_eq!(res.offset.external_offset_seconds, 1.0, epsilon = 1e-12);
    assert_eq!(res.offset.intracranial_offset_seconds, 0.0);
    let events = res.intracranial.events_from_annotations();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sample, 4_000);
    assert_eq!(events[0].description, "cue");
}

#[test]
fn artifact_in_first_second_crops_from_zero() {
    let ext = flat(2_500, 250.0);
    let intra = flat(40_000, 4000.0);
    let res = synchronize(&ext, 0.4, &intra, 0.4).unwrap();
    assert_eq!(res.offset.external_offset_seconds, 0.0);
    assert_eq!(res.offset.intracranial_offset_seconds, 0.0);
    assert_eq!(res.external.n_times(), ext.n_times());
    assert_eq!(res.intracranial.n_times(), intra.n_times());
}

#[test]
fn end_to_end_synthetic_session() {
    let ext = common::end_to_end_external();
    let intra = common::end_to_end_intracranial();

    let bip = ext.data().row(0).to_vec();
    let d_ext = detect_external(&bip, ext.sfreq(), 0, &ExternalDetectorConfig::default()).unwrap();
    assert_eq!(d_ext.sample_index, 625);
    let lfp = intra.channel(0).unwrap();
    let d_intra = detect_intracranial(
        &lfp,
        intra.sfreq(),
        Method::SteepDecreaseSlowRecovery,
        0,
        &IntracranialDetectorConfig::default(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(d_intra.sample_index, 14_000);

    let res = synchronize(&ext, d_ext.time, &intra, d_intra.time).unwrap();

    // index 0 is 1.5 s / 2.5 s in the original clocks
    assert_abs_diff_eq!(res.offset.external_offset_seconds, 1.5, epsilon = 1e-12);
    assert_abs_diff_eq!(res.offset.intracranial_offset_seconds, 2.5, epsilon = 1e-12);
    assert_eq!(res.external.data()[[0, 0]], ext.data()[[0, 375]]);
    assert_eq!(res.intracranial.data()[[0, 0]], intra.data()[[0, 10_000]]);
    assert_eq!(res.external.n_times(), 5_000 - 375);
    assert_eq!(res.intracranial.n_times(), 80_000 - 10_000);

    // artifact sits at 1 s in both
    assert_abs_diff_eq!(res.external_fiducial, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(res.intracranial_fiducial, 1.0, epsilon = 1e-12);

    // external annotation at 3.0 s → intracranial sample (3.0 − 1.5) · 4000
    let events = res.intracranial.events_from_annotations();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sample, 6_000);
    assert_eq!(events[0].description, "task");

    // external annotation re-based by its own crop
    assert_abs_diff_eq!(res.external.annotations()[0].onset, 1.5, epsilon = 1e-12);
}

#[test]
fn second_pass_at_one_second_is_idempotent() {
    let ext = common::end_to_end_external();
    let intra = common::end_to_end_intracranial();
    let first = synchronize(&ext, 2.5, &intra, 3.5).unwrap();

    let second = synchronize(
        &first.external,
        first.external_fiducial,
        &first.intracranial,
        first.intracranial_fiducial,
    )
    .unwrap();

    assert_eq!(second.offset.external_offset_seconds, 0.0);
    assert_eq!(second.offset.intracranial_offset_seconds, 0.0);
    assert_eq!(second.external.data(), first.external.data());
    assert_eq!(second.intracranial.data(), first.intracranial.data());
    assert_eq!(
        second.intracranial.events_from_annotations(),
        first.intracranial.events_from_annotations()
    );
}

#[test]
fn stale_intracranial_annotations_are_replaced() {
    let ext = common::end_to_end_external();
    let intra = common::end_to_end_intracranial()
        .with_annotations(vec![Annotation::new(5.0, "stale"), Annotation::new(6.0, "stale")])
        .unwrap();
    let res = synchronize(&ext, 2.5, &intra, 3.5).unwrap();
    assert!(res.intracranial.annotations().iter().all(|a| a.description == "task"));
    assert_eq!(res.intracranial.annotations().len(), 1);
}
