mod common;

use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use resync::io::{read_signal, write_signal};
use resync::params::{self, ParamStore};
use resync::review::Answer;
use resync::{
    run_batch, run_session, synchronize_session, Method, ResyncConfig, ResyncError,
    ScriptedReviewer, SessionSpec, SyncSide, TerminalReviewer,
};
use tempfile::tempdir;

fn session(id: &str) -> SessionSpec {
    SessionSpec {
        session_id: id.into(),
        external_file: PathBuf::from(format!("{id}_lsl.safetensors")),
        intracranial_file: PathBuf::from(format!("{id}_lfp.safetensors")),
        side: SyncSide::Left,
        bipolar_channel: "BIP 01".into(),
    }
}

fn write_inputs(dir: &Path, id: &str) {
    let ext = common::end_to_end_external();
    let lfp = common::end_to_end_intracranial();
    write_signal(dir.join(format!("{id}_lsl.safetensors")), &ext).unwrap();
    write_signal(dir.join(format!("{id}_lfp.safetensors")), &lfp).unwrap();
}

fn no_drift() -> ResyncConfig {
    ResyncConfig { check_drift: false, ..ResyncConfig::default() }
}

/// Accept external, reject threshold without skipping, accept kernel 2.
fn kernel2_reviewer() -> ScriptedReviewer {
    ScriptedReviewer::new([
        Answer::Confirm(true),
        Answer::Confirm(false),
        Answer::Skip(None),
        Answer::Confirm(true),
    ])
}

#[test]
fn session_writes_recordings_and_parameters() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_inputs(src.path(), "S001");

    let mut reviewer = kernel2_reviewer();
    let outcome =
        run_session(&session("S001"), src.path(), out.path(), &no_drift(), &mut reviewer).unwrap();

    assert_eq!(outcome.external_mark.sample_index(), 625);
    assert_eq!(outcome.intracranial_mark.method(), Method::SteepDecreaseSlowRecovery);
    assert_eq!(outcome.intracranial_mark.sample_index(), 14_000);
    assert!(outcome.drift.is_none());
    assert_eq!(
        outcome.external_output,
        out.path().join("S001").join("SYNCHRONIZED_EXTERNAL_S001_lsl.safetensors")
    );

    let lfp = read_signal(&outcome.intracranial_output).unwrap();
    assert_eq!(lfp.n_times(), 80_000 - 10_000);
    let events = lfp.events_from_annotations();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sample, 6_000);

    let ext = read_signal(&outcome.external_output).unwrap();
    assert_eq!(ext.n_times(), 5_000 - 375);
    assert_abs_diff_eq!(ext.annotations()[0].onset, 1.5, epsilon = 1e-12);

    let store = ParamStore::open(out.path().join("S001"), "S001").unwrap();
    assert_eq!(store.get_f64(params::KEY_SF_INTRACRANIAL), Some(4000.0));
    assert_eq!(store.get_f64(params::KEY_SF_EXTERNAL), Some(250.0));
    assert_eq!(store.get_f64(params::KEY_ART_TIME_EXTERNAL), Some(2.5));
    assert_eq!(store.get_f64(params::KEY_ART_TIME_INTRACRANIAL), Some(3.5));
    assert_eq!(store.get_str(params::KEY_METHOD), Some("kernel2"));
    assert_eq!(store.get_str(params::KEY_EXTERNAL_METHOD), Some("threshold"));
    assert_eq!(store.get_str(params::KEY_FNAME_EXTERNAL), Some("S001_lsl.safetensors"));
    assert!(store.get(params::KEY_DRIFT_RATE_PPM).is_none());
}

#[test]
fn fractional_external_rate_is_rounded() {
    let dir = tempdir().unwrap();
    let mut store = ParamStore::open(dir.path(), "S002").unwrap();
    let ext = common::end_to_end_external().with_sfreq(249.998).unwrap();
    let intra = common::end_to_end_intracranial();
    let mut reviewer = kernel2_reviewer();
    let res =
        synchronize_session(&session("S002"), ext, &intra, &no_drift(), &mut reviewer, &mut store)
            .unwrap();
    assert_eq!(res.sync.external.sfreq(), 250.0);
    assert_eq!(store.get_f64(params::KEY_SF_EXTERNAL_RAW), Some(249.998));
    assert_eq!(store.get_f64(params::KEY_SF_EXTERNAL), Some(250.0));
    // annotation kept on its sample through the re-tag
    assert_eq!(res.sync.intracranial.events_from_annotations()[0].sample, 6_000);
}

#[test]
fn drift_is_recorded_when_enabled() {
    let dir = tempdir().unwrap();
    let mut store = ParamStore::open(dir.path(), "S003").unwrap();
    let (ext, intra) = common::drift_pair(24);
    let mut reviewer = kernel2_reviewer();
    let cfg = ResyncConfig::default();
    let res =
        synchronize_session(&session("S003"), ext, &intra, &cfg, &mut reviewer, &mut store)
            .unwrap();
    let drift = res.drift.unwrap();
    assert_abs_diff_eq!(drift.drift_rate_ppm, 100.0, epsilon = 1e-6);
    assert_abs_diff_eq!(store.get_f64(params::KEY_DRIFT_RATE_PPM).unwrap(), 100.0, epsilon = 1e-6);
}

#[test]
fn drift_miss_does_not_fail_the_session() {
    let dir = tempdir().unwrap();
    let mut store = ParamStore::open(dir.path(), "S004").unwrap();
    let ext = common::end_to_end_external();
    let intra = common::end_to_end_intracranial();
    let mut reviewer = kernel2_reviewer();
    let cfg = ResyncConfig::default();
    let res =
        synchronize_session(&session("S004"), ext, &intra, &cfg, &mut reviewer, &mut store)
            .unwrap();
    assert!(res.drift.is_none());
    assert!(reviewer.log.iter().any(|l| l.contains("drift check skipped")));
}

#[test]
fn rerun_without_drift_clears_the_old_estimate() {
    let dir = tempdir().unwrap();
    let cfg = ResyncConfig::default();

    let mut store = ParamStore::open(dir.path(), "S006").unwrap();
    let (ext, intra) = common::drift_pair(24);
    let mut reviewer = kernel2_reviewer();
    synchronize_session(&session("S006"), ext, &intra, &cfg, &mut reviewer, &mut store).unwrap();
    assert!(store.get_f64(params::KEY_DRIFT_RATE_PPM).is_some());

    // same session again, now on recordings without a second artifact
    let mut store = ParamStore::open(dir.path(), "S006").unwrap();
    let ext = common::end_to_end_external();
    let intra = common::end_to_end_intracranial();
    let mut reviewer = kernel2_reviewer();
    let res =
        synchronize_session(&session("S006"), ext, &intra, &cfg, &mut reviewer, &mut store)
            .unwrap();
    assert!(res.drift.is_none());

    let reopened = ParamStore::open(dir.path(), "S006").unwrap();
    for key in params::DRIFT_KEYS {
        assert!(reopened.get(key).is_none(), "{key} left from the first run");
    }
    assert_eq!(reopened.get_f64(params::KEY_ART_TIME_INTRACRANIAL), Some(3.5));
}

#[test]
fn closed_review_input_writes_nothing() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_inputs(src.path(), "S007");

    let mut reviewer = TerminalReviewer::new(b"".as_slice(), Vec::new());
    let err = run_session(&session("S007"), src.path(), out.path(), &no_drift(), &mut reviewer)
        .unwrap_err();
    assert!(matches!(err, ResyncError::AlignmentAmbiguity(_)));

    let session_dir = out.path().join("S007");
    assert!(!session_dir.join("SYNCHRONIZED_EXTERNAL_S007_lsl.safetensors").exists());
    assert!(!session_dir.join("SYNCHRONIZED_INTRACRANIAL_S007_lfp.safetensors").exists());
    let store = ParamStore::open(&session_dir, "S007").unwrap();
    assert!(store.get(params::KEY_ART_TIME_EXTERNAL).is_none());
}

#[test]
fn unknown_bipolar_channel_stops_before_detection() {
    let dir = tempdir().unwrap();
    let mut store = ParamStore::open(dir.path(), "S005").unwrap();
    let mut s = session("S005");
    s.bipolar_channel = "BIP 09".into();
    let mut reviewer = ScriptedReviewer::accept_all();
    let err = synchronize_session(
        &s,
        common::end_to_end_external(),
        &common::end_to_end_intracranial(),
        &no_drift(),
        &mut reviewer,
        &mut store,
    )
    .unwrap_err();
    assert!(matches!(err, ResyncError::InputInconsistency(_)));
    assert!(reviewer.log.is_empty());
}

#[test]
fn batch_skips_and_continues() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_inputs(src.path(), "S010");
    write_inputs(src.path(), "S012");
    let manifest = src.path().join("sessions.csv");
    std::fs::write(
        &manifest,
        "session_id,intracranial_file,external_file,sync_side,bipolar_channel,synced\n\
         S010,S010_lfp.safetensors,S010_lsl.safetensors,left,BIP 01,\n\
         S011,S011_lfp.safetensors,S011_lsl.safetensors,left,BIP 01,yes\n\
         C001,C001_lfp.safetensors,C001_lsl.safetensors,left,BIP 01,\n\
         S012,S012_lfp.safetensors,S012_lsl.safetensors,middle,BIP 01,\n\
         S013,S013_lfp.safetensors,S013_lsl.safetensors,right,BIP 01,\n\
         ,S014_lfp.safetensors,S014_lsl.safetensors,left,BIP 01,\n",
    )
    .unwrap();

    let mut reviewer = kernel2_reviewer();
    let report =
        run_batch(&manifest, src.path(), out.path(), &no_drift(), &mut reviewer).unwrap();

    assert_eq!(report.synced.len(), 1);
    assert_eq!(report.synced[0].session_id, "S010");
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.session.as_str()).collect();
    assert_eq!(skipped, ["S011", "C001", "S012", "row 6"]);
    // S013 has no files on disk
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].session, "S013");
    assert_eq!(report.total(), 6);
    assert!(out.path().join("S010").join("S010_sync_parameters.json").exists());
}
