//! Detection-with-confirmation loops.
//!
//! Each recording gets one explicit state machine; the reviewer's answers
//! drive the transitions.
//!
//! ```text
//! external:      Detect ─▶ Review ─yes─▶ Done
//!                  ▲          │no
//!                  └─skip─────┤ (once)
//!                             └─retry rejected / no skip─▶ Manual ─▶ Done
//!
//! intracranial:  Detect(m) ─hit─▶ Review ─yes─▶ Done
//!                  │miss           │no
//!                  ▼               ▼
//!               Detect(m+1) ◀─ OfferSkip ─skip─▶ Detect(m, retry) (once)
//!                  ⋮
//!               Manual ─▶ Done
//! ```
//!
//! A rejection costs at most one retry per method, so both loops terminate.
use tracing::{debug, info, warn};

use crate::config::{ExternalDetectorConfig, IntracranialDetectorConfig, MethodOrder};
use crate::detect::{
    detect_external, detect_intracranial, ArtifactMark, Detection, Method, RecordingKind,
};
use crate::error::{ResyncError, Result};
use crate::review::{ManualRequest, ReviewRequest, Reviewer};

#[derive(Debug)]
enum ExternalSearch {
    Detect { start_index: usize, retry: bool },
    Review { detection: Detection, start_index: usize, retry: bool },
    Manual { start_index: usize },
    Done(ArtifactMark),
}

#[derive(Debug)]
enum IntracranialSearch {
    Detect { method_idx: usize, start_index: usize, retry: bool },
    Review { method_idx: usize, detection: Detection, retry: bool },
    OfferSkip { method_idx: usize, detection: Detection },
    Manual { start_index: usize },
    Done(ArtifactMark),
}

/// Find and confirm the stimulation onset on the external bipolar channel.
///
/// The returned mark is always confirmed: a rejected skip-retry falls back
/// to manual selection after the skipped segment.
pub fn confirm_external(
    channel: &[f64],
    sfreq: f64,
    cfg: &ExternalDetectorConfig,
    reviewer: &mut dyn Reviewer,
) -> Result<ArtifactMark> {
    check_channel(channel, RecordingKind::External)?;
    let mut state = ExternalSearch::Detect { start_index: 0, retry: false };
    loop {
        state = match state {
            ExternalSearch::Detect { start_index, retry } => {
                if start_index >= channel.len() {
                    warn!(
                        start_index,
                        len = channel.len(),
                        "external skip beyond end of recording"
                    );
                    reviewer.notify("skip lies beyond the end of the external recording");
                    ExternalSearch::Manual { start_index: 0 }
                } else {
                    let detection = detect_external(channel, sfreq, start_index, cfg)?;
                    if !detection.above_threshold {
                        reviewer.notify(
                            "no onset exceeded the threshold; showing the largest excursion",
                        );
                    }
                    ExternalSearch::Review { detection, start_index, retry }
                }
            }
            ExternalSearch::Review { detection, start_index, retry } => {
                let request = ReviewRequest {
                    recording: RecordingKind::External,
                    method: detection.method,
                    detection: &detection,
                    channel,
                    sfreq,
                    is_retry: retry,
                };
                if reviewer.confirm(&request)? {
                    let mark = ArtifactMark::candidate(RecordingKind::External, &detection);
                    ExternalSearch::Done(mark.confirm())
                } else if retry {
                    warn!(
                        sample = detection.sample_index,
                        start_index,
                        "external retry rejected, falling back to manual"
                    );
                    ExternalSearch::Manual { start_index }
                } else {
                    warn!(sample = detection.sample_index, "external candidate rejected");
                    match reviewer.skip_beginning(&request)? {
                        Some(seconds) => ExternalSearch::Detect {
                            start_index: skip_index(seconds, sfreq),
                            retry: true,
                        },
                        None => ExternalSearch::Manual { start_index },
                    }
                }
            }
            ExternalSearch::Manual { start_index } => ExternalSearch::Done(manual_mark(
                RecordingKind::External,
                channel,
                sfreq,
                start_index,
                reviewer,
            )?),
            ExternalSearch::Done(mark) => {
                info!(
                    sample = mark.sample_index(),
                    time = mark.time(sfreq),
                    method = %mark.method(),
                    "external artifact confirmed"
                );
                return Ok(mark);
            }
        };
    }
}

/// Try the intracranial strategies in `order` until the reviewer confirms
/// one.
///
/// A miss advances to the next method at once. A rejection offers one
/// retry with a skipped beginning; rejecting (or missing on) that retry
/// advances too. `Manual` ends the search.
pub fn confirm_intracranial(
    channel: &[f64],
    sfreq: f64,
    cfg: &IntracranialDetectorConfig,
    order: &MethodOrder,
    reviewer: &mut dyn Reviewer,
) -> Result<ArtifactMark> {
    check_channel(channel, RecordingKind::Intracranial)?;
    let methods = order.methods();
    let mut state = IntracranialSearch::Detect { method_idx: 0, start_index: 0, retry: false };
    loop {
        state = match state {
            IntracranialSearch::Detect { method_idx, start_index, retry } => {
                let Some(&method) = methods.get(method_idx) else {
                    return Err(ResyncError::AlignmentAmbiguity(format!(
                        "all {} intracranial methods rejected",
                        methods.len()
                    )));
                };
                if method == Method::Manual {
                    IntracranialSearch::Manual { start_index: 0 }
                } else {
                    info!(%method, start_index, "running intracranial detection");
                    reviewer.notify(&format!("Running resync with method = {method}..."));
                    match detect_intracranial(channel, sfreq, method, start_index, cfg) {
                        Ok(Some(detection)) => {
                            IntracranialSearch::Review { method_idx, detection, retry }
                        }
                        Ok(None) => {
                            let miss = ResyncError::DetectionMiss {
                                recording: RecordingKind::Intracranial,
                                method,
                                start_index,
                            };
                            warn!("{miss}");
                            reviewer.notify(&miss.to_string());
                            next_method(method_idx)
                        }
                        // skip beyond the channel: nothing left for this method
                        Err(ResyncError::InputInconsistency(msg)) if retry => {
                            warn!(%method, "{msg}");
                            next_method(method_idx)
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            IntracranialSearch::Review { method_idx, detection, retry } => {
                let request = ReviewRequest {
                    recording: RecordingKind::Intracranial,
                    method: detection.method,
                    detection: &detection,
                    channel,
                    sfreq,
                    is_retry: retry,
                };
                if reviewer.confirm(&request)? {
                    let mark = ArtifactMark::candidate(RecordingKind::Intracranial, &detection);
                    IntracranialSearch::Done(mark.confirm())
                } else if retry {
                    warn!(method = %detection.method, "intracranial retry rejected");
                    next_method(method_idx)
                } else {
                    warn!(
                        method = %detection.method,
                        sample = detection.sample_index,
                        "intracranial candidate rejected"
                    );
                    IntracranialSearch::OfferSkip { method_idx, detection }
                }
            }
            IntracranialSearch::OfferSkip { method_idx, detection } => {
                let request = ReviewRequest {
                    recording: RecordingKind::Intracranial,
                    method: detection.method,
                    detection: &detection,
                    channel,
                    sfreq,
                    is_retry: false,
                };
                match reviewer.skip_beginning(&request)? {
                    Some(seconds) => IntracranialSearch::Detect {
                        method_idx,
                        start_index: skip_index(seconds, sfreq),
                        retry: true,
                    },
                    None => next_method(method_idx),
                }
            }
            IntracranialSearch::Manual { start_index } => IntracranialSearch::Done(manual_mark(
                RecordingKind::Intracranial,
                channel,
                sfreq,
                start_index,
                reviewer,
            )?),
            IntracranialSearch::Done(mark) => {
                info!(
                    sample = mark.sample_index(),
                    time = mark.time(sfreq),
                    method = %mark.method(),
                    "intracranial artifact confirmed"
                );
                return Ok(mark);
            }
        };
    }
}

fn next_method(method_idx: usize) -> IntracranialSearch {
    IntracranialSearch::Detect { method_idx: method_idx + 1, start_index: 0, retry: false }
}

fn skip_index(seconds: f64, sfreq: f64) -> usize {
    (seconds.max(0.0) * sfreq).round() as usize
}

fn manual_mark(
    recording: RecordingKind,
    channel: &[f64],
    sfreq: f64,
    start_index: usize,
    reviewer: &mut dyn Reviewer,
) -> Result<ArtifactMark> {
    let start_index = start_index.min(channel.len() - 1);
    reviewer.notify(&format!("Select the {recording} artifact onset manually"));
    let picked = reviewer.select_onset(&ManualRequest { recording, channel, sfreq, start_index })?;
    let idx = picked.clamp(start_index, channel.len() - 1);
    if idx != picked {
        debug!(picked, idx, "manual onset clamped to channel");
    }
    Ok(ArtifactMark::manual(recording, idx).confirm())
}

fn check_channel(channel: &[f64], recording: RecordingKind) -> Result<()> {
    if channel.is_empty() {
        return Err(ResyncError::InputInconsistency(format!(
            "{recording} artifact channel is empty"
        )));
    }
    Ok(())
}
