//! One synchronization session, end to end.
//!
//! ```text
//! SessionSpec ─validate─▶ load both recordings
//!   ├─ confirm_external       (bipolar channel)
//!   ├─ confirm_intracranial   (side → channel 0 / 1)
//!   ├─ synchronize            crop + event transfer
//!   ├─ write SYNCHRONIZED_* recordings
//!   └─ estimate_drift         (optional, informational)
//! ```
//!
//! Every intermediate result is upserted into the session's [`ParamStore`]
//! as soon as it is known.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ResyncConfig;
use crate::confirm::{confirm_external, confirm_intracranial};
use crate::detect::{ArtifactMark, RecordingKind};
use crate::drift::{estimate_drift, DriftChannels, DriftEstimate};
use crate::error::{ResyncError, Result};
use crate::io::{read_signal, synchronized_file_name, write_signal};
use crate::params::{self, ParamStore};
use crate::review::Reviewer;
use crate::signal::Signal;
use crate::sync::{synchronize, SyncResult};

/// Hemisphere whose intracranial channel carries the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSide {
    Left,
    Right,
}

impl SyncSide {
    /// Row of the intracranial recording: left → 0, right → 1.
    pub fn channel_index(self) -> usize {
        match self {
            SyncSide::Left => 0,
            SyncSide::Right => 1,
        }
    }
}

impl fmt::Display for SyncSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncSide::Left => "left",
            SyncSide::Right => "right",
        })
    }
}

impl FromStr for SyncSide {
    type Err = ResyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(SyncSide::Left),
            "right" => Ok(SyncSide::Right),
            other => Err(ResyncError::InputInconsistency(format!("unknown sync side '{other}'"))),
        }
    }
}

/// Metadata of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSpec {
    pub session_id: String,
    pub external_file: PathBuf,
    pub intracranial_file: PathBuf,
    pub side: SyncSide,
    /// Bipolar channel selector in the external recording.
    pub bipolar_channel: String,
}

impl SessionSpec {
    pub fn validate(&self) -> Result<()> {
        let empty = |what: &str| Err(ResyncError::InputInconsistency(format!("empty {what}")));
        if self.session_id.trim().is_empty() {
            return empty("session id");
        }
        if self.external_file.as_os_str().is_empty() {
            return empty("external file name");
        }
        if self.intracranial_file.as_os_str().is_empty() {
            return empty("intracranial file name");
        }
        if self.bipolar_channel.trim().is_empty() {
            return empty("bipolar channel");
        }
        Ok(())
    }
}

/// In-memory result of [`synchronize_session`].
#[derive(Debug, Clone)]
pub struct SessionSync {
    pub external_mark: ArtifactMark,
    pub intracranial_mark: ArtifactMark,
    pub sync: SyncResult,
    /// `None` when the drift pass was disabled or found no second artifact.
    pub drift: Option<DriftEstimate>,
}

/// Result of [`run_session`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub external_mark: ArtifactMark,
    pub intracranial_mark: ArtifactMark,
    pub drift: Option<DriftEstimate>,
    pub external_output: PathBuf,
    pub intracranial_output: PathBuf,
    pub params_path: PathBuf,
}

/// Detect, confirm and synchronize two loaded recordings.
///
/// `external` is re-tagged to the integer rate first when
/// `cfg.round_external_sfreq` is set. Channel selection is checked before
/// any detection runs. Drift keys of an earlier run are removed from `store`
/// when this run produces no estimate.
pub fn synchronize_session(
    session: &SessionSpec,
    external: Signal,
    intracranial: &Signal,
    cfg: &ResyncConfig,
    reviewer: &mut dyn Reviewer,
    store: &mut ParamStore,
) -> Result<SessionSync> {
    session.validate()?;

    let ch_idx_intra = session.side.channel_index();
    if ch_idx_intra >= intracranial.n_chan() {
        return Err(ResyncError::InputInconsistency(format!(
            "sync side {} needs channel {ch_idx_intra}, intracranial recording has {}",
            session.side,
            intracranial.n_chan()
        )));
    }
    let intra_channel = intracranial.channel(ch_idx_intra)?;

    let sf_external_raw = external.sfreq();
    let external = if cfg.round_external_sfreq && sf_external_raw.round() != sf_external_raw {
        external.with_sfreq(sf_external_raw.round())?
    } else {
        external
    };
    let bipolar = external.bipolar(&session.bipolar_channel)?;

    let external_name = session
        .external_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    store.upsert_many([
        (params::KEY_SF_INTRACRANIAL, Value::from(intracranial.sfreq())),
        (params::KEY_CH_IDX_INTRACRANIAL, Value::from(ch_idx_intra)),
        (params::KEY_FNAME_EXTERNAL, Value::from(external_name)),
        (params::KEY_SF_EXTERNAL_RAW, Value::from(sf_external_raw)),
        (params::KEY_SF_EXTERNAL, Value::from(external.sfreq())),
        (params::KEY_CH_IDX_EXTERNAL, Value::from(bipolar.indices.clone())),
    ])?;

    let external_mark =
        confirm_external(&bipolar.samples, external.sfreq(), &cfg.external, reviewer)?;
    let art_time_external = external_mark.time(external.sfreq());
    store.upsert_many([
        (params::KEY_ART_TIME_EXTERNAL, Value::from(art_time_external)),
        (params::KEY_EXTERNAL_METHOD, Value::from(external_mark.method().as_str())),
    ])?;

    let intracranial_mark = confirm_intracranial(
        &intra_channel,
        intracranial.sfreq(),
        &cfg.intracranial,
        &cfg.methods,
        reviewer,
    )?;
    let art_time_intracranial = intracranial_mark.time(intracranial.sfreq());
    store.upsert_many([
        (params::KEY_ART_TIME_INTRACRANIAL, Value::from(art_time_intracranial)),
        (params::KEY_METHOD, Value::from(intracranial_mark.method().as_str())),
    ])?;

    let sync =
        synchronize(&external, art_time_external, intracranial, art_time_intracranial)?;

    let drift = if cfg.check_drift {
        let channels = DriftChannels {
            external: &session.bipolar_channel,
            intracranial: ch_idx_intra,
            intracranial_method: intracranial_mark.method(),
        };
        match estimate_drift(&sync, channels, cfg, store) {
            Ok(estimate) => Some(estimate),
            Err(e) if e.is_recoverable() => {
                warn!(session = %session.session_id, "drift check skipped: {e}");
                reviewer.notify(&format!("drift check skipped: {e}"));
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };
    if drift.is_none() {
        // a previous run's estimate does not describe this alignment
        store.remove_many(params::DRIFT_KEYS)?;
    }

    Ok(SessionSync { external_mark, intracranial_mark, sync, drift })
}

/// Load, synchronize and write one session into `output_root/<session_id>/`.
///
/// Relative file names in `session` are resolved against `source_dir`.
pub fn run_session(
    session: &SessionSpec,
    source_dir: &Path,
    output_root: &Path,
    cfg: &ResyncConfig,
    reviewer: &mut dyn Reviewer,
) -> Result<SessionOutcome> {
    session.validate()?;
    info!(
        session = %session.session_id,
        side = %session.side,
        bipolar = %session.bipolar_channel,
        "session started"
    );

    let session_dir = output_root.join(&session.session_id);
    let external = read_signal(source_dir.join(&session.external_file))?;
    let intracranial = read_signal(source_dir.join(&session.intracranial_file))?;
    let mut store = ParamStore::open(&session_dir, &session.session_id)?;

    let result =
        synchronize_session(session, external, &intracranial, cfg, reviewer, &mut store)?;

    let external_output = session_dir
        .join(synchronized_file_name(RecordingKind::External, &session.external_file));
    let intracranial_output = session_dir
        .join(synchronized_file_name(RecordingKind::Intracranial, &session.intracranial_file));
    write_signal(&external_output, &result.sync.external)?;
    write_signal(&intracranial_output, &result.sync.intracranial)?;
    info!(
        session = %session.session_id,
        external = %external_output.display(),
        intracranial = %intracranial_output.display(),
        "synchronized recordings written"
    );

    Ok(SessionOutcome {
        session_id: session.session_id.clone(),
        external_mark: result.external_mark,
        intracranial_mark: result.intracranial_mark,
        drift: result.drift,
        external_output,
        intracranial_output,
        params_path: store.path().to_path_buf(),
    })
}
