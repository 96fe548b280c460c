//! # resync — DBS artifact synchronization of intracranial and external recordings
//!
//! `resync` aligns two independently clocked recordings of the same session
//! (an intracranial LFP recording from the implanted pulse generator and an
//! external EEG/EMG recording) on the electrical transient that appears in
//! both when deep-brain stimulation switches on.
//!
//! ## Pipeline overview
//!
//! ```text
//! external.safetensors        intracranial.safetensors
//!   │                           │
//!   ├─ Signal::bipolar()        ├─ Signal::channel(side → 0 / 1)
//!   ├─ confirm_external()       ├─ confirm_intracranial()
//!   │    diff-envelope rule     │    threshold → kernel 2 → kernel 1 → manual
//!   │    + skip retry           │    + skip retry per method
//!   └──────────┬────────────────┘
//!              │  reviewer confirms each candidate
//!              ▼
//!   synchronize()        crop both to artifact − 1 s, carry external events
//!              │         into the intracranial time base
//!              ├─ write SYNCHRONIZED_EXTERNAL_* / SYNCHRONIZED_INTRACRANIAL_*
//!              └─ estimate_drift()   second artifact → drift (ppm)
//!                   │
//!                   └─→ <session_id>_sync_parameters.json
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use resync::{run_session, ResyncConfig, SessionSpec, SyncSide, TerminalReviewer};
//! use std::path::Path;
//!
//! let session = SessionSpec {
//!     session_id: "S001".into(),
//!     external_file: "S001_lsl.safetensors".into(),
//!     intracranial_file: "S001_lfp.safetensors".into(),
//!     side: SyncSide::Left,
//!     bipolar_channel: "BIP 01".into(),
//! };
//! let mut reviewer = TerminalReviewer::stdio();
//! let outcome = run_session(
//!     &session,
//!     Path::new("sourcedata"),
//!     Path::new("results"),
//!     &ResyncConfig::default(),
//!     &mut reviewer,
//! )
//! .unwrap();
//! println!("drift: {:?}", outcome.drift);
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use resync::{detect_intracranial, synchronize, IntracranialDetectorConfig, Method};
//! use resync::io::read_signal;
//!
//! let ext = read_signal("ext.safetensors").unwrap();
//! let lfp = read_signal("lfp.safetensors").unwrap();
//!
//! let ch = lfp.channel(0).unwrap();
//! let cfg = IntracranialDetectorConfig::default();
//! let hit = detect_intracranial(&ch, lfp.sfreq(), Method::SteepDecreaseSlowRecovery, 0, &cfg)
//!     .unwrap()
//!     .expect("artifact");
//!
//! let synced = synchronize(&ext, 2.5, &lfp, hit.time).unwrap();
//! assert_eq!(synced.intracranial.sfreq(), lfp.sfreq());
//! ```

pub mod batch;
pub mod config;
pub mod confirm;
pub mod detect;
pub mod drift;
pub mod error;
pub mod filter;
pub mod io;
pub mod params;
pub mod review;
pub mod session;
pub mod signal;
pub mod sync;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// batch
pub use batch::{read_manifest, run_batch, BatchReport, ManifestRow, RowDecision, SkippedSession};

// config
pub use config::{
    DriftConfig, ExternalDetectorConfig, IntracranialDetectorConfig, MethodOrder, ResyncConfig,
};

// confirm
pub use confirm::{confirm_external, confirm_intracranial};

// detect
pub use detect::{
    detect_external, detect_intracranial, ArtifactMark, Detection, Kernel, Method, Polarity,
    RecordingKind,
};

// drift
pub use drift::{estimate_drift, DriftChannels, DriftEstimate};

// error
pub use error::{Result, ResyncError};

// filter
pub use filter::{design_highpass, filter_1d, highpass_zero_phase};

// params
pub use params::ParamStore;

// review
pub use review::{
    Answer, ManualRequest, ReviewRequest, Reviewer, ScriptedReviewer, TerminalReviewer,
};

// session
pub use session::{
    run_session, synchronize_session, SessionOutcome, SessionSpec, SessionSync, SyncSide,
};

// signal
pub use signal::{Annotation, BipolarChannel, Event, Signal};

// sync
pub use sync::{synchronize, SyncOffset, SyncResult, PRE_ARTIFACT_SECONDS};
