//! Batch runner over a CSV session manifest.
//!
//! ```csv
//! session_id,intracranial_file,external_file,sync_side,bipolar_channel,synced
//! S001,S001_lfp.safetensors,S001_lsl.safetensors,left,BIP 01,
//! S002,S002_lfp.safetensors,S002_lsl.safetensors,right,BIP 02,yes
//! ```
//!
//! Sessions run one after the other with the same reviewer. A session that
//! fails is recorded and the batch moves on.
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::ResyncConfig;
use crate::error::{ResyncError, Result};
use crate::review::Reviewer;
use crate::session::{run_session, SessionOutcome, SessionSpec};

/// One manifest row as written by hand; any field may be blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestRow {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub intracranial_file: Option<String>,
    #[serde(default)]
    pub external_file: Option<String>,
    #[serde(default)]
    pub sync_side: Option<String>,
    #[serde(default)]
    pub bipolar_channel: Option<String>,
    #[serde(default)]
    pub synced: Option<String>,
}

/// What to do with a row before any file is opened.
#[derive(Debug, Clone, PartialEq)]
pub enum RowDecision {
    Run(SessionSpec),
    Skip(String),
}

impl ManifestRow {
    /// Apply the skip policy: already synced, control session (`C…`), or
    /// incomplete metadata.
    pub fn decide(&self) -> RowDecision {
        if self.synced.as_deref().map(str::trim).is_some_and(|s| s.eq_ignore_ascii_case("yes")) {
            return RowDecision::Skip("already synced".into());
        }
        match self.to_session() {
            Ok(session) if session.session_id.starts_with('C') => {
                RowDecision::Skip("control session".into())
            }
            Ok(session) => RowDecision::Run(session),
            Err(e) => RowDecision::Skip(e.to_string()),
        }
    }

    fn to_session(&self) -> Result<SessionSpec> {
        let field = |v: &Option<String>, name: &str| -> Result<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .ok_or_else(|| ResyncError::InputInconsistency(format!("missing {name}")))
        };
        let session = SessionSpec {
            session_id: field(&self.session_id, "session_id")?,
            intracranial_file: PathBuf::from(field(&self.intracranial_file, "intracranial_file")?),
            external_file: PathBuf::from(field(&self.external_file, "external_file")?),
            side: field(&self.sync_side, "sync_side")?.parse()?,
            bipolar_channel: field(&self.bipolar_channel, "bipolar_channel")?,
        };
        Ok(session)
    }
}

/// Read every row of a manifest.
pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<ManifestRow>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(File::open(path)?);
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| {
                ResyncError::InputInconsistency(format!("{} row {}: {e}", path.display(), i + 1))
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSession {
    /// Session id, or `row <n>` when the row has none.
    pub session: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub synced: Vec<SessionOutcome>,
    pub skipped: Vec<SkippedSession>,
    pub failed: Vec<SkippedSession>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.synced.len() + self.skipped.len() + self.failed.len()
    }
}

/// Run every eligible manifest row.
///
/// Only an unreadable manifest is an error; per-session problems end up in
/// the report. Input errors discovered while loading a session count as
/// skips, everything else as failures.
pub fn run_batch(
    manifest: &Path,
    source_dir: &Path,
    output_root: &Path,
    cfg: &ResyncConfig,
    reviewer: &mut dyn Reviewer,
) -> Result<BatchReport> {
    let rows = read_manifest(manifest)?;
    info!(rows = rows.len(), manifest = %manifest.display(), "batch started");

    let mut report = BatchReport::default();
    for (i, row) in rows.iter().enumerate() {
        let label = row
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("row {}", i + 1));

        let session = match row.decide() {
            RowDecision::Run(session) => session,
            RowDecision::Skip(reason) => {
                info!(session = %label, %reason, "skipping session");
                report.skipped.push(SkippedSession { session: label, reason });
                continue;
            }
        };

        match run_session(&session, source_dir, output_root, cfg, reviewer) {
            Ok(outcome) => report.synced.push(outcome),
            Err(e @ ResyncError::InputInconsistency(_)) => {
                warn!(session = %label, "skipping session: {e}");
                report.skipped.push(SkippedSession { session: label, reason: e.to_string() });
            }
            Err(e) => {
                error!(session = %label, "session failed: {e}");
                report.failed.push(SkippedSession { session: label, reason: e.to_string() });
            }
        }
    }

    info!(
        synced = report.synced.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "batch finished"
    );
    Ok(report)
}
