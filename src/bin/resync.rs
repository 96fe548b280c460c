use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use resync::{run_batch, run_session, ResyncConfig, SessionSpec, SyncSide, TerminalReviewer};

#[derive(Parser)]
#[command(
    name = "resync",
    about = "Synchronize intracranial and external recordings on the DBS artifact"
)]
struct Args {
    /// TOML configuration (defaults are used for missing keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip the drift check after synchronization
    #[arg(long, global = true)]
    no_drift: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize every pending session of a CSV manifest
    Batch {
        /// Manifest with session_id, intracranial_file, external_file,
        /// sync_side, bipolar_channel, synced
        #[arg(long)]
        manifest: PathBuf,

        /// Directory the manifest's file names are relative to
        #[arg(long, default_value = ".")]
        source: PathBuf,

        /// Results root; one sub-directory per session
        #[arg(long)]
        output: PathBuf,
    },
    /// Synchronize a single session
    Session {
        #[arg(long)]
        id: String,

        /// External recording (.safetensors)
        #[arg(long)]
        external: PathBuf,

        /// Intracranial recording (.safetensors)
        #[arg(long)]
        intracranial: PathBuf,

        /// Hemisphere carrying the artifact: left or right
        #[arg(long)]
        side: String,

        /// Bipolar channel of the external recording, e.g. "BIP 01"
        #[arg(long)]
        bipolar: String,

        /// Results root; the session writes into <output>/<id>/
        #[arg(long)]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>, no_drift: bool) -> Result<ResyncConfig> {
    let mut cfg = match path {
        Some(p) => ResyncConfig::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => ResyncConfig::default(),
    };
    if no_drift {
        cfg.check_drift = false;
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = load_config(args.config.as_deref(), args.no_drift)?;
    let mut reviewer = TerminalReviewer::stdio();

    match args.command {
        Command::Batch { manifest, source, output } => {
            let report = run_batch(&manifest, &source, &output, &cfg, &mut reviewer)
                .with_context(|| format!("running batch {}", manifest.display()))?;
            for s in &report.synced {
                println!("synced   {}  → {}", s.session_id, s.params_path.display());
            }
            for s in &report.skipped {
                println!("skipped  {}  ({})", s.session, s.reason);
            }
            for s in &report.failed {
                println!("FAILED   {}  ({})", s.session, s.reason);
            }
            info!(total = report.total(), "done");
            if !report.failed.is_empty() {
                bail!("{} of {} sessions failed", report.failed.len(), report.total());
            }
        }
        Command::Session { id, external, intracranial, side, bipolar, output } => {
            let side: SyncSide = side.parse()?;
            let session = SessionSpec {
                session_id: id,
                external_file: external,
                intracranial_file: intracranial,
                side,
                bipolar_channel: bipolar,
            };
            let outcome = run_session(&session, Path::new("."), &output, &cfg, &mut reviewer)
                .with_context(|| format!("session {}", session.session_id))?;
            println!("Written → {}", outcome.external_output.display());
            println!("Written → {}", outcome.intracranial_output.display());
            match outcome.drift {
                Some(d) => println!(
                    "drift {:.1} ms over {:.1} s ({:.1} ppm)",
                    d.drift_seconds * 1e3,
                    d.measured_over_seconds,
                    d.drift_rate_ppm
                ),
                None => println!("drift not estimated"),
            }
        }
    }

    Ok(())
}
