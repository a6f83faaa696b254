mod app;

use anyhow::Context;
use app::App;
use clap::Parser;
use elink_core::EyeSelection;
use elink_session::SessionConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Eye-tracker calibration and recording session", long_about = None)]
struct Args {
    /// JSON session config; missing file means defaults
    #[arg(long, default_value = "elink.json")]
    config: PathBuf,

    /// Tracker host address
    #[arg(long)]
    host: Option<String>,

    /// Tracked eye: both, left or right
    #[arg(long)]
    eye: Option<EyeSelection>,

    /// Prefix for every EDF name (experiment or participant id)
    #[arg(long)]
    prefix: Option<String>,

    /// Data file name, combined with the prefix
    #[arg(long, default_value = "demo")]
    file: String,

    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// TTF/OTF for status text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Seed for the simulated host's gaze noise
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = SessionConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(eye) = self.eye {
            config.eye = eye;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = dir.clone();
        }
        if self.font.is_some() {
            config.font = self.font.clone();
        }
        config.validate().context("invalid session config")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elink=info,elink_session=info,elink_link=info".into()),
        )
        .init();

    let config = args.session_config()?;
    info!(
        host = %config.host,
        eye = %config.eye,
        prefix = %config.prefix,
        platform = std::env::consts::OS,
        "elink v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    App::new(config, args.file, args.seed)?.run()
}
