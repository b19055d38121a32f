use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use drivemirror::config::{MirrorConfig, expand_with_home, needs_home};
use drivemirror::folder_ref::parse_folder_ref;
use drivemirror::logging;
use drivemirror::sync::engine::MirrorEngine;
use drivemirror::sync::remote::DriveRemote;
use drivemirror_core::DriveClient;

const STRICT_FAILURE_EXIT: u8 = 2;

/// Mirror a Google Drive folder tree onto the local filesystem.
#[derive(Debug, Parser)]
#[command(name = "drivemirror", version)]
struct Cli {
    /// Folder id or share link.
    folder: String,
    /// Base directory; the folder lands in a subdirectory named after it.
    #[arg(long)]
    dest: Option<PathBuf>,
    /// OAuth access token.
    #[arg(long, env = "DRIVEMIRROR_TOKEN", hide_env_values = true)]
    token: String,
    /// Size difference in bytes below which a local file counts as synced.
    #[arg(long)]
    tolerance: Option<u64>,
    /// Maximum concurrent downloads.
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    chunk_bytes: Option<usize>,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
    /// Exit with status 2 when any file failed.
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn apply(&self, config: &mut MirrorConfig) {
        if let Some(dest) = &self.dest {
            let raw = dest.to_string_lossy();
            config.base_dir = match dirs::home_dir() {
                Some(home) if needs_home(&raw) => expand_with_home(&raw, &home),
                _ => dest.clone(),
            };
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance_bytes = tolerance;
        }
        if let Some(concurrency) = self.concurrency {
            config.download_concurrency = concurrency;
        }
        if let Some(chunk) = self.chunk_bytes {
            config.chunk_size = chunk;
        }
        config.log_json |= self.json_logs;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = MirrorConfig::from_env()?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;
    logging::init(config.log_json)?;

    let folder_id = parse_folder_ref(&cli.folder)?;
    let client = DriveClient::new(cli.token.trim()).context("failed to build Drive client")?;
    let remote = DriveRemote::new(client, config.list_page_size);
    let engine = MirrorEngine::new(Arc::new(remote), config.engine_options());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    info!(folder = %folder_id, base_dir = %config.base_dir.display(), "mirroring");
    let summary = match engine.mirror(&folder_id, &config.base_dir, &cancel).await {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "mirror failed");
            return Err(err).context("mirror failed");
        }
    };

    println!("{summary}");
    if cli.strict && !summary.failures.is_empty() {
        return Ok(ExitCode::from(STRICT_FAILURE_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["drivemirror", "--token", "t0k"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn base_config() -> MirrorConfig {
        MirrorConfig::from_lookup(|_| None, Some(std::path::Path::new("/home/user"))).unwrap()
    }

    #[test]
    fn parses_positional_folder() {
        let cli = parse(&["1AbC"]);
        assert_eq!(cli.folder, "1AbC");
        assert_eq!(cli.token, "t0k");
        assert!(!cli.strict);
    }

    #[test]
    fn folder_is_required() {
        assert!(Cli::try_parse_from(["drivemirror", "--token", "t"]).is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = parse(&[
            "1AbC",
            "--dest",
            "/srv/mirror",
            "--tolerance",
            "10",
            "--concurrency",
            "2",
            "--chunk-bytes",
            "4096",
            "--json-logs",
            "--strict",
        ]);
        let mut config = base_config();
        cli.apply(&mut config);

        assert_eq!(config.base_dir, PathBuf::from("/srv/mirror"));
        assert_eq!(config.tolerance_bytes, 10);
        assert_eq!(config.download_concurrency, 2);
        assert_eq!(config.chunk_size, 4096);
        assert!(config.log_json);
        assert!(cli.strict);
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let cli = parse(&["1AbC", "--concurrency", "0"]);
        let mut config = base_config();
        cli.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
