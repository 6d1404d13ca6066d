//! fiddle - run and bisect Electron fiddles from the command line
//!
//! ## Commands
//!
//! - `open`: load a fiddle from a local path or a gist
//! - `test`: run the fiddle once against a version
//! - `bisect`: find the first version where the fiddle starts failing
//!
//! The process exits 0 when the command succeeds and 1 otherwise.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use fiddle_core::{
    Command, Dispatcher, FiddleConfig, FsTemplateStore, HttpArchiveFetcher, HttpGistSource,
    HttpReleaseSource, StdoutConsole, TemplateCache, VersionCatalog, Workbench, METRICS,
};
use fiddle_runner::ProcessRunner;

#[derive(Parser)]
#[command(name = "fiddle")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and bisect Electron fiddles", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory for cached templates and the release list
    #[arg(long, global = true, env = "FIDDLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Command that runs a fiddle; `{version}` and `{dir}` are substituted
    #[arg(long, global = true, env = "FIDDLE_RUNNER")]
    runner: Option<String>,

    /// Use the cached release list only
    #[arg(long, global = true)]
    offline: bool,

    /// Kill a run after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a fiddle from a local path or a gist
    Open {
        /// Directory, file, gist id or gist URL
        target: String,
    },

    /// Run the fiddle once
    Test {
        /// Version to run against (default: newest known)
        #[arg(long)]
        version: Option<String>,

        /// Fiddle directory, gist id or gist URL (default: template)
        #[arg(long)]
        fiddle: Option<String>,
    },

    /// Find the first version where the fiddle fails
    Bisect {
        /// Version known to pass
        good: String,

        /// Version known to fail
        bad: String,

        /// Fiddle directory, gist id or gist URL
        #[arg(long, conflicts_with_all = ["fiddle_dir", "fiddle_gist"])]
        fiddle: Option<String>,

        /// Fiddle directory
        #[arg(long, conflicts_with = "fiddle_gist")]
        fiddle_dir: Option<PathBuf>,

        /// Gist id or URL
        #[arg(long)]
        fiddle_gist: Option<String>,

        /// Include beta releases
        #[arg(long, overrides_with = "no_betas")]
        betas: bool,

        /// Exclude beta releases
        #[arg(long)]
        no_betas: bool,

        /// Include nightly releases
        #[arg(long, overrides_with = "no_nightlies")]
        nightlies: bool,

        /// Exclude nightly releases
        #[arg(long)]
        no_nightlies: bool,
    },
}

impl Commands {
    fn into_command(self) -> Command {
        match self {
            Commands::Open { target } => Command::Open { target },
            Commands::Test { version, fiddle } => Command::Test { fiddle, version },
            Commands::Bisect {
                good,
                bad,
                fiddle,
                fiddle_dir,
                fiddle_gist,
                betas,
                no_betas,
                nightlies,
                no_nightlies,
            } => Command::Bisect {
                good,
                bad,
                fiddle: fiddle
                    .or_else(|| fiddle_dir.map(|dir| dir.display().to_string()))
                    .or(fiddle_gist),
                betas: flag_pair(betas, no_betas),
                nightlies: flag_pair(nightlies, no_nightlies),
            },
        }
    }
}

/// Collapse a `--x` / `--no-x` pair; neither given leaves the setting alone.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fiddle_core::init_tracing(cli.json, level);

    let config = build_config(&cli);
    debug!(config = %serde_json::to_string(&config)?, "effective configuration");

    let result = cmd_execute(&config, cli.timeout, cli.command.into_command()).await;
    METRICS.flush();
    let code = result?;
    std::process::exit(code);
}

fn build_config(cli: &Cli) -> FiddleConfig {
    let mut config = FiddleConfig::from_env().with_offline(cli.offline);
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(runner) = &cli.runner {
        config = config.with_runner(runner);
    }
    config
}

/// Wire up the workbench and run one command to completion.
async fn cmd_execute(config: &FiddleConfig, timeout: Option<u64>, command: Command) -> Result<i32> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", config.data_dir.display()))?;

    let releases = HttpReleaseSource::new(&config.releases_url, config.releases_cache())
        .offline(config.offline);
    let catalog = Arc::new(VersionCatalog::load(&releases, &config.local_versions).await);

    let templates = Arc::new(TemplateCache::new(
        Arc::clone(&catalog),
        Arc::new(HttpArchiveFetcher::new(&config.template_url)),
        Arc::new(FsTemplateStore::new(config.templates_dir())),
    ));

    let mut runner = ProcessRunner::new(config.runner_command.clone());
    if let Some(secs) = timeout {
        runner = runner.with_timeout(Duration::from_secs(secs));
    }

    let workbench = Workbench::new(
        catalog,
        templates,
        Arc::new(runner),
        Arc::new(HttpGistSource::new(&config.gist_api)),
    )
    .spawn();

    let dispatcher = Dispatcher::new(workbench, Arc::new(StdoutConsole));
    let name = command.name();
    let outcome = dispatcher.execute(command).await;
    dispatcher.shutdown().await;

    let outcome = outcome.with_context(|| format!("fiddle {name} failed"))?;
    Ok(outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fiddle").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_bisect_with_channel_flags() {
        let cli = parse(&["bisect", "10.0.0", "11.0.0", "--no-betas", "--nightlies"]);
        assert_eq!(
            cli.command.into_command(),
            Command::Bisect {
                good: "10.0.0".to_string(),
                bad: "11.0.0".to_string(),
                fiddle: None,
                betas: Some(false),
                nightlies: Some(true),
            }
        );
    }

    #[test]
    fn test_parse_bisect_last_channel_flag_wins() {
        let cli = parse(&["bisect", "10", "11", "--betas", "--no-betas"]);
        match cli.command.into_command() {
            Command::Bisect { betas, .. } => assert_eq!(betas, Some(false)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_bisect_fiddle_dir() {
        let cli = parse(&["bisect", "10", "11", "--fiddle-dir", "/tmp/my-fiddle"]);
        match cli.command.into_command() {
            Command::Bisect { fiddle, .. } => assert_eq!(fiddle.as_deref(), Some("/tmp/my-fiddle")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_conflicting_fiddles() {
        let result = Cli::try_parse_from([
            "fiddle",
            "bisect",
            "10",
            "11",
            "--fiddle",
            "a",
            "--fiddle-gist",
            "b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_test_with_globals() {
        let cli = parse(&["--offline", "-v", "test", "--version", "12.0.0"]);
        assert!(cli.offline);
        assert!(cli.verbose);
        assert_eq!(
            cli.command.into_command(),
            Command::Test {
                fiddle: None,
                version: Some("12.0.0".to_string()),
            }
        );
    }

    #[test]
    fn test_build_config_applies_flags() {
        let cli = parse(&[
            "--data-dir",
            "/tmp/fiddle-data",
            "--runner",
            "electron {dir}",
            "--offline",
            "open",
            "x",
        ]);
        let config = build_config(&cli);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/fiddle-data"));
        assert_eq!(config.runner_command, vec!["electron", "{dir}"]);
        assert!(config.offline);
    }

    #[tokio::test]
    async fn test_execute_offline_test_command() {
        let data = tempfile::tempdir().unwrap();
        std::fs::write(
            data.path().join("releases.json"),
            r#"[{"version":"12.0.0"},{"version":"11.0.0"}]"#,
        )
        .unwrap();
        let fiddle = tempfile::tempdir().unwrap();
        std::fs::write(fiddle.path().join("main.js"), "// noop").unwrap();

        let config = FiddleConfig::default()
            .with_data_dir(data.path())
            .with_runner("true")
            .with_local_versions(&[])
            .with_offline(true);
        let code = cmd_execute(
            &config,
            None,
            Command::Test {
                fiddle: Some(fiddle.path().display().to_string()),
                version: Some("12.0.0".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(code, 0);

        let config = config.with_runner("false");
        let code = cmd_execute(
            &config,
            None,
            Command::Test {
                fiddle: Some(fiddle.path().display().to_string()),
                version: Some("11.0.0".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(code, 1);
    }
}
