//! Gantry - CI build pipeline driver
//!
//! The `gantry` command drives one CI run for a build directory:
//!
//! - `run`: decide full/incremental, configure, compile, test, report
//! - `decide`: print the full/incremental decision without building
//! - `warnings`: count deduplicated compiler warnings in a build log

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use gantry_ci::fakes::{MemoryVcs, ScriptedBuilder, ScriptedHarness};
use gantry_ci::{
    aggregate_warnings, decide, init_tracing, is_git_repo, BuildMode, Builder, CmakeBuilder,
    DashboardClient, FullBuildReason, GitVcs, NotificationSink, PipelineConfig,
    PipelineController, StatusApiClient, TestHarness, Vcs, WarningStyle,
};
use gantry_domain::{Aggregated, BuildCacheState, BuildOptions};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI build pipeline driver", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: decide, configure, compile, test, report
    Run {
        /// Source checkout directory
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,

        /// Build directory for this platform/compiler/arch/build-type
        #[arg(long)]
        build_dir: PathBuf,

        /// Compiler identifier (e.g. gcc-13, msvc-2022)
        #[arg(long, default_value = "gcc")]
        compiler: String,

        /// Target architecture
        #[arg(long, default_value = "x86_64")]
        arch: String,

        /// Build type
        #[arg(long, default_value = "Release")]
        build_type: String,

        /// Warning style of the platform compiler (windows|posix)
        #[arg(long, default_value = "posix")]
        warning_style: WarningStyle,

        /// Comma-separated option flags
        /// (force-full-build,run-unit-tests,run-scene-tests,build-all-plugins)
        #[arg(long, default_value = "")]
        options: String,

        /// Message of the triggering commit
        #[arg(long, default_value = "")]
        commit_message: String,

        /// Status API base URL (omit to skip that sink)
        #[arg(long)]
        status_api_url: Option<String>,

        /// Status API bearer token
        #[arg(long, env = "GANTRY_STATUS_TOKEN")]
        status_api_token: Option<String>,

        /// Dashboard base URL (omit to skip that sink)
        #[arg(long)]
        dashboard_url: Option<String>,

        /// Use scripted collaborators instead of cmake and the test runners
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the full/incremental decision for a build directory
    Decide {
        /// Source checkout directory
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,

        /// Build directory to inspect
        #[arg(long)]
        build_dir: PathBuf,

        /// Comma-separated option flags
        #[arg(long, default_value = "")]
        options: String,
    },

    /// Count deduplicated compiler warnings in a build log
    Warnings {
        /// Build log to scan
        #[arg(long)]
        log: PathBuf,

        /// Warning style (windows|posix)
        #[arg(long, default_value = "posix")]
        style: WarningStyle,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            source_dir,
            build_dir,
            compiler,
            arch,
            build_type,
            warning_style,
            options,
            commit_message,
            status_api_url,
            status_api_token,
            dashboard_url,
            dry_run,
        } => {
            let options = BuildOptions::parse_list(&options).context("invalid --options")?;
            let config = PipelineConfig {
                source_dir,
                build_dir,
                compiler,
                architecture: arch,
                build_type,
                warning_style,
                options,
                commit_message,
            };
            let exit_code = cmd_run(
                config,
                status_api_url,
                status_api_token,
                dashboard_url,
                dry_run,
            )
            .await?;
            std::process::exit(exit_code)
        }
        Commands::Decide {
            source_dir,
            build_dir,
            options,
        } => {
            let options = BuildOptions::parse_list(&options).context("invalid --options")?;
            cmd_decide(&source_dir, &build_dir, &options).await
        }
        Commands::Warnings { log, style } => cmd_warnings(&log, style),
    }
}

async fn cmd_run(
    config: PipelineConfig,
    status_api_url: Option<String>,
    status_api_token: Option<String>,
    dashboard_url: Option<String>,
    dry_run: bool,
) -> Result<i32> {
    let vcs: Arc<dyn Vcs> = if dry_run {
        Arc::new(MemoryVcs::new("dry-run"))
    } else {
        anyhow::ensure!(
            is_git_repo(&config.source_dir),
            "{} is not inside a git work tree",
            config.source_dir.display()
        );
        Arc::new(GitVcs::new(config.source_dir.as_path()))
    };
    let (builder, harness): (Arc<dyn Builder>, Arc<dyn TestHarness>) = if dry_run {
        (
            Arc::new(ScriptedBuilder::succeeding()),
            Arc::new(ScriptedHarness::empty()),
        )
    } else {
        (Arc::new(CmakeBuilder), Arc::new(CtestHarness))
    };

    let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();
    if let Some(url) = status_api_url {
        let revision = vcs
            .current_revision()
            .await
            .context("cannot resolve the revision to report status against")?;
        sinks.push(Arc::new(StatusApiClient::new(
            url,
            revision,
            status_api_token,
        )));
    }
    if let Some(url) = dashboard_url {
        sinks.push(Arc::new(DashboardClient::new(url, dashboard_run_id(&config))));
    }
    if sinks.is_empty() {
        warn!("no sinks configured, run results will only be logged");
    }

    let controller = PipelineController::new(config, vcs, builder, harness, sinks);
    let report = controller.run().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.exit_code())
}

async fn cmd_decide(source_dir: &Path, build_dir: &Path, options: &BuildOptions) -> Result<()> {
    anyhow::ensure!(
        is_git_repo(source_dir),
        "{} is not inside a git work tree",
        source_dir.display()
    );
    let cache = BuildCacheState::load(build_dir);
    let vcs = GitVcs::new(source_dir);

    let mode = match (&cache.last_built_revision, cache.has_cache) {
        (Some(last), true) => {
            let current = vcs.current_revision().await?;
            match vcs.changed_paths_between(last, &current).await {
                Ok(changed) => decide(options, &cache, &changed),
                Err(e) => {
                    warn!(error = %e, "changed-paths query failed, assuming changed");
                    BuildMode::Full(FullBuildReason::ChangesUnknown)
                }
            }
        }
        _ => decide(options, &cache, &BTreeSet::new()),
    };

    info!(build_dir = %build_dir.display(), "decision computed");
    println!("{mode}");
    Ok(())
}

fn cmd_warnings(log: &Path, style: WarningStyle) -> Result<()> {
    match aggregate_warnings(log, style) {
        Aggregated::Counted(count) => {
            println!("{count}");
            Ok(())
        }
        Aggregated::Missing => anyhow::bail!("build log not readable: {}", log.display()),
    }
}

/// Run identifier for the dashboard: one per invocation.
fn dashboard_run_id(config: &PipelineConfig) -> String {
    format!(
        "{}-{}-{}",
        config.compiler,
        config.architecture,
        std::process::id()
    )
}

/// ctest-backed harness: runs the suites and hands back the JSON report
/// the runners drop into the build directory.
struct CtestHarness;

#[async_trait::async_trait]
impl TestHarness for CtestHarness {
    async fn run_unit_tests(&self, config: &PipelineConfig) -> gantry_domain::Result<PathBuf> {
        run_ctest(config, "unit", "unit-tests.json").await
    }

    async fn run_scene_tests(&self, config: &PipelineConfig) -> gantry_domain::Result<PathBuf> {
        run_ctest(config, "scene", "scene-tests.json").await
    }
}

async fn run_ctest(
    config: &PipelineConfig,
    label: &str,
    report_name: &str,
) -> gantry_domain::Result<PathBuf> {
    let status = tokio::process::Command::new("ctest")
        .arg("--test-dir")
        .arg(&config.build_dir)
        .arg("-L")
        .arg(label)
        .status()
        .await
        .map_err(|e| gantry_domain::PipelineError::collaborator("test", e.to_string()))?;

    // Non-zero ctest exit just means failing tests; the report still
    // exists and the aggregator reads the counts from it.
    if !status.success() {
        warn!(label, "test runner exited non-zero");
    }
    Ok(config.build_dir.join(report_name))
}
