//! aios: agent-assisted line-length fixing and workspace housekeeping
//!
//! Usage:
//!   aios fix "<line>"                      → run one line through the coordinator
//!   aios scan src/ [--execute]             → find and fix overlong lines
//!   aios health                            → check the bridges (exit 0/1/2)
//!   aios serve [--port 8000]               → REST gateway
//!   aios cleanup [ROOT] [--execute]        → move stray root files into folders
//!   aios archive ROOT -p '**/*.md'         → gzip matching files into archive/
//!   aios restore archive/archive_<stamp>   → unpack an archive
//!   aios config                            → print the effective configuration

use aios::scan::{self, FixOptions};
use aios_agents::{bridges, Coordinator};
use aios_core::{AiosConfig, LineRequest};
use aios_housekeeping::{ArchiveOptions, BackupPolicy, Cleaner};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "aios",
    about = "Fix overlong Python lines with a scout/worker/oracle agent pipeline",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file (default: ./aios.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fix a single line
    Fix {
        line: String,
        /// Source file, for prompt context
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        line_number: Option<usize>,
    },
    /// Scan files for overlong lines and fix them
    Scan {
        /// File or directory
        path: PathBuf,
        /// Glob patterns for files to include
        #[arg(short, long, default_value = "*.py")]
        pattern: Vec<String>,
        /// Rewrite files (default is a dry run)
        #[arg(long, default_value_t = false, conflicts_with = "dry_run")]
        execute: bool,
        /// Report only
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Also apply fallback splits marked low-confidence
        #[arg(long, default_value_t = false)]
        accept_low_confidence: bool,
        /// Override the configured line limit
        #[arg(long)]
        max_length: Option<usize>,
    },
    /// Check local inference and the oracle
    Health,
    /// Start the REST gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Move stray top-level files into their folders
    Cleanup {
        #[arg(default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
    /// Gzip matching files into a timestamped archive folder
    Archive {
        root: PathBuf,
        /// Glob patterns relative to ROOT
        #[arg(short, long, required = true)]
        pattern: Vec<String>,
        /// Destination directory (default: housekeeping.archive_dir)
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        remove_originals: bool,
        /// Only archive files untouched for this many days
        #[arg(long)]
        min_age_days: Option<u64>,
        #[arg(long)]
        label: Option<String>,
    },
    /// Restore an archive folder (or its manifest.json)
    Restore {
        archive: PathBuf,
        #[arg(long, default_value = ".")]
        target: PathBuf,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Ignore the config file and print built-in defaults
        #[arg(long, default_value_t = false)]
        defaults: bool,
    },
}

fn init_tracing(log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "aios.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aios=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

fn load_config(cli: &Cli) -> AiosConfig {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| AiosConfig::default_path(dirs::config_dir()));
    AiosConfig::load(&path)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_ref());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli);

    match &cli.command {
        Commands::Fix { line, file, line_number } => {
            let coordinator = Coordinator::from_config(&config);
            let mut request = LineRequest::new(line.clone());
            request.file = file.clone();
            request.line_number = *line_number;
            let result = coordinator.coordinate(request).await;

            if cli.json {
                print_json(&result)?;
            } else {
                println!("{}", result.fixed);
                eprintln!(
                    "{:?} via {:?}, confidence {:.2}{}",
                    result.resolution,
                    result.agents_visited,
                    result.confidence,
                    if result.low_confidence { " (low, review)" } else { "" }
                );
                for e in &result.errors {
                    eprintln!("  note: {}", e);
                }
            }
            Ok(if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Commands::Scan { path, pattern, execute, dry_run, accept_low_confidence, max_length } => {
            let mut config = config.clone();
            if let Some(max) = max_length {
                config.line.max_length = *max;
                config.line.break_column = config.line.break_column.min(*max);
            }
            let coordinator = Coordinator::from_config(&config);
            let options = FixOptions {
                execute: *execute && !*dry_run,
                accept_low_confidence: *accept_low_confidence,
                backup: BackupPolicy::from_config(&config.housekeeping),
            };
            if !options.execute {
                info!("dry run: no files will be written (use --execute)");
            }

            let files = scan::collect_files(path, pattern)?;
            let mut reports = Vec::with_capacity(files.len());
            for file in &files {
                match scan::fix_file(file, &coordinator, &options).await {
                    Ok(report) => {
                        if !cli.json && report.long_lines > 0 {
                            println!("{}", scan::describe(&report));
                        }
                        reports.push(report);
                    }
                    Err(e) => warn!("{}: {:#}", file.display(), e),
                }
            }

            let remaining: usize = reports.iter().map(|r| r.long_lines - r.applied).sum();
            if cli.json {
                print_json(&reports)?;
            } else {
                let total: usize = reports.iter().map(|r| r.long_lines).sum();
                println!(
                    "{} files scanned, {} overlong lines, {} left",
                    files.len(),
                    total,
                    remaining
                );
            }
            Ok(if remaining == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Commands::Health => health(&config, cli.json).await,

        Commands::Serve { host, port } => {
            let mut gateway = config.gateway.clone();
            if let Some(host) = host {
                gateway.host = host.clone();
            }
            if let Some(port) = port {
                gateway.port = *port;
            }
            let coordinator = Arc::new(Coordinator::from_config(&config));
            aios_gateway::serve(&gateway, coordinator).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Cleanup { root, execute } => {
            let cleaner = Cleaner::from_config(root, &config.housekeeping)?;
            let plan = cleaner.plan()?;
            let report = cleaner.execute(&plan, !*execute);
            if cli.json {
                print_json(&report)?;
            } else {
                for m in &report.moved {
                    println!(
                        "{}{} -> {}",
                        if report.dry_run { "[dry-run] " } else { "" },
                        m.source.display(),
                        m.destination.display()
                    );
                }
                for (path, e) in &report.failed {
                    eprintln!("failed: {}: {}", path.display(), e);
                }
                println!("{} files to move, {} untouched", plan.moves.len(), plan.untouched.len());
            }
            Ok(if report.failed.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Commands::Archive { root, pattern, dest, remove_originals, min_age_days, label } => {
            let dest = dest
                .clone()
                .unwrap_or_else(|| root.join(&config.housekeeping.archive_dir));
            let options = ArchiveOptions {
                remove_originals: *remove_originals,
                min_age: min_age_days.map(|d| Duration::from_secs(d * 24 * 60 * 60)),
                label: label.clone(),
            };
            let manifest = aios_housekeeping::archive(root, pattern, &dest, &options)?;
            if cli.json {
                print_json(&manifest)?;
            } else if manifest.entries.is_empty() {
                println!("nothing to archive");
            } else {
                println!(
                    "{} files archived to {} ({} -> {} bytes)",
                    manifest.entries.len(),
                    manifest.folder.display(),
                    manifest.total_size(),
                    manifest.compressed_size()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Restore { archive, target, overwrite } => {
            let restored = aios_housekeeping::restore(archive, target, *overwrite)?;
            if cli.json {
                print_json(&restored)?;
            } else {
                for path in &restored {
                    println!("{}", path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config { defaults } => {
            let shown = if *defaults { AiosConfig::default() } else { config };
            if cli.json {
                print_json(&shown)?;
            } else {
                print!("{}", shown.to_toml());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Exit 0 when everything answers, 1 when only the oracle is missing,
/// 2 when local inference is down.
async fn health(config: &AiosConfig, json: bool) -> anyhow::Result<ExitCode> {
    let mut checks = Vec::new();
    let mut local_ok = true;

    for (tier, bridge) in [("scout", &config.scout), ("worker", &config.worker)] {
        let provider = bridges::local_provider(bridge);
        let check = match provider.health().await {
            Ok(models) if models.iter().any(|m| m == &bridge.model) => {
                serde_json::json!({ "tier": tier, "model": bridge.model, "status": "ok" })
            }
            Ok(_) => {
                local_ok = false;
                serde_json::json!({ "tier": tier, "model": bridge.model, "status": "model not pulled" })
            }
            Err(e) => {
                local_ok = false;
                serde_json::json!({ "tier": tier, "model": bridge.model, "status": e.to_string() })
            }
        };
        checks.push(check);
    }

    let oracle_ok = match bridges::oracle_provider(&config.oracle) {
        Some(provider) => match provider.health().await {
            Ok(_) => {
                checks.push(serde_json::json!({ "tier": "oracle", "model": config.oracle.model, "status": "ok" }));
                true
            }
            Err(e) => {
                checks.push(serde_json::json!({ "tier": "oracle", "model": config.oracle.model, "status": e.to_string() }));
                false
            }
        },
        None => {
            checks.push(serde_json::json!({
                "tier": "oracle",
                "model": config.oracle.model,
                "status": format!("${} not set", config.oracle.api_key_env),
            }));
            false
        }
    };

    if json {
        print_json(&serde_json::json!({ "checks": checks, "local_ok": local_ok, "oracle_ok": oracle_ok }))?;
    } else {
        for c in &checks {
            println!(
                "{:<7} {:<20} {}",
                c["tier"].as_str().unwrap_or_default(),
                c["model"].as_str().unwrap_or_default(),
                c["status"].as_str().unwrap_or_default()
            );
        }
    }

    Ok(if !local_ok {
        ExitCode::from(2)
    } else if !oracle_ok {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
