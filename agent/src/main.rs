//! UP2DATE Agent - Entry Point
//!
//! Runs deployment instructions against the local package store and reports
//! the package lifecycle.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use colored::Colorize;
use serde::Deserialize;
use tracing::{error, info};

use up2date::app::options::AppOptions;
use up2date::app::run::run;
use up2date::app::setup::{init, load_settings};
use up2date::app::state::AppState;
use up2date::deploy::download::LocalDownloader;
use up2date::deploy::fsm::PackageStatus;
use up2date::deploy::gate::NoSignatureVerifier;
use up2date::deploy::tracker::{package_key, PackageRecord};
use up2date::errors::AgentError;
use up2date::filesys::file::File;
use up2date::logs::{init_logging, LogOptions};
use up2date::models::deployment::{DeploymentRequest, DeploymentResult};
use up2date::storage::layout::StorageLayout;
use up2date::utils::version_info;

/// One request or a batch, as read from a request file
#[derive(Deserialize)]
#[serde(untagged)]
enum RequestFile {
    One(DeploymentRequest),
    Many(Vec<DeploymentRequest>),
}

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    let result = if cli_args.contains_key("init") {
        init(&layout).await.map(|created| {
            if created {
                println!("Settings written to {:?}", layout.settings_file().path());
            } else {
                println!("Settings already present at {:?}", layout.settings_file().path());
            }
        })
    } else if let Some(package) = cli_args.get("status") {
        print_status(&layout, (package != "true").then_some(package.as_str())).await
    } else if let Some(package) = cli_args.get("accept") {
        accept(&layout, package).await
    } else if let Some(request_file) = cli_args.get("deploy") {
        deploy(&layout, request_file, &cli_args).await
    } else {
        print_usage();
        return;
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{} {}", "[ERROR]".red().bold(), e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Usage: up2date-agent [--base-dir=<dir>] <command>");
    println!();
    println!("  --version                              print version information");
    println!("  --init                                 create storage and default settings");
    println!("  --status[=<package>]                   print the package lifecycle status");
    println!("  --accept=<package>                     accept a suggested package");
    println!("  --deploy=<request.json> --source=<dir> [--cancel=<id>[,<id>...]]");
    println!("                                         run deployment requests");
}

async fn deploy(
    layout: &StorageLayout,
    request_file: &str,
    cli_args: &HashMap<String, String>,
) -> Result<(), AgentError> {
    let settings = load_settings(layout).await?;

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let source = cli_args.get("source").ok_or_else(|| {
        AgentError::ValidationError("--deploy requires --source=<dir>".to_string())
    })?;
    let requests = match File::new(request_file).read_json::<RequestFile>().await? {
        RequestFile::One(request) => vec![request],
        RequestFile::Many(requests) => requests,
    };
    let cancel_ids = parse_cancel_ids(cli_args.get("cancel").map(String::as_str))?;

    let state = AppState::init(
        &settings,
        layout.clone(),
        Arc::new(LocalDownloader::new(source)),
        Arc::new(NoSignatureVerifier),
    )
    .await?;

    let options = AppOptions {
        layout: layout.clone(),
        ..Default::default()
    };
    info!("Running UP2DATE agent with options: {:?}", options);

    let ids: Vec<(i64, String)> = requests
        .iter()
        .map(|r| (r.id, r.artifact_file_name.clone()))
        .collect();
    let results = run(
        Arc::new(state),
        &options,
        requests,
        cancel_ids,
        await_shutdown_signal(),
    )
    .await?;

    print_results(&ids, &results)
}

fn parse_cancel_ids(value: Option<&str>) -> Result<Vec<i64>, AgentError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .map_err(|_| AgentError::ValidationError(format!("Invalid cancel id '{}'", id)))
        })
        .collect()
}

fn print_results(ids: &[(i64, String)], results: &[DeploymentResult]) -> Result<(), AgentError> {
    let report: Vec<serde_json::Value> = ids
        .iter()
        .zip(results)
        .map(|((id, artifact), result)| {
            serde_json::json!({
                "id": id,
                "artifactFileName": artifact,
                "result": result,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn accept(layout: &StorageLayout, package: &str) -> Result<(), AgentError> {
    let settings = load_settings(layout).await?;
    let state = AppState::init(
        &settings,
        layout.clone(),
        Arc::new(LocalDownloader::new(layout.packages_dir().path())),
        Arc::new(NoSignatureVerifier),
    )
    .await?;

    state.client.accept_suggestion(package)?;
    state.save_snapshot().await?;
    println!("{} {} will be installed on its next attempt", "[OK]".green().bold(), package);
    Ok(())
}

async fn print_status(layout: &StorageLayout, package: Option<&str>) -> Result<(), AgentError> {
    let snapshot = layout.packages_file();
    let records: Vec<PackageRecord> = if snapshot.exists().await {
        snapshot.read_json().await?
    } else {
        Vec::new()
    };

    let records: Vec<&PackageRecord> = match package {
        Some(package) => {
            let key = package_key(package);
            records
                .iter()
                .filter(|r| package_key(&r.file_name) == key)
                .collect()
        }
        None => records.iter().collect(),
    };

    if records.is_empty() {
        match package {
            Some(package) => println!("{} {}", package, PackageStatus::Unknown.to_string().dimmed()),
            None => println!("No packages tracked yet"),
        }
        return Ok(());
    }

    for record in records {
        let status = record.status.to_string();
        let status = match record.status {
            PackageStatus::Installed => status.green(),
            PackageStatus::RestartNeeded => status.yellow(),
            PackageStatus::Failed => status.red(),
            PackageStatus::Downloading | PackageStatus::Installing => status.cyan(),
            _ => status.normal(),
        };

        let mut line = format!("{:<40} {}", record.file_name, status);
        if record.suggested {
            line.push_str(&format!(" {}", "(suggested)".blue()));
        }
        if record.accepted {
            line.push_str(&format!(" {}", "(accepted)".blue()));
        }
        println!("{}", line);

        if let Some(error) = &record.error {
            println!("    {}", error.replace('\n', " ").red());
        }
        println!("    updated {}", record.updated_at.to_rfc3339().dimmed());
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Ctrl+C received, shutting down...");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
