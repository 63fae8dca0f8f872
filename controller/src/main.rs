//! vocontrol - Entry Point
//!
//! Looks up, deploys or deletes the virtual office of a project.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use vocontrol::app::options::{AppOptions, Command};
use vocontrol::app::run::run;
use vocontrol::logs::{init_logging, LogOptions};
use vocontrol::storage::settings::Settings;
use vocontrol::utils::version_info;

use tracing::{error, info};

const DEFAULT_SETTINGS_FILE: &str = "vocontrol.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    for arg in env::args().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            cli_args.insert(key.trim_start_matches('-').to_string(), value.to_string());
        } else if arg.starts_with("--") {
            cli_args.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        let version = version_info();
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let Some(project) = cli_args.get("project").cloned() else {
        eprintln!("Usage: vocontrol --project=<slug> [--deploy | --delete] [--settings=<path>]");
        std::process::exit(2);
    };

    let command = match (cli_args.contains_key("deploy"), cli_args.contains_key("delete")) {
        (true, true) => {
            eprintln!("--deploy and --delete are mutually exclusive");
            std::process::exit(2);
        }
        (true, false) => Command::Deploy,
        (false, true) => Command::Delete,
        (false, false) => Command::Watch,
    };

    let settings_file = cli_args
        .get("settings")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {}: {}", settings_file.display(), e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(project, command, settings);
    info!("Running vocontrol with options: {:?}", options);

    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("vocontrol failed: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
