//! shellcache - run the offline shell cache worker from the command line
//!
//! Each subcommand drives one worker lifecycle step against on-disk buckets
//! and the real network, or keeps a page open to watch for new versions.

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use shellcache::cache::{CacheStorage, DiskStorage};
use shellcache::cli::{Cli, CliError, Command, RunConfig};
use shellcache::clients::ClientSet;
use shellcache::config::NotifierConfig;
use shellcache::http::{Method, Request, RequestMode};
use shellcache::logging::{init_logging, LogConfig};
use shellcache::network::{HttpNetwork, Network};
use shellcache::notifier::{NotifierExit, TerminalHost, UpdateNotifier, UserAction};
use shellcache::registration::{FileSource, Registration, StaticSource, WorkerSource};
use shellcache::worker::CacheManager;

/// Opens the bucket storage the run is configured for
fn open_storage(run: &RunConfig) -> Result<DiskStorage, CliError> {
    match &run.cache_dir {
        Some(dir) => Ok(DiskStorage::with_dir(dir.clone())),
        None => DiskStorage::new().ok_or(CliError::NoCacheDir),
    }
}

/// Forwards prompt keys typed on stdin: `r` reloads, `d` dismisses
fn spawn_stdin_actions() -> mpsc::Receiver<UserAction> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let action = match line.trim() {
                "r" | "R" => UserAction::Reload,
                "d" | "D" => UserAction::Dismiss,
                _ => continue,
            };
            if tx.send(action).await.is_err() {
                break;
            }
        }
    });
    rx
}

async fn watch(
    run: &RunConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
) -> Result<(), Box<dyn Error>> {
    let source: Arc<dyn WorkerSource> = match &run.config_path {
        Some(path) => Arc::new(FileSource::new(path.clone()).with_strategy(run.strategy_override)),
        None => Arc::new(StaticSource::new(run.worker.clone())),
    };
    let registration =
        Registration::register(source, storage, network, Arc::new(ClientSet::new())).await?;
    println!(
        "Serving {} - watching for new versions",
        registration.active_version().await.unwrap_or_default()
    );

    let mut actions = spawn_stdin_actions();
    loop {
        let notifier = UpdateNotifier::attach(
            registration.clone(),
            TerminalHost::stdout(),
            NotifierConfig::default(),
        )
        .await;

        let exit = tokio::select! {
            exit = notifier.run(&mut actions) => exit,
            _ = tokio::signal::ctrl_c() => NotifierExit::Closed,
        };
        match exit {
            NotifierExit::Reloaded => {
                println!(
                    "Page reloaded under {}",
                    registration.active_version().await.unwrap_or_default()
                );
            }
            NotifierExit::Closed => return Ok(()),
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let cwd = std::env::current_dir()?;
    let run = RunConfig::from_cli(&cli, &cwd)?;

    let storage: Arc<dyn CacheStorage> = Arc::new(open_storage(&run)?);
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(run.worker.origin_url()?));

    let worker = CacheManager::new(
        run.worker.clone(),
        storage.clone(),
        network.clone(),
        Arc::new(ClientSet::new()),
    )?;

    match cli.command {
        Command::Install => {
            let outcome = worker.install().await?;
            println!("Installed {} ({} entries)", outcome.cache_name, outcome.precached);
        }
        Command::Activate => {
            let outcome = worker.activate().await?;
            for name in &outcome.deleted {
                println!("Deleted {}", name);
            }
            println!("Current cache: {}", worker.cache_name());
        }
        Command::Fetch {
            url,
            navigate,
            method,
        } => {
            let request = Request {
                method: Method::from_str(&method),
                url: run.worker.resolve(&url)?,
                mode: if navigate {
                    RequestMode::Navigate
                } else {
                    RequestMode::Cors
                },
            };
            let outcome = worker.fetch(request).await;
            // Let a background refresh finish before the process exits
            if let Some(refresh) = outcome.revalidation {
                let _ = refresh.await;
            }
            let response = outcome.response;
            println!(
                "{} {} [{:?}] {} bytes",
                response.status,
                response.status_text,
                outcome.source,
                response.body.len()
            );
        }
        Command::Buckets => {
            for name in storage.keys().await? {
                let marker = if name == worker.cache_name() { "*" } else { " " };
                let entries = storage.entries(&name).await?.len();
                println!("{} {} ({} entries)", marker, name, entries);
            }
        }
        Command::Version => {
            println!("{}", serde_json::to_string_pretty(&worker.version_info())?);
        }
        Command::Watch => watch(&run, storage, network).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
