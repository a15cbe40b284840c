// main.rs
// zfs-driver: inspect pools, datasets and properties through the configured backend

use serde::Serialize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zfs_driver::config::{load_settings_with_notes, report_notes};
use zfs_driver::{Settings, ZfsError, ZfsManager};

const USAGE: &str =
    "usage: zfs-driver <info | pools | datasets [pool] | props <name> [property...]>";

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ZfsError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ZfsError::wrap("print", None, e))?;
    println!("{}", text);
    Ok(())
}

async fn run(manager: &ZfsManager, args: &[String]) -> Result<(), ZfsError> {
    let command = args.first().map(String::as_str).unwrap_or("info");
    match command {
        "info" => print_json(&manager.runtime_info().await?),
        "pools" => print_json(&manager.list_pools().await?),
        "datasets" => match args.get(1) {
            Some(pool) => print_json(&manager.list_datasets_in_pool(pool, true).await?),
            None => print_json(&manager.list_datasets(true).await?),
        },
        "props" => {
            let Some(name) = args.get(1) else {
                eprintln!("{}", USAGE);
                return Ok(());
            };
            let names: Vec<&str> = args[2..].iter().map(String::as_str).collect();
            // pool names carry no separator; everything else is a dataset
            let props = if name.contains(['/', '@']) {
                manager.get_dataset_properties(name, &names).await?
            } else {
                manager.get_pool_properties(name, &names).await?
            };
            let mut sorted: Vec<_> = props.into_values().collect();
            sorted.sort_by(|a, b| a.name.cmp(&b.name));
            print_json(&sorted)
        }
        other => {
            eprintln!("unknown command '{}'\n{}", other, USAGE);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let (settings, notes) = load_settings_with_notes();
    init_logging(&settings);
    report_notes(&notes);
    tracing::info!(backend = %settings.driver.backend, "zfs-driver v{}", env!("CARGO_PKG_VERSION"));

    let manager = match ZfsManager::from_settings(&settings.driver) {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!("failed to open driver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = run(&manager, &args).await;
    manager.close().await;
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
