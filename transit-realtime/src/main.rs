use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transit_realtime::config::EngineConfig;
use transit_realtime::schedule::load_schedule;
use transit_realtime::snapshot::TimetableSnapshotManager;
use transit_realtime::writer::{UpdateBatch, spawn_writer};

const USAGE: &str = "usage: transit-realtime <config.json> <schedule.json> [update-batch.json ...]";

#[derive(Debug, thiserror::Error)]
enum BatchFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

fn read_batch(path: &Path) -> Result<UpdateBatch, BatchFileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| BatchFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| BatchFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    let [config_path, schedule_path, batches @ ..] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let config = match EngineConfig::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %config_path.display(), %err, "cannot load config");
            return ExitCode::FAILURE;
        }
    };
    let model = match load_schedule(schedule_path) {
        Ok(model) => Arc::new(model),
        Err(err) => {
            error!(path = %schedule_path.display(), %err, "cannot load schedule");
            return ExitCode::FAILURE;
        }
    };
    info!(
        routes = model.routes().count(),
        trips = model.trips().count(),
        "loaded schedule"
    );

    let manager = TimetableSnapshotManager::new(&config);
    let (handle, task) = spawn_writer(Arc::clone(&model), manager, &config);
    let source = handle.snapshots().clone();

    let mut status = ExitCode::SUCCESS;
    for path in batches {
        let batch = match read_batch(path) {
            Ok(batch) => batch,
            Err(err) => {
                error!(%err, "skipping batch");
                status = ExitCode::FAILURE;
                continue;
            }
        };
        match handle.submit(batch).await {
            Ok(result) => {
                info!(batch = %path.display(), %result, "batch applied");
                for error in result.errors() {
                    info!(batch = %path.display(), %error, "rejected");
                }
            }
            Err(err) => {
                error!(batch = %path.display(), %err, "batch failed");
                status = ExitCode::FAILURE;
                break;
            }
        }
    }

    drop(handle);
    if let Err(err) = task.await {
        error!(%err, "writer task failed");
        return ExitCode::FAILURE;
    }
    info!(snapshot = %source.current(), "done");
    status
}
