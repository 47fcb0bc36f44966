//! The planned schedule that real-time updates are applied against.
//!
//! Schedule loading proper (GTFS, NeTEx) happens elsewhere; this module
//! holds the resulting [`TransitModel`] and a JSON loader for fixtures and
//! the command-line tool.

mod convert;
mod model;
mod types;

use std::path::Path;

pub use convert::{ConversionError, convert_schedule};
pub use model::{TransitModel, TransitModelBuilder};
pub use types::ScheduleFile;

/// Errors from loading a schedule file.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("failed to read schedule: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schedule: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Read and convert a JSON schedule file.
pub fn load_schedule(path: impl AsRef<Path>) -> Result<TransitModel, ScheduleError> {
    let contents = std::fs::read_to_string(path)?;
    let file: ScheduleFile = serde_json::from_str(&contents)?;
    Ok(convert_schedule(&file)?)
}
