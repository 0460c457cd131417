//! Play history and saved song lists.

mod lists;
mod log;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use lists::{load_list, save_list, LibraryMap, ListEntry};
pub use log::{HistoryEntry, HistoryLog, Timeframe, TIMESTAMP_FORMAT};

/// Field separator shared by history and list files.
pub const FIELD_SEPARATOR: &str = "<<<";

/// History and list file errors.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HistoryError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        HistoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
