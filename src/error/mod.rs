use std::path::PathBuf;

use crate::capture::CaptureError;
use crate::cli::CliError;
use crate::clipboard::ClipboardError;
use crate::recording::RecordingError;
use crate::storage::StorageError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

pub const EXIT_XID_ERROR: i32 = 1;
pub const EXIT_INVALID_CAPTURE: i32 = 2;
pub const EXIT_CANT_SAVE_IMAGE: i32 = 3;
pub const EXIT_CANCEL: i32 = 4;
pub const EXIT_CANT_GRAB: i32 = 5;
pub const EXIT_RECORDING: i32 = 6;
pub const EXIT_USAGE: i32 = 64;
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Terminal failures of a capture session. Every variant ends the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("can't grab the pointer/keyboard: {source}")]
    GrabFailed {
        #[source]
        source: CaptureError,
    },
    #[error("can't get the window under the pointer")]
    WindowResolutionFailed {
        #[source]
        source: Option<CaptureError>,
    },
    #[error("invalid capture: {message}")]
    InvalidCapture { message: String },
    #[error("can't save the image to {target}")]
    SaveFailed {
        target: String,
        #[source]
        source: SaveFailure,
    },
    #[error("canceled by the user")]
    UserCancelled,
    #[error("recording failed")]
    RecordingFailed(#[from] RecordingError),
    #[error(transparent)]
    Usage(#[from] CliError),
    #[error("display unavailable: {source}")]
    DisplayUnavailable {
        #[source]
        source: CaptureError,
    },
}

#[derive(Debug, Error)]
pub enum SaveFailure {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}

impl AppError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::WindowResolutionFailed { .. } => EXIT_XID_ERROR,
            Self::InvalidCapture { .. } => EXIT_INVALID_CAPTURE,
            Self::SaveFailed { .. } => EXIT_CANT_SAVE_IMAGE,
            Self::UserCancelled => EXIT_CANCEL,
            Self::GrabFailed { .. } => EXIT_CANT_GRAB,
            Self::RecordingFailed(_) => EXIT_RECORDING,
            Self::Usage(_) => EXIT_USAGE,
            Self::DisplayUnavailable { .. } => EXIT_UNAVAILABLE,
        }
    }

    pub(crate) fn save_failed(target: impl Into<PathBuf>, source: impl Into<SaveFailure>) -> Self {
        Self::SaveFailed {
            target: target.into().display().to_string(),
            source: source.into(),
        }
    }
}
