use std::time::Duration;
use thiserror::Error;

/// Errors produced by the external decode capability.
///
/// `NotFound`, `Checksum` and `Format` are the expected, frequent failures of
/// scanning a frame that happens not to contain a readable code. Everything
/// else arrives as `Other`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("No code was found in the frame")]
    NotFound,

    #[error("A code was found but its checksum did not validate")]
    Checksum,

    #[error("A code was found but could not be parsed in its format")]
    Format,

    #[error("Decoder error: {message}")]
    Other { message: String },
}

impl DecodeError {
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Camera acquisition failed: {details}")]
    Acquisition { details: String },

    #[error("Video sink reported ended before playback")]
    VideoEnded,

    #[error("Video sink did not become playable within {timeout:?}")]
    PlaybackTimeout { timeout: Duration },

    #[error("Capture surface is not available")]
    SurfaceUnavailable,

    #[error("No torch-capable track available")]
    NoTorchTrack,

    #[error("No track matched the supplied filter")]
    NoMatchingTrack,

    #[error("Index out of range while capturing frame: {details}")]
    IndexSize { details: String },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Platform error: {details}")]
    Platform { details: String },
}

impl ScanError {
    pub fn acquisition<S: Into<String>>(details: S) -> Self {
        Self::Acquisition {
            details: details.into(),
        }
    }

    pub fn platform<S: Into<String>>(details: S) -> Self {
        Self::Platform {
            details: details.into(),
        }
    }

    pub fn index_size<S: Into<String>>(details: S) -> Self {
        Self::IndexSize {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
