pub mod capture;
pub mod config;
pub mod controls;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod media;
pub mod mock;
pub mod registry;
pub mod scan_loop;
pub mod scanner;

pub use capture::{classify_decode, CaptureSurface, DecodeOutcome, DecodeResult, Decoder, RecoverableKind};
pub use config::ScanOptions;
pub use controls::ControlHandle;
pub use error::{DecodeError, Result, ScanError};
pub use frame::{Dimensions, FrameBuffer, FrameFormat};
pub use lifecycle::{probe_torch_track, set_torch, StreamHandle, StreamLifecycle};
pub use media::{
    AudioCue, CameraAccess, MediaStream, StreamConstraints, TrackCapabilities, TrackConstraints,
    TrackSettings, VideoSink, VideoTrack,
};
pub use registry::StreamRegistry;
pub use scan_loop::{FinalizeCallback, OutcomeCallback, ScanLoop};
pub use scanner::{ContinuousScanner, ContinuousScannerBuilder, ErrorCallback, ResultCallback};
