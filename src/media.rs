use crate::error::Result;
use crate::frame::{Dimensions, FrameBuffer};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Opaque per-track constraint dictionary, as reported by the platform
pub type TrackConstraints = Map<String, Value>;
/// Opaque per-track settings dictionary, as reported by the platform
pub type TrackSettings = Map<String, Value>;
/// Opaque per-track capability dictionary, as reported by the platform
pub type TrackCapabilities = Map<String, Value>;

/// Constraints handed to camera acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConstraints {
    /// Video track constraints (opaque platform dictionary)
    pub video: Value,
    /// Whether an audio track is requested (always false for scanning)
    pub audio: bool,
}

impl StreamConstraints {
    /// Constraints for a video-only stream with the given track constraints
    pub fn video(constraints: Value) -> Self {
        Self {
            video: constraints,
            audio: false,
        }
    }

    /// Exact-match constraints for a specific camera device
    pub fn device(device_id: &str) -> Self {
        Self::video(json!({ "deviceId": { "exact": device_id } }))
    }

    /// Default constraints preferring the rear/environment-facing camera
    pub fn environment_facing() -> Self {
        Self::video(json!({ "facingMode": "environment" }))
    }
}

/// A single live video track of an acquired camera stream.
///
/// Capability, settings and constraint dictionaries are kept opaque; the
/// orchestrator only ever inspects the presence of a `torch` capability key.
pub trait VideoTrack: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str;

    /// Permanently stop the track, releasing the camera hardware behind it
    fn stop(&self);

    /// Whether the track is still live (not stopped or otherwise ended)
    fn is_live(&self) -> bool;

    /// Query the track's capability descriptor.
    ///
    /// May fail on platforms that do not implement capability introspection;
    /// callers treat such failures as "capability absent", never as fatal.
    fn get_capabilities(&self) -> Result<TrackCapabilities>;

    fn get_settings(&self) -> TrackSettings;

    fn get_constraints(&self) -> TrackConstraints;

    /// Apply new constraints to the live track (e.g. torch on/off)
    fn apply_constraints(&self, constraints: &Value) -> Result<()>;
}

/// An acquired camera stream: a platform stream id plus its video tracks.
///
/// Cloning is shallow; clones refer to the same underlying tracks, so the
/// global registry can hold a clone without owning the hardware twice.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn new<S: Into<String>>(id: S, tracks: Vec<Arc<dyn VideoTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn video_tracks(&self) -> &[Arc<dyn VideoTrack>] {
        &self.tracks
    }

    /// Stop every track of the stream
    pub fn stop_all_tracks(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Whether any track of the stream is still live
    pub fn has_live_track(&self) -> bool {
        self.tracks.iter().any(|track| track.is_live())
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Platform camera access (the `getUserMedia` capability)
#[async_trait]
pub trait CameraAccess: Send + Sync {
    /// Request a camera stream matching the given constraints
    async fn get_user_media(&self, constraints: &StreamConstraints) -> Result<MediaStream>;
}

/// A video sink the acquired stream is rendered into and sampled from.
///
/// `can_play` resolves when the sink signals readiness; the lifecycle manager
/// races it against the playback timeout.
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Bind the stream as the sink's media source
    fn attach(&self, stream: &MediaStream);

    /// Clear the sink's media source reference
    fn detach(&self);

    fn is_playing(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Ask the sink to start playback
    async fn play(&self) -> Result<()>;

    /// Resolve once the sink reports it can play
    async fn can_play(&self);

    fn dimensions(&self) -> Dimensions;

    /// Sample the current video frame
    fn grab_frame(&self) -> Result<FrameBuffer>;
}

/// Optional audio feedback cue played on successful scans
pub trait AudioCue: Send + Sync {
    fn play(&self) -> Result<()>;

    fn pause(&self);
}
