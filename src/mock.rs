//! Mock camera, sink, decoder and audio implementations for testing the
//! orchestrator without real hardware.

use crate::capture::{DecodeResult, Decoder};
use crate::error::{DecodeError, Result, ScanError};
use crate::frame::{Dimensions, FrameBuffer, FrameFormat};
use crate::media::{
    AudioCue, CameraAccess, MediaStream, StreamConstraints, TrackCapabilities, TrackConstraints,
    TrackSettings, VideoSink, VideoTrack,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Mock video track with scriptable capabilities and constraint handling
pub struct MockVideoTrack {
    id: String,
    label: String,
    live: AtomicBool,
    capabilities: Mutex<TrackCapabilities>,
    capabilities_fail: AtomicBool,
    settings: Mutex<TrackSettings>,
    constraints: Mutex<TrackConstraints>,
    applied: Mutex<Vec<Value>>,
    apply_fail: AtomicBool,
}

impl MockVideoTrack {
    pub fn new<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        Self {
            label: format!("Mock camera track {id}"),
            id,
            live: AtomicBool::new(true),
            capabilities: Mutex::new(TrackCapabilities::new()),
            capabilities_fail: AtomicBool::new(false),
            settings: Mutex::new(TrackSettings::new()),
            constraints: Mutex::new(TrackConstraints::new()),
            applied: Mutex::new(Vec::new()),
            apply_fail: AtomicBool::new(false),
        }
    }

    /// A track whose capability descriptor advertises torch support
    pub fn with_torch<S: Into<String>>(id: S) -> Self {
        let track = Self::new(id);
        track.set_capabilities(json!({ "torch": true }));
        track
    }

    pub fn set_capabilities(&self, capabilities: Value) {
        *self.capabilities.lock() = capabilities.as_object().cloned().unwrap_or_default();
    }

    pub fn set_settings(&self, settings: Value) {
        *self.settings.lock() = settings.as_object().cloned().unwrap_or_default();
    }

    /// Make capability probing fail, as on platforms without introspection
    pub fn fail_capabilities(&self) {
        self.capabilities_fail.store(true, Ordering::SeqCst);
    }

    /// Make `apply_constraints` fail
    pub fn fail_apply(&self) {
        self.apply_fail.store(true, Ordering::SeqCst);
    }

    /// Every constraint dictionary applied to the track, in order
    pub fn applied_constraints(&self) -> Vec<Value> {
        self.applied.lock().clone()
    }
}

impl VideoTrack for MockVideoTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn get_capabilities(&self) -> Result<TrackCapabilities> {
        if self.capabilities_fail.load(Ordering::SeqCst) {
            return Err(ScanError::platform("capabilities are not supported"));
        }
        Ok(self.capabilities.lock().clone())
    }

    fn get_settings(&self) -> TrackSettings {
        self.settings.lock().clone()
    }

    fn get_constraints(&self) -> TrackConstraints {
        self.constraints.lock().clone()
    }

    fn apply_constraints(&self, constraints: &Value) -> Result<()> {
        if self.apply_fail.load(Ordering::SeqCst) {
            return Err(ScanError::platform("applyConstraints is not supported"));
        }
        self.applied.lock().push(constraints.clone());
        Ok(())
    }
}

/// Mock camera access returning a scripted stream or failure
pub struct MockCamera {
    outcome: MockCameraOutcome,
    requests: Mutex<Vec<StreamConstraints>>,
}

enum MockCameraOutcome {
    Stream(MediaStream),
    Failure(String),
}

impl MockCamera {
    /// Always hands out (a clone of) the given stream
    pub fn with_stream(stream: MediaStream) -> Self {
        Self {
            outcome: MockCameraOutcome::Stream(stream),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fails acquisition with the given message
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            outcome: MockCameraOutcome::Failure(message.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of acquisition requests observed
    pub fn acquisitions(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every constraint set requested, in order
    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CameraAccess for MockCamera {
    async fn get_user_media(&self, constraints: &StreamConstraints) -> Result<MediaStream> {
        self.requests.lock().push(constraints.clone());
        match &self.outcome {
            MockCameraOutcome::Stream(stream) => Ok(stream.clone()),
            MockCameraOutcome::Failure(message) => Err(ScanError::acquisition(message.clone())),
        }
    }
}

/// Builds a uuid-identified single-track stream and a camera serving it
pub fn camera_with_single_track() -> (MockCamera, MediaStream, Arc<MockVideoTrack>) {
    let track = Arc::new(MockVideoTrack::new(Uuid::new_v4().to_string()));
    let stream = MediaStream::new(
        Uuid::new_v4().to_string(),
        vec![Arc::clone(&track) as Arc<dyn VideoTrack>],
    );
    (MockCamera::with_stream(stream.clone()), stream, track)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayBehavior {
    /// `play()` starts playback right away
    Immediate,
    /// `play()` only sticks once the can-play signal has fired
    AfterCanPlay,
    /// Playback never starts
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameBehavior {
    Frames,
    IndexSizeError,
    PlatformError,
}

/// Mock video sink with scriptable playback and frame sampling behavior
pub struct MockVideoSink {
    attached: Mutex<Option<MediaStream>>,
    playing: AtomicBool,
    ended: AtomicBool,
    play_behavior: PlayBehavior,
    frame_behavior: Mutex<FrameBehavior>,
    dimensions: Dimensions,
    can_play_tx: watch::Sender<bool>,
    can_play_rx: watch::Receiver<bool>,
}

impl MockVideoSink {
    fn with_play_behavior(play_behavior: PlayBehavior) -> Self {
        let (can_play_tx, can_play_rx) = watch::channel(false);
        Self {
            attached: Mutex::new(None),
            playing: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            play_behavior,
            frame_behavior: Mutex::new(FrameBehavior::Frames),
            dimensions: Dimensions::new(640, 480),
            can_play_tx,
            can_play_rx,
        }
    }

    /// A healthy sink that starts playing as soon as asked
    pub fn new() -> Self {
        Self::with_play_behavior(PlayBehavior::Immediate)
    }

    /// A sink that already reports ended
    pub fn ended() -> Self {
        let sink = Self::new();
        sink.ended.store(true, Ordering::SeqCst);
        sink
    }

    /// A sink that never becomes playable (forces the playback timeout)
    pub fn unplayable() -> Self {
        Self::with_play_behavior(PlayBehavior::Never)
    }

    /// A sink that only plays after `signal_can_play` fires
    pub fn deferred() -> Self {
        Self::with_play_behavior(PlayBehavior::AfterCanPlay)
    }

    /// Fire the can-play signal (sticky, like a readiness state)
    pub fn signal_can_play(&self) {
        let _ = self.can_play_tx.send(true);
    }

    /// Make frame sampling fail with the platform index-range error
    pub fn fail_frames_with_index_size(&self) {
        *self.frame_behavior.lock() = FrameBehavior::IndexSizeError;
    }

    /// Make frame sampling fail with a generic platform error
    pub fn fail_frames(&self) {
        *self.frame_behavior.lock() = FrameBehavior::PlatformError;
    }

    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }

    pub fn attached_stream(&self) -> Option<MediaStream> {
        self.attached.lock().clone()
    }
}

impl Default for MockVideoSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSink for MockVideoSink {
    fn attach(&self, stream: &MediaStream) {
        *self.attached.lock() = Some(stream.clone());
    }

    fn detach(&self) {
        *self.attached.lock() = None;
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    async fn play(&self) -> Result<()> {
        let starts = match self.play_behavior {
            PlayBehavior::Immediate => true,
            PlayBehavior::AfterCanPlay => *self.can_play_rx.borrow(),
            PlayBehavior::Never => false,
        };
        if starts {
            self.playing.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn can_play(&self) {
        let mut receiver = self.can_play_rx.clone();
        // wait_for resolves immediately when the signal already fired
        let _ = receiver.wait_for(|ready| *ready).await;
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn grab_frame(&self) -> Result<FrameBuffer> {
        match *self.frame_behavior.lock() {
            FrameBehavior::Frames => {
                let len = self.dimensions.width as usize * self.dimensions.height as usize;
                Ok(FrameBuffer::new(
                    vec![0u8; len],
                    self.dimensions.width,
                    self.dimensions.height,
                    FrameFormat::Luma8,
                ))
            }
            FrameBehavior::IndexSizeError => Err(ScanError::index_size(
                "the source area is outside the source image",
            )),
            FrameBehavior::PlatformError => Err(ScanError::platform("frame sampling failed")),
        }
    }
}

/// Decoder replaying a scripted sequence of results.
///
/// When the sequence is exhausted the last entry repeats, so a short script
/// drives an arbitrarily long loop.
pub struct ScriptedDecoder {
    script: Mutex<VecDeque<std::result::Result<DecodeResult, DecodeError>>>,
    last: Mutex<Option<std::result::Result<DecodeResult, DecodeError>>>,
    calls: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn sequence(script: Vec<std::result::Result<DecodeResult, DecodeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn repeating(item: std::result::Result<DecodeResult, DecodeError>) -> Self {
        Self::sequence(vec![item])
    }

    /// Number of decode invocations observed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(
        &self,
        _frame: &FrameBuffer,
        _hints: Option<&Value>,
    ) -> std::result::Result<DecodeResult, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(next) = self.script.lock().pop_front() {
            *self.last.lock() = Some(next.clone());
            return next;
        }

        self.last
            .lock()
            .clone()
            .unwrap_or(Err(DecodeError::NotFound))
    }
}

/// Mock audio cue counting plays and pauses
pub struct MockAudio {
    plays: AtomicUsize,
    pauses: AtomicUsize,
    play_fail: AtomicBool,
}

impl MockAudio {
    pub fn new() -> Self {
        Self {
            plays: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            play_fail: AtomicBool::new(false),
        }
    }

    /// A cue whose playback always fails
    pub fn failing() -> Self {
        let audio = Self::new();
        audio.play_fail.store(true, Ordering::SeqCst);
        audio
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

impl Default for MockAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCue for MockAudio {
    fn play(&self) -> Result<()> {
        if self.play_fail.load(Ordering::SeqCst) {
            return Err(ScanError::platform("audio playback rejected"));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}
