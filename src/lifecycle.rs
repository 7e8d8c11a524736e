use crate::error::{Result, ScanError};
use crate::media::{CameraAccess, MediaStream, StreamConstraints, VideoSink, VideoTrack};
use crate::registry::StreamRegistry;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// An acquired camera stream bound to its video sink.
///
/// Torch capability is probed once, at acquisition; the probed track is the
/// one torch commands are sent to for the lifetime of the handle.
pub struct StreamHandle {
    stream: MediaStream,
    sink: Arc<dyn VideoSink>,
    torch_track: Option<Arc<dyn VideoTrack>>,
}

impl StreamHandle {
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn sink(&self) -> &Arc<dyn VideoSink> {
        &self.sink
    }

    pub fn has_torch(&self) -> bool {
        self.torch_track.is_some()
    }

    /// Switch the torch on or off; fails when no torch-capable track was
    /// found at acquisition
    pub fn switch_torch(&self, on: bool) -> Result<()> {
        let track = self.torch_track.as_ref().ok_or(ScanError::NoTorchTrack)?;
        set_torch(track.as_ref(), on)
    }
}

/// Acquires camera streams, binds them to a sink and guarantees their
/// teardown in a fixed order on every exit path.
pub struct StreamLifecycle {
    playback_timeout: Duration,
}

impl StreamLifecycle {
    pub fn new(playback_timeout: Duration) -> Self {
        Self { playback_timeout }
    }

    /// Request camera access for the given constraints.
    ///
    /// The stream is registered in the global registry only after acquisition
    /// succeeded, so a failure leaves no partial registration behind.
    pub async fn acquire(
        &self,
        camera: &dyn CameraAccess,
        constraints: &StreamConstraints,
    ) -> Result<MediaStream> {
        debug!(?constraints, "Requesting camera stream");

        let stream = camera.get_user_media(constraints).await?;
        StreamRegistry::register(&stream);

        info!(
            stream_id = stream.id(),
            tracks = stream.video_tracks().len(),
            "Camera stream acquired"
        );

        Ok(stream)
    }

    /// Bind the stream to the sink and wait for it to become playable.
    ///
    /// Fails immediately with `VideoEnded` if the sink already reports ended.
    /// Otherwise the sink's can-play signal is raced against the playback
    /// timeout; whichever resolves first wins and the other side is torn
    /// down with it.
    pub async fn attach(
        &self,
        stream: MediaStream,
        sink: Arc<dyn VideoSink>,
    ) -> Result<StreamHandle> {
        if sink.is_ended() {
            return Err(ScanError::VideoEnded);
        }

        sink.attach(&stream);
        self.wait_until_playing(sink.as_ref()).await?;

        let torch_track = probe_torch_track(&stream);
        debug!(
            stream_id = stream.id(),
            torch = torch_track.is_some(),
            "Stream attached and playing"
        );

        Ok(StreamHandle {
            stream,
            sink,
            torch_track,
        })
    }

    async fn wait_until_playing(&self, sink: &dyn VideoSink) -> Result<()> {
        if sink.is_playing() {
            return Ok(());
        }

        sink.play().await?;
        if sink.is_playing() {
            return Ok(());
        }

        match timeout(self.playback_timeout, sink.can_play()).await {
            Ok(()) => {
                // The can-play event won the race; a play attempt is now
                // expected to stick.
                sink.play().await?;
                Ok(())
            }
            Err(_) if sink.is_playing() => Ok(()),
            Err(_) => Err(ScanError::PlaybackTimeout {
                timeout: self.playback_timeout,
            }),
        }
    }

    /// Release the stream in a fixed order: best-effort torch-off, stop all
    /// tracks, detach the sink's source, drop the registry entry.
    ///
    /// A torch-off failure is swallowed; the remaining steps always run.
    pub fn release(&self, handle: &StreamHandle) {
        if let Err(error) = handle.switch_torch(false) {
            match error {
                ScanError::NoTorchTrack => {}
                error => warn!(%error, "Torch-off failed during release"),
            }
        }

        handle.stream.stop_all_tracks();
        handle.sink.detach();
        StreamRegistry::unregister(&handle.stream);

        info!(stream_id = handle.stream.id(), "Camera stream released");
    }
}

/// Find the first torch-capable track of the stream.
///
/// A track is torch-capable iff its capability descriptor contains a `torch`
/// entry. Capability probing failures count as "not capable", never fatal.
pub fn probe_torch_track(stream: &MediaStream) -> Option<Arc<dyn VideoTrack>> {
    stream
        .video_tracks()
        .iter()
        .find(|track| track_has_torch(track.as_ref()))
        .cloned()
}

fn track_has_torch(track: &dyn VideoTrack) -> bool {
    match track.get_capabilities() {
        Ok(capabilities) => capabilities.contains_key("torch"),
        Err(error) => {
            warn!(
                track_id = track.id(),
                %error,
                "Capability probe failed, torch will not be available"
            );
            false
        }
    }
}

/// Apply the torch on/off constraint to a track
pub fn set_torch(track: &dyn VideoTrack, on: bool) -> Result<()> {
    track.apply_constraints(&json!({
        "advanced": [{
            "fillLightMode": if on { "flash" } else { "off" },
            "torch": on,
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCamera, MockVideoSink, MockVideoTrack};
    use crate::registry;

    fn lifecycle() -> StreamLifecycle {
        StreamLifecycle::new(Duration::from_millis(10_000))
    }

    fn stream_with_tracks(id: &str, tracks: Vec<Arc<MockVideoTrack>>) -> MediaStream {
        MediaStream::new(
            id,
            tracks
                .into_iter()
                .map(|track| track as Arc<dyn VideoTrack>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_acquire_registers_stream() {
        let _guard = registry::test_lock();
        let stream = stream_with_tracks(
            "lifecycle-acquire",
            vec![Arc::new(MockVideoTrack::new("track-0"))],
        );
        let camera = MockCamera::with_stream(stream.clone());

        let acquired = lifecycle()
            .acquire(&camera, &StreamConstraints::environment_facing())
            .await
            .unwrap();

        assert_eq!(acquired.id(), "lifecycle-acquire");
        assert!(StreamRegistry::contains("lifecycle-acquire"));

        StreamRegistry::unregister(&acquired);
    }

    #[tokio::test]
    async fn test_acquire_failure_leaves_no_registration() {
        let _guard = registry::test_lock();
        let camera = MockCamera::failing("permission denied");
        let before = StreamRegistry::len();

        let result = lifecycle()
            .acquire(&camera, &StreamConstraints::environment_facing())
            .await;

        assert!(matches!(result, Err(ScanError::Acquisition { .. })));
        assert_eq!(StreamRegistry::len(), before);
    }

    #[tokio::test]
    async fn test_attach_ended_sink_fails_immediately() {
        let stream = stream_with_tracks(
            "lifecycle-ended",
            vec![Arc::new(MockVideoTrack::new("track-0"))],
        );
        let sink = Arc::new(MockVideoSink::ended());

        let result = lifecycle().attach(stream, sink).await;
        assert!(matches!(result, Err(ScanError::VideoEnded)));
    }

    #[tokio::test]
    async fn test_attach_plays_and_probes_torch() {
        let torch_track = Arc::new(MockVideoTrack::with_torch("torch-track"));
        let stream = stream_with_tracks("lifecycle-attach", vec![torch_track]);
        let sink = Arc::new(MockVideoSink::new());

        let handle = lifecycle().attach(stream, sink.clone()).await.unwrap();

        assert!(sink.is_attached());
        assert!(sink.is_playing());
        assert!(handle.has_torch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_times_out_when_never_playable() {
        let stream = stream_with_tracks(
            "lifecycle-timeout",
            vec![Arc::new(MockVideoTrack::new("track-0"))],
        );
        let sink = Arc::new(MockVideoSink::unplayable());

        let result = StreamLifecycle::new(Duration::from_millis(100))
            .attach(stream, sink)
            .await;

        assert!(matches!(result, Err(ScanError::PlaybackTimeout { .. })));
    }

    #[tokio::test]
    async fn test_attach_resolves_on_can_play_signal() {
        let stream = stream_with_tracks(
            "lifecycle-canplay",
            vec![Arc::new(MockVideoTrack::new("track-0"))],
        );
        let sink = Arc::new(MockVideoSink::deferred());

        let attach_sink = sink.clone();
        let attach = tokio::spawn(async move {
            StreamLifecycle::new(Duration::from_secs(5))
                .attach(stream, attach_sink)
                .await
        });

        tokio::task::yield_now().await;
        sink.signal_can_play();

        let handle = attach.await.unwrap().unwrap();
        assert!(handle.sink().is_playing());
    }

    #[tokio::test]
    async fn test_release_fixed_order_survives_torch_failure() {
        let _guard = registry::test_lock();
        let torch_track = Arc::new(MockVideoTrack::with_torch("torch-track"));
        torch_track.fail_apply();
        let stream = stream_with_tracks("lifecycle-release", vec![torch_track.clone()]);
        let sink = Arc::new(MockVideoSink::new());

        StreamRegistry::register(&stream);
        let lifecycle = lifecycle();
        let handle = lifecycle.attach(stream, sink.clone()).await.unwrap();

        lifecycle.release(&handle);

        // Torch-off failed, but every later step still ran
        assert!(!torch_track.is_live());
        assert!(!sink.is_attached());
        assert!(!StreamRegistry::contains("lifecycle-release"));
    }

    #[tokio::test]
    async fn test_release_turns_torch_off() {
        let _guard = registry::test_lock();
        let torch_track = Arc::new(MockVideoTrack::with_torch("torch-track"));
        let stream = stream_with_tracks("lifecycle-torch-off", vec![torch_track.clone()]);
        let sink = Arc::new(MockVideoSink::new());

        StreamRegistry::register(&stream);
        let lifecycle = lifecycle();
        let handle = lifecycle.attach(stream, sink).await.unwrap();

        handle.switch_torch(true).unwrap();
        lifecycle.release(&handle);

        let applied = torch_track.applied_constraints();
        let torch_values: Vec<bool> = applied
            .iter()
            .map(|value| value["advanced"][0]["torch"].as_bool().unwrap())
            .collect();
        assert_eq!(torch_values, vec![true, false]);
    }

    #[test]
    fn test_torch_probe_failure_means_not_capable() {
        let track = Arc::new(MockVideoTrack::with_torch("broken-track"));
        track.fail_capabilities();
        let stream = stream_with_tracks("lifecycle-probe", vec![track]);

        assert!(probe_torch_track(&stream).is_none());
    }

    #[test]
    fn test_switch_torch_without_torch_track_fails() {
        let handle = StreamHandle {
            stream: stream_with_tracks(
                "lifecycle-no-torch",
                vec![Arc::new(MockVideoTrack::new("track-0"))],
            ),
            sink: Arc::new(MockVideoSink::new()),
            torch_track: None,
        };

        assert!(matches!(
            handle.switch_torch(true),
            Err(ScanError::NoTorchTrack)
        ));
    }
}
