use crate::error::{Result, ScanError};
use crate::lifecycle::StreamHandle;
use crate::media::{TrackCapabilities, TrackConstraints, TrackSettings, VideoTrack};
use crate::scan_loop::ScanLoop;
use serde_json::Value;
use std::sync::Arc;

/// Caller-facing controls over one live scanning pipeline.
///
/// Returned once a stream is live; owned by the coordinator and handed out
/// by reference. The coordinator may invalidate it at any time by stopping
/// internally, after which stored references are inert: every call either
/// no-ops (`stop`) or operates on already-stopped tracks.
pub struct ControlHandle {
    scan_loop: ScanLoop,
    stream_handle: Arc<StreamHandle>,
}

impl ControlHandle {
    pub(crate) fn new(scan_loop: ScanLoop, stream_handle: Arc<StreamHandle>) -> Self {
        Self {
            scan_loop,
            stream_handle,
        }
    }

    /// Stop the scan loop and release the stream.
    ///
    /// Release runs through the loop's finalize callback, so it executes
    /// exactly once even when the loop already terminated via a fatal
    /// outcome before this call.
    pub fn stop(&self) {
        self.scan_loop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.scan_loop.is_stopped()
    }

    /// Whether a torch-capable track was found at acquisition
    pub fn has_torch(&self) -> bool {
        self.stream_handle.has_torch()
    }

    /// Switch the torch; fails with `NoTorchTrack` when the stream has none
    pub fn switch_torch(&self, on: bool) -> Result<()> {
        self.stream_handle.switch_torch(on)
    }

    /// Constraints of the first track matching the filter
    pub fn video_constraints<F>(&self, filter: F) -> Result<TrackConstraints>
    where
        F: Fn(&dyn VideoTrack) -> bool,
    {
        Ok(self.find_track(filter)?.get_constraints())
    }

    /// Settings of the first track matching the filter
    pub fn video_settings<F>(&self, filter: F) -> Result<TrackSettings>
    where
        F: Fn(&dyn VideoTrack) -> bool,
    {
        Ok(self.find_track(filter)?.get_settings())
    }

    /// Capabilities of the first track matching the filter
    pub fn video_capabilities<F>(&self, filter: F) -> Result<TrackCapabilities>
    where
        F: Fn(&dyn VideoTrack) -> bool,
    {
        self.find_track(filter)?.get_capabilities()
    }

    /// Apply constraints to every track matching the filter
    pub fn apply_video_constraints<F>(&self, constraints: &Value, filter: F) -> Result<()>
    where
        F: Fn(&dyn VideoTrack) -> bool,
    {
        let tracks: Vec<_> = self
            .stream_handle
            .stream()
            .video_tracks()
            .iter()
            .filter(|track| filter(track.as_ref()))
            .cloned()
            .collect();

        if tracks.is_empty() {
            return Err(ScanError::NoMatchingTrack);
        }

        for track in tracks {
            track.apply_constraints(constraints)?;
        }

        Ok(())
    }

    fn find_track<F>(&self, filter: F) -> Result<Arc<dyn VideoTrack>>
    where
        F: Fn(&dyn VideoTrack) -> bool,
    {
        self.stream_handle
            .stream()
            .video_tracks()
            .iter()
            .find(|track| filter(track.as_ref()))
            .cloned()
            .ok_or(ScanError::NoMatchingTrack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::lifecycle::StreamLifecycle;
    use crate::media::MediaStream;
    use crate::mock::{MockVideoSink, MockVideoTrack, ScriptedDecoder};
    use serde_json::json;
    use std::time::Duration;

    async fn control_with_tracks(tracks: Vec<Arc<MockVideoTrack>>) -> ControlHandle {
        let stream = MediaStream::new(
            "controls-test",
            tracks
                .into_iter()
                .map(|track| track as Arc<dyn VideoTrack>)
                .collect(),
        );
        let sink = Arc::new(MockVideoSink::new());
        let lifecycle = StreamLifecycle::new(Duration::from_millis(100));
        let handle = Arc::new(lifecycle.attach(stream, sink.clone()).await.unwrap());

        let scan_loop = ScanLoop::spawn(
            sink,
            Arc::new(ScriptedDecoder::repeating(Err(DecodeError::NotFound))),
            None,
            Duration::from_millis(500),
            Duration::from_millis(500),
            Arc::new(|_: &crate::capture::DecodeOutcome| {}),
            Box::new(|| {}),
        );

        ControlHandle::new(scan_loop, handle)
    }

    #[tokio::test]
    async fn test_accessors_fail_without_matching_track() {
        let control = control_with_tracks(vec![Arc::new(MockVideoTrack::new("track-0"))]).await;

        let result = control.video_settings(|track| track.id() == "no-such-track");
        assert!(matches!(result, Err(ScanError::NoMatchingTrack)));

        let result = control.apply_video_constraints(&json!({ "zoom": 2 }), |_| false);
        assert!(matches!(result, Err(ScanError::NoMatchingTrack)));

        control.stop();
    }

    #[tokio::test]
    async fn test_accessors_select_filtered_track() {
        let track = Arc::new(MockVideoTrack::new("track-0"));
        track.set_settings(json!({ "frameRate": 30 }));
        let control = control_with_tracks(vec![track.clone()]).await;

        let settings = control.video_settings(|track| track.id() == "track-0").unwrap();
        assert_eq!(settings["frameRate"], json!(30));

        control
            .apply_video_constraints(&json!({ "zoom": 2 }), |_| true)
            .unwrap();
        assert_eq!(track.applied_constraints(), vec![json!({ "zoom": 2 })]);

        control.stop();
    }

    #[tokio::test]
    async fn test_switch_torch_without_capability_fails() {
        let control = control_with_tracks(vec![Arc::new(MockVideoTrack::new("track-0"))]).await;

        assert!(!control.has_torch());
        assert!(matches!(
            control.switch_torch(true),
            Err(ScanError::NoTorchTrack)
        ));

        control.stop();
    }

    #[tokio::test]
    async fn test_stop_marks_handle_stopped() {
        let control = control_with_tracks(vec![Arc::new(MockVideoTrack::new("track-0"))]).await;

        assert!(!control.is_stopped());
        control.stop();
        control.stop();
        assert!(control.is_stopped());
    }
}
