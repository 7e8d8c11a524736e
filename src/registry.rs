use crate::media::MediaStream;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Process-wide registry of every acquired camera stream.
///
/// Exists so camera hardware can be reclaimed even when a coordinator
/// instance is discarded without calling stop. Empty on process start; all
/// mutation goes through `register`/`unregister`/`release_all`.
static STREAM_REGISTRY: Mutex<Vec<MediaStream>> = Mutex::new(Vec::new());

pub struct StreamRegistry;

impl StreamRegistry {
    /// Track a freshly acquired stream
    pub fn register(stream: &MediaStream) {
        debug!(stream_id = stream.id(), "Registering stream");
        STREAM_REGISTRY.lock().push(stream.clone());
    }

    /// Stop tracking a stream without touching its tracks
    pub fn unregister(stream: &MediaStream) {
        let mut registry = STREAM_REGISTRY.lock();
        registry.retain(|tracked| tracked.id() != stream.id());
        debug!(stream_id = stream.id(), "Unregistered stream");
    }

    /// Stop every track of every tracked stream and clear the registry
    pub fn release_all() {
        let streams = {
            let mut registry = STREAM_REGISTRY.lock();
            std::mem::take(&mut *registry)
        };

        if streams.is_empty() {
            return;
        }

        info!(count = streams.len(), "Releasing all tracked camera streams");

        for stream in streams {
            stream.stop_all_tracks();
        }
    }

    pub fn contains(stream_id: &str) -> bool {
        STREAM_REGISTRY
            .lock()
            .iter()
            .any(|tracked| tracked.id() == stream_id)
    }

    pub fn len() -> usize {
        STREAM_REGISTRY.lock().len()
    }

    pub fn is_empty() -> bool {
        STREAM_REGISTRY.lock().is_empty()
    }
}

/// Serializes tests that touch the process-wide registry.
#[cfg(test)]
pub(crate) fn test_lock() -> parking_lot::MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());
    GUARD.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VideoTrack;
    use crate::mock::MockVideoTrack;
    use std::sync::Arc;

    fn test_stream(id: &str) -> (MediaStream, Arc<MockVideoTrack>) {
        let track = Arc::new(MockVideoTrack::new("track-0"));
        let stream = MediaStream::new(id, vec![track.clone()]);
        (stream, track)
    }

    #[test]
    fn test_register_unregister() {
        let _guard = test_lock();
        let (stream, _track) = test_stream("registry-reg");

        StreamRegistry::register(&stream);
        assert!(StreamRegistry::contains("registry-reg"));

        StreamRegistry::unregister(&stream);
        assert!(!StreamRegistry::contains("registry-reg"));
        // Unregister never stops tracks
        assert!(stream.has_live_track());
    }

    #[test]
    fn test_release_all_stops_tracks_and_empties() {
        let _guard = test_lock();
        let (stream_a, track_a) = test_stream("registry-sweep-a");
        let (stream_b, track_b) = test_stream("registry-sweep-b");

        StreamRegistry::register(&stream_a);
        StreamRegistry::register(&stream_b);

        StreamRegistry::release_all();

        assert!(!StreamRegistry::contains("registry-sweep-a"));
        assert!(!StreamRegistry::contains("registry-sweep-b"));
        assert!(!track_a.is_live());
        assert!(!track_b.is_live());
    }
}
