use crate::capture::{classify_decode, CaptureSurface, DecodeOutcome, Decoder};
use crate::error::ScanError;
use crate::media::VideoSink;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Observes every classified outcome, in cycle order
pub type OutcomeCallback = Arc<dyn Fn(&DecodeOutcome) + Send + Sync>;

/// Runs exactly once when the loop terminates, on every exit path
pub type FinalizeCallback = Box<dyn FnOnce() + Send>;

/// State shared between the loop task and its handle.
///
/// The token is the single cancellation primitive: cancelling it clears any
/// pending inter-cycle sleep and suppresses further outcome delivery. The
/// finalize callback is `take`n, so it runs at most once no matter how many
/// paths race to terminate the loop.
struct LoopShared {
    token: CancellationToken,
    surface: Mutex<CaptureSurface>,
    finalize: Mutex<Option<FinalizeCallback>>,
}

impl LoopShared {
    fn finalize_once(&self) {
        let finalize = self.finalize.lock().take();
        if let Some(finalize) = finalize {
            debug!("Finalizing scan loop");
            finalize();
        }
    }

    fn stop(&self) {
        self.token.cancel();
        self.surface.lock().dispose();
        self.finalize_once();
    }
}

/// The polling engine: paints a frame, decodes it, classifies the outcome and
/// schedules the next attempt with an outcome-dependent delay.
///
/// Two states: running and stopped. Stopped is terminal; scanning again means
/// spawning a fresh loop. Decode attempts never overlap because the next
/// cycle is scheduled only after the previous one fully resolved.
pub struct ScanLoop {
    shared: Arc<LoopShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScanLoop {
    /// Spawn the loop against an attached, playing sink.
    ///
    /// `on_outcome` observes every classified cycle outcome; `finalize` runs
    /// exactly once when the loop terminates, whether via `stop` or a fatal
    /// outcome.
    pub fn spawn(
        sink: Arc<dyn VideoSink>,
        decoder: Arc<dyn Decoder>,
        decode_hints: Option<Value>,
        delay_between_scan_attempts: Duration,
        delay_between_scan_success: Duration,
        on_outcome: OutcomeCallback,
        finalize: FinalizeCallback,
    ) -> Self {
        let shared = Arc::new(LoopShared {
            token: CancellationToken::new(),
            surface: Mutex::new(CaptureSurface::new()),
            finalize: Mutex::new(Some(finalize)),
        });

        let task = LoopTask {
            shared: Arc::clone(&shared),
            sink,
            decoder,
            decode_hints,
            delay_between_scan_attempts,
            delay_between_scan_success,
            on_outcome,
        };

        let handle = tokio::spawn(task.run());

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the loop: cancel any pending cycle, dispose the capture surface
    /// and run the finalize callback.
    ///
    /// Idempotent; calling it again, or after the loop already terminated via
    /// a fatal outcome, has no further effect. Once this returns, no outcome
    /// callback fires.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Whether the loop has been stopped or terminated fatally
    pub fn is_stopped(&self) -> bool {
        self.shared.token.is_cancelled() || self.shared.finalize.lock().is_none()
    }

    /// Wait for the loop task to wind down (test support)
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

struct LoopTask {
    shared: Arc<LoopShared>,
    sink: Arc<dyn VideoSink>,
    decoder: Arc<dyn Decoder>,
    decode_hints: Option<Value>,
    delay_between_scan_attempts: Duration,
    delay_between_scan_success: Duration,
    on_outcome: OutcomeCallback,
}

impl LoopTask {
    async fn run(self) {
        debug!("Scan loop started");

        loop {
            if self.shared.token.is_cancelled() {
                break;
            }

            let outcome = self.cycle();

            let next_delay = match &outcome {
                DecodeOutcome::Success(_) => Some(self.delay_between_scan_success),
                DecodeOutcome::Recoverable { .. } => Some(self.delay_between_scan_attempts),
                DecodeOutcome::Fatal(_) => None,
            };

            if self.shared.token.is_cancelled() {
                // stop() raced in during the cycle; it already finalized
                break;
            }

            trace!(?outcome, "Scan cycle resolved");
            (self.on_outcome)(&outcome);

            match next_delay {
                Some(delay) => {
                    tokio::select! {
                        _ = self.shared.token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    self.shared.surface.lock().dispose();
                    self.shared.finalize_once();
                    break;
                }
            }
        }

        debug!("Scan loop stopped");
    }

    /// One scan cycle: paint the current frame and classify the decode
    fn cycle(&self) -> DecodeOutcome {
        let mut surface = self.shared.surface.lock();

        if surface.is_disposed() {
            return DecodeOutcome::Fatal(ScanError::SurfaceUnavailable);
        }

        if let Err(error) = surface.paint_from(self.sink.as_ref()) {
            return DecodeOutcome::Fatal(error);
        }

        match surface.frame() {
            Some(frame) => classify_decode(self.decoder.decode(frame, self.decode_hints.as_ref())),
            None => DecodeOutcome::Fatal(ScanError::SurfaceUnavailable),
        }
    }
}
