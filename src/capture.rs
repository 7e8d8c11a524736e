use crate::error::{DecodeError, Result, ScanError};
use crate::frame::FrameBuffer;
use crate::media::VideoSink;
use serde_json::Value;
use tracing::trace;

/// Decoder message that signals "no reader detected a code" without using
/// the dedicated not-found variant.
const NO_READER_DETECTED: &str = "able to detect the code";

/// A successfully decoded visual code
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Decoded text payload
    pub text: String,
    /// Raw decoded bytes
    pub raw_bytes: Vec<u8>,
    /// Symbology name as reported by the decoder, when known
    pub format: Option<String>,
}

impl DecodeResult {
    pub fn new<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        let raw_bytes = text.as_bytes().to_vec();
        Self {
            text,
            raw_bytes,
            format: None,
        }
    }

    pub fn with_format<S: Into<String>>(mut self, format: S) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// The external decode capability invoked once per scan cycle
pub trait Decoder: Send + Sync {
    fn decode(
        &self,
        frame: &FrameBuffer,
        hints: Option<&Value>,
    ) -> std::result::Result<DecodeResult, DecodeError>;
}

/// Expected, non-fatal decode failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableKind {
    NotFound,
    Checksum,
    Format,
}

/// Classified result of one scan cycle.
///
/// Classification happens exactly once, at the boundary where the decode
/// capability is invoked; downstream code matches on the discriminant and
/// never inspects error types again.
#[derive(Debug)]
pub enum DecodeOutcome {
    Success(DecodeResult),
    Recoverable {
        kind: RecoverableKind,
        error: DecodeError,
    },
    Fatal(ScanError),
}

/// Classify a raw decoder result into a `DecodeOutcome`.
///
/// The decoder's own "no reader was able to detect the code" message counts
/// as a recoverable not-found, matching the dedicated variant.
pub fn classify_decode(result: std::result::Result<DecodeResult, DecodeError>) -> DecodeOutcome {
    match result {
        Ok(decoded) => DecodeOutcome::Success(decoded),
        Err(error) => {
            let kind = match &error {
                DecodeError::NotFound => Some(RecoverableKind::NotFound),
                DecodeError::Checksum => Some(RecoverableKind::Checksum),
                DecodeError::Format => Some(RecoverableKind::Format),
                DecodeError::Other { message } if message.contains(NO_READER_DETECTED) => {
                    Some(RecoverableKind::NotFound)
                }
                DecodeError::Other { .. } => None,
            };

            match kind {
                Some(kind) => DecodeOutcome::Recoverable { kind, error },
                None => DecodeOutcome::Fatal(ScanError::Decode(error)),
            }
        }
    }
}

/// Off-screen sampling surface refreshed from the live video each cycle.
///
/// Disposed exactly once, either by `stop` or by the fatal path of the scan
/// loop; painting a disposed surface fails with `SurfaceUnavailable` so a
/// racing cycle terminates instead of scheduling further work.
#[derive(Debug, Default)]
pub struct CaptureSurface {
    frame: Option<FrameBuffer>,
    disposed: bool,
}

impl CaptureSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the sink's current frame into the surface
    pub fn paint_from(&mut self, sink: &dyn VideoSink) -> Result<()> {
        if self.disposed {
            return Err(ScanError::SurfaceUnavailable);
        }

        let frame = sink.grab_frame()?;
        trace!(
            width = frame.width,
            height = frame.height,
            "Painted frame into capture surface"
        );
        self.frame = Some(frame);

        Ok(())
    }

    /// The most recently painted frame, if any
    pub fn frame(&self) -> Option<&FrameBuffer> {
        self.frame.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Drop the drawing context; later paints fail with `SurfaceUnavailable`
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let outcome = classify_decode(Ok(DecodeResult::new("hello")));
        assert!(matches!(outcome, DecodeOutcome::Success(r) if r.text == "hello"));
    }

    #[test]
    fn test_classify_recoverable_variants() {
        for (error, expected) in [
            (DecodeError::NotFound, RecoverableKind::NotFound),
            (DecodeError::Checksum, RecoverableKind::Checksum),
            (DecodeError::Format, RecoverableKind::Format),
        ] {
            let outcome = classify_decode(Err(error));
            assert!(matches!(
                outcome,
                DecodeOutcome::Recoverable { kind, .. } if kind == expected
            ));
        }
    }

    #[test]
    fn test_classify_no_reader_message_is_recoverable() {
        let error = DecodeError::other("No readers were able to detect the code.");
        let outcome = classify_decode(Err(error));
        assert!(matches!(
            outcome,
            DecodeOutcome::Recoverable {
                kind: RecoverableKind::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_other_is_fatal() {
        let outcome = classify_decode(Err(DecodeError::other("decoder crashed")));
        assert!(matches!(
            outcome,
            DecodeOutcome::Fatal(ScanError::Decode(DecodeError::Other { .. }))
        ));
    }

    #[test]
    fn test_disposed_surface_rejects_paint() {
        use crate::mock::MockVideoSink;

        let sink = MockVideoSink::new();
        let mut surface = CaptureSurface::new();
        surface.dispose();

        assert!(surface.is_disposed());
        assert!(matches!(
            surface.paint_from(&sink),
            Err(ScanError::SurfaceUnavailable)
        ));
        assert!(surface.frame().is_none());
    }
}
