use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel format of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit grayscale luminance
    Luma8,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
    /// RGBA32 format - uncompressed RGBA data
    Rgba32,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Luma8 => 1,
            FrameFormat::Rgb24 => 3,
            FrameFormat::Rgba32 => 4,
        }
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A single sampled video frame handed to the decode capability
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Timestamp when the frame was sampled from the sink
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
}

impl FrameBuffer {
    /// Create a new frame buffer instance
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            timestamp: SystemTime::now(),
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Expected byte length for the frame's dimensions and format
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(FrameFormat::Luma8.bytes_per_pixel(), 1);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(FrameFormat::Rgba32.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_expected_len() {
        let frame = FrameBuffer::new(vec![0u8; 12], 2, 2, FrameFormat::Rgb24);
        assert_eq!(frame.expected_len(), 12);
        assert_eq!(frame.dimensions(), Dimensions::new(2, 2));
    }
}
