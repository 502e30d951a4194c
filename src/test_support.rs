//! Test doubles shared by several modules' unit tests. Not compiled into release builds.

use crate::decoder::Decoder;
use crate::format::PcmFormat;

/// A fixed-tone `Decoder` stand-in: produces `total_frames` frames of a constant sample value,
/// then reports end-of-stream. Supports seeking by simply repositioning its cursor.
pub struct ToneDecoder {
    format: PcmFormat,
    total_frames: u64,
    position: u64,
    value: f32,
}

impl ToneDecoder {
    pub fn new(format: PcmFormat, total_frames: u64) -> Self {
        Self {
            format,
            total_frames,
            position: 0,
            value: 0.5,
        }
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }
}

impl Decoder for ToneDecoder {
    fn url(&self) -> &str {
        "tone://test"
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn supports_seeking(&self) -> bool {
        true
    }

    fn current_frame(&self) -> u64 {
        self.position
    }

    fn seek_to_frame(&mut self, frame: u64) -> Option<u64> {
        let landing = frame.min(self.total_frames);
        self.position = landing;
        Some(landing)
    }

    fn read(&mut self, buffers: &mut [f32], max_frames: usize) -> usize {
        let channels = self.format.channels as usize;
        let remaining = (self.total_frames - self.position) as usize;
        let n = remaining.min(max_frames);
        for frame in 0..n {
            let off = frame * channels;
            buffers[off..off + channels].fill(self.value);
        }
        self.position += n as u64;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_decoder_honors_total_frames_and_then_reports_eos() {
        let mut decoder = ToneDecoder::new(PcmFormat::new(1, 1000), 3);
        let mut buf = vec![0.0f32; 10];
        assert_eq!(decoder.read(&mut buf, 10), 3);
        assert_eq!(decoder.read(&mut buf, 10), 0);
    }

    #[test]
    fn seek_clamps_to_total_frames() {
        let mut decoder = ToneDecoder::new(PcmFormat::new(1, 1000), 5);
        assert_eq!(decoder.seek_to_frame(100), Some(5));
        assert_eq!(decoder.current_frame(), 5);
    }
}
