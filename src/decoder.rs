use crate::format::PcmFormat;

// -------------------------------------------------------------------------------------------------

/// Lifecycle events a `Decoder` or the render path raises for a single decoder's playback.
///
/// Fired in order per decoder: `DecodingStarted`, `RenderingStarted`, `DecodingFinished`,
/// `RenderingFinished`. The first and third are raised from the DecoderWorker thread, the
/// second and fourth from the render thread (§5 ordering guarantees).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderLifecycleEvent {
    DecodingStarted,
    DecodingFinished,
    RenderingStarted,
    RenderingFinished,
}

/// A sender for lifecycle events, keyed by a decoder id assigned by the caller (the
/// DecoderWorker, at dequeue time) so a single shared channel can serve every active decoder.
pub type LifecycleSender = crossbeam_channel::Sender<(usize, DecoderLifecycleEvent)>;

// -------------------------------------------------------------------------------------------------

/// External collaborator: something that produces PCM frames from a URL.
///
/// Concrete decoders (e.g. `SymphoniaDecoder`) are out of the core's scope per §1, but the core
/// depends on this trait's contract: `read` returning 0 frames is end-of-stream; `seek_to_frame`
/// reports the actual landing frame (which may differ from the requested one); lifecycle hooks
/// are invoked synchronously by the caller at the points named above, not spawned internally.
pub trait Decoder: Send {
    /// The source URL this decoder was opened from.
    fn url(&self) -> &str;

    /// The PCM format frames are produced in. Fixed for the lifetime of the decoder.
    fn format(&self) -> PcmFormat;

    fn supports_seeking(&self) -> bool;

    /// The decoder's current playback position, in absolute frames from the start of the stream.
    fn current_frame(&self) -> u64;

    /// Seek to `frame`, returning the actual landing frame on success. Seeking past end of
    /// stream, or on a decoder that doesn't support seeking, is reported as `None`.
    fn seek_to_frame(&mut self, frame: u64) -> Option<u64>;

    /// Fill `buffers` (interleaved, sized for `max_frames * format().channels`) with up to
    /// `max_frames` frames. Returns the number of frames actually produced; `0` is EOS.
    fn read(&mut self, buffers: &mut [f32], max_frames: usize) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ToneDecoder;

    #[test]
    fn read_returns_zero_at_end_of_stream() {
        let mut decoder = ToneDecoder::new(PcmFormat::new(1, 8000), 4);
        let mut buf = vec![0.0f32; 4];
        assert_eq!(decoder.read(&mut buf, 4), 4);
        assert_eq!(decoder.read(&mut buf, 4), 0);
    }
}
