use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use crate::decoder::Decoder;

// -------------------------------------------------------------------------------------------------

/// Sentinel stored in `frame_to_seek` when no seek is pending.
pub const NO_SEEK: i64 = -1;

/// Per-decoder bookkeeping, created by the DecoderWorker at dequeue and destroyed by the
/// Collector once `ready_for_collection` is observed true.
///
/// `frames_rendered`/`frame_to_seek` are atomic because the render thread reads/writes
/// `frames_rendered` and the worker thread reads/writes `frame_to_seek`, while control threads
/// write `frame_to_seek` to request a seek; every other field is only ever touched by the
/// DecoderWorker (owner) or read by the render/collector threads as plain atomic loads.
pub struct DecoderState {
    /// The inner decoder this state owns. `UnsafeCell`-wrapped for the same reason as
    /// `scratch`: the DecoderWorker needs `&mut dyn Decoder` access through a shared
    /// `&DecoderState` (the ActiveSet only ever hands out shared references).
    decoder: std::cell::UnsafeCell<Box<dyn Decoder>>,
    /// Absolute frame index at which this decoder's first frame was or will be written.
    pub timestamp: u64,
    /// Provisional frame count; rewritten to the last decoded position on EOS (§9 Open Questions:
    /// deliberately the pre-read `starting_frame_number`, not the post-read count).
    total_frames: AtomicU64,
    /// Number of frames of this decoder the render path has consumed so far.
    frames_rendered: AtomicU64,
    /// `-1` (`NO_SEEK`) when no seek is pending, else the requested absolute target frame.
    frame_to_seek: AtomicI64,
    /// Cleared by the worker (directly or via `PlayerController::stop`) to end the decode loop.
    keep_decoding: AtomicBool,
    /// Set by the render path once `frames_rendered == total_frames`; the signal to the
    /// Collector that this slot may be reclaimed.
    ready_for_collection: AtomicBool,
    /// Scratch buffer for one decode chunk, reused across `read` calls to avoid allocating in
    /// the decode loop's steady state.
    scratch: std::cell::UnsafeCell<Vec<f32>>,
    /// Set once `decoding_started`/`rendering_started` have fired, so the worker/render paths
    /// fire them exactly once per decoder (§8 invariant).
    decoding_started_fired: AtomicBool,
    rendering_started_fired: AtomicBool,
}

// Safety: `decoder` and `scratch` are only ever touched by the DecoderWorker thread (the owner
// of the DecoderState while it is being decoded into); no other thread reads or writes them.
unsafe impl Sync for DecoderState {}

impl DecoderState {
    pub fn new(decoder: Box<dyn Decoder>, timestamp: u64, scratch_frames: usize) -> Self {
        let channels = decoder.format().channels as usize;
        Self {
            decoder: std::cell::UnsafeCell::new(decoder),
            timestamp,
            total_frames: AtomicU64::new(u64::MAX),
            frames_rendered: AtomicU64::new(0),
            frame_to_seek: AtomicI64::new(NO_SEEK),
            keep_decoding: AtomicBool::new(true),
            ready_for_collection: AtomicBool::new(false),
            scratch: std::cell::UnsafeCell::new(vec![0.0; scratch_frames * channels]),
            decoding_started_fired: AtomicBool::new(false),
            rendering_started_fired: AtomicBool::new(false),
        }
    }

    pub fn decoder(&self) -> &dyn Decoder {
        // Safety: shared read access; the DecoderWorker never holds `decoder_mut` and a shared
        // reference at once outside of its own thread (single-writer discipline below).
        unsafe { &**self.decoder.get() }
    }

    /// Mutable access to the inner decoder. Safety: only the DecoderWorker thread that owns
    /// this state while it is active ever calls this; no other thread touches the decoder.
    pub fn decoder_mut(&self) -> &mut dyn Decoder {
        unsafe { &mut **self.decoder.get() }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Acquire)
    }

    pub fn set_total_frames(&self, frames: u64) {
        self.total_frames.store(frames, Ordering::Release);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    pub fn set_frames_rendered(&self, frames: u64) {
        self.frames_rendered.store(frames, Ordering::Release);
    }

    pub fn add_frames_rendered(&self, frames: u64) -> u64 {
        self.frames_rendered.fetch_add(frames, Ordering::AcqRel) + frames
    }

    /// The completion predicate per §4.2: `frames_rendered >= total_frames`, not `==`, since the
    /// EOS race window can make rendered briefly exceed the old, optimistic total.
    pub fn is_fully_rendered(&self) -> bool {
        self.frames_rendered() >= self.total_frames()
    }

    pub fn request_seek(&self, frame: u64) -> bool {
        self.frame_to_seek
            .compare_exchange(NO_SEEK, frame as i64, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn take_pending_seek(&self) -> Option<u64> {
        let value = self.frame_to_seek.swap(NO_SEEK, Ordering::AcqRel);
        if value < 0 {
            None
        } else {
            Some(value as u64)
        }
    }

    pub fn keep_decoding(&self) -> bool {
        self.keep_decoding.load(Ordering::Acquire)
    }

    pub fn stop_decoding(&self) {
        self.keep_decoding.store(false, Ordering::Release);
    }

    pub fn ready_for_collection(&self) -> bool {
        self.ready_for_collection.load(Ordering::Acquire)
    }

    pub fn mark_ready_for_collection(&self) {
        self.ready_for_collection.store(true, Ordering::Release);
    }

    /// Returns `true` the first time it is called, `false` on every subsequent call: the
    /// "fire exactly once" guard for the decoding-started lifecycle callback.
    pub fn mark_decoding_started(&self) -> bool {
        !self.decoding_started_fired.swap(true, Ordering::AcqRel)
    }

    /// Same guard for the rendering-started lifecycle callback.
    pub fn mark_rendering_started(&self) -> bool {
        !self.rendering_started_fired.swap(true, Ordering::AcqRel)
    }

    pub fn allocate_scratch(&self, frames: usize) {
        let channels = self.decoder().format().channels as usize;
        // Safety: only ever called by the owning DecoderWorker thread.
        let scratch = unsafe { &mut *self.scratch.get() };
        scratch.resize(frames * channels, 0.0);
    }

    pub fn reset_scratch(&self) {
        // Safety: only ever called by the owning DecoderWorker thread.
        let scratch = unsafe { &mut *self.scratch.get() };
        scratch.fill(0.0);
    }

    /// Safety: only the owning DecoderWorker thread calls this.
    pub fn scratch_mut(&self) -> &mut [f32] {
        unsafe { &mut *self.scratch.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PcmFormat;
    use crate::test_support::ToneDecoder;

    #[test]
    fn completion_predicate_uses_gte_not_eq() {
        let state = DecoderState::new(
            Box::new(ToneDecoder::new(PcmFormat::new(1, 1000), 100)),
            0,
            64,
        );
        state.set_total_frames(100);
        state.set_frames_rendered(100);
        assert!(state.is_fully_rendered());
        // EOS race window: rendered can briefly exceed an optimistic, stale total.
        state.set_frames_rendered(101);
        assert!(state.is_fully_rendered());
        state.set_frames_rendered(99);
        assert!(!state.is_fully_rendered());
    }

    #[test]
    fn seek_request_is_one_shot() {
        let state = DecoderState::new(
            Box::new(ToneDecoder::new(PcmFormat::new(1, 1000), 100)),
            0,
            64,
        );
        assert!(state.request_seek(50));
        // A second concurrent seek request must fail until the first is taken.
        assert!(!state.request_seek(10));
        assert_eq!(state.take_pending_seek(), Some(50));
        assert_eq!(state.take_pending_seek(), None);
        assert!(state.request_seek(20));
    }

    #[test]
    fn lifecycle_guards_fire_exactly_once() {
        let state = DecoderState::new(
            Box::new(ToneDecoder::new(PcmFormat::new(1, 1000), 100)),
            0,
            64,
        );
        assert!(state.mark_decoding_started());
        assert!(!state.mark_decoding_started());
        assert!(state.mark_rendering_started());
        assert!(!state.mark_rendering_started());
    }
}
