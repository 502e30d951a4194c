use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// A single-producer/single-consumer circular PCM buffer addressed by absolute, monotonic
/// frame index rather than by a read/write cursor pair.
///
/// `store` is called only from the DecoderWorker thread, `fetch` only from the RenderCallback's
/// converter input path. Both sides agree on the valid window `[frames_rendered, frames_decoded)`
/// via the two atomic counters owned by the caller (see `PlayerController`); the ring buffer
/// itself only performs the address arithmetic and raw copy, never allocates, and never locks.
pub struct RingBuffer {
    /// Interleaved `f32` storage, `capacity_frames * channels` samples.
    storage: UnsafeCell<Vec<f32>>,
    capacity_frames: u64,
    channels: usize,
}

// Safety: `store` is only ever called by the single producer, `fetch` only ever by the single
// consumer; the two never touch overlapping regions of `storage` because the caller-owned
// `frames_decoded`/`frames_rendered` counters keep `store`'s write window and `fetch`'s read
// window disjoint (store refuses to overrun the reader; fetch never reads ahead of the writer).
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    pub const DEFAULT_CAPACITY_FRAMES: u64 = 16384;

    pub fn new(channels: usize, capacity_frames: u64) -> Self {
        assert!(channels > 0);
        assert!(capacity_frames > 0);
        Self {
            storage: UnsafeCell::new(vec![0.0; channels * capacity_frames as usize]),
            capacity_frames,
            channels,
        }
    }

    pub fn capacity_frames(&self) -> u64 {
        self.capacity_frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Store `n` interleaved frames from `buf` at absolute frame index `dest`.
    ///
    /// Fails with `Error::BufferOverrun` if `dest + n` would run past `frames_rendered + capacity`,
    /// i.e. if it would overwrite frames the reader hasn't consumed yet. Callers (the
    /// DecoderWorker) are expected to only call this after confirming free space, so this is a
    /// defensive check that should never trip in practice.
    pub fn store(&self, buf: &[f32], n: u64, dest: u64, frames_rendered: u64) -> Result<(), Error> {
        if dest + n > frames_rendered + self.capacity_frames {
            return Err(Error::BufferOverrun);
        }
        debug_assert!(buf.len() >= (n as usize) * self.channels);
        // Safety: single producer, and the overrun check above keeps this write inside the
        // window the (single) consumer has already vacated.
        let storage = unsafe { &mut *self.storage.get() };
        for frame in 0..n {
            let slot = ((dest + frame) % self.capacity_frames) as usize;
            let src_off = (frame as usize) * self.channels;
            let dst_off = slot * self.channels;
            storage[dst_off..dst_off + self.channels]
                .copy_from_slice(&buf[src_off..src_off + self.channels]);
        }
        Ok(())
    }

    /// Fetch `n` interleaved frames into `buf` starting at absolute frame index `src`.
    ///
    /// Frames outside the currently valid `[frames_rendered, frames_decoded)` window are
    /// returned as silence; it is the caller's responsibility to only request frames that are
    /// known to be valid (by comparing `frames_decoded - frames_rendered` first) if silence
    /// padding is not desired.
    pub fn fetch(&self, buf: &mut [f32], n: u64, src: u64, frames_decoded: u64, frames_rendered: u64) {
        debug_assert!(buf.len() >= (n as usize) * self.channels);
        // Safety: single consumer; reads never cross into the producer's not-yet-written region
        // because the caller only requests frames inside `[frames_rendered, frames_decoded)`.
        let storage = unsafe { &*self.storage.get() };
        for frame in 0..n {
            let abs = src + frame;
            let dst_off = (frame as usize) * self.channels;
            if abs < frames_rendered || abs >= frames_decoded {
                buf[dst_off..dst_off + self.channels].fill(0.0);
                continue;
            }
            let slot = (abs % self.capacity_frames) as usize;
            let src_off = slot * self.channels;
            buf[dst_off..dst_off + self.channels]
                .copy_from_slice(&storage[src_off..src_off + self.channels]);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Process-wide monotonic frame counters, shared between the worker, render, and collector
/// threads. Kept alongside the `RingBuffer` rather than inside it since the shared flags in
/// `PlayerController` (`virtual_format_changed`, `is_seeking`) are read alongside these same
/// counters by the render callback, and all three need to be visible together.
#[derive(Default)]
pub struct FrameCounters {
    pub frames_decoded: AtomicU64,
    pub frames_rendered: AtomicU64,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `frames_decoded - frames_rendered`: the number of frames currently available to read.
    pub fn available(&self) -> u64 {
        let decoded = self.frames_decoded.load(Ordering::Acquire);
        let rendered = self.frames_rendered.load(Ordering::Acquire);
        decoded - rendered
    }

    pub fn reset(&self) {
        self.frames_decoded.store(0, Ordering::SeqCst);
        self.frames_rendered.store(0, Ordering::SeqCst);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_stored_frame() {
        let rb = RingBuffer::new(2, 8);
        let frame = [1.0f32, -1.0];
        rb.store(&frame, 1, 0, 0).unwrap();
        let mut out = [0.0f32; 2];
        rb.fetch(&mut out, 1, 0, 1, 0);
        assert_eq!(out, frame);
    }

    #[test]
    fn fetch_outside_valid_window_is_silence() {
        let rb = RingBuffer::new(1, 4);
        rb.store(&[0.5], 1, 0, 0).unwrap();
        let mut out = [1.0f32; 1];
        // src (=5) is past frames_decoded (=1): must read as silence, not garbage.
        rb.fetch(&mut out, 1, 5, 1, 0);
        assert_eq!(out, [0.0]);
    }

    #[test]
    fn store_overrun_boundary() {
        let rb = RingBuffer::new(1, 4);
        // dest + n > frames_rendered + capacity => overrun
        assert!(rb.store(&[0.0], 1, 4, 0).is_err());
        assert!(rb.store(&[0.0], 1, 3, 0).is_ok());
    }

    #[test]
    fn positions_wrap_modulo_capacity() {
        let rb = RingBuffer::new(1, 4);
        rb.store(&[9.0], 1, 10, 6).unwrap(); // slot 10 % 4 == 2
        let mut out = [0.0f32; 1];
        rb.fetch(&mut out, 1, 10, 11, 6);
        assert_eq!(out, [9.0]);
    }
}
