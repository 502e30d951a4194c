use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::decoder::DecoderLifecycleEvent;
use crate::decoder_state::DecoderState;
use crate::error::Error;
use crate::player::Shared;

/// Fixed write unit from decoder to ring buffer; decoding is gated on at least one chunk of
/// free space being available (§4.4, Glossary "Chunk").
pub const CHUNK_FRAMES: usize = 2048;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs on its own thread at elevated scheduling priority (§4.4, §5). Owns nothing itself:
/// all state lives in the shared controller state and in the ActiveSet/PendingQueue it
/// operates on.
pub struct DecoderWorker {
    shared: Arc<Shared>,
}

impl DecoderWorker {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn run(self) {
        let sample_rate = self.shared.ring_buffer_sample_rate();
        if let Err(err) =
            audio_thread_priority::promote_current_thread_to_real_time(0, sample_rate.max(1))
        {
            log::warn!(
                "failed to set decoder worker thread's priority to real-time: {}",
                err
            );
        }

        while !self.shared.shutdown.load(Ordering::Acquire) {
            if !self.activate_next_pending() {
                self.shared.decoder_signal.wait_timeout(WAIT_TIMEOUT);
                continue;
            }
            self.drain_current();
        }
    }

    /// Pop the head of the PendingQueue (if any), create its DecoderState and insert it into
    /// the ActiveSet (§4.4 step 1-2). Returns whether a decoder was activated.
    fn activate_next_pending(&self) -> bool {
        let decoder = {
            let mut queue = self.shared.pending_queue.lock().unwrap();
            queue.pop_front()
        };
        let Some(decoder) = decoder else { return false };

        let timestamp = self.shared.counters.frames_decoded.load(Ordering::Acquire);
        let state = Box::new(DecoderState::new(decoder, timestamp, CHUNK_FRAMES));
        if self.shared.active_set.try_insert(state).is_err() {
            log::error!("ActiveSet is full, dropping decoder activation");
            return false;
        }
        true
    }

    /// Inner loop while the just-activated decoder (or whichever remains current) still wants
    /// decoding (§4.4 step 3).
    fn drain_current(&self) {
        while !self.shared.shutdown.load(Ordering::Acquire) {
            let Some(state) = self.current_owned_state() else { return };

            self.service_seek(state);

            if !state.keep_decoding() {
                return;
            }

            let avail = self.shared.counters.available();
            let capacity = self.shared.ring_buffer().capacity_frames();
            if capacity - avail < CHUNK_FRAMES as u64 {
                self.shared.decoder_signal.wait_timeout(WAIT_TIMEOUT);
                continue;
            }

            if !self.decode_one_chunk(state) {
                return;
            }
        }
    }

    fn current_owned_state(&self) -> Option<&DecoderState> {
        self.shared.active_set.current()
    }

    fn service_seek(&self, state: &DecoderState) {
        let Some(target) = state.take_pending_seek() else { return };

        self.shared.is_seeking.store(true, Ordering::Release);

        let decoder_mut = state.decoder_mut();
        let pre = decoder_mut.current_frame();
        let landing = decoder_mut.seek_to_frame(target);
        self.shared.is_seeking.store(false, Ordering::Release);

        match landing {
            Some(post) => {
                state.set_frames_rendered(post);
                // Signed delta: a backward seek (post < pre) must move `frames_decoded`
                // backward too, or subsequent chunks get decoded from the new position but
                // stored at the stale pre-seek ring buffer address.
                let delta = post as i64 - pre as i64;
                let _ = self.shared.counters.frames_decoded.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |current| Some((current as i64 + delta) as u64),
                );
                let decoded = self.shared.counters.frames_decoded.load(Ordering::Acquire);
                self.shared
                    .counters
                    .frames_rendered
                    .store(decoded, Ordering::Release);
                if let Ok(mut converter) = self.shared.converter.lock() {
                    converter.reset();
                }
                self.shared.reset_output();
            }
            None => {
                log::warn!("seek failed for active decoder");
            }
        }
    }

    /// Ask the current decoder for one chunk; store it into the ring buffer, or finalize EOS.
    /// Returns `false` when the inner loop should stop (EOS reached).
    fn decode_one_chunk(&self, state: &DecoderState) -> bool {
        if state.mark_decoding_started() {
            self.shared
                .emit_lifecycle(state, DecoderLifecycleEvent::DecodingStarted);
        }

        let starting_frame_number = self.shared.counters.frames_decoded.load(Ordering::Acquire)
            - state.timestamp;

        state.reset_scratch();
        let channels = state.decoder().format().channels as usize;
        let produced = state.decoder_mut().read(state.scratch_mut(), CHUNK_FRAMES);

        if produced == 0 {
            state.set_total_frames(starting_frame_number);
            state.stop_decoding();
            self.shared
                .emit_lifecycle(state, DecoderLifecycleEvent::DecodingFinished);
            return false;
        }

        let dest = state.timestamp + starting_frame_number;
        let scratch = &state.scratch_mut()[..produced * channels];
        match self.shared.ring_buffer().store(
            scratch,
            produced as u64,
            dest,
            self.shared.counters.frames_rendered.load(Ordering::Acquire),
        ) {
            Ok(()) => {
                self.shared
                    .counters
                    .frames_decoded
                    .fetch_add(produced as u64, Ordering::AcqRel);
                true
            }
            Err(Error::BufferOverrun) => {
                log::error!("decoder worker attempted to overrun the ring buffer");
                true
            }
            Err(err) => {
                log::error!("failed to store decoded chunk: {}", err);
                true
            }
        }
    }
}
