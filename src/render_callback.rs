use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::player::Shared;

// -------------------------------------------------------------------------------------------------

/// The alloc-free render path invoked by the device backend's data callback (§4.5).
///
/// Holds only an `Arc` to the controller's shared state; it never allocates, blocks, or takes a
/// lock, matching the device collaborator's realtime contract.
pub struct RenderCallback {
    shared: Arc<Shared>,
}

impl RenderCallback {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Render into `output` (interleaved, `stream_virtual_format`). Called once per device
    /// period; `output` is always fully written, with silence for anything not produced.
    pub fn render(&self, output: &mut [f32]) {
        output.fill(0.0);

        if self.shared.virtual_format_changed.load(Ordering::Acquire) {
            self.shared.request_stop_from_render_thread();
            return;
        }
        if self.shared.is_seeking.load(Ordering::Acquire) {
            return;
        }

        let avail = self.shared.counters.available();
        if avail == 0 {
            if self.shared.active_set.current().is_none() {
                self.shared.request_stop_from_render_thread();
            }
            return;
        }

        let dst_channels = self.shared.stream_format().channels as usize;
        let output_frames = output.len() / dst_channels;

        let shared = &self.shared;
        let mut rendered_this_pass: u64 = 0;
        let written = {
            let mut converter = shared.converter.lock().unwrap();
            converter.fill(output, output_frames, &mut |buf| {
                let src_channels = shared.ring_buffer().channels();
                let n = (buf.len() / src_channels) as u64;
                let available = shared.counters.available();
                let n = n.min(available);
                if n == 0 {
                    return 0;
                }
                let src = shared.counters.frames_rendered.load(Ordering::Acquire);
                let decoded = shared.counters.frames_decoded.load(Ordering::Acquire);
                shared
                    .ring_buffer()
                    .fetch(buf, n, src, decoded, src);
                shared.counters.frames_rendered.fetch_add(n, Ordering::AcqRel);
                rendered_this_pass += n;
                (n as usize) * src_channels
            })
        };
        let _ = written;

        if shared.ring_buffer().capacity_frames() - shared.counters.available()
            >= crate::decoder_worker::CHUNK_FRAMES as u64
        {
            shared.signal_decoder();
        }

        self.distribute_rendered_frames(rendered_this_pass);
    }

    /// Attribute `rendered_this_pass` frames across the ActiveSet in timestamp order, firing
    /// lifecycle callbacks as decoders start and complete rendering (§4.5 step 7).
    fn distribute_rendered_frames(&self, mut remaining: u64) {
        let shared = &self.shared;
        let mut cursor_ts = match shared.active_set.current() {
            Some(state) => state.timestamp,
            None => return,
        };
        let mut first = true;
        while remaining > 0 {
            let state = if first {
                shared.active_set.current()
            } else {
                shared.active_set.next_after(cursor_ts)
            };
            let Some(state) = state else { break };
            first = false;
            cursor_ts = state.timestamp;

            if state.mark_rendering_started() {
                shared.emit_lifecycle(state, crate::decoder::DecoderLifecycleEvent::RenderingStarted);
            }

            let total = state.total_frames();
            let already = state.frames_rendered();
            let remaining_in_decoder = total.saturating_sub(already);
            let take = remaining_in_decoder.min(remaining);
            state.add_frames_rendered(take);
            remaining -= take;

            if state.is_fully_rendered() {
                state.mark_ready_for_collection();
                shared.emit_lifecycle(
                    state,
                    crate::decoder::DecoderLifecycleEvent::RenderingFinished,
                );
                shared.signal_collector();
            }
        }
    }
}
