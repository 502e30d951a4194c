use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::active_set::ActiveSet;
use crate::collector::Collector;
use crate::converter::{build_converter, Converter};
use crate::decoder::{Decoder, DecoderLifecycleEvent};
use crate::decoder_state::DecoderState;
use crate::decoder_worker::DecoderWorker;
use crate::error::Error;
use crate::format::PcmFormat;
use crate::output::{AudioOutput, AudioSink};
use crate::render_callback::RenderCallback;
use crate::ring_buffer::{FrameCounters, RingBuffer};
use crate::utils::semaphore::Semaphore;

// -------------------------------------------------------------------------------------------------

/// A status event emitted on playback milestones. Consumers subscribe via the channel passed to
/// [`PlayerController::new`].
#[derive(Debug, Clone)]
pub enum PlaybackStatusEvent {
    DecodingStarted { decoder_id: usize },
    DecodingFinished { decoder_id: usize },
    RenderingStarted { decoder_id: usize },
    RenderingFinished { decoder_id: usize },
}

/// Pending decoders awaiting activation, guarded by a single mutex (§3 PendingQueue). Never
/// held across a blocking call or device operation (§5).
pub type PendingQueue = Mutex<VecDeque<Box<dyn Decoder>>>;

/// State shared by the controller and its three worker contexts (render callback, decoder
/// worker, collector). Modeled as a single owner (the controller's `Arc`) with borrowed access
/// from thread entry points, never as mutual ownership (§9 Design Notes).
pub struct Shared {
    /// Allocated lazily on the first `enqueue` once the pipeline's format is known (§4.7
    /// Enqueue algorithm). A `OnceLock` gives the render/worker hot paths lock-free access
    /// after that first write, matching the "never allocates, never locks" contract.
    pub ring_buffer: std::sync::OnceLock<RingBuffer>,
    pub counters: FrameCounters,
    pub active_set: ActiveSet,
    pub pending_queue: PendingQueue,
    pub converter: Mutex<Box<dyn Converter>>,
    pub virtual_format_changed: AtomicBool,
    pub is_seeking: AtomicBool,
    pub decoder_signal: Semaphore,
    pub collector_signal: Semaphore,
    pub shutdown: AtomicBool,
    /// Set by the render thread when it wants output paused (format change, or the ring buffer
    /// has drained with nothing left active). The Collector — never the realtime thread itself
    /// — pauses `sink` on its next wake (§4.5 step 1, step 3).
    pub stop_requested: AtomicBool,
    sink: Mutex<Option<Arc<dyn AudioSink>>>,
    ring_buffer_format: Mutex<PcmFormat>,
    stream_format: Mutex<PcmFormat>,
    volume_bits: AtomicU32,
    status_send: Option<Sender<PlaybackStatusEvent>>,
    lifecycle_ids: Mutex<std::collections::HashMap<usize, usize>>,
    next_decoder_id: AtomicU32,
}

impl Shared {
    /// Panics if called before the first `enqueue` has allocated the ring buffer; every caller
    /// (render callback, decoder worker, collector) only runs once a decoder has been enqueued.
    pub fn ring_buffer(&self) -> &RingBuffer {
        self.ring_buffer
            .get()
            .expect("ring buffer accessed before the first enqueue allocated it")
    }

    pub fn stream_format(&self) -> PcmFormat {
        *self.stream_format.lock().unwrap()
    }

    pub fn ring_buffer_format(&self) -> PcmFormat {
        *self.ring_buffer_format.lock().unwrap()
    }

    pub fn ring_buffer_sample_rate(&self) -> u32 {
        self.ring_buffer_format().sample_rate
    }

    pub fn signal_decoder(&self) {
        self.decoder_signal.signal();
    }

    pub fn signal_collector(&self) {
        self.collector_signal.signal();
    }

    pub fn request_stop_from_render_thread(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.signal_collector();
    }

    pub fn set_sink(&self, sink: Arc<dyn AudioSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    /// Pause the device if a stop was requested, clearing the flag. Only ever called from the
    /// Collector thread, never from the realtime render path.
    pub fn run_stop_hook_if_requested(&self) {
        if self.stop_requested.swap(false, Ordering::AcqRel) {
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                sink.pause();
            }
        }
    }

    pub fn reset_output(&self) {
        // `ResetOutput` is a no-op hook retained for platforms that need to flush device-side
        // latency after a seek (§9 Design Notes).
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Fire a lifecycle event for `state` to the status channel, if one was supplied. Decoder
    /// ids are assigned on first sight (at the earliest event) and reused for subsequent ones.
    pub fn emit_lifecycle(&self, state: &DecoderState, event: DecoderLifecycleEvent) {
        let Some(sender) = &self.status_send else { return };
        let decoder_id = {
            let mut ids = self.lifecycle_ids.lock().unwrap();
            let key = state as *const DecoderState as usize;
            *ids
                .entry(key)
                .or_insert_with(|| self.next_decoder_id.fetch_add(1, Ordering::Relaxed) as usize)
        };
        let status = match event {
            DecoderLifecycleEvent::DecodingStarted => {
                PlaybackStatusEvent::DecodingStarted { decoder_id }
            }
            DecoderLifecycleEvent::DecodingFinished => {
                PlaybackStatusEvent::DecodingFinished { decoder_id }
            }
            DecoderLifecycleEvent::RenderingStarted => {
                PlaybackStatusEvent::RenderingStarted { decoder_id }
            }
            DecoderLifecycleEvent::RenderingFinished => {
                PlaybackStatusEvent::RenderingFinished { decoder_id }
            }
        };
        if sender.send(status).is_err() {
            log::debug!("playback status receiver dropped, no longer sending events");
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Orchestrates the realtime pipeline: output binding, enqueue/format convergence, seeking, and
/// the worker/collector thread lifecycle (§4.7).
pub struct PlayerController<O: AudioOutput> {
    shared: Arc<Shared>,
    output: Option<O>,
    sink: Option<Arc<O::Sink>>,
    playing: bool,
    hog_mode: bool,
}

impl<O: AudioOutput> PlayerController<O> {
    /// Construct a controller without yet opening a device. The RingBuffer and converter carry
    /// a placeholder format until the first `enqueue` defines `ring_buffer_format` for real
    /// (§4.7 Enqueue algorithm).
    pub fn new(status_send: Option<Sender<PlaybackStatusEvent>>) -> Self {
        let placeholder_format = PcmFormat::new(2, 44100);
        let shared = Arc::new(Shared {
            ring_buffer: std::sync::OnceLock::new(),
            counters: FrameCounters::new(),
            active_set: ActiveSet::new(),
            pending_queue: Mutex::new(VecDeque::new()),
            converter: Mutex::new(
                build_converter(placeholder_format, placeholder_format)
                    .expect("identity converter never fails"),
            ),
            virtual_format_changed: AtomicBool::new(false),
            is_seeking: AtomicBool::new(false),
            decoder_signal: Semaphore::new(),
            collector_signal: Semaphore::new(),
            shutdown: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            sink: Mutex::new(None),
            ring_buffer_format: Mutex::new(placeholder_format),
            stream_format: Mutex::new(placeholder_format),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            status_send,
            lifecycle_ids: Mutex::new(std::collections::HashMap::new()),
            next_decoder_id: AtomicU32::new(0),
        });

        Self {
            shared,
            output: None,
            sink: None,
            playing: false,
            hog_mode: false,
        }
    }

    /// Bind to the default output device and spawn the DecoderWorker and Collector threads.
    /// Constructor failure is fatal to the controller instance (§7): nothing here is left
    /// partially acquired on error since `O::open` is the only fallible step.
    pub fn open_default_output(&mut self) -> Result<(), Error> {
        let render_callback = RenderCallback::new(self.shared.clone());
        let output = O::open(render_callback)?;
        let sink = Arc::new(output.sink());
        *self.shared.stream_format.lock().unwrap() = sink.format();
        self.spawn_workers();
        self.shared.set_sink(sink.clone());
        self.output = Some(output);
        self.sink = Some(sink);
        Ok(())
    }

    fn spawn_workers(&self) {
        let worker_shared = self.shared.clone();
        std::thread::Builder::new()
            .name("gapless-decoder".into())
            .spawn(move || DecoderWorker::new(worker_shared).run())
            .expect("failed to spawn decoder worker thread");

        let collector_shared = self.shared.clone();
        std::thread::Builder::new()
            .name("gapless-collector".into())
            .spawn(move || Collector::new(collector_shared).run())
            .expect("failed to spawn collector thread");
    }

    pub fn play(&mut self) {
        if let Some(sink) = &self.sink {
            sink.resume();
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.playing = false;
    }

    /// Stop output, mark every active decoder as finished, and rewind the global counters to
    /// zero (§4.7 Stop()).
    pub fn stop(&mut self) {
        self.pause();
        self.shared.active_set.for_each(|state| {
            state.stop_decoding();
            state.mark_ready_for_collection();
        });
        self.shared.signal_decoder();
        self.shared.signal_collector();
        self.shared
            .counters
            .frames_decoded
            .store(0, Ordering::SeqCst);
        self.shared
            .counters
            .frames_rendered
            .store(0, Ordering::SeqCst);
    }

    /// Enqueue algorithm (§4.7): the first decoder ever enqueued defines `ring_buffer_format`;
    /// subsequent ones must match it bit-exactly or are rejected, with the caller retaining
    /// ownership (§7 propagation policy, §8 scenario 5).
    pub fn enqueue(&mut self, decoder: Box<dyn Decoder>) -> Result<(), (Box<dyn Decoder>, Error)> {
        let no_current = self.shared.active_set.current().is_none();
        let queue_empty = self.shared.pending_queue.lock().unwrap().is_empty();

        if no_current && queue_empty {
            let format = decoder.format();
            *self.shared.ring_buffer_format.lock().unwrap() = format;
            let stream_format = self.shared.stream_format();
            let converter = match build_converter(format, stream_format) {
                Ok(converter) => converter,
                Err(err) => return Err((decoder, err)),
            };
            *self.shared.converter.lock().unwrap() = converter;
            let _ = self.shared.ring_buffer.set(RingBuffer::new(
                format.channels as usize,
                RingBuffer::DEFAULT_CAPACITY_FRAMES,
            ));
        } else {
            let expected = self.shared.ring_buffer_format();
            if decoder.format() != expected {
                return Err((decoder, Error::FormatMismatchOnEnqueue));
            }
        }

        self.shared.pending_queue.lock().unwrap().push_back(decoder);
        self.shared.signal_decoder();
        Ok(())
    }

    pub fn clear_queue(&self) {
        self.shared.pending_queue.lock().unwrap().clear();
    }

    /// Returns `false` if there is no current decoder, it doesn't support seeking, or another
    /// seek is already in flight (§7, §8 scenario 6).
    pub fn seek_to_frame(&self, frame: u64) -> bool {
        let Some(state) = self.shared.active_set.current() else { return false };
        if !state.decoder().supports_seeking() {
            return false;
        }
        if !state.request_seek(frame) {
            return false;
        }
        self.shared.signal_decoder();
        true
    }

    pub fn seek_by(&self, seconds: f64) -> bool {
        let Some(state) = self.shared.active_set.current() else { return false };
        let rate = state.decoder().format().sample_rate as f64;
        let delta_frames = (seconds * rate) as i64;
        let current = state.decoder().current_frame() as i64;
        let target = (current + delta_frames).max(0) as u64;
        self.seek_to_frame(target)
    }

    pub fn get_current_frame(&self) -> Option<u64> {
        self.shared
            .active_set
            .current()
            .map(|state| state.decoder().current_frame())
    }

    pub fn get_total_frames(&self) -> Option<u64> {
        self.shared.active_set.current().map(|state| {
            let total = state.total_frames();
            if total == u64::MAX {
                0
            } else {
                total
            }
        })
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    pub fn set_volume(&self, volume: f32) {
        self.shared.set_volume(volume);
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    pub fn volume_db(&self) -> f32 {
        crate::utils::linear_to_db(self.volume())
    }

    pub fn set_volume_db(&self, volume_db: f32) {
        self.set_volume(crate::utils::db_to_linear(volume_db));
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.shared.stream_format().sample_rate
    }

    /// Request a nominal device sample rate (§4.7 "getters/setters for volume and device sample
    /// rate"). `cpal` exposes no API to renegotiate an already-open stream's sample rate, so
    /// this is a best-effort no-op that reports failure rather than silently pretending to
    /// retune the device, matching `set_output_stream`'s and hog mode's Open-Questions stance.
    pub fn set_output_sample_rate(&mut self, _sample_rate: u32) -> Result<(), Error> {
        Err(Error::InvalidDeviceOrStream)
    }

    /// Close the current device binding and rebind to `device_id` (§4.7 SetOutputDevice).
    /// The DecoderWorker/Collector threads, ActiveSet, and pending queue are untouched; only
    /// the output device and its converter-facing `stream_format` change.
    pub fn set_output_device(&mut self, device_id: &str) -> Result<(), Error> {
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
        self.output = None;

        let render_callback = RenderCallback::new(self.shared.clone());
        let output = O::open_device(device_id, render_callback)?;
        let sink = Arc::new(output.sink());
        *self.shared.stream_format.lock().unwrap() = sink.format();
        self.shared.set_sink(sink.clone());

        let ring_buffer_format = self.shared.ring_buffer_format();
        let stream_format = sink.format();
        if let Ok(converter) = build_converter(ring_buffer_format, stream_format) {
            *self.shared.converter.lock().unwrap() = converter;
        }

        self.output = Some(output);
        self.sink = Some(sink);
        if self.playing {
            self.play();
        }
        Ok(())
    }

    /// Select a sub-stream of the current device (§4.7, §6 "Stream collaborator"). `cpal`
    /// exposes no concept of multiple streams per device, so this is a best-effort no-op that
    /// reports failure rather than silently pretending to switch anything (§9 Open Questions).
    pub fn set_output_stream(&mut self, _stream_id: &str) -> Result<(), Error> {
        Err(Error::InvalidDeviceOrStream)
    }

    /// Virtual-format-changed handler (§4.7): stop output, rebuild the converter and scratch
    /// buffer for the new `stream_virtual_format`, then restart if we were playing. Invoked
    /// from whatever property-listener mechanism the backend provides (on `cpal`, this is
    /// polled rather than pushed, since `cpal` has no native device property notifications).
    pub fn handle_virtual_format_change(&mut self, new_format: PcmFormat) {
        let was_playing = self.playing;
        self.shared
            .virtual_format_changed
            .store(true, Ordering::Release);
        self.pause();

        *self.shared.stream_format.lock().unwrap() = new_format;
        let ring_buffer_format = self.shared.ring_buffer_format();
        if let Ok(converter) = build_converter(ring_buffer_format, new_format) {
            *self.shared.converter.lock().unwrap() = converter;
        }

        self.shared
            .virtual_format_changed
            .store(false, Ordering::Release);
        if was_playing {
            self.play();
        }
    }

    /// Best-effort "hog mode" exclusive device ownership (Glossary). Platforms without an
    /// equivalent device property simply acknowledge the request (§9 Open Questions).
    pub fn acquire_hog_mode(&mut self) -> bool {
        self.hog_mode = true;
        true
    }

    pub fn release_hog_mode(&mut self) {
        self.hog_mode = false;
    }

    pub fn is_hog_mode(&self) -> bool {
        self.hog_mode
    }
}

impl<O: AudioOutput> Drop for PlayerController<O> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal_decoder();
        self.shared.signal_collector();
        if let Some(sink) = &self.sink {
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PcmFormat;
    use crate::test_support::ToneDecoder;

    struct NullSink;
    impl AudioSink for NullSink {
        fn format(&self) -> PcmFormat {
            PcmFormat::new(1, 1000)
        }
        fn set_volume(&self, _volume: f32) {}
        fn volume(&self) -> f32 {
            1.0
        }
        fn pause(&self) {}
        fn resume(&self) {}
        fn close(&self) {}
    }

    struct NullOutput;
    impl AudioOutput for NullOutput {
        type Sink = NullSink;
        fn open(_render_callback: RenderCallback) -> Result<Self, Error> {
            Ok(NullOutput)
        }
        fn sink(&self) -> Self::Sink {
            NullSink
        }
    }

    #[test]
    fn enqueue_rejects_format_mismatch_and_returns_ownership() {
        let mut controller = PlayerController::<NullOutput>::new(None);
        controller.open_default_output().unwrap();
        controller
            .enqueue(Box::new(ToneDecoder::new(PcmFormat::new(1, 1000), 10)))
            .unwrap();
        let mismatched = Box::new(ToneDecoder::new(PcmFormat::new(2, 1000), 10));
        assert!(controller.enqueue(mismatched).is_err());
    }

    #[test]
    fn seek_without_current_decoder_returns_false() {
        let mut controller = PlayerController::<NullOutput>::new(None);
        controller.open_default_output().unwrap();
        assert!(!controller.seek_to_frame(10));
    }
}
