use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gapless_engine::{
    AudioOutput, AudioSink, Decoder, Error, PcmFormat, PlaybackStatusEvent, PlayerController,
    RenderCallback,
};

// -------------------------------------------------------------------------------------------------
// Test doubles standing in for a real device backend: a constant-tone `Decoder` and an
// `AudioOutput`/`AudioSink` pair that drives the render callback from its own thread, the same
// way a `cpal`/`cubeb` backend would, but without touching actual hardware.

struct ToneDecoder {
    format: PcmFormat,
    total_frames: u64,
    position: u64,
}

impl ToneDecoder {
    fn new(format: PcmFormat, total_frames: u64) -> Self {
        Self {
            format,
            total_frames,
            position: 0,
        }
    }
}

impl Decoder for ToneDecoder {
    fn url(&self) -> &str {
        "tone://integration-test"
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
            buffers[off..off + channels].fill(0.25);
        }
        self.position += n as u64;
        n
    }
}

#[derive(Clone)]
struct TestSink {
    format: PcmFormat,
    volume_bits: Arc<AtomicU32>,
    paused: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl AudioSink for TestSink {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    fn close(&self) {
        self.running.store(false, Ordering::Release);
    }
}

struct TestOutput {
    sink: TestSink,
}

const TEST_FORMAT: PcmFormat = PcmFormat {
    channels: 2,
    sample_rate: 8000,
    bytes_per_frame: 8,
    non_interleaved: false,
};

impl AudioOutput for TestOutput {
    type Sink = TestSink;

    fn open(render_callback: RenderCallback) -> Result<Self, Error> {
        let sink = TestSink {
            format: TEST_FORMAT,
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            paused: Arc::new(AtomicBool::new(true)),
            running: Arc::new(AtomicBool::new(true)),
        };

        let paused = Arc::clone(&sink.paused);
        let running = Arc::clone(&sink.running);
        std::thread::spawn(move || {
            let mut buf = vec![0.0f32; 256 * TEST_FORMAT.channels as usize];
            while running.load(Ordering::Acquire) {
                if !paused.load(Ordering::Acquire) {
                    render_callback.render(&mut buf);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        });

        Ok(TestOutput { sink })
    }

    fn sink(&self) -> Self::Sink {
        self.sink.clone()
    }
}

// -------------------------------------------------------------------------------------------------

#[test]
fn two_enqueued_tracks_render_gaplessly_in_order() {
    let (event_send, event_recv) = crossbeam_channel::unbounded();
    let mut player = PlayerController::<TestOutput>::new(Some(event_send));
    player.open_default_output().unwrap();

    player
        .enqueue(Box::new(ToneDecoder::new(TEST_FORMAT, 2000)))
        .unwrap();
    player
        .enqueue(Box::new(ToneDecoder::new(TEST_FORMAT, 1000)))
        .unwrap();
    player.play();

    let mut finished = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while finished.len() < 2 && std::time::Instant::now() < deadline {
        if let Ok(PlaybackStatusEvent::RenderingFinished { decoder_id }) =
            event_recv.recv_timeout(Duration::from_millis(500))
        {
            finished.push(decoder_id);
        }
    }

    // Both decoders must finish rendering, in the order they were enqueued: sequential
    // attribution, not mixing.
    assert_eq!(finished, vec![0, 1]);
}

#[test]
fn enqueue_rejects_a_format_mismatch_after_the_first_decoder_defines_the_pipeline() {
    let mut player = PlayerController::<TestOutput>::new(None);
    player.open_default_output().unwrap();

    player
        .enqueue(Box::new(ToneDecoder::new(TEST_FORMAT, 4000)))
        .unwrap();

    let mismatched_format = PcmFormat::new(1, 8000);
    let mismatched = Box::new(ToneDecoder::new(mismatched_format, 4000));
    let result = player.enqueue(mismatched);
    assert!(result.is_err());
    // Rejected decoder ownership is returned to the caller, not dropped by the pipeline.
    let (returned, _err) = result.unwrap_err();
    assert_eq!(returned.format(), mismatched_format);
}

#[test]
fn seek_without_a_current_decoder_reports_failure() {
    let mut player = PlayerController::<TestOutput>::new(None);
    player.open_default_output().unwrap();
    assert!(!player.seek_to_frame(10));
}
