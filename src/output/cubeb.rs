use std::env;
use std::ffi::CString;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};

use crate::error::Error;
use crate::format::PcmFormat;
use crate::output::{AudioOutput, AudioSink};
use crate::render_callback::RenderCallback;

// -------------------------------------------------------------------------------------------------

type Frame = cubeb::StereoFrame<f32>;

const STREAM_CHANNELS: u16 = 2;
const SAMPLE_RATE: u32 = 44_100;
const STREAM_LATENCY: u32 = 0x1000;

enum StreamCommand {
    Pause,
    Resume,
    SetVolume(f32),
    Close,
}

/// Cheaply cloneable handle to a running `cubeb` stream. Unlike the `cpal` backend, pause and
/// volume are real device operations here, forwarded to the stream-owning thread rather than
/// just flipping an atomic the data callback reads.
#[derive(Clone)]
pub struct CubebSink {
    format: PcmFormat,
    volume_bits: Arc<AtomicU32>,
    commands: mpsc::Sender<StreamCommand>,
}

impl AudioSink for CubebSink {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
        let _ = self.commands.send(StreamCommand::SetVolume(volume));
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn pause(&self) {
        let _ = self.commands.send(StreamCommand::Pause);
    }

    fn resume(&self) {
        let _ = self.commands.send(StreamCommand::Resume);
    }

    fn close(&self) {
        let _ = self.commands.send(StreamCommand::Close);
    }
}

/// Owns a `cubeb::Context`/`cubeb::Stream` pair on a dedicated thread. `Pause`/`Resume`/
/// `SetVolume`/`Close` are real `cubeb` calls made from that thread, never from the realtime
/// data callback.
pub struct CubebOutput {
    sink: CubebSink,
    command_tx: mpsc::Sender<StreamCommand>,
}

impl AudioOutput for CubebOutput {
    type Sink = CubebSink;

    fn open(render_callback: RenderCallback) -> Result<Self, Error> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), Error>>(0);
        let (command_tx, command_rx) = mpsc::channel::<StreamCommand>();

        let spawned = std::thread::Builder::new()
            .name("gapless-cubeb-output".into())
            .spawn(move || match build_stream(render_callback) {
                Ok(owned) => {
                    let _ = ready_tx.send(Ok(()));
                    run_command_loop(owned, command_rx);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            });
        if spawned.is_err() {
            return Err(Error::ResourceAllocationFailed);
        }
        ready_rx.recv().map_err(|_| Error::ResourceAllocationFailed)??;

        let sink = CubebSink {
            format: PcmFormat::new(STREAM_CHANNELS, SAMPLE_RATE),
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            commands: command_tx.clone(),
        };
        Ok(Self { sink, command_tx })
    }

    fn sink(&self) -> Self::Sink {
        self.sink.clone()
    }
}

impl Drop for CubebOutput {
    fn drop(&mut self) {
        let _ = self.command_tx.send(StreamCommand::Close);
    }
}

struct OpenStream {
    #[allow(unused)]
    ctx: cubeb::Context,
    stream: cubeb::Stream<Frame>,
}

fn build_stream(render_callback: RenderCallback) -> Result<OpenStream, Error> {
    #[cfg(target_os = "windows")]
    unsafe {
        if let Err(err) = windows::Win32::System::Com::CoInitialize(None) {
            log::error!("CoInitialize failed: {}", err);
        }
    };

    let backend_name = env::var("CUBEB_BACKEND").ok().and_then(|name| CString::new(name).ok());
    let ctx_name = CString::new("gapless-engine").ok();
    let ctx = cubeb::Context::init(ctx_name.as_deref(), backend_name.as_deref())?;

    let params = cubeb::StreamParamsBuilder::new()
        .format(cubeb::SampleFormat::Float32NE)
        .rate(SAMPLE_RATE)
        .channels(STREAM_CHANNELS as u32)
        .layout(cubeb::ChannelLayout::STEREO)
        .take();

    let mut builder = cubeb::StreamBuilder::<Frame>::new();
    builder
        .name("gapless-engine")
        .default_output(&params)
        .latency(STREAM_LATENCY)
        .data_callback(move |_input, output: &mut [Frame]| {
            // Safety: `cubeb::StereoFrame<f32>` is `#[repr(C)] { l: f32, r: f32 }`, bit-identical
            // to two interleaved `f32` samples, so this is a layout-preserving reinterpretation.
            let samples = unsafe {
                std::slice::from_raw_parts_mut(output.as_mut_ptr() as *mut f32, output.len() * 2)
            };
            render_callback.render(samples);
            output.len() as isize
        })
        .state_callback(|state| {
            log::debug!("cubeb stream state: {:?}", state);
        });
    let stream = builder.init(&ctx)?;

    Ok(OpenStream { ctx, stream })
}

/// Processes pause/resume/volume/close requests for as long as the `CubebOutput` (and every
/// `CubebSink` clone holding `command_tx`) is alive; exits and drops `owned` on `Close` or once
/// every sender has gone away.
fn run_command_loop(mut owned: OpenStream, command_rx: mpsc::Receiver<StreamCommand>) {
    while let Ok(command) = command_rx.recv() {
        match command {
            StreamCommand::Pause => {
                if let Err(err) = owned.stream.stop() {
                    log::error!("failed to stop cubeb stream: {}", err);
                }
            }
            StreamCommand::Resume => {
                if let Err(err) = owned.stream.start() {
                    log::error!("failed to start cubeb stream: {}", err);
                }
            }
            StreamCommand::SetVolume(volume) => {
                if let Err(err) = owned.stream.set_volume(volume) {
                    log::error!("failed to set cubeb stream volume: {}", err);
                }
            }
            StreamCommand::Close => {
                let _ = owned.stream.stop();
                break;
            }
        }
    }
}
