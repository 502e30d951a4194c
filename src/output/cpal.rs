use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::error::Error;
use crate::format::PcmFormat;
use crate::output::{AudioOutput, AudioSink};
use crate::render_callback::RenderCallback;

// -------------------------------------------------------------------------------------------------

struct SinkState {
    format: PcmFormat,
    volume_bits: AtomicU32,
    paused: AtomicBool,
}

/// Cheaply cloneable handle to a running `cpal` stream. Nothing here touches the stream
/// itself; `pause`/`resume`/`set_volume` just flip atomics the data callback reads.
#[derive(Clone)]
pub struct CpalSink {
    state: Arc<SinkState>,
}

impl AudioSink for CpalSink {
    fn format(&self) -> PcmFormat {
        self.state.format
    }

    fn set_volume(&self, volume: f32) {
        self.state.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.state.volume_bits.load(Ordering::Relaxed))
    }

    fn pause(&self) {
        self.state.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.state.paused.store(false, Ordering::Release);
    }

    fn close(&self) {
        self.state.paused.store(true, Ordering::Release);
    }
}

/// Owns a `cpal::Stream` on a dedicated thread: `cpal::Stream` is not `Send` on every
/// platform, so the stream is built, played, and dropped from the same thread. `CpalOutput`
/// keeps that thread alive via a rendezvous drop-guard channel, matching the output stream's
/// ownership lifetime to the `CpalOutput` value's own lifetime.
pub struct CpalOutput {
    sink: CpalSink,
    _guard: mpsc::SyncSender<()>,
}

impl AudioOutput for CpalOutput {
    type Sink = CpalSink;

    fn open(render_callback: RenderCallback) -> Result<Self, Error> {
        Self::open_with_device(None, render_callback)
    }

    fn open_device(device_id: &str, render_callback: RenderCallback) -> Result<Self, Error> {
        Self::open_with_device(Some(device_id), render_callback)
    }

    fn sink(&self) -> Self::Sink {
        self.sink.clone()
    }
}

impl CpalOutput {
    fn open_with_device(
        device_id: Option<&str>,
        render_callback: RenderCallback,
    ) -> Result<Self, Error> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<CpalSink, Error>>(0);
        let (guard_tx, guard_rx) = mpsc::sync_channel::<()>(0);
        let device_id = device_id.map(|id| id.to_string());

        let spawned = std::thread::Builder::new()
            .name("gapless-cpal-output".into())
            .spawn(move || match Self::start_stream(device_id.as_deref(), render_callback) {
                Ok((stream, sink)) => {
                    let _ = ready_tx.send(Ok(sink));
                    // Held alive until `CpalOutput` (holding `guard_tx`) drops.
                    let _ = guard_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            });
        if spawned.is_err() {
            return Err(Error::ResourceAllocationFailed);
        }

        let sink = ready_rx.recv().map_err(|_| Error::ResourceAllocationFailed)??;
        Ok(Self {
            sink,
            _guard: guard_tx,
        })
    }

    fn start_stream(
        device_id: Option<&str>,
        render_callback: RenderCallback,
    ) -> Result<(Stream, CpalSink), Error> {
        let host = cpal::default_host();
        let device = match device_id {
            Some(id) => host
                .output_devices()
                .map_err(|err| Error::DeviceConfigurationFailed(Box::new(err)))?
                .find(|device| device.name().map(|name| name == id).unwrap_or(false))
                .ok_or(Error::InvalidDeviceOrStream)?,
            None => host
                .default_output_device()
                .ok_or(Error::InvalidDeviceOrStream)?,
        };

        let supported_config = device
            .default_output_config()
            .map_err(|err| Error::DeviceConfigurationFailed(Box::new(err)))?;
        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();
        let format = PcmFormat::new(config.channels, config.sample_rate.0);

        let state = Arc::new(SinkState {
            format,
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            paused: AtomicBool::new(true),
        });
        let sink = CpalSink {
            state: Arc::clone(&state),
        };

        let data_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if state.paused.load(Ordering::Acquire) {
                data.fill(0.0);
                return;
            }
            render_callback.render(data);
            let volume = f32::from_bits(state.volume_bits.load(Ordering::Relaxed));
            if volume != 1.0 {
                for sample in data.iter_mut() {
                    *sample *= volume;
                }
            }
        };
        let error_callback = |err| log::error!("output stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::F32 => {
                device.build_output_stream(&config, data_callback, error_callback, None)?
            }
            other => {
                return Err(Error::DeviceConfigurationFailed(Box::new(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("unsupported sample format: {:?}", other),
                ))))
            }
        };
        stream.play()?;

        Ok((stream, sink))
    }
}
