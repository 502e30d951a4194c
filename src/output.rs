#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "cubeb-output")]
pub mod cubeb;

use crate::error::Error;
use crate::format::PcmFormat;
use crate::render_callback::RenderCallback;

/// The enabled audio output type, chosen at compile time by feature flag.
#[cfg(feature = "cpal-output")]
pub type DefaultAudioOutput = cpal::CpalOutput;
#[cfg(all(feature = "cubeb-output", not(feature = "cpal-output")))]
pub type DefaultAudioOutput = cubeb::CubebOutput;

#[cfg(feature = "cpal-output")]
pub type DefaultAudioSink = <DefaultAudioOutput as AudioOutput>::Sink;
#[cfg(all(feature = "cubeb-output", not(feature = "cpal-output")))]
pub type DefaultAudioSink = <DefaultAudioOutput as AudioOutput>::Sink;

// -------------------------------------------------------------------------------------------------

/// A running device stream. `start` hands the render callback to the backend and returns a
/// handle that keeps the stream alive until dropped; backends implement this with whatever
/// realtime-safe callback mechanism they provide (`cpal`'s `build_output_stream`, `cubeb`'s
/// `Stream::init` + data callback).
pub trait AudioSink: Send + Sync {
    fn format(&self) -> PcmFormat;
    fn set_volume(&self, volume: f32);
    fn volume(&self) -> f32;
    fn pause(&self);
    fn resume(&self);
    fn close(&self);
}

pub trait AudioOutput {
    type Sink: AudioSink + 'static;

    /// Open the default output device and start streaming render callbacks into it.
    fn open(render_callback: RenderCallback) -> Result<Self, Error>
    where
        Self: Sized;

    /// Open a specific device by its backend-defined id (§4.7 `set_output_device`). The default
    /// implementation rejects every id; backends that can enumerate devices by name override it.
    fn open_device(_device_id: &str, _render_callback: RenderCallback) -> Result<Self, Error>
    where
        Self: Sized,
    {
        Err(Error::InvalidDeviceOrStream)
    }

    fn sink(&self) -> Self::Sink;
}
