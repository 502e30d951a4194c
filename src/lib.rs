//! **gapless-engine** is a realtime, gapless audio playback pipeline core: a lock-free ring
//! buffer fed by a dedicated decoder-worker thread, drained by a device-driven render callback,
//! with a deferred-reclamation collector thread running alongside.
//!
//! It implements sequential, non-overlapping playback: decoders are attributed frames in
//! timestamp order rather than mixed, so one track's tail and the next track's head are handed
//! to the device back-to-back with no silence or re-open between them.
//!
//! ## Features
//!
//! - A wait-free [`RenderCallback`](render_callback::RenderCallback) invoked directly from the
//!   device backend's audio thread: no allocation, no locking, no blocking syscalls.
//! - A [`DecoderWorker`](decoder_worker::DecoderWorker) running at elevated scheduling priority
//!   that decodes ahead of playback into the ring buffer and services seeks.
//! - A [`Collector`](collector::Collector) that reclaims finished decoder state off the realtime
//!   path, and is the only thread allowed to pause the device on the render path's behalf.
//! - Gapless enqueue: a decoder is accepted only if its [`PcmFormat`] matches the pipeline's
//!   current format bit-exactly; mismatches are rejected with ownership returned to the caller.
//! - Audio output via [cpal](https://github.com/RustAudio/cpal) or
//!   [cubeb](https://github.com/mozilla/cubeb) (cpal is enabled by default), decoding most common
//!   audio file formats thanks to [Symphonia](https://github.com/pdeljanov/Symphonia), and
//!   resampling to the output device's signal spec thanks to
//!   [rubato](https://github.com/HEnquist/rubato).
//!
//! ## Example
//!
//! ```no_run
//! use gapless_engine::{DefaultAudioOutput, AudioOutput, Error, PlayerController, SymphoniaDecoder};
//!
//! # fn main() -> Result<(), Error> {
//! let mut player = PlayerController::<DefaultAudioOutput>::new(None);
//! player.open_default_output()?;
//!
//! player
//!     .enqueue(Box::new(SymphoniaDecoder::new("track1.flac".to_string())?))
//!     .map_err(|(_, err)| err)?;
//! player
//!     .enqueue(Box::new(SymphoniaDecoder::new("track2.flac".to_string())?))
//!     .map_err(|(_, err)| err)?;
//!
//! player.play();
//! # Ok(()) }
//! ```
//!
//! ## Overview
//!
//! ### AudioOutput
//!
//! Audio devices are controlled via the [`AudioOutput`] and [`AudioSink`] traits, implemented
//! with either `cpal` or `cubeb` behind the `cpal-output`/`cubeb-output` feature flags. The
//! currently enabled implementation is available via [`DefaultAudioOutput`]/[`DefaultAudioSink`].
//!
//! ### Decoder
//!
//! A [`Decoder`] produces PCM frames from a URL; [`SymphoniaDecoder`] is the bundled
//! implementation, but any type implementing the trait can be enqueued.
//!
//! ### PlayerController
//!
//! [`PlayerController`] is the orchestrator: `enqueue`, `play`/`pause`/`stop`, `seek_to_frame`,
//! device/volume control, all backed by the render callback, decoder worker and collector
//! described above.
mod active_set;
mod collector;
mod converter;
mod decoder;
mod decoder_state;
mod decoder_worker;
mod error;
mod format;
mod output;
mod player;
mod render_callback;
mod ring_buffer;
mod symphonia_decoder;
pub mod utils;

#[cfg(test)]
mod test_support;

// re-exports
pub use decoder::{Decoder, DecoderLifecycleEvent, LifecycleSender};
pub use error::Error;
pub use format::PcmFormat;
pub use output::{AudioOutput, AudioSink, DefaultAudioOutput, DefaultAudioSink};
pub use player::{PlaybackStatusEvent, PlayerController};
pub use render_callback::RenderCallback;
pub use symphonia_decoder::SymphoniaDecoder;
