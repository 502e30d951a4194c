use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Enumeration of all possible errors reported by the engine.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// The requested output device or stream id does not exist.
    InvalidDeviceOrStream,
    /// A ring buffer, converter, or output stream failed to allocate.
    ResourceAllocationFailed,
    /// A decoder failed to open and was dropped from the pending queue.
    DecoderRejected(Box<dyn error::Error + Send + Sync>),
    /// `enqueue` was rejected because the decoder's format doesn't match `ring_buffer_format`.
    FormatMismatchOnEnqueue,
    /// `seek_to_frame`/`seek_by` was called on a decoder that doesn't support seeking.
    SeekUnsupported,
    /// The decoder's seek call itself failed.
    SeekFailed,
    /// Opening or reconfiguring the output device/stream failed.
    DeviceConfigurationFailed(Box<dyn error::Error + Send + Sync>),
    /// Defensive: a `RingBuffer::store` would have overrun the reader. Must not occur
    /// on the hot path; surfaced only to make a logic error visible during development.
    BufferOverrun,
    AudioDecodingError(Box<dyn error::Error + Send + Sync>),
    ResamplingError(Box<dyn error::Error + Send + Sync>),
    IoError(io::Error),
    SendError,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDeviceOrStream => write!(f, "invalid output device or stream id"),
            Self::ResourceAllocationFailed => write!(f, "failed to allocate a playback resource"),
            Self::DecoderRejected(err) => write!(f, "decoder rejected: {err}"),
            Self::FormatMismatchOnEnqueue => {
                write!(f, "decoder's format doesn't match the active ring buffer format")
            }
            Self::SeekUnsupported => write!(f, "decoder does not support seeking"),
            Self::SeekFailed => write!(f, "seek failed"),
            Self::DeviceConfigurationFailed(err) => write!(f, "device configuration failed: {err}"),
            Self::BufferOverrun => write!(f, "ring buffer store would overrun the reader"),
            Self::AudioDecodingError(err) => err.fmt(f),
            Self::ResamplingError(err) => err.fmt(f),
            Self::IoError(err) => err.fmt(f),
            Self::SendError => write!(f, "failed to send message into a channel"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        Error::AudioDecodingError(Box::new(err))
    }
}

impl From<rubato::ResamplerConstructionError> for Error {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        Error::ResamplingError(Box::new(err))
    }
}

impl From<rubato::ResampleError> for Error {
    fn from(err: rubato::ResampleError) -> Self {
        Error::ResamplingError(Box::new(err))
    }
}

#[cfg(feature = "cpal-output")]
impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Self {
        Error::DeviceConfigurationFailed(Box::new(err))
    }
}

#[cfg(feature = "cpal-output")]
impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Self {
        Error::DeviceConfigurationFailed(Box::new(err))
    }
}

#[cfg(feature = "cpal-output")]
impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        Error::DeviceConfigurationFailed(Box::new(err))
    }
}

#[cfg(feature = "cubeb-output")]
impl From<cubeb::Error> for Error {
    fn from(err: cubeb::Error) -> Self {
        Error::DeviceConfigurationFailed(Box::new(err))
    }
}
