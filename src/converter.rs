use crate::error::Error;
use crate::format::PcmFormat;

// -------------------------------------------------------------------------------------------------

/// External collaborator: pulls PCM from the ring buffer (via `input_callback`) and fills the
/// device's output buffers, resampling and channel-mapping between `ring_buffer_format` and
/// `stream_virtual_format` as needed (§6).
///
/// `input_callback` returns one ring-buffer-aligned slab of interleaved source-format PCM per
/// invocation and may be called more than once per `fill`. Implementations must not allocate on
/// the `fill` path once constructed.
pub trait Converter: Send {
    /// Number of source frames needed to produce `output_frames` destination frames.
    fn calculate_input_buffer_size(&self, output_frames: usize) -> usize;

    /// Fill the first `output_frames` frames of `output` (interleaved, destination format).
    /// Returns the number of destination frames actually written.
    fn fill(
        &mut self,
        output: &mut [f32],
        output_frames: usize,
        input_callback: &mut dyn FnMut(&mut [f32]) -> usize,
    ) -> usize;

    /// Drop any buffered history (used after a seek, per §4.4.1).
    fn reset(&mut self);

    fn dispose(self: Box<Self>) {}
}

// -------------------------------------------------------------------------------------------------

/// Fast path for the common case where `ring_buffer_format == stream_virtual_format`: a straight
/// copy, no resampling state to carry across calls.
pub struct IdentityConverter {
    channels: usize,
}

impl IdentityConverter {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            channels: format.channels as usize,
        }
    }
}

impl Converter for IdentityConverter {
    fn calculate_input_buffer_size(&self, output_frames: usize) -> usize {
        output_frames * self.channels
    }

    fn fill(
        &mut self,
        output: &mut [f32],
        output_frames: usize,
        input_callback: &mut dyn FnMut(&mut [f32]) -> usize,
    ) -> usize {
        let needed = output_frames * self.channels;
        input_callback(&mut output[..needed.min(output.len())])
    }

    fn reset(&mut self) {}
}

// -------------------------------------------------------------------------------------------------

/// Resampling/channel-mapping converter backed by `rubato`'s sinc-interpolated fixed-output
/// resampler, used whenever source and destination sample rates or channel counts differ.
pub struct RubatoConverter {
    src_format: PcmFormat,
    dst_format: PcmFormat,
    resampler: rubato::SincFixedOut<f32>,
    input_deinterleaved: Vec<Vec<f32>>,
    output_deinterleaved: Vec<Vec<f32>>,
    interleave_scratch: Vec<f32>,
}

impl RubatoConverter {
    pub fn new(src_format: PcmFormat, dst_format: PcmFormat) -> Result<Self, Error> {
        let channels = src_format.channels as usize;
        let ratio = dst_format.sample_rate as f64 / src_format.sample_rate as f64;
        let params = rubato::SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: rubato::SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: rubato::WindowFunction::BlackmanHarris2,
        };
        let chunk_size = 1024;
        let resampler =
            rubato::SincFixedOut::<f32>::new(ratio, 2.0, params, chunk_size, channels)?;
        let input_frames = resampler.input_frames_max();
        Ok(Self {
            src_format,
            dst_format,
            input_deinterleaved: vec![Vec::with_capacity(input_frames); channels],
            output_deinterleaved: vec![Vec::with_capacity(chunk_size); channels],
            interleave_scratch: Vec::with_capacity(chunk_size * channels),
            resampler,
        })
    }
}

impl Converter for RubatoConverter {
    fn calculate_input_buffer_size(&self, output_frames: usize) -> usize {
        let ratio = self.src_format.sample_rate as f64 / self.dst_format.sample_rate as f64;
        ((output_frames as f64) * ratio).ceil() as usize * self.src_format.channels as usize
    }

    fn fill(
        &mut self,
        output: &mut [f32],
        output_frames: usize,
        input_callback: &mut dyn FnMut(&mut [f32]) -> usize,
    ) -> usize {
        let channels = self.src_format.channels as usize;
        let mut written = 0usize;
        while written < output_frames {
            let needed_input_frames = self.resampler.input_frames_next();
            self.interleave_scratch
                .resize(needed_input_frames * channels, 0.0);
            let produced = input_callback(&mut self.interleave_scratch);
            for ch in self.input_deinterleaved.iter_mut() {
                ch.clear();
                ch.resize(needed_input_frames, 0.0);
            }
            for frame in 0..produced {
                for ch in 0..channels {
                    self.input_deinterleaved[ch][frame] =
                        self.interleave_scratch[frame * channels + ch];
                }
            }
            let (_, out_frames) = match self
                .resampler
                .process_into_buffer(&self.input_deinterleaved, &mut self.output_deinterleaved, None)
            {
                Ok(frames) => frames,
                Err(_) => return written,
            };
            let remaining = output_frames - written;
            let take = out_frames.min(remaining);
            for frame in 0..take {
                let dst_off = (written + frame) * channels;
                for ch in 0..channels {
                    output[dst_off + ch] = self.output_deinterleaved[ch][frame];
                }
            }
            written += take;
            if produced == 0 {
                break;
            }
        }
        written
    }

    fn reset(&mut self) {
        self.resampler.reset();
    }
}

/// Choose the identity fast path when formats already match, else a resampling converter.
pub fn build_converter(src: PcmFormat, dst: PcmFormat) -> Result<Box<dyn Converter>, Error> {
    if src == dst {
        Ok(Box::new(IdentityConverter::new(dst)))
    } else {
        Ok(Box::new(RubatoConverter::new(src, dst)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_converter_copies_through_unchanged() {
        let format = PcmFormat::new(2, 44100);
        let mut converter = IdentityConverter::new(format);
        let mut output = vec![0.0f32; 8];
        let n = converter.fill(&mut output, 4, &mut |buf| {
            buf.iter_mut().enumerate().for_each(|(i, s)| *s = i as f32);
            buf.len()
        });
        assert_eq!(n, 8);
        assert_eq!(output, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn build_converter_picks_identity_for_matching_formats() {
        let format = PcmFormat::new(1, 48000);
        let converter = build_converter(format, format).unwrap();
        assert_eq!(converter.calculate_input_buffer_size(10), 10);
    }
}
