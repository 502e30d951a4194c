/// Describes the PCM layout of a stream of audio frames.
///
/// Two formats are considered a gapless join candidate only when they are bit-exactly
/// equal (per §8: "with mismatch, B is rejected"). Channel-layout identity (e.g. stereo vs.
/// dual-mono) is folded into `channels` here rather than modeled as a separate tag, per the
/// Open Question decision in `SPEC_FULL.md` §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bytes_per_frame: u16,
    pub non_interleaved: bool,
}

impl PcmFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bytes_per_frame: channels * std::mem::size_of::<f32>() as u16,
            non_interleaved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_bit_exact_on_all_fields() {
        let a = PcmFormat::new(2, 44100);
        let b = PcmFormat::new(2, 44100);
        let c = PcmFormat::new(2, 48000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
