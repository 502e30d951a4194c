use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as SymphoniaCodec, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;

use crate::decoder::Decoder;
use crate::error::Error;
use crate::format::PcmFormat;

// -------------------------------------------------------------------------------------------------

/// A `Decoder` backed by `symphonia`'s probe/format-reader/codec stack. Decodes one packet at a
/// time into an interleaved scratch queue that `read` drains, so a caller asking for fewer
/// frames than a packet holds doesn't force us to re-decode anything.
pub struct SymphoniaDecoder {
    url: String,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaCodec>,
    track_id: u32,
    format: PcmFormat,
    time_base: Option<TimeBase>,
    seekable: bool,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Interleaved samples decoded from the most recent packet(s) but not yet handed to a caller.
    leftover: Vec<f32>,
    position: u64,
}

impl SymphoniaDecoder {
    pub fn new(url: String) -> Result<Self, Error> {
        let file = File::open(&url)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let seekable = mss.is_seekable();

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(&url).extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let format_options = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_options = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_options, &metadata_options)?;
        let reader = probed.format;

        let track = reader.default_track().ok_or_else(|| {
            Error::DecoderRejected(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no default track",
            )))
        })?;
        let track_id = track.id;

        let channels = track
            .codec_params
            .channels
            .map(|channels| channels.count() as u16)
            .unwrap_or(2);
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
        let time_base = track
            .codec_params
            .time_base
            .or_else(|| Some(TimeBase::new(1, sample_rate)));

        let decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        Ok(Self {
            url,
            reader,
            decoder,
            track_id,
            format: PcmFormat::new(channels, sample_rate),
            time_base,
            seekable,
            sample_buf: None,
            leftover: Vec::new(),
            position: 0,
        })
    }

    /// Decode the next packet belonging to our track into `leftover`. Returns `false` on EOS.
    fn decode_next_packet(&mut self) -> bool {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(_) => return false,
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let duration = decoded.capacity() as u64;
                    let sample_buf = self
                        .sample_buf
                        .get_or_insert_with(|| SampleBuffer::new(duration, spec));
                    sample_buf.copy_interleaved_ref(decoded);
                    self.leftover.extend_from_slice(sample_buf.samples());
                    return true;
                }
                Err(symphonia::core::errors::Error::DecodeError(err)) => {
                    log::warn!("skipping corrupt packet in {}: {}", self.url, err);
                    continue;
                }
                Err(_) => return false,
            }
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn url(&self) -> &str {
        &self.url
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn supports_seeking(&self) -> bool {
        self.seekable
    }

    fn current_frame(&self) -> u64 {
        self.position
    }

    fn seek_to_frame(&mut self, frame: u64) -> Option<u64> {
        let time_base = self.time_base?;
        let time = time_base.calc_time(frame);
        match self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        ) {
            Ok(seeked) => {
                self.decoder.reset();
                self.leftover.clear();
                self.position = seeked.actual_ts;
                Some(seeked.actual_ts)
            }
            Err(err) => {
                log::warn!("seek failed on {}: {}", self.url, err);
                None
            }
        }
    }

    fn read(&mut self, buffers: &mut [f32], max_frames: usize) -> usize {
        let channels = self.format.channels as usize;
        let mut produced = 0usize;

        while produced < max_frames {
            if self.leftover.is_empty() && !self.decode_next_packet() {
                break;
            }

            let want_samples = (max_frames - produced) * channels;
            let take_samples = want_samples.min(self.leftover.len());
            if take_samples == 0 {
                break;
            }
            let dst_start = produced * channels;
            buffers[dst_start..dst_start + take_samples]
                .copy_from_slice(&self.leftover[..take_samples]);
            self.leftover.drain(..take_samples);
            produced += take_samples / channels;
        }

        self.position += produced as u64;
        produced
    }
}
