// ABOUTME: PCM decoder implementation
// ABOUTME: Parses the RIFF/WAVE codec header and normalizes 16/24/32-bit samples

use crate::audio::decode::Decoder;
use crate::audio::{Codec, SampleFormat};
use crate::error::Error;
use crate::protocol::messages::CodecHeader;

/// Decoder for raw little-endian PCM
#[derive(Debug, Clone)]
pub struct PcmDecoder {
    format: SampleFormat,
    scale: f32,
}

impl PcmDecoder {
    /// Create a decoder for a validated format
    pub fn new(format: SampleFormat) -> Result<Self, Error> {
        format.validate()?;
        let scale = 1.0 / (1u64 << (format.bits_per_sample - 1)) as f32;
        Ok(Self { format, scale })
    }

    /// Build a decoder from the stream's codec header.
    ///
    /// Fails with `UnsupportedCodec` for anything but `"pcm"` and with
    /// `UnsupportedFormat` if the announced layout cannot be rendered.
    pub fn from_codec_header(header: &CodecHeader) -> Result<Self, Error> {
        Codec::from_name(&header.codec)?;
        Self::new(parse_riff_header(&header.payload)?)
    }
}

impl Decoder for PcmDecoder {
    fn format(&self) -> &SampleFormat {
        &self.format
    }

    fn decode_into(&self, data: &[u8], out: &mut [f32]) -> usize {
        let sample_size = self.format.sample_size();
        let mut written = 0;
        for (dst, src) in out.iter_mut().zip(data.chunks_exact(sample_size)) {
            let raw = match self.format.bits_per_sample {
                16 => i16::from_le_bytes([src[0], src[1]]) as i32,
                // 24 significant bits in a 4-byte container; shift up then back to sign-extend
                24 => i32::from_le_bytes([src[0], src[1], src[2], src[3]]) << 8 >> 8,
                _ => i32::from_le_bytes([src[0], src[1], src[2], src[3]]),
            };
            *dst = raw as f32 * self.scale;
            written += 1;
        }
        written
    }
}

/// Extract the sample format from a RIFF/WAVE header
pub fn parse_riff_header(data: &[u8]) -> Result<SampleFormat, Error> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(Error::UnsupportedFormat(
            "PCM codec header is not a RIFF/WAVE header".to_string(),
        ));
    }

    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        let body = pos + 8;

        if id == b"fmt " {
            if len < 16 || body + 16 > data.len() {
                return Err(Error::UnsupportedFormat("Truncated fmt chunk".to_string()));
            }
            let fmt = &data[body..body + 16];
            let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
            let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
            let bits_per_sample = u16::from_le_bytes([fmt[14], fmt[15]]);
            return Ok(SampleFormat::new(sample_rate, channels, bits_per_sample));
        }

        // Chunks are padded to even length
        pos = body + len + (len & 1);
    }

    Err(Error::UnsupportedFormat(
        "RIFF header has no fmt chunk".to_string(),
    ))
}

/// Build a canonical 44-byte RIFF/WAVE header for `format`
pub fn riff_header(format: &SampleFormat) -> Vec<u8> {
    let block_align = format.frame_size() as u16;
    let byte_rate = format.sample_rate * block_align as u32;

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&36u32.to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&format.channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}
