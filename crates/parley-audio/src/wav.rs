use byteorder::{LittleEndian, WriteBytesExt};
use parley_core::AudioError;
use std::io::Write;

/// Size of the canonical RIFF/WAVE header preceding the samples.
pub const HEADER_LEN: usize = 44;
const BYTES_PER_SAMPLE: u32 = 2;
const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Convert a float sample in [-1, 1] to signed 16-bit.
///
/// Out-of-range input is clamped; negatives scale by 32768 and positives by
/// 32767, rounding half away from zero. NaN maps to silence.
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

fn encode_err(e: std::io::Error) -> AudioError {
    AudioError::Encode(e.to_string())
}

/// Write the 44-byte header for `data_len` bytes of 16-bit PCM.
pub fn write_header<W: Write>(
    writer: &mut W,
    sample_rate: u32,
    channels: u16,
    data_len: u32,
) -> Result<(), AudioError> {
    if channels == 0 {
        return Err(AudioError::Encode("channel count must be non-zero".to_string()));
    }
    let block_align = channels as u32 * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate
        .checked_mul(block_align)
        .ok_or_else(|| AudioError::Encode("byte rate overflows u32".to_string()))?;
    let riff_len = data_len
        .checked_add(36)
        .ok_or_else(|| AudioError::Encode("container larger than 4 GiB".to_string()))?;

    writer.write_all(b"RIFF").map_err(encode_err)?;
    writer.write_u32::<LittleEndian>(riff_len).map_err(encode_err)?;
    writer.write_all(b"WAVE").map_err(encode_err)?;

    writer.write_all(b"fmt ").map_err(encode_err)?;
    writer.write_u32::<LittleEndian>(FMT_CHUNK_LEN).map_err(encode_err)?;
    writer.write_u16::<LittleEndian>(FORMAT_PCM).map_err(encode_err)?;
    writer.write_u16::<LittleEndian>(channels).map_err(encode_err)?;
    writer.write_u32::<LittleEndian>(sample_rate).map_err(encode_err)?;
    writer.write_u32::<LittleEndian>(byte_rate).map_err(encode_err)?;
    writer.write_u16::<LittleEndian>(block_align as u16).map_err(encode_err)?;
    writer.write_u16::<LittleEndian>(16).map_err(encode_err)?;

    writer.write_all(b"data").map_err(encode_err)?;
    writer.write_u32::<LittleEndian>(data_len).map_err(encode_err)?;
    Ok(())
}

/// Serialize interleaved float samples as a complete 16-bit PCM container.
pub fn encode_interleaved(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<u8>, AudioError> {
    if channels == 0 || samples.len() % channels as usize != 0 {
        return Err(AudioError::Encode(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }
    let data_len = u32::try_from(samples.len() * BYTES_PER_SAMPLE as usize)
        .map_err(|_| AudioError::Encode("container larger than 4 GiB".to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    write_header(&mut out, sample_rate, channels, data_len)?;
    for &sample in samples {
        out.write_i16::<LittleEndian>(quantize(sample)).map_err(encode_err)?;
    }
    Ok(out)
}

/// Interleave planar channels frame by frame.
pub(crate) fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for channel in channels {
            out.push(channel.get(i).copied().unwrap_or(0.0));
        }
    }
    out
}
