use parley_core::AudioError;
use std::borrow::Cow;
use std::io::Cursor;

use bytes::Bytes;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

/// Planar floating-point samples at the capture's native rate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PcmBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

fn append_planar<T>(channels: &mut Vec<Vec<f32>>, data: Cow<'_, AudioBuffer<T>>)
where
    T: Sample,
    f32: FromSample<T>,
{
    let count = data.spec().channels.count();
    if channels.len() < count {
        channels.resize_with(count, Vec::new);
    }
    for (ch, out) in channels.iter_mut().enumerate().take(count) {
        out.extend(data.chan(ch).iter().map(|v| f32::from_sample(*v)));
    }
}

/// Decode a compressed capture into planar PCM.
///
/// The container and codec are probed from the bytes themselves. Packets
/// that fail to decode are skipped; a capture that yields no frames at all
/// is a [`AudioError::Decode`].
pub(crate) fn decode(data: &Bytes) -> Result<PcmBuffer, AudioError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(data.clone())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(format!("unrecognised container: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("no decodable audio track".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("unsupported codec: {}", e)))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                tracing::warn!("stopping decode at unreadable packet: {}", e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                skipped += 1;
                tracing::warn!("skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };
        if sample_rate.is_none() {
            sample_rate = Some(decoded.spec().rate);
        }
        match decoded {
            AudioBufferRef::U8(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::U16(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::U24(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::U32(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::S8(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::S16(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::S24(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::S32(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::F32(buf) => append_planar(&mut channels, buf),
            AudioBufferRef::F64(buf) => append_planar(&mut channels, buf),
        }
    }

    let pcm = PcmBuffer {
        channels,
        sample_rate: sample_rate.unwrap_or(0),
    };
    if pcm.frames() == 0 {
        return Err(AudioError::Decode("capture contains no audio frames".to_string()));
    }
    if pcm.sample_rate == 0 {
        return Err(AudioError::Decode("capture has no sample rate".to_string()));
    }
    tracing::debug!(
        frames = pcm.frames(),
        channels = pcm.channel_count(),
        sample_rate = pcm.sample_rate,
        skipped,
        "decoded capture"
    );
    Ok(pcm)
}
