use bytes::Bytes;
use parley_core::{AudioCapture, AudioError, TARGET_SAMPLE_RATE};

use crate::decode::decode;
use crate::resample::resample;
use crate::wav::{encode_interleaved, interleave};

/// Decode, resample to 16 kHz and serialize a capture as 16-bit PCM.
///
/// Pure and deterministic: the same capture always yields the same bytes.
pub fn reencode_blocking(capture: &AudioCapture) -> Result<Bytes, AudioError> {
    let pcm = decode(&capture.to_bytes())?;
    let channels = u16::try_from(pcm.channel_count())
        .map_err(|_| AudioError::Encode(format!("{} channels", pcm.channel_count())))?;

    let resampled = resample(&pcm.channels, pcm.sample_rate, TARGET_SAMPLE_RATE)?;
    let encoded = encode_interleaved(&interleave(&resampled), TARGET_SAMPLE_RATE, channels)?;
    tracing::debug!(
        native_rate = pcm.sample_rate,
        channels,
        input_frames = pcm.frames(),
        output_frames = resampled.first().map(Vec::len).unwrap_or(0),
        bytes = encoded.len(),
        "capture re-encoded"
    );
    Ok(Bytes::from(encoded))
}

/// Re-encode off the async runtime. One-shot; there are no partial results.
pub async fn reencode(capture: AudioCapture) -> Result<Bytes, AudioError> {
    tokio::task::spawn_blocking(move || reencode_blocking(&capture))
        .await
        .map_err(|e| AudioError::Encode(format!("re-encode task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reencode_unknown_codec_is_decode_error() {
        let capture = AudioCapture::new(vec![0x1au8, 0x45, 0xdf, 0xa3, 0, 0, 0]);
        let err = reencode_blocking(&capture).unwrap_err();
        assert_eq!(err.kind(), Some(parley_core::ErrorKind::DecodeError));
    }

    #[tokio::test]
    async fn test_reencode_async_propagates_decode_error() {
        let result = reencode(AudioCapture::new(Vec::<u8>::new())).await;
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }
}
