//! Re-encoding synthesized captures and reading the result back.

use bytes::Bytes;
use parley_audio::wav::HEADER_LEN;
use parley_audio::{reencode, reencode_blocking};
use parley_core::{AudioCapture, AudioError, ErrorKind};
use std::io::Cursor;

fn synth_wav(sample_rate: u32, channels: u16, frames: usize) -> AudioCapture {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            for ch in 0..channels {
                let freq = 220.0 * (ch as f32 + 1.0);
                let v = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.6;
                writer.write_sample((v * 32767.0) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    AudioCapture::new(cursor.into_inner())
}

fn expected_frames(frames: usize, native: u32) -> usize {
    (frames as f64 * 16_000.0 / native as f64).round() as usize
}

fn read_back(bytes: &Bytes) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

#[test]
fn test_reencode_stereo_44k_to_16k() {
    let capture = synth_wav(44_100, 2, 22_050);
    let encoded = reencode_blocking(&capture).unwrap();
    let (spec, samples) = read_back(&encoded);

    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    assert_eq!(samples.len(), expected_frames(22_050, 44_100) * 2);
}

#[test]
fn test_reencode_is_byte_for_byte_deterministic() {
    let capture = synth_wav(48_000, 1, 12_345);
    let first = reencode_blocking(&capture).unwrap();
    let second = reencode_blocking(&capture).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_header_length_fields_match_data() {
    let capture = synth_wav(32_000, 1, 9_999);
    let encoded = reencode_blocking(&capture).unwrap();
    let data_bytes = encoded.len() - HEADER_LEN;
    let riff_len = u32::from_le_bytes(encoded[4..8].try_into().unwrap()) as usize;
    let data_len = u32::from_le_bytes(encoded[40..44].try_into().unwrap()) as usize;
    assert_eq!(riff_len, 36 + data_bytes);
    assert_eq!(data_len, data_bytes);
    assert_eq!(data_bytes, expected_frames(9_999, 32_000) * 2);
}

#[test]
fn test_reencode_at_target_rate_keeps_samples() {
    let capture = synth_wav(16_000, 1, 1_000);
    let encoded = reencode_blocking(&capture).unwrap();
    let (_, out) = read_back(&encoded);

    let mut original = hound::WavReader::new(Cursor::new(capture.as_bytes().to_vec())).unwrap();
    let input: Vec<i16> = original.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(out.len(), input.len());
    for (a, b) in input.iter().zip(&out) {
        assert!((*a as i32 - *b as i32).abs() <= 1, "{} vs {}", a, b);
    }
}

#[test]
fn test_reencode_rejects_unrecognised_codec() {
    let capture = AudioCapture::new(b"OggS but not really an ogg stream".to_vec());
    match reencode_blocking(&capture) {
        Err(err @ AudioError::Decode(_)) => assert_eq!(err.kind(), Some(ErrorKind::DecodeError)),
        other => panic!("expected Decode error, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_async_reencode_matches_blocking() {
    let capture = synth_wav(22_050, 1, 4_410);
    let blocking = reencode_blocking(&capture).unwrap();
    let async_result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        reencode(capture.clone()),
    )
    .await
    .expect("re-encode timed out")
    .unwrap();
    assert_eq!(blocking, async_result);
}
