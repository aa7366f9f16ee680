use parley_core::AudioError;
use rubato::{FftFixedIn, Resampler};

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Output length for `frames` input frames, rounded to nearest.
pub(crate) fn target_frames(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    let num = frames as u128 * to_rate as u128;
    let den = from_rate as u128;
    ((2 * num + den) / (2 * den)) as usize
}

/// Offline whole-buffer resample of every channel from `from_rate` to
/// `to_rate`.
///
/// Output has exactly [`target_frames`] frames per channel: the resampler's
/// leading delay is dropped, the tail is flushed, and the result is
/// truncated or zero-padded to length.
pub(crate) fn resample(
    channels: &[Vec<f32>],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    if from_rate == to_rate {
        return Ok(channels.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid rates {} -> {}",
            from_rate, to_rate
        )));
    }
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    let wanted = target_frames(frames, from_rate, to_rate);
    if channels.is_empty() || frames == 0 {
        return Ok(vec![Vec::new(); channels.len()]);
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK, SUB_CHUNKS, channels.len())
            .map_err(|e| AudioError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();
    let needed = delay + wanted;

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(needed + CHUNK); channels.len()];
    let mut pos = 0;
    loop {
        let next = resampler.input_frames_next();
        if frames - pos < next {
            break;
        }
        let block: Vec<&[f32]> = channels.iter().map(|c| &c[pos..pos + next]).collect();
        let produced = resampler
            .process(&block[..], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        append(&mut out, produced);
        pos += next;
    }

    if pos < frames {
        let tail: Vec<&[f32]> = channels.iter().map(|c| &c[pos..]).collect();
        let produced = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        append(&mut out, produced);
    }

    while out[0].len() < needed {
        let produced = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if produced.first().map(Vec::is_empty).unwrap_or(true) {
            break;
        }
        append(&mut out, produced);
    }

    for channel in out.iter_mut() {
        channel.drain(..delay.min(channel.len()));
        channel.resize(wanted, 0.0);
    }
    tracing::trace!(frames, wanted, delay, "resampled {} -> {}", from_rate, to_rate);
    Ok(out)
}

fn append(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(block) {
        dst.extend_from_slice(&src);
    }
}
