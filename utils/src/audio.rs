use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

/// Builds a mono resampler converting `in_sampling_rate` input chunks
/// of `chunk_size` samples to `out_sampling_rate`.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits samples into fixed-size chunks, zero-padding the tail.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Quantizes normalized f32 samples to 16-bit PCM.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32);
            scaled as i16
        })
        .collect()
}

/// Base64-encodes PCM16 samples as little-endian bytes, the layout the
/// inference endpoint expects for audio chunks.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    encode_bytes(&bytes)
}

/// Base64-encodes an opaque byte payload (e.g. a JPEG still).
pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
