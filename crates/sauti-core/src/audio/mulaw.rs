//! Mu-law companding between f32 samples and quantization classes.

/// Encode a sample in `[-1, 1]` to one of `n_quant` classes.
pub fn encode(sample: f32, n_quant: usize) -> u32 {
    let mu = (n_quant - 1) as f32;
    let x = sample.clamp(-1.0, 1.0);
    let compressed = x.signum() * (1.0 + mu * x.abs()).ln() / (1.0 + mu).ln();
    ((compressed + 1.0) / 2.0 * mu + 0.5) as u32
}

/// Decode a class back to the center of its amplitude bin.
pub fn decode(class: u32, n_quant: usize) -> f32 {
    let mu = (n_quant - 1) as f32;
    let y = 2.0 * class as f32 / mu - 1.0;
    y.signum() * ((1.0 + mu).powf(y.abs()) - 1.0) / mu
}

/// Encode a whole clip.
pub fn encode_clip(samples: &[f32], n_quant: usize) -> Vec<u32> {
    samples.iter().map(|&x| encode(x, n_quant)).collect()
}
