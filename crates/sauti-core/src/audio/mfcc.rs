//! MFCC frontend: windowed power spectrum, mel projection, DCT, and the
//! delta/accel feature rows the encoder consumes.
//!
//! Framing is left-anchored: frame t covers samples `[t*hop, t*hop + win)`
//! with no implicit centering, so the frame count matches the chain's MFCC
//! stage exactly.

use candle_core::{Device, Tensor};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{Error, Result};
use crate::model::MfccConfig;

const LOG_GUARD: f32 = 1e-10;
const MEL_BREAK_HZ: f32 = 700.0;
const MEL_SCALE: f32 = 2595.0;
/// Regression window of the delta features, in frames each side.
const DELTA_CONTEXT: usize = 2;

#[derive(Debug, Clone)]
pub struct MfccExtractor {
    window: Vec<f32>,    // [win_length]
    fb: Vec<f32>,        // [n_mels * n_freqs]
    dct: Vec<f32>,       // [n_mfcc * n_mels]
    win_length: usize,
    hop_length: usize,
    n_fft: usize,
    n_freqs: usize,
    n_mels: usize,
    n_mfcc: usize,
}

impl MfccExtractor {
    pub fn new(config: &MfccConfig) -> Result<Self> {
        config.validate()?;
        let n_fft = config.window_size.next_power_of_two();
        let n_freqs = n_fft / 2 + 1;
        Ok(Self {
            window: hann_window(config.window_size),
            fb: mel_filterbank(config.n_mels, n_freqs, n_fft, config.sample_rate as f32),
            dct: dct_basis(config.n_mfcc, config.n_mels),
            win_length: config.window_size,
            hop_length: config.hop_size,
            n_fft,
            n_freqs,
            n_mels: config.n_mels,
            n_mfcc: config.n_mfcc,
        })
    }

    /// Static, delta, and accel rows per kept coefficient.
    pub fn n_channels(&self) -> usize {
        self.n_mfcc * 3
    }

    /// Frames a clip of `samples` samples yields. Zero when the clip is
    /// shorter than one analysis window.
    pub fn frame_count(&self, samples: usize) -> usize {
        if samples < self.win_length {
            0
        } else {
            (samples - self.win_length) / self.hop_length + 1
        }
    }

    /// Feature tensor of shape `(n_mfcc * 3, frames)`.
    pub fn features(&self, audio: &[f32]) -> Result<Tensor> {
        let frames = self.frame_count(audio.len());
        if frames == 0 {
            return Err(Error::config(format!(
                "clip of {} samples is shorter than one analysis window ({})",
                audio.len(),
                self.win_length
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);
        let mut buffer = vec![Complex::<f32>::new(0.0, 0.0); self.n_fft];
        let mut power = vec![0f32; self.n_freqs];

        // coef[i * frames + t]: coefficient i of frame t
        let mut coef = vec![0f32; self.n_mfcc * frames];
        let mut mel_frame = vec![0f32; self.n_mels];

        for t in 0..frames {
            let start = t * self.hop_length;
            let slice = &audio[start..start + self.win_length];

            for (b, (&x, &w)) in buffer.iter_mut().zip(slice.iter().zip(&self.window)) {
                *b = Complex::new(x * w, 0.0);
            }
            for b in buffer.iter_mut().skip(self.win_length) {
                *b = Complex::new(0.0, 0.0);
            }
            fft.process(&mut buffer);
            for (k, p) in power.iter_mut().enumerate() {
                *p = buffer[k].norm_sqr();
            }

            for (m, out) in mel_frame.iter_mut().enumerate() {
                let fb_row = &self.fb[m * self.n_freqs..(m + 1) * self.n_freqs];
                let mut acc = 0f32;
                for (p, w) in power.iter().zip(fb_row) {
                    acc += p * w;
                }
                *out = (acc + LOG_GUARD).ln();
            }

            for i in 0..self.n_mfcc {
                let dct_row = &self.dct[i * self.n_mels..(i + 1) * self.n_mels];
                let mut acc = 0f32;
                for (x, w) in mel_frame.iter().zip(dct_row) {
                    acc += x * w;
                }
                coef[i * frames + t] = acc;
            }
        }

        let mut features = vec![0f32; self.n_channels() * frames];
        features[..self.n_mfcc * frames].copy_from_slice(&coef);
        let delta_base = self.n_mfcc * frames;
        let accel_base = 2 * self.n_mfcc * frames;
        for i in 0..self.n_mfcc {
            let row = &coef[i * frames..(i + 1) * frames];
            let delta = regression_deltas(row);
            let accel = regression_deltas(&delta);
            features[delta_base + i * frames..delta_base + (i + 1) * frames]
                .copy_from_slice(&delta);
            features[accel_base + i * frames..accel_base + (i + 1) * frames]
                .copy_from_slice(&accel);
        }

        Ok(Tensor::from_vec(
            features,
            (self.n_channels(), frames),
            &Device::Cpu,
        )?)
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / len as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    MEL_SCALE * (1.0 + hz / MEL_BREAK_HZ).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    MEL_BREAK_HZ * (10f32.powf(mel / MEL_SCALE) - 1.0)
}

/// Triangular mel filterbank, rows flattened as `[n_mels * n_freqs]`.
fn mel_filterbank(n_mels: usize, n_freqs: usize, n_fft: usize, sample_rate: f32) -> Vec<f32> {
    let mel_hi = hz_to_mel(sample_rate / 2.0);
    let centers: Vec<f32> = (0..n_mels + 2)
        .map(|i| {
            let mel = mel_hi * i as f32 / (n_mels + 1) as f32;
            mel_to_hz(mel) * n_fft as f32 / sample_rate
        })
        .collect();

    let mut fb = vec![0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (left, center, right) = (centers[m], centers[m + 1], centers[m + 2]);
        for k in 0..n_freqs {
            let f = k as f32;
            let weight = if f <= center {
                (f - left) / (center - left)
            } else {
                (right - f) / (right - center)
            };
            if weight > 0.0 {
                fb[m * n_freqs + k] = weight;
            }
        }
    }
    fb
}

/// Orthonormal DCT-II basis, rows flattened as `[n_mfcc * n_mels]`.
fn dct_basis(n_mfcc: usize, n_mels: usize) -> Vec<f32> {
    let mut dct = vec![0f32; n_mfcc * n_mels];
    let norm0 = (1.0 / n_mels as f32).sqrt();
    let norm = (2.0 / n_mels as f32).sqrt();
    for i in 0..n_mfcc {
        for j in 0..n_mels {
            let angle =
                std::f32::consts::PI * i as f32 * (2 * j + 1) as f32 / (2 * n_mels) as f32;
            dct[i * n_mels + j] = angle.cos() * if i == 0 { norm0 } else { norm };
        }
    }
    dct
}

/// Regression deltas over +-DELTA_CONTEXT frames with edge replication.
fn regression_deltas(row: &[f32]) -> Vec<f32> {
    let t_max = row.len() as i64 - 1;
    let at = |t: i64| row[t.clamp(0, t_max) as usize];
    let denom: f32 = (1..=DELTA_CONTEXT as i64).map(|n| 2.0 * (n * n) as f32).sum();
    (0..row.len() as i64)
        .map(|t| {
            let num: f32 = (1..=DELTA_CONTEXT as i64)
                .map(|n| n as f32 * (at(t + n) - at(t - n)))
                .sum();
            num / denom
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MfccExtractor {
        MfccExtractor::new(&MfccConfig::default()).unwrap()
    }

    #[test]
    fn test_frame_count_matches_chain_framing() {
        let mfcc = extractor();
        assert_eq!(mfcc.frame_count(399), 0);
        assert_eq!(mfcc.frame_count(400), 1);
        assert_eq!(mfcc.frame_count(559), 1);
        assert_eq!(mfcc.frame_count(560), 2);
        assert_eq!(mfcc.frame_count(6640), 40);
    }

    #[test]
    fn test_feature_shape() {
        let mfcc = extractor();
        let audio: Vec<f32> = (0..6640)
            .map(|n| (n as f32 * 0.05).sin() * 0.3)
            .collect();
        let features = mfcc.features(&audio).unwrap();
        assert_eq!(features.dims(), &[39, 40]);
        let values = features.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_short_clip_rejected() {
        let mfcc = extractor();
        let err = mfcc.features(&[0.1; 200]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_stationary_signal_has_flat_deltas() {
        let mfcc = extractor();
        // Periodic in the hop, so every frame sees the same waveform.
        let audio: Vec<f32> = (0..4000)
            .map(|n| (2.0 * std::f32::consts::PI * (n % 160) as f32 / 160.0).sin())
            .collect();
        let features = mfcc.features(&audio).unwrap();
        let (channels, frames) = (features.dims()[0], features.dims()[1]);
        let values = features.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for ch in 13..channels {
            for t in 0..frames {
                assert!(
                    values[ch * frames + t].abs() < 1e-3,
                    "delta channel {ch} frame {t} = {}",
                    values[ch * frames + t]
                );
            }
        }
    }

    #[test]
    fn test_delta_of_ramp_is_constant() {
        let deltas = regression_deltas(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        // Interior points of a unit ramp regress to slope 1.
        for d in &deltas[2..4] {
            assert!((d - 1.0).abs() < 1e-6);
        }
    }
}
