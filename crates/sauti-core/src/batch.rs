//! Batch slicing: cutting clip windows into the tensors a training step
//! consumes, using the model's window geometry.
//!
//! One window of `input_samples` raw samples feeds three tensors: the
//! sample window itself (MFCC input), the mu-law class window entering the
//! dilated decoder, and the prediction targets. Targets are shifted by one
//! sample: the prediction at position t scores the sample at t + 1, so a
//! window of W predictions yields W - 1 scored targets.

use candle_core::{Device, Tensor};
use rand::Rng;
use tracing::debug;

use crate::audio::mulaw;
use crate::error::{Error, Result};
use crate::model::{Autoencoder, WindowGeometry};

/// Tensors for one batch item.
#[derive(Debug)]
pub struct WindowSlices {
    /// f32 `(input_samples,)`, the MFCC input
    pub samples: Tensor,
    /// u32 `(decoder_samples,)`, mu-law classes entering the decoder
    pub wav_input: Tensor,
    /// u32 `(window - 1,)`, mu-law classes the predictions score
    pub target: Tensor,
}

/// Slices clips into aligned window tensors.
#[derive(Debug, Clone)]
pub struct WindowSlicer {
    geometry: WindowGeometry,
    n_quant: usize,
    jitter_prob: f64,
}

impl WindowSlicer {
    pub fn new(geometry: WindowGeometry, n_quant: usize, jitter_prob: f64) -> Result<Self> {
        if n_quant < 2 {
            return Err(Error::config("slicer: n_quant must be at least 2"));
        }
        if !(0.0..=1.0).contains(&jitter_prob) {
            return Err(Error::config(format!(
                "slicer: jitter_prob {jitter_prob} outside [0, 1]"
            )));
        }
        Ok(Self {
            geometry,
            n_quant,
            jitter_prob,
        })
    }

    pub fn for_model(model: &Autoencoder) -> Result<Self> {
        Self::new(
            model.geometry().clone(),
            model.config().decoder.n_quant,
            model.config().decoder.jitter_prob,
        )
    }

    pub fn geometry(&self) -> &WindowGeometry {
        &self.geometry
    }

    /// Uniformly draw a valid window start within a clip.
    pub fn sample_start(&self, clip_samples: i64, rng: &mut impl Rng) -> Result<i64> {
        let count = self.geometry.window_count(clip_samples)?;
        Ok(rng.gen_range(0..count))
    }

    /// Cut the window starting at `start` out of a clip.
    pub fn slice_window(&self, clip: &[f32], start: i64) -> Result<WindowSlices> {
        let g = &self.geometry;
        if start < 0 || start + g.input_samples > clip.len() as i64 {
            return Err(Error::config(format!(
                "window [{start}, {}) escapes a clip of {} samples",
                start + g.input_samples,
                clip.len()
            )));
        }
        let window = &clip[start as usize..(start + g.input_samples) as usize];
        let wav = &window[g.wav_trim.begin as usize..g.wav_trim.end as usize];
        let classes = mulaw::encode_clip(wav, self.n_quant);
        // Predictions score the next sample, hence the +1 and the W-1 length.
        let target = classes[(g.target_trim.begin + 1) as usize..g.target_trim.end as usize].to_vec();
        debug!(
            start,
            samples = window.len(),
            decoder = classes.len(),
            targets = target.len(),
            "sliced window"
        );
        Ok(WindowSlices {
            samples: Tensor::from_vec(window.to_vec(), (window.len(),), &Device::Cpu)?,
            wav_input: Tensor::from_vec(classes, (g.decoder_samples as usize,), &Device::Cpu)?,
            target: Tensor::from_vec(target, ((g.window - 1) as usize,), &Device::Cpu)?,
        })
    }

    /// Trim upsampled conditioning (time-last) to the decoder input window.
    pub fn trim_conditioning(&self, cond: &Tensor) -> Result<Tensor> {
        let trim = &self.geometry.cond_trim;
        let time = cond.dim(cond.rank() - 1)? as i64;
        if time < trim.end {
            return Err(Error::invariant(format!(
                "conditioning of {time} positions cannot satisfy trim {trim}"
            )));
        }
        Ok(cond.narrow(cond.rank() - 1, trim.begin as usize, trim.len() as usize)?)
    }

    /// Drop the final prediction column (time-last), mirroring the target
    /// shift.
    pub fn trim_predictions(&self, quant: &Tensor) -> Result<Tensor> {
        let time = quant.dim(quant.rank() - 1)? as i64;
        if time != self.geometry.window {
            return Err(Error::invariant(format!(
                "expected {} prediction positions, got {time}",
                self.geometry.window
            )));
        }
        Ok(quant.narrow(quant.rank() - 1, 0, (self.geometry.window - 1) as usize)?)
    }

    /// Per-position replacement indexes for conditioning time-jitter.
    ///
    /// Each position keeps its own index with probability `1 - jitter_prob`
    /// and otherwise takes a neighbor, clamped to the window.
    pub fn jitter_indexes(&self, len: usize, rng: &mut impl Rng) -> Result<Tensor> {
        let hi = len as i64 - 1;
        let indexes: Vec<u32> = (0..len as i64)
            .map(|t| {
                let r = rng.gen::<f64>();
                let jittered = if r < self.jitter_prob / 2.0 {
                    t - 1
                } else if r < self.jitter_prob {
                    t + 1
                } else {
                    t
                };
                jittered.clamp(0, hi) as u32
            })
            .collect();
        Ok(Tensor::from_vec(indexes, (len,), &Device::Cpu)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AutoencoderConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn slicer(window: i64) -> WindowSlicer {
        let model = Autoencoder::new(AutoencoderConfig::default(), window).unwrap();
        WindowSlicer::for_model(&model).unwrap()
    }

    #[test]
    fn test_window_tensor_shapes() {
        let slicer = slicer(100);
        let clip = vec![0.0f32; 7000];
        let slices = slicer.slice_window(&clip, 17).unwrap();
        assert_eq!(slices.samples.dims(), &[6640]);
        assert_eq!(slices.wav_input.dims(), &[2146]);
        assert_eq!(slices.target.dims(), &[99]);
    }

    #[test]
    fn test_target_alignment() {
        let slicer = slicer(100);
        let g = slicer.geometry().clone();
        // First scored sample sits one past the prediction window start.
        let marker = (g.wav_trim.begin + g.target_trim.begin + 1) as usize;
        let mut clip = vec![-1.0f32; 7000];
        let start = 23usize;
        clip[start + marker] = 1.0;
        let slices = slicer.slice_window(&clip, start as i64).unwrap();
        let target = slices.target.to_vec1::<u32>().unwrap();
        assert_eq!(target[0], 255);
        assert!(target[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_out_of_clip_window_rejected() {
        let slicer = slicer(100);
        let clip = vec![0.0f32; 6640];
        slicer.slice_window(&clip, 0).unwrap();
        assert!(slicer.slice_window(&clip, 1).is_err());
        assert!(slicer.slice_window(&clip, -1).is_err());
    }

    #[test]
    fn test_conditioning_trim() {
        let slicer = slicer(100);
        // Upsampled conditioning for the canonical window spans 2628
        // positions; values encode their own position.
        let cond = Tensor::arange(0f32, 2628.0, &Device::Cpu)
            .unwrap()
            .reshape((1, 2628))
            .unwrap();
        let trimmed = slicer.trim_conditioning(&cond).unwrap();
        assert_eq!(trimmed.dims(), &[1, 2146]);
        let row = trimmed.squeeze(0).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(row[0], 217.0);
        assert_eq!(row[2145], 2362.0);

        let short = Tensor::zeros((1, 100), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(slicer.trim_conditioning(&short).is_err());
    }

    #[test]
    fn test_prediction_trim() {
        let slicer = slicer(100);
        let quant = Tensor::zeros((256, 100), candle_core::DType::F32, &Device::Cpu).unwrap();
        let trimmed = slicer.trim_predictions(&quant).unwrap();
        assert_eq!(trimmed.dims(), &[256, 99]);
        let wrong = Tensor::zeros((256, 64), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(slicer.trim_predictions(&wrong).is_err());
    }

    #[test]
    fn test_jitter_disabled_is_identity() {
        let model = Autoencoder::new(AutoencoderConfig::default(), 100).unwrap();
        let slicer = WindowSlicer::new(model.geometry().clone(), 256, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let indexes = slicer
            .jitter_indexes(64, &mut rng)
            .unwrap()
            .to_vec1::<u32>()
            .unwrap();
        assert_eq!(indexes, (0..64).collect::<Vec<u32>>());
    }

    #[test]
    fn test_jitter_moves_about_the_configured_fraction() {
        let model = Autoencoder::new(AutoencoderConfig::default(), 100).unwrap();
        let slicer = WindowSlicer::new(model.geometry().clone(), 256, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let len = 10_000u32;
        let indexes = slicer
            .jitter_indexes(len as usize, &mut rng)
            .unwrap()
            .to_vec1::<u32>()
            .unwrap();
        let moved = indexes
            .iter()
            .enumerate()
            .filter(|(t, &i)| i != *t as u32)
            .count();
        assert!((4000..6000).contains(&moved), "moved {moved}");
        for (t, &i) in indexes.iter().enumerate() {
            assert!((i as i64 - t as i64).abs() <= 1);
            assert!(i < len);
        }
    }

    #[test]
    fn test_sample_start_bounds() {
        let slicer = slicer(100);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(slicer.sample_start(6640, &mut rng).unwrap(), 0);
        for _ in 0..50 {
            let start = slicer.sample_start(6960, &mut rng).unwrap();
            assert!((0..321).contains(&start));
        }
        assert!(slicer.sample_start(6000, &mut rng).is_err());
    }
}
