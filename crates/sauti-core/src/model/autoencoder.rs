//! Model composition and the per-window tensor geometry.
//!
//! The encoder and decoder segments are built separately, stitched into a
//! single chain, and the window geometry is solved once per model: a batch
//! window of W predictions is propagated backward to the decoder, sample,
//! and mel input grids, then forward again to locate the encoder and
//! conditioning outputs. The resulting lengths and trim offsets are fixed
//! for the life of the model; every batch reuses them.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::geometry::{open_window, Chain, Range, Waypoint};
use crate::model::config::AutoencoderConfig;
use crate::model::decoder::decoder_chain;
use crate::model::encoder::encoder_chain;

/// Slice bounds of a child window inside its parent window, in parent-local
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trim {
    pub begin: i64,
    pub end: i64,
}

impl Trim {
    pub fn len(&self) -> i64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }
}

impl fmt::Display for Trim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Tensor lengths and trim offsets for one batch window size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    /// Requested predictions per batch item (W)
    pub window: i64,
    /// Samples entering the MFCC stage per item
    pub input_samples: i64,
    /// Mel frames entering the encoder per item
    pub input_frames: i64,
    /// Latent frames leaving the encoder per item
    pub latent_frames: i64,
    /// Samples entering the dilated decoder per item
    pub decoder_samples: i64,
    /// Decoder input window inside the sample input window
    pub wav_trim: Trim,
    /// Decoder input window inside the upsampled conditioning window
    pub cond_trim: Trim,
    /// Prediction window inside the decoder input window
    pub target_trim: Trim,
}

impl WindowGeometry {
    pub(crate) fn init(chain: &Chain, window: i64) -> Result<Self> {
        if window <= 0 {
            return Err(Error::config(format!(
                "batch window size must be positive, got {window}"
            )));
        }
        let dec_out = open_window(0, window)?;
        let dec_in = chain.input_range(Waypoint::DilatedInput, Waypoint::Prediction, &dec_out)?;
        let enc_in = chain.input_range(Waypoint::SampleInput, Waypoint::Prediction, &dec_out)?;
        let mel_in = chain.input_range(Waypoint::MelInput, Waypoint::Prediction, &dec_out)?;
        let enc_out = chain.output_range(Waypoint::SampleInput, Waypoint::EncoderOutput, &enc_in)?;
        let ups_out = chain.output_range(Waypoint::SampleInput, Waypoint::UpsampleOutput, &enc_in)?;

        if enc_in.scale() != dec_in.scale() || ups_out.scale() != dec_in.scale() {
            return Err(Error::invariant(format!(
                "sample grids disagree: encoder input at scale {}, upsampled \
                 conditioning at scale {}, decoder input at scale {}; the \
                 resampling factors do not compose back to the sample rate\n{}",
                enc_in.scale(),
                ups_out.scale(),
                dec_in.scale(),
                chain.dump()
            )));
        }

        let geometry = WindowGeometry {
            window,
            input_samples: enc_in.sub_length(),
            input_frames: mel_in.sub_length(),
            latent_frames: enc_out.sub_length(),
            decoder_samples: dec_in.sub_length(),
            wav_trim: locate(dec_in.sub(), enc_in.sub(), "decoder input", chain)?,
            cond_trim: locate(dec_in.sub(), ups_out.sub(), "conditioning", chain)?,
            target_trim: locate(dec_out.sub(), dec_in.sub(), "prediction", chain)?,
        };
        Ok(geometry)
    }

    /// Reject clips with fewer samples than one window needs.
    pub fn fit_check(&self, clip_samples: i64) -> Result<()> {
        if clip_samples < self.input_samples {
            return Err(Error::config(format!(
                "window size {} needs {} input samples, but the clip has \
                 only {clip_samples}",
                self.window, self.input_samples
            )));
        }
        Ok(())
    }

    /// Number of valid window start positions within a clip.
    pub fn window_count(&self, clip_samples: i64) -> Result<i64> {
        self.fit_check(clip_samples)?;
        Ok(clip_samples - self.input_samples + 1)
    }
}

impl fmt::Display for WindowGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "batch window     {} predictions", self.window)?;
        writeln!(f, "encoder input    {} samples", self.input_samples)?;
        writeln!(f, "mel input        {} frames", self.input_frames)?;
        writeln!(f, "latent           {} frames", self.latent_frames)?;
        writeln!(f, "decoder input    {} samples", self.decoder_samples)?;
        writeln!(f, "wav trim         {}", self.wav_trim)?;
        writeln!(f, "cond trim        {}", self.cond_trim)?;
        write!(f, "target trim      {}", self.target_trim)
    }
}

fn locate(child: &Range, parent: &Range, what: &str, chain: &Chain) -> Result<Trim> {
    if !parent.contains(child) {
        return Err(Error::invariant(format!(
            "{what} window {child} escapes its parent window {parent}\n{}",
            chain.dump()
        )));
    }
    Ok(Trim {
        begin: child.lo() - parent.lo(),
        end: child.hi() - parent.lo(),
    })
}

/// Speech autoencoder: configuration, stage chain, and window geometry.
#[derive(Debug, Clone)]
pub struct Autoencoder {
    config: AutoencoderConfig,
    chain: Chain,
    geometry: WindowGeometry,
}

impl Autoencoder {
    /// Build the full chain and solve the geometry for one window size.
    pub fn new(config: AutoencoderConfig, window_size: i64) -> Result<Self> {
        config.validate()?;
        let chain = Chain::join(
            encoder_chain(&config.mfcc, &config.encoder)?,
            decoder_chain(&config.decoder)?,
        )?;
        let geometry = WindowGeometry::init(&chain, window_size)?;
        info!(
            window = geometry.window,
            input_samples = geometry.input_samples,
            input_frames = geometry.input_frames,
            latent_frames = geometry.latent_frames,
            decoder_samples = geometry.decoder_samples,
            "autoencoder geometry initialized"
        );
        Ok(Self {
            config,
            chain,
            geometry,
        })
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn geometry(&self) -> &WindowGeometry {
        &self.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::UpsampleLayer;

    fn default_model(window: i64) -> Autoencoder {
        Autoencoder::new(AutoencoderConfig::default(), window).unwrap()
    }

    #[test]
    fn test_canonical_window_geometry() {
        let geometry = default_model(100).geometry().clone();
        assert_eq!(geometry.window, 100);
        assert_eq!(geometry.input_samples, 6640);
        assert_eq!(geometry.input_frames, 40);
        assert_eq!(geometry.latent_frames, 13);
        assert_eq!(geometry.decoder_samples, 2146);
        assert_eq!(geometry.wav_trim, Trim { begin: 2153, end: 4299 });
        assert_eq!(geometry.cond_trim, Trim { begin: 217, end: 2363 });
        assert_eq!(geometry.target_trim, Trim { begin: 2046, end: 2146 });
        assert_eq!(geometry.wav_trim.len(), geometry.decoder_samples);
        assert_eq!(geometry.cond_trim.len(), geometry.decoder_samples);
        assert_eq!(geometry.target_trim.len(), geometry.window);
    }

    #[test]
    fn test_geometry_is_deterministic() {
        assert_eq!(default_model(100).geometry(), default_model(100).geometry());
    }

    #[test]
    fn test_decoder_window_tracks_receptive_field() {
        // The dilated stack adds 2 * (1 + 2 + ... + 512) = 2046 context samples.
        for window in [1, 37, 100, 1000] {
            let geometry = default_model(window).geometry().clone();
            assert_eq!(geometry.decoder_samples, window + 2046);
            assert_eq!(geometry.target_trim.len(), window);
        }
    }

    #[test]
    fn test_minimal_window_matches_receptive_field() {
        let model = default_model(1);
        assert_eq!(
            model.geometry().input_samples,
            model
                .chain()
                .min_input_length(Waypoint::SampleInput, Waypoint::Prediction)
                .unwrap()
        );
    }

    #[test]
    fn test_mel_frame_identity() {
        for window in [1, 100, 321] {
            let model = default_model(window);
            let geometry = model.geometry();
            let mfcc = &model.config().mfcc;
            assert_eq!(
                geometry.input_frames,
                (geometry.input_samples - mfcc.window_size as i64) / mfcc.hop_size as i64 + 1
            );
        }
    }

    #[test]
    fn test_window_growth_is_monotone() {
        let mut last = None;
        for window in 1..=64 {
            let g = default_model(window).geometry().clone();
            let lengths = [
                g.input_samples,
                g.input_frames,
                g.latent_frames,
                g.decoder_samples,
            ];
            if let Some(prev) = last {
                for (now, before) in lengths.iter().zip(&prev) {
                    assert!(now >= before, "window {window}: {lengths:?} < {prev:?}");
                }
            }
            last = Some(lengths);
        }
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = Autoencoder::new(AutoencoderConfig::default(), 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_fit_check_and_window_count() {
        let geometry = default_model(100).geometry().clone();
        assert!(matches!(geometry.fit_check(6639), Err(Error::Config(_))));
        geometry.fit_check(6640).unwrap();
        assert_eq!(geometry.window_count(6640).unwrap(), 1);
        assert_eq!(geometry.window_count(6960).unwrap(), 321);
    }

    #[test]
    fn test_rate_mismatch_aborts_with_chain_state() {
        let mut config = AutoencoderConfig::default();
        config.decoder.upsample = vec![
            UpsampleLayer::new(25, 5),
            UpsampleLayer::new(16, 4),
            UpsampleLayer::new(16, 4),
            UpsampleLayer::new(8, 2),
        ];
        let err = Autoencoder::new(config, 100).unwrap_err();
        assert!(err.is_defect());
        assert!(err.to_string().contains("upsample4"));
    }

    #[test]
    fn test_dump_shows_full_stack() {
        let model = default_model(100);
        let dump = model.chain().dump();
        for needle in [
            "mfcc",
            "enc_conv5",
            "cond_proj",
            "upsample4",
            "dil2_10",
            "post2",
            "sample_input",
            "upsample_output",
            "prediction",
        ] {
            assert!(dump.contains(needle), "dump missing {needle}:\n{dump}");
        }
    }
}
