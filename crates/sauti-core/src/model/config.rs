//! Configuration types for the speech autoencoder

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// MFCC frontend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfccConfig {
    /// Input sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Analysis window length in samples
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Hop between successive frames in samples
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,

    /// Mel filterbank size
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,

    /// Cepstral coefficients kept per frame
    #[serde(default = "default_n_mfcc")]
    pub n_mfcc: usize,
}

impl MfccConfig {
    /// Channels fed to the encoder: static, delta, and accel per coefficient.
    pub fn n_channels(&self) -> usize {
        self.n_mfcc * 3
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::config("mfcc: sample_rate must be positive"));
        }
        if self.hop_size == 0 {
            return Err(Error::config("mfcc: hop_size must be positive"));
        }
        if self.window_size < self.hop_size {
            return Err(Error::config(format!(
                "mfcc: window_size {} is shorter than hop_size {}",
                self.window_size, self.hop_size
            )));
        }
        if self.n_mfcc == 0 || self.n_mels < self.n_mfcc {
            return Err(Error::config(format!(
                "mfcc: need 1 <= n_mfcc <= n_mels, got n_mfcc {} n_mels {}",
                self.n_mfcc, self.n_mels
            )));
        }
        Ok(())
    }
}

/// One strided conv layer of the encoder stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvLayer {
    pub kernel_size: usize,
    pub stride: u32,
}

impl ConvLayer {
    pub const fn new(kernel_size: usize, stride: u32) -> Self {
        Self { kernel_size, stride }
    }
}

/// Mel-to-latent encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Channel width of every internal layer and of the encoder output
    #[serde(default = "default_encoder_n_out")]
    pub n_out: usize,

    /// Conv stack in signal order
    #[serde(default = "default_encoder_layers")]
    pub layers: Vec<ConvLayer>,
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_out == 0 {
            return Err(Error::config("encoder: n_out must be positive"));
        }
        if self.layers.is_empty() {
            return Err(Error::config("encoder: conv stack is empty"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.kernel_size == 0 || layer.stride == 0 {
                return Err(Error::config(format!(
                    "encoder: layer {i} has kernel {} stride {}",
                    layer.kernel_size, layer.stride
                )));
            }
        }
        Ok(())
    }

    /// Product of the stack's strides.
    pub fn total_stride(&self) -> u64 {
        self.layers.iter().map(|l| l.stride as u64).product()
    }
}

/// Bottleneck flavor between encoder and decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    Vqvae,
    VqvaeEma,
    Vae,
    Ae,
}

impl BottleneckKind {
    pub fn is_quantized(&self) -> bool {
        matches!(self, BottleneckKind::Vqvae | BottleneckKind::VqvaeEma)
    }
}

/// Bottleneck configuration. Pointwise, so geometry-neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckConfig {
    #[serde(default = "default_bottleneck_kind")]
    pub kind: BottleneckKind,

    /// Latent channel width handed to the decoder conditioning path
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,

    /// Codebook size for the VQ kinds
    #[serde(default = "default_codebook_size")]
    pub codebook_size: usize,

    /// Free-nats floor for the VAE objective
    #[serde(default)]
    pub free_nats: f64,
}

impl BottleneckConfig {
    pub fn validate(&self) -> Result<()> {
        if self.latent_dim == 0 {
            return Err(Error::config("bottleneck: latent_dim must be positive"));
        }
        if self.kind.is_quantized() && self.codebook_size == 0 {
            return Err(Error::config(
                "bottleneck: VQ kinds need a positive codebook_size",
            ));
        }
        Ok(())
    }
}

/// One transposed-conv upsampling layer of the conditioning path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsampleLayer {
    pub kernel_size: usize,
    pub factor: u32,
}

impl UpsampleLayer {
    pub const fn new(kernel_size: usize, factor: u32) -> Self {
        Self { kernel_size, factor }
    }
}

/// WaveNet decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Mu-law quantization classes of input and prediction
    #[serde(default = "default_n_quant")]
    pub n_quant: usize,

    /// Conditioning upsample stack in signal order
    #[serde(default = "default_upsample_layers")]
    pub upsample: Vec<UpsampleLayer>,

    /// Dilated conv blocks; dilation doubles per layer within a block
    #[serde(default = "default_n_blocks")]
    pub n_blocks: usize,

    #[serde(default = "default_n_block_layers")]
    pub n_block_layers: usize,

    /// Dilated filter width
    #[serde(default = "default_dilated_kernel_size")]
    pub kernel_size: usize,

    /// Residual channel width
    #[serde(default = "default_n_res")]
    pub n_res: usize,

    /// Dilated gate channel width
    #[serde(default = "default_n_dil")]
    pub n_dil: usize,

    /// Skip channel width
    #[serde(default = "default_n_skp")]
    pub n_skp: usize,

    /// Post-stack channel width
    #[serde(default = "default_n_post")]
    pub n_post: usize,

    /// Speaker inventory for the global conditioning table
    #[serde(default = "default_n_speakers")]
    pub n_speakers: usize,

    /// Speaker embedding width
    #[serde(default = "default_n_global_embed")]
    pub n_global_embed: usize,

    /// Per-position probability of conditioning time-jitter
    #[serde(default = "default_jitter_prob")]
    pub jitter_prob: f64,
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_quant < 2 {
            return Err(Error::config("decoder: n_quant must be at least 2"));
        }
        if self.n_blocks == 0 || self.n_block_layers == 0 {
            return Err(Error::config(
                "decoder: need at least one block and one layer per block",
            ));
        }
        if self.kernel_size < 2 {
            return Err(Error::config(
                "decoder: dilated kernel_size must be at least 2",
            ));
        }
        for (i, layer) in self.upsample.iter().enumerate() {
            if layer.kernel_size == 0 || layer.factor == 0 {
                return Err(Error::config(format!(
                    "decoder: upsample layer {i} has kernel {} factor {}",
                    layer.kernel_size, layer.factor
                )));
            }
        }
        for field in [
            ("n_res", self.n_res),
            ("n_dil", self.n_dil),
            ("n_skp", self.n_skp),
            ("n_post", self.n_post),
            ("n_speakers", self.n_speakers),
            ("n_global_embed", self.n_global_embed),
        ] {
            if field.1 == 0 {
                return Err(Error::config(format!(
                    "decoder: {} must be positive",
                    field.0
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.jitter_prob) {
            return Err(Error::config(format!(
                "decoder: jitter_prob {} outside [0, 1]",
                self.jitter_prob
            )));
        }
        Ok(())
    }

    /// Product of the upsample stack's factors.
    pub fn upsample_factor(&self) -> u64 {
        self.upsample.iter().map(|l| l.factor as u64).product()
    }

    /// Dilations of the full dilated stack in signal order.
    pub fn dilations(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.n_blocks * self.n_block_layers);
        for _ in 0..self.n_blocks {
            for layer in 0..self.n_block_layers {
                out.push(1 << layer);
            }
        }
        out
    }
}

/// Full model configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    #[serde(default)]
    pub mfcc: MfccConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub bottleneck: BottleneckConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,
}

impl AutoencoderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: AutoencoderConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.mfcc.validate()?;
        self.encoder.validate()?;
        self.bottleneck.validate()?;
        self.decoder.validate()?;
        Ok(())
    }
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_size: default_window_size(),
            hop_size: default_hop_size(),
            n_mels: default_n_mels(),
            n_mfcc: default_n_mfcc(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            n_out: default_encoder_n_out(),
            layers: default_encoder_layers(),
        }
    }
}

impl Default for BottleneckConfig {
    fn default() -> Self {
        Self {
            kind: default_bottleneck_kind(),
            latent_dim: default_latent_dim(),
            codebook_size: default_codebook_size(),
            free_nats: 0.0,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            n_quant: default_n_quant(),
            upsample: default_upsample_layers(),
            n_blocks: default_n_blocks(),
            n_block_layers: default_n_block_layers(),
            kernel_size: default_dilated_kernel_size(),
            n_res: default_n_res(),
            n_dil: default_n_dil(),
            n_skp: default_n_skp(),
            n_post: default_n_post(),
            n_speakers: default_n_speakers(),
            n_global_embed: default_n_global_embed(),
            jitter_prob: default_jitter_prob(),
        }
    }
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_window_size() -> usize {
    400
}

fn default_hop_size() -> usize {
    160
}

fn default_n_mels() -> usize {
    80
}

fn default_n_mfcc() -> usize {
    13
}

fn default_encoder_n_out() -> usize {
    768
}

fn default_encoder_layers() -> Vec<ConvLayer> {
    vec![
        ConvLayer::new(3, 1),
        ConvLayer::new(3, 1),
        ConvLayer::new(4, 2),
        ConvLayer::new(3, 1),
        ConvLayer::new(3, 1),
        ConvLayer::new(1, 1),
        ConvLayer::new(1, 1),
        ConvLayer::new(1, 1),
        ConvLayer::new(1, 1),
    ]
}

fn default_bottleneck_kind() -> BottleneckKind {
    BottleneckKind::Vqvae
}

fn default_latent_dim() -> usize {
    64
}

fn default_codebook_size() -> usize {
    4096
}

fn default_n_quant() -> usize {
    256
}

fn default_upsample_layers() -> Vec<UpsampleLayer> {
    vec![
        UpsampleLayer::new(25, 5),
        UpsampleLayer::new(16, 4),
        UpsampleLayer::new(16, 4),
        UpsampleLayer::new(16, 4),
    ]
}

fn default_n_blocks() -> usize {
    2
}

fn default_n_block_layers() -> usize {
    10
}

fn default_dilated_kernel_size() -> usize {
    2
}

fn default_n_res() -> usize {
    368
}

fn default_n_dil() -> usize {
    256
}

fn default_n_skp() -> usize {
    256
}

fn default_n_post() -> usize {
    256
}

fn default_n_speakers() -> usize {
    40
}

fn default_n_global_embed() -> usize {
    10
}

fn default_jitter_prob() -> f64 {
    0.12
}
