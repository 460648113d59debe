//! Autoencoder composition: configs, chain builders, window geometry.

mod autoencoder;
mod config;
mod decoder;
mod encoder;

pub use autoencoder::{Autoencoder, Trim, WindowGeometry};
pub use config::{
    AutoencoderConfig, BottleneckConfig, BottleneckKind, ConvLayer, DecoderConfig, EncoderConfig,
    MfccConfig, UpsampleLayer,
};
pub use decoder::decoder_chain;
pub use encoder::encoder_chain;
