//! Encoder-side chain segment: MFCC frontend plus the strided conv stack.

use crate::error::Result;
use crate::geometry::{Chain, StageSpec, Waypoint};
use crate::model::config::{EncoderConfig, MfccConfig};

/// Chain from the raw sample grid to the latent frame grid.
///
/// The MFCC stage is modelled as a strided filter with centered wings, so
/// frame t is anchored at sample `t * hop`. The conv stack follows in
/// signal order with centered wings throughout.
pub fn encoder_chain(mfcc: &MfccConfig, encoder: &EncoderConfig) -> Result<Chain> {
    let mut chain = Chain::new();
    chain.tag_tail(Waypoint::SampleInput)?;
    chain.push(StageSpec::conv(mfcc.window_size, mfcc.hop_size as u32).named("mfcc"))?;
    chain.tag_tail(Waypoint::MelInput)?;
    for (i, layer) in encoder.layers.iter().enumerate() {
        chain.push(
            StageSpec::conv(layer.kernel_size, layer.stride).named(format!("enc_conv{}", i + 1)),
        )?;
    }
    chain.tag_tail(Waypoint::EncoderOutput)?;
    Ok(chain)
}
