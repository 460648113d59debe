//! Decoder-side chain segment: conditioning path plus the dilated stack.

use crate::error::Result;
use crate::geometry::{Chain, StageSpec, Waypoint};
use crate::model::config::DecoderConfig;

/// Chain from the latent frame grid to the prediction grid.
///
/// The conditioning projection and the two post stages are kernel-1 and
/// leave geometry untouched; they are kept in the chain so the dump shows
/// the complete stack. The upsampled conditioning grid and the dilated
/// stack's input grid are the same cut, tagged with both waypoints.
pub fn decoder_chain(config: &DecoderConfig) -> Result<Chain> {
    let mut chain = Chain::new();
    chain.push(StageSpec::conv(1, 1).named("cond_proj"))?;
    for (i, layer) in config.upsample.iter().enumerate() {
        chain.push(
            StageSpec::upsample(layer.kernel_size, layer.factor).named(format!("upsample{}", i + 1)),
        )?;
    }
    chain.tag_tail(Waypoint::UpsampleOutput)?;
    chain.tag_tail(Waypoint::DilatedInput)?;
    for (block, layer) in block_layers(config) {
        let dilation = 1 << layer;
        chain.push(
            StageSpec::dilated(config.kernel_size, dilation)
                .named(format!("dil{}_{}", block + 1, layer + 1)),
        )?;
    }
    chain.tag_tail(Waypoint::DilatedOutput)?;
    chain.push(StageSpec::conv(1, 1).named("post1"))?;
    chain.push(StageSpec::conv(1, 1).named("post2"))?;
    chain.tag_tail(Waypoint::Prediction)?;
    Ok(chain)
}

fn block_layers(config: &DecoderConfig) -> impl Iterator<Item = (usize, usize)> + '_ {
    (0..config.n_blocks).flat_map(|b| (0..config.n_block_layers).map(move |l| (b, l)))
}
