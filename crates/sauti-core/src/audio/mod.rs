//! Audio frontend: MFCC feature extraction and mu-law companding.

mod mfcc;
pub mod mulaw;

pub use mfcc::MfccExtractor;
