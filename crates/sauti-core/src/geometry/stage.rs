//! Pipeline stage records and their index mappings.
//!
//! A stage models one signal transformation (convolution, dilated
//! convolution, strided downsampling, or transposed-conv upsampling) as a
//! linear relation between output indices and the input indices that can
//! influence them. For a downsampling stage, output `o` is anchored at
//! input position `o*s` and its filter spans `[o*s - wl, o*s + wr]`; the
//! wings partition the dilated filter extent, `wl + wr = (k-1)*d`. An
//! upsampling stage is the mirror image: input `i` is anchored at output
//! position `i*u` and contributes to `[i*u - wl, i*u + wr]`.
//!
//! Boundary pads model positions synthesized at the true signal edges
//! (e.g. STFT centering). They widen the full range on both sides and
//! extend a window's availability only where it is flush with the full
//! bound, so interior training windows never see them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::range::{GridRange, Range};

/// Arena index of a stage within its chain.
pub type StageId = usize;

/// Resampling behavior of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resample {
    /// Ordinary convolution with the given stride (1 = none).
    Down(u32),
    /// Transposed convolution inserting `factor` output positions per input.
    Up(u32),
}

impl Resample {
    fn factor(&self) -> i64 {
        match self {
            Resample::Down(s) => *s as i64,
            Resample::Up(u) => *u as i64,
        }
    }
}

/// How a stage's filter extent is split around its anchor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Extent split evenly, remainder on the right wing.
    Centered,
    /// Entire extent on the left wing (WaveNet-style causal filters).
    Causal,
    /// Explicit wing sizes; must sum to the dilated extent.
    Explicit { left: usize, right: usize },
}

/// Builder-facing description of one stage, in signal-flow order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub kernel_size: usize,
    pub resample: Resample,
    pub dilation: usize,
    pub placement: Placement,
    pub left_pad: usize,
    pub right_pad: usize,
    pub name: Option<String>,
}

impl StageSpec {
    /// Convolution with the given kernel and stride, centered wings.
    pub fn conv(kernel_size: usize, stride: u32) -> Self {
        StageSpec {
            kernel_size,
            resample: Resample::Down(stride),
            dilation: 1,
            placement: Placement::Centered,
            left_pad: 0,
            right_pad: 0,
            name: None,
        }
    }

    /// Stride-1 causal convolution with the given dilation.
    pub fn dilated(kernel_size: usize, dilation: usize) -> Self {
        StageSpec {
            kernel_size,
            resample: Resample::Down(1),
            dilation,
            placement: Placement::Causal,
            left_pad: 0,
            right_pad: 0,
            name: None,
        }
    }

    /// Transposed convolution upsampling by `factor`, centered wings.
    pub fn upsample(kernel_size: usize, factor: u32) -> Self {
        StageSpec {
            kernel_size,
            resample: Resample::Up(factor),
            dilation: 1,
            placement: Placement::Centered,
            left_pad: 0,
            right_pad: 0,
            name: None,
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_wings(self, left: usize, right: usize) -> Self {
        self.with_placement(Placement::Explicit { left, right })
    }

    pub fn with_pads(mut self, left: usize, right: usize) -> Self {
        self.left_pad = left;
        self.right_pad = right;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One stage record in the chain arena.
///
/// Immutable after construction apart from the parent/child links set by
/// the chain builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub(crate) id: StageId,
    kernel_size: usize,
    resample: Resample,
    dilation: usize,
    left_wing: usize,
    right_wing: usize,
    left_pad: usize,
    right_pad: usize,
    name: Option<String>,
    pub(crate) parent: Option<StageId>,
    pub(crate) child: Option<StageId>,
}

impl Stage {
    pub(crate) fn from_spec(id: StageId, spec: StageSpec) -> Result<Self> {
        if spec.kernel_size == 0 {
            return Err(Error::config(format!(
                "stage {}: kernel size must be positive",
                spec.name.as_deref().unwrap_or("?")
            )));
        }
        if spec.dilation == 0 {
            return Err(Error::config(format!(
                "stage {}: dilation must be positive",
                spec.name.as_deref().unwrap_or("?")
            )));
        }
        let factor = spec.resample.factor();
        if factor == 0 {
            return Err(Error::config(format!(
                "stage {}: resampling factor must be positive",
                spec.name.as_deref().unwrap_or("?")
            )));
        }
        let extent = (spec.kernel_size - 1) * spec.dilation;
        let (left_wing, right_wing) = match spec.placement {
            Placement::Centered => (extent / 2, extent - extent / 2),
            Placement::Causal => (extent, 0),
            Placement::Explicit { left, right } => {
                if left + right != extent {
                    return Err(Error::config(format!(
                        "stage {}: wings ({left}, {right}) do not partition \
                         the dilated extent {extent}",
                        spec.name.as_deref().unwrap_or("?")
                    )));
                }
                (left, right)
            }
        };
        if let Resample::Up(u) = spec.resample {
            if extent + 1 < u as usize {
                return Err(Error::config(format!(
                    "stage {}: upsampling filter span {} cannot cover \
                     factor {u}; some output positions would have no \
                     contributing tap",
                    spec.name.as_deref().unwrap_or("?"),
                    extent + 1,
                )));
            }
        }
        Ok(Stage {
            id,
            kernel_size: spec.kernel_size,
            resample: spec.resample,
            dilation: spec.dilation,
            left_wing,
            right_wing,
            left_pad: spec.left_pad,
            right_pad: spec.right_pad,
            name: spec.name,
            parent: None,
            child: None,
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn resample(&self) -> Resample {
        self.resample
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }

    pub fn wings(&self) -> (usize, usize) {
        (self.left_wing, self.right_wing)
    }

    pub fn pads(&self) -> (usize, usize) {
        (self.left_pad, self.right_pad)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<StageId> {
        self.parent
    }

    pub fn child(&self) -> Option<StageId> {
        self.child
    }

    /// Dilated filter extent `(k-1)*d`.
    pub fn extent(&self) -> usize {
        (self.kernel_size - 1) * self.dilation
    }

    fn label(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("stage#{}", self.id),
        }
    }

    /// Minimal input window able to produce every position of `out.sub()`.
    ///
    /// The result is clamped into the propagated full range; the clamp can
    /// only discard positions the boundary pads synthesize.
    pub fn input_range(&self, out: &GridRange) -> Result<GridRange> {
        let (wl, wr) = (self.left_wing as i64, self.right_wing as i64);
        let (pl, pr) = (self.left_pad as i64, self.right_pad as i64);
        match self.resample {
            Resample::Down(s) => {
                let s = s as i64;
                let full = frame(
                    out.full().lo() * s - wl - pl,
                    (out.full().hi() - 1) * s + wr + 1 + pr,
                );
                let sub = if out.is_empty() {
                    Range::empty(out.sub().lo() * s - wl).clamp_into(&full)
                } else {
                    Range::new(
                        out.sub().lo() * s - wl,
                        (out.sub().hi() - 1) * s + wr + 1,
                    )?
                    .clamp_into(&full)
                };
                GridRange::new(full, sub, out.scale().over(s as u64))
            }
            Resample::Up(u) => {
                let u = u as i64;
                let full = frame(
                    ceil_div(out.full().lo() - wr, u) - pl,
                    floor_div(out.full().hi() - 1 + wl, u) + 1 + pr,
                );
                let sub = if out.is_empty() {
                    Range::empty(ceil_div(out.sub().lo() - wr, u)).clamp_into(&full)
                } else {
                    Range::new(
                        ceil_div(out.sub().lo() - wr, u),
                        floor_div(out.sub().hi() - 1 + wl, u) + 1,
                    )?
                    .clamp_into(&full)
                };
                GridRange::new(full, sub, out.scale().times(u as u64))
            }
        }
    }

    /// Output window fully computable from `inp.sub()`.
    ///
    /// Availability extends into the boundary pads only where the window is
    /// flush with the full bound. A non-empty window too short to cover the
    /// filter extent is a configuration error.
    pub fn output_range(&self, inp: &GridRange) -> Result<GridRange> {
        let (wl, wr) = (self.left_wing as i64, self.right_wing as i64);
        let (pl, pr) = (self.left_pad as i64, self.right_pad as i64);
        let avail_lo = if inp.sub().lo() == inp.full().lo() {
            inp.full().lo() - pl
        } else {
            inp.sub().lo()
        };
        let avail_hi = if inp.sub().hi() == inp.full().hi() {
            inp.full().hi() + pr
        } else {
            inp.sub().hi()
        };
        match self.resample {
            Resample::Down(s) => {
                let s = s as i64;
                let full = frame(
                    ceil_div(inp.full().lo() - pl + wl, s),
                    floor_div(inp.full().hi() + pr - 1 - wr, s) + 1,
                );
                let sub = if inp.is_empty() {
                    Range::empty(ceil_div(inp.sub().lo() + wl, s)).clamp_into(&full)
                } else {
                    let lo = ceil_div(avail_lo + wl, s);
                    let hi = floor_div(avail_hi - 1 - wr, s) + 1;
                    if hi < lo {
                        return Err(self.too_short(inp));
                    }
                    Range::new(lo, hi)?.clamp_into(&full)
                };
                GridRange::new(full, sub, inp.scale().times(s as u64))
            }
            Resample::Up(u) => {
                let u = u as i64;
                let full = frame(
                    (inp.full().lo() - pl - 1) * u + wr + 1,
                    (inp.full().hi() + pr) * u - wl,
                );
                let sub = if inp.is_empty() {
                    Range::empty((inp.sub().lo() - 1) * u + wr + 1).clamp_into(&full)
                } else {
                    let lo = (avail_lo - 1) * u + wr + 1;
                    let hi = avail_hi * u - wl;
                    if hi < lo {
                        return Err(self.too_short(inp));
                    }
                    Range::new(lo, hi)?.clamp_into(&full)
                };
                GridRange::new(full, sub, inp.scale().over(u as u64))
            }
        }
    }

    fn too_short(&self, inp: &GridRange) -> Error {
        Error::config(format!(
            "window {} at stage `{}` is shorter than the filter span \
             (kernel {}, dilation {}, wings ({}, {})); no output position \
             is fully covered",
            inp.sub(),
            self.label(),
            self.kernel_size,
            self.dilation,
            self.left_wing,
            self.right_wing,
        ))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resample = match self.resample {
            Resample::Down(1) => String::new(),
            Resample::Down(s) => format!(" /{s}"),
            Resample::Up(u) => format!(" x{u}"),
        };
        write!(
            f,
            "{:<14} k={:<3}{} d={} wings=({}, {})",
            self.label(),
            self.kernel_size,
            resample,
            self.dilation,
            self.left_wing,
            self.right_wing,
        )?;
        if self.left_pad != 0 || self.right_pad != 0 {
            write!(f, " pads=({}, {})", self.left_pad, self.right_pad)?;
        }
        Ok(())
    }
}

/// Full-range candidate; a degenerate pair collapses to an empty frame.
fn frame(lo: i64, hi: i64) -> Range {
    Range::saturating(lo, hi)
}

fn ceil_div(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    (a + b - 1).div_euclid(b)
}

fn floor_div(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    a.div_euclid(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::range::Scale;

    fn stage(spec: StageSpec) -> Stage {
        Stage::from_spec(0, spec).unwrap()
    }

    fn gr(full: (i64, i64), sub: (i64, i64)) -> GridRange {
        GridRange::from_bounds(full, sub).unwrap()
    }

    #[test]
    fn test_wing_derivation() {
        assert_eq!(stage(StageSpec::conv(400, 160)).wings(), (199, 200));
        assert_eq!(stage(StageSpec::conv(4, 2)).wings(), (1, 2));
        assert_eq!(stage(StageSpec::upsample(25, 5)).wings(), (12, 12));
        assert_eq!(stage(StageSpec::upsample(16, 4)).wings(), (7, 8));
        assert_eq!(stage(StageSpec::dilated(2, 512)).wings(), (512, 0));
        assert_eq!(stage(StageSpec::conv(3, 1).with_wings(0, 2)).wings(), (0, 2));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Stage::from_spec(0, StageSpec::conv(0, 1)).is_err());
        assert!(Stage::from_spec(0, StageSpec::conv(3, 0)).is_err());
        assert!(Stage::from_spec(0, StageSpec::conv(3, 1).with_wings(2, 2)).is_err());
        // A kernel-2 filter cannot cover a 4x upsampling grid.
        assert!(Stage::from_spec(0, StageSpec::upsample(2, 4)).is_err());
    }

    #[test]
    fn test_identity_stage() {
        let s = stage(StageSpec::conv(1, 1));
        let r = gr((0, 1000), (13, 250));
        assert_eq!(s.input_range(&r).unwrap(), r);
        assert_eq!(s.output_range(&r).unwrap(), r);
    }

    #[test]
    fn test_down_inverse_then_forward_is_exact() {
        let s = stage(StageSpec::conv(4, 2));
        let out = gr((0, 100_000), (0, 10));
        let inp = s.input_range(&out).unwrap();
        assert_eq!(inp.sub(), &Range::new(-1, 21).unwrap());
        let back = s.output_range(&inp).unwrap();
        assert_eq!(back.sub(), out.sub());
    }

    #[test]
    fn test_zero_wing_form_matches_reference_numbers() {
        // k=4, s=2 with all wings on the right: inverse of (0, 10) is (0, 22).
        let s = stage(StageSpec::conv(4, 2).with_wings(0, 3));
        let out = gr((0, 100_000), (0, 10));
        let inp = s.input_range(&out).unwrap();
        assert_eq!(inp.sub(), &Range::new(0, 22).unwrap());
    }

    #[test]
    fn test_up_inverse_reference_numbers() {
        let s = stage(StageSpec::upsample(16, 4));
        let out = GridRange::new(
            Range::new(-1 << 30, 1 << 30).unwrap(),
            Range::new(-2046, 100).unwrap(),
            Scale::unit(),
        )
        .unwrap();
        let inp = s.input_range(&out).unwrap();
        assert_eq!(inp.sub(), &Range::new(-513, 27).unwrap());
    }

    #[test]
    fn test_up_forward_covers_inverse_request() {
        let s = stage(StageSpec::upsample(25, 5));
        let out = GridRange::new(
            Range::new(-1 << 30, 1 << 30).unwrap(),
            Range::new(-34, 4).unwrap(),
            Scale::unit(),
        )
        .unwrap();
        let inp = s.input_range(&out).unwrap();
        assert_eq!(inp.sub(), &Range::new(-9, 4).unwrap());
        let fwd = s.output_range(&inp).unwrap();
        assert!(fwd.sub().contains(out.sub()));
    }

    #[test]
    fn test_round_trip_is_conservative() {
        let kernels = [1usize, 2, 3, 5, 8];
        let strides = [1u32, 2, 3, 4];
        let dilations = [1usize, 2, 4];
        for &k in &kernels {
            for &s in &strides {
                for &d in &dilations {
                    for placement in [Placement::Centered, Placement::Causal] {
                        let st = stage(
                            StageSpec::conv(k, s)
                                .with_placement(placement)
                                .with_pads(0, 0),
                        );
                        for lo in [-7i64, 0, 3] {
                            let out = gr((-1 << 30, 1 << 30), (lo, lo + 11));
                            let inp = st.input_range(&out).unwrap();
                            let back = st.output_range(&inp).unwrap();
                            assert!(
                                back.sub().contains(out.sub()),
                                "k={k} s={s} d={d} {placement:?} lo={lo}: \
                                 {} does not cover {}",
                                back.sub(),
                                out.sub(),
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_up_round_trip_is_conservative() {
        for (k, u) in [(8usize, 2u32), (16, 4), (25, 5), (4, 4)] {
            let st = stage(StageSpec::upsample(k, u));
            for lo in [-13i64, 0, 5] {
                let out = gr((-1 << 30, 1 << 30), (lo, lo + 17));
                let inp = st.input_range(&out).unwrap();
                let back = st.output_range(&inp).unwrap();
                assert!(
                    back.sub().contains(out.sub()),
                    "k={k} u={u} lo={lo}: {} does not cover {}",
                    back.sub(),
                    out.sub(),
                );
            }
        }
    }

    #[test]
    fn test_empty_window_propagates() {
        let down = stage(StageSpec::conv(4, 2));
        let up = stage(StageSpec::upsample(16, 4));
        let empty = gr((-1000, 1000), (40, 40));
        for st in [&down, &up] {
            assert_eq!(st.input_range(&empty).unwrap().sub_length(), 0);
            assert_eq!(st.output_range(&empty).unwrap().sub_length(), 0);
        }
    }

    #[test]
    fn test_window_shorter_than_filter_is_config_error() {
        let s = stage(StageSpec::conv(400, 160));
        let inp = gr((-1 << 30, 1 << 30), (0, 10));
        match s.output_range(&inp) {
            Err(Error::Config(msg)) => assert!(msg.contains("shorter than the filter")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_boundary_pads_extend_flush_windows() {
        // Centering pads of half the window make frame 0 computable from
        // a window flush with the signal start.
        let s = stage(StageSpec::conv(400, 160).with_pads(200, 200));
        let flush = gr((0, 4000), (0, 500));
        let out = s.output_range(&flush).unwrap();
        assert_eq!(out.sub().lo(), 0);
        // An interior window with the same length starts later.
        let interior = gr((0, 4000), (160, 660));
        let out = s.output_range(&interior).unwrap();
        assert!(out.sub().lo() > 0);
    }

    #[test]
    fn test_scale_compounds_through_stage() {
        let s = stage(StageSpec::conv(4, 2));
        let r = gr((0, 1 << 20), (0, 64));
        assert_eq!(s.output_range(&r).unwrap().scale(), Scale::unit().times(2));
        let up = stage(StageSpec::upsample(16, 4));
        assert_eq!(up.output_range(&r).unwrap().scale(), Scale::unit().over(4));
    }
}
