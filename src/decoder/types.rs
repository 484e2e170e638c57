//! Per-macroblock records exchanged between the parser and this pipeline.

use crate::common::types::{ChromaMode, IntraMode, LumaMode};

/// In-loop filter flavour for the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Filtering disabled (`filter_level == 0` or bypassed).
    #[default]
    None,
    /// Simple filter: luma only, one sample written per edge.
    Simple,
    /// Complex (normal) filter: luma and chroma, up to three samples
    /// written per edge.
    Complex,
}

impl FilterType {
    /// Extra rows of the previous macroblock row that must be withheld from
    /// output and kept around as filter context.
    #[inline]
    pub(crate) fn extra_rows(self) -> usize {
        match self {
            FilterType::None => 0,
            FilterType::Simple => 2,
            FilterType::Complex => 8,
        }
    }
}

/// Everything the parser hands over to reconstruct one macroblock.
///
/// The 384 coefficients are the dequantized residuals in block order:
/// sixteen 4x4 luma blocks, then four U and four V blocks. For non-i4x4
/// macroblocks the parser has already distributed the DC plane (the inverse
/// Walsh-Hadamard transform) into coefficient 0 of each luma block.
#[derive(Debug, Clone)]
pub struct MacroblockData {
    /// Dequantized residual coefficients, `(16 + 4 + 4) * 16` values.
    pub coeffs: [i16; 384],
    /// Whole-macroblock luma mode; [`LumaMode::B`] means per-sub-block modes.
    pub luma_mode: LumaMode,
    /// The sixteen 4x4 modes, in raster order. Only read when
    /// `luma_mode == LumaMode::B`.
    pub imodes: [IntraMode; 16],
    /// Chroma prediction mode.
    pub chroma_mode: ChromaMode,
    /// Two-bit non-zero code per luma 4x4 block, in decoding order:
    /// 0 = no coefficients, 1 = DC only, 2 = first three non-zero,
    /// 3 = more. Consumed two bits at a time from the top.
    pub non_zero_y: u32,
    /// Same coding for the chroma blocks: U in bits 0..8, V in bits 8..16.
    pub non_zero_uv: u32,
    /// Local dithering strength, deduced from the non-zero pattern.
    pub dither: u8,
    /// Whether all coefficients were skipped.
    pub skip: bool,
    /// Segment this macroblock belongs to.
    pub segment: u8,
}

impl Default for MacroblockData {
    fn default() -> Self {
        Self {
            coeffs: [0; 384],
            luma_mode: LumaMode::default(),
            imodes: [IntraMode::default(); 16],
            chroma_mode: ChromaMode::default(),
            non_zero_y: 0,
            non_zero_uv: 0,
            dither: 0,
            skip: false,
            segment: 0,
        }
    }
}

/// Saved bottom-edge samples of one macroblock column, used as the top
/// border when reconstructing the row below. Fits in a cache line.
#[derive(Debug, Clone, Copy)]
pub struct TopSamples {
    /// Bottom luma row.
    pub y: [u8; 16],
    /// Bottom U row.
    pub u: [u8; 8],
    /// Bottom V row.
    pub v: [u8; 8],
}

impl Default for TopSamples {
    fn default() -> Self {
        Self {
            y: [127; 16],
            u: [127; 8],
            v: [127; 8],
        }
    }
}

/// Precomputed filter strengths for one macroblock.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterInfo {
    /// Filter limit in `[3..189]`, or 0 for no filtering.
    pub f_limit: u8,
    /// Inner (interior) limit in `[1..63]`.
    pub f_ilevel: u8,
    /// Whether sub-block edges are filtered too.
    pub f_inner: bool,
    /// High-edge-variance threshold in `[0..2]`.
    pub hev_thresh: u8,
}
