//! Prediction-mode enums and frame-header records shared across the core.

/// Number of macroblock segments in a VP8 frame.
pub const NUM_MB_SEGMENTS: usize = 4;

/// Luma prediction mode for a whole 16x16 macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LumaMode {
    /// Predict from the average of the top row and left column.
    #[default]
    DC = 0,
    /// Vertical: propagate the top row downwards.
    V = 1,
    /// Horizontal: propagate the left column rightwards.
    H = 2,
    /// TrueMotion: `left + top - top_left` per sample.
    TM = 3,
    /// Per-4x4 sub-block prediction (intra 4x4).
    B = 4,
}

impl LumaMode {
    /// Whether this macroblock predicts each 4x4 sub-block independently.
    #[inline]
    pub fn is_i4x4(self) -> bool {
        self == LumaMode::B
    }
}

/// Chroma prediction mode for the two 8x8 chroma blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaMode {
    /// Predict from the average of the top row and left column.
    #[default]
    DC = 0,
    /// Vertical.
    V = 1,
    /// Horizontal.
    H = 2,
    /// TrueMotion.
    TM = 3,
}

/// Prediction mode of a single 4x4 luma sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntraMode {
    /// Average of top and left edge samples.
    #[default]
    DC = 0,
    /// TrueMotion.
    TM = 1,
    /// Vertical, smoothed with the top-left and top-right samples.
    VE = 2,
    /// Horizontal, smoothed.
    HE = 3,
    /// Left-down diagonal.
    LD = 4,
    /// Right-down diagonal.
    RD = 5,
    /// Vertical-right diagonal.
    VR = 6,
    /// Vertical-left diagonal.
    VL = 7,
    /// Horizontal-down diagonal.
    HD = 8,
    /// Horizontal-up diagonal.
    HU = 9,
}

/// Loop-filter parameters parsed from the frame header.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterHeader {
    /// true = simple filter, false = complex (normal) filter.
    pub simple: bool,
    /// Base filter level in `[0..63]`.
    pub level: u8,
    /// Sharpness in `[0..7]`.
    pub sharpness: u8,
    /// Whether the per-reference / per-mode deltas below apply.
    pub use_lf_delta: bool,
    /// Filter-level delta per reference frame; only index 0 (intra) matters
    /// for keyframes.
    pub ref_lf_delta: [i32; 4],
    /// Filter-level delta per prediction mode; only index 0 (i4x4) matters
    /// for keyframes.
    pub mode_lf_delta: [i32; 4],
}

/// Segment-feature parameters parsed from the frame header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentHeader {
    /// Whether segmentation is active for this frame.
    pub use_segment: bool,
    /// true = segment values are absolute, false = deltas on the frame level.
    pub absolute_delta: bool,
    /// Per-segment filter strength (absolute value or delta).
    pub filter_strength: [i8; NUM_MB_SEGMENTS],
}

/// The subset of the dequantization state the reconstruction core needs:
/// the U/V quantizer drives the dithering amplitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantInfo {
    /// U/V AC quantizer index for this segment.
    pub uv_quant: i32,
    /// Dithering amplitude for this segment (0 = off, max 255). Filled in
    /// by [`crate::decoder::Vp8FrameDecoder::init_dithering`].
    pub dither: u8,
}
