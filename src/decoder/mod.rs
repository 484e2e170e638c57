//! VP8 frame-reconstruction pipeline.
//!
//! This module rebuilds the YUV picture from parsed macroblock data: intra
//! prediction and residual inverse transforms over a bordered sample
//! scratch, the in-loop deblocking filter, optional chroma dithering, and a
//! row pipeline that emits finished scanline bands through an
//! [`OutputSink`]. The bitstream parser, alpha codec and color conversion
//! are collaborators and stay outside this crate.

mod error;
mod frame;
mod io;
mod loop_filter;
mod random;
mod types;
mod worker;

pub use error::DecodeError;
pub use frame::{
    get_thread_method, DecodeOptions, FrameDescriptor, Vp8FrameDecoder, MIN_WIDTH_FOR_THREADS,
};
pub use io::{AlphaDecoder, CropRect, OutputSink, RowBand};
pub use types::{FilterInfo, FilterType, MacroblockData, TopSamples};
