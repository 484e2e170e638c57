//! Core engines of a WebP codec.
//!
//! Copyright (C) 2025 Imazen LLC
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU Affero General Public License as published
//! by the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! For commercial licensing inquiries: support@imazen.io
//!
//! This crate provides the two algorithmic engines at the heart of a WebP
//! codec, with parsing, SIMD kernel selection and the public image API left
//! to the surrounding crates:
//!
//! - **Lossy (VP8) frame reconstruction** ([`decoder`]): per-macroblock
//!   intra prediction and residual inverse transforms over a SIMD-friendly
//!   sample scratch, the in-loop deblocking filter with cropping-aware
//!   scheduling, optional chroma dithering, and a single- or two-threaded
//!   reconstruct→filter→output row pipeline over a ring of 1–3 row slots.
//! - **Lossless (VP8L) histogram clustering** ([`encoder::vp8l`]): per-tile
//!   symbol histograms over backward-reference streams, a fixed-point
//!   Huffman cost model, and the entropy-bin / stochastic / greedy cluster
//!   pipeline that assigns every tile to a final histogram.
//!
//! # Features
//!
//! - `std` (default): enables the threaded row pipeline. Everything else
//!   works without it.
//!
//! # no_std Support
//!
//! The crate works in `no_std` environments (requires `alloc`):
//! ```toml
//! [dependencies]
//! zenwebp-core = { version = "...", default-features = false }
//! ```
//! Without `std` the row pipeline always runs serially.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

pub mod common;
pub mod decoder;
pub mod encoder;

// Re-export decoder public API
pub use decoder::{
    AlphaDecoder, CropRect, DecodeError, DecodeOptions, FilterInfo, FilterType, FrameDescriptor,
    MacroblockData, OutputSink, RowBand, TopSamples, Vp8FrameDecoder, MIN_WIDTH_FOR_THREADS,
};

// Re-export clusterer public API
pub use encoder::vp8l::{
    get_histo_image_symbols, BackwardRefs, ClusterConfig, Histogram, HistogramSet, PixOrCopy,
};
pub use encoder::EncodeError;

// Re-export cooperative cancellation types
pub use enough::{Stop, StopReason, Unstoppable};
