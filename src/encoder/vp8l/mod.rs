//! VP8L (lossless WebP) histogram clustering.
//!
//! Given an image partitioned into tiles of backward-reference symbols,
//! this module builds per-tile symbol histograms, estimates each
//! histogram's Huffman-coded bit cost, and clusters the tiles into a small
//! number of final histograms: an entropy-bin pre-pass, a stochastic
//! random-pair refiner, and a greedy priority-queue merger, followed by a
//! final remap of every tile to its nearest cluster.

mod cluster;
mod entropy;
mod histogram;
mod types;

pub use cluster::{get_histo_image_symbols, ClusterConfig};
pub use histogram::{Histogram, HistogramSet, NON_TRIVIAL_SYM};
pub use types::{BackwardRefs, PixOrCopy};
