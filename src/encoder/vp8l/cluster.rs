//! Histogram clustering: entropy-bin pre-pass, stochastic refiner, greedy
//! merger and the final tile remap.

use alloc::vec::Vec;

use enough::Stop;

use super::super::error::EncodeError;
use super::histogram::{
    combined_histogram_cost, saturate_add, Histogram, HistogramSet, NON_TRIVIAL_SYM,
};
use super::types::{subsample_size, BackwardRefs};

/// Number of partitions for each of the three dominant (literal, red and
/// blue) symbol costs.
const NUM_PARTITIONS: usize = 4;
/// Size of the bin-hash over the three dominant costs.
const BIN_SIZE: usize = NUM_PARTITIONS * NUM_PARTITIONS * NUM_PARTITIONS;
/// Maximum number of histograms allowed into the greedy combiner.
const MAX_HISTO_GREEDY: usize = 100;

/// Knobs of the clustering pipeline.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Quality in `[0..100]`; drives the combine-cost factor and the
    /// greedy-ramp threshold.
    pub quality: u8,
    /// Merge aggressively and skip the stochastic/greedy passes where
    /// possible.
    pub low_effort: bool,
    /// Tile size as a power of two (0 = one histogram for the whole
    /// image).
    pub histogram_bits: u8,
    /// Color-cache width in bits (0 = no cache); sizes the literal
    /// alphabet.
    pub cache_bits: u8,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            quality: 75,
            low_effort: false,
            histogram_bits: 3,
            cache_bits: 0,
        }
    }
}

/// Lehmer generator (multiplier 48271 modulo 2^31 - 1), seeded at 1 for
/// deterministic clustering.
struct Rng {
    seed: u32,
}

impl Rng {
    fn new() -> Self {
        Self { seed: 1 }
    }

    #[inline]
    fn next(&mut self) -> u32 {
        self.seed = ((u64::from(self.seed) * 48271) % 2147483647) as u32;
        debug_assert!(self.seed > 0);
        self.seed
    }
}

// ---------------------------------------------------------------------------
// Histogram pairs priority queue

/// Candidate merge of two histogram slots.
#[derive(Debug, Clone, Copy)]
struct HistogramPair {
    idx1: usize,
    idx2: usize,
    cost_diff: i64,
    cost_combo: u64,
}

/// Priority queue with one head invariant: `queue[0]` has the minimum
/// `cost_diff`; the rest is unordered and scanned linearly on every merge.
struct HistoQueue {
    queue: Vec<HistogramPair>,
    max_size: usize,
}

impl HistoQueue {
    fn new(max_size: usize) -> Result<Self, EncodeError> {
        let mut queue = Vec::new();
        queue
            .try_reserve_exact(max_size)
            .map_err(|_| EncodeError::OutOfMemory)?;
        Ok(Self { queue, max_size })
    }

    /// Pop a specific pair by replacing it with the last one.
    fn pop(&mut self, i: usize) {
        self.queue.swap_remove(i);
    }

    /// Swap entry `i` into the head slot if it beats the current head.
    fn update_head(&mut self, i: usize) {
        debug_assert!(self.queue[i].cost_diff < 0);
        if self.queue[i].cost_diff < self.queue[0].cost_diff {
            self.queue.swap(0, i);
        }
    }
}

/// Refresh a pair's combined cost after one of its members changed.
/// Returns false (leaving the pair invalid) on a threshold bail.
fn update_pair(
    h1: &Histogram,
    h2: &Histogram,
    cost_threshold: i64,
    pair: &mut HistogramPair,
) -> bool {
    let sum_cost = h1.bit_cost + h2.bit_cost;
    let threshold = saturate_add(sum_cost, cost_threshold);
    match combined_histogram_cost(h1, h2, threshold) {
        None => false,
        Some(cost) => {
            pair.cost_combo = cost;
            pair.cost_diff = cost as i64 - sum_cost as i64;
            true
        }
    }
}

/// Create and enqueue the pair `(idx1, idx2)` provided its cost diff beats
/// `threshold` (a non-positive entropy). Returns the cost diff, or 0 when
/// the pair was not enqueued.
fn queue_push(
    queue: &mut HistoQueue,
    histos: &[Option<Histogram>],
    idx1: usize,
    idx2: usize,
    threshold: i64,
) -> i64 {
    // Stop here if the queue is full.
    if queue.queue.len() == queue.max_size {
        return 0;
    }
    debug_assert!(threshold <= 0);
    let (idx1, idx2) = if idx1 > idx2 { (idx2, idx1) } else { (idx1, idx2) };
    let mut pair = HistogramPair {
        idx1,
        idx2,
        cost_diff: 0,
        cost_combo: 0,
    };
    let h1 = histos[idx1].as_ref().expect("pairing an absent histogram");
    let h2 = histos[idx2].as_ref().expect("pairing an absent histogram");

    // Do not even consider the pair if it does not improve the entropy.
    if !update_pair(h1, h2, threshold, &mut pair) {
        return 0;
    }

    let cost_diff = pair.cost_diff;
    queue.queue.push(pair);
    let last = queue.queue.len() - 1;
    queue.update_head(last);
    cost_diff
}

// ---------------------------------------------------------------------------
// Combine / cost-eval helpers

/// `out = a + b` when the combined cost beats `a + b`'s summed cost by
/// more than `cost_threshold` (non-positive). `out`'s cached `bit_cost`
/// is the combined cost.
fn histogram_add_eval(
    a: &Histogram,
    b: &Histogram,
    out: &mut Histogram,
    cost_threshold: i64,
) -> bool {
    let sum_cost = a.bit_cost + b.bit_cost;
    let threshold = saturate_add(sum_cost, cost_threshold);
    match combined_histogram_cost(a, b, threshold) {
        None => false,
        Some(cost) => {
            out.clone_from(a);
            out.accumulate(b);
            out.bit_cost = cost;
            true
        }
    }
}

/// Evaluate `C(a+b) - C(a)` against a threshold without materializing the
/// union; the `C(b)` term is constant across candidates and omitted.
fn histogram_add_thresh(a: &Histogram, b: &Histogram, cost_threshold: i64) -> Option<i64> {
    let threshold = saturate_add(a.bit_cost, cost_threshold);
    combined_histogram_cost(a, b, threshold).map(|cost| cost as i64 - a.bit_cost as i64)
}

// ---------------------------------------------------------------------------
// Entropy-bin pre-pass

/// Cost ranges of the three dominant symbol classes across all tiles.
struct DominantCostRange {
    literal_min: u64,
    literal_max: u64,
    red_min: u64,
    red_max: u64,
    blue_min: u64,
    blue_max: u64,
}

impl DominantCostRange {
    fn new() -> Self {
        Self {
            literal_min: u64::MAX,
            literal_max: 0,
            red_min: u64::MAX,
            red_max: 0,
            blue_min: u64::MAX,
            blue_max: 0,
        }
    }

    fn update(&mut self, h: &Histogram) {
        self.literal_min = self.literal_min.min(h.literal_cost);
        self.literal_max = self.literal_max.max(h.literal_cost);
        self.red_min = self.red_min.min(h.red_cost);
        self.red_max = self.red_max.max(h.red_cost);
        self.blue_min = self.blue_min.min(h.blue_cost);
        self.blue_max = self.blue_max.max(h.blue_cost);
    }
}

fn bin_id_for_entropy(min: u64, max: u64, val: u64) -> usize {
    let range = max - min;
    if range > 0 {
        let delta = val - min;
        // An exact multiple of range / NUM_PARTITIONS belongs to the lower
        // bin: the partition ratio is biased down by an epsilon.
        let scaled = NUM_PARTITIONS as u64 * delta;
        let bin = if scaled > 0 && scaled % range == 0 {
            scaled / range - 1
        } else {
            scaled / range
        };
        (bin as usize).min(NUM_PARTITIONS - 1)
    } else {
        0
    }
}

fn histo_bin_index(h: &Histogram, c: &DominantCostRange, low_effort: bool) -> usize {
    let mut bin_id = bin_id_for_entropy(c.literal_min, c.literal_max, h.literal_cost);
    debug_assert!(bin_id < NUM_PARTITIONS);
    if !low_effort {
        bin_id = bin_id * NUM_PARTITIONS + bin_id_for_entropy(c.red_min, c.red_max, h.red_cost);
        bin_id = bin_id * NUM_PARTITIONS + bin_id_for_entropy(c.blue_min, c.blue_max, h.blue_cost);
        debug_assert!(bin_id < BIN_SIZE);
    }
    bin_id
}

/// Bucket every tile by its dominant costs.
fn analyze_entropy_bin(set: &mut HistogramSet, low_effort: bool) {
    let mut cost_range = DominantCostRange::new();
    for i in 0..set.size {
        if let Some(h) = set.histos[i].as_ref() {
            cost_range.update(h);
        }
    }
    for i in 0..set.size {
        if let Some(h) = set.histos[i].as_mut() {
            h.bin_id = histo_bin_index(h, &cost_range, low_effort) as u16;
        }
    }
}

/// Fold tiles into the first tile of their bin when advantageous (always,
/// under low effort). `combine_cost_factor` is in percent-hundredths.
fn combine_entropy_bin(
    set: &mut HistogramSet,
    num_used: &mut usize,
    tmp: &mut Histogram,
    num_bins: usize,
    combine_cost_factor: i64,
    low_effort: bool,
) {
    #[derive(Clone, Copy)]
    struct BinInfo {
        // Slot accumulating all histograms with the same bin id.
        first: Option<usize>,
        num_combine_failures: u32,
    }
    let mut bin_info = [BinInfo {
        first: None,
        num_combine_failures: 0,
    }; BIN_SIZE];
    debug_assert!(num_bins <= BIN_SIZE);

    let mut idx = 0;
    while idx < set.size {
        let Some(h) = set.histos[idx].as_ref() else {
            idx += 1;
            continue;
        };
        let bin_id = usize::from(h.bin_id);
        debug_assert!(bin_id < num_bins);
        let Some(first) = bin_info[bin_id].first else {
            bin_info[bin_id].first = Some(idx);
            idx += 1;
            continue;
        };
        if low_effort {
            let removed = set.remove(idx, num_used);
            set.histos[first]
                .as_mut()
                .expect("bin representative vanished")
                .accumulate(&removed);
            idx += 1;
            continue;
        }
        // Try to merge this tile into its bin's representative.
        let bit_cost = h.bit_cost;
        let bit_cost_thresh = -((bit_cost as i64 * combine_cost_factor + 50) / 100);
        let first_h = set.histos[first].as_ref().expect("bin representative vanished");
        if histogram_add_eval(first_h, h, tmp, bit_cost_thresh) {
            // Only fold trivial histograms into trivial combos (or merge
            // pairs that are already non-trivial); anything else inflates
            // the header. After 32 rejections in a bin, merge regardless.
            let try_combine = tmp.trivial_symbol != NON_TRIVIAL_SYM
                || (h.trivial_symbol == NON_TRIVIAL_SYM
                    && first_h.trivial_symbol == NON_TRIVIAL_SYM);
            let max_combine_failures = 32;
            if try_combine || bin_info[bin_id].num_combine_failures >= max_combine_failures {
                // Move the (better) merged histogram to its final slot.
                core::mem::swap(tmp, set.histos[first].as_mut().expect("bin representative"));
                set.remove(idx, num_used);
            } else {
                bin_info[bin_id].num_combine_failures += 1;
            }
        }
        idx += 1;
    }

    if low_effort {
        // Unconditional merging skipped the cost bookkeeping; settle it now.
        for i in 0..set.size {
            if let Some(h) = set.histos[i].as_mut() {
                h.update_cost();
            }
        }
    }
}

fn combine_cost_factor(histo_size: usize, quality: u8) -> i64 {
    let mut factor: i64 = 16;
    if quality < 90 {
        if histo_size > 256 {
            factor /= 2;
        }
        if histo_size > 512 {
            factor /= 2;
        }
        if histo_size > 1024 {
            factor /= 2;
        }
        if quality <= 50 {
            factor /= 2;
        }
    }
    factor
}

// ---------------------------------------------------------------------------
// Stochastic pass

/// Collapse similar histograms by sampling random pairs through a small
/// priority queue. Returns whether the greedy pass should run afterwards.
fn combine_stochastic(
    set: &mut HistogramSet,
    num_used: &mut usize,
    min_cluster_size: usize,
) -> Result<bool, EncodeError> {
    let mut rng = Rng::new();
    let mut tries_with_no_success = 0usize;
    let outer_iters = *num_used;
    let num_tries_no_success = outer_iters / 2;
    // The queue size trades compression for speed: the smaller the faster
    // but the worse for the compression.
    const QUEUE_SIZE: usize = 9;

    if *num_used < min_cluster_size {
        return Ok(true);
    }

    let mut queue = HistoQueue::new(QUEUE_SIZE)?;

    // Mapping from the dense live index space to slot indices.
    let mut mappings: Vec<usize> = Vec::new();
    mappings
        .try_reserve_exact(*num_used)
        .map_err(|_| EncodeError::OutOfMemory)?;
    for (i, h) in set.histos[..set.size].iter().enumerate() {
        if h.is_some() {
            mappings.push(i);
        }
    }
    debug_assert_eq!(mappings.len(), *num_used);

    for _iter in 0..outer_iters {
        if *num_used < min_cluster_size {
            break;
        }
        tries_with_no_success += 1;
        if tries_with_no_success >= num_tries_no_success {
            break;
        }

        let mut best_cost = if queue.queue.is_empty() {
            0
        } else {
            queue.queue[0].cost_diff
        };
        let rand_range = (*num_used - 1) * (*num_used);
        // num_used / 2 draws was chosen empirically; fewer is faster but
        // compresses worse.
        let num_tries = *num_used / 2;

        for _j in 0..num_tries {
            if *num_used < 2 {
                break;
            }
            // Choose two different histograms at random.
            let tmp = (u64::from(rng.next()) % rand_range as u64) as usize;
            let idx1 = tmp / (*num_used - 1);
            let mut idx2 = tmp % (*num_used - 1);
            if idx2 >= idx1 {
                idx2 += 1;
            }
            let idx1 = mappings[idx1];
            let idx2 = mappings[idx2];

            let curr_cost = queue_push(&mut queue, &set.histos, idx1, idx2, best_cost);
            if curr_cost < 0 {
                // Found a better pair.
                best_cost = curr_cost;
                if queue.queue.len() == queue.max_size {
                    break;
                }
            }
        }
        if queue.queue.is_empty() {
            continue;
        }

        // Merge the best pair and drop its second index everywhere.
        let best_idx1 = queue.queue[0].idx1;
        let best_idx2 = queue.queue[0].idx2;
        debug_assert!(best_idx1 < best_idx2);
        let pos = mappings
            .binary_search(&best_idx2)
            .expect("merged slot missing from the mapping");
        mappings.remove(pos);

        let cost_combo = queue.queue[0].cost_combo;
        let removed = set.remove(best_idx2, num_used);
        let h1 = set.histos[best_idx1]
            .as_mut()
            .expect("merge target vanished");
        h1.accumulate(&removed);
        h1.bit_cost = cost_combo;

        // Re-point every queue entry touching the merged pair at the
        // survivor; duplicates (possible through random picks) are pruned.
        let mut j = 0;
        while j < queue.queue.len() {
            let mut p = queue.queue[j];
            let is_idx1_best = p.idx1 == best_idx1 || p.idx1 == best_idx2;
            let is_idx2_best = p.idx2 == best_idx1 || p.idx2 == best_idx2;
            if is_idx1_best && is_idx2_best {
                queue.pop(j);
                continue;
            }
            let mut do_eval = false;
            if is_idx1_best {
                p.idx1 = best_idx1;
                do_eval = true;
            } else if is_idx2_best {
                p.idx2 = best_idx1;
                do_eval = true;
            }
            if p.idx1 > p.idx2 {
                core::mem::swap(&mut p.idx1, &mut p.idx2);
            }
            if do_eval {
                let h1 = set.histos[p.idx1].as_ref().expect("queue references a hole");
                let h2 = set.histos[p.idx2].as_ref().expect("queue references a hole");
                if !update_pair(h1, h2, 0, &mut p) {
                    queue.pop(j);
                    continue;
                }
            }
            queue.queue[j] = p;
            queue.update_head(j);
            j += 1;
        }
        tries_with_no_success = 0;
    }

    Ok(*num_used <= min_cluster_size)
}

// ---------------------------------------------------------------------------
// Greedy pass

/// Combine histograms by continuously merging the pair with the highest
/// cost reduction, over a dense pair queue.
fn combine_greedy(set: &mut HistogramSet, num_used: &mut usize) -> Result<(), EncodeError> {
    let n = set.size;
    // n^2 pairs is a safe bound: the initial triangle holds n(n-1)/2 and
    // each merge pushes at most n - 1 fresh pairs.
    let mut queue = HistoQueue::new(n * n)?;

    for i in 0..n {
        if set.histos[i].is_none() {
            continue;
        }
        for j in (i + 1)..n {
            if set.histos[j].is_none() {
                continue;
            }
            queue_push(&mut queue, &set.histos, i, j, 0);
        }
    }

    while !queue.queue.is_empty() {
        let idx1 = queue.queue[0].idx1;
        let idx2 = queue.queue[0].idx2;
        let cost_combo = queue.queue[0].cost_combo;
        let removed = set.remove(idx2, num_used);
        let h1 = set.histos[idx1].as_mut().expect("merge target vanished");
        h1.accumulate(&removed);
        h1.bit_cost = cost_combo;

        // Remove pairs intersecting the just-combined pair.
        let mut i = 0;
        while i < queue.queue.len() {
            let p = queue.queue[i];
            if p.idx1 == idx1 || p.idx2 == idx1 || p.idx1 == idx2 || p.idx2 == idx2 {
                queue.pop(i);
            } else {
                queue.update_head(i);
                i += 1;
            }
        }

        // Push new pairs formed with the combined histogram.
        for i in 0..set.size {
            if i == idx1 || set.histos[i].is_none() {
                continue;
            }
            queue_push(&mut queue, &set.histos, idx1, i, 0);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Remap

/// Assign every original tile to its cheapest final cluster, then rebuild
/// the final clusters from the raw tile counts.
fn remap(orig: &HistogramSet, out: &mut HistogramSet, symbols: &mut [u32]) {
    let in_size = orig.max_size();
    let out_size = out.size;

    if out_size > 1 {
        for i in 0..in_size {
            let Some(h) = orig.histos[i].as_ref() else {
                // Arbitrarily reuse the previous assignment for an absent
                // tile, to help future LZ77.
                symbols[i] = symbols[i - 1];
                continue;
            };
            let mut best_out = 0u32;
            let mut best_bits = i64::MAX;
            for (k, cluster) in out.histos[..out_size].iter().enumerate() {
                let cluster = cluster.as_ref().expect("absent final cluster");
                if let Some(cur_bits) = histogram_add_thresh(cluster, h, best_bits) {
                    best_bits = cur_bits;
                    best_out = k as u32;
                }
            }
            symbols[i] = best_out;
        }
    } else {
        debug_assert_eq!(out_size, 1);
        symbols[..in_size].fill(0);
    }

    // Rebuild each cluster from the raw tile counts; these final counts
    // are the ones written to the output.
    for cluster in out.histos[..out_size].iter_mut() {
        cluster.as_mut().expect("absent final cluster").clear();
    }
    for i in 0..in_size {
        let Some(h) = orig.histos[i].as_ref() else {
            continue;
        };
        let idx = symbols[i] as usize;
        out.histos[idx]
            .as_mut()
            .expect("absent final cluster")
            .accumulate(h);
    }
}

// ---------------------------------------------------------------------------
// Driver

fn copy_and_analyze(orig: &mut HistogramSet, image_histo: &mut HistogramSet, num_used: &mut usize) {
    image_histo.size = 0;
    for i in 0..orig.max_size() {
        let h = orig.histos[i].as_mut().expect("original tile vanished");
        h.update_cost();

        // Drop tiles with no information at all (fully covered by LZ77
        // copies reaching into other tiles). The first tile always stays.
        if i > 0 && !h.is_used.iter().any(|&u| u) {
            orig.histos[i] = None;
            *num_used -= 1;
        } else {
            let slot = image_histo.size;
            image_histo.histos[slot]
                .as_mut()
                .expect("unallocated image histogram slot")
                .clone_from(h);
            image_histo.size += 1;
        }
    }
}

/// Cluster the per-tile histograms of `refs` into a small set of final
/// histograms, filling `symbols[i]` with the final cluster index of tile
/// `i`. `image_histo` must be allocated with one slot per tile and the
/// same cache width as `config.cache_bits`; on return its first
/// `image_histo.size` slots hold the final clusters rebuilt from the raw
/// tile counts.
#[allow(clippy::too_many_arguments)]
pub fn get_histo_image_symbols(
    xsize: usize,
    ysize: usize,
    refs: &BackwardRefs,
    config: &ClusterConfig,
    image_histo: &mut HistogramSet,
    symbols: &mut [u32],
    stop: &dyn Stop,
    progress: &mut dyn FnMut(u8) -> bool,
) -> Result<(), EncodeError> {
    if xsize == 0 || ysize == 0 {
        return Err(EncodeError::InvalidConfig("empty image"));
    }
    if config.quality > 100 {
        return Err(EncodeError::InvalidConfig("quality must be in 0..=100"));
    }
    if config.histogram_bits > 9 {
        return Err(EncodeError::InvalidConfig("histogram_bits must be in 0..=9"));
    }
    if config.cache_bits > 11 {
        return Err(EncodeError::InvalidConfig("cache_bits must be in 0..=11"));
    }
    let histo_bits = config.histogram_bits;
    let histo_xsize = if histo_bits > 0 {
        subsample_size(xsize, histo_bits)
    } else {
        1
    };
    let histo_ysize = if histo_bits > 0 {
        subsample_size(ysize, histo_bits)
    } else {
        1
    };
    let raw_size = histo_xsize
        .checked_mul(histo_ysize)
        .ok_or(EncodeError::OutOfMemory)?;
    if image_histo.max_size() != raw_size {
        return Err(EncodeError::InvalidConfig(
            "image_histo must hold one slot per tile",
        ));
    }
    if symbols.len() != raw_size {
        return Err(EncodeError::InvalidConfig(
            "symbols must hold one entry per tile",
        ));
    }
    let slot_bits = image_histo.histos[0]
        .as_ref()
        .map(|h| h.palette_code_bits);
    if slot_bits != Some(config.cache_bits) {
        return Err(EncodeError::InvalidConfig(
            "image_histo cache width does not match the configuration",
        ));
    }

    let mut orig = HistogramSet::new(raw_size, config.cache_bits);

    // Construct the histograms from backward references.
    if raw_size == 1 {
        let tile = orig.histos[0].as_mut().expect("unallocated tile");
        tile.store_refs(refs);
    } else {
        let mut x = 0usize;
        let mut y = 0usize;
        for v in refs.iter() {
            let ix = (y >> histo_bits) * histo_xsize + (x >> histo_bits);
            orig.histos[ix]
                .as_mut()
                .expect("unallocated tile")
                .add_symbol(v);
            x += v.length();
            while x >= xsize {
                x -= xsize;
                y += 1;
            }
        }
    }
    stop.check()?;

    let mut num_used = raw_size;
    copy_and_analyze(&mut orig, image_histo, &mut num_used);

    let entropy_combine_num_bins = if config.low_effort {
        NUM_PARTITIONS
    } else {
        BIN_SIZE
    };
    // The bin-partition heuristic is pointless on sparse bin maps, and is
    // skipped at the maximum quality to preserve its gains.
    let entropy_combine = num_used > entropy_combine_num_bins * 2 && config.quality < 100;

    if entropy_combine {
        let mut tmp = Histogram::new(config.cache_bits);
        let factor = combine_cost_factor(raw_size, config.quality);
        analyze_entropy_bin(image_histo, config.low_effort);
        combine_entropy_bin(
            image_histo,
            &mut num_used,
            &mut tmp,
            entropy_combine_num_bins,
            factor,
            config.low_effort,
        );
    }
    stop.check()?;

    if !config.low_effort || !entropy_combine {
        // Cubic ramp between 1 and MAX_HISTO_GREEDY as quality grows.
        let q = u64::from(config.quality);
        let threshold_size =
            1 + ((q * q * q * (MAX_HISTO_GREEDY as u64 - 1) + 500_000) / 1_000_000) as usize;
        let do_greedy = combine_stochastic(image_histo, &mut num_used, threshold_size)?;
        if do_greedy {
            image_histo.remove_empty();
            combine_greedy(image_histo, &mut num_used)?;
        }
    }
    stop.check()?;

    // Find the optimal map from the original histograms to the final ones.
    image_histo.remove_empty();
    remap(&orig, image_histo, symbols);

    if !progress(100) {
        return Err(EncodeError::UserAbort);
    }
    Ok(())
}
