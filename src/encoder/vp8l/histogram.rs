//! Per-tile symbol histograms and their cost evaluation.

use alloc::vec;
use alloc::vec::Vec;

use super::entropy::{
    bits_entropy_refine, final_huffman_cost, get_combined_entropy_unrefined,
    get_entropy_unrefined, BitEntropy, Streaks,
};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, distance_to_prefix, length_to_code, BackwardRefs,
    PixOrCopy, NUM_DISTANCE_CODES, NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

/// Sentinel for "no single symbol describes this histogram".
pub const NON_TRIVIAL_SYM: u32 = u32::MAX;

/// Number of symbol classes (literal, red, blue, alpha, distance).
pub(crate) const NUM_SYMBOL_CLASSES: usize = 5;

/// Literal alphabet size for a given color-cache width.
#[inline]
pub(crate) fn num_literal_codes(palette_code_bits: u8) -> usize {
    NUM_LITERAL_CODES
        + NUM_LENGTH_CODES
        + if palette_code_bits > 0 {
            1 << palette_code_bits
        } else {
            0
        }
}

/// Symbol counts for one Huffman code group, plus the cached cost
/// estimates the clustering passes key on.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Green channel + length codes + color-cache codes.
    pub literal: Vec<u32>,
    /// Red channel.
    pub red: [u32; 256],
    /// Blue channel.
    pub blue: [u32; 256],
    /// Alpha channel.
    pub alpha: [u32; 256],
    /// Distance prefix codes.
    pub distance: [u32; NUM_DISTANCE_CODES],
    /// Total cached bit cost.
    pub bit_cost: u64,
    /// Cached literal-class cost (dominant-cost axis).
    pub literal_cost: u64,
    /// Cached red-class cost.
    pub red_cost: u64,
    /// Cached blue-class cost.
    pub blue_cost: u64,
    /// Whether each symbol class carries any information.
    pub is_used: [bool; NUM_SYMBOL_CLASSES],
    /// Packed `(A << 24) | (R << 16) | B` when each of alpha, red and blue
    /// holds exactly one symbol and distance is unused; [`NON_TRIVIAL_SYM`]
    /// otherwise.
    pub trivial_symbol: u32,
    /// Color-cache width the literal alphabet was sized for. Fixed at
    /// allocation; histograms with different values must not be summed.
    pub palette_code_bits: u8,
    /// Entropy bin assigned by the pre-pass.
    pub bin_id: u16,
}

impl Histogram {
    /// Create an empty histogram sized for `palette_code_bits`.
    pub fn new(palette_code_bits: u8) -> Self {
        Self {
            literal: vec![0; num_literal_codes(palette_code_bits)],
            red: [0; 256],
            blue: [0; 256],
            alpha: [0; 256],
            distance: [0; NUM_DISTANCE_CODES],
            bit_cost: 0,
            literal_cost: 0,
            red_cost: 0,
            blue_cost: 0,
            is_used: [false; NUM_SYMBOL_CLASSES],
            trivial_symbol: 0,
            palette_code_bits,
            bin_id: 0,
        }
    }

    /// Reset all counts and cached costs.
    pub fn clear(&mut self) {
        self.literal.fill(0);
        self.red.fill(0);
        self.blue.fill(0);
        self.alpha.fill(0);
        self.distance.fill(0);
        self.bit_cost = 0;
        self.literal_cost = 0;
        self.red_cost = 0;
        self.blue_cost = 0;
        self.is_used = [false; NUM_SYMBOL_CLASSES];
        self.trivial_symbol = 0;
        self.bin_id = 0;
    }

    /// Account one backward-reference symbol.
    #[inline]
    pub fn add_symbol(&mut self, v: &PixOrCopy) {
        match *v {
            PixOrCopy::Literal(argb) => {
                self.alpha[argb_alpha(argb) as usize] += 1;
                self.red[argb_red(argb) as usize] += 1;
                self.literal[argb_green(argb) as usize] += 1;
                self.blue[argb_blue(argb) as usize] += 1;
            }
            PixOrCopy::CacheIdx(idx) => {
                debug_assert!(self.palette_code_bits > 0);
                self.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize] += 1;
            }
            PixOrCopy::Copy { len, dist } => {
                let (code, _) = length_to_code(len);
                self.literal[NUM_LITERAL_CODES + usize::from(code)] += 1;
                let (code, _) = distance_to_prefix(dist);
                self.distance[usize::from(code)] += 1;
            }
        }
    }

    /// Account a whole backward-reference stream.
    pub fn store_refs(&mut self, refs: &BackwardRefs) {
        for token in refs.iter() {
            self.add_symbol(token);
        }
    }

    /// Counts of one symbol class, indexed as literal, red, blue, alpha,
    /// distance.
    #[inline]
    pub(crate) fn class_counts(&self, index: usize) -> &[u32] {
        match index {
            0 => &self.literal,
            1 => &self.red,
            2 => &self.blue,
            3 => &self.alpha,
            _ => &self.distance,
        }
    }

    /// `self += other`, merging the trivial symbol: the sum keeps a single
    /// value only if both parents agree.
    pub fn accumulate(&mut self, other: &Histogram) {
        debug_assert_eq!(self.palette_code_bits, other.palette_code_bits);
        for (a, b) in self.literal.iter_mut().zip(other.literal.iter()) {
            *a += b;
        }
        for (a, b) in self.red.iter_mut().zip(other.red.iter()) {
            *a += b;
        }
        for (a, b) in self.blue.iter_mut().zip(other.blue.iter()) {
            *a += b;
        }
        for (a, b) in self.alpha.iter_mut().zip(other.alpha.iter()) {
            *a += b;
        }
        for (a, b) in self.distance.iter_mut().zip(other.distance.iter()) {
            *a += b;
        }
        self.trivial_symbol = if self.trivial_symbol == other.trivial_symbol {
            self.trivial_symbol
        } else {
            NON_TRIVIAL_SYM
        };
        for i in 0..NUM_SYMBOL_CLASSES {
            self.is_used[i] |= other.is_used[i];
        }
    }

    /// Recompute every cached cost, the per-class `is_used` flags and the
    /// trivial symbol from the raw counts.
    pub fn update_cost(&mut self) {
        let mut alpha_sym = 0;
        let mut red_sym = 0;
        let mut blue_sym = 0;
        let (alpha_cost, used) = population_cost(&self.alpha, Some(&mut alpha_sym));
        self.is_used[3] = used;
        // The extra-bits cost of lengths and distances is a constant that
        // does not influence clustering decisions.
        let (distance_cost, used) = population_cost(&self.distance, None);
        self.is_used[4] = used;
        let (literal_cost, used) = population_cost(&self.literal, None);
        self.literal_cost = literal_cost;
        self.is_used[0] = used;
        let (red_cost, used) = population_cost(&self.red, Some(&mut red_sym));
        self.red_cost = red_cost;
        self.is_used[1] = used;
        let (blue_cost, used) = population_cost(&self.blue, Some(&mut blue_sym));
        self.blue_cost = blue_cost;
        self.is_used[2] = used;
        self.bit_cost = literal_cost + red_cost + blue_cost + alpha_cost + distance_cost;
        if alpha_sym == NON_TRIVIAL_SYM || red_sym == NON_TRIVIAL_SYM || blue_sym == NON_TRIVIAL_SYM
        {
            self.trivial_symbol = NON_TRIVIAL_SYM;
        } else {
            self.trivial_symbol = (alpha_sym << 24) | (red_sym << 16) | blue_sym;
        }
    }
}

/// Cost of Huffman-coding one symbol population. Fills `trivial_sym` with
/// the unique symbol when there is exactly one, [`NON_TRIVIAL_SYM`]
/// otherwise; the returned flag is whether the population carries any
/// non-zero streak at all.
pub(crate) fn population_cost(population: &[u32], trivial_sym: Option<&mut u32>) -> (u64, bool) {
    let mut be = BitEntropy::new();
    let mut st = Streaks::default();
    get_entropy_unrefined(population, &mut be, &mut st);
    if let Some(sym) = trivial_sym {
        *sym = if be.nonzeros == 1 {
            be.nonzero_code
        } else {
            NON_TRIVIAL_SYM
        };
    }
    let is_used = st.streaks[1][0] != 0 || st.streaks[1][1] != 0;
    (bits_entropy_refine(&be) + final_huffman_cost(&st), is_used)
}

/// Cost of one combined symbol class of two histograms.
///
/// `trivial_at_end` marks the palettized configuration where the only
/// non-zero value of the class sits at index 0 or the last index; only the
/// streak cost needs evaluating there.
pub(crate) fn combined_class_cost(
    a: &Histogram,
    b: &Histogram,
    index: usize,
    trivial_at_end: bool,
) -> u64 {
    let xs = a.class_counts(index);
    let ys = b.class_counts(index);
    let length = xs.len();

    if trivial_at_end {
        // A single non-zero value plus one long zero run; entropy is zero
        // for one-symbol distributions.
        let mut st = Streaks::default();
        st.streaks[1][0] = 1;
        st.counts[0] = 1;
        st.streaks[0][1] = (length - 1) as u32;
        return final_huffman_cost(&st);
    }

    let mut be = BitEntropy::new();
    let mut st = Streaks::default();
    match (a.is_used[index], b.is_used[index]) {
        (true, true) => get_combined_entropy_unrefined(xs, ys, &mut be, &mut st),
        (true, false) => get_entropy_unrefined(xs, &mut be, &mut st),
        (false, true) => get_entropy_unrefined(ys, &mut be, &mut st),
        (false, false) => {
            // All-zero population: one streak covering the whole length.
            st.counts[0] = 1;
            st.streaks[0][usize::from(length > 3)] = length as u32;
        }
    }
    bits_entropy_refine(&be) + final_huffman_cost(&st)
}

/// Cost of the union of two histograms, bailing out early (returning
/// `None`) as soon as the running partial cost reaches `cost_threshold`.
pub(crate) fn combined_histogram_cost(
    a: &Histogram,
    b: &Histogram,
    cost_threshold: i64,
) -> Option<u64> {
    debug_assert_eq!(a.palette_code_bits, b.palette_code_bits);
    if cost_threshold <= 0 {
        return None;
    }
    let cost_threshold = cost_threshold as u64;

    let mut cost = combined_class_cost(a, b, 0, false);
    if cost >= cost_threshold {
        return None;
    }

    let mut trivial_at_end = false;
    if a.trivial_symbol != NON_TRIVIAL_SYM && a.trivial_symbol == b.trivial_symbol {
        // Fully saturated alpha, red and blue channels end up at index 0 or
        // 255 of their class, the configuration palettization produces.
        let color_a = (a.trivial_symbol >> 24) & 0xff;
        let color_r = (a.trivial_symbol >> 16) & 0xff;
        let color_b = a.trivial_symbol & 0xff;
        if (color_a == 0 || color_a == 0xff)
            && (color_r == 0 || color_r == 0xff)
            && (color_b == 0 || color_b == 0xff)
        {
            trivial_at_end = true;
        }
    }

    for index in 1..NUM_SYMBOL_CLASSES {
        cost += combined_class_cost(a, b, index, index <= 3 && trivial_at_end);
        if cost >= cost_threshold {
            return None;
        }
    }
    Some(cost)
}

/// Saturating `threshold + delta` used for all cost-threshold arithmetic;
/// the `i64::MAX` sentinel survives every addition.
#[inline]
pub(crate) fn saturate_add(delta: u64, threshold: i64) -> i64 {
    let delta = i64::try_from(delta).unwrap_or(i64::MAX);
    threshold.saturating_add(delta)
}

/// A set of histogram slots. A cleared slot stays in place (`Absent`) so
/// indices remain stable; `size` shrinks only when trailing slots are
/// absent.
#[derive(Debug)]
pub struct HistogramSet {
    /// Slots; `None` marks a removed histogram.
    pub histos: Vec<Option<Histogram>>,
    /// One past the last live slot.
    pub size: usize,
}

impl HistogramSet {
    /// Allocate `size` empty histograms sized for `palette_code_bits`.
    pub fn new(size: usize, palette_code_bits: u8) -> Self {
        let mut histos = Vec::new();
        histos.resize_with(size, || Some(Histogram::new(palette_code_bits)));
        Self { histos, size }
    }

    /// Capacity of the set.
    pub fn max_size(&self) -> usize {
        self.histos.len()
    }

    /// Remove slot `i`, shrinking `size` past any trailing absent slots.
    pub(crate) fn remove(&mut self, i: usize, num_used: &mut usize) -> Histogram {
        let h = self.histos[i].take().expect("removing an absent histogram");
        *num_used -= 1;
        if i + 1 == self.size {
            while self.size >= 1 && self.histos[self.size - 1].is_none() {
                self.size -= 1;
            }
        }
        h
    }

    /// Compact live slots to the front, in order.
    pub(crate) fn remove_empty(&mut self) {
        let mut size = 0;
        for i in 0..self.size {
            if let Some(h) = self.histos[i].take() {
                self.histos[size] = Some(h);
                size += 1;
            }
        }
        self.size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(a: u8, r: u8, g: u8, b: u8) -> PixOrCopy {
        PixOrCopy::Literal(
            (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b),
        )
    }

    #[test]
    fn test_add_symbol_literal() {
        let mut h = Histogram::new(0);
        h.add_symbol(&literal(0xff, 0x11, 0x22, 0x33));
        assert_eq!(h.literal[0x22], 1);
        assert_eq!(h.red[0x11], 1);
        assert_eq!(h.blue[0x33], 1);
        assert_eq!(h.alpha[0xff], 1);
    }

    #[test]
    fn test_add_symbol_copy_and_cache() {
        let mut h = Histogram::new(4);
        h.add_symbol(&PixOrCopy::Copy { len: 5, dist: 1 });
        assert_eq!(h.literal[NUM_LITERAL_CODES + 4], 1);
        assert_eq!(h.distance[0], 1);

        h.add_symbol(&PixOrCopy::CacheIdx(7));
        assert_eq!(h.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + 7], 1);
    }

    #[test]
    fn test_literal_alphabet_size() {
        assert_eq!(num_literal_codes(0), 280);
        assert_eq!(num_literal_codes(1), 282);
        assert_eq!(num_literal_codes(8), 536);
        assert_eq!(num_literal_codes(11), 2328);
    }

    #[test]
    fn test_trivial_symbol_packing() {
        let mut h = Histogram::new(0);
        for _ in 0..10 {
            h.add_symbol(&literal(0xff, 0x80, 0x42, 0x10));
        }
        h.update_cost();
        assert_eq!(h.trivial_symbol, 0xff80_0010);
        assert!(h.is_used[0] && h.is_used[1] && h.is_used[2] && h.is_used[3]);
        assert!(!h.is_used[4]);
    }

    #[test]
    fn test_trivial_symbol_preserved_only_on_agreement() {
        let mut a = Histogram::new(0);
        a.add_symbol(&literal(0xff, 0, 42, 0));
        a.update_cost();
        let mut b = a.clone();
        b.update_cost();
        let trivial = a.trivial_symbol;
        assert_ne!(trivial, NON_TRIVIAL_SYM);

        let mut sum = a.clone();
        sum.accumulate(&b);
        assert_eq!(sum.trivial_symbol, trivial);

        let mut c = Histogram::new(0);
        c.add_symbol(&literal(0xff, 1, 42, 0));
        c.update_cost();
        let mut sum = a.clone();
        sum.accumulate(&c);
        assert_eq!(sum.trivial_symbol, NON_TRIVIAL_SYM);
    }

    #[test]
    fn test_combined_cost_bails_on_threshold() {
        let mut a = Histogram::new(0);
        let mut b = Histogram::new(0);
        for i in 0..100u32 {
            a.add_symbol(&literal(0xff, (i % 7) as u8, (i % 13) as u8, (i % 5) as u8));
            b.add_symbol(&literal(0xff, (i % 3) as u8, (i % 11) as u8, (i % 2) as u8));
        }
        a.update_cost();
        b.update_cost();
        assert!(combined_histogram_cost(&a, &b, 0).is_none());
        assert!(combined_histogram_cost(&a, &b, 1).is_none());
        let full = combined_histogram_cost(&a, &b, i64::MAX).unwrap();
        assert!(full > 0);
        // A threshold just above the real cost must not bail.
        assert_eq!(
            combined_histogram_cost(&a, &b, full as i64 + 1),
            Some(full)
        );
    }

    #[test]
    fn test_set_remove_shrinks_trailing() {
        let mut set = HistogramSet::new(4, 0);
        let mut num_used = 4;
        set.remove(3, &mut num_used);
        assert_eq!(set.size, 3);
        set.remove(1, &mut num_used);
        // interior removal leaves a hole
        assert_eq!(set.size, 3);
        set.remove(2, &mut num_used);
        assert_eq!(set.size, 1);
        assert_eq!(num_used, 1);
        set.remove_empty();
        assert_eq!(set.size, 1);
        assert!(set.histos[0].is_some());
    }
}
