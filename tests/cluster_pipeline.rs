//! End-to-end tests of the histogram clustering pipeline.
//!
//! All inputs are deterministic synthetic backward-reference streams.

use zenwebp_core::{
    get_histo_image_symbols, BackwardRefs, ClusterConfig, EncodeError, HistogramSet, PixOrCopy,
    Unstoppable,
};

fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// One literal token per pixel, colored by a position-dependent function.
fn literal_image(w: usize, h: usize, color: impl Fn(usize, usize) -> u32) -> BackwardRefs {
    let mut refs = BackwardRefs::new();
    for y in 0..h {
        for x in 0..w {
            refs.push(PixOrCopy::Literal(color(x, y)));
        }
    }
    refs
}

fn run(
    w: usize,
    h: usize,
    refs: &BackwardRefs,
    config: &ClusterConfig,
) -> (HistogramSet, Vec<u32>) {
    let tiles_x = (w + (1 << config.histogram_bits) - 1) >> config.histogram_bits;
    let tiles_y = (h + (1 << config.histogram_bits) - 1) >> config.histogram_bits;
    let tiles = tiles_x * tiles_y;
    let mut image_histo = HistogramSet::new(tiles, config.cache_bits);
    let mut symbols = vec![0u32; tiles];
    get_histo_image_symbols(
        w,
        h,
        refs,
        config,
        &mut image_histo,
        &mut symbols,
        &Unstoppable,
        &mut |_| true,
    )
    .expect("clustering failed");
    (image_histo, symbols)
}

#[test]
fn test_identical_tiles_collapse_to_one_cluster() {
    // 100 tiles of 8x8 pixels with identical per-tile content.
    let refs = literal_image(80, 80, |x, y| {
        argb(0xff, (x % 8) as u8, (y % 8) as u8, ((x + y) % 8) as u8)
    });
    let config = ClusterConfig {
        quality: 75,
        histogram_bits: 3,
        ..Default::default()
    };
    let (histo, symbols) = run(80, 80, &refs, &config);

    assert_eq!(histo.size, 1);
    assert!(symbols.iter().all(|&s| s == 0));

    // The final cluster reproduces the summed tile counts exactly.
    let h = histo.histos[0].as_ref().unwrap();
    let total: u64 = h.literal.iter().map(|&c| u64::from(c)).sum();
    assert_eq!(total, 80 * 80);
    // Greens 0..8 each cover one column band of every tile.
    for g in 0..8 {
        assert_eq!(h.literal[g], 800);
    }
}

#[test]
fn test_identical_tiles_collapse_under_low_effort() {
    let refs = literal_image(80, 80, |x, _| argb(0xff, 10, (x % 4) as u8, 3));
    let config = ClusterConfig {
        quality: 40,
        low_effort: true,
        histogram_bits: 3,
        ..Default::default()
    };
    let (histo, symbols) = run(80, 80, &refs, &config);
    assert_eq!(histo.size, 1);
    assert!(symbols.iter().all(|&s| s == 0));
}

#[test]
fn test_single_symbol_tiles_keep_trivial_symbol() {
    // Every pixel is (A=0, R=0, G=42, B=0): each channel class holds one
    // symbol, so every merge must preserve the packed trivial value.
    let refs = literal_image(64, 64, |_, _| argb(0, 0, 42, 0));
    let config = ClusterConfig {
        quality: 75,
        histogram_bits: 3,
        ..Default::default()
    };
    let (histo, _symbols) = run(64, 64, &refs, &config);
    for k in 0..histo.size {
        let h = histo.histos[k].as_ref().unwrap();
        assert_ne!(h.trivial_symbol, zenwebp_core::encoder::vp8l::NON_TRIVIAL_SYM);
    }
}

#[test]
fn test_symbols_are_valid_cluster_indices() {
    // Deterministic noise, mixing literals, copies and cache indices.
    let mut refs = BackwardRefs::new();
    let mut seed = 7u64;
    let mut rand = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (seed >> 33) as u32
    };
    let total_pixels = 96 * 96;
    let mut covered = 0usize;
    while covered < total_pixels {
        match rand() % 4 {
            0 => {
                let len = 1 + (rand() % 20) as u16;
                let len = (u32::from(len).min((total_pixels - covered) as u32)) as u16;
                refs.push(PixOrCopy::Copy {
                    len,
                    dist: 1 + rand() % 500,
                });
                covered += usize::from(len);
            }
            1 => {
                refs.push(PixOrCopy::CacheIdx((rand() % 16) as u16));
                covered += 1;
            }
            _ => {
                refs.push(PixOrCopy::Literal(rand()));
                covered += 1;
            }
        }
    }
    let config = ClusterConfig {
        quality: 50,
        histogram_bits: 4,
        cache_bits: 4,
        ..Default::default()
    };
    let (histo, symbols) = run(96, 96, &refs, &config);

    assert!(histo.size >= 1);
    for &s in &symbols {
        assert!((s as usize) < histo.size, "symbol {s} out of range");
        assert!(histo.histos[s as usize].is_some());
    }

    // Clustering redistributes but never invents or loses symbols: the
    // final clusters hold exactly the tokens of the stream.
    let mut cluster_literals = 0u64;
    let mut cluster_distances = 0u64;
    for k in 0..histo.size {
        let h = histo.histos[k].as_ref().unwrap();
        cluster_literals += h.literal.iter().map(|&c| u64::from(c)).sum::<u64>();
        cluster_distances += h.distance.iter().map(|&c| u64::from(c)).sum::<u64>();
    }
    let tokens = refs.tokens.len() as u64;
    let copies = refs
        .tokens
        .iter()
        .filter(|t| matches!(t, PixOrCopy::Copy { .. }))
        .count() as u64;
    assert_eq!(cluster_literals, tokens);
    assert_eq!(cluster_distances, copies);
}

#[test]
fn test_clustering_reduces_total_cost() {
    let refs = literal_image(80, 80, |x, y| {
        argb(0xff, (x % 8) as u8, (y % 8) as u8, ((x * y) % 8) as u8)
    });
    let config = ClusterConfig {
        quality: 75,
        histogram_bits: 3,
        ..Default::default()
    };

    // Initial cost: one histogram per tile.
    let tiles = 100;
    let mut initial = 0u64;
    for ty in 0..10 {
        for tx in 0..10 {
            let mut h = zenwebp_core::Histogram::new(0);
            for y in (ty * 8)..(ty * 8 + 8) {
                for x in (tx * 8)..(tx * 8 + 8) {
                    h.add_symbol(&PixOrCopy::Literal(argb(
                        0xff,
                        (x % 8) as u8,
                        (y % 8) as u8,
                        ((x * y) % 8) as u8,
                    )));
                }
            }
            h.update_cost();
            initial += h.bit_cost;
        }
    }

    let (histo, symbols) = run(80, 80, &refs, &config);
    assert_eq!(symbols.len(), tiles);
    let mut final_cost = 0u64;
    for k in 0..histo.size {
        let mut h = histo.histos[k].as_ref().unwrap().clone();
        h.update_cost();
        final_cost += h.bit_cost;
    }
    assert!(
        final_cost <= initial,
        "clustering increased the estimated cost: {final_cost} > {initial}"
    );
}

#[test]
fn test_progress_abort_surfaces_as_user_abort() {
    let refs = literal_image(32, 32, |x, _| argb(0xff, x as u8, 0, 0));
    let config = ClusterConfig {
        histogram_bits: 3,
        ..Default::default()
    };
    let mut image_histo = HistogramSet::new(16, 0);
    let mut symbols = vec![0u32; 16];
    let err = get_histo_image_symbols(
        32,
        32,
        &refs,
        &config,
        &mut image_histo,
        &mut symbols,
        &Unstoppable,
        &mut |_| false,
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::UserAbort));
}

#[test]
fn test_mismatched_buffers_are_rejected() {
    let refs = literal_image(32, 32, |_, _| argb(0xff, 0, 0, 0));
    let config = ClusterConfig {
        histogram_bits: 3,
        ..Default::default()
    };
    let mut image_histo = HistogramSet::new(5, 0); // needs 16 tiles
    let mut symbols = vec![0u32; 16];
    let err = get_histo_image_symbols(
        32,
        32,
        &refs,
        &config,
        &mut image_histo,
        &mut symbols,
        &Unstoppable,
        &mut |_| true,
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::InvalidConfig(_)));
}
