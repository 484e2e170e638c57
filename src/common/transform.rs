/// 16 bit fixed point version of cos(PI/8) * sqrt(2) - 1
const CONST1: i64 = 20091;
/// 16 bit fixed point version of sin(PI/8) * sqrt(2)
const CONST2: i64 = 35468;

#[inline(always)]
fn mul1(a: i64) -> i64 {
    ((a * CONST1) >> 16) + a
}

#[inline(always)]
fn mul2(a: i64) -> i64 {
    (a * CONST2) >> 16
}

#[inline(always)]
fn clip_8b(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline(always)]
fn store(buf: &mut [u8], off: usize, x: usize, y: usize, bps: usize, v: i64) {
    let p = &mut buf[off + x + y * bps];
    *p = clip_8b(i64::from(*p) + (v >> 3));
}

/// Full 4x4 inverse DCT of `coeffs`, added onto the prediction already in
/// `buf` at `off` with row stride `bps`.
pub fn transform_one(coeffs: &[i16], buf: &mut [u8], off: usize, bps: usize) {
    // The intermediate results may overflow the types, so we stretch the type.
    fn fetch(coeffs: &[i16], idx: usize) -> i64 {
        i64::from(coeffs[idx])
    }

    debug_assert!(coeffs.len() >= 16);

    let mut tmp = [0i64; 16];
    for i in 0..4 {
        // vertical pass
        let a = fetch(coeffs, i) + fetch(coeffs, 8 + i);
        let b = fetch(coeffs, i) - fetch(coeffs, 8 + i);
        let c = mul2(fetch(coeffs, 4 + i)) - mul1(fetch(coeffs, 12 + i));
        let d = mul1(fetch(coeffs, 4 + i)) + mul2(fetch(coeffs, 12 + i));
        tmp[4 * i] = a + d;
        tmp[4 * i + 1] = b + c;
        tmp[4 * i + 2] = b - c;
        tmp[4 * i + 3] = a - d;
    }
    for i in 0..4 {
        // horizontal pass
        let dc = tmp[i] + 4;
        let a = dc + tmp[8 + i];
        let b = dc - tmp[8 + i];
        let c = mul2(tmp[4 + i]) - mul1(tmp[12 + i]);
        let d = mul1(tmp[4 + i]) + mul2(tmp[12 + i]);
        store(buf, off, 0, i, bps, a + d);
        store(buf, off, 1, i, bps, b + c);
        store(buf, off, 2, i, bps, b - c);
        store(buf, off, 3, i, bps, a - d);
    }
}

/// Sparse inverse transform for blocks whose only non-zero coefficients are
/// positions 0, 1 and 4. Cheaper than [`transform_one`] and exact for that
/// coefficient pattern.
pub fn transform_ac3(coeffs: &[i16], buf: &mut [u8], off: usize, bps: usize) {
    let a = i64::from(coeffs[0]) + 4;
    let c4 = mul2(i64::from(coeffs[4]));
    let d4 = mul1(i64::from(coeffs[4]));
    let c1 = mul2(i64::from(coeffs[1]));
    let d1 = mul1(i64::from(coeffs[1]));

    let mut store2 = |y: usize, dc: i64| {
        store(buf, off, 0, y, bps, dc + d1);
        store(buf, off, 1, y, bps, dc + c1);
        store(buf, off, 2, y, bps, dc - c1);
        store(buf, off, 3, y, bps, dc - d1);
    };
    store2(0, a + d4);
    store2(1, a + c4);
    store2(2, a - c4);
    store2(3, a - d4);
}

/// DC-only inverse transform: adds `(DC + 4) >> 3` to all 16 samples.
pub fn transform_dc(coeffs: &[i16], buf: &mut [u8], off: usize, bps: usize) {
    let dc = i64::from(coeffs[0]) + 4;
    for y in 0..4 {
        for x in 0..4 {
            store(buf, off, x, y, bps, dc);
        }
    }
}

// Sub-block offsets within an 8x8 chroma block, in coefficient order.
fn uv_block_off(n: usize, bps: usize) -> usize {
    (n & 1) * 4 + (n >> 1) * 4 * bps
}

/// Full inverse transform of the four 4x4 sub-blocks of one chroma plane.
/// `coeffs` holds the four blocks back to back (64 values).
pub fn transform_uv(coeffs: &[i16], buf: &mut [u8], off: usize, bps: usize) {
    for n in 0..4 {
        transform_one(&coeffs[n * 16..], buf, off + uv_block_off(n, bps), bps);
    }
}

/// DC-only variant of [`transform_uv`], used when no AC coefficient is set.
pub fn transform_dc_uv(coeffs: &[i16], buf: &mut [u8], off: usize, bps: usize) {
    for n in 0..4 {
        if coeffs[n * 16] != 0 {
            transform_dc(&coeffs[n * 16..], buf, off + uv_block_off(n, bps), bps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BPS: usize = 32;

    fn flat_block(value: u8) -> alloc::vec::Vec<u8> {
        alloc::vec![value; BPS * 8]
    }

    #[test]
    fn test_dc_only_matches_full() {
        let mut coeffs = [0i16; 16];
        coeffs[0] = 64;

        let mut a = flat_block(100);
        let mut b = flat_block(100);
        transform_one(&coeffs, &mut a, 0, BPS);
        transform_dc(&coeffs, &mut b, 0, BPS);

        for y in 0..4 {
            assert_eq!(a[y * BPS..y * BPS + 4], b[y * BPS..y * BPS + 4]);
        }
        // (64 + 4) >> 3 = 8 added everywhere
        assert_eq!(a[0], 108);
    }

    #[test]
    fn test_ac3_matches_full() {
        let mut coeffs = [0i16; 16];
        coeffs[0] = 37;
        coeffs[1] = -21;
        coeffs[4] = 80;

        let mut a = flat_block(128);
        let mut b = flat_block(128);
        transform_one(&coeffs, &mut a, 0, BPS);
        transform_ac3(&coeffs, &mut b, 0, BPS);

        for y in 0..4 {
            assert_eq!(a[y * BPS..y * BPS + 4], b[y * BPS..y * BPS + 4]);
        }
    }

    #[test]
    fn test_extreme_coefficients_do_not_overflow() {
        // Saturated columns drive the vertical-pass intermediates past the
        // i32 range once multiplied by the transform constants; the wide
        // arithmetic must absorb them and clip at the samples.
        let mut coeffs = [0i16; 16];
        for i in 0..4 {
            coeffs[i] = i16::MAX;
            coeffs[4 + i] = i16::MAX;
            coeffs[8 + i] = i16::MIN;
            coeffs[12 + i] = i16::MIN;
        }
        let mut buf = flat_block(128);
        transform_one(&coeffs, &mut buf, 0, BPS);
        // All outputs are valid samples by construction of clip_8b; the
        // call itself completing without wrapping is the property.
        let mut coeffs = [0i16; 16];
        coeffs[0] = i16::MIN;
        coeffs[1] = i16::MAX;
        coeffs[4] = i16::MIN;
        let mut buf = flat_block(0);
        transform_ac3(&coeffs, &mut buf, 0, BPS);
    }

    #[test]
    fn test_uv_dc_skips_empty_blocks() {
        let mut coeffs = [0i16; 64];
        coeffs[0] = 32; // only sub-block 0 has a DC
        let mut buf = flat_block(50);
        transform_dc_uv(&coeffs, &mut buf, 0, BPS);
        assert_eq!(buf[0], 54);
        // sub-block 1 untouched
        assert_eq!(buf[4], 50);
    }
}
