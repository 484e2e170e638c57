//! Intra prediction kernels used by frame reconstruction.
//!
//! Every predictor writes a `size`x`size` block at `buf[off..]` with row
//! stride `bps`, reading its top row at `off - bps`, its left column at
//! `off - 1` and the top-left corner at `off - bps - 1`. Callers own the
//! bordered scratch and guarantee those positions exist; the 4x4 diagonal
//! modes additionally read four top-right samples at `off - bps + 4`.

#[inline(always)]
fn avg2(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b) + 1) >> 1) as u8
}

#[inline(always)]
fn avg3(a: u8, b: u8, c: u8) -> u8 {
    ((u16::from(a) + 2 * u16::from(b) + u16::from(c) + 2) >> 2) as u8
}

#[inline(always)]
fn clip_8b(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Vertical prediction: propagate the top row downwards.
pub fn pred_v(buf: &mut [u8], off: usize, bps: usize, size: usize) {
    for y in 0..size {
        buf.copy_within(off - bps..off - bps + size, off + y * bps);
    }
}

/// Horizontal prediction: propagate the left column rightwards.
pub fn pred_h(buf: &mut [u8], off: usize, bps: usize, size: usize) {
    for y in 0..size {
        let left = buf[off + y * bps - 1];
        buf[off + y * bps..off + y * bps + size].fill(left);
    }
}

/// TrueMotion prediction: `left + top - top_left` per sample, clipped.
pub fn pred_tm(buf: &mut [u8], off: usize, bps: usize, size: usize) {
    let top_left = i32::from(buf[off - bps - 1]);
    for y in 0..size {
        let left = i32::from(buf[off + y * bps - 1]);
        for x in 0..size {
            let top = i32::from(buf[off - bps + x]);
            buf[off + y * bps + x] = clip_8b(left + top - top_left);
        }
    }
}

/// DC prediction with the four boundary specialisations: average of
/// whichever of the top row / left column exist, or 0x80 when neither does.
pub fn pred_dc(buf: &mut [u8], off: usize, bps: usize, size: usize, top: bool, left: bool) {
    let dc = if top || left {
        let mut sum = 0u32;
        let mut count = 0u32;
        if top {
            for x in 0..size {
                sum += u32::from(buf[off - bps + x]);
            }
            count += size as u32;
        }
        if left {
            for y in 0..size {
                sum += u32::from(buf[off + y * bps - 1]);
            }
            count += size as u32;
        }
        ((sum + count / 2) / count) as u8
    } else {
        0x80
    };
    for y in 0..size {
        buf[off + y * bps..off + y * bps + size].fill(dc);
    }
}

// ---------------------------------------------------------------------------
// 4x4 sub-block modes. Border legend matches the usual VP8 naming:
// X = top-left, A..H = top row and top-right, I..L = left column.

fn top_samples(buf: &[u8], off: usize, bps: usize) -> [u8; 8] {
    let mut t = [0u8; 8];
    t.copy_from_slice(&buf[off - bps..off - bps + 8]);
    t
}

fn left_samples(buf: &[u8], off: usize, bps: usize) -> [u8; 4] {
    [
        buf[off - 1],
        buf[off + bps - 1],
        buf[off + 2 * bps - 1],
        buf[off + 3 * bps - 1],
    ]
}

/// DC mode for a 4x4 sub-block. Both borders always exist for sub-blocks
/// (the scratch is primed with 127/129 sentinels at the frame edge).
pub fn pred_b_dc(buf: &mut [u8], off: usize, bps: usize) {
    let mut dc = 4u32;
    for i in 0..4 {
        dc += u32::from(buf[off - bps + i]) + u32::from(buf[off + i * bps - 1]);
    }
    let dc = (dc >> 3) as u8;
    for y in 0..4 {
        buf[off + y * bps..off + y * bps + 4].fill(dc);
    }
}

/// TrueMotion mode for a 4x4 sub-block.
pub fn pred_b_tm(buf: &mut [u8], off: usize, bps: usize) {
    pred_tm(buf, off, bps, 4);
}

/// Vertical mode, smoothed with the top-left and top-right neighbours.
pub fn pred_b_ve(buf: &mut [u8], off: usize, bps: usize) {
    let x = buf[off - bps - 1];
    let t = top_samples(buf, off, bps);
    let vals = [
        avg3(x, t[0], t[1]),
        avg3(t[0], t[1], t[2]),
        avg3(t[1], t[2], t[3]),
        avg3(t[2], t[3], t[4]),
    ];
    for y in 0..4 {
        buf[off + y * bps..off + y * bps + 4].copy_from_slice(&vals);
    }
}

/// Horizontal mode, smoothed along the left column.
pub fn pred_b_he(buf: &mut [u8], off: usize, bps: usize) {
    let x = buf[off - bps - 1];
    let [i, j, k, l] = left_samples(buf, off, bps);
    let rows = [avg3(x, i, j), avg3(i, j, k), avg3(j, k, l), avg3(k, l, l)];
    for (y, &v) in rows.iter().enumerate() {
        buf[off + y * bps..off + y * bps + 4].fill(v);
    }
}

/// Down-left diagonal mode.
pub fn pred_b_ld(buf: &mut [u8], off: usize, bps: usize) {
    let t = top_samples(buf, off, bps);
    let mut dst = |x: usize, y: usize, v: u8| buf[off + x + y * bps] = v;
    let d = |a: usize, b: usize, c: usize| avg3(t[a], t[b], t[c]);

    dst(0, 0, d(0, 1, 2));
    let v = d(1, 2, 3);
    dst(1, 0, v);
    dst(0, 1, v);
    let v = d(2, 3, 4);
    dst(2, 0, v);
    dst(1, 1, v);
    dst(0, 2, v);
    let v = d(3, 4, 5);
    dst(3, 0, v);
    dst(2, 1, v);
    dst(1, 2, v);
    dst(0, 3, v);
    let v = d(4, 5, 6);
    dst(3, 1, v);
    dst(2, 2, v);
    dst(1, 3, v);
    let v = d(5, 6, 7);
    dst(3, 2, v);
    dst(2, 3, v);
    dst(3, 3, avg3(t[6], t[7], t[7]));
}

/// Down-right diagonal mode.
pub fn pred_b_rd(buf: &mut [u8], off: usize, bps: usize) {
    let x = buf[off - bps - 1];
    let t = top_samples(buf, off, bps);
    let [i, j, k, l] = left_samples(buf, off, bps);
    let mut dst = |px: usize, py: usize, v: u8| buf[off + px + py * bps] = v;

    dst(0, 3, avg3(j, k, l));
    let v = avg3(i, j, k);
    dst(1, 3, v);
    dst(0, 2, v);
    let v = avg3(x, i, j);
    dst(2, 3, v);
    dst(1, 2, v);
    dst(0, 1, v);
    let v = avg3(t[0], x, i);
    dst(3, 3, v);
    dst(2, 2, v);
    dst(1, 1, v);
    dst(0, 0, v);
    let v = avg3(t[1], t[0], x);
    dst(3, 2, v);
    dst(2, 1, v);
    dst(1, 0, v);
    let v = avg3(t[2], t[1], t[0]);
    dst(3, 1, v);
    dst(2, 0, v);
    dst(3, 0, avg3(t[3], t[2], t[1]));
}

/// Vertical-right diagonal mode.
pub fn pred_b_vr(buf: &mut [u8], off: usize, bps: usize) {
    let x = buf[off - bps - 1];
    let t = top_samples(buf, off, bps);
    let [i, j, k, _] = left_samples(buf, off, bps);
    let mut dst = |px: usize, py: usize, v: u8| buf[off + px + py * bps] = v;

    let v = avg2(x, t[0]);
    dst(0, 0, v);
    dst(1, 2, v);
    let v = avg2(t[0], t[1]);
    dst(1, 0, v);
    dst(2, 2, v);
    let v = avg2(t[1], t[2]);
    dst(2, 0, v);
    dst(3, 2, v);
    dst(3, 0, avg2(t[2], t[3]));
    dst(0, 3, avg3(k, j, i));
    dst(0, 2, avg3(j, i, x));
    let v = avg3(i, x, t[0]);
    dst(0, 1, v);
    dst(1, 3, v);
    let v = avg3(x, t[0], t[1]);
    dst(1, 1, v);
    dst(2, 3, v);
    let v = avg3(t[0], t[1], t[2]);
    dst(2, 1, v);
    dst(3, 3, v);
    dst(3, 1, avg3(t[1], t[2], t[3]));
}

/// Vertical-left diagonal mode.
pub fn pred_b_vl(buf: &mut [u8], off: usize, bps: usize) {
    let t = top_samples(buf, off, bps);
    let mut dst = |px: usize, py: usize, v: u8| buf[off + px + py * bps] = v;

    dst(0, 0, avg2(t[0], t[1]));
    let v = avg2(t[1], t[2]);
    dst(1, 0, v);
    dst(0, 2, v);
    let v = avg2(t[2], t[3]);
    dst(2, 0, v);
    dst(1, 2, v);
    let v = avg2(t[3], t[4]);
    dst(3, 0, v);
    dst(2, 2, v);
    dst(0, 1, avg3(t[0], t[1], t[2]));
    let v = avg3(t[1], t[2], t[3]);
    dst(1, 1, v);
    dst(0, 3, v);
    let v = avg3(t[2], t[3], t[4]);
    dst(2, 1, v);
    dst(1, 3, v);
    let v = avg3(t[3], t[4], t[5]);
    dst(3, 1, v);
    dst(2, 3, v);
    dst(3, 2, avg3(t[4], t[5], t[6]));
    dst(3, 3, avg3(t[5], t[6], t[7]));
}

/// Horizontal-down diagonal mode.
pub fn pred_b_hd(buf: &mut [u8], off: usize, bps: usize) {
    let x = buf[off - bps - 1];
    let t = top_samples(buf, off, bps);
    let [i, j, k, l] = left_samples(buf, off, bps);
    let mut dst = |px: usize, py: usize, v: u8| buf[off + px + py * bps] = v;

    let v = avg2(i, x);
    dst(0, 0, v);
    dst(2, 1, v);
    let v = avg2(j, i);
    dst(0, 1, v);
    dst(2, 2, v);
    let v = avg2(k, j);
    dst(0, 2, v);
    dst(2, 3, v);
    dst(0, 3, avg2(l, k));
    dst(3, 0, avg3(t[0], t[1], t[2]));
    dst(2, 0, avg3(x, t[0], t[1]));
    let v = avg3(i, x, t[0]);
    dst(1, 0, v);
    dst(3, 1, v);
    let v = avg3(x, i, j);
    dst(1, 1, v);
    dst(3, 2, v);
    let v = avg3(i, j, k);
    dst(1, 2, v);
    dst(3, 3, v);
    dst(1, 3, avg3(j, k, l));
}

/// Horizontal-up diagonal mode.
pub fn pred_b_hu(buf: &mut [u8], off: usize, bps: usize) {
    let [i, j, k, l] = left_samples(buf, off, bps);
    let mut dst = |px: usize, py: usize, v: u8| buf[off + px + py * bps] = v;

    dst(0, 0, avg2(i, j));
    let v = avg2(j, k);
    dst(2, 0, v);
    dst(0, 1, v);
    let v = avg2(k, l);
    dst(2, 1, v);
    dst(0, 2, v);
    dst(1, 0, avg3(i, j, k));
    let v = avg3(j, k, l);
    dst(3, 0, v);
    dst(1, 1, v);
    let v = avg3(k, l, l);
    dst(3, 1, v);
    dst(1, 2, v);
    dst(3, 2, l);
    dst(2, 2, l);
    dst(0, 3, l);
    dst(1, 3, l);
    dst(2, 3, l);
    dst(3, 3, l);
}

#[cfg(test)]
mod tests {
    use super::*;

    const BPS: usize = 32;
    const OFF: usize = BPS + 1;

    fn scratch() -> alloc::vec::Vec<u8> {
        let mut buf = alloc::vec![0u8; BPS * 20];
        // top row
        for x in 0..20 {
            buf[OFF - BPS - 1 + x] = 100 + x as u8;
        }
        // left column
        for y in 0..16 {
            buf[OFF + y * BPS - 1] = 50 + y as u8;
        }
        buf
    }

    #[test]
    fn test_vertical_copies_top_row() {
        let mut buf = scratch();
        pred_v(&mut buf, OFF, BPS, 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(buf[OFF + y * BPS + x], 101 + x as u8);
            }
        }
    }

    #[test]
    fn test_horizontal_copies_left_column() {
        let mut buf = scratch();
        pred_h(&mut buf, OFF, BPS, 8);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(buf[OFF + y * BPS + x], 50 + y as u8);
            }
        }
    }

    #[test]
    fn test_dc_without_borders_is_mid_gray() {
        let mut buf = scratch();
        pred_dc(&mut buf, OFF, BPS, 16, false, false);
        assert_eq!(buf[OFF], 0x80);
        assert_eq!(buf[OFF + 15 * BPS + 15], 0x80);
    }

    #[test]
    fn test_dc_top_only_averages_top() {
        let mut buf = scratch();
        for x in 0..4 {
            buf[OFF - BPS + x] = 10;
        }
        pred_dc(&mut buf, OFF, BPS, 4, true, false);
        assert_eq!(buf[OFF], 10);
    }

    #[test]
    fn test_tm_flat_borders_give_flat_block() {
        let mut buf = scratch();
        for x in 0..5 {
            buf[OFF - BPS - 1 + x] = 90;
        }
        for y in 0..4 {
            buf[OFF + y * BPS - 1] = 90;
        }
        pred_tm(&mut buf, OFF, BPS, 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(buf[OFF + y * BPS + x], 90);
            }
        }
    }

    #[test]
    fn test_b_dc_averages_both_borders() {
        let mut buf = scratch();
        for x in 0..4 {
            buf[OFF - BPS + x] = 8;
        }
        for y in 0..4 {
            buf[OFF + y * BPS - 1] = 16;
        }
        pred_b_dc(&mut buf, OFF, BPS);
        // (4*8 + 4*16 + 4) >> 3 = 12
        assert_eq!(buf[OFF], 12);
    }

    #[test]
    fn test_b_hu_bottom_right_is_last_left() {
        let mut buf = scratch();
        pred_b_hu(&mut buf, OFF, BPS);
        let l = buf[OFF + 3 * BPS - 1];
        assert_eq!(buf[OFF + 3 * BPS + 3], l);
        assert_eq!(buf[OFF + 2 * BPS + 3], l);
    }
}
