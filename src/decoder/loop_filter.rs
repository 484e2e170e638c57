//! In-loop deblocking filter.
//!
//! The primitives walk an edge one sample line at a time: `hstride` steps
//! across the edge (1 for vertical edges, the row stride for horizontal
//! ones) and `vstride` steps along it. Up to four samples are read on each
//! side; the simple filter writes one per side, the complex filter up to
//! three.

use super::types::{FilterInfo, FilterType};

#[inline(always)]
fn sclip1(v: i32) -> i32 {
    v.clamp(-128, 127)
}

#[inline(always)]
fn sclip2(v: i32) -> i32 {
    v.clamp(-16, 15)
}

#[inline(always)]
fn clip1(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline(always)]
fn px(buf: &[u8], off: usize, delta: isize) -> i32 {
    i32::from(buf[(off as isize + delta) as usize])
}

/// 4 * |p0 - q0| + |p1 - q1| <= threshold
#[inline]
fn needs_filter(buf: &[u8], off: usize, step: isize, t: i32) -> bool {
    let p1 = px(buf, off, -2 * step);
    let p0 = px(buf, off, -step);
    let q0 = px(buf, off, 0);
    let q1 = px(buf, off, step);
    4 * (p0 - q0).abs() + (p1 - q1).abs() <= t
}

#[inline]
fn needs_filter2(buf: &[u8], off: usize, step: isize, t: i32, it: i32) -> bool {
    let p3 = px(buf, off, -4 * step);
    let p2 = px(buf, off, -3 * step);
    let p1 = px(buf, off, -2 * step);
    let p0 = px(buf, off, -step);
    let q0 = px(buf, off, 0);
    let q1 = px(buf, off, step);
    let q2 = px(buf, off, 2 * step);
    let q3 = px(buf, off, 3 * step);
    if 4 * (p0 - q0).abs() + (p1 - q1).abs() > t {
        return false;
    }
    (p3 - p2).abs() <= it
        && (p2 - p1).abs() <= it
        && (p1 - p0).abs() <= it
        && (q3 - q2).abs() <= it
        && (q2 - q1).abs() <= it
        && (q1 - q0).abs() <= it
}

/// High edge variance: |p1 - p0| > t or |q1 - q0| > t.
#[inline]
fn hev(buf: &[u8], off: usize, step: isize, t: i32) -> bool {
    let p1 = px(buf, off, -2 * step);
    let p0 = px(buf, off, -step);
    let q0 = px(buf, off, 0);
    let q1 = px(buf, off, step);
    (p1 - p0).abs() > t || (q1 - q0).abs() > t
}

/// Adjust p0 and q0 only.
#[inline]
fn do_filter2(buf: &mut [u8], off: usize, step: isize) {
    let p1 = px(buf, off, -2 * step);
    let p0 = px(buf, off, -step);
    let q0 = px(buf, off, 0);
    let q1 = px(buf, off, step);
    let a = 3 * (q0 - p0) + sclip1(p1 - q1);
    let a1 = sclip2((a + 4) >> 3);
    let a2 = sclip2((a + 3) >> 3);
    buf[(off as isize - step) as usize] = clip1(p0 + a2);
    buf[off] = clip1(q0 - a1);
}

/// Adjust p1..q1 without relying on p1/q1 deltas (high-variance edges keep
/// their detail through [`do_filter2`] instead).
#[inline]
fn do_filter4(buf: &mut [u8], off: usize, step: isize) {
    let p1 = px(buf, off, -2 * step);
    let p0 = px(buf, off, -step);
    let q0 = px(buf, off, 0);
    let q1 = px(buf, off, step);
    let a = 3 * (q0 - p0);
    let a1 = sclip2((a + 4) >> 3);
    let a2 = sclip2((a + 3) >> 3);
    let a3 = (a1 + 1) >> 1;
    buf[(off as isize - 2 * step) as usize] = clip1(p1 + a3);
    buf[(off as isize - step) as usize] = clip1(p0 + a2);
    buf[off] = clip1(q0 - a1);
    buf[(off as isize + step) as usize] = clip1(q1 - a3);
}

/// Strong 6-tap adjustment of p2..q2, used on macroblock edges.
#[inline]
fn do_filter6(buf: &mut [u8], off: usize, step: isize) {
    let p2 = px(buf, off, -3 * step);
    let p1 = px(buf, off, -2 * step);
    let p0 = px(buf, off, -step);
    let q0 = px(buf, off, 0);
    let q1 = px(buf, off, step);
    let q2 = px(buf, off, 2 * step);
    let a = sclip1(3 * (q0 - p0) + sclip1(p1 - q1));
    let a1 = (27 * a + 63) >> 7;
    let a2 = (18 * a + 63) >> 7;
    let a3 = (9 * a + 63) >> 7;
    buf[(off as isize - 3 * step) as usize] = clip1(p2 + a3);
    buf[(off as isize - 2 * step) as usize] = clip1(p1 + a2);
    buf[(off as isize - step) as usize] = clip1(p0 + a1);
    buf[off] = clip1(q0 - a1);
    buf[(off as isize + step) as usize] = clip1(q1 - a2);
    buf[(off as isize + 2 * step) as usize] = clip1(q2 - a3);
}

/// Simple-filter edge: one pass of [`do_filter2`] along `size` lines.
fn simple_filter(buf: &mut [u8], mut off: usize, hstride: isize, vstride: usize, size: usize, thresh: i32) {
    let thresh2 = 2 * thresh + 1;
    for _ in 0..size {
        if needs_filter(buf, off, hstride, thresh2) {
            do_filter2(buf, off, hstride);
        }
        off += vstride;
    }
}

/// Complex filter on a macroblock edge (strong smoothing unless the edge
/// has high variance).
fn filter_loop26(
    buf: &mut [u8],
    mut off: usize,
    hstride: isize,
    vstride: usize,
    size: usize,
    thresh: i32,
    ithresh: i32,
    hev_thresh: i32,
) {
    let thresh2 = 2 * thresh + 1;
    for _ in 0..size {
        if needs_filter2(buf, off, hstride, thresh2, ithresh) {
            if hev(buf, off, hstride, hev_thresh) {
                do_filter2(buf, off, hstride);
            } else {
                do_filter6(buf, off, hstride);
            }
        }
        off += vstride;
    }
}

/// Complex filter on an interior (sub-block) edge.
fn filter_loop24(
    buf: &mut [u8],
    mut off: usize,
    hstride: isize,
    vstride: usize,
    size: usize,
    thresh: i32,
    ithresh: i32,
    hev_thresh: i32,
) {
    let thresh2 = 2 * thresh + 1;
    for _ in 0..size {
        if needs_filter2(buf, off, hstride, thresh2, ithresh) {
            if hev(buf, off, hstride, hev_thresh) {
                do_filter2(buf, off, hstride);
            } else {
                do_filter4(buf, off, hstride);
            }
        }
        off += vstride;
    }
}

/// Deblock one macroblock inside a cached row band.
///
/// `y_off`/`uv_off` point at the macroblock's top-left sample; the caller
/// guarantees the band extends far enough above for the cross-row edge
/// (`mb_y > 0` implies the seed rows are present).
#[allow(clippy::too_many_arguments)]
pub(crate) fn filter_mb(
    y: &mut [u8],
    u: &mut [u8],
    v: &mut [u8],
    y_off: usize,
    uv_off: usize,
    y_stride: usize,
    uv_stride: usize,
    mb_x: usize,
    mb_y: usize,
    filter_type: FilterType,
    info: &FilterInfo,
) {
    let limit = i32::from(info.f_limit);
    if limit == 0 {
        return;
    }
    debug_assert!(limit >= 3);
    let ilevel = i32::from(info.f_ilevel);
    let hev_t = i32::from(info.hev_thresh);
    let ys = y_stride as isize;
    let uvs = uv_stride as isize;

    match filter_type {
        FilterType::None => {}
        FilterType::Simple => {
            if mb_x > 0 {
                simple_filter(y, y_off, 1, y_stride, 16, limit + 4);
            }
            if info.f_inner {
                for k in 1..4 {
                    simple_filter(y, y_off + 4 * k, 1, y_stride, 16, limit);
                }
            }
            if mb_y > 0 {
                simple_filter(y, y_off, ys, 1, 16, limit + 4);
            }
            if info.f_inner {
                for k in 1..4 {
                    simple_filter(y, y_off + 4 * k * y_stride, ys, 1, 16, limit);
                }
            }
        }
        FilterType::Complex => {
            if mb_x > 0 {
                filter_loop26(y, y_off, 1, y_stride, 16, limit + 4, ilevel, hev_t);
                filter_loop26(u, uv_off, 1, uv_stride, 8, limit + 4, ilevel, hev_t);
                filter_loop26(v, uv_off, 1, uv_stride, 8, limit + 4, ilevel, hev_t);
            }
            if info.f_inner {
                for k in 1..4 {
                    filter_loop24(y, y_off + 4 * k, 1, y_stride, 16, limit, ilevel, hev_t);
                }
                filter_loop24(u, uv_off + 4, 1, uv_stride, 8, limit, ilevel, hev_t);
                filter_loop24(v, uv_off + 4, 1, uv_stride, 8, limit, ilevel, hev_t);
            }
            if mb_y > 0 {
                filter_loop26(y, y_off, ys, 1, 16, limit + 4, ilevel, hev_t);
                filter_loop26(u, uv_off, uvs, 1, 8, limit + 4, ilevel, hev_t);
                filter_loop26(v, uv_off, uvs, 1, 8, limit + 4, ilevel, hev_t);
            }
            if info.f_inner {
                for k in 1..4 {
                    filter_loop24(y, y_off + 4 * k * y_stride, ys, 1, 16, limit, ilevel, hev_t);
                }
                filter_loop24(u, uv_off + 4 * uv_stride, uvs, 1, 8, limit, ilevel, hev_t);
                filter_loop24(v, uv_off + 4 * uv_stride, uvs, 1, 8, limit, ilevel, hev_t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIDE: usize = 32;

    fn band(value: u8) -> alloc::vec::Vec<u8> {
        alloc::vec![value; STRIDE * 32]
    }

    #[test]
    fn test_flat_area_is_untouched() {
        // A perfectly flat band has zero gradients everywhere; the filters
        // must be exact no-ops.
        let mut y = band(120);
        let mut u = band(120);
        let mut v = band(120);
        let orig = y.clone();
        let info = FilterInfo {
            f_limit: 60,
            f_ilevel: 20,
            f_inner: true,
            hev_thresh: 1,
        };
        filter_mb(
            &mut y, &mut u, &mut v, 8 * STRIDE, 4 * STRIDE, STRIDE, STRIDE, 1, 1,
            FilterType::Complex, &info,
        );
        assert_eq!(y, orig);
    }

    #[test]
    fn test_zero_limit_is_a_no_op() {
        let mut y = band(0);
        for (i, p) in y.iter_mut().enumerate() {
            *p = (i * 7) as u8;
        }
        let mut u = band(0);
        let mut v = band(0);
        let orig = y.clone();
        let info = FilterInfo::default();
        filter_mb(
            &mut y, &mut u, &mut v, 8 * STRIDE, 4 * STRIDE, STRIDE, STRIDE, 1, 1,
            FilterType::Complex, &info,
        );
        assert_eq!(y, orig);
    }

    #[test]
    fn test_simple_filter_softens_step_edge() {
        // A step edge across column 16 within the filter limits gets pulled
        // together by one sample on each side.
        let mut y = band(0);
        for row in 0..32 {
            for col in 0..STRIDE {
                y[row * STRIDE + col] = if col < 16 { 100 } else { 110 };
            }
        }
        let mut u = band(0);
        let mut v = band(0);
        let info = FilterInfo {
            f_limit: 40,
            f_ilevel: 10,
            f_inner: false,
            hev_thresh: 0,
        };
        filter_mb(
            &mut y, &mut u, &mut v, 16, 8, STRIDE, STRIDE, 1, 0,
            FilterType::Simple, &info,
        );
        // p0 moved up, q0 moved down
        assert!(y[15] > 100);
        assert!(y[16] < 110);
        // samples beyond p1/q1 untouched by the simple filter
        assert_eq!(y[13], 100);
        assert_eq!(y[18], 110);
    }
}
