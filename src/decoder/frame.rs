//! Frame reconstruction and the row pipeline.
//!
//! The pipeline consumes one parsed macroblock row at a time: the parser
//! fills [`Vp8FrameDecoder::mb_data_mut`], then calls
//! [`Vp8FrameDecoder::process_row`]. Each row is reconstructed into a slot
//! of a small ring of cached row bands, deblocked, optionally dithered, and
//! emitted through the [`OutputSink`]. Depending on the threading method
//! the filter/output stage (and optionally reconstruction) runs on a worker
//! context; the only suspension point is the sync at the head of
//! `process_row`.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use crate::common::prediction::{
    pred_b_dc, pred_b_he, pred_b_hd, pred_b_hu, pred_b_ld, pred_b_rd, pred_b_tm, pred_b_ve,
    pred_b_vl, pred_b_vr, pred_dc, pred_h, pred_tm, pred_v,
};
use crate::common::transform;
use crate::common::types::{
    ChromaMode, FilterHeader, IntraMode, LumaMode, QuantInfo, SegmentHeader, NUM_MB_SEGMENTS,
};

use super::error::DecodeError;
use super::io::{AlphaDecoder, CropRect, OutputSink, RowBand};
use super::loop_filter::filter_mb;
use super::random::{dither_combine_8x8, DitherRng, RANDOM_DITHER_FIX};
use super::types::{FilterInfo, FilterType, MacroblockData, TopSamples};
use super::worker::{RowHandler, Worker};

/// Minimal frame width under which lossy multi-threading is always disabled.
pub const MIN_WIDTH_FOR_THREADS: usize = 512;

// Sample scratch layout. The cache is 32 bytes wide (one cache line): one
// 16x16 luma block and two 8x8 chroma blocks plus their top row, left
// column, top-left corner and four extra top-right luma samples for the
// 4x4 prediction modes.
const BPS: usize = 32;
const YUV_SIZE: usize = BPS * 17 + BPS * 9;
const Y_OFF: usize = BPS + 8;
const U_OFF: usize = Y_OFF + BPS * 16 + BPS;
const V_OFF: usize = U_OFF + 16;

// Minimal amplitude that produces a visible dithering effect.
const MIN_DITHER_AMP: u8 = 4;

const DITHER_AMP_TAB: [u8; 12] = [8, 7, 6, 4, 4, 2, 2, 2, 1, 1, 1, 1];

#[inline(always)]
fn yx(x: isize, y: isize) -> usize {
    (Y_OFF as isize + y * BPS as isize + x) as usize
}

#[inline(always)]
fn ux(x: isize, y: isize) -> usize {
    (U_OFF as isize + y * BPS as isize + x) as usize
}

#[inline(always)]
fn vx(x: isize, y: isize) -> usize {
    (V_OFF as isize + y * BPS as isize + x) as usize
}

// Sub-block offsets within the luma area, in decoding order.
const SCAN: [usize; 16] = [
    0,
    4,
    8,
    12,
    4 * BPS,
    4 + 4 * BPS,
    8 + 4 * BPS,
    12 + 4 * BPS,
    8 * BPS,
    4 + 8 * BPS,
    8 + 8 * BPS,
    12 + 8 * BPS,
    12 * BPS,
    4 + 12 * BPS,
    8 + 12 * BPS,
    12 + 12 * BPS,
];

#[inline]
fn do_transform(bits: u32, coeffs: &[i16], buf: &mut [u8], off: usize) {
    match bits >> 30 {
        3 => transform::transform_one(coeffs, buf, off, BPS),
        2 => transform::transform_ac3(coeffs, buf, off, BPS),
        1 => transform::transform_dc(coeffs, buf, off, BPS),
        _ => {}
    }
}

#[inline]
fn do_uv_transform(bits: u32, coeffs: &[i16], buf: &mut [u8], off: usize) {
    if bits & 0xff != 0 {
        // any non-zero coefficient at all?
        if bits & 0xaa != 0 {
            // any non-zero AC coefficient?
            transform::transform_uv(coeffs, buf, off, BPS);
        } else {
            transform::transform_dc_uv(coeffs, buf, off, BPS);
        }
    }
}

/// Threading method for a frame: 0 = serial, 1 = filter/output on the
/// worker, 2 = reconstruction, filter and output on the worker. Narrow
/// frames gain nothing from the pipeline split and stay serial, as does
/// any build without `std`.
pub fn get_thread_method(options: &DecodeOptions, width: usize) -> u8 {
    if !cfg!(feature = "std") {
        return 0;
    }
    if let Some(m) = options.thread_method {
        return m.min(2);
    }
    if options.use_threads && width >= MIN_WIDTH_FOR_THREADS {
        2
    } else {
        0
    }
}

/// Everything the pipeline needs to know about the frame, produced by the
/// header parser.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Loop-filter header fields.
    pub filter: FilterHeader,
    /// Segment header fields.
    pub segments: SegmentHeader,
    /// Per-segment quantizer info (drives the dithering amplitude).
    pub quant: [QuantInfo; NUM_MB_SEGMENTS],
}

/// Knobs for one decode, mirroring the user-facing decoder options.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Visible region; full frame when `None`.
    pub crop: Option<CropRect>,
    /// Skip in-loop filtering entirely.
    pub bypass_filtering: bool,
    /// Allow the two-threaded pipeline for wide frames.
    pub use_threads: bool,
    /// Expert override of the threading method (0, 1 or 2); `None` selects
    /// automatically from `use_threads` and the frame width.
    pub thread_method: Option<u8>,
    /// Dithering strength in `[0..100]`, 0 disables.
    pub dithering_strength: i32,
}

/// One slot of the row ring: a cached band of 16 luma rows (8 chroma) plus
/// the seed rows carried over from the row above for cross-row filtering.
struct CacheSlot {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

/// Buffers that travel with one launched row.
struct RowJob {
    slot: CacheSlot,
    mb_data: Vec<MacroblockData>,
    f_info: Vec<FilterInfo>,
    mb_y: usize,
    filter_row: bool,
}

/// Reconstruction context: the bordered sample scratch and the saved
/// bottom-edge samples of the row above. Lives with whichever execution
/// context runs reconstruction.
struct ReconstructState {
    yuv_b: [u8; YUV_SIZE],
    yuv_t: Vec<TopSamples>,
}

impl ReconstructState {
    fn new(mb_w: usize) -> Self {
        Self {
            yuv_b: [0; YUV_SIZE],
            yuv_t: vec![TopSamples::default(); mb_w],
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn reconstruct_row(
        &mut self,
        mbs: &[MacroblockData],
        mb_y: usize,
        mb_w: usize,
        mb_h: usize,
        slot: &mut CacheSlot,
        extra_rows: usize,
        y_stride: usize,
        uv_stride: usize,
    ) {
        let yuv = &mut self.yuv_b;

        // Prime the left-most block.
        for j in 0..16 {
            yuv[yx(-1, j)] = 129;
        }
        for j in 0..8 {
            yuv[ux(-1, j)] = 129;
            yuv[vx(-1, j)] = 129;
        }
        if mb_y > 0 {
            yuv[yx(-1, -1)] = 129;
            yuv[ux(-1, -1)] = 129;
            yuv[vx(-1, -1)] = 129;
        } else {
            // Valid for the whole topmost row once initialized at (0,0).
            for i in -1..(16 + 4) {
                yuv[yx(i, -1)] = 127;
            }
            for i in -1..8 {
                yuv[ux(i, -1)] = 127;
                yuv[vx(i, -1)] = 127;
            }
        }

        for (mb_x, block) in mbs.iter().enumerate() {
            // Rotate in the left samples from the previously decoded block,
            // four pixels at a time for alignment and the in-loop filter.
            if mb_x > 0 {
                for j in -1..16 {
                    let src = yx(12, j);
                    yuv.copy_within(src..src + 4, yx(-4, j));
                }
                for j in -1..8 {
                    let src = ux(4, j);
                    yuv.copy_within(src..src + 4, ux(-4, j));
                    let src = vx(4, j);
                    yuv.copy_within(src..src + 4, vx(-4, j));
                }
            }

            // Bring the saved top samples into the scratch.
            if mb_y > 0 {
                let top = &self.yuv_t[mb_x];
                yuv[yx(0, -1)..yx(16, -1)].copy_from_slice(&top.y);
                yuv[ux(0, -1)..ux(8, -1)].copy_from_slice(&top.u);
                yuv[vx(0, -1)..vx(8, -1)].copy_from_slice(&top.v);
            }

            let mut bits = block.non_zero_y;
            if block.luma_mode == LumaMode::B {
                if mb_y > 0 {
                    if mb_x >= mb_w - 1 {
                        // On the rightmost border: replicate the last top
                        // sample into the top-right slot.
                        let t = self.yuv_t[mb_x].y[15];
                        for i in 16..20 {
                            yuv[yx(i, -1)] = t;
                        }
                    } else {
                        let tr: [u8; 4] = self.yuv_t[mb_x + 1].y[0..4].try_into().unwrap();
                        yuv[yx(16, -1)..yx(20, -1)].copy_from_slice(&tr);
                    }
                }
                // Replicate the top-right samples below, for the rightmost
                // sub-blocks of rows 1..3.
                for r in [3isize, 7, 11] {
                    let src = yx(16, -1);
                    yuv.copy_within(src..src + 4, yx(16, r));
                }

                for n in 0..16 {
                    let off = Y_OFF + SCAN[n];
                    match block.imodes[n] {
                        IntraMode::DC => pred_b_dc(yuv, off, BPS),
                        IntraMode::TM => pred_b_tm(yuv, off, BPS),
                        IntraMode::VE => pred_b_ve(yuv, off, BPS),
                        IntraMode::HE => pred_b_he(yuv, off, BPS),
                        IntraMode::LD => pred_b_ld(yuv, off, BPS),
                        IntraMode::RD => pred_b_rd(yuv, off, BPS),
                        IntraMode::VR => pred_b_vr(yuv, off, BPS),
                        IntraMode::VL => pred_b_vl(yuv, off, BPS),
                        IntraMode::HD => pred_b_hd(yuv, off, BPS),
                        IntraMode::HU => pred_b_hu(yuv, off, BPS),
                    }
                    do_transform(bits, &block.coeffs[n * 16..], yuv, off);
                    bits <<= 2;
                }
            } else {
                match block.luma_mode {
                    LumaMode::DC => pred_dc(yuv, Y_OFF, BPS, 16, mb_y > 0, mb_x > 0),
                    LumaMode::V => pred_v(yuv, Y_OFF, BPS, 16),
                    LumaMode::H => pred_h(yuv, Y_OFF, BPS, 16),
                    LumaMode::TM => pred_tm(yuv, Y_OFF, BPS, 16),
                    LumaMode::B => unreachable!(),
                }
                if bits != 0 {
                    for n in 0..16 {
                        do_transform(bits, &block.coeffs[n * 16..], yuv, Y_OFF + SCAN[n]);
                        bits <<= 2;
                    }
                }
            }

            // Chroma.
            match block.chroma_mode {
                ChromaMode::DC => {
                    pred_dc(yuv, U_OFF, BPS, 8, mb_y > 0, mb_x > 0);
                    pred_dc(yuv, V_OFF, BPS, 8, mb_y > 0, mb_x > 0);
                }
                ChromaMode::V => {
                    pred_v(yuv, U_OFF, BPS, 8);
                    pred_v(yuv, V_OFF, BPS, 8);
                }
                ChromaMode::H => {
                    pred_h(yuv, U_OFF, BPS, 8);
                    pred_h(yuv, V_OFF, BPS, 8);
                }
                ChromaMode::TM => {
                    pred_tm(yuv, U_OFF, BPS, 8);
                    pred_tm(yuv, V_OFF, BPS, 8);
                }
            }
            do_uv_transform(block.non_zero_uv, &block.coeffs[16 * 16..], yuv, U_OFF);
            do_uv_transform(block.non_zero_uv >> 8, &block.coeffs[20 * 16..], yuv, V_OFF);

            // Stash the bottom edge for the next row.
            if mb_y < mb_h - 1 {
                let top = &mut self.yuv_t[mb_x];
                top.y.copy_from_slice(&yuv[yx(0, 15)..yx(16, 15)]);
                top.u.copy_from_slice(&yuv[ux(0, 7)..ux(8, 7)]);
                top.v.copy_from_slice(&yuv[vx(0, 7)..vx(8, 7)]);
            }

            // Transfer the reconstructed samples into the row band.
            let y_out = extra_rows * y_stride + mb_x * 16;
            for j in 0..16 {
                slot.y[y_out + j * y_stride..y_out + j * y_stride + 16]
                    .copy_from_slice(&yuv[yx(0, j as isize)..yx(16, j as isize)]);
            }
            let uv_out = (extra_rows / 2) * uv_stride + mb_x * 8;
            for j in 0..8 {
                slot.u[uv_out + j * uv_stride..uv_out + j * uv_stride + 8]
                    .copy_from_slice(&yuv[ux(0, j as isize)..ux(8, j as isize)]);
                slot.v[uv_out + j * uv_stride..uv_out + j * uv_stride + 8]
                    .copy_from_slice(&yuv[vx(0, j as isize)..vx(8, j as isize)]);
            }
        }
    }
}

/// Filter/dither/output stage. Owned by the worker context when threading
/// is active; also runs reconstruction when `recon` is present (method 2).
struct FinishState {
    sink: Box<dyn OutputSink>,
    alpha: Option<Box<dyn AlphaDecoder>>,
    recon: Option<ReconstructState>,
    filter_type: FilterType,
    extra_rows: usize,
    mb_w: usize,
    mb_h: usize,
    width: usize,
    crop: CropRect,
    tl_mb_x: usize,
    br_mb_x: usize,
    br_mb_y: usize,
    y_stride: usize,
    uv_stride: usize,
    seed_y: Vec<u8>,
    seed_u: Vec<u8>,
    seed_v: Vec<u8>,
    dither: bool,
    rng: DitherRng,
}

impl FinishState {
    fn dither_row(&mut self, job: &mut RowJob) {
        let extra_uv = self.extra_rows / 2;
        for mb_x in self.tl_mb_x..self.br_mb_x {
            let amp = job.mb_data[mb_x].dither;
            if amp < MIN_DITHER_AMP {
                continue;
            }
            let off = extra_uv * self.uv_stride + mb_x * 8;
            let mut d = [0u8; 64];
            for s in d.iter_mut() {
                *s = self.rng.dither_sample(i32::from(amp));
            }
            dither_combine_8x8(&d, &mut job.slot.u, off, self.uv_stride);
            for s in d.iter_mut() {
                *s = self.rng.dither_sample(i32::from(amp));
            }
            dither_combine_8x8(&d, &mut job.slot.v, off, self.uv_stride);
        }
    }

    /// Finalize and transmit a complete row. `Ok(false)` is a user abort.
    fn finish_row(&mut self, job: &RowJob) -> Result<bool, DecodeError> {
        let extra = self.extra_rows;
        let mb_y = job.mb_y;
        let is_first = mb_y == 0;
        let is_last = mb_y + 1 >= self.br_mb_y;

        let mut y_start = mb_y * 16 - if is_first { 0 } else { extra };
        let mut y_end = (mb_y + 1) * 16;
        if !is_last {
            y_end -= extra;
        }
        if y_end > self.crop.bottom {
            y_end = self.crop.bottom;
        }

        // Band rows sit below the seed region; on the first row the seed
        // region holds nothing yet.
        let mut y_row0 = if is_first { extra } else { 0 };
        let mut uv_row0 = if is_first { extra / 2 } else { 0 };

        let Self {
            sink,
            alpha,
            width,
            crop,
            y_stride,
            uv_stride,
            ..
        } = self;
        let width = *width;

        let mut a_off = 0usize;
        let mut a_slab: Option<&[u8]> = None;
        if let Some(alpha) = alpha.as_mut() {
            if y_start < y_end {
                match alpha.decompress_rows(y_start, y_end - y_start) {
                    Some(slab) => a_slab = Some(slab),
                    None => return Err(DecodeError::BitStreamError),
                }
            }
        }

        if y_start < crop.top {
            let delta_y = crop.top - y_start;
            y_start = crop.top;
            y_row0 += delta_y;
            uv_row0 += delta_y >> 1;
            a_off += width * delta_y;
        }
        if y_start >= y_end {
            return Ok(true);
        }

        let y_base = y_row0 * *y_stride + crop.left;
        let uv_base = uv_row0 * *uv_stride + (crop.left >> 1);
        a_off += crop.left;
        let band = RowBand {
            mb_y: y_start - crop.top,
            mb_w: crop.width(),
            mb_h: y_end - y_start,
            y: &job.slot.y[y_base..],
            u: &job.slot.u[uv_base..],
            v: &job.slot.v[uv_base..],
            a: a_slab.map(|slab| &slab[a_off..]),
            y_stride: *y_stride,
            uv_stride: *uv_stride,
            a_stride: width,
        };
        Ok(sink.put(&band))
    }
}

impl RowHandler for FinishState {
    type Job = RowJob;

    fn process(&mut self, job: &mut RowJob) -> Result<bool, DecodeError> {
        let mb_y = job.mb_y;

        if let Some(recon) = self.recon.as_mut() {
            recon.reconstruct_row(
                &job.mb_data,
                mb_y,
                self.mb_w,
                self.mb_h,
                &mut job.slot,
                self.extra_rows,
                self.y_stride,
                self.uv_stride,
            );
        }

        // Seed the rows above the band with the filtered bottom rows of the
        // previous slot, so cross-row filter dependencies resolve within
        // this slot.
        let extra = self.extra_rows;
        if extra > 0 && mb_y > 0 {
            job.slot.y[..extra * self.y_stride].copy_from_slice(&self.seed_y);
            let uv = (extra / 2) * self.uv_stride;
            job.slot.u[..uv].copy_from_slice(&self.seed_u);
            job.slot.v[..uv].copy_from_slice(&self.seed_v);
        }

        if job.filter_row {
            let extra_uv = extra / 2;
            for mb_x in self.tl_mb_x..self.br_mb_x {
                filter_mb(
                    &mut job.slot.y,
                    &mut job.slot.u,
                    &mut job.slot.v,
                    extra * self.y_stride + mb_x * 16,
                    extra_uv * self.uv_stride + mb_x * 8,
                    self.y_stride,
                    self.uv_stride,
                    mb_x,
                    mb_y,
                    self.filter_type,
                    &job.f_info[mb_x],
                );
            }
        }

        if self.dither {
            self.dither_row(job);
        }

        let keep_going = self.finish_row(job)?;

        // Save the bottom rows as the seed for the next slot.
        let is_last = mb_y + 1 >= self.br_mb_y;
        if extra > 0 && !is_last {
            let start = 16 * self.y_stride;
            self.seed_y
                .copy_from_slice(&job.slot.y[start..start + extra * self.y_stride]);
            let uv = (extra / 2) * self.uv_stride;
            let start = 8 * self.uv_stride;
            self.seed_u.copy_from_slice(&job.slot.u[start..start + uv]);
            self.seed_v.copy_from_slice(&job.slot.v[start..start + uv]);
        }

        Ok(keep_going)
    }
}

enum Stage {
    New,
    Critical,
    Running,
    Finished,
}

/// The frame-reconstruction pipeline.
///
/// Call order: [`Vp8FrameDecoder::enter_critical`], then
/// [`Vp8FrameDecoder::init_frame`], then one
/// [`Vp8FrameDecoder::process_row`] per macroblock row up to
/// [`Vp8FrameDecoder::last_row`], then [`Vp8FrameDecoder::exit_critical`].
pub struct Vp8FrameDecoder<'a> {
    width: usize,
    height: usize,
    mb_w: usize,
    mb_h: usize,

    filter_hdr: FilterHeader,
    segment_hdr: SegmentHeader,
    quant: [QuantInfo; NUM_MB_SEGMENTS],
    filter_type: FilterType,
    fstrengths: [[FilterInfo; 2]; NUM_MB_SEGMENTS],
    dither: bool,

    crop: CropRect,
    tl_mb_x: usize,
    tl_mb_y: usize,
    br_mb_x: usize,
    br_mb_y: usize,

    mt_method: u8,
    num_caches: usize,
    mb_y: usize,

    mb_data: Vec<MacroblockData>,
    recon: Option<ReconstructState>,
    worker: Option<Worker<FinishState>>,
    free_slots: Vec<CacheSlot>,
    free_mb: Vec<Vec<MacroblockData>>,
    free_finfo: Vec<Vec<FilterInfo>>,
    y_stride: usize,
    uv_stride: usize,

    options: DecodeOptions,
    sink_pending: Option<Box<dyn OutputSink>>,
    alpha_pending: Option<Box<dyn AlphaDecoder>>,

    stage: Stage,
    aborted: bool,
    poisoned: bool,

    stop: Option<&'a dyn enough::Stop>,
}

impl<'a> Vp8FrameDecoder<'a> {
    /// Create a pipeline for one frame.
    pub fn new(desc: &FrameDescriptor) -> Self {
        let mb_w = desc.width.div_ceil(16);
        let mb_h = desc.height.div_ceil(16);
        let filter_type = if desc.filter.level == 0 {
            FilterType::None
        } else if desc.filter.simple {
            FilterType::Simple
        } else {
            FilterType::Complex
        };
        Self {
            width: desc.width,
            height: desc.height,
            mb_w,
            mb_h,
            filter_hdr: desc.filter,
            segment_hdr: desc.segments,
            quant: desc.quant,
            filter_type,
            fstrengths: [[FilterInfo::default(); 2]; NUM_MB_SEGMENTS],
            dither: false,
            crop: CropRect::full(desc.width, desc.height),
            tl_mb_x: 0,
            tl_mb_y: 0,
            br_mb_x: mb_w,
            br_mb_y: mb_h,
            mt_method: 0,
            num_caches: 1,
            mb_y: 0,
            mb_data: Vec::new(),
            recon: None,
            worker: None,
            free_slots: Vec::new(),
            free_mb: Vec::new(),
            free_finfo: Vec::new(),
            y_stride: 0,
            uv_stride: 0,
            options: DecodeOptions::default(),
            sink_pending: None,
            alpha_pending: None,
            stage: Stage::New,
            aborted: false,
            poisoned: false,
            stop: None,
        }
    }

    /// Attach a cooperative cancellation token, checked at row boundaries.
    pub fn set_stop(&mut self, stop: &'a dyn enough::Stop) {
        self.stop = Some(stop);
    }

    /// Width in macroblock units.
    pub fn mb_width(&self) -> usize {
        self.mb_w
    }

    /// Height in macroblock units.
    pub fn mb_height(&self) -> usize {
        self.mb_h
    }

    /// One past the last macroblock row that must be processed, given the
    /// crop. Valid after [`Vp8FrameDecoder::enter_critical`].
    pub fn last_row(&self) -> usize {
        self.br_mb_y
    }

    /// The effective in-loop filter for this frame.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Dithering amplitude chosen for a segment; parsers derive each
    /// macroblock's [`MacroblockData::dither`] from this.
    pub fn segment_dither_amp(&self, segment: usize) -> u8 {
        self.quant[segment].dither
    }

    /// Derive the per-segment dithering amplitudes from the user strength
    /// (0 disables, 100 is full).
    pub fn init_dithering(&mut self, dithering_strength: i32) {
        let max_amp = (1i32 << RANDOM_DITHER_FIX) - 1;
        let f = dithering_strength.clamp(0, 100) * max_amp / 100;
        if f <= 0 {
            return;
        }
        let mut all_amp = 0u8;
        for s in 0..NUM_MB_SEGMENTS {
            let dqm = &mut self.quant[s];
            if dqm.uv_quant < DITHER_AMP_TAB.len() as i32 {
                let idx = dqm.uv_quant.max(0) as usize;
                dqm.dither = ((f * i32::from(DITHER_AMP_TAB[idx])) >> 3) as u8;
            }
            all_amp |= dqm.dither;
        }
        if all_amp != 0 {
            self.dither = true;
        }
    }

    /// Run the output sink's `setup`, resolve the crop-dependent filter
    /// bounds and precompute the per-segment filter strengths. Must always
    /// be paired with [`Vp8FrameDecoder::exit_critical`].
    pub fn enter_critical(
        &mut self,
        mut sink: Box<dyn OutputSink>,
        alpha: Option<Box<dyn AlphaDecoder>>,
        options: DecodeOptions,
    ) -> Result<(), DecodeError> {
        if !matches!(self.stage, Stage::New) {
            return Err(DecodeError::InvalidParameter("enter_critical called twice"));
        }

        let crop = options.crop.unwrap_or(CropRect::full(self.width, self.height));
        if crop.left >= crop.right
            || crop.top >= crop.bottom
            || crop.right > self.width
            || crop.bottom > self.height
        {
            return Err(DecodeError::InvalidParameter("invalid crop rectangle"));
        }
        if !sink.setup(&crop) {
            // teardown always pairs with setup, even a rejected one
            sink.teardown();
            return Err(DecodeError::InvalidParameter("sink setup failed"));
        }
        self.crop = crop;

        // Disable filtering per user request.
        if options.bypass_filtering {
            self.filter_type = FilterType::None;
        }

        // Define the area where in-loop filtering may be skipped, in case
        // of cropping. The simple filter's reads stay local, so it can be
        // confined to the crop plus a small apron. The complex filter's
        // dependency chain reaches macroblock (0,0) and cannot be cropped.
        let extra_pixels = self.filter_type.extra_rows();
        if self.filter_type == FilterType::Complex {
            self.tl_mb_x = 0;
            self.tl_mb_y = 0;
        } else {
            self.tl_mb_x = crop.left.saturating_sub(extra_pixels) >> 4;
            self.tl_mb_y = crop.top.saturating_sub(extra_pixels) >> 4;
        }
        self.br_mb_x = ((crop.right + 15 + extra_pixels) >> 4).min(self.mb_w);
        self.br_mb_y = ((crop.bottom + 15 + extra_pixels) >> 4).min(self.mb_h);

        self.precompute_filter_strengths();
        self.init_dithering(options.dithering_strength);

        self.options = options;
        self.sink_pending = Some(sink);
        self.alpha_pending = alpha;
        self.stage = Stage::Critical;
        Ok(())
    }

    fn precompute_filter_strengths(&mut self) {
        if self.filter_type == FilterType::None {
            return;
        }
        let hdr = &self.filter_hdr;
        for s in 0..NUM_MB_SEGMENTS {
            // First, compute the initial level.
            let base_level = if self.segment_hdr.use_segment {
                let mut level = i32::from(self.segment_hdr.filter_strength[s]);
                if !self.segment_hdr.absolute_delta {
                    level += i32::from(hdr.level);
                }
                level
            } else {
                i32::from(hdr.level)
            };
            for i4x4 in 0..2 {
                let info = &mut self.fstrengths[s][i4x4];
                let mut level = base_level;
                if hdr.use_lf_delta {
                    level += hdr.ref_lf_delta[0];
                    if i4x4 == 1 {
                        level += hdr.mode_lf_delta[0];
                    }
                }
                let level = level.clamp(0, 63);
                if level > 0 {
                    let mut ilevel = level;
                    if hdr.sharpness > 0 {
                        if hdr.sharpness > 4 {
                            ilevel >>= 2;
                        } else {
                            ilevel >>= 1;
                        }
                        ilevel = ilevel.min(9 - i32::from(hdr.sharpness));
                    }
                    ilevel = ilevel.max(1);
                    info.f_ilevel = ilevel as u8;
                    info.f_limit = (2 * level + ilevel) as u8;
                    info.hev_thresh = if level >= 40 {
                        2
                    } else if level >= 15 {
                        1
                    } else {
                        0
                    };
                } else {
                    info.f_limit = 0; // no filtering
                }
                info.f_inner = i4x4 == 1;
            }
        }
    }

    /// Total byte claim for the row ring and per-row buffers, with overflow
    /// checking.
    fn checked_claim(&self, extra: usize) -> Result<usize, DecodeError> {
        let slot_y = (extra + 16).checked_mul(self.y_stride);
        let slot_uv = (extra / 2 + 8).checked_mul(self.uv_stride);
        let (slot_y, slot_uv) = match (slot_y, slot_uv) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(DecodeError::OutOfMemory),
        };
        slot_y
            .checked_add(slot_uv.checked_mul(2).ok_or(DecodeError::OutOfMemory)?)
            .and_then(|per_slot| per_slot.checked_mul(self.num_caches))
            .and_then(|slots| {
                // top samples + two rotating rows of macroblock data
                let mb = self
                    .mb_w
                    .checked_mul(2 * mem::size_of::<MacroblockData>() + mem::size_of::<TopSamples>())?;
                slots.checked_add(mb)
            })
            .ok_or(DecodeError::OutOfMemory)
    }

    /// Claim working memory, choose the threading method and reset the
    /// scanline state.
    pub fn init_frame(&mut self) -> Result<(), DecodeError> {
        if !matches!(self.stage, Stage::Critical) {
            return Err(DecodeError::InvalidParameter(
                "init_frame requires enter_critical",
            ));
        }

        let mt = get_thread_method(&self.options, self.width);
        self.mt_method = mt;
        self.num_caches = if mt > 0 {
            if self.filter_type != FilterType::None {
                3
            } else {
                2
            }
        } else {
            1
        };

        self.y_stride = self.mb_w * 16;
        self.uv_stride = self.mb_w * 8;
        let extra = self.filter_type.extra_rows();
        let _ = self.checked_claim(extra)?;

        self.free_slots = (0..self.num_caches)
            .map(|_| CacheSlot {
                y: vec![0; (extra + 16) * self.y_stride],
                u: vec![0; (extra / 2 + 8) * self.uv_stride],
                v: vec![0; (extra / 2 + 8) * self.uv_stride],
            })
            .collect();
        self.mb_data = vec![MacroblockData::default(); self.mb_w];
        self.free_mb = vec![vec![MacroblockData::default(); self.mb_w]];
        self.free_finfo = vec![vec![FilterInfo::default(); self.mb_w]];

        let finish = FinishState {
            sink: self
                .sink_pending
                .take()
                .ok_or(DecodeError::InvalidParameter("missing output sink"))?,
            alpha: self.alpha_pending.take(),
            recon: if mt == 2 {
                Some(ReconstructState::new(self.mb_w))
            } else {
                None
            },
            filter_type: self.filter_type,
            extra_rows: extra,
            mb_w: self.mb_w,
            mb_h: self.mb_h,
            width: self.width,
            crop: self.crop,
            tl_mb_x: self.tl_mb_x,
            br_mb_x: self.br_mb_x,
            br_mb_y: self.br_mb_y,
            y_stride: self.y_stride,
            uv_stride: self.uv_stride,
            seed_y: vec![0; extra * self.y_stride],
            seed_u: vec![0; (extra / 2) * self.uv_stride],
            seed_v: vec![0; (extra / 2) * self.uv_stride],
            dither: self.dither,
            rng: DitherRng::new(),
        };
        if mt != 2 {
            self.recon = Some(ReconstructState::new(self.mb_w));
        }
        self.worker = Some(Worker::reset(finish, mt > 0));

        self.mb_y = 0;
        self.aborted = false;
        self.stage = Stage::Running;
        Ok(())
    }

    /// The macroblock row buffer the parser fills before each
    /// [`Vp8FrameDecoder::process_row`] call.
    pub fn mb_data_mut(&mut self) -> &mut [MacroblockData] {
        &mut self.mb_data
    }

    fn sync_worker(&mut self) -> Result<bool, DecodeError> {
        let worker = self
            .worker
            .as_mut()
            .ok_or(DecodeError::InvalidParameter("pipeline not initialized"))?;
        match worker.sync() {
            Ok(None) => Ok(true),
            Ok(Some(fin)) => {
                self.free_slots.push(fin.job.slot);
                self.free_mb.push(fin.job.mb_data);
                self.free_finfo.push(fin.job.f_info);
                Ok(fin.keep_going)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the pipeline for one parsed macroblock row. Returns `Ok(false)`
    /// when the sink requested an abort; the pipeline drains cleanly.
    pub fn process_row(&mut self) -> Result<bool, DecodeError> {
        if self.poisoned {
            return Err(DecodeError::InvalidParameter("pipeline already failed"));
        }
        if !matches!(self.stage, Stage::Running) {
            return Err(DecodeError::InvalidParameter(
                "process_row requires init_frame",
            ));
        }
        if self.aborted {
            return Ok(false);
        }
        let mb_y = self.mb_y;
        if mb_y >= self.br_mb_y {
            return Err(DecodeError::InvalidParameter("row past the last row"));
        }

        let filter_row = self.filter_type != FilterType::None
            && mb_y >= self.tl_mb_y
            && mb_y <= self.br_mb_y;

        // Finish the previous job before touching any shared buffers.
        match self.sync_worker() {
            Ok(true) => {}
            Ok(false) => {
                self.aborted = true;
                return Ok(false);
            }
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        }

        let mut f_info = self.free_finfo.pop().unwrap_or_default();
        f_info.resize(self.mb_w, FilterInfo::default());
        for (info, mb) in f_info.iter_mut().zip(self.mb_data.iter()) {
            let i4x4 = usize::from(mb.luma_mode == LumaMode::B);
            *info = self.fstrengths[usize::from(mb.segment) % NUM_MB_SEGMENTS][i4x4];
            // Macroblocks with live coefficients get their sub-block edges
            // filtered even in 16x16 modes.
            info.f_inner |= !mb.skip;
        }

        let mut slot = self
            .free_slots
            .pop()
            .ok_or(DecodeError::InvalidParameter("row ring exhausted"))?;
        let spare = self
            .free_mb
            .pop()
            .unwrap_or_else(|| vec![MacroblockData::default(); self.mb_w]);
        let mb_data = mem::replace(&mut self.mb_data, spare);

        if self.mt_method != 2 {
            // Reconstruction runs on this context; the worker only filters
            // and emits.
            self.recon
                .as_mut()
                .ok_or(DecodeError::InvalidParameter("missing reconstruct state"))?
                .reconstruct_row(
                    &mb_data,
                    mb_y,
                    self.mb_w,
                    self.mb_h,
                    &mut slot,
                    self.filter_type.extra_rows(),
                    self.y_stride,
                    self.uv_stride,
                );
        }

        let job = RowJob {
            slot,
            mb_data,
            f_info,
            mb_y,
            filter_row,
        };
        if let Some(worker) = self.worker.as_mut() {
            worker.launch(job);
        }
        self.mb_y += 1;

        // Cooperative cancellation between macroblock rows.
        if let Some(stop) = self.stop {
            if let Err(reason) = stop.check() {
                self.poisoned = true;
                return Err(reason.into());
            }
        }
        Ok(true)
    }

    /// Drain the worker, tear the sink down and hand it back. Must always
    /// be called after [`Vp8FrameDecoder::enter_critical`], error or not.
    pub fn exit_critical(&mut self) -> Result<Box<dyn OutputSink>, DecodeError> {
        match self.stage {
            Stage::Critical => {
                // init_frame never ran; the sink never left the pipeline.
                self.stage = Stage::Finished;
                let mut sink = self
                    .sink_pending
                    .take()
                    .ok_or(DecodeError::InvalidParameter("missing output sink"))?;
                sink.teardown();
                return Ok(sink);
            }
            Stage::Running => {}
            _ => {
                return Err(DecodeError::InvalidParameter(
                    "exit_critical requires enter_critical",
                ))
            }
        }
        self.stage = Stage::Finished;
        let sync_res = self.sync_worker();
        let worker = self
            .worker
            .take()
            .ok_or(DecodeError::InvalidParameter("pipeline not initialized"))?;
        let mut finish = worker.into_handler()?;
        finish.sink.teardown();
        // A failure on the final in-flight row surfaces here; the sink has
        // still been torn down.
        sync_res?;
        Ok(finish.sink)
    }
}
