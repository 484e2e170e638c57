//! End-to-end tests of the frame-reconstruction pipeline.
//!
//! Macroblock data is synthesized deterministically (no bitstream parsing
//! involved) and pushed through the full reconstruct→filter→output path.

use std::sync::{Arc, Mutex};

use zenwebp_core::common::types::{
    ChromaMode, FilterHeader, IntraMode, LumaMode, QuantInfo, SegmentHeader,
};
use zenwebp_core::{
    AlphaDecoder, CropRect, DecodeOptions, FrameDescriptor, MacroblockData, OutputSink, RowBand,
    Vp8FrameDecoder,
};

/// Everything the sink observed, shared with the test body.
#[derive(Default, Debug)]
struct Capture {
    width: usize,
    height: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    a: Vec<u8>,
    bands: Vec<(usize, usize, usize)>, // (mb_y, mb_w, mb_h)
    torn_down: bool,
}

struct CaptureSink {
    shared: Arc<Mutex<Capture>>,
    abort_after_bands: Option<usize>,
}

impl CaptureSink {
    fn new(shared: Arc<Mutex<Capture>>) -> Box<Self> {
        Box::new(Self {
            shared,
            abort_after_bands: None,
        })
    }
}

impl OutputSink for CaptureSink {
    fn setup(&mut self, crop: &CropRect) -> bool {
        let mut c = self.shared.lock().unwrap();
        c.width = crop.width();
        c.height = crop.height();
        c.y = vec![0; c.width * c.height];
        c.a = vec![0; c.width * c.height];
        let uv_w = c.width.div_ceil(2);
        let uv_h = c.height.div_ceil(2);
        c.u = vec![0; uv_w * uv_h];
        c.v = vec![0; uv_w * uv_h];
        true
    }

    fn put(&mut self, band: &RowBand<'_>) -> bool {
        let mut c = self.shared.lock().unwrap();
        c.bands.push((band.mb_y, band.mb_w, band.mb_h));
        let w = c.width;
        for r in 0..band.mb_h {
            let dst = (band.mb_y + r) * w;
            c.y[dst..dst + band.mb_w]
                .copy_from_slice(&band.y[r * band.y_stride..][..band.mb_w]);
            if let Some(a) = band.a {
                c.a[dst..dst + band.mb_w].copy_from_slice(&a[r * band.a_stride..][..band.mb_w]);
            }
        }
        let uv_w = w.div_ceil(2);
        let band_uv_w = band.mb_w.div_ceil(2);
        let uv_rows = (band.mb_y + band.mb_h).div_ceil(2) - band.mb_y / 2;
        for r in 0..uv_rows {
            let dst = (band.mb_y / 2 + r) * uv_w;
            c.u[dst..dst + band_uv_w]
                .copy_from_slice(&band.u[r * band.uv_stride..][..band_uv_w]);
            c.v[dst..dst + band_uv_w]
                .copy_from_slice(&band.v[r * band.uv_stride..][..band_uv_w]);
        }
        match self.abort_after_bands {
            Some(n) => c.bands.len() < n,
            None => true,
        }
    }

    fn teardown(&mut self) {
        self.shared.lock().unwrap().torn_down = true;
    }
}

struct RowIndexAlpha {
    width: usize,
    fail: bool,
    buf: Vec<u8>,
}

impl AlphaDecoder for RowIndexAlpha {
    fn decompress_rows(&mut self, row: usize, num_rows: usize) -> Option<&[u8]> {
        if self.fail {
            return None;
        }
        self.buf.clear();
        for r in row..row + num_rows {
            self.buf.extend(std::iter::repeat(r as u8).take(self.width));
        }
        Some(&self.buf)
    }
}

fn descriptor(width: usize, height: usize, level: u8, simple: bool) -> FrameDescriptor {
    FrameDescriptor {
        width,
        height,
        filter: FilterHeader {
            simple,
            level,
            ..Default::default()
        },
        segments: SegmentHeader::default(),
        quant: [QuantInfo::default(); 4],
    }
}

/// Deterministic pseudo-random macroblock content keyed on the position.
fn synth_mb(mb_x: usize, mb_y: usize) -> MacroblockData {
    let mut seed = ((mb_x as u64) << 32) ^ ((mb_y as u64) << 8) ^ 0x9e37;
    let mut rand = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (seed >> 33) as u32
    };

    let mut mb = MacroblockData::default();
    mb.luma_mode = match rand() % 5 {
        0 => LumaMode::DC,
        1 => LumaMode::V,
        2 => LumaMode::H,
        3 => LumaMode::TM,
        _ => LumaMode::B,
    };
    const IMODES: [IntraMode; 10] = [
        IntraMode::DC,
        IntraMode::TM,
        IntraMode::VE,
        IntraMode::HE,
        IntraMode::LD,
        IntraMode::RD,
        IntraMode::VR,
        IntraMode::VL,
        IntraMode::HD,
        IntraMode::HU,
    ];
    for m in mb.imodes.iter_mut() {
        *m = IMODES[(rand() % 10) as usize];
    }
    mb.chroma_mode = match rand() % 4 {
        0 => ChromaMode::DC,
        1 => ChromaMode::V,
        2 => ChromaMode::H,
        _ => ChromaMode::TM,
    };
    for c in mb.coeffs.iter_mut() {
        *c = (rand() % 64) as i16 - 32;
    }
    mb.non_zero_y = rand();
    mb.non_zero_uv = rand();
    mb.segment = (rand() % 4) as u8;
    mb
}

fn run_pipeline(
    desc: &FrameDescriptor,
    options: DecodeOptions,
    with_alpha: bool,
    abort_after_bands: Option<usize>,
    make_mb: impl Fn(usize, usize) -> MacroblockData,
) -> Capture {
    let shared = Arc::new(Mutex::new(Capture::default()));
    let mut sink = CaptureSink::new(shared.clone());
    sink.abort_after_bands = abort_after_bands;
    let alpha: Option<Box<dyn AlphaDecoder>> = if with_alpha {
        Some(Box::new(RowIndexAlpha {
            width: desc.width,
            fail: false,
            buf: Vec::new(),
        }))
    } else {
        None
    };

    let mut dec = Vp8FrameDecoder::new(desc);
    dec.enter_critical(sink, alpha, options).unwrap();
    dec.init_frame().unwrap();
    for mb_y in 0..dec.last_row() {
        let mb_w = dec.mb_width();
        for mb_x in 0..mb_w {
            dec.mb_data_mut()[mb_x] = make_mb(mb_x, mb_y);
        }
        if !dec.process_row().unwrap() {
            break;
        }
    }
    let _ = dec.exit_critical().unwrap();

    Arc::try_unwrap(shared).unwrap().into_inner().unwrap()
}

#[test]
fn test_flat_dc_frame_is_mid_gray() {
    // A skipped DC macroblock with no borders predicts 0x80 everywhere.
    let desc = descriptor(16, 16, 0, false);
    let cap = run_pipeline(&desc, DecodeOptions::default(), false, None, |_, _| {
        MacroblockData {
            skip: true,
            ..Default::default()
        }
    });
    assert!(cap.y.iter().all(|&p| p == 0x80));
    assert!(cap.u.iter().all(|&p| p == 0x80));
    assert!(cap.torn_down);
    assert_eq!(cap.bands.len(), 1);
    assert_eq!(cap.bands[0], (0, 16, 16));
}

#[test]
fn test_bypass_filtering_equals_no_filter_frame() {
    // Disabling the filter through the io knob must bypass deblocking
    // entirely: output equals the reconstruction of a filterless frame.
    let filtered = descriptor(64, 48, 33, false);
    let filterless = descriptor(64, 48, 0, false);

    let bypassed = run_pipeline(
        &filtered,
        DecodeOptions {
            bypass_filtering: true,
            ..Default::default()
        },
        false,
        None,
        synth_mb,
    );
    let raw = run_pipeline(&filterless, DecodeOptions::default(), false, None, synth_mb);
    assert_eq!(bypassed.y, raw.y);
    assert_eq!(bypassed.u, raw.u);
    assert_eq!(bypassed.v, raw.v);

    // And filtering on does change the picture for this content.
    let deblocked = run_pipeline(&filtered, DecodeOptions::default(), false, None, synth_mb);
    assert_ne!(deblocked.y, raw.y);
}

fn assert_thread_parity(level: u8, simple: bool, dithering_strength: i32) {
    // 513 is exactly the threshold width where threading kicks in.
    let mut desc = descriptor(513, 64, level, simple);
    desc.quant = [QuantInfo {
        uv_quant: 0,
        dither: 0,
    }; 4];
    let make = |mb_x: usize, mb_y: usize| {
        let mut mb = synth_mb(mb_x, mb_y);
        mb.dither = 255;
        mb
    };

    let serial = run_pipeline(
        &desc,
        DecodeOptions {
            thread_method: Some(0),
            dithering_strength,
            ..Default::default()
        },
        false,
        None,
        make,
    );
    for method in [1u8, 2u8] {
        let threaded = run_pipeline(
            &desc,
            DecodeOptions {
                thread_method: Some(method),
                dithering_strength,
                ..Default::default()
            },
            false,
            None,
            make,
        );
        assert_eq!(serial.y, threaded.y, "luma diverged with method {method}");
        assert_eq!(serial.u, threaded.u, "U diverged with method {method}");
        assert_eq!(serial.v, threaded.v, "V diverged with method {method}");
    }

    // The automatic selection (width >= 512) must bit-match too.
    let auto = run_pipeline(
        &desc,
        DecodeOptions {
            use_threads: true,
            dithering_strength,
            ..Default::default()
        },
        false,
        None,
        make,
    );
    assert_eq!(serial.y, auto.y);
}

#[test]
fn test_threaded_decode_bit_matches_serial_complex_filter() {
    assert_thread_parity(28, false, 0);
}

#[test]
fn test_threaded_decode_bit_matches_serial_simple_filter() {
    assert_thread_parity(15, true, 0);
}

#[test]
fn test_threaded_decode_bit_matches_serial_no_filter() {
    assert_thread_parity(0, false, 0);
}

#[test]
fn test_threaded_decode_bit_matches_serial_with_dithering() {
    assert_thread_parity(28, false, 100);
}

#[test]
fn test_crop_emits_exactly_the_crop_rectangle() {
    let desc = descriptor(16, 16, 12, true);
    let crop = CropRect {
        left: 1,
        top: 1,
        right: 15,
        bottom: 15,
    };
    let cropped = run_pipeline(
        &desc,
        DecodeOptions {
            crop: Some(crop),
            ..Default::default()
        },
        false,
        None,
        synth_mb,
    );

    assert_eq!(cropped.width, 14);
    assert_eq!(cropped.height, 14);
    let emitted: usize = cropped.bands.iter().map(|&(_, _, h)| h).sum();
    assert_eq!(emitted, 14);
    for &(mb_y, mb_w, mb_h) in &cropped.bands {
        assert_eq!(mb_w, 14);
        assert!(mb_y + mb_h <= 14);
    }

    // The cropped output equals the matching sub-rectangle of the full
    // decode (the filtered region covers the whole frame either way).
    let full = run_pipeline(&desc, DecodeOptions::default(), false, None, synth_mb);
    for r in 0..14 {
        assert_eq!(
            cropped.y[r * 14..r * 14 + 14],
            full.y[(r + 1) * 16 + 1..(r + 1) * 16 + 15],
            "row {r} differs from the full decode"
        );
    }
}

#[test]
fn test_sink_abort_stops_the_pipeline() {
    let desc = descriptor(64, 64, 0, false);
    let cap = run_pipeline(&desc, DecodeOptions::default(), false, Some(1), synth_mb);
    assert_eq!(cap.bands.len(), 1);
    assert!(cap.torn_down);
}

#[test]
fn test_alpha_rows_follow_the_band_positions() {
    let desc = descriptor(32, 32, 20, false);
    let cap = run_pipeline(&desc, DecodeOptions::default(), true, None, synth_mb);
    for row in 0..32 {
        for col in 0..32 {
            assert_eq!(
                cap.a[row * 32 + col],
                row as u8,
                "alpha mismatch at ({row},{col})"
            );
        }
    }
}

#[test]
fn test_alpha_failure_is_a_bitstream_error() {
    let desc = descriptor(32, 32, 0, false);
    let shared = Arc::new(Mutex::new(Capture::default()));
    let mut dec = Vp8FrameDecoder::new(&desc);
    dec.enter_critical(
        CaptureSink::new(shared),
        Some(Box::new(RowIndexAlpha {
            width: 32,
            fail: true,
            buf: Vec::new(),
        })),
        DecodeOptions::default(),
    )
    .unwrap();
    dec.init_frame().unwrap();
    for mb_x in 0..dec.mb_width() {
        dec.mb_data_mut()[mb_x] = synth_mb(mb_x, 0);
    }
    let failed = dec.process_row().is_err() || dec.exit_critical().is_err();
    assert!(failed, "alpha failure must abort the frame");
}
