//! Resampling and mixing kernels.
//!
//! A kernel mixes one run of frames from a sample slice into the stereo
//! accumulator. Every combination of sample width, channel count,
//! interpolation, filter and ramping is a separate monomorphised function;
//! the mixer picks one from a static table instead of branching per frame.
//!
//! Positions are 16.16 fixed point relative to the first frame of the slice
//! handed to the kernel. The caller guarantees that the interpolation taps
//! around every visited position fall inside the slice; anything outside
//! reads as silence.

use crate::config::Interpolation;
use crate::filter::Filter;
use crate::tables::{
    MixTables, SPLINE_16SHIFT, SPLINE_8SHIFT, SPLINE_FRACMASK, SPLINE_FRACSHIFT, WFIR_8SHIFT,
    WFIR_FRACHALVE, WFIR_FRACMASK, WFIR_FRACSHIFT, WFIR_WIDTH,
};

/// Fractional bits of the ramp accumulators.
pub const VOLUME_RAMP_PRECISION: u32 = 12;

/// Per-voice state the kernels read and update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MixState {
    /// 16.16 position
    pub position: i64,
    /// 16.16 step per output frame, negative when playing backwards
    pub increment: i32,
    pub left_vol: i32,
    pub right_vol: i32,
    /// Per-frame ramp step, `VOLUME_RAMP_PRECISION` fractional bits
    pub left_ramp: i32,
    pub right_ramp: i32,
    /// Ramp accumulators, `VOLUME_RAMP_PRECISION` fractional bits
    pub left_ramp_volume: i32,
    pub right_ramp_volume: i32,
    pub filter: Filter,
    /// Largest absolute interpolated value seen since the last reset (16-bit scale)
    pub vu_peak: i32,
}

impl MixState {
    pub fn is_ramping(&self) -> bool {
        self.left_ramp != 0 || self.right_ramp != 0
    }
}

/// PCM sample widths the kernels can read.
pub trait PcmSample: Copy + Default + 'static {
    /// True for 8-bit data, which is scaled up during interpolation.
    const IS_8BIT: bool;

    fn to_i32(self) -> i32;

    /// Kernel table for this width.
    fn kernels() -> &'static KernelTable<Self>;
}

impl PcmSample for i8 {
    const IS_8BIT: bool = true;

    #[inline(always)]
    fn to_i32(self) -> i32 {
        self as i32
    }

    fn kernels() -> &'static KernelTable<Self> {
        &KERNELS_8
    }
}

impl PcmSample for i16 {
    const IS_8BIT: bool = false;

    #[inline(always)]
    fn to_i32(self) -> i32 {
        self as i32
    }

    fn kernels() -> &'static KernelTable<Self> {
        &KERNELS_16
    }
}

/// Signature shared by every kernel: state, source slice, interleaved stereo output, tables.
pub type MixFn<T> = fn(&mut MixState, &[T], &mut [i32], &MixTables);

/// `[stereo][interpolation][filter][ramp]`
pub type KernelTable<T> = [[[[MixFn<T>; 2]; 2]; 4]; 2];

/// Look up the kernel for a run.
pub fn kernel_for<T: PcmSample>(
    stereo: bool,
    interpolation: Interpolation,
    filter: bool,
    ramp: bool,
) -> MixFn<T> {
    T::kernels()[stereo as usize][interpolation as usize][filter as usize][ramp as usize]
}

#[inline(always)]
fn tap<T: PcmSample, const STEREO: bool>(data: &[T], frame: i64, channel: usize) -> i32 {
    let stride = if STEREO { 2 } else { 1 };
    usize::try_from(frame)
        .ok()
        .and_then(|f| data.get(f * stride + channel))
        .map_or(0, |v| v.to_i32())
}

/// Interpolated value at `frame + frac / 65536`, on a 16-bit scale.
#[inline(always)]
fn interpolate<T: PcmSample, const STEREO: bool, const INTERP: u8>(
    data: &[T],
    frame: i64,
    frac: u32,
    channel: usize,
    tables: &MixTables,
) -> i32 {
    let p = |k: i64| tap::<T, STEREO>(data, frame + k, channel);
    match INTERP {
        0 => {
            if T::IS_8BIT {
                p(0) << 8
            } else {
                p(0)
            }
        }
        1 => {
            let f = (frac >> 8) as i32;
            let (a, b) = (p(0), p(1));
            if T::IS_8BIT {
                (a << 8) + f * (b - a)
            } else {
                a + ((f * (b - a)) >> 8)
            }
        }
        2 => {
            let i = ((frac >> SPLINE_FRACSHIFT) & SPLINE_FRACMASK) as usize;
            let c = &tables.spline[i..i + 4];
            let sum = c[0] as i64 * p(-1) as i64
                + c[1] as i64 * p(0) as i64
                + c[2] as i64 * p(1) as i64
                + c[3] as i64 * p(2) as i64;
            if T::IS_8BIT {
                (sum >> SPLINE_8SHIFT) as i32
            } else {
                (sum >> SPLINE_16SHIFT) as i32
            }
        }
        _ => {
            let i = (((frac + WFIR_FRACHALVE) >> WFIR_FRACSHIFT) & WFIR_FRACMASK) as usize;
            let c = &tables.fir[i..i + WFIR_WIDTH];
            let mut lo = 0i64;
            let mut hi = 0i64;
            for k in 0..WFIR_WIDTH / 2 {
                lo += c[k] as i64 * p(k as i64 - 3) as i64;
                hi += c[k + 4] as i64 * p(k as i64 + 1) as i64;
            }
            if T::IS_8BIT {
                ((lo + hi) >> WFIR_8SHIFT) as i32
            } else {
                (((lo >> 1) + (hi >> 1)) >> 14) as i32
            }
        }
    }
}

/// Mix `out.len() / 2` frames from `data` into `out`.
pub fn mix_run<T: PcmSample, const STEREO: bool, const INTERP: u8, const FILTER: bool, const RAMP: bool>(
    state: &mut MixState,
    data: &[T],
    out: &mut [i32],
    tables: &MixTables,
) {
    let mut peak = state.vu_peak;
    for frame in out.chunks_exact_mut(2) {
        let idx = state.position >> 16;
        let frac = (state.position & 0xFFFF) as u32;

        let mut l = interpolate::<T, STEREO, INTERP>(data, idx, frac, 0, tables);
        let mut r = if STEREO { interpolate::<T, STEREO, INTERP>(data, idx, frac, 1, tables) } else { l };
        if FILTER {
            l = state.filter.apply(l, 0);
            r = if STEREO { state.filter.apply(r, 1) } else { l };
        }
        peak = peak.max(l.saturating_abs()).max(r.saturating_abs());

        let (lv, rv) = if RAMP {
            state.left_ramp_volume = state.left_ramp_volume.wrapping_add(state.left_ramp);
            state.right_ramp_volume = state.right_ramp_volume.wrapping_add(state.right_ramp);
            (
                state.left_ramp_volume >> VOLUME_RAMP_PRECISION,
                state.right_ramp_volume >> VOLUME_RAMP_PRECISION,
            )
        } else {
            (state.left_vol, state.right_vol)
        };
        frame[0] = frame[0].saturating_add(l.saturating_mul(lv));
        frame[1] = frame[1].saturating_add(r.saturating_mul(rv));

        state.position += state.increment as i64;
    }
    if RAMP {
        state.left_vol = state.left_ramp_volume >> VOLUME_RAMP_PRECISION;
        state.right_vol = state.right_ramp_volume >> VOLUME_RAMP_PRECISION;
    }
    state.vu_peak = peak;
}

macro_rules! kernel_pair {
    ($t:ty, $stereo:tt, $interp:tt, $filter:tt) => {
        [
            mix_run::<$t, $stereo, $interp, $filter, false>,
            mix_run::<$t, $stereo, $interp, $filter, true>,
        ]
    };
}

macro_rules! kernel_interp {
    ($t:ty, $stereo:tt, $interp:tt) => {
        [kernel_pair!($t, $stereo, $interp, false), kernel_pair!($t, $stereo, $interp, true)]
    };
}

macro_rules! kernel_table {
    ($t:ty) => {
        [
            [
                kernel_interp!($t, false, 0),
                kernel_interp!($t, false, 1),
                kernel_interp!($t, false, 2),
                kernel_interp!($t, false, 3),
            ],
            [
                kernel_interp!($t, true, 0),
                kernel_interp!($t, true, 1),
                kernel_interp!($t, true, 2),
                kernel_interp!($t, true, 3),
            ],
        ]
    };
}

pub static KERNELS_8: KernelTable<i8> = kernel_table!(i8);
pub static KERNELS_16: KernelTable<i16> = kernel_table!(i16);
