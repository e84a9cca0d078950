//! Sign-data-hiding coefficient adjustment.
//!
//! With sign data hiding, the sign of the first non-zero coefficient of a
//! sub-block is not coded when the first and last non-zero coefficients are
//! at least [`SIGN_HIDING_THRESHOLD`] scan positions apart. The decoder
//! infers it from the parity of the sub-block's absolute level sum (odd
//! means negative). [`hide_signs`] makes the quantized levels satisfy that
//! rule by moving one level per mismatching sub-block by one, choosing the
//! change with the smallest quantization-error cost.

use crate::error::{EntropyError, Result};
use crate::scan::coeff_index;
use crate::syntax::residual::SIGN_HIDING_THRESHOLD;
use crate::types::ScanOrder;

/// `levelScale[qP % 6]`.
const LEVEL_SCALE: [i64; 6] = [40, 45, 51, 57, 64, 72];

/// Flat scaling-list factor.
const FLAT_SCALE: i64 = 16;

/// Coefficients per 4x4 sub-block.
const SUB_BLOCK_SIZE: usize = 16;

/// Flat-matrix HEVC coefficient scaling for one transform block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseQuantizer {
    scale: i64,
    bd_shift: u32,
}

impl InverseQuantizer {
    /// Create a dequantizer for `qp` (including the bit-depth offset),
    /// transform size `1 << log2_size` and sample `bit_depth`.
    pub fn new(qp: i32, log2_size: u8, bit_depth: u8) -> Self {
        let qp = qp.max(0) as usize;
        Self {
            scale: (FLAT_SCALE * LEVEL_SCALE[qp % 6]) << (qp / 6),
            bd_shift: (bit_depth as u32 + log2_size as u32).saturating_sub(5).max(1),
        }
    }

    /// Scaled transform coefficient of `level`.
    #[inline]
    pub fn dequantize(&self, level: i16) -> i32 {
        let round = 1i64 << (self.bd_shift - 1);
        let value = (level as i64 * self.scale + round) >> self.bd_shift;
        value.clamp(i16::MIN as i64, i16::MAX as i64) as i32
    }
}

/// Adjust `levels` so every eligible sub-block carries its first sign in
/// the level parity.
///
/// All slices are in raster order for a `(1 << log2_size)` square block:
/// `src_coeffs` holds the unquantized transform coefficients and
/// `quant_errors` the per-coefficient rounding error of the quantizer
/// (positive when rounding went towards zero). Returns the change of the
/// transform-domain squared error caused by the adjustments.
pub fn hide_signs(
    levels: &mut [i16],
    log2_size: u8,
    scan: ScanOrder,
    src_coeffs: &[i32],
    quant_errors: &[i32],
    iq: &InverseQuantizer,
) -> Result<i64> {
    if !(2..=5).contains(&log2_size) {
        return Err(EntropyError::syntax(format!(
            "log2 transform size {} out of range",
            log2_size
        )));
    }
    let num_coeffs = 1usize << (2 * log2_size);
    if levels.len() != num_coeffs || src_coeffs.len() != num_coeffs || quant_errors.len() != num_coeffs {
        return Err(EntropyError::syntax(format!(
            "{}x{} block needs {} coefficients, got {}/{}/{}",
            1 << log2_size,
            1 << log2_size,
            num_coeffs,
            levels.len(),
            src_coeffs.len(),
            quant_errors.len()
        )));
    }

    let num_sub_blocks = num_coeffs / SUB_BLOCK_SIZE;
    let mut ssd_delta = 0i64;
    let mut adjusted = 0u32;
    let mut last_sub_block_seen = false;

    for sub_block in (0..num_sub_blocks).rev() {
        let index = |pos: usize| coeff_index(log2_size, scan, sub_block, pos);

        let mut first_nz = None;
        let mut last_nz = None;
        let mut abs_sum = 0u32;
        for pos in 0..SUB_BLOCK_SIZE {
            let level = levels[index(pos)];
            if level != 0 {
                first_nz.get_or_insert(pos);
                last_nz = Some(pos);
                abs_sum += level.unsigned_abs() as u32;
            }
        }
        let (Some(first_nz), Some(last_nz)) = (first_nz, last_nz) else {
            continue;
        };

        // the search of the last coded sub-block starts at its last level
        let start = if last_sub_block_seen {
            SUB_BLOCK_SIZE - 1
        } else {
            last_nz
        };
        last_sub_block_seen = true;

        if last_nz - first_nz < SIGN_HIDING_THRESHOLD {
            continue;
        }
        let sign_bit = levels[index(first_nz)] < 0;
        if sign_bit == (abs_sum & 1 == 1) {
            continue;
        }

        let Some((pos, magnitude_change)) =
            cheapest_change(levels, src_coeffs, quant_errors, &index, start, first_nz, sign_bit)
        else {
            continue;
        };

        let blk = index(pos);
        let old = levels[blk];
        let new = apply_change(old, src_coeffs[blk], magnitude_change);
        levels[blk] = new;

        let src = src_coeffs[blk] as i64;
        let old_err = src - iq.dequantize(old) as i64;
        let new_err = src - iq.dequantize(new) as i64;
        ssd_delta += new_err * new_err - old_err * old_err;
        adjusted += 1;
    }

    if adjusted > 0 {
        tracing::trace!(log2_size, adjusted, ssd_delta, "signs hidden");
    }
    Ok(ssd_delta)
}

/// Scan position and magnitude change (+1 or -1) of the cheapest parity fix
/// in one sub-block.
fn cheapest_change(
    levels: &[i16],
    src_coeffs: &[i32],
    quant_errors: &[i32],
    index: &impl Fn(usize) -> usize,
    start: usize,
    first_nz: usize,
    sign_bit: bool,
) -> Option<(usize, i32)> {
    let mut best: Option<(i64, usize, i32)> = None;

    for pos in (0..=start).rev() {
        let blk = index(pos);
        let q_err = quant_errors[blk] as i64;

        let candidate = if levels[blk] != 0 {
            if q_err > 0 {
                Some((-q_err, 1))
            } else if pos == first_nz && levels[blk].unsigned_abs() == 1 {
                // dropping the only level that carries the hidden sign
                None
            } else {
                Some((q_err, -1))
            }
        } else if pos < first_nz && (src_coeffs[blk] < 0) != sign_bit {
            // a new first level would carry the wrong sign
            None
        } else {
            Some((-q_err, 1))
        };

        if let Some((cost, change)) = candidate {
            match best {
                Some((best_cost, _, _)) if best_cost <= cost => {}
                _ => best = Some((cost, pos, change)),
            }
        }
    }

    best.map(|(_, pos, change)| (pos, change))
}

/// Move `level` by one in the direction of the source coefficient's sign,
/// keeping it inside the 16-bit range.
fn apply_change(level: i16, src: i32, magnitude_change: i32) -> i16 {
    let negative = src < 0;
    let change = if level == i16::MAX || level == i16::MIN {
        -1
    } else {
        magnitude_change
    };
    let value = if negative {
        level as i32 - change
    } else {
        level as i32 + change
    };
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
