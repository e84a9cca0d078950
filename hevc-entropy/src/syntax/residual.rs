//! `residual_coding`: last position, sub-block flags, significance map,
//! level flags, signs and remaining levels.

use crate::binarization::Binarization;
use crate::cabac::BinEncoder;
use crate::config::EntropyConfig;
use crate::context::ctx;
use crate::error::{EntropyError, Result};
use crate::scan::{coeff_index, scan_positions};
use crate::types::{Component, ScanOrder};

/// Context increments of `sig_coeff_flag` in a 4x4 block, by raster position.
const CTX_IDX_MAP_4X4: [u8; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];

/// Prefix group of a last-position coordinate.
const GROUP_IDX: [u8; 32] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];

/// Smallest coordinate of each prefix group.
const MIN_IN_GROUP: [u8; 10] = [0, 1, 2, 3, 4, 6, 8, 12, 16, 24];

/// Sign hiding needs this scan distance between the first and last level.
pub const SIGN_HIDING_THRESHOLD: usize = 4;

/// Maximum `coeff_abs_level_greater1_flag`s per sub-block.
const MAX_GREATER1_FLAGS: usize = 8;

/// Coding options of one transform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidualOptions {
    /// log2 of the block size (2..=5).
    pub log2_size: u8,
    /// Colour component.
    pub component: Component,
    /// Coefficient scan.
    pub scan: ScanOrder,
    /// `transform_skip_flag` value.
    pub transform_skip: bool,
    /// `cu_transquant_bypass_flag` of the CU.
    pub tq_bypass: bool,
}

impl ResidualOptions {
    /// Options for a regular transformed block.
    pub fn new(log2_size: u8, component: Component, scan: ScanOrder) -> Self {
        Self {
            log2_size,
            component,
            scan,
            transform_skip: false,
            tq_bypass: false,
        }
    }
}

/// Encode `residual_coding` for raster-order `coeffs`.
pub fn encode_residual<E: BinEncoder + ?Sized>(
    enc: &mut E,
    config: &EntropyConfig,
    coeffs: &[i16],
    opts: &ResidualOptions,
) -> Result<()> {
    let log2_size = opts.log2_size;
    if !(2..=5).contains(&log2_size) || coeffs.len() != 1 << (2 * log2_size) {
        return Err(EntropyError::syntax(format!(
            "{} coefficients for a {}x{} block",
            coeffs.len(),
            1 << log2_size,
            1 << log2_size
        )));
    }
    let chroma = opts.component.is_chroma();

    if config.transform_skip_enabled && !opts.tq_bypass && log2_size == 2 {
        let ctx_idx = if chroma {
            ctx::TRANSFORM_SKIP_CHROMA
        } else {
            ctx::TRANSFORM_SKIP_LUMA
        };
        enc.encode_bin(opts.transform_skip as u32, ctx_idx)?;
    } else if opts.transform_skip {
        return Err(EntropyError::syntax("transform_skip_flag not allowed for this block"));
    }

    let log2_sb = log2_size - 2;
    let sb_width = 1usize << log2_sb;
    let num_sb = sb_width * sb_width;
    let sb_scan = scan_positions(log2_sb, opts.scan);

    // coded sub-block flags by sub-block raster index
    let mut csbf = [false; 64];
    let mut last = None;
    for i in 0..num_sb {
        for n in 0..16 {
            if coeffs[coeff_index(log2_size, opts.scan, i, n)] != 0 {
                let (xs, ys) = sb_scan[i];
                csbf[ys as usize * sb_width + xs as usize] = true;
                last = Some((i, n));
            }
        }
    }
    let Some((last_sb, last_pos)) = last else {
        return Err(EntropyError::syntax("residual block without a non-zero coefficient"));
    };

    let last_index = coeff_index(log2_size, opts.scan, last_sb, last_pos);
    let last_x = (last_index & ((1 << log2_size) - 1)) as u32;
    let last_y = (last_index >> log2_size) as u32;
    encode_last_position(enc, last_x, last_y, opts)?;

    let pos_scan = scan_positions(2, opts.scan);
    let sign_hiding = config.sign_data_hiding_enabled && !opts.tq_bypass;
    let mut greater1_ctx = 1u32;

    for i in (0..=last_sb).rev() {
        let (xs, ys) = (sb_scan[i].0 as usize, sb_scan[i].1 as usize);
        let right = xs + 1 < sb_width && csbf[ys * sb_width + xs + 1];
        let below = ys + 1 < sb_width && csbf[(ys + 1) * sb_width + xs];
        let coded = csbf[ys * sb_width + xs];

        let mut infer_dc = false;
        if i < last_sb && i > 0 {
            let ctx_inc = (right || below) as usize + if chroma { 2 } else { 0 };
            enc.encode_bin(coded as u32, ctx::CODED_SUB_BLOCK + ctx_inc)?;
            infer_dc = true;
        }

        let mut levels = [0i32; 16];
        for (n, level) in levels.iter_mut().enumerate() {
            *level = coeffs[coeff_index(log2_size, opts.scan, i, n)] as i32;
        }

        // significance map
        let prev_csbf = right as u32 | ((below as u32) << 1);
        let first_n = if i == last_sb { last_pos } else { 16 };
        if coded || i == 0 {
            for n in (0..first_n).rev() {
                if n == 0 && infer_dc {
                    break;
                }
                let sig = levels[n] != 0;
                let (xp, yp) = pos_scan[n];
                let xc = ((xs as u32) << 2) + xp as u32;
                let yc = ((ys as u32) << 2) + yp as u32;
                let ctx_inc = sig_ctx_inc(xc, yc, prev_csbf, log2_size, opts.component, opts.scan);
                enc.encode_bin(sig as u32, ctx::SIG_COEFF + ctx_inc)?;
                if sig {
                    infer_dc = false;
                }
            }
        }

        // scan positions of non-zero levels, highest first
        let mut sig_pos = [0usize; 16];
        let mut num_sig = 0;
        for n in (0..16).rev() {
            if levels[n] != 0 {
                sig_pos[num_sig] = n;
                num_sig += 1;
            }
        }
        if num_sig == 0 {
            continue;
        }
        let sig_pos = &sig_pos[..num_sig];

        let mut ctx_set = if i > 0 && !chroma { 2 } else { 0 };
        if greater1_ctx == 0 {
            ctx_set += 1;
        }
        greater1_ctx = 1;

        let mut first_greater1 = None;
        for (k, &n) in sig_pos.iter().take(MAX_GREATER1_FLAGS).enumerate() {
            let greater1 = levels[n].unsigned_abs() > 1;
            let ctx_inc = ctx_set * 4 + greater1_ctx.min(3) as usize + if chroma { 16 } else { 0 };
            enc.encode_bin(greater1 as u32, ctx::GREATER1 + ctx_inc)?;

            if greater1 {
                greater1_ctx = 0;
                if first_greater1.is_none() {
                    first_greater1 = Some(k);
                }
            } else if greater1_ctx > 0 && greater1_ctx < 3 {
                greater1_ctx += 1;
            }
        }

        if let Some(k) = first_greater1 {
            let greater2 = levels[sig_pos[k]].unsigned_abs() > 2;
            let ctx_inc = ctx_set + if chroma { 4 } else { 0 };
            enc.encode_bin(greater2 as u32, ctx::GREATER2 + ctx_inc)?;
        }

        let sign_hidden =
            sign_hiding && sig_pos[0] - sig_pos[num_sig - 1] >= SIGN_HIDING_THRESHOLD;
        let coded_signs = if sign_hidden { num_sig - 1 } else { num_sig };
        let mut sign_bins = 0u32;
        for &n in &sig_pos[..coded_signs] {
            sign_bins = (sign_bins << 1) | (levels[n] < 0) as u32;
        }
        enc.encode_bypass_bins(sign_bins, coded_signs as u32)?;

        let mut rice = 0u32;
        for (k, &n) in sig_pos.iter().enumerate() {
            let abs = levels[n].unsigned_abs();
            let base = if k < MAX_GREATER1_FLAGS {
                if first_greater1 == Some(k) {
                    3
                } else {
                    2
                }
            } else {
                1
            };
            if abs >= base {
                enc.encode_coeff_abs_level_remaining(abs - base, rice)?;
                if abs > 3 << rice {
                    rice = (rice + 1).min(4);
                }
            }
        }
    }

    Ok(())
}

/// Encode `last_sig_coeff_{x,y}_{prefix,suffix}`.
fn encode_last_position<E: BinEncoder + ?Sized>(
    enc: &mut E,
    last_x: u32,
    last_y: u32,
    opts: &ResidualOptions,
) -> Result<()> {
    let log2_size = opts.log2_size as u32;
    let (x, y) = if opts.scan == ScanOrder::Vertical {
        (last_y, last_x)
    } else {
        (last_x, last_y)
    };

    let (offset, shift) = if opts.component.is_chroma() {
        (15, log2_size - 2)
    } else {
        (3 * (log2_size - 2) + ((log2_size - 1) >> 2), (log2_size + 1) >> 2)
    };
    let c_max = (log2_size << 1) - 1;

    let prefix_x = GROUP_IDX[x as usize] as u32;
    let prefix_y = GROUP_IDX[y as usize] as u32;
    enc.encode_tunary(prefix_x, c_max, ctx::LAST_X_PREFIX + offset as usize, shift, usize::MAX)?;
    enc.encode_tunary(prefix_y, c_max, ctx::LAST_Y_PREFIX + offset as usize, shift, usize::MAX)?;

    for (value, prefix) in [(x, prefix_x), (y, prefix_y)] {
        if prefix > 3 {
            let suffix = value - MIN_IN_GROUP[prefix as usize] as u32;
            enc.encode_bypass_bins(suffix, (prefix >> 1) - 1)?;
        }
    }
    Ok(())
}

/// `sig_coeff_flag` context increment for the coefficient at `(xc, yc)`.
///
/// `prev_csbf` holds the right (bit 0) and lower (bit 1) coded sub-block
/// flags of the enclosing sub-block.
pub fn sig_ctx_inc(
    xc: u32,
    yc: u32,
    prev_csbf: u32,
    log2_size: u8,
    component: Component,
    scan: ScanOrder,
) -> usize {
    let chroma = component.is_chroma();
    let sig_ctx = if log2_size == 2 {
        CTX_IDX_MAP_4X4[((yc << 2) + xc) as usize] as usize
    } else if xc + yc == 0 {
        0
    } else {
        let (xp, yp) = (xc & 3, yc & 3);
        let mut sig = match prev_csbf {
            0 => match xp + yp {
                0 => 2,
                1 | 2 => 1,
                _ => 0,
            },
            1 => match yp {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            2 => match xp {
                0 => 2,
                1 => 1,
                _ => 0,
            },
            _ => 2,
        };

        if !chroma {
            if (xc >> 2) + (yc >> 2) > 0 {
                sig += 3;
            }
            if log2_size == 3 {
                sig += if scan == ScanOrder::Diagonal { 9 } else { 15 };
            } else {
                sig += 21;
            }
        } else if log2_size == 3 {
            sig += 9;
        } else {
            sig += 12;
        }
        sig
    };

    if chroma {
        27 + sig_ctx
    } else {
        sig_ctx
    }
}

/// Fixed-length part of a last-position coordinate: `(prefix, suffix_len)`.
pub fn last_position_prefix(coord: u32) -> (u32, u32) {
    let prefix = GROUP_IDX[coord as usize] as u32;
    let suffix_len = if prefix > 3 { (prefix >> 1) - 1 } else { 0 };
    (prefix, suffix_len)
}
