//! `sao` syntax of one CTB.

use crate::binarization::Binarization;
use crate::cabac::BinEncoder;
use crate::context::ctx;
use crate::error::{EntropyError, Result};
use crate::syntax::cursor::{CtbNeighbours, FrameContext};
use crate::types::{SaoComponent, SaoParams, SaoType};

/// Bits of `sao_band_position`.
const BAND_POSITION_BITS: u32 = 5;

/// Largest SAO offset magnitude for a bit depth.
pub fn sao_offset_max(bit_depth: u8) -> u32 {
    (1 << (bit_depth.min(10) - 5)) - 1
}

/// Encode SAO parameters for the CTB described by `ctb`.
pub fn encode_sao<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    ctb: &CtbNeighbours,
    sao: &SaoParams,
) -> Result<()> {
    let config = frame.config;
    let slice = frame.slice;

    if sao.merge_left && !ctb.left_available {
        return Err(EntropyError::syntax("sao_merge_left_flag without a left CTB"));
    }
    if sao.merge_up && !(ctb.top_available && !sao.merge_left) {
        return Err(EntropyError::syntax("sao_merge_up_flag cannot be signalled"));
    }

    if ctb.left_available {
        enc.encode_bin(sao.merge_left as u32, ctx::SAO_MERGE)?;
        if sao.merge_left {
            return Ok(());
        }
    }
    if ctb.top_available {
        enc.encode_bin(sao.merge_up as u32, ctx::SAO_MERGE)?;
        if sao.merge_up {
            return Ok(());
        }
    }

    for (c_idx, comp) in sao.components.iter().enumerate() {
        let enabled = if c_idx == 0 { slice.sao_luma } else { slice.sao_chroma };
        if !enabled {
            continue;
        }

        if c_idx == 2 {
            let cb = &sao.components[1];
            if comp.type_idx != cb.type_idx || (cb.type_idx == SaoType::Edge && comp.eo_class != cb.eo_class) {
                return Err(EntropyError::syntax("Cr shares the SAO type and edge class of Cb"));
            }
        } else {
            encode_sao_type(enc, comp.type_idx)?;
        }

        if comp.type_idx == SaoType::Off {
            continue;
        }

        let bit_depth = if c_idx == 0 {
            config.bit_depth_luma
        } else {
            config.bit_depth_chroma
        };
        encode_sao_offsets(enc, comp, c_idx, sao_offset_max(bit_depth))?;
    }
    Ok(())
}

fn encode_sao_type<E: BinEncoder + ?Sized>(enc: &mut E, type_idx: SaoType) -> Result<()> {
    match type_idx {
        SaoType::Off => enc.encode_bin(0, ctx::SAO_TYPE),
        SaoType::Band => {
            enc.encode_bin(1, ctx::SAO_TYPE)?;
            enc.encode_bypass_bin(0)
        }
        SaoType::Edge => {
            enc.encode_bin(1, ctx::SAO_TYPE)?;
            enc.encode_bypass_bin(1)
        }
    }
}

fn encode_sao_offsets<E: BinEncoder + ?Sized>(
    enc: &mut E,
    comp: &SaoComponent,
    c_idx: usize,
    offset_max: u32,
) -> Result<()> {
    for &offset in &comp.offsets {
        let abs = offset.unsigned_abs() as u32;
        if abs > offset_max {
            return Err(EntropyError::syntax(format!(
                "SAO offset {} exceeds {}",
                offset, offset_max
            )));
        }
        enc.encode_tunary_bypass(abs, offset_max)?;
    }

    match comp.type_idx {
        SaoType::Band => {
            for &offset in comp.offsets.iter().filter(|&&o| o != 0) {
                enc.encode_bypass_bin((offset < 0) as u32)?;
            }
            if comp.band_position > 31 {
                return Err(EntropyError::syntax("sao_band_position > 31"));
            }
            enc.encode_bypass_bins(comp.band_position as u32, BAND_POSITION_BITS)
        }
        SaoType::Edge => {
            if comp.eo_class > 3 {
                return Err(EntropyError::syntax("sao_eo_class > 3"));
            }
            if c_idx < 2 {
                enc.encode_bypass_bins(comp.eo_class as u32, 2)?;
            }
            Ok(())
        }
        SaoType::Off => Ok(()),
    }
}
