//! `coding_quadtree`: split flags and Z-order traversal of one CTB.

use crate::cabac::BinEncoder;
use crate::context::ctx;
use crate::error::{EntropyError, Result};
use crate::syntax::cu_pu::encode_coding_unit;
use crate::syntax::cursor::{FrameContext, TraversalState};
use crate::types::CodingUnit;

/// Encode the coding quadtree of the current CTB.
///
/// `cus` lists the leaf CUs in Z order. The neighbour maps must already
/// point at the CTB (see [`crate::syntax::cursor::NeighbourMaps::start_ctb`]).
pub fn encode_coding_quadtree<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    state: &mut TraversalState,
    cus: &[CodingUnit],
) -> Result<()> {
    let mut next = 0;
    quadtree_node(enc, frame, state, cus, &mut next, 0, 0, frame.config.log2_ctb_size, 0)?;
    if next != cus.len() {
        return Err(EntropyError::syntax(format!(
            "{} CUs left over after the coding quadtree",
            cus.len() - next
        )));
    }
    Ok(())
}

/// `split_cu_flag` value, or `None` when the flag is coded.
fn inferred_split(frame: &FrameContext<'_>, inside: bool, log2_size: u8) -> Option<bool> {
    let min = frame.config.log2_min_cb_size;
    if inside && log2_size > min {
        None
    } else {
        Some(log2_size > min)
    }
}

#[allow(clippy::too_many_arguments)]
fn quadtree_node<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    state: &mut TraversalState,
    cus: &[CodingUnit],
    next: &mut usize,
    x: u32,
    y: u32,
    log2_size: u8,
    depth: u8,
) -> Result<()> {
    let config = frame.config;
    let (ctb_x, ctb_y) = state.maps.ctb().origin(config.log2_ctb_size);
    let size = 1u32 << log2_size;
    let inside = ctb_x + x + size <= config.width && ctb_y + y + size <= config.height;

    let cu = cus.get(*next).ok_or_else(|| {
        EntropyError::syntax(format!("No CU left for the node at ({}, {})", x, y))
    })?;
    if (cu.x, cu.y) != (x, y) || cu.log2_size > log2_size {
        return Err(EntropyError::syntax(format!(
            "CU {}x{} at ({}, {}) does not match the node {}x{} at ({}, {})",
            1 << cu.log2_size,
            1 << cu.log2_size,
            cu.x,
            cu.y,
            size,
            size,
            x,
            y
        )));
    }
    let split = cu.log2_size < log2_size;

    match inferred_split(frame, inside, log2_size) {
        None => {
            let ctx_inc = state.maps.split_ctx_inc(x, y, depth);
            enc.encode_bin(split as u32, ctx::SPLIT_CU_FLAG + ctx_inc)?;
        }
        Some(inferred) if inferred != split => {
            return Err(EntropyError::syntax(format!(
                "split_cu_flag is inferred {} for the {}x{} node at ({}, {})",
                inferred as u8, size, size, x, y
            )));
        }
        Some(_) => {}
    }

    if state.qp.opens_group(log2_size) {
        state.qp.start_quant_group(x, y);
    }

    if split {
        let half = size >> 1;
        for i in 0..4 {
            let cx = x + (i & 1) * half;
            let cy = y + (i >> 1) * half;
            if ctb_x + cx < config.width && ctb_y + cy < config.height {
                quadtree_node(enc, frame, state, cus, next, cx, cy, log2_size - 1, depth + 1)?;
            }
        }
        Ok(())
    } else {
        *next += 1;
        encode_coding_unit(enc, frame, state, cu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cabac::{BinKind, BinRecorder};
    use crate::config::{EntropyConfig, SliceParams};
    use crate::context::ContextTable;
    use crate::types::SliceType;

    fn run(config: &EntropyConfig, ctb_addr: u32, cus: &[CodingUnit]) -> Result<BinRecorder> {
        let slice = SliceParams::new(SliceType::P, 32);
        let frame = FrameContext::new(config, &slice);
        let mut state = TraversalState::new(config, &slice);
        state.maps.start_ctb(frame.ctb_neighbours(ctb_addr));
        let mut rec = BinRecorder::new(ContextTable::initial(1, 32));
        encode_coding_quadtree(&mut rec, &frame, &mut state, cus)?;
        Ok(rec)
    }

    #[test]
    fn test_single_skip_ctb() {
        let config = EntropyConfig::new(64, 64);
        let rec = run(&config, 0, &[CodingUnit::skip(0, 0, 6, 0, 32)]).unwrap();
        let bins: Vec<_> = rec.bins().iter().map(|b| (b.kind, b.bin)).collect();
        assert_eq!(
            bins,
            vec![
                (BinKind::Context(ctx::SPLIT_CU_FLAG), 0),
                (BinKind::Context(ctx::SKIP_FLAG), 1),
                (BinKind::Context(ctx::MERGE_IDX), 0),
            ]
        );
    }

    #[test]
    fn test_split_context_from_neighbours() {
        let config = EntropyConfig::new(64, 64);
        let cus = [
            CodingUnit::skip(0, 0, 5, 0, 32),
            CodingUnit::skip(32, 0, 5, 0, 32),
            CodingUnit::skip(0, 32, 4, 0, 32),
            CodingUnit::skip(16, 32, 4, 0, 32),
            CodingUnit::skip(0, 48, 4, 0, 32),
            CodingUnit::skip(16, 48, 4, 0, 32),
            CodingUnit::skip(32, 32, 5, 0, 32),
        ];
        let rec = run(&config, 0, &cus).unwrap();
        let splits: Vec<_> = rec
            .bins()
            .iter()
            .filter_map(|b| match b.kind {
                BinKind::Context(c) if (ctx::SPLIT_CU_FLAG..ctx::SPLIT_CU_FLAG + 3).contains(&c) => {
                    Some((c - ctx::SPLIT_CU_FLAG, b.bin))
                }
                _ => None,
            })
            .collect();
        // only the last 32x32 node has a deeper neighbour (on its left)
        assert_eq!(
            splits,
            vec![(0, 1), (0, 0), (0, 0), (0, 1), (0, 0), (0, 0), (0, 0), (0, 0), (1, 0)]
        );
    }

    #[test]
    fn test_partial_ctb_at_picture_edge() {
        // 96x72: the second CTB column is 32 wide, the second row 8 high
        let config = EntropyConfig::new(96, 72);
        let cus = [
            CodingUnit::skip(0, 0, 5, 0, 32),
            CodingUnit::skip(0, 32, 5, 0, 32),
        ];
        let rec = run(&config, 1, &cus).unwrap();
        // 64 and 32x32 nodes at the edge are split implicitly; the
        // 32x32 nodes inside the picture code their flag
        let coded_splits = rec
            .bins()
            .iter()
            .filter(|b| matches!(b.kind, BinKind::Context(c) if (ctx::SPLIT_CU_FLAG..ctx::SPLIT_CU_FLAG + 3).contains(&c)))
            .count();
        assert_eq!(coded_splits, 2);

        let bottom = [
            CodingUnit::skip(0, 0, 3, 0, 32),
            CodingUnit::skip(8, 0, 3, 0, 32),
            CodingUnit::skip(16, 0, 3, 0, 32),
            CodingUnit::skip(24, 0, 3, 0, 32),
            CodingUnit::skip(32, 0, 3, 0, 32),
            CodingUnit::skip(40, 0, 3, 0, 32),
            CodingUnit::skip(48, 0, 3, 0, 32),
            CodingUnit::skip(56, 0, 3, 0, 32),
        ];
        let rec = run(&config, 2, &bottom).unwrap();
        let skips = rec
            .bins()
            .iter()
            .filter(|b| matches!(b.kind, BinKind::Context(c) if (ctx::SKIP_FLAG..ctx::SKIP_FLAG + 3).contains(&c)))
            .count();
        assert_eq!(skips, 8);
    }

    #[test]
    fn test_malformed_cu_lists() {
        let config = EntropyConfig::new(64, 64);
        // out of Z order
        let cus = [
            CodingUnit::skip(32, 0, 5, 0, 32),
            CodingUnit::skip(0, 0, 5, 0, 32),
            CodingUnit::skip(0, 32, 5, 0, 32),
            CodingUnit::skip(32, 32, 5, 0, 32),
        ];
        assert!(run(&config, 0, &cus).is_err());
        // missing CUs
        assert!(run(&config, 0, &cus[..0]).is_err());
        // extra CUs
        let extra = [CodingUnit::skip(0, 0, 6, 0, 32), CodingUnit::skip(0, 0, 6, 0, 32)];
        assert!(run(&config, 0, &extra).is_err());
    }
}
