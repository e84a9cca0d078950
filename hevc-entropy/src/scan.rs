//! Coefficient scan orders.
//!
//! Transform blocks are scanned in 4x4 sub-blocks: the sub-blocks follow
//! the chosen scan over the sub-block grid, and the 16 positions inside
//! each sub-block follow the same scan over a 4x4 grid.

use std::sync::LazyLock;

use crate::types::ScanOrder;

/// Scans for grids of 1x1 up to 8x8, indexed by `[scan][log2_size]`.
static SCANS: LazyLock<[[Vec<(u8, u8)>; 4]; 3]> = LazyLock::new(|| {
    let build = |scan: ScanOrder| -> [Vec<(u8, u8)>; 4] {
        std::array::from_fn(|log2| build_scan(1 << log2, scan))
    };
    [
        build(ScanOrder::Diagonal),
        build(ScanOrder::Horizontal),
        build(ScanOrder::Vertical),
    ]
});

fn build_scan(size: usize, scan: ScanOrder) -> Vec<(u8, u8)> {
    let mut out = Vec::with_capacity(size * size);
    match scan {
        ScanOrder::Diagonal => {
            let (mut x, mut y) = (0usize, 0isize);
            while out.len() < size * size {
                while y >= 0 {
                    if x < size && (y as usize) < size {
                        out.push((x as u8, y as u8));
                    }
                    y -= 1;
                    x += 1;
                }
                y = x as isize;
                x = 0;
            }
        }
        ScanOrder::Horizontal => {
            for i in 0..size * size {
                out.push(((i % size) as u8, (i / size) as u8));
            }
        }
        ScanOrder::Vertical => {
            for i in 0..size * size {
                out.push(((i / size) as u8, (i % size) as u8));
            }
        }
    }
    out
}

/// Scan of a `(1 << log2_size)` square grid, `log2_size` in 0..=3.
pub fn scan_positions(log2_size: u8, scan: ScanOrder) -> &'static [(u8, u8)] {
    &SCANS[scan as usize][log2_size as usize]
}

/// Raster index of scan position `pos` (0..16) in sub-block `sub_block` of
/// a `(1 << log2_size)` transform block.
#[inline]
pub fn coeff_index(log2_size: u8, scan: ScanOrder, sub_block: usize, pos: usize) -> usize {
    let (xs, ys) = scan_positions(log2_size - 2, scan)[sub_block];
    let (xp, yp) = scan_positions(2, scan)[pos];
    let x = ((xs as usize) << 2) + xp as usize;
    let y = ((ys as usize) << 2) + yp as usize;
    (y << log2_size) + x
}
