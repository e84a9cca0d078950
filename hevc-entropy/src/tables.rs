//! Constant tables of the arithmetic coder.

/// Next state after coding the most probable symbol.
pub const NEXT_STATE_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

/// Next state after coding the least probable symbol.
pub const NEXT_STATE_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// LPS sub-range, indexed by state and `(range >> 6) & 3`.
pub const RANGE_TAB_LPS: [[u8; 4]; 64] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
    [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
    [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
    [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
    [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
    [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [29, 35, 41, 48],
    [27, 33, 39, 45], [26, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
    [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
    [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
    [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
    [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
    [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
    [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
    [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];

/// Fractional bits per bin in Q12, indexed by state as `[mps_cost, lps_cost]`.
///
/// Entry `s` is `-log2(p)` scaled by 4096, with `p` the probability the
/// state models for the respective symbol.
pub const BIN_COST_Q12: [[u16; 2]; 64] = [
    [4096, 4096], [3803, 4404], [3538, 4712], [3297, 5020],
    [3077, 5328], [2876, 5636], [2690, 5944], [2520, 6252],
    [2362, 6560], [2217, 6868], [2082, 7176], [1956, 7484],
    [1840, 7792], [1731, 8100], [1630, 8408], [1535, 8716],
    [1447, 9024], [1364, 9332], [1287, 9640], [1214, 9948],
    [1146, 10256], [1082, 10564], [1022, 10872], [966, 11179],
    [913, 11487], [863, 11795], [816, 12103], [772, 12411],
    [730, 12719], [691, 13027], [654, 13335], [619, 13643],
    [586, 13951], [554, 14259], [525, 14567], [497, 14875],
    [471, 15183], [446, 15491], [423, 15799], [400, 16107],
    [379, 16415], [359, 16723], [341, 17031], [323, 17339],
    [306, 17647], [290, 17955], [275, 18263], [261, 18571],
    [247, 18879], [234, 19187], [222, 19495], [211, 19803],
    [200, 20111], [190, 20419], [180, 20727], [171, 21035],
    [162, 21343], [153, 21651], [146, 21959], [138, 22267],
    [131, 22575], [124, 22883], [118, 23191], [112, 23499],
];

/// Cost of one bypass bin in Q12.
pub const BYPASS_COST_Q12: u32 = 1 << Q12_SHIFT;

/// Fixed-point shift of the fractional bit costs.
pub const Q12_SHIFT: u32 = 12;

/// Cost in Q12 of coding `bin` with a context in packed form `(state << 1) | mps`.
#[inline]
pub fn bin_cost_q12(packed: u8, bin: u32) -> u32 {
    let state = (packed >> 1) as usize;
    let mps = (packed & 1) as u32;
    BIN_COST_Q12[state][(bin != mps) as usize] as u32
}

/// Cost in Q12 of an end-of-slice style terminate bin.
#[inline]
pub fn terminate_cost_q12(bin: u32) -> u32 {
    BIN_COST_Q12[62][(bin != 0) as usize] as u32
}

/// Round a Q12 cost to whole bits.
#[inline]
pub fn q12_to_bits(q12: u64) -> u64 {
    (q12 + (1 << (Q12_SHIFT - 1))) >> Q12_SHIFT
}
