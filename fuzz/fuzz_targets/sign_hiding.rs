#![no_main]

//! Fuzz target for sign data hiding.
//!
//! Arbitrary levels and quantization errors must never panic, and every
//! level may move by at most one.

use arbitrary::Arbitrary;
use hevc_entropy::{hide_signs, InverseQuantizer, ScanOrder};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct SignHidingInput {
    log2_size: u8,
    scan: u8,
    qp: u8,
    coefficients: Vec<(i16, i16, i16)>,
}

fuzz_target!(|input: SignHidingInput| {
    let log2 = 2 + input.log2_size % 4;
    let n = 1usize << (2 * log2);
    if input.coefficients.len() < n {
        return;
    }
    let scan = match input.scan % 3 {
        0 => ScanOrder::Diagonal,
        1 => ScanOrder::Horizontal,
        _ => ScanOrder::Vertical,
    };

    let iq = InverseQuantizer::new((input.qp % 52) as i32, log2, 8);
    let mut levels: Vec<i16> = input.coefficients[..n].iter().map(|c| c.0).collect();
    let src: Vec<i32> = input.coefficients[..n].iter().map(|c| c.1 as i32).collect();
    let errors: Vec<i32> = input.coefficients[..n].iter().map(|c| c.2 as i32).collect();
    let original = levels.clone();

    if hide_signs(&mut levels, log2, scan, &src, &errors, &iq).is_ok() {
        for (a, b) in levels.iter().zip(&original) {
            assert!((*a as i32 - *b as i32).abs() <= 1);
        }
    }
});
