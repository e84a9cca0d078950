//! Binarization primitives shared by the syntax encoders.

use crate::cabac::BinEncoder;
use crate::error::Result;

/// Binarizations built on [`BinEncoder`], available on every encoder.
pub trait Binarization: BinEncoder {
    /// Truncated unary with context-coded bins.
    ///
    /// Bin `i` uses context `ctx + min(i >> ctx_shift, ctx_inc_max)`.
    fn encode_tunary(
        &mut self,
        sym: u32,
        c_max: u32,
        ctx: usize,
        ctx_shift: u32,
        ctx_inc_max: usize,
    ) -> Result<()> {
        let ones = sym.min(c_max);
        for i in 0..ones {
            self.encode_bin(1, ctx + ((i >> ctx_shift) as usize).min(ctx_inc_max))?;
        }
        if sym < c_max {
            self.encode_bin(0, ctx + ((sym >> ctx_shift) as usize).min(ctx_inc_max))?;
        }
        Ok(())
    }

    /// Truncated unary with bypass bins.
    fn encode_tunary_bypass(&mut self, sym: u32, c_max: u32) -> Result<()> {
        let sym = sym.min(c_max);
        let len = if sym < c_max { sym + 1 } else { sym };
        let mut remaining = len;
        let mut ones = sym;

        // up to 16 bins per call: ones followed by an optional zero
        while remaining > 0 {
            let n = remaining.min(16);
            let n_ones = ones.min(n);
            let bins = ((1u32 << n_ones) - 1) << (n - n_ones);
            self.encode_bypass_bins(bins, n)?;
            remaining -= n;
            ones -= n_ones;
        }
        Ok(())
    }

    /// k-th order Exp-Golomb with bypass bins.
    fn encode_egk(&mut self, sym: u32, k: u32) -> Result<()> {
        let mut value = sym as u64;
        let mut k = k;
        let mut prefix_len = 0u32;

        while value >= (1u64 << k) {
            value -= 1u64 << k;
            k += 1;
            prefix_len += 1;
        }

        // prefix ones and the terminating zero
        let mut ones = prefix_len;
        while ones > 0 {
            let n = ones.min(16);
            self.encode_bypass_bins((1 << n) - 1, n)?;
            ones -= n;
        }
        self.encode_bypass_bin(0)?;

        let mut bits = k;
        while bits > 0 {
            let n = bits.min(16);
            bits -= n;
            self.encode_bypass_bins(((value >> bits) & ((1 << n) - 1)) as u32, n)?;
        }
        Ok(())
    }

    /// Truncated Rice with bypass bins.
    fn encode_trunc_rice(&mut self, sym: u32, rice: u32, c_max: u32) -> Result<()> {
        let prefix = sym >> rice;
        let prefix_max = c_max >> rice;
        self.encode_tunary_bypass(prefix, prefix_max)?;

        if sym < c_max && rice > 0 {
            self.encode_bypass_bins(sym & ((1 << rice) - 1), rice)?;
        }
        Ok(())
    }

    /// `coeff_abs_level_remaining`: Rice prefix capped at four ones, then an
    /// Exp-Golomb escape of order `rice + 1`.
    fn encode_coeff_abs_level_remaining(&mut self, value: u32, rice: u32) -> Result<()> {
        let c_max = 4 << rice;
        if value < c_max {
            self.encode_trunc_rice(value, rice, c_max)
        } else {
            self.encode_bypass_bins(0b1111, 4)?;
            self.encode_egk(value - c_max, rice + 1)
        }
    }
}

impl<E: BinEncoder + ?Sized> Binarization for E {}

/// Number of bins of a k-th order Exp-Golomb code.
pub fn egk_length(sym: u32, k: u32) -> u32 {
    let mut value = sym as u64;
    let mut k = k;
    let mut len = 1;
    while value >= (1u64 << k) {
        value -= 1u64 << k;
        k += 1;
        len += 1;
    }
    len + k
}
