//! Fixed-point helpers with a full-width intermediate product.
//!
//! Share prices are scaled by `FIXED_POINT_SCALE` (1e18) and amounts are
//! u128 base units, so `amount * price` routinely exceeds 128 bits before the
//! division brings it back into range.

use crate::constants::FIXED_POINT_SCALE;
use crate::error::PoolError;

/// 128x128 -> 256 bit product as (hi, lo).
fn wide_mul(a: u128, b: u128) -> (u128, u128) {
    let mask = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & mask);
    let (b_hi, b_lo) = (b >> 64, b & mask);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & mask) + (hl & mask);
    let lo = (ll & mask) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// floor(a * b / denominator). Fails if the denominator is zero or the
/// quotient does not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128, PoolError> {
    if denominator == 0 {
        return Err(PoolError::Overflow);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denominator);
    }

    let (hi, lo) = wide_mul(a, b);
    if hi >= denominator {
        return Err(PoolError::Overflow);
    }

    // Restoring long division, one bit of `lo` per step.
    let mut rem = hi;
    let mut quo: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quo <<= 1;
        if carry == 1 || rem >= denominator {
            rem = rem.wrapping_sub(denominator);
            quo |= 1;
        }
    }
    Ok(quo)
}

/// a * 1e18 / b
#[inline]
pub fn scale_div(a: u128, b: u128) -> Result<u128, PoolError> {
    mul_div(a, FIXED_POINT_SCALE, b)
}

#[inline]
pub fn checked_add(a: u128, b: u128) -> Result<u128, PoolError> {
    a.checked_add(b).ok_or(PoolError::Overflow)
}

#[inline]
pub fn checked_sub(a: u128, b: u128) -> Result<u128, PoolError> {
    a.checked_sub(b).ok_or(PoolError::Overflow)
}
