//! Tick key codec.
//!
//! A tick is a single ordered u128 key:
//!
//! ```text
//! +-------------------------------+---------------+-----------+------------+
//! |          limit (120)          | duration (3)  | rate (3)  | type (2)   |
//! +-------------------------------+---------------+-----------+------------+
//! ```
//!
//! Ordering by key therefore orders by limit first, then by duration class,
//! rate class and limit type. Key `0` is the head sentinel of the liquidity
//! chain and `u128::MAX` the tail sentinel.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::constants::{BASIS_POINTS_SCALE, MAX_CLASS_COUNT, TICK_HEAD, TICK_TAIL};
use crate::error::PoolError;
use crate::math::mul_div;

const LIMIT_SHIFT: u32 = 8;
const DURATION_SHIFT: u32 = 5;
const RATE_SHIFT: u32 = 2;
const INDEX_MASK: u128 = 0x7;
const TYPE_MASK: u128 = 0x3;

/// Largest limit representable in the 120-bit field.
pub const MAX_LIMIT: u128 = u128::MAX >> LIMIT_SHIFT;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum LimitType {
    /// Limit is an amount in currency base units.
    Absolute = 0,
    /// Limit is in basis points of a reference value.
    Ratio = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    /// Resolved limit (Ratio limits already converted to an amount)
    pub limit: u128,
    pub duration_index: u8,
    pub rate_index: u8,
    pub limit_type: LimitType,
}

/// Index bounds a tick must satisfy for a given pool and loan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickBounds {
    /// Smallest duration class acceptable (the loan's own class)
    pub min_duration_index: u8,
    pub max_duration_index: u8,
    pub max_rate_index: u8,
    /// Value Ratio limits are resolved against
    pub reference_value: u128,
}

pub fn encode(
    limit: u128,
    duration_index: u8,
    rate_index: u8,
    limit_type: LimitType,
) -> Result<u128, PoolError> {
    if limit > MAX_LIMIT
        || duration_index as usize >= MAX_CLASS_COUNT
        || rate_index as usize >= MAX_CLASS_COUNT
    {
        return Err(PoolError::InvalidTick);
    }
    Ok((limit << LIMIT_SHIFT)
        | ((duration_index as u128) << DURATION_SHIFT)
        | ((rate_index as u128) << RATE_SHIFT)
        | limit_type as u128)
}

/// Raw limit field, without Ratio resolution.
#[inline]
pub fn decode_limit(key: u128) -> u128 {
    key >> LIMIT_SHIFT
}

pub fn decode(key: u128, reference_value: u128) -> Result<Tick, PoolError> {
    let raw_limit = decode_limit(key);
    let duration_index = ((key >> DURATION_SHIFT) & INDEX_MASK) as u8;
    let rate_index = ((key >> RATE_SHIFT) & INDEX_MASK) as u8;

    let limit_type = if key == TICK_TAIL {
        LimitType::Absolute
    } else {
        LimitType::from_u8((key & TYPE_MASK) as u8).ok_or(PoolError::InvalidTick)?
    };

    let limit = match limit_type {
        LimitType::Absolute => raw_limit,
        LimitType::Ratio => mul_div(raw_limit, reference_value, BASIS_POINTS_SCALE)?,
    };

    Ok(Tick { limit, duration_index, rate_index, limit_type })
}

/// Validate `key` against the previously accepted key and the pool bounds,
/// returning the resolved limit.
pub fn validate(key: u128, prior: u128, bounds: &TickBounds) -> Result<u128, PoolError> {
    if key == TICK_HEAD || key == TICK_TAIL || key <= prior {
        return Err(PoolError::InvalidTick);
    }
    let tick = decode(key, bounds.reference_value)?;
    if tick.duration_index < bounds.min_duration_index
        || tick.duration_index > bounds.max_duration_index
        || tick.rate_index > bounds.max_rate_index
    {
        return Err(PoolError::InvalidTick);
    }
    if tick.limit_type == LimitType::Ratio && decode_limit(key) > BASIS_POINTS_SCALE {
        return Err(PoolError::InvalidTick);
    }
    Ok(tick.limit)
}
