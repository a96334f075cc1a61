//! Per-node FIFO redemption log.
//!
//! Redemption requests are not stored here; a request is only a position in
//! the node's FIFO, captured as `(index, target)` at request time:
//!
//! - `index` is the number of batches already recorded when the request was
//!   made, so every batch that can resolve it has an index `>= index`.
//! - `target` is the number of shares queued ahead of it at that moment.
//!
//! Each processing step appends a batch carrying the cumulative number of
//! shares resolved before it. A request therefore owns the absolute share
//! interval `[base(index) + target, base(index) + target + shares)` and is
//! owed, from every batch it overlaps, `overlap / batch.shares * batch.amount`.
//! Requests resolved by several batches at different prices receive the exact
//! blend of those prices.

use crate::error::PoolError;
use crate::math::mul_div;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedemptionBatch {
    /// Cumulative shares resolved on the node before this batch
    pub cumulative_before: u128,
    pub shares: u128,
    pub amount: u128,
}

/// A depositor's outstanding redemption request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Redemption {
    /// Shares not yet withdrawn
    pub pending: u128,
    pub index: u64,
    pub target: u128,
}

/// Result of resolving a request against the batch log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedemptionAvailability {
    pub shares: u128,
    pub amount: u128,
    /// Cursor to resume from for the unresolved remainder
    pub index: u64,
    pub target: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedemptionQueue {
    batches: Vec<RedemptionBatch>,
    resolved: u128,
}

impl RedemptionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next recorded batch will receive.
    pub fn next_index(&self) -> u64 {
        self.batches.len() as u64
    }

    /// Total shares resolved over the node's lifetime.
    pub fn resolved(&self) -> u128 {
        self.resolved
    }

    pub fn batches(&self) -> &[RedemptionBatch] {
        &self.batches
    }

    pub fn record(&mut self, shares: u128, amount: u128) -> Result<RedemptionBatch, PoolError> {
        let batch = RedemptionBatch { cumulative_before: self.resolved, shares, amount };
        self.resolved = self.resolved.checked_add(shares).ok_or(PoolError::Overflow)?;
        self.batches.push(batch);
        Ok(batch)
    }

    /// Cumulative resolved shares at the start of batch `index`.
    fn base(&self, index: u64) -> u128 {
        match self.batches.get(index as usize) {
            Some(batch) => batch.cumulative_before,
            None => self.resolved,
        }
    }

    pub fn available(
        &self,
        shares: u128,
        index: u64,
        target: u128,
    ) -> Result<RedemptionAvailability, PoolError> {
        if index > self.next_index() {
            return Err(PoolError::InvalidRedemptionStatus);
        }

        let start = self.base(index).checked_add(target).ok_or(PoolError::Overflow)?;
        let end = start.checked_add(shares).ok_or(PoolError::Overflow)?;

        let mut resolved_shares = 0u128;
        let mut resolved_amount = 0u128;

        for batch in &self.batches[index as usize..] {
            let batch_end = batch.cumulative_before + batch.shares;
            if batch_end <= start {
                continue;
            }
            if batch.cumulative_before >= end {
                break;
            }
            let overlap = batch_end.min(end) - batch.cumulative_before.max(start);
            resolved_shares += overlap;
            resolved_amount += mul_div(overlap, batch.amount, batch.shares)?;
            if batch_end >= end {
                break;
            }
        }

        // The unresolved remainder starts right after the resolved prefix.
        let remainder_start = start + resolved_shares;
        Ok(RedemptionAvailability {
            shares: resolved_shares,
            amount: resolved_amount,
            index: self.next_index(),
            target: remainder_start.saturating_sub(self.resolved),
        })
    }
}
