//! Tick-ordered liquidity ledger.
//!
//! Nodes live in a map keyed by tick and are chained in ascending key order
//! through explicit `prev`/`next` keys, anchored by the head (`0`) and tail
//! (`u128::MAX`) sentinel records. A node with `next == 0` is not on the
//! chain: either never instantiated, garbage-collected after its last share
//! was redeemed, or swept after insolvency.
//!
//! Accounting per linked node:
//!
//! - `value == available + locked`, where locked is the sum of `used` of the
//!   loans the node currently funds.
//! - `pending` is the sum of repayment targets of those loans.
//! - `redemptions` is the number of shares queued but not yet resolved.
//!
//! Every time a node is linked its `generation` advances. Loans remember the
//! generation they drew from, so a loan that outlives a sweep of its node is
//! never settled against the node's next incarnation.
//!
//! The ledger does not know about depositors or loans; the pool layer keeps
//! those and only passes amounts in.

use std::collections::BTreeMap;

use crate::constants::{
    BASIS_POINTS_SCALE, FIXED_POINT_SCALE, NODE_DUST_THRESHOLD, TICK_HEAD,
    TICK_LIMIT_SPACING_BASIS_POINTS, TICK_TAIL,
};
use crate::error::PoolError;
use crate::math::{checked_add, checked_sub, mul_div, scale_div};
use crate::redemption::{RedemptionAvailability, RedemptionBatch, RedemptionQueue};
use crate::tick::{self, TickBounds};

/// Interest accrual bookkeeping, used for reporting only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accrual {
    /// Interest accrued up to `timestamp`
    pub accrued: u128,
    /// Interest per second across the node's outstanding loans
    pub rate: u128,
    pub timestamp: u64,
}

impl Accrual {
    fn advance(&mut self, now: u64) -> Result<(), PoolError> {
        let elapsed = now.saturating_sub(self.timestamp) as u128;
        let delta = self.rate.checked_mul(elapsed).ok_or(PoolError::Overflow)?;
        self.accrued = checked_add(self.accrued, delta)?;
        self.timestamp = now;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub value: u128,
    pub shares: u128,
    pub available: u128,
    pub pending: u128,
    pub redemptions: u128,
    pub prev: u128,
    pub next: u128,
    pub generation: u64,
    pub accrual: Accrual,
    pub queue: RedemptionQueue,
}

impl Node {
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.next != 0
    }

    /// Value wiped out while shares remain outstanding.
    #[inline]
    pub fn is_insolvent(&self) -> bool {
        self.shares != 0 && self.value == 0
    }

    #[inline]
    pub fn locked(&self) -> u128 {
        self.value.saturating_sub(self.available)
    }

    /// Share price for minting. Half of the interest not yet realized is
    /// credited to existing holders while value is out on loan.
    pub fn deposit_price(&self) -> Result<u128, PoolError> {
        if self.shares == 0 {
            return Ok(FIXED_POINT_SCALE);
        }
        scale_div(self.deposit_value()?, self.shares)
    }

    fn deposit_value(&self) -> Result<u128, PoolError> {
        let locked = self.locked();
        if locked == 0 {
            return Ok(self.value);
        }
        checked_add(self.value, self.pending.saturating_sub(locked) / 2)
    }

    /// Shares minted for `amount` at the deposit price, without flooring the
    /// price first.
    fn deposit_shares(&self, amount: u128) -> Result<u128, PoolError> {
        if self.shares == 0 {
            return Ok(amount);
        }
        let value = self.deposit_value()?;
        if value == 0 {
            return Err(PoolError::InsolventLiquidity);
        }
        mul_div(amount, self.shares, value)
    }

    /// Share price for redemption: realized value only.
    pub fn redemption_price(&self) -> Result<u128, PoolError> {
        if self.shares == 0 {
            return Ok(FIXED_POINT_SCALE);
        }
        scale_div(self.value, self.shares)
    }

    fn info(&self, tick: u128) -> NodeInfo {
        NodeInfo {
            tick,
            value: self.value,
            shares: self.shares,
            available: self.available,
            pending: self.pending,
            redemptions: self.redemptions,
            prev: self.prev,
            next: self.next,
        }
    }
}

/// Read-only view of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub tick: u128,
    pub value: u128,
    pub shares: u128,
    pub available: u128,
    pub pending: u128,
    pub redemptions: u128,
    pub prev: u128,
    pub next: u128,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiquidityStatistics {
    pub value: u128,
    pub used: u128,
    pub node_count: u32,
}

/// Amount drawn from one node for a loan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeSource {
    pub tick: u128,
    pub used: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Liquidity {
    nodes: BTreeMap<u128, Node>,
    /// Sum of node values on the chain
    value: u128,
    /// Sum of locked amounts on the chain
    used: u128,
    node_count: u32,
    /// Dust and late restorations absorbed from swept nodes
    swept: u128,
}

impl Default for Liquidity {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn is_sentinel(tick: u128) -> bool {
    tick == TICK_HEAD || tick == TICK_TAIL
}

/// `upper` is at least the minimum spacing above `lower`, or shares its limit.
fn is_spaced(lower: u128, upper: u128) -> Result<bool, PoolError> {
    if lower == upper {
        return Ok(true);
    }
    let min_upper = mul_div(
        lower,
        BASIS_POINTS_SCALE + TICK_LIMIT_SPACING_BASIS_POINTS,
        BASIS_POINTS_SCALE,
    )?;
    Ok(upper >= min_upper)
}

impl Liquidity {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(TICK_HEAD, Node { next: TICK_TAIL, ..Node::default() });
        nodes.insert(TICK_TAIL, Node { prev: TICK_HEAD, next: TICK_TAIL, ..Node::default() });
        Self { nodes, value: 0, used: 0, node_count: 0, swept: 0 }
    }

    fn next_of(&self, tick: u128) -> u128 {
        self.nodes.get(&tick).map_or(TICK_TAIL, |n| n.next)
    }

    fn linked_mut(&mut self, tick: u128) -> Result<&mut Node, PoolError> {
        if is_sentinel(tick) {
            return Err(PoolError::InactiveLiquidity);
        }
        match self.nodes.get_mut(&tick) {
            Some(node) if node.is_linked() => Ok(node),
            Some(node) if node.is_insolvent() => Err(PoolError::InsolventLiquidity),
            _ => Err(PoolError::InactiveLiquidity),
        }
    }

    fn unlink(&mut self, tick: u128) {
        let (prev, next) = match self.nodes.get_mut(&tick) {
            Some(node) if node.is_linked() => {
                let links = (node.prev, node.next);
                node.prev = 0;
                node.next = 0;
                links
            }
            _ => return,
        };
        if let Some(node) = self.nodes.get_mut(&prev) {
            node.next = next;
        }
        if let Some(node) = self.nodes.get_mut(&next) {
            node.prev = prev;
        }
        self.node_count -= 1;
    }

    /// Link a node for `tick` into the chain if it is not already there.
    pub fn instantiate(&mut self, tick: u128) -> Result<(), PoolError> {
        if is_sentinel(tick) {
            return Err(PoolError::InvalidTick);
        }
        if let Some(node) = self.nodes.get(&tick) {
            if node.is_linked() {
                return Ok(());
            }
            if node.shares != 0 {
                return Err(PoolError::InsolventLiquidity);
            }
        }

        let mut prev = TICK_HEAD;
        let mut next = self.next_of(TICK_HEAD);
        while next < tick {
            prev = next;
            next = self.next_of(next);
        }

        let limit = tick::decode_limit(tick);
        if prev != TICK_HEAD && !is_spaced(tick::decode_limit(prev), limit)? {
            return Err(PoolError::InsufficientTickSpacing);
        }
        if next != TICK_TAIL && !is_spaced(limit, tick::decode_limit(next))? {
            return Err(PoolError::InsufficientTickSpacing);
        }

        // The redemption log survives re-instantiation; everything else restarts.
        let node = self.nodes.entry(tick).or_default();
        node.value = 0;
        node.shares = 0;
        node.available = 0;
        node.pending = 0;
        node.redemptions = 0;
        node.accrual = Accrual::default();
        node.prev = prev;
        node.next = next;
        node.generation = node.generation.wrapping_add(1);

        if let Some(node) = self.nodes.get_mut(&prev) {
            node.next = tick;
        }
        if let Some(node) = self.nodes.get_mut(&next) {
            node.prev = tick;
        }
        self.node_count += 1;
        Ok(())
    }

    /// Add `amount` to a node, returning the shares minted.
    pub fn deposit(&mut self, tick: u128, amount: u128) -> Result<u128, PoolError> {
        let node = self.linked_mut(tick)?;
        let shares = node.deposit_shares(amount)?;
        if shares == 0 {
            return Err(PoolError::InvalidShares);
        }

        node.value = checked_add(node.value, amount)?;
        node.available = checked_add(node.available, amount)?;
        node.shares = checked_add(node.shares, shares)?;
        self.value = checked_add(self.value, amount)?;
        Ok(shares)
    }

    /// Lock `amount` of a node's available value in a loan repaying `pending`.
    /// Returns the node generation the loan is bound to.
    pub fn use_liquidity(
        &mut self,
        tick: u128,
        amount: u128,
        pending: u128,
        duration: u64,
        now: u64,
    ) -> Result<u64, PoolError> {
        let node = self.linked_mut(tick)?;
        if amount > node.available {
            return Err(PoolError::InsufficientLiquidity);
        }

        node.available -= amount;
        node.pending = checked_add(node.pending, pending)?;

        node.accrual.advance(now)?;
        let rate = pending.saturating_sub(amount) / (duration.max(1) as u128);
        node.accrual.rate = checked_add(node.accrual.rate, rate)?;

        let generation = node.generation;
        self.used = checked_add(self.used, amount)?;
        Ok(generation)
    }

    /// Settle a loan's share of a node. Returns the redemption batch the
    /// freed liquidity resolved, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        &mut self,
        tick: u128,
        generation: u64,
        used: u128,
        pending: u128,
        restored: u128,
        duration: u64,
        elapsed: u64,
        now: u64,
    ) -> Result<Option<RedemptionBatch>, PoolError> {
        if is_sentinel(tick) {
            return Err(PoolError::InvalidTick);
        }
        let node = self.nodes.get_mut(&tick).ok_or(PoolError::InactiveLiquidity)?;

        // Loan outlived a sweep of its node: the node's accounting was already
        // zeroed, so the proceeds are absorbed.
        if !node.is_linked() || node.generation != generation {
            self.swept = checked_add(self.swept, restored)?;
            return Ok(None);
        }

        node.value = checked_add(checked_sub(node.value, used)?, restored)?;
        node.available = checked_add(node.available, restored)?;
        node.pending = checked_sub(node.pending, pending)?;

        node.accrual.advance(now)?;
        let rate = pending.saturating_sub(used) / (duration.max(1) as u128);
        node.accrual.accrued = node
            .accrual
            .accrued
            .saturating_sub(rate.saturating_mul(elapsed as u128));
        node.accrual.rate = node.accrual.rate.saturating_sub(rate);

        self.value = checked_add(checked_sub(self.value, used)?, restored)?;
        self.used = checked_sub(self.used, used)?;

        // Written off: locked value of other loans is forfeited, cash is swept.
        if node.shares != 0 && node.value < NODE_DUST_THRESHOLD {
            let locked = node.locked();
            let value = node.value;
            let dust = node.available;
            node.value = 0;
            node.available = 0;
            node.pending = 0;
            node.accrual = Accrual::default();

            self.value = checked_sub(self.value, value)?;
            self.used = checked_sub(self.used, locked)?;
            self.swept = checked_add(self.swept, dust)?;
            self.unlink(tick);
        }

        self.process_redemptions(tick)
    }

    /// Queue `shares` for redemption. Returns the FIFO position `(index, target)`.
    pub fn redeem(&mut self, tick: u128, shares: u128) -> Result<(u64, u128), PoolError> {
        if is_sentinel(tick) {
            return Err(PoolError::InvalidTick);
        }
        let node = self.nodes.get_mut(&tick).ok_or(PoolError::InactiveLiquidity)?;
        if shares == 0 || shares > node.shares - node.redemptions {
            return Err(PoolError::InvalidShares);
        }

        let index = node.queue.next_index();
        let target = node.redemptions;
        node.redemptions += shares;
        Ok((index, target))
    }

    /// Resolve as many queued shares as available value allows.
    pub fn process_redemptions(&mut self, tick: u128) -> Result<Option<RedemptionBatch>, PoolError> {
        let node = match self.nodes.get_mut(&tick) {
            Some(node) if !is_sentinel(tick) => node,
            _ => return Ok(None),
        };
        if node.redemptions == 0 {
            return Ok(None);
        }

        if node.is_insolvent() {
            let shares = node.redemptions;
            node.shares -= shares;
            node.redemptions = 0;
            return node.queue.record(shares, 0).map(Some);
        }

        if node.available == 0 || !node.is_linked() {
            return Ok(None);
        }

        // value != 0 here: a node with shares and no value is insolvent
        let shares = node.redemptions.min(mul_div(node.available, node.shares, node.value)?);
        if shares == 0 {
            return Ok(None);
        }
        let amount = if shares == node.shares && node.available == node.value {
            node.value
        } else {
            mul_div(shares, node.value, node.shares)?.min(node.available)
        };

        node.shares -= shares;
        node.value -= amount;
        node.available -= amount;
        node.redemptions -= shares;
        let batch = node.queue.record(shares, amount)?;
        self.value = checked_sub(self.value, amount)?;

        // Last share out: drop the node from the chain.
        if node.shares == 0 && node.pending == 0 {
            let dust = node.value;
            node.value = 0;
            node.available = 0;
            node.accrual = Accrual::default();
            self.value = checked_sub(self.value, dust)?;
            self.swept = checked_add(self.swept, dust)?;
            self.unlink(tick);
        }

        Ok(Some(batch))
    }

    pub fn redemption_available(
        &self,
        tick: u128,
        shares: u128,
        index: u64,
        target: u128,
    ) -> Result<RedemptionAvailability, PoolError> {
        match self.nodes.get(&tick) {
            Some(node) if !is_sentinel(tick) => node.queue.available(shares, index, target),
            _ => Ok(RedemptionAvailability { shares: 0, amount: 0, index, target }),
        }
    }

    /// Decide how much to draw from each of `ticks` for a loan of `amount`.
    ///
    /// Ticks must be strictly increasing and within `bounds`. Each tick caps
    /// the cumulative amount drawn so far at `limit * multiplier`.
    pub fn source(
        &self,
        amount: u128,
        ticks: &[u128],
        multiplier: u128,
        bounds: &TickBounds,
    ) -> Result<Vec<NodeSource>, PoolError> {
        let mut limits = Vec::with_capacity(ticks.len());
        let mut prior = TICK_HEAD;
        for &tick in ticks {
            limits.push(tick::validate(tick, prior, bounds)?);
            prior = tick;
        }

        let mut sources = Vec::new();
        let mut taken = 0u128;
        for (&tick, &limit) in ticks.iter().zip(limits.iter()) {
            if taken == amount {
                break;
            }
            let available = match self.nodes.get(&tick) {
                Some(node) if node.is_linked() => node.available,
                _ => 0,
            };
            let take = limit
                .saturating_mul(multiplier)
                .saturating_sub(taken)
                .min(available)
                .min(amount - taken);
            if take == 0 {
                continue;
            }
            taken += take;
            sources.push(NodeSource { tick, used: take });
        }

        if taken < amount {
            return Err(PoolError::InsufficientLiquidity);
        }
        Ok(sources)
    }

    pub fn node(&self, tick: u128) -> Option<&Node> {
        if is_sentinel(tick) {
            return None;
        }
        self.nodes.get(&tick)
    }

    pub fn liquidity_node(&self, tick: u128) -> NodeInfo {
        self.node(tick).map_or(NodeInfo { tick, ..NodeInfo::default() }, |n| n.info(tick))
    }

    /// Nodes on the chain with `start <= tick <= end`, in ascending order.
    pub fn liquidity_nodes(&self, start: u128, end: u128) -> Vec<NodeInfo> {
        let mut out = Vec::new();
        let mut tick = self.next_of(TICK_HEAD);
        while tick != TICK_TAIL && tick <= end {
            if tick >= start {
                if let Some(node) = self.nodes.get(&tick) {
                    out.push(node.info(tick));
                }
            }
            tick = self.next_of(tick);
        }
        out
    }

    /// Node view plus interest accrued as of `now`.
    pub fn liquidity_node_with_accrued(&self, tick: u128, now: u64) -> (NodeInfo, u128) {
        match self.node(tick) {
            Some(node) => {
                let elapsed = now.saturating_sub(node.accrual.timestamp) as u128;
                let accrued = node
                    .accrual
                    .accrued
                    .saturating_add(node.accrual.rate.saturating_mul(elapsed));
                (node.info(tick), accrued)
            }
            None => (NodeInfo { tick, ..NodeInfo::default() }, 0),
        }
    }

    pub fn liquidity_statistics(&self) -> LiquidityStatistics {
        LiquidityStatistics { value: self.value, used: self.used, node_count: self.node_count }
    }

    /// used / value, 1e18 scaled.
    pub fn utilization(&self) -> u128 {
        if self.value == 0 {
            return 0;
        }
        scale_div(self.used, self.value).unwrap_or(0)
    }

    pub fn swept(&self) -> u128 {
        self.swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick::{encode, LimitType};

    const E18: u128 = 1_000_000_000_000_000_000;

    fn tick(limit: u128) -> u128 {
        encode(limit, 0, 0, LimitType::Absolute).unwrap()
    }

    fn bounds() -> TickBounds {
        TickBounds { min_duration_index: 0, max_duration_index: 7, max_rate_index: 7, reference_value: 0 }
    }

    /// value == available + locked, and the chain's aggregates match its nodes.
    fn assert_conserved(liquidity: &Liquidity) {
        let nodes = liquidity.liquidity_nodes(0, u128::MAX);
        let mut value = 0;
        let mut used = 0;
        for n in &nodes {
            assert!(n.value >= n.available, "node {} value below available", n.tick);
            value += n.value;
            used += n.value - n.available;
        }
        let stats = liquidity.liquidity_statistics();
        assert_eq!(stats.value, value);
        assert_eq!(stats.used, used);
        assert_eq!(stats.node_count as usize, nodes.len());
    }

    #[test]
    fn test_instantiate_orders_chain() {
        let mut liquidity = Liquidity::new();
        let (t10, t20, t30) = (tick(10 * E18), tick(20 * E18), tick(30 * E18));
        liquidity.instantiate(t30).unwrap();
        liquidity.instantiate(t10).unwrap();
        liquidity.instantiate(t20).unwrap();
        liquidity.instantiate(t20).unwrap();

        let nodes = liquidity.liquidity_nodes(0, u128::MAX);
        let ticks: Vec<u128> = nodes.iter().map(|n| n.tick).collect();
        assert_eq!(ticks, vec![t10, t20, t30]);
        assert_eq!(nodes[0].prev, TICK_HEAD);
        assert_eq!(nodes[1].prev, t10);
        assert_eq!(nodes[1].next, t30);
        assert_eq!(nodes[2].next, TICK_TAIL);
        assert_eq!(liquidity.liquidity_statistics().node_count, 3);

        let ranged = liquidity.liquidity_nodes(t20, t30);
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn test_instantiate_spacing() {
        let mut liquidity = Liquidity::new();
        liquidity.instantiate(tick(10 * E18)).unwrap();

        // within 10% of a neighbor
        assert_eq!(
            liquidity.instantiate(tick(10_500_000_000_000_000_000)),
            Err(PoolError::InsufficientTickSpacing)
        );
        assert_eq!(
            liquidity.instantiate(tick(9_500_000_000_000_000_000)),
            Err(PoolError::InsufficientTickSpacing)
        );
        liquidity.instantiate(tick(11 * E18)).unwrap();

        // same limit, different rate class
        liquidity.instantiate(encode(10 * E18, 0, 1, LimitType::Absolute).unwrap()).unwrap();
        assert_eq!(liquidity.liquidity_statistics().node_count, 3);
    }

    #[test]
    fn test_instantiate_rejects_sentinels() {
        let mut liquidity = Liquidity::new();
        assert_eq!(liquidity.instantiate(TICK_HEAD), Err(PoolError::InvalidTick));
        assert_eq!(liquidity.instantiate(TICK_TAIL), Err(PoolError::InvalidTick));
    }

    #[test]
    fn test_deposit_requires_active_node() {
        let mut liquidity = Liquidity::new();
        assert_eq!(liquidity.deposit(tick(10 * E18), E18), Err(PoolError::InactiveLiquidity));
    }

    #[test]
    fn test_deposit_pricing_with_pending_interest() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();

        assert_eq!(liquidity.deposit(t, 5 * E18).unwrap(), 5 * E18);
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.shares), (5 * E18, 5 * E18));

        liquidity.use_liquidity(t, 5 * E18, 7 * E18, 30 * 86_400, 0).unwrap();
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.available, n.pending), (0, 7 * E18));

        assert_eq!(liquidity.deposit(t, 3 * E18).unwrap(), 5 * E18 / 2);
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.shares), (8 * E18, 15 * E18 / 2));
        assert_conserved(&liquidity);
    }

    #[test]
    fn test_use_more_than_available() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, E18).unwrap();
        assert_eq!(
            liquidity.use_liquidity(t, 2 * E18, 3 * E18, 100, 0),
            Err(PoolError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_insolvency_dust_sweeps_node() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 5 * E18).unwrap();
        liquidity.use_liquidity(t, 5 * E18, 6 * E18, 100, 0).unwrap();
        liquidity.restore(t, 1, 5 * E18, 6 * E18, 4, 100, 100, 100).unwrap();

        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.available, n.pending), (0, 0, 0));
        assert_eq!((n.prev, n.next), (0, 0));
        assert_eq!(n.shares, 5 * E18);
        assert_eq!(liquidity.liquidity_statistics(), LiquidityStatistics::default());
        assert_eq!(liquidity.swept(), 4);

        // shares outstanding: neither instantiation nor deposit is allowed
        assert_eq!(liquidity.instantiate(t), Err(PoolError::InsolventLiquidity));
        assert_eq!(liquidity.deposit(t, E18), Err(PoolError::InsolventLiquidity));

        // redeeming resolves the shares at zero
        let (index, target) = liquidity.redeem(t, 5 * E18).unwrap();
        let batch = liquidity.process_redemptions(t).unwrap().unwrap();
        assert_eq!((batch.shares, batch.amount), (5 * E18, 0));
        let avail = liquidity.redemption_available(t, 5 * E18, index, target).unwrap();
        assert_eq!((avail.shares, avail.amount), (5 * E18, 0));

        // fresh start
        liquidity.instantiate(t).unwrap();
        assert_eq!(liquidity.deposit(t, 4 * E18).unwrap(), 4 * E18);
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.shares, n.available, n.pending), (4 * E18, 4 * E18, 4 * E18, 0));
        assert_eq!(n.next, TICK_TAIL);
        assert_eq!(liquidity.liquidity_statistics().node_count, 1);
        assert_conserved(&liquidity);
    }

    #[test]
    fn test_queued_redemptions_resolve_at_zero_on_sweep() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 5 * E18).unwrap();
        liquidity.use_liquidity(t, 5 * E18, 6 * E18, 100, 0).unwrap();
        let (index, target) = liquidity.redeem(t, 2 * E18).unwrap();

        let batch = liquidity.restore(t, 1, 5 * E18, 6 * E18, 0, 100, 100, 100).unwrap().unwrap();
        assert_eq!((batch.shares, batch.amount), (2 * E18, 0));
        assert_eq!(liquidity.liquidity_node(t).shares, 3 * E18);

        let avail = liquidity.redemption_available(t, 2 * E18, index, target).unwrap();
        assert_eq!((avail.shares, avail.amount), (2 * E18, 0));
    }

    #[test]
    fn test_loan_from_swept_generation_is_absorbed() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 5 * E18).unwrap();
        assert_eq!(liquidity.use_liquidity(t, 5 * E18 - 1_000, 6 * E18, 100, 0).unwrap(), 1);
        assert_eq!(liquidity.use_liquidity(t, 1_000, 2_000, 100, 0).unwrap(), 1);

        // first loan defaults, the node falls under dust with the second still out
        liquidity.restore(t, 1, 5 * E18 - 1_000, 6 * E18, 0, 100, 100, 100).unwrap();
        assert!(!liquidity.node(t).unwrap().is_linked());
        assert_eq!(liquidity.swept(), 0);

        liquidity.redeem(t, 5 * E18).unwrap();
        liquidity.process_redemptions(t).unwrap();
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 4 * E18).unwrap();
        assert_eq!(liquidity.use_liquidity(t, E18, 2 * E18, 100, 100).unwrap(), 2);

        // the old loan repays into the new incarnation's generation: absorbed
        assert_eq!(liquidity.restore(t, 1, 1_000, 2_000, 2_000, 100, 100, 200).unwrap(), None);
        assert_eq!(liquidity.swept(), 2_000);
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.available, n.pending), (4 * E18, 3 * E18, 2 * E18));
        assert_conserved(&liquidity);
    }

    #[test]
    fn test_multi_price_redemption() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 5 * E18).unwrap();
        liquidity.use_liquidity(t, 2 * E18, 3 * E18, 100, 0).unwrap();
        liquidity.use_liquidity(t, 3 * E18, 4 * E18, 100, 0).unwrap();

        let (index, target) = liquidity.redeem(t, 3 * E18).unwrap();
        assert_eq!((index, target), (0, 0));
        assert_eq!(liquidity.process_redemptions(t).unwrap(), None);

        let first = liquidity.restore(t, 1, 2 * E18, 3 * E18, 3 * E18, 100, 100, 100).unwrap().unwrap();
        assert_eq!((first.shares, first.amount), (5 * E18 / 2, 3 * E18));

        let second = liquidity.restore(t, 1, 3 * E18, 4 * E18, 4 * E18, 100, 100, 100).unwrap().unwrap();
        assert_eq!((second.shares, second.amount), (E18 / 2, 8 * E18 / 10));

        let avail = liquidity.redemption_available(t, 3 * E18, index, target).unwrap();
        assert_eq!(avail.shares, 3 * E18);
        assert_eq!(avail.amount, 38 * E18 / 10);

        let n = liquidity.liquidity_node(t);
        assert_eq!((n.shares, n.value, n.available, n.redemptions), (2 * E18, 32 * E18 / 10, 32 * E18 / 10, 0));
        assert_conserved(&liquidity);
    }

    #[test]
    fn test_sub_unit_share_price_still_resolves() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        let big = 10_000_000 * E18;
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, big).unwrap();
        let used = big - 2_000_000;
        liquidity.use_liquidity(t, used, used, 100, 0).unwrap();
        assert_eq!(liquidity.restore(t, 1, used, used, 0, 100, 100, 100).unwrap(), None);

        // above dust but worth less than a wei per whole share
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.available, n.shares, n.next != 0), (2_000_000, 2_000_000, big, true));
        assert_eq!(liquidity.nodes[&t].redemption_price().unwrap(), 0);

        let (index, target) = liquidity.redeem(t, big / 2).unwrap();
        let batch = liquidity.process_redemptions(t).unwrap().unwrap();
        assert_eq!((batch.shares, batch.amount), (big / 2, 1_000_000));
        let avail = liquidity.redemption_available(t, big / 2, index, target).unwrap();
        assert_eq!((avail.shares, avail.amount), (big / 2, 1_000_000));

        // minting keeps working on the same node
        let shares = liquidity.deposit(t, E18).unwrap();
        assert_eq!(shares, 5 * E18 * E18);
        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.shares), (1_000_000 + E18, big / 2 + shares));
        assert_conserved(&liquidity);
    }

    #[test]
    fn test_redeem_rejects_excess_shares() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 2 * E18).unwrap();
        liquidity.use_liquidity(t, 2 * E18, 3 * E18, 100, 0).unwrap();
        liquidity.redeem(t, E18).unwrap();
        assert_eq!(liquidity.redeem(t, 2 * E18), Err(PoolError::InvalidShares));
        assert_eq!(liquidity.redeem(t, 0), Err(PoolError::InvalidShares));
    }

    #[test]
    fn test_full_redemption_unlinks_node() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 2 * E18).unwrap();
        liquidity.redeem(t, 2 * E18).unwrap();
        let batch = liquidity.process_redemptions(t).unwrap().unwrap();
        assert_eq!((batch.shares, batch.amount), (2 * E18, 2 * E18));

        let n = liquidity.liquidity_node(t);
        assert_eq!((n.value, n.shares, n.next), (0, 0, 0));
        assert_eq!(liquidity.liquidity_statistics(), LiquidityStatistics::default());

        // the batch log survives re-instantiation
        liquidity.instantiate(t).unwrap();
        let avail = liquidity.redemption_available(t, 2 * E18, 0, 0).unwrap();
        assert_eq!(avail.amount, 2 * E18);
    }

    #[test]
    fn test_source_caps_draw_per_limit() {
        let mut liquidity = Liquidity::new();
        let ticks: Vec<u128> = [10, 20, 30, 40].iter().map(|l| tick(l * E18)).collect();
        for &t in &ticks {
            liquidity.instantiate(t).unwrap();
            liquidity.deposit(t, 50 * E18).unwrap();
        }

        let sources = liquidity.source(35 * E18, &ticks, 1, &bounds()).unwrap();
        let used: Vec<u128> = sources.iter().map(|s| s.used).collect();
        assert_eq!(used, vec![10 * E18, 10 * E18, 10 * E18, 5 * E18]);
        assert_eq!(sources.iter().map(|s| s.tick).collect::<Vec<_>>(), ticks);

        // a larger multiplier lets the lowest tick fund more
        let sources = liquidity.source(35 * E18, &ticks, 3, &bounds()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!((sources[0].used, sources[1].used), (30 * E18, 5 * E18));

        // more than the ticks can supply
        assert_eq!(
            liquidity.source(45 * E18, &ticks, 1, &bounds()),
            Err(PoolError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_source_skips_empty_ticks() {
        let mut liquidity = Liquidity::new();
        let (t10, t20, t30) = (tick(10 * E18), tick(20 * E18), tick(30 * E18));
        liquidity.instantiate(t10).unwrap();
        liquidity.instantiate(t30).unwrap();
        liquidity.deposit(t30, 50 * E18).unwrap();

        let sources = liquidity.source(25 * E18, &[t10, t20, t30], 1, &bounds()).unwrap();
        assert_eq!(sources, vec![NodeSource { tick: t30, used: 25 * E18 }]);
    }

    #[test]
    fn test_source_validates_ordering() {
        let mut liquidity = Liquidity::new();
        let (t10, t20) = (tick(10 * E18), tick(20 * E18));
        liquidity.instantiate(t10).unwrap();
        liquidity.deposit(t10, 50 * E18).unwrap();

        assert_eq!(liquidity.source(E18, &[t20, t10], 1, &bounds()), Err(PoolError::InvalidTick));
        assert_eq!(liquidity.source(E18, &[t10, t10], 1, &bounds()), Err(PoolError::InvalidTick));
    }

    #[test]
    fn test_statistics_and_utilization() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        assert_eq!(liquidity.utilization(), 0);
        liquidity.deposit(t, 4 * E18).unwrap();
        liquidity.use_liquidity(t, E18, 2 * E18, 100, 0).unwrap();

        let stats = liquidity.liquidity_statistics();
        assert_eq!((stats.value, stats.used, stats.node_count), (4 * E18, E18, 1));
        assert_eq!(liquidity.utilization(), E18 / 4);
    }

    #[test]
    fn test_accrual_tracks_outstanding_interest() {
        let mut liquidity = Liquidity::new();
        let t = tick(10 * E18);
        liquidity.instantiate(t).unwrap();
        liquidity.deposit(t, 10 * E18).unwrap();

        // 1e18 interest over 1000s = 1e15 per second
        liquidity.use_liquidity(t, 5 * E18, 6 * E18, 1_000, 0).unwrap();
        let (_, accrued) = liquidity.liquidity_node_with_accrued(t, 400);
        assert_eq!(accrued, 400 * E18 / 1_000);

        liquidity.restore(t, 1, 5 * E18, 6 * E18, 6 * E18, 1_000, 1_000, 1_000).unwrap();
        let node = liquidity.node(t).unwrap();
        assert_eq!(node.accrual.rate, 0);
        assert_eq!(node.accrual.accrued, 0);
    }
}
