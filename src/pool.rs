//! Pool orchestrator.
//!
//! Every mutating entry point runs inside [`Pool::transact`]: the operation
//! computes its ledger effects on a staged copy of the state and asks custody
//! to settle the resulting transfers. Only an `Ok` swaps the staged copy in
//! and publishes its events. The busy flag is cleared only after a normal
//! return, so an operation that panics leaves the committed state untouched
//! and the pool refusing all further mutations.

use std::collections::BTreeMap;

use solana_program::{msg, pubkey::Pubkey};

use crate::constants::{FIXED_POINT_SCALE, LOAN_RECEIPT_VERSION, TICK_HEAD};
use crate::custody::{Custody, Transfer};
use crate::error::PoolError;
use crate::liquidity::{Liquidity, LiquidityStatistics, NodeInfo};
use crate::math::{checked_add, mul_div};
use crate::receipt::{self, LoanReceipt, NodeReceipt};
use crate::redemption::{Redemption, RedemptionAvailability, RedemptionBatch};
use crate::state::PoolConfig;
use crate::tick::{self, TickBounds};

/// Caller identity and block time for one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Context {
    pub signer: Pubkey,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BorrowOptions {
    /// Scales every tick limit when sourcing
    pub multiplier: u128,
    /// Opaque bytes carried in the receipt
    pub collateral_context: Vec<u8>,
}

impl Default for BorrowOptions {
    fn default() -> Self {
        Self { multiplier: 1, collateral_context: Vec::new() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoanStatus {
    #[default]
    Uninitialized,
    Active,
    Repaid,
    Liquidated,
    CollateralLiquidated,
}

/// Pool-side record of a loan: its status and the generation of every
/// node it drew from, in receipt order.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Loan {
    status: LoanStatus,
    generations: Vec<u64>,
}

/// A depositor's position in one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Deposit {
    /// Shares held, excluding shares queued for redemption
    pub shares: u128,
    pub redemptions: BTreeMap<u128, Redemption>,
    pub next_redemption_id: u128,
}

/// Result of a borrow or refinance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginatedLoan {
    pub receipt_hash: [u8; 32],
    pub receipt: Vec<u8>,
    pub repayment: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    Deposited { account: Pubkey, tick: u128, amount: u128, shares: u128 },
    Redeemed { account: Pubkey, tick: u128, redemption_id: u128, shares: u128 },
    RedemptionTarget { tick: u128, index: u64, target: u128 },
    RedemptionProcessed { tick: u128, shares: u128, amount: u128 },
    Withdrawn { account: Pubkey, tick: u128, redemption_id: u128, shares: u128, amount: u128 },
    LoanOriginated { receipt_hash: [u8; 32], receipt: Vec<u8> },
    LoanRepaid { receipt_hash: [u8; 32], repayment: u128 },
    LoanLiquidated { receipt_hash: [u8; 32] },
    CollateralLiquidated { receipt_hash: [u8; 32], proceeds: u128, borrower_proceeds: u128 },
}

/// Everything a failed operation must roll back.
#[derive(Clone, Debug)]
pub struct PoolState {
    id: Pubkey,
    config: PoolConfig,
    liquidity: Liquidity,
    deposits: BTreeMap<(Pubkey, u128), Deposit>,
    loans: BTreeMap<[u8; 32], Loan>,
}

fn processed(events: &mut Vec<PoolEvent>, tick: u128, batch: Option<RedemptionBatch>) {
    if let Some(batch) = batch {
        events.push(PoolEvent::RedemptionProcessed {
            tick,
            shares: batch.shares,
            amount: batch.amount,
        });
    }
}

impl PoolState {
    fn bounds(&self, min_duration_index: u8) -> TickBounds {
        TickBounds {
            min_duration_index,
            max_duration_index: self.config.duration_count.saturating_sub(1),
            max_rate_index: self.config.rate_count.saturating_sub(1),
            reference_value: self.liquidity.liquidity_statistics().value,
        }
    }

    /// Smallest configured duration class that covers `duration`.
    fn duration_index(&self, duration: u64) -> Result<u8, PoolError> {
        if duration == 0 {
            return Err(PoolError::UnsupportedLoanDuration);
        }
        self.config
            .durations()
            .iter()
            .position(|&d| d >= duration)
            .map(|i| i as u8)
            .ok_or(PoolError::UnsupportedLoanDuration)
    }

    /// Source `principal` and price each node's share of the loan.
    fn price(
        &self,
        principal: u128,
        duration: u64,
        ticks: &[u128],
        multiplier: u128,
    ) -> Result<(Vec<NodeReceipt>, u128), PoolError> {
        let duration_index = self.duration_index(duration)?;
        if principal == 0 || multiplier == 0 {
            return Err(PoolError::InvalidParameters);
        }

        let sources =
            self.liquidity.source(principal, ticks, multiplier, &self.bounds(duration_index))?;

        let rates = self.config.rates();
        let mut nodes = Vec::with_capacity(sources.len());
        let mut repayment = 0u128;
        for source in sources {
            let rate_index = tick::decode(source.tick, 0)?.rate_index as usize;
            let rate = *rates.get(rate_index).ok_or(PoolError::InvalidTick)? as u128;
            let interest = mul_div(source.used, rate * duration as u128, FIXED_POINT_SCALE)?;
            let pending = checked_add(source.used, interest)?;
            repayment = checked_add(repayment, pending)?;
            nodes.push(NodeReceipt { tick: source.tick, used: source.used, pending });
        }
        Ok((nodes, repayment))
    }

    fn deposit(
        &mut self,
        events: &mut Vec<PoolEvent>,
        ctx: &Context,
        tick: u128,
        amount: u128,
        min_shares: u128,
    ) -> Result<u128, PoolError> {
        let bounds = self.bounds(0);
        tick::validate(tick, TICK_HEAD, &bounds)?;

        self.liquidity.instantiate(tick)?;
        let shares = self.liquidity.deposit(tick, amount)?;
        if shares < min_shares {
            return Err(PoolError::InvalidShares);
        }

        let deposit = self.deposits.entry((ctx.signer, tick)).or_default();
        deposit.shares = checked_add(deposit.shares, shares)?;

        events.push(PoolEvent::Deposited { account: ctx.signer, tick, amount, shares });
        processed(events, tick, self.liquidity.process_redemptions(tick)?);
        Ok(shares)
    }

    fn redeem(
        &mut self,
        events: &mut Vec<PoolEvent>,
        ctx: &Context,
        tick: u128,
        shares: u128,
    ) -> Result<u128, PoolError> {
        let deposit = self
            .deposits
            .get_mut(&(ctx.signer, tick))
            .ok_or(PoolError::InvalidShares)?;
        if shares == 0 || shares > deposit.shares {
            return Err(PoolError::InvalidShares);
        }

        let (index, target) = self.liquidity.redeem(tick, shares)?;
        deposit.shares -= shares;
        let redemption_id = deposit.next_redemption_id;
        deposit.next_redemption_id += 1;
        deposit
            .redemptions
            .insert(redemption_id, Redemption { pending: shares, index, target });

        events.push(PoolEvent::Redeemed { account: ctx.signer, tick, redemption_id, shares });
        events.push(PoolEvent::RedemptionTarget { tick, index, target });
        processed(events, tick, self.liquidity.process_redemptions(tick)?);
        Ok(redemption_id)
    }

    fn withdraw(
        &mut self,
        events: &mut Vec<PoolEvent>,
        ctx: &Context,
        tick: u128,
        redemption_id: u128,
    ) -> Result<(u128, u128), PoolError> {
        let key = (ctx.signer, tick);
        let deposit = self.deposits.get_mut(&key).ok_or(PoolError::InvalidRedemptionStatus)?;
        let redemption = deposit
            .redemptions
            .get_mut(&redemption_id)
            .ok_or(PoolError::InvalidRedemptionStatus)?;

        let available = self.liquidity.redemption_available(
            tick,
            redemption.pending,
            redemption.index,
            redemption.target,
        )?;
        if available.shares == 0 {
            return Ok((0, 0));
        }

        redemption.pending -= available.shares;
        redemption.index = available.index;
        redemption.target = available.target;
        if redemption.pending == 0 {
            deposit.redemptions.remove(&redemption_id);
            if deposit.shares == 0 && deposit.redemptions.is_empty() {
                self.deposits.remove(&key);
            }
        }

        events.push(PoolEvent::Withdrawn {
            account: ctx.signer,
            tick,
            redemption_id,
            shares: available.shares,
            amount: available.amount,
        });
        Ok((available.shares, available.amount))
    }

    #[allow(clippy::too_many_arguments)]
    fn originate(
        &mut self,
        events: &mut Vec<PoolEvent>,
        ctx: &Context,
        principal: u128,
        duration: u64,
        collateral_token: &Pubkey,
        collateral_token_id: u128,
        max_repayment: u128,
        ticks: &[u128],
        options: &BorrowOptions,
    ) -> Result<OriginatedLoan, PoolError> {
        if collateral_token.to_bytes() != self.config.collateral_token {
            return Err(PoolError::UnsupportedCollateral);
        }

        let (nodes, repayment) = self.price(principal, duration, ticks, options.multiplier)?;
        if repayment > max_repayment {
            return Err(PoolError::RepaymentTooHigh);
        }

        let mut generations = Vec::with_capacity(nodes.len());
        for node in &nodes {
            generations.push(self.liquidity.use_liquidity(
                node.tick,
                node.used,
                node.pending,
                duration,
                ctx.timestamp,
            )?);
        }

        let receipt = LoanReceipt {
            version: LOAN_RECEIPT_VERSION,
            borrower: ctx.signer,
            principal,
            repayment,
            maturity: ctx.timestamp.checked_add(duration).ok_or(PoolError::Overflow)?,
            duration,
            collateral_token: *collateral_token,
            collateral_token_id,
            collateral_context: options.collateral_context.clone(),
            nodes,
        };
        let encoded = receipt.encode()?;
        let receipt_hash = receipt::hash(&self.id, &encoded);
        if self.loans.contains_key(&receipt_hash) {
            return Err(PoolError::InvalidLoanReceipt);
        }
        self.loans.insert(receipt_hash, Loan { status: LoanStatus::Active, generations });

        events.push(PoolEvent::LoanOriginated { receipt_hash, receipt: encoded.clone() });
        Ok(OriginatedLoan { receipt_hash, receipt: encoded, repayment })
    }

    /// Decode a receipt and check it is known to this pool with `status`.
    fn load_loan(
        &self,
        encoded: &[u8],
        status: LoanStatus,
    ) -> Result<(LoanReceipt, [u8; 32]), PoolError> {
        let loan = LoanReceipt::decode(encoded)?;
        let receipt_hash = receipt::hash(&self.id, encoded);
        match self.loans.get(&receipt_hash) {
            Some(record) if record.status == status => Ok((loan, receipt_hash)),
            _ => Err(PoolError::InvalidLoanReceipt),
        }
    }

    fn set_status(&mut self, receipt_hash: &[u8; 32], status: LoanStatus) {
        if let Some(record) = self.loans.get_mut(receipt_hash) {
            record.status = status;
        }
    }

    /// Restore each node with the amount the loan returns to it.
    fn restore_nodes(
        &mut self,
        events: &mut Vec<PoolEvent>,
        receipt_hash: &[u8; 32],
        loan: &LoanReceipt,
        restored: &[u128],
        now: u64,
    ) -> Result<(), PoolError> {
        let generations = self
            .loans
            .get(receipt_hash)
            .map(|record| record.generations.clone())
            .ok_or(PoolError::InvalidLoanReceipt)?;
        if generations.len() != loan.nodes.len() {
            return Err(PoolError::InvalidLoanReceipt);
        }

        let start = loan.maturity.saturating_sub(loan.duration);
        let elapsed = now.saturating_sub(start);
        for ((node, &amount), &generation) in loan.nodes.iter().zip(restored).zip(&generations) {
            let batch = self.liquidity.restore(
                node.tick,
                generation,
                node.used,
                node.pending,
                amount,
                loan.duration,
                elapsed,
                now,
            )?;
            processed(events, node.tick, batch);
        }
        Ok(())
    }

    fn settle_repayment<C: Custody + ?Sized>(
        &mut self,
        events: &mut Vec<PoolEvent>,
        custody: &C,
        ctx: &Context,
        encoded: &[u8],
    ) -> Result<LoanReceipt, PoolError> {
        let (loan, receipt_hash) = self.load_loan(encoded, LoanStatus::Active)?;
        if loan.borrower != ctx.signer {
            return Err(PoolError::InvalidCaller);
        }
        if !custody.holds_collateral(&loan.collateral_token, loan.collateral_token_id) {
            return Err(PoolError::CollateralNotHeld);
        }

        let restored: Vec<u128> = loan.nodes.iter().map(|n| n.pending).collect();
        self.restore_nodes(events, &receipt_hash, &loan, &restored, ctx.timestamp)?;
        self.set_status(&receipt_hash, LoanStatus::Repaid);

        events.push(PoolEvent::LoanRepaid { receipt_hash, repayment: loan.repayment });
        Ok(loan)
    }

    fn liquidate(
        &mut self,
        events: &mut Vec<PoolEvent>,
        ctx: &Context,
        encoded: &[u8],
    ) -> Result<LoanReceipt, PoolError> {
        let (loan, receipt_hash) = self.load_loan(encoded, LoanStatus::Active)?;
        if ctx.timestamp <= loan.maturity {
            return Err(PoolError::LoanNotExpired);
        }
        self.set_status(&receipt_hash, LoanStatus::Liquidated);
        events.push(PoolEvent::LoanLiquidated { receipt_hash });
        Ok(loan)
    }

    /// Distribute liquidation proceeds. Returns the loan and the surplus owed
    /// to the borrower.
    fn collateral_liquidated(
        &mut self,
        events: &mut Vec<PoolEvent>,
        ctx: &Context,
        encoded: &[u8],
        proceeds: u128,
    ) -> Result<(LoanReceipt, u128), PoolError> {
        if ctx.signer.to_bytes() != self.config.collateral_liquidator {
            return Err(PoolError::InvalidCaller);
        }
        let (loan, receipt_hash) = self.load_loan(encoded, LoanStatus::Liquidated)?;

        let (restored, borrower_proceeds) = if proceeds >= loan.repayment {
            let restored: Vec<u128> = loan.nodes.iter().map(|n| n.pending).collect();
            (restored, proceeds - loan.repayment)
        } else {
            let mut remaining = proceeds;
            let mut restored = Vec::with_capacity(loan.nodes.len());
            let last = loan.nodes.len() - 1;
            for (i, node) in loan.nodes.iter().enumerate() {
                let share = if i == last {
                    remaining
                } else {
                    mul_div(proceeds, node.used, loan.principal)?.min(remaining)
                };
                remaining -= share;
                restored.push(share);
            }
            (restored, 0)
        };

        self.restore_nodes(events, &receipt_hash, &loan, &restored, ctx.timestamp)?;
        self.set_status(&receipt_hash, LoanStatus::CollateralLiquidated);

        events.push(PoolEvent::CollateralLiquidated { receipt_hash, proceeds, borrower_proceeds });
        Ok((loan, borrower_proceeds))
    }
}

pub struct Pool {
    state: PoolState,
    events: Vec<PoolEvent>,
    locked: bool,
}

impl Pool {
    pub fn new(id: Pubkey, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            state: PoolState {
                id,
                config,
                liquidity: Liquidity::new(),
                deposits: BTreeMap::new(),
                loans: BTreeMap::new(),
            },
            events: Vec::new(),
            locked: false,
        })
    }

    fn transact<T, F>(&mut self, operation: &str, op: F) -> Result<T, PoolError>
    where
        F: FnOnce(&mut PoolState, &mut Vec<PoolEvent>) -> Result<T, PoolError>,
    {
        if self.locked {
            msg!("{}: pool busy", operation);
            return Err(PoolError::Reentrancy);
        }
        self.locked = true;

        let mut staged = self.state.clone();
        let mut events = Vec::new();
        let result = op(&mut staged, &mut events);
        match &result {
            Ok(_) => {
                self.state = staged;
                for event in events {
                    msg!("{:?}", event);
                    self.events.push(event);
                }
            }
            Err(e) => msg!("{} failed: {}", operation, e),
        }

        self.locked = false;
        result
    }

    /// Deposit `amount` into `tick`, minting at least `min_shares`.
    pub fn deposit<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        tick: u128,
        amount: u128,
        min_shares: u128,
    ) -> Result<u128, PoolError> {
        self.transact("deposit", |state, events| {
            let shares = state.deposit(events, ctx, tick, amount, min_shares)?;
            custody.settle(&[Transfer::CurrencyIn { from: ctx.signer, amount }])?;
            Ok(shares)
        })
    }

    /// Queue `shares` for redemption, returning the redemption id.
    pub fn redeem(&mut self, ctx: &Context, tick: u128, shares: u128) -> Result<u128, PoolError> {
        self.transact("redeem", |state, events| state.redeem(events, ctx, tick, shares))
    }

    /// Pay out whatever part of a redemption has been resolved.
    /// Returns `(shares, amount)`.
    pub fn withdraw<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        tick: u128,
        redemption_id: u128,
    ) -> Result<(u128, u128), PoolError> {
        self.transact("withdraw", |state, events| {
            let (shares, amount) = state.withdraw(events, ctx, tick, redemption_id)?;
            if amount != 0 {
                custody.settle(&[Transfer::CurrencyOut { to: ctx.signer, amount }])?;
            }
            Ok((shares, amount))
        })
    }

    pub fn process_redemptions(&mut self, tick: u128) -> Result<(), PoolError> {
        self.transact("process_redemptions", |state, events| {
            let batch = state.liquidity.process_redemptions(tick)?;
            processed(events, tick, batch);
            Ok(())
        })
    }

    /// Repayment a borrow with these terms would require right now.
    pub fn quote(
        &self,
        principal: u128,
        duration: u64,
        ticks: &[u128],
        multiplier: u128,
    ) -> Result<u128, PoolError> {
        self.state
            .price(principal, duration, ticks, multiplier)
            .map(|(_, repayment)| repayment)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn borrow<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        principal: u128,
        duration: u64,
        collateral_token: &Pubkey,
        collateral_token_id: u128,
        max_repayment: u128,
        ticks: &[u128],
        options: &BorrowOptions,
    ) -> Result<OriginatedLoan, PoolError> {
        self.transact("borrow", |state, events| {
            let loan = state.originate(
                events,
                ctx,
                principal,
                duration,
                collateral_token,
                collateral_token_id,
                max_repayment,
                ticks,
                options,
            )?;
            custody.settle(&[
                Transfer::CollateralIn {
                    from: ctx.signer,
                    token: *collateral_token,
                    token_id: collateral_token_id,
                },
                Transfer::CurrencyOut { to: ctx.signer, amount: principal },
            ])?;
            Ok(loan)
        })
    }

    /// Repay an active loan and release its collateral. Returns the amount paid.
    pub fn repay<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        receipt: &[u8],
    ) -> Result<u128, PoolError> {
        self.transact("repay", |state, events| {
            let loan = state.settle_repayment(events, &*custody, ctx, receipt)?;
            custody.settle(&[
                Transfer::CurrencyIn { from: ctx.signer, amount: loan.repayment },
                Transfer::CollateralOut {
                    to: loan.borrower,
                    token: loan.collateral_token,
                    token_id: loan.collateral_token_id,
                },
            ])?;
            Ok(loan.repayment)
        })
    }

    /// Repay an active loan and open a new one against the same collateral.
    /// An empty `collateral_context` carries the old one forward.
    #[allow(clippy::too_many_arguments)]
    pub fn refinance<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        receipt: &[u8],
        principal: u128,
        duration: u64,
        max_repayment: u128,
        ticks: &[u128],
        options: &BorrowOptions,
    ) -> Result<OriginatedLoan, PoolError> {
        self.transact("refinance", |state, events| {
            let old = state.settle_repayment(events, &*custody, ctx, receipt)?;

            let options = if options.collateral_context.is_empty() {
                BorrowOptions {
                    multiplier: options.multiplier,
                    collateral_context: old.collateral_context.clone(),
                }
            } else {
                options.clone()
            };
            let loan = state.originate(
                events,
                ctx,
                principal,
                duration,
                &old.collateral_token,
                old.collateral_token_id,
                max_repayment,
                ticks,
                &options,
            )?;

            let transfer = if old.repayment > principal {
                Some(Transfer::CurrencyIn { from: ctx.signer, amount: old.repayment - principal })
            } else if principal > old.repayment {
                Some(Transfer::CurrencyOut { to: ctx.signer, amount: principal - old.repayment })
            } else {
                None
            };
            if let Some(transfer) = transfer {
                custody.settle(&[transfer])?;
            }
            Ok(loan)
        })
    }

    /// Hand an expired loan's collateral to the collateral liquidator.
    pub fn liquidate<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        receipt: &[u8],
    ) -> Result<(), PoolError> {
        self.transact("liquidate", |state, events| {
            let loan = state.liquidate(events, ctx, receipt)?;
            let liquidator = Pubkey::new_from_array(state.config.collateral_liquidator);
            custody.settle(&[Transfer::CollateralOut {
                to: liquidator,
                token: loan.collateral_token,
                token_id: loan.collateral_token_id,
            }])?;
            Ok(())
        })
    }

    /// Callback from the collateral liquidator with the sale proceeds.
    /// Returns the surplus paid to the borrower.
    pub fn on_collateral_liquidated<C: Custody + ?Sized>(
        &mut self,
        custody: &mut C,
        ctx: &Context,
        receipt: &[u8],
        proceeds: u128,
    ) -> Result<u128, PoolError> {
        self.transact("on_collateral_liquidated", |state, events| {
            let (loan, borrower_proceeds) =
                state.collateral_liquidated(events, ctx, receipt, proceeds)?;

            let mut transfers = Vec::with_capacity(2);
            if proceeds != 0 {
                transfers.push(Transfer::CurrencyIn { from: ctx.signer, amount: proceeds });
            }
            if borrower_proceeds != 0 {
                transfers.push(Transfer::CurrencyOut { to: loan.borrower, amount: borrower_proceeds });
            }
            custody.settle(&transfers)?;
            Ok(borrower_proceeds)
        })
    }

    pub fn id(&self) -> &Pubkey {
        &self.state.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.state.config
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn liquidity_node(&self, tick: u128) -> NodeInfo {
        self.state.liquidity.liquidity_node(tick)
    }

    pub fn liquidity_nodes(&self, start: u128, end: u128) -> Vec<NodeInfo> {
        self.state.liquidity.liquidity_nodes(start, end)
    }

    pub fn liquidity_node_with_accrued(&self, tick: u128, now: u64) -> (NodeInfo, u128) {
        self.state.liquidity.liquidity_node_with_accrued(tick, now)
    }

    pub fn liquidity_statistics(&self) -> LiquidityStatistics {
        self.state.liquidity.liquidity_statistics()
    }

    pub fn utilization(&self) -> u128 {
        self.state.liquidity.utilization()
    }

    pub fn deposit_share_price(&self, tick: u128) -> Result<u128, PoolError> {
        match self.state.liquidity.node(tick) {
            Some(node) if node.is_linked() => node.deposit_price(),
            _ => Ok(FIXED_POINT_SCALE),
        }
    }

    pub fn redemption_share_price(&self, tick: u128) -> Result<u128, PoolError> {
        match self.state.liquidity.node(tick) {
            Some(node) => node.redemption_price(),
            None => Ok(FIXED_POINT_SCALE),
        }
    }

    /// Resolved part of an account's outstanding redemption.
    pub fn redemption_available(
        &self,
        account: &Pubkey,
        tick: u128,
        redemption_id: u128,
    ) -> Result<RedemptionAvailability, PoolError> {
        let redemption = self
            .redemption(account, tick, redemption_id)
            .ok_or(PoolError::InvalidRedemptionStatus)?;
        self.state.liquidity.redemption_available(
            tick,
            redemption.pending,
            redemption.index,
            redemption.target,
        )
    }

    pub fn loan_status(&self, receipt_hash: &[u8; 32]) -> LoanStatus {
        self.state.loans.get(receipt_hash).map_or(LoanStatus::Uninitialized, |r| r.status)
    }

    pub fn deposit_position(&self, account: &Pubkey, tick: u128) -> Option<&Deposit> {
        self.state.deposits.get(&(*account, tick))
    }

    pub fn redemption(&self, account: &Pubkey, tick: u128, redemption_id: u128) -> Option<&Redemption> {
        self.deposit_position(account, tick)?.redemptions.get(&redemption_id)
    }

    /// Currency absorbed from swept nodes.
    pub fn swept(&self) -> u128 {
        self.state.liquidity.swept()
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }
}
