//! Asset movement seam.
//!
//! The pool never moves tokens itself. Each operation computes its ledger
//! effects first and hands the resulting transfers to a [`Custody`] as the
//! last step; a custody that refuses any of them fails the whole operation.

use std::collections::BTreeMap;

use solana_program::pubkey::Pubkey;

use crate::error::PoolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    CurrencyIn { from: Pubkey, amount: u128 },
    CurrencyOut { to: Pubkey, amount: u128 },
    CollateralIn { from: Pubkey, token: Pubkey, token_id: u128 },
    CollateralOut { to: Pubkey, token: Pubkey, token_id: u128 },
}

pub trait Custody {
    /// Whether the pool currently holds the collateral item.
    fn holds_collateral(&self, token: &Pubkey, token_id: u128) -> bool;

    /// Apply all transfers or none of them.
    fn settle(&mut self, transfers: &[Transfer]) -> Result<(), PoolError>;
}

/// In-memory custody: currency balances per account plus collateral
/// ownership. Items owned by `key` are held by the pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vault {
    key: Pubkey,
    balances: BTreeMap<Pubkey, u128>,
    collateral: BTreeMap<(Pubkey, u128), Pubkey>,
}

impl Vault {
    pub fn new(key: Pubkey) -> Self {
        Self { key, ..Self::default() }
    }

    pub fn key(&self) -> &Pubkey {
        &self.key
    }

    pub fn mint_currency(&mut self, account: &Pubkey, amount: u128) {
        let balance = self.balances.entry(*account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn mint_collateral(&mut self, owner: &Pubkey, token: &Pubkey, token_id: u128) {
        self.collateral.insert((*token, token_id), *owner);
    }

    pub fn balance(&self, account: &Pubkey) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Currency held by the pool.
    pub fn pool_balance(&self) -> u128 {
        self.balance(&self.key)
    }

    pub fn collateral_owner(&self, token: &Pubkey, token_id: u128) -> Option<Pubkey> {
        self.collateral.get(&(*token, token_id)).copied()
    }

    fn move_currency(&mut self, from: &Pubkey, to: &Pubkey, amount: u128) -> Result<(), PoolError> {
        let source = self.balances.entry(*from).or_default();
        *source = source.checked_sub(amount).ok_or(PoolError::TransferFailed)?;
        let dest = self.balances.entry(*to).or_default();
        *dest = dest.checked_add(amount).ok_or(PoolError::TransferFailed)?;
        Ok(())
    }

    fn move_collateral(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        token: &Pubkey,
        token_id: u128,
    ) -> Result<(), PoolError> {
        match self.collateral.get_mut(&(*token, token_id)) {
            Some(owner) if owner == from => {
                *owner = *to;
                Ok(())
            }
            _ => Err(PoolError::TransferFailed),
        }
    }

    fn apply(&mut self, transfer: &Transfer) -> Result<(), PoolError> {
        let pool = self.key;
        match *transfer {
            Transfer::CurrencyIn { from, amount } => self.move_currency(&from, &pool, amount),
            Transfer::CurrencyOut { to, amount } => self.move_currency(&pool, &to, amount),
            Transfer::CollateralIn { from, token, token_id } => {
                self.move_collateral(&from, &pool, &token, token_id)
            }
            Transfer::CollateralOut { to, token, token_id } => {
                self.move_collateral(&pool, &to, &token, token_id)
            }
        }
    }
}

impl Custody for Vault {
    fn holds_collateral(&self, token: &Pubkey, token_id: u128) -> bool {
        self.collateral_owner(token, token_id) == Some(self.key)
    }

    fn settle(&mut self, transfers: &[Transfer]) -> Result<(), PoolError> {
        let mut staged = self.clone();
        for transfer in transfers {
            staged.apply(transfer)?;
        }
        *self = staged;
        Ok(())
    }
}
