//! Loan receipt wire format.
//!
//! Little-endian, fixed header followed by the collateral context and one
//! record per funding node:
//!
//! ```text
//! version       u8
//! borrower      [u8; 32]
//! principal     u128
//! repayment     u128
//! maturity      u64
//! duration      u64
//! collat_token  [u8; 32]
//! collat_id     u128
//! context_len   u16
//! context       [u8; context_len]
//! nodes         N x (tick u128, used u128, pending u128)
//! ```
//!
//! The pool stores only `keccak(pool_id || encoded)`; the borrower presents
//! the full receipt back on repay, refinance and liquidation.

use arrayref::{array_ref, array_refs};
use solana_program::{keccak, pubkey::Pubkey};

use crate::constants::{LOAN_RECEIPT_HEADER_LEN, LOAN_RECEIPT_NODE_LEN, LOAN_RECEIPT_VERSION};
use crate::error::PoolError;
use crate::math::checked_add;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeReceipt {
    pub tick: u128,
    pub used: u128,
    pub pending: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoanReceipt {
    pub version: u8,
    pub borrower: Pubkey,
    pub principal: u128,
    pub repayment: u128,
    pub maturity: u64,
    pub duration: u64,
    pub collateral_token: Pubkey,
    pub collateral_token_id: u128,
    pub collateral_context: Vec<u8>,
    pub nodes: Vec<NodeReceipt>,
}

impl LoanReceipt {
    pub fn encode(&self) -> Result<Vec<u8>, PoolError> {
        let context_len =
            u16::try_from(self.collateral_context.len()).map_err(|_| PoolError::InvalidParameters)?;

        let mut out = Vec::with_capacity(
            LOAN_RECEIPT_HEADER_LEN
                + self.collateral_context.len()
                + self.nodes.len() * LOAN_RECEIPT_NODE_LEN,
        );
        out.push(self.version);
        out.extend_from_slice(self.borrower.as_ref());
        out.extend_from_slice(&self.principal.to_le_bytes());
        out.extend_from_slice(&self.repayment.to_le_bytes());
        out.extend_from_slice(&self.maturity.to_le_bytes());
        out.extend_from_slice(&self.duration.to_le_bytes());
        out.extend_from_slice(self.collateral_token.as_ref());
        out.extend_from_slice(&self.collateral_token_id.to_le_bytes());
        out.extend_from_slice(&context_len.to_le_bytes());
        out.extend_from_slice(&self.collateral_context);
        for node in &self.nodes {
            out.extend_from_slice(&node.tick.to_le_bytes());
            out.extend_from_slice(&node.used.to_le_bytes());
            out.extend_from_slice(&node.pending.to_le_bytes());
        }
        Ok(out)
    }

    /// Sum of `used` and `pending` over the funding nodes.
    pub fn totals(&self) -> Result<(u128, u128), PoolError> {
        self.nodes.iter().try_fold((0u128, 0u128), |(used, pending), node| {
            Ok((checked_add(used, node.used)?, checked_add(pending, node.pending)?))
        })
    }

    pub fn decode(data: &[u8]) -> Result<Self, PoolError> {
        if data.len() < LOAN_RECEIPT_HEADER_LEN {
            return Err(PoolError::InvalidLoanReceipt);
        }
        let header = array_ref![data, 0, LOAN_RECEIPT_HEADER_LEN];
        let (
            version,
            borrower,
            principal,
            repayment,
            maturity,
            duration,
            collateral_token,
            collateral_token_id,
            context_len,
        ) = array_refs![header, 1, 32, 16, 16, 8, 8, 32, 16, 2];

        if version[0] != LOAN_RECEIPT_VERSION {
            return Err(PoolError::InvalidLoanReceipt);
        }

        let context_len = u16::from_le_bytes(*context_len) as usize;
        let rest = &data[LOAN_RECEIPT_HEADER_LEN..];
        if rest.len() < context_len {
            return Err(PoolError::InvalidLoanReceipt);
        }
        let (context, records) = rest.split_at(context_len);
        if records.is_empty() || records.len() % LOAN_RECEIPT_NODE_LEN != 0 {
            return Err(PoolError::InvalidLoanReceipt);
        }

        let nodes = records
            .chunks_exact(LOAN_RECEIPT_NODE_LEN)
            .map(|chunk| {
                let record = array_ref![chunk, 0, LOAN_RECEIPT_NODE_LEN];
                let (tick, used, pending) = array_refs![record, 16, 16, 16];
                NodeReceipt {
                    tick: u128::from_le_bytes(*tick),
                    used: u128::from_le_bytes(*used),
                    pending: u128::from_le_bytes(*pending),
                }
            })
            .collect();

        Ok(Self {
            version: version[0],
            borrower: Pubkey::new_from_array(*borrower),
            principal: u128::from_le_bytes(*principal),
            repayment: u128::from_le_bytes(*repayment),
            maturity: u64::from_le_bytes(*maturity),
            duration: u64::from_le_bytes(*duration),
            collateral_token: Pubkey::new_from_array(*collateral_token),
            collateral_token_id: u128::from_le_bytes(*collateral_token_id),
            collateral_context: context.to_vec(),
            nodes,
        })
    }
}

/// Receipt identity, scoped to the issuing pool.
pub fn hash(pool_id: &Pubkey, encoded: &[u8]) -> [u8; 32] {
    keccak::hashv(&[pool_id.as_ref(), encoded]).to_bytes()
}
