//! Tickpool: tick-indexed lending pool accounting core.

#![deny(unsafe_code)]

pub mod custody;
pub mod liquidity;
pub mod math;
pub mod pool;
pub mod receipt;
pub mod redemption;
pub mod tick;

// 1. mod constants
pub mod constants {
    use core::mem::size_of;
    use crate::state::PoolConfig;

    /// Fixed point scale for share prices and rates
    pub const FIXED_POINT_SCALE: u128 = 1_000_000_000_000_000_000;
    pub const BASIS_POINTS_SCALE: u128 = 10_000;

    /// Adjacent tick limits must differ by at least 10%
    pub const TICK_LIMIT_SPACING_BASIS_POINTS: u128 = 1_000;

    /// Node value below which an insolvent node is swept
    pub const NODE_DUST_THRESHOLD: u128 = 1_000_000;

    pub const MAX_CLASS_COUNT: usize = 8;

    pub const TICK_HEAD: u128 = 0;
    pub const TICK_TAIL: u128 = u128::MAX;

    pub const LOAN_RECEIPT_VERSION: u8 = 2;
    pub const LOAN_RECEIPT_HEADER_LEN: usize = 131;
    pub const LOAN_RECEIPT_NODE_LEN: usize = 48;

    pub const CONFIG_LEN: usize = size_of::<PoolConfig>();
}

// 2. mod error
pub mod error {
    use num_derive::FromPrimitive;
    use solana_program::{
        decode_error::DecodeError,
        msg,
        program_error::{PrintProgramError, ProgramError},
    };
    use thiserror::Error;

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Error, FromPrimitive)]
    pub enum PoolError {
        #[error("Invalid tick")]
        InvalidTick,
        #[error("Insufficient tick spacing")]
        InsufficientTickSpacing,
        #[error("Insolvent liquidity")]
        InsolventLiquidity,
        #[error("Inactive liquidity")]
        InactiveLiquidity,
        #[error("Insufficient liquidity")]
        InsufficientLiquidity,
        #[error("Invalid loan receipt")]
        InvalidLoanReceipt,
        #[error("Invalid caller")]
        InvalidCaller,
        #[error("Repayment too high")]
        RepaymentTooHigh,
        #[error("Loan not expired")]
        LoanNotExpired,
        #[error("Unsupported collateral")]
        UnsupportedCollateral,
        #[error("Unsupported loan duration")]
        UnsupportedLoanDuration,
        #[error("Invalid shares")]
        InvalidShares,
        #[error("Invalid redemption status")]
        InvalidRedemptionStatus,
        #[error("Invalid parameters")]
        InvalidParameters,
        #[error("Transfer failed")]
        TransferFailed,
        #[error("Collateral not held")]
        CollateralNotHeld,
        #[error("Reentrancy")]
        Reentrancy,
        #[error("Arithmetic overflow")]
        Overflow,
    }

    impl From<PoolError> for ProgramError {
        fn from(e: PoolError) -> Self {
            ProgramError::Custom(e as u32)
        }
    }

    impl<T> DecodeError<T> for PoolError {
        fn type_of() -> &'static str {
            "PoolError"
        }
    }

    impl PrintProgramError for PoolError {
        fn print<E>(&self)
        where
            E: 'static
                + std::error::Error
                + DecodeError<E>
                + PrintProgramError
                + num_traits::FromPrimitive,
        {
            msg!("Error: {}", self);
        }
    }
}

// 3. mod state
pub mod state {
    use bytemuck::{Pod, Zeroable};
    use solana_program::{program_error::ProgramError, pubkey::Pubkey};
    use crate::constants::{CONFIG_LEN, MAX_CLASS_COUNT};
    use crate::error::PoolError;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
    pub struct PoolConfig {
        /// The single collateral token this pool lends against
        pub collateral_token: [u8; 32],
        /// Receives expired collateral and reports proceeds back
        pub collateral_liquidator: [u8; 32],
        /// Duration classes in seconds, strictly ascending
        pub durations: [u64; MAX_CLASS_COUNT],
        /// Interest per second per unit, 1e18 scaled
        pub rates: [u64; MAX_CLASS_COUNT],
        pub duration_count: u8,
        pub rate_count: u8,
        pub _padding: [u8; 6],
    }

    impl PoolConfig {
        pub fn new(
            collateral_token: &Pubkey,
            collateral_liquidator: &Pubkey,
            durations: &[u64],
            rates: &[u64],
        ) -> Result<Self, PoolError> {
            if durations.len() > MAX_CLASS_COUNT || rates.len() > MAX_CLASS_COUNT {
                return Err(PoolError::InvalidParameters);
            }
            let mut config = PoolConfig::zeroed();
            config.collateral_token = collateral_token.to_bytes();
            config.collateral_liquidator = collateral_liquidator.to_bytes();
            config.durations[..durations.len()].copy_from_slice(durations);
            config.rates[..rates.len()].copy_from_slice(rates);
            config.duration_count = durations.len() as u8;
            config.rate_count = rates.len() as u8;
            config.validate()?;
            Ok(config)
        }

        pub fn durations(&self) -> &[u64] {
            &self.durations[..(self.duration_count as usize).min(MAX_CLASS_COUNT)]
        }

        pub fn rates(&self) -> &[u64] {
            &self.rates[..(self.rate_count as usize).min(MAX_CLASS_COUNT)]
        }

        pub fn validate(&self) -> Result<(), PoolError> {
            let counts = 1..=MAX_CLASS_COUNT;
            if !counts.contains(&(self.duration_count as usize))
                || !counts.contains(&(self.rate_count as usize))
            {
                return Err(PoolError::InvalidParameters);
            }
            let durations = self.durations();
            if durations[0] == 0 || durations.windows(2).any(|w| w[0] >= w[1]) {
                return Err(PoolError::InvalidParameters);
            }
            if self.rates().windows(2).any(|w| w[0] > w[1]) {
                return Err(PoolError::InvalidParameters);
            }
            if self.collateral_liquidator == [0; 32] {
                return Err(PoolError::InvalidParameters);
            }
            Ok(())
        }
    }

    pub fn read_config(data: &[u8]) -> Result<PoolConfig, ProgramError> {
        if data.len() != CONFIG_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let config: PoolConfig =
            bytemuck::try_pod_read_unaligned(data).map_err(|_| ProgramError::InvalidAccountData)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_config(c: &PoolConfig) -> Vec<u8> {
        bytemuck::bytes_of(c).to_vec()
    }
}

// 4. mod ix
pub mod ix {
    use solana_program::{program_error::ProgramError, pubkey::Pubkey};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Instruction {
        Deposit { tick: u128, amount: u128, min_shares: u128 },
        Redeem { tick: u128, shares: u128 },
        Withdraw { tick: u128, redemption_id: u128 },
        Borrow {
            principal: u128,
            duration: u64,
            collateral_token: Pubkey,
            collateral_token_id: u128,
            max_repayment: u128,
            multiplier: u128,
            ticks: Vec<u128>,
            collateral_context: Vec<u8>,
        },
        Repay { receipt: Vec<u8> },
        Refinance {
            receipt: Vec<u8>,
            principal: u128,
            duration: u64,
            max_repayment: u128,
            multiplier: u128,
            ticks: Vec<u128>,
        },
        Liquidate { receipt: Vec<u8> },
        OnCollateralLiquidated { receipt: Vec<u8>, proceeds: u128 },
        ProcessRedemptions { tick: u128 },
    }

    impl Instruction {
        pub fn decode(input: &[u8]) -> Result<Self, ProgramError> {
            let (&tag, mut rest) = input.split_first().ok_or(ProgramError::InvalidInstructionData)?;

            match tag {
                0 => {
                    let tick = read_u128(&mut rest)?;
                    let amount = read_u128(&mut rest)?;
                    let min_shares = read_u128(&mut rest)?;
                    Ok(Instruction::Deposit { tick, amount, min_shares })
                }
                1 => {
                    let tick = read_u128(&mut rest)?;
                    let shares = read_u128(&mut rest)?;
                    Ok(Instruction::Redeem { tick, shares })
                }
                2 => {
                    let tick = read_u128(&mut rest)?;
                    let redemption_id = read_u128(&mut rest)?;
                    Ok(Instruction::Withdraw { tick, redemption_id })
                }
                3 => {
                    let principal = read_u128(&mut rest)?;
                    let duration = read_u64(&mut rest)?;
                    let collateral_token = read_pubkey(&mut rest)?;
                    let collateral_token_id = read_u128(&mut rest)?;
                    let max_repayment = read_u128(&mut rest)?;
                    let multiplier = read_u128(&mut rest)?;
                    let ticks = read_ticks(&mut rest)?;
                    let collateral_context = read_bytes(&mut rest)?;
                    Ok(Instruction::Borrow {
                        principal,
                        duration,
                        collateral_token,
                        collateral_token_id,
                        max_repayment,
                        multiplier,
                        ticks,
                        collateral_context,
                    })
                }
                4 => {
                    let receipt = read_bytes(&mut rest)?;
                    Ok(Instruction::Repay { receipt })
                }
                5 => {
                    let receipt = read_bytes(&mut rest)?;
                    let principal = read_u128(&mut rest)?;
                    let duration = read_u64(&mut rest)?;
                    let max_repayment = read_u128(&mut rest)?;
                    let multiplier = read_u128(&mut rest)?;
                    let ticks = read_ticks(&mut rest)?;
                    Ok(Instruction::Refinance { receipt, principal, duration, max_repayment, multiplier, ticks })
                }
                6 => {
                    let receipt = read_bytes(&mut rest)?;
                    Ok(Instruction::Liquidate { receipt })
                }
                7 => {
                    let receipt = read_bytes(&mut rest)?;
                    let proceeds = read_u128(&mut rest)?;
                    Ok(Instruction::OnCollateralLiquidated { receipt, proceeds })
                }
                8 => {
                    let tick = read_u128(&mut rest)?;
                    Ok(Instruction::ProcessRedemptions { tick })
                }
                _ => Err(ProgramError::InvalidInstructionData),
            }
        }
    }

    fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8], ProgramError> {
        if input.len() < len {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (bytes, rest) = input.split_at(len);
        *input = rest;
        Ok(bytes)
    }

    fn read_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], ProgramError> {
        take(input, N)?.try_into().map_err(|_| ProgramError::InvalidInstructionData)
    }

    fn read_u8(input: &mut &[u8]) -> Result<u8, ProgramError> {
        let (&val, rest) = input.split_first().ok_or(ProgramError::InvalidInstructionData)?;
        *input = rest;
        Ok(val)
    }

    fn read_u16(input: &mut &[u8]) -> Result<u16, ProgramError> {
        Ok(u16::from_le_bytes(read_array(input)?))
    }

    fn read_u64(input: &mut &[u8]) -> Result<u64, ProgramError> {
        Ok(u64::from_le_bytes(read_array(input)?))
    }

    fn read_u128(input: &mut &[u8]) -> Result<u128, ProgramError> {
        Ok(u128::from_le_bytes(read_array(input)?))
    }

    fn read_pubkey(input: &mut &[u8]) -> Result<Pubkey, ProgramError> {
        Ok(Pubkey::new_from_array(read_array(input)?))
    }

    /// u8 count followed by that many tick keys.
    fn read_ticks(input: &mut &[u8]) -> Result<Vec<u128>, ProgramError> {
        let count = read_u8(input)?;
        (0..count).map(|_| read_u128(input)).collect()
    }

    /// u16 length prefixed byte string.
    fn read_bytes(input: &mut &[u8]) -> Result<Vec<u8>, ProgramError> {
        let len = read_u16(input)? as usize;
        Ok(take(input, len)?.to_vec())
    }
}

// 5. mod processor
pub mod processor {
    use solana_program::{
        clock::Clock, entrypoint::ProgramResult, program_error::ProgramError, pubkey::Pubkey,
    };
    use crate::{
        custody::Custody,
        ix::Instruction,
        pool::{BorrowOptions, Context, Pool},
    };

    pub fn process_instruction<C: Custody + ?Sized>(
        pool: &mut Pool,
        custody: &mut C,
        signer: &Pubkey,
        clock: &Clock,
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = Instruction::decode(instruction_data)?;
        let timestamp =
            u64::try_from(clock.unix_timestamp).map_err(|_| ProgramError::InvalidArgument)?;
        let ctx = Context { signer: *signer, timestamp };

        match instruction {
            Instruction::Deposit { tick, amount, min_shares } => {
                pool.deposit(custody, &ctx, tick, amount, min_shares)?;
            }
            Instruction::Redeem { tick, shares } => {
                pool.redeem(&ctx, tick, shares)?;
            }
            Instruction::Withdraw { tick, redemption_id } => {
                pool.withdraw(custody, &ctx, tick, redemption_id)?;
            }
            Instruction::Borrow {
                principal,
                duration,
                collateral_token,
                collateral_token_id,
                max_repayment,
                multiplier,
                ticks,
                collateral_context,
            } => {
                let options = BorrowOptions { multiplier, collateral_context };
                pool.borrow(
                    custody,
                    &ctx,
                    principal,
                    duration,
                    &collateral_token,
                    collateral_token_id,
                    max_repayment,
                    &ticks,
                    &options,
                )?;
            }
            Instruction::Repay { receipt } => {
                pool.repay(custody, &ctx, &receipt)?;
            }
            Instruction::Refinance { receipt, principal, duration, max_repayment, multiplier, ticks } => {
                let options = BorrowOptions { multiplier, collateral_context: Vec::new() };
                pool.refinance(custody, &ctx, &receipt, principal, duration, max_repayment, &ticks, &options)?;
            }
            Instruction::Liquidate { receipt } => {
                pool.liquidate(custody, &ctx, &receipt)?;
            }
            Instruction::OnCollateralLiquidated { receipt, proceeds } => {
                pool.on_collateral_liquidated(custody, &ctx, &receipt, proceeds)?;
            }
            Instruction::ProcessRedemptions { tick } => {
                pool.process_redemptions(tick)?;
            }
        }
        Ok(())
    }
}
