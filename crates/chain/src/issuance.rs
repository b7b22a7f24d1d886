//! # Issuance Minter
//!
//! Mints the epoch pool and donates it into the settling contract's own
//! balance. Runs exactly once per `(kind, epoch)`: the caller only invokes
//! it after the trigger reported the epoch as due, and the contract's
//! `last_update_epoch` then advances past it.

use tracing::debug;

use crate::error::SettlementResult;
use crate::ledger::Ledger;
use crate::tokenomics::RewardPool;
use crate::types::{TokenAmounts, TokenStandard};

pub struct IssuanceMinter;

impl IssuanceMinter {
    /// Mints every non-zero token of `pool` and donates it to the contract.
    /// Returns the amounts actually minted.
    pub fn mint_and_donate<L: Ledger>(ledger: &mut L, pool: &RewardPool) -> SettlementResult<TokenAmounts> {
        let treasury = pool.kind.contract_address();
        for token in TokenStandard::ALL {
            let amount = pool.amounts.get(token);
            if amount == 0 {
                continue;
            }
            ledger.mint(token, amount)?;
            ledger.donate(&treasury, token, amount, pool.epoch)?;
            debug!(kind = %pool.kind, epoch = pool.epoch, %token, amount, "pool minted and donated");
        }
        Ok(pool.amounts)
    }
}
