//! # CollectReward Handler
//!
//! First phase of the two-phase withdrawal. The participant's uncollected
//! total is zeroed and one outbound transfer per non-zero token is queued
//! from the contract's own balance. The participant's balance only changes
//! when the ledger collaborator later runs `receive` on that transfer.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │            handle_collect_reward(state, ledger, kind, addr)        │
//! │                                                                    │
//! │  STEP 1 ─ READ (read-only)                                        │
//! │  │  uncollected = rewards.uncollected(kind, addr)                  │
//! │  │  ← zero? → NothingToWithdraw                                    │
//! │  │                                                                 │
//! │  STEP 2 ─ TREASURY CHECK (read-only)                              │
//! │  │  balance(contract, token) ≥ uncollected.token                   │
//! │  │  ← short? → Ledger(InsufficientBalance)  (fatal)                │
//! │  │                                                                 │
//! │  ════════════════════ MUTATION BOUNDARY ═══════════════════════    │
//! │  │                                                                 │
//! │  STEP 3 ─ ZERO collectible balance (history retained)             │
//! │  STEP 4 ─ SEND one transfer per non-zero token                    │
//! │      → Ok(CollectOutcome { collected, transfers })                 │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rewards never expire. They can stay uncollected for any number of epochs.

use tracing::info;

use crate::error::{LedgerError, SettlementError, SettlementResult};
use crate::ledger::{Ledger, TransferId};
use crate::state::SettlementState;
use crate::types::{Address, ContractKind, TokenAmounts, TokenStandard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOutcome {
    pub kind: ContractKind,
    pub address: Address,
    pub collected: TokenAmounts,
    /// One per non-zero token, ZNN first.
    pub transfers: Vec<TransferId>,
}

pub fn handle_collect_reward<L: Ledger>(
    state: &mut SettlementState,
    ledger: &mut L,
    kind: ContractKind,
    address: Address,
) -> SettlementResult<CollectOutcome> {
    if kind == ContractKind::Liquidity {
        return Err(SettlementError::MethodNotSupported {
            kind,
            method: "CollectReward".to_string(),
        });
    }

    // STEP 1
    let uncollected = state.rewards.uncollected(kind, &address);
    if uncollected.is_zero() {
        return Err(SettlementError::NothingToWithdraw);
    }

    // STEP 2
    let treasury = kind.contract_address();
    for token in TokenStandard::ALL {
        let needed = uncollected.get(token);
        let available = ledger.balance(&treasury, token);
        if needed > available {
            return Err(LedgerError::InsufficientBalance {
                address: treasury,
                token,
                needed,
                available,
            }
            .into());
        }
    }

    // ════════════════════ MUTATION BOUNDARY ════════════════════

    // STEP 3
    let collected = state.take_uncollected(kind, &address);

    // STEP 4
    let mut transfers = Vec::new();
    for token in TokenStandard::ALL {
        let amount = collected.get(token);
        if amount == 0 {
            continue;
        }
        transfers.push(ledger.send(&treasury, &address, token, amount)?);
    }

    info!(%kind, %address, %collected, transfers = transfers.len(), "reward collected");
    Ok(CollectOutcome { kind, address, collected, transfers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn funded(kind: ContractKind, znn: u128, qsr: u128) -> MemoryLedger {
        let mut l = MemoryLedger::new();
        l.genesis_credit(kind.contract_address(), TokenStandard::Znn, znn).unwrap();
        l.genesis_credit(kind.contract_address(), TokenStandard::Qsr, qsr).unwrap();
        l
    }

    #[test]
    fn nothing_to_withdraw_on_empty() {
        let mut s = SettlementState::new();
        let mut l = MemoryLedger::new();
        assert_eq!(
            handle_collect_reward(&mut s, &mut l, ContractKind::Sentinel, addr(1)),
            Err(SettlementError::NothingToWithdraw)
        );
    }

    #[test]
    fn collect_queues_transfers_per_token() {
        let mut s = SettlementState::new();
        let mut l = funded(ContractKind::Sentinel, 100, 100);
        s.record_reward(ContractKind::Sentinel, addr(1), 0, TokenAmounts::new(30, 40)).unwrap();

        let out = handle_collect_reward(&mut s, &mut l, ContractKind::Sentinel, addr(1)).unwrap();
        assert_eq!(out.collected, TokenAmounts::new(30, 40));
        assert_eq!(out.transfers.len(), 2);
        assert_eq!(l.balance(&addr(1), TokenStandard::Znn), 0);
        assert_eq!(l.pending_transfers(&addr(1)).len(), 2);
        assert!(s.rewards.uncollected(ContractKind::Sentinel, &addr(1)).is_zero());
        assert_eq!(s.rewards.history_count(ContractKind::Sentinel, &addr(1)), 1);

        for id in out.transfers {
            l.receive(id).unwrap();
        }
        assert_eq!(l.balance(&addr(1), TokenStandard::Qsr), 40);
    }

    #[test]
    fn zero_token_is_skipped() {
        let mut s = SettlementState::new();
        let mut l = funded(ContractKind::Stake, 0, 100);
        s.record_reward(ContractKind::Stake, addr(1), 0, TokenAmounts::new(0, 40)).unwrap();
        let out = handle_collect_reward(&mut s, &mut l, ContractKind::Stake, addr(1)).unwrap();
        assert_eq!(out.transfers.len(), 1);
    }

    #[test]
    fn underfunded_treasury_is_fatal_and_untouched() {
        let mut s = SettlementState::new();
        let mut l = funded(ContractKind::Stake, 0, 10);
        s.record_reward(ContractKind::Stake, addr(1), 0, TokenAmounts::new(0, 40)).unwrap();
        let err = handle_collect_reward(&mut s, &mut l, ContractKind::Stake, addr(1)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(s.rewards.uncollected(ContractKind::Stake, &addr(1)), TokenAmounts::new(0, 40));
    }

    #[test]
    fn liquidity_has_no_collect() {
        let mut s = SettlementState::new();
        let mut l = MemoryLedger::new();
        assert!(matches!(
            handle_collect_reward(&mut s, &mut l, ContractKind::Liquidity, addr(1)),
            Err(SettlementError::MethodNotSupported { .. })
        ));
    }
}
