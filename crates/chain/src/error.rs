//! # Settlement Error Taxonomy
//!
//! | Class | Variants | Engine reaction |
//! |-------|----------|-----------------|
//! | User-visible | `NothingToWithdraw`, `DataNonExistent`, validation errors, `EpochSlotsExhausted` | call or slot rejected, state untouched |
//! | Fatal | `ArithmeticOverflow`, `ConservationViolated`, `SnapshotAlreadyFrozen`, `EpochOutOfOrder`, `DuplicateRewardEntry`, `SnapshotMismatch`, `Ledger` | engine halts |
//! | Latched | `Halted` | every later block is refused |
//!
//! "Not due yet" is not an error at all: the trigger reports it as a
//! [`crate::trigger::TriggerDecision`] and the engine only logs it.
//!
//! A fatal error means two honest nodes could diverge. The engine must
//! stop instead of continuing with a state nobody else will compute.

use thiserror::Error;

use crate::types::{Address, ContractKind, TokenAmounts, TokenStandard};

// ════════════════════════════════════════════════════════════════════════════════
// LEDGER COLLABORATOR ERRORS
// ════════════════════════════════════════════════════════════════════════════════

/// Failures reported by the ledger collaborator (mint, donate, send, receive).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient {token} balance on {address}: need {needed}, have {available}")]
    InsufficientBalance {
        address: Address,
        token: TokenStandard,
        needed: u128,
        available: u128,
    },

    #[error("unknown transfer id {0}")]
    UnknownTransfer(u64),

    #[error("transfer {0} already received")]
    AlreadyReceived(u64),

    #[error("{0} total supply overflow")]
    SupplyOverflow(TokenStandard),

    #[error("{0} balance overflow on {1}")]
    BalanceOverflow(TokenStandard, Address),
}

// ════════════════════════════════════════════════════════════════════════════════
// SETTLEMENT ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    // ── user-visible ────────────────────────────────────────────────
    #[error("nothing to withdraw")]
    NothingToWithdraw,

    #[error("data non existent")]
    DataNonExistent,

    #[error("{kind} entry already registered for {owner}")]
    AlreadyRegistered { kind: ContractKind, owner: Address },

    #[error("invalid percentage {0}: must be between 0 and 100")]
    InvalidPercentage(u8),

    #[error("invalid stake duration: {0} months")]
    InvalidStakeDuration(u64),

    #[error("invalid amount {0}")]
    InvalidAmount(u128),

    #[error("stake {id} not expired: expires at {expiration}")]
    StakeNotExpired { id: u64, expiration: u64 },

    #[error("permission denied")]
    PermissionDenied,

    #[error("method {method} not supported by {kind} contract")]
    MethodNotSupported { kind: ContractKind, method: String },

    #[error("address {0} is not a reward contract")]
    UnknownContract(Address),

    #[error("invalid page size {0}")]
    InvalidPageSize(u32),

    #[error("epoch {epoch} already has {limit} momentum slots")]
    EpochSlotsExhausted { epoch: u64, limit: u64 },

    // ── fatal ───────────────────────────────────────────────────────
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("{kind} epoch {epoch}: distributed {distributed} exceeds pool {pool}")]
    ConservationViolated {
        kind: ContractKind,
        epoch: u64,
        distributed: TokenAmounts,
        pool: TokenAmounts,
    },

    #[error("{kind} snapshot for epoch {epoch} already frozen")]
    SnapshotAlreadyFrozen { kind: ContractKind, epoch: u64 },

    #[error("{kind} settled out of order: expected epoch {expected}, got {got}")]
    EpochOutOfOrder { kind: ContractKind, expected: u64, got: u64 },

    #[error("{kind} reward entry for {address} at epoch {epoch} already recorded")]
    DuplicateRewardEntry {
        kind: ContractKind,
        address: Address,
        epoch: u64,
    },

    #[error("snapshot kind mismatch: allocator {allocator}, snapshot {snapshot}")]
    SnapshotMismatch {
        allocator: ContractKind,
        snapshot: ContractKind,
    },

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("settlement halted: {0}")]
    Halted(String),
}

impl SettlementError {
    /// True when the error indicates a consensus bug and the engine must halt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SettlementError::ArithmeticOverflow(_)
                | SettlementError::ConservationViolated { .. }
                | SettlementError::SnapshotAlreadyFrozen { .. }
                | SettlementError::EpochOutOfOrder { .. }
                | SettlementError::DuplicateRewardEntry { .. }
                | SettlementError::SnapshotMismatch { .. }
                | SettlementError::Ledger(_)
                | SettlementError::Halted(_)
        )
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_not_fatal() {
        assert!(!SettlementError::NothingToWithdraw.is_fatal());
        assert!(!SettlementError::InvalidPageSize(0).is_fatal());
        assert!(!SettlementError::PermissionDenied.is_fatal());
        assert!(!SettlementError::EpochSlotsExhausted { epoch: 0, limit: 120 }.is_fatal());
    }

    #[test]
    fn consensus_errors_are_fatal() {
        assert!(SettlementError::ArithmeticOverflow("pool").is_fatal());
        assert!(SettlementError::Ledger(LedgerError::UnknownTransfer(3)).is_fatal());
        assert!(SettlementError::EpochOutOfOrder {
            kind: ContractKind::Stake,
            expected: 1,
            got: 3
        }
        .is_fatal());
    }

    #[test]
    fn display_messages() {
        assert_eq!(SettlementError::NothingToWithdraw.to_string(), "nothing to withdraw");
        let e: SettlementError = LedgerError::AlreadyReceived(9).into();
        assert_eq!(e.to_string(), "ledger: transfer 9 already received");
    }
}
