//! # Settlement Engine
//!
//! Applies the total-ordered block stream to the four reward contracts.
//!
//! ```text
//! apply_block(block)
//!   │
//!   ├─ halted?                      → Err(Halted)
//!   ├─ kind = from_address(to)      → Err(UnknownContract)
//!   │
//!   ├─ UpdateTrigger.evaluate(kind, height, ts)
//!   │     Due { e }   → settle_epoch(kind, e)     (at most one epoch)
//!   │     NotDueYet   → debug log only
//!   │
//!   └─ dispatch(call)               (after the trigger; a rejected call
//!                                    never rolls back the settlement)
//! ```
//!
//! The first fatal error latches the engine. Every later mutating call
//! returns `Halted`; queries keep working.

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::accumulator::EpochSnapshot;
use crate::collect_reward_handler::{handle_collect_reward, CollectOutcome};
use crate::config::SettlementConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::{Ledger, MemoryLedger, PendingTransfer};
use crate::reward_executor::{settle_epoch, SettlementOutcome};
use crate::state::{RewardPage, SettlementState};
use crate::trigger::{ContractSettlementState, TriggerDecision, UpdateTrigger};
use crate::tx::{ContractBlock, ContractCall, MomentumSlot};
use crate::types::{Address, ContractKind, Hash, TokenAmounts};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Done,
    Staked { id: u64 },
    Collected(CollectOutcome),
}

/// Result of one applied block: the settlement it triggered (if any) and
/// the outcome of its method call, which may be a user-visible rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReceipt {
    pub kind: ContractKind,
    pub height: u64,
    pub settled: Option<SettlementOutcome>,
    pub call: SettlementResult<CallOutcome>,
}

pub struct SettlementEngine<L: Ledger = MemoryLedger> {
    config: SettlementConfig,
    trigger: UpdateTrigger,
    state: SettlementState,
    ledger: L,
    halted: Option<SettlementError>,
}

impl<L: Ledger> SettlementEngine<L> {
    pub fn new(config: SettlementConfig, ledger: L) -> Result<Self> {
        Self::with_state(config, SettlementState::new(), ledger)
    }

    /// Resume from persisted state.
    pub fn with_state(config: SettlementConfig, state: SettlementState, ledger: L) -> Result<Self> {
        config.validate()?;
        let trigger = config.trigger();
        Ok(Self { config, trigger, state, ledger, halted: None })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // MUTATING ENTRY POINTS
    // ════════════════════════════════════════════════════════════════════════════

    pub fn apply_block(&mut self, block: &ContractBlock) -> SettlementResult<BlockReceipt> {
        self.ensure_running()?;

        let kind = match ContractKind::from_address(&block.to_address) {
            Some(k) => k,
            None => {
                warn!(to = %block.to_address, "block addressed to a non-reward contract");
                return Err(SettlementError::UnknownContract(block.to_address));
            }
        };

        let settled = match self.run_trigger(kind, block.height, block.timestamp) {
            Ok(s) => s,
            Err(e) => return Err(self.halt(e)),
        };

        let call = match self.dispatch(kind, block) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => return Err(self.halt(e)),
            Err(e) => {
                warn!(%kind, method = block.call.method_name(), sender = %block.address, error = %e, "call rejected");
                Err(e)
            }
        };

        Ok(BlockReceipt { kind, height: block.height, settled, call })
    }

    /// Counts one momentum slot. Slots of an already settled epoch are ignored,
    /// slots beyond the epoch's momentum count are rejected without halting.
    pub fn record_momentum(&mut self, slot: MomentumSlot) -> SettlementResult<()> {
        self.ensure_running()?;
        let epoch = self.trigger.clock().epoch_index(slot.timestamp);
        if let Some(last) = self.state.contract(ContractKind::Pillar).last_update_epoch {
            if epoch <= last {
                warn!(pillar = %slot.pillar, epoch, last_settled = last, "momentum slot for a settled epoch ignored");
                return Ok(());
            }
        }
        let limit = self.config.momentums_per_epoch();
        match self.state.record_slot(epoch, slot.pillar, slot.produced, limit) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(self.halt(e)),
            Err(e) => {
                warn!(pillar = %slot.pillar, epoch, error = %e, "momentum slot rejected");
                Err(e)
            }
        }
    }

    fn run_trigger(&mut self, kind: ContractKind, height: u64, timestamp: u64) -> SettlementResult<Option<SettlementOutcome>> {
        match self.trigger.evaluate(&self.state.contract(kind), height, timestamp) {
            TriggerDecision::Due { epoch } => {
                settle_epoch(&mut self.state, &mut self.ledger, &self.config, kind, epoch, height).map(Some)
            }
            TriggerDecision::NotDueYet(reason) => {
                debug!(%kind, height, ?reason, "settlement not due yet");
                Ok(None)
            }
        }
    }

    fn dispatch(&mut self, kind: ContractKind, block: &ContractBlock) -> SettlementResult<CallOutcome> {
        if !block.call.supported_by(kind) {
            return Err(SettlementError::MethodNotSupported {
                kind,
                method: block.call.method_name().to_string(),
            });
        }

        let sender = block.address;
        let ts = block.timestamp;
        let state = &mut self.state;
        let done = |_| CallOutcome::Done;

        match &block.call {
            ContractCall::Update => Ok(CallOutcome::Done),
            ContractCall::CollectReward => {
                handle_collect_reward(state, &mut self.ledger, kind, sender).map(CallOutcome::Collected)
            }
            ContractCall::RegisterPillar(params) => state.register_pillar(sender, params, ts).map(done),
            ContractCall::UpdatePillar(update) => state.update_pillar(sender, update).map(done),
            ContractCall::RevokePillar => state.revoke_pillar(sender, ts).map(done),
            ContractCall::Delegate { pillar } => state.delegate(sender, *pillar, ts).map(done),
            ContractCall::Undelegate => state.undelegate(sender).map(done),
            ContractCall::RegisterSentinel => state.register_sentinel(sender, ts).map(done),
            ContractCall::RevokeSentinel => state.revoke_sentinel(sender, ts).map(done),
            ContractCall::Stake { amount, duration_months } => state
                .stake(sender, *amount, *duration_months, ts)
                .map(|id| CallOutcome::Staked { id }),
            ContractCall::CancelStake { id } => state.cancel_stake(sender, *id, ts).map(done),
        }
    }

    fn ensure_running(&self) -> SettlementResult<()> {
        match &self.halted {
            Some(reason) => Err(SettlementError::Halted(reason.to_string())),
            None => Ok(()),
        }
    }

    fn halt(&mut self, e: SettlementError) -> SettlementError {
        error!(error = %e, "fatal settlement error, engine halted");
        if self.halted.is_none() {
            self.halted = Some(e.clone());
        }
        e
    }

    // ════════════════════════════════════════════════════════════════════════════
    // QUERIES (read-only)
    // ════════════════════════════════════════════════════════════════════════════

    pub fn uncollected_reward(&self, kind: ContractKind, address: &Address) -> TokenAmounts {
        self.state.rewards.uncollected(kind, address)
    }

    pub fn reward_history_page(&self, kind: ContractKind, address: &Address, page_index: u32, page_size: u32) -> RewardPage {
        self.state.rewards.history_page(kind, address, page_index, page_size)
    }

    pub fn epoch_snapshot(&self, kind: ContractKind, epoch: u64) -> Option<&EpochSnapshot> {
        self.state.snapshots.get(kind, epoch)
    }

    pub fn settlement_status(&self, kind: ContractKind) -> ContractSettlementState {
        self.state.contract(kind)
    }

    pub fn pending_transfers(&self, address: &Address) -> Vec<PendingTransfer> {
        self.ledger.pending_transfers(address)
    }

    pub fn state_root(&self) -> Result<Hash> {
        self.state.compute_state_root()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&SettlementError> {
        self.halted.as_ref()
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn state(&self) -> &SettlementState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The ledger collaborator, e.g. to `receive` a collected transfer.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// State and ledger together, for the database commit.
    pub(crate) fn parts_mut(&mut self) -> (&mut SettlementState, &mut L) {
        (&mut self.state, &mut self.ledger)
    }
}
