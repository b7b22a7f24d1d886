//! # Lattice Chain Settlement Library
//!
//! Epoch-driven reward settlement for the four reward-bearing embedded
//! contracts of a block-lattice ledger (pillar, sentinel, stake, liquidity).
//!
//! ## Module Overview
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `types` | Core types: Address, Hash, TokenAmounts, ContractKind |
//! | `crypto` | SHA3-512 for the state root |
//! | `config` | `SettlementConfig`: defaults, `lattice.toml`, env overrides |
//! | `error` | `SettlementError` (user-visible vs fatal), `LedgerError` |
//! | `epoch` | `EpochClock`, `EpochWindow` |
//! | `trigger` | `UpdateTrigger`, per-contract settlement cursor |
//! | `tokenomics` | issuance schedule, reward pools, stake multiplier |
//! | `accumulator` | block counters, epoch snapshots, `SnapshotLog` |
//! | `allocator` | `RewardAllocator` per contract kind |
//! | `ledger` | `Ledger` collaborator trait, `MemoryLedger` |
//! | `issuance` | `IssuanceMinter`: mint + donate |
//! | `reward_executor` | one epoch settlement, all-or-nothing |
//! | `collect_reward_handler` | `CollectReward` two-phase withdrawal |
//! | `tx` | inbound `ContractBlock` / `MomentumSlot` |
//! | `engine` | `SettlementEngine`: trigger-then-call, halting |
//! | `rpc` | read-only queries as JSON-ready responses |
//! | `journal` | `WriteSet`: keys touched since the last commit |
//! | `db` | LMDB persistence: `SettlementDb`, incremental commits |
//! | `state` | `SettlementState`, registry, reward ledger, state root |
//!
//! ## Settlement Flow
//!
//! ```text
//! ContractBlock ──▶ UpdateTrigger ──Due(e)──▶ snapshot(e) ──▶ RewardAllocator
//!                        │                                         │
//!                   NotDueYet                               conservation check
//!                        │                                         │
//!                        ▼                                         ▼
//!                   method call ◀── advance(e) ◀── record ◀── mint + donate
//! ```
//!
//! Settlement never moves funds to a participant. Rewards sit in the
//! uncollected ledger until `CollectReward`, which sends from the contract's
//! own balance; the participant's account chain receives it later.
//!
//! ## Determinism (CONSENSUS-CRITICAL)
//!
//! - integer arithmetic only, every overflow is fatal
//! - `BTreeMap` everywhere, so iteration order is total
//! - the block timestamp is the only clock
//! - the state root is an order-independent sum of row hashes, moved row by
//!   row on commit and recomputed in full on load
pub mod types;
pub mod crypto;
pub mod config;
pub mod error;
pub mod epoch;
pub mod trigger;
pub mod tokenomics;
pub mod accumulator;
pub mod allocator;
pub mod ledger;
pub mod issuance;
pub mod reward_executor;
pub mod collect_reward_handler;
pub mod tx;
pub mod engine;
pub mod rpc;
pub mod journal;
pub mod db;
pub mod state; //direktori = /state/mod.rs

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

pub use config::SettlementConfig;
pub use db::SettlementDb;
pub use engine::{BlockReceipt, CallOutcome, SettlementEngine};
pub use error::{LedgerError, SettlementError, SettlementResult};
pub use ledger::{DurableLedger, Ledger, MemoryLedger, PendingTransfer, TransferId};
pub use rpc::RewardRpc;
pub use state::SettlementState;
pub use tx::{ContractBlock, ContractCall, MomentumSlot};
pub use types::{Address, ContractKind, Hash, TokenAmounts, TokenStandard};

/// Top-level node handle combining the database and the shared engine.
///
/// Every accepted block is persisted, together with the ledger, before the
/// write lock is released. A block that halts the engine is not persisted,
/// so the database keeps the last consistent state.
pub struct SettlementNode<L: DurableLedger = MemoryLedger> {
    pub db: Arc<SettlementDb>,
    pub engine: Arc<RwLock<SettlementEngine<L>>>,
}

impl<L: DurableLedger> Clone for SettlementNode<L> {
    fn clone(&self) -> Self {
        Self { db: Arc::clone(&self.db), engine: Arc::clone(&self.engine) }
    }
}

impl<L: DurableLedger> SettlementNode<L> {
    /// Open the database at `db_path` and resume from its state and ledger.
    /// `genesis` is used only when the database has never been written.
    pub fn open<P: AsRef<Path>>(config: SettlementConfig, db_path: P, genesis: L) -> anyhow::Result<Self> {
        let db = SettlementDb::open(db_path.as_ref())?;
        let state = db.load_state()?;
        let (ledger, resumed) = match db.load_ledger()? {
            Some(stored) => (stored, true),
            None => (genesis, false),
        };
        info!(
            path = %db_path.as_ref().display(),
            resumed,
            pillar_epoch = ?state.contract(ContractKind::Pillar).last_update_epoch,
            "settlement node opened"
        );
        let engine = SettlementEngine::with_state(config, state, ledger)?;
        Ok(Self { db: Arc::new(db), engine: Arc::new(RwLock::new(engine)) })
    }

    pub fn apply_block(&self, block: &ContractBlock) -> anyhow::Result<BlockReceipt> {
        let mut engine = self.engine.write();
        let receipt = engine.apply_block(block)?;
        let (state, ledger) = engine.parts_mut();
        self.db.persist(state, ledger)?;
        Ok(receipt)
    }

    pub fn record_momentum(&self, slot: MomentumSlot) -> anyhow::Result<()> {
        let mut engine = self.engine.write();
        engine.record_momentum(slot)?;
        let (state, ledger) = engine.parts_mut();
        self.db.persist(state, ledger)?;
        Ok(())
    }

    /// Second phase of a withdrawal: the recipient's chain receives it.
    pub fn receive_transfer(&self, id: TransferId) -> anyhow::Result<PendingTransfer> {
        let mut engine = self.engine.write();
        let transfer = engine.ledger_mut().receive(id)?;
        let (state, ledger) = engine.parts_mut();
        self.db.persist(state, ledger)?;
        Ok(transfer)
    }

    pub fn rpc(&self) -> RewardRpc<L> {
        RewardRpc::new(Arc::clone(&self.engine))
    }

    pub fn state_root(&self) -> anyhow::Result<Hash> {
        self.engine.read().state_root()
    }
}
