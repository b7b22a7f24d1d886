//! # Settlement Database (LMDB)
//!
//! One named database per settlement table and per ledger table. Values are
//! bincode, integer key parts are big-endian so cursor order equals numeric
//! order.
//!
//! | Bucket | Key | Value |
//! |--------|-----|-------|
//! | `contract_state` | `kind` | `ContractSettlementState` |
//! | `pillars` | `owner` | `PillarEntry` |
//! | `sentinels` | `owner` | `SentinelEntry` |
//! | `stakes` | `id` | `StakeEntry` |
//! | `delegations` | `delegator` | `Delegation` |
//! | `block_counters` | `epoch ‖ pillar` | `BlockCounter` |
//! | `epoch_snapshots` | `kind ‖ epoch` | `EpochSnapshot` |
//! | `reward_history` | `kind ‖ address ‖ epoch` | `TokenAmounts` |
//! | `reward_uncollected` | `kind ‖ address` | `TokenAmounts` |
//! | `meta` | `next_stake_id`, `state_root` | `u64`, raw 64 bytes |
//! | `ledger_*` | see [`crate::ledger::LedgerTable`] | ledger rows |
//!
//! `persist` writes only the rows touched since the previous commit and
//! moves the stored root by the difference of those rows, all inside one
//! write transaction: a crash leaves either the old or the new state.
//! `load_state` recomputes the root over every row and refuses a mismatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction as LmdbTxn, WriteFlags};
use thiserror::Error;
use tracing::{debug, info};

use crate::accumulator::{BlockCounter, EpochSnapshot, SnapshotLog, WeightAccumulator};
use crate::ledger::{DurableLedger, LedgerRecord, LedgerTable};
use crate::state::{
    Delegation, PillarEntry, SentinelEntry, SettlementState, StakeEntry, StateRoot, Table, UncollectedRewardLedger,
    META_NEXT_STAKE_ID,
};
use crate::trigger::ContractSettlementState;
use crate::types::{Address, ContractKind, Hash, TokenAmounts};

// ════════════════════════════════════════════════════════════════════════════
// ERROR TYPE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum DbError {
    /// Key length does not match the bucket layout
    #[error("malformed key in bucket {bucket}: {len} bytes")]
    MalformedKey { bucket: &'static str, len: usize },

    #[error("unknown contract tag {0}")]
    UnknownContractTag(u8),

    #[error("missing meta key: {0}")]
    MissingMeta(&'static str),

    /// Stored root tidak sama dengan root hasil hitung ulang
    #[error("state corrupted: state_root mismatch (expected: {expected}, computed: {computed})")]
    StateRootMismatch { expected: String, computed: String },
}

const META_STATE_ROOT: &[u8] = b"state_root";

// ════════════════════════════════════════════════════════════════════════════
// KEYS
// ════════════════════════════════════════════════════════════════════════════

fn kind_from_tag(b: u8) -> Result<ContractKind> {
    ContractKind::from_byte(b).ok_or_else(|| DbError::UnknownContractTag(b).into())
}

fn address_at(key: &[u8], offset: usize) -> Address {
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&key[offset..offset + 20]);
    Address(arr)
}

fn u64_at(key: &[u8], offset: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&key[offset..offset + 8]);
    u64::from_be_bytes(arr)
}

fn check_len(bucket: &'static str, key: &[u8], expected: usize) -> Result<()> {
    if key.len() != expected {
        return Err(DbError::MalformedKey { bucket, len: key.len() }.into());
    }
    Ok(())
}

fn root_from(bytes: &[u8]) -> Result<Hash> {
    check_len(Table::Meta.bucket(), bytes, 64)?;
    let mut arr = [0u8; 64];
    arr.copy_from_slice(bytes);
    Ok(Hash::from_bytes(arr))
}

// ════════════════════════════════════════════════════════════════════════════
// DATABASE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SettlementDb {
    env: Arc<Environment>,
    env_path: PathBuf,
    db_contract_state: Database,
    db_pillars: Database,
    db_sentinels: Database,
    db_stakes: Database,
    db_delegations: Database,
    db_block_counters: Database,
    db_epoch_snapshots: Database,
    db_reward_history: Database,
    db_reward_uncollected: Database,
    db_meta: Database,
    db_ledger_balances: Database,
    db_ledger_supply: Database,
    db_ledger_transfers: Database,
    db_ledger_donations: Database,
    db_ledger_meta: Database,
}

impl SettlementDb {
    /// Open LMDB environment at path, create named DBs
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let p = path.as_ref();
        std::fs::create_dir_all(p)?;

        let env = Environment::new()
            .set_max_dbs(16)
            .set_map_size(1_000_000_000usize)
            .open(p)?;

        let create = |name: &str| env.create_db(Some(name), DatabaseFlags::empty());
        let db_contract_state = create(Table::Contracts.bucket())?;
        let db_pillars = create(Table::Pillars.bucket())?;
        let db_sentinels = create(Table::Sentinels.bucket())?;
        let db_stakes = create(Table::Stakes.bucket())?;
        let db_delegations = create(Table::Delegations.bucket())?;
        let db_block_counters = create(Table::BlockCounters.bucket())?;
        let db_epoch_snapshots = create(Table::EpochSnapshots.bucket())?;
        let db_reward_history = create(Table::RewardHistory.bucket())?;
        let db_reward_uncollected = create(Table::RewardUncollected.bucket())?;
        let db_meta = create(Table::Meta.bucket())?;
        let db_ledger_balances = create(LedgerTable::Balances.bucket())?;
        let db_ledger_supply = create(LedgerTable::Supply.bucket())?;
        let db_ledger_transfers = create(LedgerTable::Transfers.bucket())?;
        let db_ledger_donations = create(LedgerTable::Donations.bucket())?;
        let db_ledger_meta = create(LedgerTable::Meta.bucket())?;

        Ok(Self {
            env: Arc::new(env),
            env_path: p.to_path_buf(),
            db_contract_state,
            db_pillars,
            db_sentinels,
            db_stakes,
            db_delegations,
            db_block_counters,
            db_epoch_snapshots,
            db_reward_history,
            db_reward_uncollected,
            db_meta,
            db_ledger_balances,
            db_ledger_supply,
            db_ledger_transfers,
            db_ledger_donations,
            db_ledger_meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.env_path
    }

    fn db(&self, table: Table) -> Database {
        match table {
            Table::Contracts => self.db_contract_state,
            Table::Pillars => self.db_pillars,
            Table::Sentinels => self.db_sentinels,
            Table::Stakes => self.db_stakes,
            Table::Delegations => self.db_delegations,
            Table::BlockCounters => self.db_block_counters,
            Table::EpochSnapshots => self.db_epoch_snapshots,
            Table::RewardHistory => self.db_reward_history,
            Table::RewardUncollected => self.db_reward_uncollected,
            Table::Meta => self.db_meta,
        }
    }

    fn ledger_db(&self, table: LedgerTable) -> Database {
        match table {
            LedgerTable::Balances => self.db_ledger_balances,
            LedgerTable::Supply => self.db_ledger_supply,
            LedgerTable::Transfers => self.db_ledger_transfers,
            LedgerTable::Donations => self.db_ledger_donations,
            LedgerTable::Meta => self.db_ledger_meta,
        }
    }

    /// True once `persist` has committed at least once.
    pub fn has_state(&self) -> Result<bool> {
        Ok(self.stored_root()?.is_some())
    }

    /// Root written by the last commit, without recomputation.
    pub fn stored_root(&self) -> Result<Option<Hash>> {
        let rtxn = self.env.begin_ro_txn()?;
        match get_owned(&rtxn, self.db_meta, META_STATE_ROOT)? {
            Some(v) => Ok(Some(root_from(&v)?)),
            None => Ok(None),
        }
    }

    // ------------------------
    // write
    // ------------------------

    /// Commit the rows `state` and `ledger` changed since their last commit.
    ///
    /// The first commit into an empty database writes every row. Write sets
    /// are cleared only after the transaction commits.
    pub fn persist<L: DurableLedger>(&self, state: &mut SettlementState, ledger: &mut L) -> Result<Hash> {
        let mut wtxn = self.env.begin_rw_txn()?;
        let stored = get_owned(&wtxn, self.db_meta, META_STATE_ROOT)?;

        let (mut root, rows, ledger_rows) = match stored {
            Some(v) => (StateRoot::from_hash(&root_from(&v)?), state.pending_records()?, ledger.pending_records()?),
            None => (StateRoot::default(), state.records()?, ledger.records()?),
        };

        for r in &rows {
            let db = self.db(r.table);
            let old = get_owned(&wtxn, db, &r.key)?;
            root.replace_row(r.table, &r.key, old.as_deref(), r.value.as_deref());
            write_row(&mut wtxn, db, &r.key, r.value.as_deref())?;
        }
        for LedgerRecord { table, key, value } in &ledger_rows {
            write_row(&mut wtxn, self.ledger_db(*table), key, value.as_deref())?;
        }

        let root = root.to_hash();
        wtxn.put(self.db_meta, &META_STATE_ROOT, root.as_bytes(), WriteFlags::empty())?;
        wtxn.commit()?;

        state.mark_persisted();
        ledger.mark_persisted();
        debug!(
            path = %self.env_path.display(),
            rows = rows.len(),
            ledger_rows = ledger_rows.len(),
            state_root = %root,
            "settlement state persisted"
        );
        Ok(root)
    }

    // ------------------------
    // read
    // ------------------------

    /// Load the stored state. An empty database yields `SettlementState::new()`.
    pub fn load_state(&self) -> Result<SettlementState> {
        let Some(expected) = self.stored_root()? else {
            return Ok(SettlementState::new());
        };

        let rtxn = self.env.begin_ro_txn()?;
        let mut state = SettlementState::new();

        for (key, val) in scan(&rtxn, self.db_contract_state)? {
            check_len(Table::Contracts.bucket(), &key, 1)?;
            let kind = kind_from_tag(key[0])?;
            let cs: ContractSettlementState = bincode::deserialize(&val)?;
            state.contracts.insert(kind, cs);
        }
        for (key, val) in scan(&rtxn, self.db_pillars)? {
            check_len(Table::Pillars.bucket(), &key, 20)?;
            let entry: PillarEntry = bincode::deserialize(&val)?;
            state.pillars.insert(address_at(&key, 0), entry);
        }
        for (key, val) in scan(&rtxn, self.db_sentinels)? {
            check_len(Table::Sentinels.bucket(), &key, 20)?;
            let entry: SentinelEntry = bincode::deserialize(&val)?;
            state.sentinels.insert(address_at(&key, 0), entry);
        }
        for (key, val) in scan(&rtxn, self.db_stakes)? {
            check_len(Table::Stakes.bucket(), &key, 8)?;
            let entry: StakeEntry = bincode::deserialize(&val)?;
            state.stakes.insert(u64_at(&key, 0), entry);
        }
        for (key, val) in scan(&rtxn, self.db_delegations)? {
            check_len(Table::Delegations.bucket(), &key, 20)?;
            let d: Delegation = bincode::deserialize(&val)?;
            state.delegations.insert(address_at(&key, 0), d);
        }

        let mut accumulator = WeightAccumulator::new();
        for (key, val) in scan(&rtxn, self.db_block_counters)? {
            check_len(Table::BlockCounters.bucket(), &key, 28)?;
            let counter: BlockCounter = bincode::deserialize(&val)?;
            accumulator.insert(u64_at(&key, 0), address_at(&key, 8), counter);
        }
        state.accumulator = accumulator;

        let mut snapshots = SnapshotLog::new();
        for (key, val) in scan(&rtxn, self.db_epoch_snapshots)? {
            check_len(Table::EpochSnapshots.bucket(), &key, 9)?;
            let snap: EpochSnapshot = bincode::deserialize(&val)?;
            snapshots.freeze(snap)?;
        }
        state.snapshots = snapshots;

        let mut history = std::collections::BTreeMap::new();
        for (key, val) in scan(&rtxn, self.db_reward_history)? {
            check_len(Table::RewardHistory.bucket(), &key, 29)?;
            let amounts: TokenAmounts = bincode::deserialize(&val)?;
            history.insert((kind_from_tag(key[0])?, address_at(&key, 1), u64_at(&key, 21)), amounts);
        }
        let mut uncollected = std::collections::BTreeMap::new();
        for (key, val) in scan(&rtxn, self.db_reward_uncollected)? {
            check_len(Table::RewardUncollected.bucket(), &key, 21)?;
            let amounts: TokenAmounts = bincode::deserialize(&val)?;
            uncollected.insert((kind_from_tag(key[0])?, address_at(&key, 1)), amounts);
        }
        state.rewards = UncollectedRewardLedger::restore(history, uncollected);

        state.next_stake_id = match get_owned(&rtxn, self.db_meta, META_NEXT_STAKE_ID)? {
            Some(v) => bincode::deserialize(&v)?,
            None => return Err(DbError::MissingMeta("next_stake_id").into()),
        };

        let computed = state.compute_state_root()?;
        if expected != computed {
            return Err(DbError::StateRootMismatch { expected: expected.to_hex(), computed: computed.to_hex() }.into());
        }

        info!(
            path = %self.env_path.display(),
            pillars = state.pillars.len(),
            stakes = state.stakes.len(),
            snapshots = state.snapshots.len(),
            "settlement state loaded"
        );
        Ok(state)
    }

    /// Load the stored ledger, `None` before the first commit.
    pub fn load_ledger<L: DurableLedger>(&self) -> Result<Option<L>> {
        if !self.has_state()? {
            return Ok(None);
        }
        let rtxn = self.env.begin_ro_txn()?;
        let mut rows = Vec::new();
        for table in LedgerTable::ALL {
            for (key, value) in scan(&rtxn, self.ledger_db(table))? {
                rows.push(LedgerRecord { table, key, value: Some(value) });
            }
        }
        debug!(path = %self.env_path.display(), rows = rows.len(), "ledger rows loaded");
        Ok(Some(L::restore(rows)?))
    }
}

fn get_owned<T: LmdbTxn>(txn: &T, db: Database, key: &[u8]) -> Result<Option<Vec<u8>>> {
    match txn.get(db, &key) {
        Ok(v) => Ok(Some(v.to_vec())),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Put `value`, or delete the key when `None`. Deleting an absent key is a no-op.
fn write_row(wtxn: &mut RwTransaction<'_>, db: Database, key: &[u8], value: Option<&[u8]>) -> Result<()> {
    match value {
        Some(v) => wtxn.put(db, &key, &v, WriteFlags::empty())?,
        None => match wtxn.del(db, &key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

/// Owned copy of every (key, value) pair in `db`, in key order.
fn scan<T: LmdbTxn>(txn: &T, db: Database) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut cursor = txn.open_ro_cursor(db)?;
    Ok(cursor.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect())
}
