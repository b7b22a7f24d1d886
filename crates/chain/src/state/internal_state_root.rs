//! Stored rows per table and the state root over them
//!
//! ```text
//! leaf(row) = SHA3-512(tag ‖ len(key) ‖ key ‖ bincode(value))
//! root      = Σ leaf(row)  mod 2^512      over every row of every table
//! ```
//!
//! Penjumlahan tidak bergantung urutan: commit cukup mengurangi leaf lama dan
//! menambah leaf baru untuk baris yang berubah. `compute_state_root` menghitung
//! ulang dari nol dan dipakai saat load untuk verifikasi.

use anyhow::Result;
use primitive_types::U512;
use serde::Serialize;

use super::SettlementState;
use crate::crypto::sha3_512_bytes;
use crate::types::{Address, ContractKind, Hash};

pub const META_NEXT_STAKE_ID: &[u8] = b"next_stake_id";

// ════════════════════════════════════════════════════════════════════════════
// TABLES & KEYS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Table {
    Contracts,
    Pillars,
    Sentinels,
    Stakes,
    Delegations,
    BlockCounters,
    EpochSnapshots,
    RewardHistory,
    RewardUncollected,
    Meta,
}

impl Table {
    pub const ALL: [Table; 10] = [
        Table::Contracts,
        Table::Pillars,
        Table::Sentinels,
        Table::Stakes,
        Table::Delegations,
        Table::BlockCounters,
        Table::EpochSnapshots,
        Table::RewardHistory,
        Table::RewardUncollected,
        Table::Meta,
    ];

    /// Leaf domain separator.
    pub fn tag(&self) -> u8 {
        match self {
            Table::Contracts => b'C',
            Table::Pillars => b'P',
            Table::Sentinels => b'S',
            Table::Stakes => b'K',
            Table::Delegations => b'D',
            Table::BlockCounters => b'B',
            Table::EpochSnapshots => b'E',
            Table::RewardHistory => b'H',
            Table::RewardUncollected => b'U',
            Table::Meta => b'M',
        }
    }

    /// LMDB database name.
    pub fn bucket(&self) -> &'static str {
        match self {
            Table::Contracts => "contract_state",
            Table::Pillars => "pillars",
            Table::Sentinels => "sentinels",
            Table::Stakes => "stakes",
            Table::Delegations => "delegations",
            Table::BlockCounters => "block_counters",
            Table::EpochSnapshots => "epoch_snapshots",
            Table::RewardHistory => "reward_history",
            Table::RewardUncollected => "reward_uncollected",
            Table::Meta => "meta",
        }
    }
}

pub fn contract_key(kind: ContractKind) -> Vec<u8> {
    vec![kind.as_byte()]
}

pub fn counter_key(epoch: u64, pillar: &Address) -> Vec<u8> {
    let mut k = epoch.to_be_bytes().to_vec();
    k.extend_from_slice(pillar.as_bytes());
    k
}

pub fn snapshot_key(kind: ContractKind, epoch: u64) -> Vec<u8> {
    let mut k = vec![kind.as_byte()];
    k.extend_from_slice(&epoch.to_be_bytes());
    k
}

pub fn history_key(kind: ContractKind, address: &Address, epoch: u64) -> Vec<u8> {
    let mut k = vec![kind.as_byte()];
    k.extend_from_slice(address.as_bytes());
    k.extend_from_slice(&epoch.to_be_bytes());
    k
}

pub fn uncollected_key(kind: ContractKind, address: &Address) -> Vec<u8> {
    let mut k = vec![kind.as_byte()];
    k.extend_from_slice(address.as_bytes());
    k
}

/// One row of a table. `value == None` means the key is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub table: Table,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

fn row<T: Serialize>(table: Table, key: Vec<u8>, value: Option<&T>) -> Result<StateRecord> {
    let value = match value {
        Some(v) => Some(bincode::serialize(v)?),
        None => None,
    };
    Ok(StateRecord { table, key, value })
}

// ════════════════════════════════════════════════════════════════════════════
// ROOT
// ════════════════════════════════════════════════════════════════════════════

fn leaf(table: Table, key: &[u8], value: &[u8]) -> U512 {
    let mut buf = Vec::with_capacity(5 + key.len() + value.len());
    buf.push(table.tag());
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    U512::from_big_endian(&sha3_512_bytes(&buf))
}

/// Running sum of row leaves, wrapping at 2^512.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateRoot(U512);

impl StateRoot {
    pub fn from_hash(hash: &Hash) -> Self {
        StateRoot(U512::from_big_endian(hash.as_bytes()))
    }

    pub fn to_hash(&self) -> Hash {
        let mut bytes = [0u8; 64];
        self.0.to_big_endian(&mut bytes);
        Hash::from_bytes(bytes)
    }

    pub fn add_row(&mut self, table: Table, key: &[u8], value: &[u8]) {
        self.0 = self.0.overflowing_add(leaf(table, key, value)).0;
    }

    pub fn remove_row(&mut self, table: Table, key: &[u8], value: &[u8]) {
        self.0 = self.0.overflowing_sub(leaf(table, key, value)).0;
    }

    /// Moves `key` from `old` to `new`. `None` is an absent row.
    pub fn replace_row(&mut self, table: Table, key: &[u8], old: Option<&[u8]>, new: Option<&[u8]>) {
        if let Some(v) = old {
            self.remove_row(table, key, v);
        }
        if let Some(v) = new {
            self.add_row(table, key, v);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ROWS OF A STATE
// ════════════════════════════════════════════════════════════════════════════

impl SettlementState {
    /// Contract cursors and meta: always part of a commit.
    fn fixed_records(&self) -> Result<Vec<StateRecord>> {
        let mut rows = Vec::with_capacity(self.contracts.len() + 1);
        for (kind, cs) in &self.contracts {
            rows.push(row(Table::Contracts, contract_key(*kind), Some(cs))?);
        }
        rows.push(row(Table::Meta, META_NEXT_STAKE_ID.to_vec(), Some(&self.next_stake_id))?);
        Ok(rows)
    }

    /// Every stored row.
    pub fn records(&self) -> Result<Vec<StateRecord>> {
        let mut rows = self.fixed_records()?;
        for (owner, p) in &self.pillars {
            rows.push(row(Table::Pillars, owner.as_bytes().to_vec(), Some(p))?);
        }
        for (owner, s) in &self.sentinels {
            rows.push(row(Table::Sentinels, owner.as_bytes().to_vec(), Some(s))?);
        }
        for (id, s) in &self.stakes {
            rows.push(row(Table::Stakes, id.to_be_bytes().to_vec(), Some(s))?);
        }
        for (delegator, d) in &self.delegations {
            rows.push(row(Table::Delegations, delegator.as_bytes().to_vec(), Some(d))?);
        }
        for ((epoch, pillar), c) in self.accumulator.iter() {
            rows.push(row(Table::BlockCounters, counter_key(*epoch, pillar), Some(c))?);
        }
        for snap in self.snapshots.iter() {
            rows.push(row(Table::EpochSnapshots, snapshot_key(snap.kind, snap.epoch()), Some(snap))?);
        }
        for ((kind, address, epoch), amounts) in self.rewards.history_iter() {
            rows.push(row(Table::RewardHistory, history_key(*kind, address, *epoch), Some(amounts))?);
        }
        for ((kind, address), amounts) in self.rewards.uncollected_iter() {
            rows.push(row(Table::RewardUncollected, uncollected_key(*kind, address), Some(amounts))?);
        }
        Ok(rows)
    }

    /// Rows touched since the last commit, current value or deletion.
    pub fn pending_records(&self) -> Result<Vec<StateRecord>> {
        let w = &self.writes;
        let mut rows = self.fixed_records()?;
        for owner in w.pillars.iter() {
            rows.push(row(Table::Pillars, owner.as_bytes().to_vec(), self.pillars.get(owner))?);
        }
        for owner in w.sentinels.iter() {
            rows.push(row(Table::Sentinels, owner.as_bytes().to_vec(), self.sentinels.get(owner))?);
        }
        for id in w.stakes.iter() {
            rows.push(row(Table::Stakes, id.to_be_bytes().to_vec(), self.stakes.get(id))?);
        }
        for delegator in w.delegations.iter() {
            rows.push(row(Table::Delegations, delegator.as_bytes().to_vec(), self.delegations.get(delegator))?);
        }
        for (epoch, pillar) in w.counters.iter() {
            let value = self.accumulator.get(*epoch, pillar);
            rows.push(row(Table::BlockCounters, counter_key(*epoch, pillar), value)?);
        }
        for (kind, epoch) in w.snapshots.iter() {
            let value = self.snapshots.get(*kind, *epoch);
            rows.push(row(Table::EpochSnapshots, snapshot_key(*kind, *epoch), value)?);
        }
        for (kind, address, epoch) in w.history.iter() {
            let value = self.rewards.history_entry(*kind, address, *epoch);
            rows.push(row(Table::RewardHistory, history_key(*kind, address, *epoch), value.as_ref())?);
        }
        for (kind, address) in w.uncollected.iter() {
            let value = self.rewards.uncollected_entry(*kind, address);
            rows.push(row(Table::RewardUncollected, uncollected_key(*kind, address), value.as_ref())?);
        }
        Ok(rows)
    }

    /// Full recomputation over every row.
    pub fn compute_state_root(&self) -> Result<Hash> {
        let mut root = StateRoot::default();
        for r in self.records()? {
            if let Some(v) = &r.value {
                root.add_row(r.table, &r.key, v);
            }
        }
        Ok(root.to_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenAmounts;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn root_changes_with_rewards() {
        let mut s = SettlementState::new();
        let before = s.compute_state_root().unwrap();
        assert_eq!(before, SettlementState::new().compute_state_root().unwrap());

        s.record_reward(ContractKind::Stake, addr(1), 0, TokenAmounts::new(0, 1)).unwrap();
        assert_ne!(before, s.compute_state_root().unwrap());
    }

    #[test]
    fn incremental_root_matches_full_recomputation() {
        let mut s = SettlementState::new();
        let mut root = StateRoot::default();
        for r in s.records().unwrap() {
            root.add_row(r.table, &r.key, r.value.as_deref().unwrap());
        }
        let mut stored: std::collections::BTreeMap<(Table, Vec<u8>), Vec<u8>> = s
            .records()
            .unwrap()
            .into_iter()
            .filter_map(|r| r.value.map(|v| ((r.table, r.key), v)))
            .collect();

        s.register_sentinel(addr(1), 0).unwrap();
        s.record_reward(ContractKind::Sentinel, addr(1), 0, TokenAmounts::new(4, 4)).unwrap();
        s.take_uncollected(ContractKind::Sentinel, &addr(1));
        s.contract_mut(ContractKind::Sentinel).advance(0, 3).unwrap();

        for r in s.pending_records().unwrap() {
            let old = stored.get(&(r.table, r.key.clone())).cloned();
            root.replace_row(r.table, &r.key, old.as_deref(), r.value.as_deref());
            match r.value {
                Some(v) => stored.insert((r.table, r.key), v),
                None => stored.remove(&(r.table, r.key)),
            };
        }
        assert_eq!(root.to_hash(), s.compute_state_root().unwrap());
        // the collected total is a deletion
        assert!(!stored.contains_key(&(Table::RewardUncollected, uncollected_key(ContractKind::Sentinel, &addr(1)))));
    }

    #[test]
    fn hash_roundtrip() {
        let mut root = StateRoot::default();
        root.add_row(Table::Meta, b"k", b"v");
        assert_eq!(StateRoot::from_hash(&root.to_hash()), root);
        root.remove_row(Table::Meta, b"k", b"v");
        assert_eq!(root, StateRoot::default());
    }
}
