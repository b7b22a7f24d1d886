//! # Ledger Collaborator
//!
//! The account-chain ledger that settlement writes into. Settlement only
//! needs four capabilities:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `mint` | total supply += amount |
//! | `donate` | credit a contract with freshly minted funds, no sender check, audited |
//! | `send` | debit sender now, enqueue an outbound transfer |
//! | `receive` | recipient finalizes a pending transfer (second phase) |
//!
//! [`MemoryLedger`] is the in-process implementation used by the engine
//! and the tests.
//!
//! ## Durability
//!
//! A ledger that lives next to the settlement database implements
//! [`DurableLedger`]: it reports the rows it changed since the last commit
//! and rebuilds itself from stored rows. The database writes those rows in
//! the same transaction as the settlement state, so contract balances and
//! uncollected rewards never diverge across a restart.
//!
//! ## Supply invariant
//!
//! `Σ balances + Σ in-flight transfers == total supply` per token, as long
//! as every `mint` is followed by a `donate` of the same amount.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::journal::WriteSet;
use crate::types::{Address, TokenStandard};

pub type TransferId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub id: TransferId,
    pub from: Address,
    pub to: Address,
    pub token: TokenStandard,
    pub amount: u128,
}

/// Audit record of a donation into a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub epoch: u64,
    pub to: Address,
    pub token: TokenStandard,
    pub amount: u128,
}

pub trait Ledger {
    fn balance(&self, address: &Address, token: TokenStandard) -> u128;

    fn total_supply(&self, token: TokenStandard) -> u128;

    fn mint(&mut self, token: TokenStandard, amount: u128) -> Result<(), LedgerError>;

    fn donate(
        &mut self,
        to: &Address,
        token: TokenStandard,
        amount: u128,
        epoch: u64,
    ) -> Result<(), LedgerError>;

    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        token: TokenStandard,
        amount: u128,
    ) -> Result<TransferId, LedgerError>;

    fn receive(&mut self, id: TransferId) -> Result<PendingTransfer, LedgerError>;

    fn pending_transfers(&self, to: &Address) -> Vec<PendingTransfer>;
}

// ════════════════════════════════════════════════════════════════════════════════
// DURABILITY
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LedgerTable {
    Balances,
    Supply,
    Transfers,
    Donations,
    Meta,
}

impl LedgerTable {
    pub const ALL: [LedgerTable; 5] = [
        LedgerTable::Balances,
        LedgerTable::Supply,
        LedgerTable::Transfers,
        LedgerTable::Donations,
        LedgerTable::Meta,
    ];

    pub fn bucket(&self) -> &'static str {
        match self {
            LedgerTable::Balances => "ledger_balances",
            LedgerTable::Supply => "ledger_supply",
            LedgerTable::Transfers => "ledger_transfers",
            LedgerTable::Donations => "ledger_donations",
            LedgerTable::Meta => "ledger_meta",
        }
    }
}

/// One stored ledger row. `value == None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub table: LedgerTable,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

pub trait DurableLedger: Ledger + Sized {
    /// Every row, for the first commit into an empty database.
    fn records(&self) -> Result<Vec<LedgerRecord>>;

    /// Rows changed since the last `mark_persisted`.
    fn pending_records(&self) -> Result<Vec<LedgerRecord>>;

    fn mark_persisted(&mut self);

    fn restore(records: Vec<LedgerRecord>) -> Result<Self>;
}

const META_NEXT_TRANSFER_ID: &[u8] = b"next_transfer_id";

fn balance_key(address: &Address, token: TokenStandard) -> Vec<u8> {
    let mut k = address.as_bytes().to_vec();
    k.push(token.as_byte());
    k
}

fn ledger_row<T: Serialize>(table: LedgerTable, key: Vec<u8>, value: Option<&T>) -> Result<LedgerRecord> {
    let value = match value {
        Some(v) => Some(bincode::serialize(v)?),
        None => None,
    };
    Ok(LedgerRecord { table, key, value })
}

fn token_at(key: &[u8], offset: usize) -> Result<TokenStandard> {
    let b = *key.get(offset).ok_or_else(|| anyhow!("ledger key too short: {} bytes", key.len()))?;
    TokenStandard::from_byte(b).ok_or_else(|| anyhow!("unknown token tag {}", b))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LedgerWrites {
    balances: WriteSet<(Address, TokenStandard)>,
    supply: WriteSet<TokenStandard>,
    transfers: WriteSet<TransferId>,
    donations: WriteSet<usize>,
}

// ════════════════════════════════════════════════════════════════════════════════
// IN-MEMORY LEDGER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLedger {
    balances: BTreeMap<(Address, TokenStandard), u128>,
    supply: BTreeMap<TokenStandard, u128>,
    pending: BTreeMap<TransferId, PendingTransfer>,
    received: BTreeMap<TransferId, PendingTransfer>,
    donations: Vec<Donation>,
    next_transfer_id: TransferId,
    #[serde(skip)]
    writes: LedgerWrites,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Genesis allocation: credits `address` and grows supply.
    pub fn genesis_credit(
        &mut self,
        address: Address,
        token: TokenStandard,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.mint(token, amount)?;
        self.credit(&address, token, amount)
    }

    fn credit(&mut self, address: &Address, token: TokenStandard, amount: u128) -> Result<(), LedgerError> {
        let bal = self.balances.entry((*address, token)).or_insert(0);
        *bal = bal
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(token, *address))?;
        self.writes.balances.touch((*address, token));
        Ok(())
    }

    fn transfer_row(&self, id: TransferId) -> Option<(PendingTransfer, bool)> {
        match self.pending.get(&id) {
            Some(t) => Some((t.clone(), false)),
            None => self.received.get(&id).map(|t| (t.clone(), true)),
        }
    }

    fn fixed_records(&self) -> Result<Vec<LedgerRecord>> {
        Ok(vec![ledger_row(LedgerTable::Meta, META_NEXT_TRANSFER_ID.to_vec(), Some(&self.next_transfer_id))?])
    }

    pub fn donations(&self) -> &[Donation] {
        &self.donations
    }

    pub fn in_flight(&self, token: TokenStandard) -> u128 {
        self.pending
            .values()
            .filter(|t| t.token == token)
            .fold(0u128, |acc, t| acc.saturating_add(t.amount))
    }

    pub fn transfer(&self, id: TransferId) -> Option<&PendingTransfer> {
        self.pending.get(&id).or_else(|| self.received.get(&id))
    }
}

impl Ledger for MemoryLedger {
    fn balance(&self, address: &Address, token: TokenStandard) -> u128 {
        self.balances.get(&(*address, token)).copied().unwrap_or(0)
    }

    fn total_supply(&self, token: TokenStandard) -> u128 {
        self.supply.get(&token).copied().unwrap_or(0)
    }

    fn mint(&mut self, token: TokenStandard, amount: u128) -> Result<(), LedgerError> {
        let supply = self.supply.entry(token).or_insert(0);
        *supply = supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow(token))?;
        self.writes.supply.touch(token);
        Ok(())
    }

    fn donate(
        &mut self,
        to: &Address,
        token: TokenStandard,
        amount: u128,
        epoch: u64,
    ) -> Result<(), LedgerError> {
        self.credit(to, token, amount)?;
        self.writes.donations.touch(self.donations.len());
        self.donations.push(Donation { epoch, to: *to, token, amount });
        Ok(())
    }

    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        token: TokenStandard,
        amount: u128,
    ) -> Result<TransferId, LedgerError> {
        let available = self.balance(from, token);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                address: *from,
                token,
                needed: amount,
                available,
            });
        }
        self.balances.insert((*from, token), available - amount);
        self.writes.balances.touch((*from, token));

        let id = self.next_transfer_id;
        self.next_transfer_id = id.saturating_add(1);
        self.pending.insert(
            id,
            PendingTransfer { id, from: *from, to: *to, token, amount },
        );
        self.writes.transfers.touch(id);
        Ok(id)
    }

    fn receive(&mut self, id: TransferId) -> Result<PendingTransfer, LedgerError> {
        if self.received.contains_key(&id) {
            return Err(LedgerError::AlreadyReceived(id));
        }
        let transfer = self
            .pending
            .get(&id)
            .cloned()
            .ok_or(LedgerError::UnknownTransfer(id))?;
        self.credit(&transfer.to, transfer.token, transfer.amount)?;
        self.pending.remove(&id);
        self.received.insert(id, transfer.clone());
        self.writes.transfers.touch(id);
        Ok(transfer)
    }

    fn pending_transfers(&self, to: &Address) -> Vec<PendingTransfer> {
        self.pending.values().filter(|t| t.to == *to).cloned().collect()
    }
}

impl DurableLedger for MemoryLedger {
    fn records(&self) -> Result<Vec<LedgerRecord>> {
        let mut rows = self.fixed_records()?;
        for ((address, token), amount) in &self.balances {
            rows.push(ledger_row(LedgerTable::Balances, balance_key(address, *token), Some(amount))?);
        }
        for (token, amount) in &self.supply {
            rows.push(ledger_row(LedgerTable::Supply, vec![token.as_byte()], Some(amount))?);
        }
        for id in self.pending.keys().chain(self.received.keys()) {
            let row = self.transfer_row(*id);
            rows.push(ledger_row(LedgerTable::Transfers, id.to_be_bytes().to_vec(), row.as_ref())?);
        }
        for (seq, d) in self.donations.iter().enumerate() {
            rows.push(ledger_row(LedgerTable::Donations, (seq as u64).to_be_bytes().to_vec(), Some(d))?);
        }
        Ok(rows)
    }

    fn pending_records(&self) -> Result<Vec<LedgerRecord>> {
        let w = &self.writes;
        let mut rows = self.fixed_records()?;
        for (address, token) in w.balances.iter() {
            let value = self.balances.get(&(*address, *token));
            rows.push(ledger_row(LedgerTable::Balances, balance_key(address, *token), value)?);
        }
        for token in w.supply.iter() {
            rows.push(ledger_row(LedgerTable::Supply, vec![token.as_byte()], self.supply.get(token))?);
        }
        for id in w.transfers.iter() {
            let row = self.transfer_row(*id);
            rows.push(ledger_row(LedgerTable::Transfers, id.to_be_bytes().to_vec(), row.as_ref())?);
        }
        for seq in w.donations.iter() {
            let key = (*seq as u64).to_be_bytes().to_vec();
            rows.push(ledger_row(LedgerTable::Donations, key, self.donations.get(*seq))?);
        }
        Ok(rows)
    }

    fn mark_persisted(&mut self) {
        self.writes = LedgerWrites::default();
    }

    fn restore(records: Vec<LedgerRecord>) -> Result<Self> {
        let mut l = MemoryLedger::new();
        let mut donations = BTreeMap::new();
        for r in records {
            let Some(value) = r.value else { continue };
            match r.table {
                LedgerTable::Balances => {
                    if r.key.len() != 21 {
                        return Err(anyhow!("malformed balance key: {} bytes", r.key.len()));
                    }
                    let mut arr = [0u8; 20];
                    arr.copy_from_slice(&r.key[..20]);
                    let amount: u128 = bincode::deserialize(&value)?;
                    l.balances.insert((Address(arr), token_at(&r.key, 20)?), amount);
                }
                LedgerTable::Supply => {
                    let amount: u128 = bincode::deserialize(&value)?;
                    l.supply.insert(token_at(&r.key, 0)?, amount);
                }
                LedgerTable::Transfers => {
                    let (transfer, received): (PendingTransfer, bool) = bincode::deserialize(&value)?;
                    if received {
                        l.received.insert(transfer.id, transfer);
                    } else {
                        l.pending.insert(transfer.id, transfer);
                    }
                }
                LedgerTable::Donations => {
                    let seq: [u8; 8] = r.key.as_slice().try_into()?;
                    let d: Donation = bincode::deserialize(&value)?;
                    donations.insert(u64::from_be_bytes(seq), d);
                }
                LedgerTable::Meta => {
                    if r.key == META_NEXT_TRANSFER_ID {
                        l.next_transfer_id = bincode::deserialize(&value)?;
                    }
                }
            }
        }
        l.donations = donations.into_values().collect();
        Ok(l)
    }
}
