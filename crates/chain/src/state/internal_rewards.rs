//! Uncollected reward ledger
//! History per `(kind, participant, epoch)` plus a running uncollected total per `(kind, participant)`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, SettlementResult};
use crate::types::{Address, ContractKind, TokenAmounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardHistoryEntry {
    pub epoch: u64,
    pub amounts: TokenAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewardPage {
    /// Total epochs recorded for the participant, not just this page.
    pub count: usize,
    /// Descending by epoch.
    pub list: Vec<RewardHistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UncollectedRewardLedger {
    history: BTreeMap<(ContractKind, Address, u64), TokenAmounts>,
    uncollected: BTreeMap<(ContractKind, Address), TokenAmounts>,
}

impl UncollectedRewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append-only: a second entry for the same epoch is a consensus bug.
    pub fn record(
        &mut self,
        kind: ContractKind,
        address: Address,
        epoch: u64,
        amounts: TokenAmounts,
    ) -> SettlementResult<()> {
        if self.has_entry(kind, &address, epoch) {
            return Err(SettlementError::DuplicateRewardEntry { kind, address, epoch });
        }
        let total = self.uncollected(kind, &address);
        let total = total
            .checked_add(amounts)
            .ok_or(SettlementError::ArithmeticOverflow("uncollected total"))?;
        self.history.insert((kind, address, epoch), amounts);
        self.uncollected.insert((kind, address), total);
        Ok(())
    }

    pub fn has_entry(&self, kind: ContractKind, address: &Address, epoch: u64) -> bool {
        self.history.contains_key(&(kind, *address, epoch))
    }

    pub fn uncollected(&self, kind: ContractKind, address: &Address) -> TokenAmounts {
        self.uncollected
            .get(&(kind, *address))
            .copied()
            .unwrap_or_default()
    }

    pub fn history_entry(&self, kind: ContractKind, address: &Address, epoch: u64) -> Option<TokenAmounts> {
        self.history.get(&(kind, *address, epoch)).copied()
    }

    /// `None` once collected, unlike [`Self::uncollected`].
    pub fn uncollected_entry(&self, kind: ContractKind, address: &Address) -> Option<TokenAmounts> {
        self.uncollected.get(&(kind, *address)).copied()
    }

    /// Zeroes the collectible balance. History stays.
    pub fn take_uncollected(&mut self, kind: ContractKind, address: &Address) -> TokenAmounts {
        self.uncollected
            .remove(&(kind, *address))
            .unwrap_or_default()
    }

    fn participant_range(
        kind: ContractKind,
        address: &Address,
    ) -> std::ops::RangeInclusive<(ContractKind, Address, u64)> {
        (kind, *address, 0)..=(kind, *address, u64::MAX)
    }

    pub fn history_count(&self, kind: ContractKind, address: &Address) -> usize {
        self.history.range(Self::participant_range(kind, address)).count()
    }

    /// Page `page_index` of `page_size` entries, newest epoch first.
    pub fn history_page(
        &self,
        kind: ContractKind,
        address: &Address,
        page_index: u32,
        page_size: u32,
    ) -> RewardPage {
        let count = self.history_count(kind, address);
        let skip = (page_index as usize).saturating_mul(page_size as usize);
        let list = self
            .history
            .range(Self::participant_range(kind, address))
            .rev()
            .skip(skip)
            .take(page_size as usize)
            .map(|((_, _, epoch), amounts)| RewardHistoryEntry { epoch: *epoch, amounts: *amounts })
            .collect();
        RewardPage { count, list }
    }

    pub fn history_iter(&self) -> impl Iterator<Item = (&(ContractKind, Address, u64), &TokenAmounts)> {
        self.history.iter()
    }

    pub fn uncollected_iter(&self) -> impl Iterator<Item = (&(ContractKind, Address), &TokenAmounts)> {
        self.uncollected.iter()
    }

    /// Raw restore used by the database loader.
    pub fn restore(
        history: BTreeMap<(ContractKind, Address, u64), TokenAmounts>,
        uncollected: BTreeMap<(ContractKind, Address), TokenAmounts>,
    ) -> Self {
        Self { history, uncollected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn record_accumulates_uncollected() {
        let mut l = UncollectedRewardLedger::new();
        l.record(ContractKind::Stake, addr(1), 0, TokenAmounts::new(0, 10)).unwrap();
        l.record(ContractKind::Stake, addr(1), 1, TokenAmounts::new(0, 5)).unwrap();
        l.record(ContractKind::Sentinel, addr(1), 1, TokenAmounts::new(3, 3)).unwrap();
        assert_eq!(l.uncollected(ContractKind::Stake, &addr(1)), TokenAmounts::new(0, 15));
        assert_eq!(l.uncollected(ContractKind::Sentinel, &addr(1)), TokenAmounts::new(3, 3));
    }

    #[test]
    fn duplicate_epoch_is_fatal() {
        let mut l = UncollectedRewardLedger::new();
        l.record(ContractKind::Pillar, addr(1), 4, TokenAmounts::new(1, 0)).unwrap();
        let err = l.record(ContractKind::Pillar, addr(1), 4, TokenAmounts::new(1, 0)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(l.uncollected(ContractKind::Pillar, &addr(1)), TokenAmounts::new(1, 0));
    }

    #[test]
    fn take_keeps_history() {
        let mut l = UncollectedRewardLedger::new();
        l.record(ContractKind::Stake, addr(1), 0, TokenAmounts::new(0, 10)).unwrap();
        assert_eq!(l.take_uncollected(ContractKind::Stake, &addr(1)), TokenAmounts::new(0, 10));
        assert!(l.uncollected(ContractKind::Stake, &addr(1)).is_zero());
        assert_eq!(l.history_count(ContractKind::Stake, &addr(1)), 1);
    }

    #[test]
    fn pages_descend_by_epoch() {
        let mut l = UncollectedRewardLedger::new();
        for epoch in 0..5u64 {
            l.record(ContractKind::Stake, addr(1), epoch, TokenAmounts::new(0, u128::from(epoch))).unwrap();
        }
        l.record(ContractKind::Stake, addr(2), 9, TokenAmounts::zero()).unwrap();

        let p0 = l.history_page(ContractKind::Stake, &addr(1), 0, 2);
        assert_eq!(p0.count, 5);
        assert_eq!(p0.list.iter().map(|e| e.epoch).collect::<Vec<_>>(), vec![4, 3]);
        let p2 = l.history_page(ContractKind::Stake, &addr(1), 2, 2);
        assert_eq!(p2.list.iter().map(|e| e.epoch).collect::<Vec<_>>(), vec![0]);
        let p9 = l.history_page(ContractKind::Stake, &addr(1), 9, 2);
        assert!(p9.list.is_empty());
        assert_eq!(p9.count, 5);
    }
}
