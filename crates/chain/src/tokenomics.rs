//! Lattice Tokenomics Constants
//! Issuance schedule, per-contract pool split and stake duration weighting.
//!
//! Every pool is fixed by the epoch alone:
//!
//! ```text
//! emission_t(epoch) = perMomentum_t[year] × momentumsPerEpoch
//! year              = epoch / epochs_per_year   (clamped to last entry)
//! pool(kind, t)     = floor(emission_t × pct(kind, t) / 100)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, SettlementResult};
use crate::types::{ContractKind, TokenAmounts, TokenStandard, SCALE};

// ============================================================
// ISSUANCE DEFAULTS
// ============================================================
// Per-momentum emission by year, whole tokens. Last entry repeats.
// ============================================================

pub const DEFAULT_ZNN_PER_MOMENTUM: [u128; 13] = [10, 6, 5, 7, 5, 4, 3, 4, 3, 2, 1, 2, 1];
pub const DEFAULT_QSR_PER_MOMENTUM: [u128; 13] = [20, 15, 10, 20, 15, 10, 5, 10, 5, 2, 1, 2, 1];

pub const DEFAULT_EPOCHS_PER_YEAR: u64 = 365;

/// ZNN split (must sum to 100)
pub const PILLAR_DELEGATION_ZNN_PERCENT: u8 = 24;
pub const PILLAR_MOMENTUM_ZNN_PERCENT: u8 = 50;
pub const SENTINEL_ZNN_PERCENT: u8 = 13;
pub const LIQUIDITY_ZNN_PERCENT: u8 = 13;

/// QSR split (must sum to 100)
pub const STAKE_QSR_PERCENT: u8 = 50;
pub const SENTINEL_QSR_PERCENT: u8 = 25;
pub const LIQUIDITY_QSR_PERCENT: u8 = 25;

// ============================================================
// STAKE WEIGHTING
// ============================================================

/// One stake duration unit (30 days).
pub const STAKE_TIME_UNIT_SEC: u64 = 30 * 24 * 60 * 60;
pub const STAKE_MIN_MONTHS: u64 = 1;
pub const STAKE_MAX_MONTHS: u64 = 12;
/// Minimum stake: 1 ZNN
pub const STAKE_MIN_AMOUNT: u128 = SCALE;

/// Multiplier in percent for 1..=12 months: (9 + months) / 10
pub const STAKE_MULTIPLIER_PERCENT: [u128; 12] = [100, 110, 120, 130, 140, 150, 160, 170, 180, 190, 200, 210];

pub fn duration_multiplier_percent(months: u64) -> Option<u128> {
    if !(STAKE_MIN_MONTHS..=STAKE_MAX_MONTHS).contains(&months) {
        return None;
    }
    STAKE_MULTIPLIER_PERCENT.get(usize::try_from(months - 1).ok()?).copied()
}

/// amount × multiplier, floored. `None` on invalid duration or overflow.
pub fn weighted_stake_amount(amount: u128, months: u64) -> Option<u128> {
    let pct = duration_multiplier_percent(months)?;
    Some(amount.checked_mul(pct)? / 100)
}

/// floor(amount × pct / 100) with overflow reported as fatal.
pub fn percent_of(amount: u128, pct: u8) -> SettlementResult<u128> {
    amount
        .checked_mul(u128::from(pct))
        .map(|v| v / 100)
        .ok_or(SettlementError::ArithmeticOverflow("percent_of"))
}

// ============================================================
// ISSUANCE SCHEDULE
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceSchedule {
    /// smallest units per momentum, indexed by year
    pub znn_per_momentum: Vec<u128>,
    pub qsr_per_momentum: Vec<u128>,
    pub epochs_per_year: u64,
    pub pillar_delegation_znn_percent: u8,
    pub pillar_momentum_znn_percent: u8,
    pub sentinel_znn_percent: u8,
    pub liquidity_znn_percent: u8,
    pub stake_qsr_percent: u8,
    pub sentinel_qsr_percent: u8,
    pub liquidity_qsr_percent: u8,
}

impl Default for IssuanceSchedule {
    fn default() -> Self {
        Self {
            znn_per_momentum: DEFAULT_ZNN_PER_MOMENTUM.iter().map(|v| v * SCALE).collect(),
            qsr_per_momentum: DEFAULT_QSR_PER_MOMENTUM.iter().map(|v| v * SCALE).collect(),
            epochs_per_year: DEFAULT_EPOCHS_PER_YEAR,
            pillar_delegation_znn_percent: PILLAR_DELEGATION_ZNN_PERCENT,
            pillar_momentum_znn_percent: PILLAR_MOMENTUM_ZNN_PERCENT,
            sentinel_znn_percent: SENTINEL_ZNN_PERCENT,
            liquidity_znn_percent: LIQUIDITY_ZNN_PERCENT,
            stake_qsr_percent: STAKE_QSR_PERCENT,
            sentinel_qsr_percent: SENTINEL_QSR_PERCENT,
            liquidity_qsr_percent: LIQUIDITY_QSR_PERCENT,
        }
    }
}

/// Two ZNN parts of the pillar pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PillarParts {
    pub delegation: u128,
    pub block: u128,
}

impl IssuanceSchedule {
    pub fn znn_split_total(&self) -> u32 {
        [
            self.pillar_delegation_znn_percent,
            self.pillar_momentum_znn_percent,
            self.sentinel_znn_percent,
            self.liquidity_znn_percent,
        ]
        .iter()
        .map(|p| u32::from(*p))
        .sum()
    }

    pub fn qsr_split_total(&self) -> u32 {
        [self.stake_qsr_percent, self.sentinel_qsr_percent, self.liquidity_qsr_percent]
            .iter()
            .map(|p| u32::from(*p))
            .sum()
    }

    pub fn year_of(&self, epoch: u64) -> u64 {
        epoch / self.epochs_per_year.max(1)
    }

    fn per_momentum(&self, token: TokenStandard, epoch: u64) -> u128 {
        let table = match token {
            TokenStandard::Znn => &self.znn_per_momentum,
            TokenStandard::Qsr => &self.qsr_per_momentum,
        };
        let year = usize::try_from(self.year_of(epoch)).unwrap_or(usize::MAX);
        table
            .get(year)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(0)
    }

    /// Network-wide emission of `token` for one epoch.
    pub fn epoch_emission(
        &self,
        token: TokenStandard,
        epoch: u64,
        momentums_per_epoch: u64,
    ) -> SettlementResult<u128> {
        self.per_momentum(token, epoch)
            .checked_mul(u128::from(momentums_per_epoch))
            .ok_or(SettlementError::ArithmeticOverflow("epoch_emission"))
    }

    pub fn pillar_parts(&self, epoch: u64, momentums_per_epoch: u64) -> SettlementResult<PillarParts> {
        let znn = self.epoch_emission(TokenStandard::Znn, epoch, momentums_per_epoch)?;
        Ok(PillarParts {
            delegation: percent_of(znn, self.pillar_delegation_znn_percent)?,
            block: percent_of(znn, self.pillar_momentum_znn_percent)?,
        })
    }

    /// The fixed pool of `kind` for `epoch`.
    pub fn reward_pool(
        &self,
        kind: ContractKind,
        epoch: u64,
        momentums_per_epoch: u64,
    ) -> SettlementResult<RewardPool> {
        let znn = self.epoch_emission(TokenStandard::Znn, epoch, momentums_per_epoch)?;
        let qsr = self.epoch_emission(TokenStandard::Qsr, epoch, momentums_per_epoch)?;

        let amounts = match kind {
            ContractKind::Pillar => {
                let parts = self.pillar_parts(epoch, momentums_per_epoch)?;
                let znn = parts
                    .delegation
                    .checked_add(parts.block)
                    .ok_or(SettlementError::ArithmeticOverflow("pillar pool"))?;
                TokenAmounts::new(znn, 0)
            }
            ContractKind::Sentinel => TokenAmounts::new(
                percent_of(znn, self.sentinel_znn_percent)?,
                percent_of(qsr, self.sentinel_qsr_percent)?,
            ),
            ContractKind::Stake => TokenAmounts::new(0, percent_of(qsr, self.stake_qsr_percent)?),
            ContractKind::Liquidity => TokenAmounts::new(
                percent_of(znn, self.liquidity_znn_percent)?,
                percent_of(qsr, self.liquidity_qsr_percent)?,
            ),
        };

        Ok(RewardPool { kind, epoch, amounts })
    }
}

/// Total issuance for one contract for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPool {
    pub kind: ContractKind,
    pub epoch: u64,
    pub amounts: TokenAmounts,
}

impl RewardPool {
    pub fn new(kind: ContractKind, epoch: u64, znn: u128, qsr: u128) -> Self {
        Self { kind, epoch, amounts: TokenAmounts::new(znn, qsr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_splits_sum_to_100() {
        let s = IssuanceSchedule::default();
        assert_eq!(s.znn_split_total(), 100);
        assert_eq!(s.qsr_split_total(), 100);
    }

    #[test]
    fn multiplier_table() {
        assert_eq!(duration_multiplier_percent(1), Some(100));
        assert_eq!(duration_multiplier_percent(2), Some(110));
        assert_eq!(duration_multiplier_percent(4), Some(130));
        assert_eq!(duration_multiplier_percent(6), Some(150));
        assert_eq!(duration_multiplier_percent(11), Some(200));
        assert_eq!(duration_multiplier_percent(12), Some(210));
        assert_eq!(duration_multiplier_percent(0), None);
        assert_eq!(duration_multiplier_percent(13), None);
    }

    #[test]
    fn weighted_amount_floors() {
        assert_eq!(weighted_stake_amount(1_000, 1), Some(1_000));
        assert_eq!(weighted_stake_amount(15, 2), Some(16)); // 16.5
        assert_eq!(weighted_stake_amount(u128::MAX, 2), None);
    }

    #[test]
    fn year_clamps_to_last_entry() {
        let s = IssuanceSchedule::default();
        let per = |epoch| s.epoch_emission(TokenStandard::Znn, epoch, 1).unwrap();
        assert_eq!(per(0), 10 * SCALE);
        assert_eq!(per(364), 10 * SCALE);
        assert_eq!(per(365), 6 * SCALE);
        assert_eq!(per(365 * 12), SCALE);
        assert_eq!(per(365 * 500), SCALE);
    }

    #[test]
    fn pools_by_kind() {
        let s = IssuanceSchedule::default();
        let mpe = 8_640;
        let znn = 10 * SCALE * 8_640;
        let qsr = 20 * SCALE * 8_640;

        let pillar = s.reward_pool(ContractKind::Pillar, 0, mpe).unwrap();
        assert_eq!(pillar.amounts, TokenAmounts::new(znn * 24 / 100 + znn / 2, 0));

        let stake = s.reward_pool(ContractKind::Stake, 0, mpe).unwrap();
        assert_eq!(stake.amounts, TokenAmounts::new(0, qsr / 2));

        let sentinel = s.reward_pool(ContractKind::Sentinel, 0, mpe).unwrap();
        assert_eq!(sentinel.amounts, TokenAmounts::new(znn * 13 / 100, qsr / 4));

        let liq = s.reward_pool(ContractKind::Liquidity, 0, mpe).unwrap();
        assert_eq!(liq.amounts, sentinel.amounts);
    }

    #[test]
    fn empty_table_emits_nothing() {
        let s = IssuanceSchedule { znn_per_momentum: vec![], ..Default::default() };
        assert_eq!(s.epoch_emission(TokenStandard::Znn, 3, 100).unwrap(), 0);
    }
}
