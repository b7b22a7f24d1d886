//! Internal models for state module
//! Participant entries owned by the registrant (pillar, sentinel, stake, delegation)

use serde::{Deserialize, Serialize};

use crate::epoch::EpochWindow;
use crate::types::Address;

/// Registered pillar, keyed by owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarEntry {
    pub owner: Address,
    pub producer_address: Address,
    pub reward_address: Address,
    pub own_weight: u128,
    /// Share of the block reward given to delegators (0-100).
    pub give_block_reward_percentage: u8,
    /// Share of the delegation reward given to delegators (0-100).
    pub give_delegate_reward_percentage: u8,
    pub registered_at: u64,
    pub revoked_at: Option<u64>,
}

impl PillarEntry {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// Registered before the epoch closed and not revoked before it closed.
    pub fn active_at_close(&self, window: &EpochWindow) -> bool {
        self.registered_at < window.end && self.revoked_at.map_or(true, |t| t >= window.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelEntry {
    pub owner: Address,
    pub registered_at: u64,
    pub revoked_at: Option<u64>,
}

impl SentinelEntry {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Stake lock. Accrues from `start` until revoked, also past expiration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeEntry {
    pub id: u64,
    pub owner: Address,
    pub amount: u128,
    pub duration_months: u64,
    pub weighted_amount: u128,
    pub start: u64,
    pub expiration: u64,
    pub revoked_at: Option<u64>,
}

impl StakeEntry {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// One delegator backs exactly one pillar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub pillar: Address,
    pub since: u64,
}
