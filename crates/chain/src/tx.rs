//! inbound contract blocks, contract calls and momentum slot reports
use serde::{Deserialize, Serialize};

use crate::state::{PillarParams, PillarUpdate};
use crate::types::{Address, ContractKind};

/// Contract calls accepted by the reward contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// Only runs the update trigger. Accepted by every kind.
    Update,
    /// Pillar, sentinel and stake contracts.
    CollectReward,

    // pillar contract
    RegisterPillar(PillarParams),
    UpdatePillar(PillarUpdate),
    RevokePillar,
    Delegate { pillar: Address },
    Undelegate,

    // sentinel contract
    RegisterSentinel,
    RevokeSentinel,

    // stake contract
    Stake { amount: u128, duration_months: u64 },
    CancelStake { id: u64 },
}

impl ContractCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            ContractCall::Update => "Update",
            ContractCall::CollectReward => "CollectReward",
            ContractCall::RegisterPillar(_) => "RegisterPillar",
            ContractCall::UpdatePillar(_) => "UpdatePillar",
            ContractCall::RevokePillar => "RevokePillar",
            ContractCall::Delegate { .. } => "Delegate",
            ContractCall::Undelegate => "Undelegate",
            ContractCall::RegisterSentinel => "RegisterSentinel",
            ContractCall::RevokeSentinel => "RevokeSentinel",
            ContractCall::Stake { .. } => "Stake",
            ContractCall::CancelStake { .. } => "CancelStake",
        }
    }

    /// Whether the contract of `kind` exposes this method.
    pub fn supported_by(&self, kind: ContractKind) -> bool {
        match self {
            ContractCall::Update => true,
            ContractCall::CollectReward => kind != ContractKind::Liquidity,
            ContractCall::RegisterPillar(_)
            | ContractCall::UpdatePillar(_)
            | ContractCall::RevokePillar
            | ContractCall::Delegate { .. }
            | ContractCall::Undelegate => kind == ContractKind::Pillar,
            ContractCall::RegisterSentinel | ContractCall::RevokeSentinel => kind == ContractKind::Sentinel,
            ContractCall::Stake { .. } | ContractCall::CancelStake { .. } => kind == ContractKind::Stake,
        }
    }
}

/// One block from the total-ordered stream, addressed to a reward contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractBlock {
    /// sender account chain
    pub address: Address,
    /// receiving contract
    pub to_address: Address,
    pub timestamp: u64,
    /// momentum height the block was confirmed at
    pub height: u64,
    pub call: ContractCall,
}

impl ContractBlock {
    pub fn new(address: Address, kind: ContractKind, timestamp: u64, height: u64, call: ContractCall) -> Self {
        Self {
            address,
            to_address: kind.contract_address(),
            timestamp,
            height,
            call,
        }
    }
}

/// A momentum slot assigned to `pillar` (owner address), reported by consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentumSlot {
    pub pillar: Address,
    pub timestamp: u64,
    pub produced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_support_matrix() {
        assert!(ContractCall::Update.supported_by(ContractKind::Liquidity));
        assert!(!ContractCall::CollectReward.supported_by(ContractKind::Liquidity));
        assert!(ContractCall::RegisterSentinel.supported_by(ContractKind::Sentinel));
        assert!(!ContractCall::RegisterSentinel.supported_by(ContractKind::Stake));
        assert!(ContractCall::CancelStake { id: 1 }.supported_by(ContractKind::Stake));
        assert!(!ContractCall::Undelegate.supported_by(ContractKind::Sentinel));
    }

    #[test]
    fn block_targets_contract_address() {
        let b = ContractBlock::new(Address::from_bytes([1; 20]), ContractKind::Stake, 5, 6, ContractCall::Update);
        assert_eq!(ContractKind::from_address(&b.to_address), Some(ContractKind::Stake));
        assert_eq!(b.call.method_name(), "Update");
    }
}
