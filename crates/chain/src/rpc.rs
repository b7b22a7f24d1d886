//! # Reward Query RPC
//!
//! Read-only JSON-shaped queries over a shared [`SettlementEngine`].
//!
//! | Method | Response |
//! |--------|----------|
//! | `get_uncollected_reward` | `{znnAmount, qsrAmount}` |
//! | `get_frontier_reward_by_page` | `{count, list[{epoch, znnAmount, qsrAmount}]}` newest first |
//! | `get_epoch_snapshot` | frozen allocation input of one epoch |
//! | `get_settlement_status` | `{lastUpdateHeight, lastUpdateEpoch, nextEpoch}` |
//! | `get_pending_transfers` | transfers awaiting `receive` |
//!
//! Amounts are decimal strings so `u128` values survive JSON. Every method
//! takes a read lock only.
//!
//! [`RewardRpc::handle`] routes JSON-RPC style calls with positional params:
//!
//! ```text
//! embedded.<contract>.getUncollectedReward     [address]
//! embedded.<contract>.getFrontierRewardByPage  [address, pageIndex, pageSize]
//! embedded.<contract>.getEpochSnapshot         [epoch]
//! embedded.<contract>.getSettlementStatus      []
//! ledger.getPendingTransfers                   [address]
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accumulator::EpochSnapshot;
use crate::engine::SettlementEngine;
use crate::error::SettlementError;
use crate::ledger::{Ledger, MemoryLedger};
use crate::types::{Address, ContractKind, TokenAmounts};

/// Largest page `get_frontier_reward_by_page` serves.
pub const MAX_PAGE_SIZE: u32 = 1024;

// ════════════════════════════════════════════════════════════════════════════
// RESPONSE TYPES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    fn invalid_params(message: String) -> Self {
        Self { code: -32602, message }
    }

    fn method_not_found(method: &str) -> Self {
        Self { code: -32601, message: format!("method not found: {}", method) }
    }

    fn internal(message: String) -> Self {
        Self { code: -32603, message }
    }
}

impl From<SettlementError> for RpcError {
    fn from(e: SettlementError) -> Self {
        let code = match e {
            SettlementError::DataNonExistent => -32004,
            SettlementError::InvalidPageSize(_) | SettlementError::UnknownContract(_) => -32602,
            _ => -32000,
        };
        Self { code, message: e.to_string() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UncollectedRewardRes {
    pub address: String,
    pub znn_amount: String,
    pub qsr_amount: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardHistoryEntryRes {
    pub epoch: u64,
    pub znn_amount: String,
    pub qsr_amount: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardHistoryListRes {
    pub count: usize,
    pub list: Vec<RewardHistoryEntryRes>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementStatusRes {
    pub contract: String,
    pub last_update_height: u64,
    pub last_update_epoch: Option<u64>,
    pub next_epoch: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EpochSnapshotRes {
    pub contract: String,
    pub epoch: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub participants: usize,
    pub snapshot: EpochSnapshot,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransferRes {
    pub id: u64,
    pub from: String,
    pub to: String,
    pub token: String,
    pub amount: String,
}

// ════════════════════════════════════════════════════════════════════════════
// SERVICE
// ════════════════════════════════════════════════════════════════════════════

pub struct RewardRpc<L: Ledger = MemoryLedger> {
    engine: Arc<RwLock<SettlementEngine<L>>>,
}

impl<L: Ledger> Clone for RewardRpc<L> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine) }
    }
}

fn parse_address(address: &str) -> Result<Address, RpcError> {
    Address::from_hex(address.trim())
        .map_err(|e| RpcError::invalid_params(format!("invalid address format: {}", e)))
}

fn parse_contract(contract: &str) -> Result<ContractKind, RpcError> {
    contract
        .parse::<ContractKind>()
        .map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn amounts_res(epoch: u64, amounts: &TokenAmounts) -> RewardHistoryEntryRes {
    RewardHistoryEntryRes {
        epoch,
        znn_amount: amounts.znn.to_string(),
        qsr_amount: amounts.qsr.to_string(),
    }
}

fn param_str<'a>(params: &'a Value, index: usize) -> Result<&'a str, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("param {} must be a string", index)))
}

fn param_u64(params: &Value, index: usize) -> Result<u64, RpcError> {
    params
        .get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::invalid_params(format!("param {} must be an unsigned integer", index)))
}

fn param_u32(params: &Value, index: usize) -> Result<u32, RpcError> {
    let v = param_u64(params, index)?;
    u32::try_from(v).map_err(|_| RpcError::invalid_params(format!("param {} out of range: {}", index, v)))
}

fn to_value<T: Serialize>(res: T) -> Result<Value, RpcError> {
    serde_json::to_value(res).map_err(|e| RpcError::internal(e.to_string()))
}

impl<L: Ledger> RewardRpc<L> {
    /// Route one call by method name. `params` is a JSON array.
    pub fn handle(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        if method == "ledger.getPendingTransfers" {
            return to_value(self.get_pending_transfers(param_str(params, 0)?)?);
        }

        let mut parts = method.splitn(3, '.');
        let (Some("embedded"), Some(contract), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RpcError::method_not_found(method));
        };

        match name {
            "getUncollectedReward" => to_value(self.get_uncollected_reward(contract, param_str(params, 0)?)?),
            "getFrontierRewardByPage" => to_value(self.get_frontier_reward_by_page(
                contract,
                param_str(params, 0)?,
                param_u32(params, 1)?,
                param_u32(params, 2)?,
            )?),
            "getEpochSnapshot" => to_value(self.get_epoch_snapshot(contract, param_u64(params, 0)?)?),
            "getSettlementStatus" => to_value(self.get_settlement_status(contract)?),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    pub fn new(engine: Arc<RwLock<SettlementEngine<L>>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> Arc<RwLock<SettlementEngine<L>>> {
        Arc::clone(&self.engine)
    }

    /// Σ of all settled but uncollected epochs. Zero for unknown addresses.
    pub fn get_uncollected_reward(&self, contract: &str, address: &str) -> Result<UncollectedRewardRes, RpcError> {
        let kind = parse_contract(contract)?;
        let addr = parse_address(address)?;
        let amounts = self.engine.read().uncollected_reward(kind, &addr);
        Ok(UncollectedRewardRes {
            address: addr.to_hex(),
            znn_amount: amounts.znn.to_string(),
            qsr_amount: amounts.qsr.to_string(),
        })
    }

    pub fn get_frontier_reward_by_page(
        &self,
        contract: &str,
        address: &str,
        page_index: u32,
        page_size: u32,
    ) -> Result<RewardHistoryListRes, RpcError> {
        let kind = parse_contract(contract)?;
        let addr = parse_address(address)?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(SettlementError::InvalidPageSize(page_size).into());
        }

        let page = self.engine.read().reward_history_page(kind, &addr, page_index, page_size);
        Ok(RewardHistoryListRes {
            count: page.count,
            list: page.list.iter().map(|e| amounts_res(e.epoch, &e.amounts)).collect(),
        })
    }

    pub fn get_epoch_snapshot(&self, contract: &str, epoch: u64) -> Result<EpochSnapshotRes, RpcError> {
        let kind = parse_contract(contract)?;
        let engine = self.engine.read();
        let snapshot = engine
            .epoch_snapshot(kind, epoch)
            .ok_or(SettlementError::DataNonExistent)?;
        Ok(EpochSnapshotRes {
            contract: kind.name().to_string(),
            epoch,
            start_time: snapshot.window.start,
            end_time: snapshot.window.end,
            participants: snapshot.participant_count(),
            snapshot: snapshot.clone(),
        })
    }

    pub fn get_settlement_status(&self, contract: &str) -> Result<SettlementStatusRes, RpcError> {
        let kind = parse_contract(contract)?;
        let status = self.engine.read().settlement_status(kind);
        Ok(SettlementStatusRes {
            contract: kind.name().to_string(),
            last_update_height: status.last_update_height,
            last_update_epoch: status.last_update_epoch,
            next_epoch: status.next_epoch(),
        })
    }

    pub fn get_pending_transfers(&self, address: &str) -> Result<Vec<PendingTransferRes>, RpcError> {
        let addr = parse_address(address)?;
        let transfers = self.engine.read().pending_transfers(&addr);
        Ok(transfers
            .into_iter()
            .map(|t| PendingTransferRes {
                id: t.id,
                from: t.from.to_hex(),
                to: t.to.to_hex(),
                token: t.token.symbol().to_string(),
                amount: t.amount.to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettlementConfig;

    fn rpc() -> RewardRpc {
        let engine = SettlementEngine::new(SettlementConfig::default(), MemoryLedger::new()).unwrap();
        RewardRpc::new(Arc::new(RwLock::new(engine)))
    }

    #[test]
    fn zero_reward_for_unknown_address() {
        let r = rpc();
        let res = r.get_uncollected_reward("stake", &"11".repeat(20)).unwrap();
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["znnAmount"], "0");
        assert_eq!(json["qsrAmount"], "0");
    }

    #[test]
    fn bad_params() {
        let r = rpc();
        assert_eq!(r.get_uncollected_reward("stake", "xyz").unwrap_err().code, -32602);
        assert_eq!(r.get_uncollected_reward("fusion", &"11".repeat(20)).unwrap_err().code, -32602);
        let err = r.get_frontier_reward_by_page("pillar", &"11".repeat(20), 0, 0).unwrap_err();
        assert_eq!(err.code, -32602);
        assert!(r.get_frontier_reward_by_page("pillar", &"11".repeat(20), 0, MAX_PAGE_SIZE + 1).is_err());
    }

    #[test]
    fn missing_snapshot_is_data_non_existent() {
        let err = rpc().get_epoch_snapshot("sentinel", 0).unwrap_err();
        assert_eq!(err.code, -32004);
        assert_eq!(err.message, "data non existent");
    }

    #[test]
    fn handle_routes_by_method_name() {
        let r = rpc();
        let a = "22".repeat(20);
        let v = r.handle("embedded.pillar.getUncollectedReward", &serde_json::json!([a])).unwrap();
        assert_eq!(v["znnAmount"], "0");

        let v = r
            .handle("embedded.stake.getFrontierRewardByPage", &serde_json::json!([a, 0, 10]))
            .unwrap();
        assert_eq!(v, serde_json::json!({"count": 0, "list": []}));

        let v = r.handle("embedded.sentinel.getSettlementStatus", &serde_json::json!([])).unwrap();
        assert_eq!(v["lastUpdateEpoch"], Value::Null);

        assert_eq!(r.handle("ledger.getPendingTransfers", &serde_json::json!([a])).unwrap(), serde_json::json!([]));
    }

    #[test]
    fn handle_rejects_unknown_methods_and_bad_params() {
        let r = rpc();
        assert_eq!(r.handle("embedded.pillar.getFoo", &serde_json::json!([])).unwrap_err().code, -32601);
        assert_eq!(r.handle("stats.get", &serde_json::json!([])).unwrap_err().code, -32601);
        let err = r.handle("embedded.stake.getUncollectedReward", &serde_json::json!([5])).unwrap_err();
        assert_eq!(err.code, -32602);
        let err = r
            .handle("embedded.stake.getFrontierRewardByPage", &serde_json::json!(["22", 0, u64::MAX]))
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn status_before_first_settlement() {
        let s = rpc().get_settlement_status("Liquidity").unwrap();
        assert_eq!(s.last_update_epoch, None);
        assert_eq!(s.next_epoch, 0);
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("lastUpdateHeight").is_some());
    }
}
