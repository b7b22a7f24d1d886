use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use hex::{encode as hex_encode, decode as hex_decode};
use anyhow::Result;

/// Address is 20 bytes (account-chain owner or embedded contract)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_bytes(b: [u8; 20]) -> Self { Address(b) }
    pub fn as_bytes(&self) -> &[u8;20] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(self.0) }
    pub fn from_hex(s: &str) -> Result<Self, anyhow::Error> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex_decode(s)?;
        if bytes.len() != 20 { anyhow::bail!("invalid address length: {}", bytes.len()); }
        let mut arr = [0u8;20];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_hex()).finish()
    }
}
impl FromStr for Address {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

/* --- serde serialize/deserialize for Address as hex string --- */
impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}
impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Address, D::Error>
    where D: Deserializer<'de> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; 20]>::deserialize(deserializer)?;
            Ok(Address(bytes))
        }
    }
}

/// Hash type: sha3-512 digest wrapper (64 bytes)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 64]);

impl Hash {
    pub fn from_bytes(b: [u8;64]) -> Self { Hash(b) }
    pub fn as_bytes(&self) -> &[u8;64] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(self.0) }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash").field(&self.to_hex()).finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TOKENS
// ════════════════════════════════════════════════════════════════════════════

/// Both native tokens use 8 decimals.
pub const DECIMALS: u32 = 8;
pub const SCALE: u128 = 10u128.pow(DECIMALS);

/// Native token standards minted by settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenStandard {
    Znn,
    Qsr,
}

impl TokenStandard {
    pub const ALL: [TokenStandard; 2] = [TokenStandard::Znn, TokenStandard::Qsr];

    pub fn as_byte(&self) -> u8 {
        match self {
            TokenStandard::Znn => 0,
            TokenStandard::Qsr => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<TokenStandard> {
        TokenStandard::ALL.into_iter().find(|t| t.as_byte() == b)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TokenStandard::Znn => "ZNN",
            TokenStandard::Qsr => "QSR",
        }
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A (ZNN, QSR) pair in smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenAmounts {
    pub znn: u128,
    pub qsr: u128,
}

impl TokenAmounts {
    pub fn new(znn: u128, qsr: u128) -> Self { Self { znn, qsr } }
    pub fn zero() -> Self { Self::default() }
    pub fn is_zero(&self) -> bool { self.znn == 0 && self.qsr == 0 }

    pub fn get(&self, token: TokenStandard) -> u128 {
        match token {
            TokenStandard::Znn => self.znn,
            TokenStandard::Qsr => self.qsr,
        }
    }

    pub fn checked_add(self, rhs: TokenAmounts) -> Option<TokenAmounts> {
        Some(TokenAmounts {
            znn: self.znn.checked_add(rhs.znn)?,
            qsr: self.qsr.checked_add(rhs.qsr)?,
        })
    }

    /// True if both components fit inside `bound`.
    pub fn fits_within(&self, bound: &TokenAmounts) -> bool {
        self.znn <= bound.znn && self.qsr <= bound.qsr
    }
}

impl fmt::Display for TokenAmounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "znn={} qsr={}", self.znn, self.qsr)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// EMBEDDED CONTRACTS
// ════════════════════════════════════════════════════════════════════════════
// Addresses are CONSENSUS-CRITICAL. Each contract's own balance doubles as
// the treasury its rewards are collected from.
// ════════════════════════════════════════════════════════════════════════════

const fn embedded(tag: u8) -> Address {
    let mut b = [0u8; 20];
    b[0] = 0x0e;
    b[19] = tag;
    Address(b)
}

pub const PILLAR_CONTRACT: Address = embedded(0x01);
pub const SENTINEL_CONTRACT: Address = embedded(0x02);
pub const STAKE_CONTRACT: Address = embedded(0x03);
pub const LIQUIDITY_CONTRACT: Address = embedded(0x04);

/// The four reward-bearing embedded contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractKind {
    Pillar,
    Sentinel,
    Stake,
    Liquidity,
}

impl ContractKind {
    pub const ALL: [ContractKind; 4] = [
        ContractKind::Pillar,
        ContractKind::Sentinel,
        ContractKind::Stake,
        ContractKind::Liquidity,
    ];

    pub fn contract_address(&self) -> Address {
        match self {
            ContractKind::Pillar => PILLAR_CONTRACT,
            ContractKind::Sentinel => SENTINEL_CONTRACT,
            ContractKind::Stake => STAKE_CONTRACT,
            ContractKind::Liquidity => LIQUIDITY_CONTRACT,
        }
    }

    pub fn from_address(addr: &Address) -> Option<ContractKind> {
        ContractKind::ALL
            .into_iter()
            .find(|k| k.contract_address() == *addr)
    }

    /// Single-byte tag used as key prefix in LMDB buckets and the state root.
    pub fn as_byte(&self) -> u8 {
        match self {
            ContractKind::Pillar => 1,
            ContractKind::Sentinel => 2,
            ContractKind::Stake => 3,
            ContractKind::Liquidity => 4,
        }
    }

    pub fn from_byte(b: u8) -> Option<ContractKind> {
        ContractKind::ALL.into_iter().find(|k| k.as_byte() == b)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContractKind::Pillar => "pillar",
            ContractKind::Sentinel => "sentinel",
            ContractKind::Stake => "stake",
            ContractKind::Liquidity => "liquidity",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContractKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown contract kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() {
        let a = Address::from_bytes([0xab; 20]);
        let parsed = Address::from_str(&format!("0x{}", a.to_hex())).unwrap();
        assert_eq!(a, parsed);
        assert!(Address::from_hex("abcd").is_err());
    }

    #[test]
    fn address_json_is_hex_string() {
        let a = Address::from_bytes([0x01; 20]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.to_hex()));
    }

    #[test]
    fn contract_addresses_are_distinct_and_resolvable() {
        for kind in ContractKind::ALL {
            assert_eq!(ContractKind::from_address(&kind.contract_address()), Some(kind));
            assert_eq!(ContractKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(ContractKind::from_address(&Address::from_bytes([0x77; 20])), None);
    }

    #[test]
    fn token_amounts_checked_add() {
        let a = TokenAmounts::new(5, 7);
        assert_eq!(a.checked_add(TokenAmounts::new(1, 1)), Some(TokenAmounts::new(6, 8)));
        assert_eq!(TokenAmounts::new(u128::MAX, 0).checked_add(TokenAmounts::new(1, 0)), None);
        assert!(TokenAmounts::zero().is_zero());
    }
}
