//! # Settlement Configuration
//!
//! ## Priority chain (lowest → highest)
//!
//! | Source | Notes |
//! |--------|-------|
//! | compiled defaults | mainnet-like values |
//! | `[settlement]` in `lattice.toml` | fail-open: missing/invalid file is skipped |
//! | `SETTLEMENT_*` env vars | only set and non-empty vars override |
//!
//! ## Search order for `lattice.toml`
//!
//! 1. `LATTICE_CONFIG_FILE` (explicit path)
//! 2. `./lattice.toml`
//! 3. `~/.lattice/lattice.toml`
//! 4. `/etc/lattice/lattice.toml`
//!
//! Example:
//!
//! ```toml
//! [settlement]
//! genesis_timestamp = 1637755200
//! epoch_duration_secs = 86400
//! momentum_interval_secs = 10
//! min_momentum_gap = 60
//! epochs_per_year = 365
//! znn_per_momentum = [1000000000, 600000000]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::epoch::EpochClock;
use crate::tokenomics::IssuanceSchedule;
use crate::trigger::UpdateTrigger;

pub const DEFAULT_GENESIS_TIMESTAMP: u64 = 1_637_755_200;
pub const DEFAULT_EPOCH_DURATION_SECS: u64 = 86_400;
pub const DEFAULT_MOMENTUM_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MIN_MOMENTUM_GAP: u64 = 60;

const CONFIG_FILE_ENV: &str = "LATTICE_CONFIG_FILE";
const CONFIG_SEARCH_PATHS: &[&str] = &[
    "./lattice.toml",
    ".lattice/lattice.toml",
    "/etc/lattice/lattice.toml",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub genesis_timestamp: u64,
    pub epoch_duration_secs: u64,
    /// Seconds between momentum slots; sets momentums per epoch.
    pub momentum_interval_secs: u64,
    /// Minimum chain-height distance between two settlements of one contract.
    pub min_momentum_gap: u64,
    pub issuance: IssuanceSchedule,

    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: DEFAULT_GENESIS_TIMESTAMP,
            epoch_duration_secs: DEFAULT_EPOCH_DURATION_SECS,
            momentum_interval_secs: DEFAULT_MOMENTUM_INTERVAL_SECS,
            min_momentum_gap: DEFAULT_MIN_MOMENTUM_GAP,
            issuance: IssuanceSchedule::default(),
            loaded_from: None,
        }
    }
}

/// `[settlement]` section as written on disk. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettlementToml {
    pub genesis_timestamp: Option<u64>,
    pub epoch_duration_secs: Option<u64>,
    pub momentum_interval_secs: Option<u64>,
    pub min_momentum_gap: Option<u64>,
    pub epochs_per_year: Option<u64>,
    pub znn_per_momentum: Option<Vec<u64>>,
    pub qsr_per_momentum: Option<Vec<u64>>,
    pub pillar_delegation_znn_percent: Option<u8>,
    pub pillar_momentum_znn_percent: Option<u8>,
    pub sentinel_znn_percent: Option<u8>,
    pub liquidity_znn_percent: Option<u8>,
    pub stake_qsr_percent: Option<u8>,
    pub sentinel_qsr_percent: Option<u8>,
    pub liquidity_qsr_percent: Option<u8>,
}

impl SettlementConfig {
    // ── PRIMARY ENTRY POINT ────────────────────────────────────────────

    /// Defaults, then `lattice.toml`, then env. Never fails.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some((section, path)) = Self::find_and_parse_toml() {
            config.apply_toml(&section);
            debug!(path = %path.display(), "settlement config loaded");
            config.loaded_from = Some(path);
        }

        config.apply_env_overrides();
        config
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Strict: the file must exist and carry a `[settlement]` section.
    /// Env overrides still apply on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_file_with(path, env_lookup)
    }

    /// `from_file` with overrides read through `lookup` instead of the
    /// process environment.
    pub fn from_file_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let section = Self::parse_toml_str(&content)
            .ok_or_else(|| anyhow!("no [settlement] section in {}", path.display()))?;

        let mut config = Self::default();
        config.apply_toml(&section);
        config.loaded_from = Some(path.to_path_buf());
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Defaults + TOML only, no env.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let section = Self::parse_toml_str(content)
            .ok_or_else(|| anyhow!("no [settlement] section found"))?;
        let mut config = Self::default();
        config.apply_toml(&section);
        Ok(config)
    }

    // ── TOML LOADING ───────────────────────────────────────────────────

    fn find_and_parse_toml() -> Option<(SettlementToml, PathBuf)> {
        if let Ok(explicit) = std::env::var(CONFIG_FILE_ENV) {
            let path = PathBuf::from(&explicit);
            if path.exists() {
                return Self::parse_toml_file(&path).map(|t| (t, path));
            }
            warn!(path = %explicit, "{} points to a missing file", CONFIG_FILE_ENV);
        }

        for search_path in CONFIG_SEARCH_PATHS {
            let path = if search_path.starts_with(".lattice") {
                match home_dir() {
                    Some(home) => home.join(search_path),
                    None => continue,
                }
            } else {
                PathBuf::from(search_path)
            };
            if path.exists() {
                if let Some(section) = Self::parse_toml_file(&path) {
                    return Some((section, path));
                }
            }
        }

        None
    }

    fn parse_toml_file(path: &Path) -> Option<SettlementToml> {
        let content = std::fs::read_to_string(path).ok()?;
        Self::parse_toml_str(&content)
    }

    /// Extract `[settlement]`. `None` if the TOML is invalid or the section is absent.
    pub fn parse_toml_str(content: &str) -> Option<SettlementToml> {
        let table: toml::Value = toml::from_str(content).ok()?;
        let section = table.get("settlement")?;
        let section_str = toml::to_string(section).ok()?;
        toml::from_str::<SettlementToml>(&section_str).ok()
    }

    fn apply_toml(&mut self, t: &SettlementToml) {
        if let Some(v) = t.genesis_timestamp {
            self.genesis_timestamp = v;
        }
        if let Some(v) = t.epoch_duration_secs {
            self.epoch_duration_secs = v;
        }
        if let Some(v) = t.momentum_interval_secs {
            self.momentum_interval_secs = v;
        }
        if let Some(v) = t.min_momentum_gap {
            self.min_momentum_gap = v;
        }

        let issuance = &mut self.issuance;
        if let Some(v) = t.epochs_per_year {
            issuance.epochs_per_year = v;
        }
        if let Some(ref table) = t.znn_per_momentum {
            issuance.znn_per_momentum = table.iter().map(|v| u128::from(*v)).collect();
        }
        if let Some(ref table) = t.qsr_per_momentum {
            issuance.qsr_per_momentum = table.iter().map(|v| u128::from(*v)).collect();
        }
        let percents = [
            (t.pillar_delegation_znn_percent, &mut issuance.pillar_delegation_znn_percent),
            (t.pillar_momentum_znn_percent, &mut issuance.pillar_momentum_znn_percent),
            (t.sentinel_znn_percent, &mut issuance.sentinel_znn_percent),
            (t.liquidity_znn_percent, &mut issuance.liquidity_znn_percent),
            (t.stake_qsr_percent, &mut issuance.stake_qsr_percent),
            (t.sentinel_qsr_percent, &mut issuance.sentinel_qsr_percent),
            (t.liquidity_qsr_percent, &mut issuance.liquidity_qsr_percent),
        ];
        for (value, slot) in percents {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }

    // ── ENV LOADING ────────────────────────────────────────────────────

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_lookup);
    }

    /// `SETTLEMENT_*` overrides. Empty or unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let parse = |key: &str| parse_override::<u64>(lookup(key));
        if let Some(v) = parse("SETTLEMENT_GENESIS_TIMESTAMP") {
            self.genesis_timestamp = v;
        }
        if let Some(v) = parse("SETTLEMENT_EPOCH_DURATION") {
            self.epoch_duration_secs = v;
        }
        if let Some(v) = parse("SETTLEMENT_MOMENTUM_INTERVAL") {
            self.momentum_interval_secs = v;
        }
        if let Some(v) = parse("SETTLEMENT_MIN_MOMENTUM_GAP") {
            self.min_momentum_gap = v;
        }
    }

    // ── VALIDATION / DERIVED ───────────────────────────────────────────

    pub fn validate(&self) -> Result<()> {
        if self.epoch_duration_secs == 0 {
            bail!("epoch_duration_secs must be > 0");
        }
        if self.momentum_interval_secs == 0 {
            bail!("momentum_interval_secs must be > 0");
        }
        if self.momentum_interval_secs > self.epoch_duration_secs {
            bail!(
                "momentum_interval_secs ({}) exceeds epoch_duration_secs ({})",
                self.momentum_interval_secs,
                self.epoch_duration_secs
            );
        }
        if self.issuance.epochs_per_year == 0 {
            bail!("epochs_per_year must be > 0");
        }
        let znn = self.issuance.znn_split_total();
        if znn != 100 {
            bail!("ZNN split percentages sum to {}, expected 100", znn);
        }
        let qsr = self.issuance.qsr_split_total();
        if qsr != 100 {
            bail!("QSR split percentages sum to {}, expected 100", qsr);
        }
        if self.issuance.znn_per_momentum.is_empty() || self.issuance.qsr_per_momentum.is_empty() {
            bail!("emission table must not be empty");
        }
        Ok(())
    }

    pub fn momentums_per_epoch(&self) -> u64 {
        self.epoch_duration_secs / self.momentum_interval_secs.max(1)
    }

    pub fn clock(&self) -> EpochClock {
        EpochClock::from_config(self)
    }

    pub fn trigger(&self) -> UpdateTrigger {
        UpdateTrigger::new(self.clock(), self.min_momentum_gap)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CONFIG HELPERS (module-private)
// ════════════════════════════════════════════════════════════════════════════════

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_override<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
    raw.filter(|s| !s.is_empty()).and_then(|s| s.parse().ok())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let c = SettlementConfig::default();
        c.validate().unwrap();
        assert_eq!(c.momentums_per_epoch(), 8_640);
    }

    #[test]
    fn toml_overrides_defaults() {
        let c = SettlementConfig::from_toml_str(
            r#"
            [settlement]
            genesis_timestamp = 1000
            epoch_duration_secs = 1200
            znn_per_momentum = [500, 250]
            sentinel_znn_percent = 13
            "#,
        )
        .unwrap();
        assert_eq!(c.genesis_timestamp, 1000);
        assert_eq!(c.epoch_duration_secs, 1200);
        assert_eq!(c.momentum_interval_secs, DEFAULT_MOMENTUM_INTERVAL_SECS);
        assert_eq!(c.issuance.znn_per_momentum, vec![500, 250]);
        assert_eq!(c.momentums_per_epoch(), 120);
    }

    #[test]
    fn missing_section_is_rejected() {
        assert!(SettlementConfig::parse_toml_str("[other]\nx = 1").is_none());
        assert!(SettlementConfig::parse_toml_str("not toml ===").is_none());
        assert!(SettlementConfig::from_toml_str("").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = SettlementConfig::default();
        c.epoch_duration_secs = 0;
        assert!(c.validate().is_err());

        let mut c = SettlementConfig::default();
        c.momentum_interval_secs = c.epoch_duration_secs + 1;
        assert!(c.validate().is_err());

        let mut c = SettlementConfig::default();
        c.issuance.sentinel_znn_percent = 14;
        assert!(c.validate().is_err());

        let mut c = SettlementConfig::default();
        c.issuance.liquidity_qsr_percent = 0;
        assert!(c.validate().is_err());

        let mut c = SettlementConfig::default();
        c.issuance.qsr_per_momentum.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn from_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lattice.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[settlement]\nepoch_duration_secs = 3600\nmin_momentum_gap = 7").unwrap();
        drop(f);

        let vars = BTreeMap::from([("SETTLEMENT_MIN_MOMENTUM_GAP", "11")]);
        let c = SettlementConfig::from_file_with(&path, |k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(c.epoch_duration_secs, 3600);
        assert_eq!(c.min_momentum_gap, 11);
        assert_eq!(c.loaded_from.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn blank_or_garbled_overrides_are_ignored() {
        let vars = BTreeMap::from([
            ("SETTLEMENT_EPOCH_DURATION", ""),
            ("SETTLEMENT_MOMENTUM_INTERVAL", "ten"),
            ("SETTLEMENT_GENESIS_TIMESTAMP", "500"),
        ]);
        let mut c = SettlementConfig::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        let d = SettlementConfig::default();
        assert_eq!(c.epoch_duration_secs, d.epoch_duration_secs);
        assert_eq!(c.momentum_interval_secs, d.momentum_interval_secs);
        assert_eq!(c.genesis_timestamp, 500);
    }

    #[test]
    fn from_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SettlementConfig::from_file(&dir.path().join("nope.toml")).is_err());
    }
}
