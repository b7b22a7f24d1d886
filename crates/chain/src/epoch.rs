//! # Epoch Clock
//!
//! Derives epoch index and boundaries from a block's embedded timestamp.
//! Pure arithmetic, no state, no wall clock.
//!
//! ```text
//! genesis                                                       time →
//!    │◄──── epoch 0 ────►│◄──── epoch 1 ────►│◄──── epoch 2 ────►│
//!    start(0)            start(1) = end(0)   start(2) = end(1)
//! ```
//!
//! - `epoch_index(ts) = floor((ts - genesis) / duration)`
//! - epoch `e` is closed once `ts >= genesis + (e+1) × duration`
//! - timestamps before genesis map to epoch 0

use serde::{Deserialize, Serialize};

use crate::config::SettlementConfig;

/// Stateless epoch arithmetic. Duration is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    genesis_timestamp: u64,
    epoch_duration: u64,
}

impl EpochClock {
    pub fn new(genesis_timestamp: u64, epoch_duration: u64) -> Self {
        Self {
            genesis_timestamp,
            epoch_duration: epoch_duration.max(1),
        }
    }

    pub fn from_config(config: &SettlementConfig) -> Self {
        Self::new(config.genesis_timestamp, config.epoch_duration_secs)
    }

    pub fn genesis_timestamp(&self) -> u64 {
        self.genesis_timestamp
    }

    pub fn epoch_duration(&self) -> u64 {
        self.epoch_duration
    }

    pub fn epoch_index(&self, timestamp: u64) -> u64 {
        timestamp.saturating_sub(self.genesis_timestamp) / self.epoch_duration
    }

    pub fn epoch_start(&self, epoch: u64) -> u64 {
        self.genesis_timestamp
            .saturating_add(epoch.saturating_mul(self.epoch_duration))
    }

    /// Exclusive end of `epoch`, equal to the start of `epoch + 1`.
    pub fn epoch_end(&self, epoch: u64) -> u64 {
        self.epoch_start(epoch.saturating_add(1))
    }

    pub fn is_closed(&self, epoch: u64, timestamp: u64) -> bool {
        timestamp >= self.epoch_end(epoch)
    }

    pub fn window(&self, epoch: u64) -> EpochWindow {
        EpochWindow {
            epoch,
            start: self.epoch_start(epoch),
            end: self.epoch_end(epoch),
        }
    }
}

/// Half-open `[start, end)` interval of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochWindow {
    pub epoch: u64,
    pub start: u64,
    pub end: u64,
}

impl EpochWindow {
    pub fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Seconds of `[active_from, active_until)` that fall inside this window.
    /// `None` means still active.
    pub fn overlap(&self, active_from: u64, active_until: Option<u64>) -> u64 {
        let from = self.start.max(active_from);
        let until = match active_until {
            Some(t) => self.end.min(t),
            None => self.end,
        };
        until.saturating_sub(from)
    }

    /// True if `[active_from, active_until)` spans the whole window.
    pub fn covers(&self, active_from: u64, active_until: Option<u64>) -> bool {
        active_from <= self.start && active_until.map_or(true, |t| t >= self.end)
    }
}
