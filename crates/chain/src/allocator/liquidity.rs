//! Liquidity kind: no per-participant split. The donated pool is the
//! contract's working capital.

use super::Allocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityAllocator;

impl LiquidityAllocator {
    pub(super) fn allocate(&self, _allocation: &mut Allocation) {}
}
