//! Allocation cache port.

use crate::domain::error::AlphaflexError;
use crate::domain::portfolio::Holding;
use std::time::SystemTime;

pub trait AllocationCachePort {
    /// Cached holdings, or `None` when absent or stale as of `now`.
    fn load_fresh(&self, now: SystemTime) -> Result<Option<Vec<Holding>>, AlphaflexError>;

    /// Replace the cached table. Last writer wins.
    fn store(&self, holdings: &[Holding]) -> Result<(), AlphaflexError>;
}
