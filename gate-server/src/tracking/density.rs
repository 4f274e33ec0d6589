//! Density Aggregator
//!
//! 物化占用计数的只读视图：快照直接读计数表，O(zones)，
//! 绝不在热路径上重算账本。

use super::storage::{CountCorrection, LedgerStorage, StorageResult};
use crate::registry::ZoneRegistry;
use shared::visit::ZoneDensity;
use std::sync::Arc;

/// Materialized per-zone occupancy view
#[derive(Debug, Clone)]
pub struct DensityAggregator {
    storage: LedgerStorage,
    registry: Arc<ZoneRegistry>,
}

impl DensityAggregator {
    pub fn new(storage: LedgerStorage, registry: Arc<ZoneRegistry>) -> Self {
        Self { storage, registry }
    }

    /// Snapshot of all registered zones
    ///
    /// Every seeded zone appears; zones nobody has scanned yet report 0.
    /// Counters can never be negative (`u64` + clamp on the write side).
    pub fn snapshot(&self) -> StorageResult<Vec<ZoneDensity>> {
        let counts = self.storage.zone_counts()?;
        Ok(self
            .registry
            .all()
            .iter()
            .map(|zone| ZoneDensity {
                zone_id: zone.id,
                zone_name: zone.name.clone(),
                density: counts.get(&zone.id).copied().unwrap_or(0),
            })
            .collect())
    }

    /// Recompute counters from the ledger, reporting each correction
    ///
    /// Called by the periodic reconciliation job; the ledger is the
    /// source of truth, the counters only a rebuildable view.
    pub fn reconcile(&self) -> StorageResult<Vec<CountCorrection>> {
        self.storage.rebuild_zone_counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackerManager;
    use std::time::Duration;

    #[test]
    fn test_snapshot_includes_every_zone_with_zero_default() {
        let storage = LedgerStorage::open_in_memory().unwrap();
        let registry = Arc::new(ZoneRegistry::with_default_catalog());
        let aggregator = DensityAggregator::new(storage.clone(), registry.clone());

        let snapshot = aggregator.snapshot().unwrap();
        assert_eq!(snapshot.len(), 6);
        assert!(snapshot.iter().all(|z| z.density == 0));

        let manager = TrackerManager::new(storage, registry, Duration::from_millis(500));
        manager.process_scan("client-1", 2, Some(1_000)).unwrap();

        let snapshot = aggregator.snapshot().unwrap();
        let ram_ghat = snapshot.iter().find(|z| z.zone_id == 2).unwrap();
        assert_eq!(ram_ghat.zone_name, "Ram Ghat");
        assert_eq!(ram_ghat.density, 1);
        // Untouched zones still listed at zero
        assert_eq!(snapshot.iter().filter(|z| z.density == 0).count(), 5);
    }
}
