//! History Reconstructor
//!
//! 把账本记录重建为前端展示的行程：按入区时间升序，名称经注册表
//! 解析，时间戳在业务时区内格式化。

use super::storage::{LedgerStorage, StorageResult};
use crate::registry::ZoneRegistry;
use crate::utils::time::millis_to_rfc3339;
use chrono_tz::Tz;
use shared::visit::ItineraryLeg;
use std::sync::Arc;

/// Converts ledger records into display itineraries
#[derive(Debug, Clone)]
pub struct HistoryReconstructor {
    storage: LedgerStorage,
    registry: Arc<ZoneRegistry>,
    tz: Tz,
}

impl HistoryReconstructor {
    pub fn new(storage: LedgerStorage, registry: Arc<ZoneRegistry>, tz: Tz) -> Self {
        Self { storage, registry, tz }
    }

    /// A visitor's chronological itinerary, oldest leg first
    ///
    /// An in-progress final leg is included with null `leave_time` and
    /// null `duration_spent`. A visitor with no scans gets an empty
    /// sequence, not an error.
    pub fn itinerary_for(&self, visitor_id: &str) -> StorageResult<Vec<ItineraryLeg>> {
        let records = self.storage.history_for(visitor_id, None)?;

        Ok(records
            .into_iter()
            .map(|record| ItineraryLeg {
                last_zone: record.previous_zone_id.map(|id| self.registry.zone_name(id)),
                current_zone: self.registry.zone_name(record.zone_id),
                enter_time: millis_to_rfc3339(record.entered_at, self.tz),
                leave_time: record.left_at.map(|at| millis_to_rfc3339(at, self.tz)),
                duration_spent: record.duration_secs(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackerManager;
    use std::time::Duration;

    fn setup() -> (TrackerManager, HistoryReconstructor) {
        let storage = LedgerStorage::open_in_memory().unwrap();
        let registry = Arc::new(ZoneRegistry::with_default_catalog());
        let reconstructor = HistoryReconstructor::new(
            storage.clone(),
            registry.clone(),
            chrono_tz::Asia::Kolkata,
        );
        let manager = TrackerManager::new(storage, registry, Duration::from_millis(500));
        (manager, reconstructor)
    }

    #[test]
    fn test_empty_history_is_empty_not_error() {
        let (_, reconstructor) = setup();
        assert!(reconstructor.itinerary_for("client-nobody").unwrap().is_empty());
    }

    #[test]
    fn test_itinerary_legs_and_durations() {
        let (manager, reconstructor) = setup();

        // Ram Ghat (zone 2) at T0, move to Mahakaleshwar (zone 1) at T1
        let t0 = 1_700_000_000_000;
        let t1 = t0 + 90_000;
        manager.process_scan("client-1", 2, Some(t0)).unwrap();
        manager.process_scan("client-1", 1, Some(t1)).unwrap();

        let legs = reconstructor.itinerary_for("client-1").unwrap();
        assert_eq!(legs.len(), 2);

        assert_eq!(legs[0].current_zone, "Ram Ghat");
        assert_eq!(legs[0].last_zone, None);
        assert_eq!(legs[0].duration_spent, Some(90));
        assert!(legs[0].leave_time.is_some());

        assert_eq!(legs[1].current_zone, "Mahakaleshwar Mandir");
        assert_eq!(legs[1].last_zone.as_deref(), Some("Ram Ghat"));
        assert_eq!(legs[1].leave_time, None);
        assert_eq!(legs[1].duration_spent, None);

        // RFC-3339 in the business timezone
        assert!(legs[0].enter_time.ends_with("+05:30"));
    }
}
