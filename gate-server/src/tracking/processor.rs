//! TrackerManager - Scan decision processing
//!
//! This module handles:
//! - Entry/exit/move decisions for each scan (2-state machine per visitor)
//! - Per-visitor serialization with timed lock acquisition
//! - Transactional persistence to redb (record + counter in one commit)
//! - Bounded retries on commit failures
//!
//! # Scan Flow
//!
//! ```text
//! process_scan(visitor, zone, at)
//!     ├─ 1. Zone existence check (registry)
//!     ├─ 2. Acquire per-visitor lock (timed, rejects on timeout)
//!     ├─ 3. Begin write transaction
//!     ├─ 4. find_open_record_txn (same transaction)
//!     ├─ 5. Decide: ENTER / EXIT / MOVE
//!     ├─ 6. Mutate record(s) + bump counter(s)
//!     ├─ 7. Commit (retry on commit failure, bounded)
//!     └─ 8. Return outcome
//! ```
//!
//! Two concurrent scans for the same visitor serialize on the lock —
//! the second observes the effect of the first. Scans for different
//! visitors never contend on the same lock.

use super::storage::{LedgerStorage, StorageError};
use crate::registry::ZoneRegistry;
use dashmap::DashMap;
use parking_lot::Mutex;
use shared::util::now_millis;
use shared::visit::{ScanAction, VisitRecord};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Commit retries before a scan is rejected
const MAX_SCAN_RETRIES: u32 = 3;

/// 同区重复上报去抖窗口：RFID 读卡器对同一张卡常在亚秒内连续触发，
/// 窗口内的同区扫码视为同一次进入，而不是"再扫即离区"的开关切换
const DOUBLE_SCAN_DEBOUNCE_MS: i64 = 2_000;

/// Lock registry size warning threshold
const LOCK_REGISTRY_WARN_THRESHOLD: usize = 100_000;

/// Tracker errors
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Zone {0} is not registered")]
    UnknownZone(i64),

    /// 同访客锁获取超时或提交重试耗尽 — 调用方可重试，绝不静默丢弃
    #[error("Scan rejected: {0}")]
    Busy(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// What one scan did to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// No open record existed — one was opened at the scanned zone
    Entered { record: VisitRecord },
    /// The open record was at the scanned zone — it was closed
    Exited { record: VisitRecord },
    /// The open record was elsewhere — closed it, opened at the scanned zone
    Moved {
        closed: VisitRecord,
        record: VisitRecord,
    },
    /// Exit requested with no open record — answered idempotently
    AlreadyOutside,
}

impl ScanOutcome {
    pub fn action(&self) -> ScanAction {
        match self {
            ScanOutcome::Entered { .. } => ScanAction::Enter,
            ScanOutcome::Moved { .. } => ScanAction::Move,
            ScanOutcome::Exited { .. } | ScanOutcome::AlreadyOutside => ScanAction::Exit,
        }
    }

    /// The zone the outcome leaves the visitor associated with
    /// (current zone for ENTER/MOVE, departed zone for EXIT)
    pub fn zone_id(&self) -> Option<i64> {
        match self {
            ScanOutcome::Entered { record } | ScanOutcome::Moved { record, .. } => {
                Some(record.zone_id)
            }
            ScanOutcome::Exited { record } => Some(record.zone_id),
            ScanOutcome::AlreadyOutside => None,
        }
    }
}

/// Scan processor over the occupancy ledger
pub struct TrackerManager {
    storage: LedgerStorage,
    registry: Arc<ZoneRegistry>,
    /// Per-visitor serialization locks
    visitor_locks: DashMap<String, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

impl TrackerManager {
    pub fn new(storage: LedgerStorage, registry: Arc<ZoneRegistry>, lock_timeout: Duration) -> Self {
        Self {
            storage,
            registry,
            visitor_locks: DashMap::new(),
            lock_timeout,
        }
    }

    /// Get the underlying storage
    pub fn storage(&self) -> &LedgerStorage {
        &self.storage
    }

    fn lock_for(&self, visitor_id: &str) -> Arc<Mutex<()>> {
        let lock = self
            .visitor_locks
            .entry(visitor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let registered = self.visitor_locks.len();
        if registered > LOCK_REGISTRY_WARN_THRESHOLD && registered.is_power_of_two() {
            tracing::warn!(
                locks = registered,
                "Visitor lock registry keeps growing, consider eviction"
            );
        }
        lock
    }

    /// Process one scan: decide ENTER / EXIT / MOVE and commit atomically
    ///
    /// `at` defaults to processing time when the reader sends none.
    pub fn process_scan(
        &self,
        visitor_id: &str,
        zone_id: i64,
        at: Option<i64>,
    ) -> TrackerResult<ScanOutcome> {
        if !self.registry.exists(zone_id) {
            return Err(TrackerError::UnknownZone(zone_id));
        }
        let at = at.unwrap_or_else(now_millis);

        let lock = self.lock_for(visitor_id);
        let _guard = lock
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| TrackerError::Busy("visitor is being processed, retry".to_string()))?;

        self.with_commit_retries(visitor_id, |storage| {
            let txn = storage.begin_write()?;

            let outcome = match storage.find_open_record_txn(&txn, visitor_id)? {
                None => {
                    let record = storage.open_record(&txn, visitor_id, zone_id, at, None)?;
                    storage.bump_zone_count(&txn, zone_id, 1)?;
                    ScanOutcome::Entered { record }
                }
                Some(open)
                    if open.zone_id == zone_id
                        && at.saturating_sub(open.entered_at) < DOUBLE_SCAN_DEBOUNCE_MS =>
                {
                    // 去抖窗口内的重复上报：幂等返回已有记录，不切换状态
                    tracing::debug!(
                        visitor_id = %visitor_id,
                        zone_id,
                        "Duplicate scan within debounce window suppressed"
                    );
                    ScanOutcome::Entered { record: open }
                }
                Some(open) if open.zone_id == zone_id => {
                    // 同区再次扫码 = 离区（"scan again to leave"）
                    let record = storage.close_open_record(&txn, visitor_id, at)?;
                    storage.bump_zone_count(&txn, zone_id, -1)?;
                    ScanOutcome::Exited { record }
                }
                Some(open) => {
                    let closed = storage.close_open_record(&txn, visitor_id, at)?;
                    let record =
                        storage.open_record(&txn, visitor_id, zone_id, at, Some(open.zone_id))?;
                    storage.bump_zone_count(&txn, open.zone_id, -1)?;
                    storage.bump_zone_count(&txn, zone_id, 1)?;
                    ScanOutcome::Moved { closed, record }
                }
            };

            txn.commit()?;
            Ok(outcome)
        })
    }

    /// Process a scan with no zone: exit whatever zone the visitor is in
    ///
    /// No open record is not an error — the caller gets an idempotent
    /// [`ScanOutcome::AlreadyOutside`].
    pub fn process_exit(&self, visitor_id: &str, at: Option<i64>) -> TrackerResult<ScanOutcome> {
        let at = at.unwrap_or_else(now_millis);

        let lock = self.lock_for(visitor_id);
        let _guard = lock
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| TrackerError::Busy("visitor is being processed, retry".to_string()))?;

        self.with_commit_retries(visitor_id, |storage| {
            let txn = storage.begin_write()?;

            let outcome = match storage.find_open_record_txn(&txn, visitor_id)? {
                None => ScanOutcome::AlreadyOutside,
                Some(open) => {
                    let record = storage.close_open_record(&txn, visitor_id, at)?;
                    storage.bump_zone_count(&txn, open.zone_id, -1)?;
                    ScanOutcome::Exited { record }
                }
            };

            txn.commit()?;
            Ok(outcome)
        })
    }

    /// The visitor's current open record, if any (read-only)
    pub fn current_zone(&self, visitor_id: &str) -> TrackerResult<Option<VisitRecord>> {
        Ok(self.storage.find_open_record(visitor_id)?)
    }

    /// Run a transactional attempt, retrying bounded times on commit
    /// failures and answering invariant breaches idempotently.
    fn with_commit_retries<F>(&self, visitor_id: &str, attempt: F) -> TrackerResult<ScanOutcome>
    where
        F: Fn(&LedgerStorage) -> Result<ScanOutcome, StorageError>,
    {
        let mut last_err: Option<StorageError> = None;

        for round in 0..MAX_SCAN_RETRIES {
            match attempt(&self.storage) {
                Ok(outcome) => return Ok(outcome),

                // Invariant breaches mean the ledger already reflects the
                // requested state. Log the anomaly, answer idempotently.
                Err(StorageError::AlreadyOpen(v)) => {
                    tracing::warn!(
                        target: "anomaly",
                        visitor_id = %v,
                        "Open attempted over an existing open record, treating as already entered"
                    );
                    if let Some(record) = self.storage.find_open_record(visitor_id)? {
                        return Ok(ScanOutcome::Entered { record });
                    }
                    return Err(TrackerError::Busy(
                        "open record vanished during recovery".to_string(),
                    ));
                }
                Err(StorageError::NoOpenRecord(v)) => {
                    tracing::warn!(
                        target: "anomaly",
                        visitor_id = %v,
                        "Close attempted with no open record, treating as already exited"
                    );
                    return Ok(ScanOutcome::AlreadyOutside);
                }

                // Transient storage trouble — retry, then surface
                Err(e @ (StorageError::Commit(_) | StorageError::Transaction(_))) => {
                    tracing::warn!(
                        visitor_id = %visitor_id,
                        round,
                        error = %e,
                        "Scan transaction failed, retrying"
                    );
                    last_err = Some(e);
                }

                Err(e) => return Err(e.into()),
            }
        }

        Err(TrackerError::Busy(format!(
            "scan failed after {} attempts: {}",
            MAX_SCAN_RETRIES,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl std::fmt::Debug for TrackerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerManager")
            .field("lock_timeout", &self.lock_timeout)
            .field("visitor_locks", &self.visitor_locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAHAKAL: i64 = 1;
    const RAM_GHAT: i64 = 2;

    fn manager() -> TrackerManager {
        let storage = LedgerStorage::open_in_memory().unwrap();
        let registry = Arc::new(ZoneRegistry::with_default_catalog());
        TrackerManager::new(storage, registry, Duration::from_millis(500))
    }

    #[test]
    fn test_first_scan_enters() {
        let manager = manager();

        let outcome = manager.process_scan("client-1", RAM_GHAT, Some(1_000)).unwrap();
        assert_eq!(outcome.action(), ScanAction::Enter);

        let ScanOutcome::Entered { record } = outcome else {
            panic!("expected Entered");
        };
        assert_eq!(record.zone_id, RAM_GHAT);
        assert_eq!(record.previous_zone_id, None);
        assert_eq!(manager.storage().zone_count(RAM_GHAT).unwrap(), 1);
    }

    #[test]
    fn test_same_zone_rescan_exits() {
        let manager = manager();

        manager.process_scan("client-1", RAM_GHAT, Some(1_000)).unwrap();
        let outcome = manager.process_scan("client-1", RAM_GHAT, Some(61_000)).unwrap();

        assert_eq!(outcome.action(), ScanAction::Exit);
        let ScanOutcome::Exited { record } = outcome else {
            panic!("expected Exited");
        };
        assert_eq!(record.left_at, Some(61_000));
        assert_eq!(record.duration_secs(), Some(60));

        // Exactly one completed visit, no second open
        let history = manager.storage().history_for("client-1", None).unwrap();
        assert_eq!(history.len(), 1);
        assert!(manager.current_zone("client-1").unwrap().is_none());
        assert_eq!(manager.storage().zone_count(RAM_GHAT).unwrap(), 0);
    }

    #[test]
    fn test_scan_other_zone_moves() {
        let manager = manager();

        manager.process_scan("client-1", RAM_GHAT, Some(1_000)).unwrap();
        let outcome = manager.process_scan("client-1", MAHAKAL, Some(5_000)).unwrap();

        assert_eq!(outcome.action(), ScanAction::Move);
        let ScanOutcome::Moved { closed, record } = outcome else {
            panic!("expected Moved");
        };
        assert_eq!(closed.zone_id, RAM_GHAT);
        assert_eq!(closed.left_at, Some(5_000));
        assert_eq!(record.zone_id, MAHAKAL);
        assert_eq!(record.previous_zone_id, Some(RAM_GHAT));
        assert!(record.is_open());

        assert_eq!(manager.storage().zone_count(RAM_GHAT).unwrap(), 0);
        assert_eq!(manager.storage().zone_count(MAHAKAL).unwrap(), 1);
    }

    #[test]
    fn test_unknown_zone_rejected() {
        let manager = manager();
        let err = manager.process_scan("client-1", 99, Some(1_000)).unwrap_err();
        assert!(matches!(err, TrackerError::UnknownZone(99)));
        // Rejection leaves no partial state
        assert!(manager.current_zone("client-1").unwrap().is_none());
    }

    #[test]
    fn test_rapid_rescan_is_debounced_not_toggled() {
        let manager = manager();

        manager.process_scan("client-1", RAM_GHAT, Some(1_000)).unwrap();
        // 300ms later: same reader firing twice for one presentation
        let outcome = manager.process_scan("client-1", RAM_GHAT, Some(1_300)).unwrap();

        assert_eq!(outcome.action(), ScanAction::Enter);
        // Exactly one open record, not zero (toggled) and not two
        let open = manager.current_zone("client-1").unwrap().unwrap();
        assert_eq!(open.zone_id, RAM_GHAT);
        assert_eq!(manager.storage().history_for("client-1", None).unwrap().len(), 1);
        assert_eq!(manager.storage().zone_count(RAM_GHAT).unwrap(), 1);
    }

    #[test]
    fn test_exit_without_zone() {
        let manager = manager();

        manager.process_scan("client-1", RAM_GHAT, Some(1_000)).unwrap();
        let outcome = manager.process_exit("client-1", Some(2_000)).unwrap();
        assert_eq!(outcome.action(), ScanAction::Exit);
        assert_eq!(manager.storage().zone_count(RAM_GHAT).unwrap(), 0);

        // Second exit is idempotent, not an error
        let outcome = manager.process_exit("client-1", Some(3_000)).unwrap();
        assert_eq!(outcome, ScanOutcome::AlreadyOutside);
    }

    #[test]
    fn test_reentry_cycle_previous_zone_chain() {
        let manager = manager();

        manager.process_scan("client-1", RAM_GHAT, Some(1_000)).unwrap();
        manager.process_scan("client-1", MAHAKAL, Some(2_000)).unwrap();
        manager.process_scan("client-1", RAM_GHAT, Some(3_000)).unwrap();

        let history = manager.storage().history_for("client-1", None).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].previous_zone_id, None);
        assert_eq!(history[1].previous_zone_id, Some(RAM_GHAT));
        assert_eq!(history[2].previous_zone_id, Some(MAHAKAL));
        assert!(history[2].is_open());

        assert_eq!(manager.storage().zone_count(RAM_GHAT).unwrap(), 1);
        assert_eq!(manager.storage().zone_count(MAHAKAL).unwrap(), 0);
    }

    #[test]
    fn test_counters_match_ledger_after_mixed_traffic() {
        let manager = manager();

        for visitor in 0..20 {
            let id = format!("client-{visitor}");
            manager.process_scan(&id, 1 + (visitor % 6), Some(1_000 + visitor)).unwrap();
            if visitor % 3 == 0 {
                manager.process_scan(&id, 1 + ((visitor + 1) % 6), Some(2_000 + visitor)).unwrap();
            }
            if visitor % 4 == 0 {
                manager.process_exit(&id, Some(3_000 + visitor)).unwrap();
            }
        }

        let materialized = manager.storage().zone_counts().unwrap();
        let ground_truth = manager.storage().open_counts_from_ledger().unwrap();
        for zone_id in 1..=6i64 {
            assert_eq!(
                materialized.get(&zone_id).copied().unwrap_or(0),
                ground_truth.get(&zone_id).copied().unwrap_or(0),
                "zone {zone_id} drifted"
            );
        }
    }
}
