//! Zone Registry
//!
//! 区域静态目录：启动时播种，运行期只读。占用计数、扫码校验和
//! 历史重建都通过它解析区域。

use shared::models::{Zone, ZoneCreate};
use std::collections::HashMap;

/// Static zone catalog, seeded once at startup
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    by_id: HashMap<i64, usize>,
    by_name: HashMap<String, usize>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from a catalog, upserting by name
    ///
    /// Re-seeding an existing name updates its metadata and keeps its id,
    /// so restarts never renumber zones that already have ledger records.
    pub fn seed(&mut self, catalog: Vec<ZoneCreate>) {
        for entry in catalog {
            if let Some(&idx) = self.by_name.get(&entry.name) {
                let zone = &mut self.zones[idx];
                zone.location_info = entry.location_info;
                zone.capacity = entry.capacity;
                continue;
            }

            let id = self.zones.len() as i64 + 1;
            let idx = self.zones.len();
            self.by_id.insert(id, idx);
            self.by_name.insert(entry.name.clone(), idx);
            self.zones.push(Zone {
                id,
                name: entry.name,
                location_info: entry.location_info,
                capacity: entry.capacity,
            });
        }
        tracing::info!(zones = self.zones.len(), "Zone registry seeded");
    }

    /// Registry seeded with the standard pilgrimage catalog
    pub fn with_default_catalog() -> Self {
        let mut registry = Self::new();
        registry.seed(default_catalog());
        registry
    }

    pub fn all(&self) -> &[Zone] {
        &self.zones
    }

    pub fn exists(&self, zone_id: i64) -> bool {
        self.by_id.contains_key(&zone_id)
    }

    pub fn get(&self, zone_id: i64) -> Option<&Zone> {
        self.by_id.get(&zone_id).map(|&idx| &self.zones[idx])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Zone> {
        self.by_name.get(name).map(|&idx| &self.zones[idx])
    }

    /// Zone name for display; unknown ids get a placeholder so one
    /// orphaned record never fails a whole itinerary.
    pub fn zone_name(&self, zone_id: i64) -> String {
        match self.get(zone_id) {
            Some(zone) => zone.name.clone(),
            None => format!("Zone {}", zone_id),
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// 乌贾因朝圣区域目录（坐标为区域中心点）
pub fn default_catalog() -> Vec<ZoneCreate> {
    [
        ("Mahakaleshwar Mandir", "23.1740° N, 75.7901° E"),
        ("Ram Ghat", "23.1748° N, 75.7950° E"),
        ("Kshipra Bridge", "23.1765° N, 75.7970° E"),
        ("Harsiddhi Mandir", "23.1772° N, 75.7905° E"),
        ("Bada Ganesh Mandir", "23.1755° N, 75.7885° E"),
        ("Kal Bhairav Mandir", "23.1730° N, 75.7880° E"),
    ]
    .into_iter()
    .map(|(name, location)| ZoneCreate {
        name: name.to_string(),
        location_info: Some(location.to_string()),
        capacity: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_seeding() {
        let registry = ZoneRegistry::with_default_catalog();
        assert_eq!(registry.len(), 6);
        assert!(registry.exists(1));
        assert!(registry.exists(6));
        assert!(!registry.exists(7));

        let ram_ghat = registry.find_by_name("Ram Ghat").unwrap();
        assert_eq!(registry.zone_name(ram_ghat.id), "Ram Ghat");
    }

    #[test]
    fn test_reseed_keeps_ids() {
        let mut registry = ZoneRegistry::with_default_catalog();
        let id_before = registry.find_by_name("Ram Ghat").unwrap().id;

        let mut catalog = default_catalog();
        catalog[1].capacity = Some(5_000);
        registry.seed(catalog);

        let ram_ghat = registry.find_by_name("Ram Ghat").unwrap();
        assert_eq!(ram_ghat.id, id_before);
        assert_eq!(ram_ghat.capacity, Some(5_000));
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_unknown_zone_name_placeholder() {
        let registry = ZoneRegistry::with_default_catalog();
        assert_eq!(registry.zone_name(42), "Zone 42");
    }
}
