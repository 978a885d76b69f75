//! Zone Index: a read-optimized snapshot of active zones, rebuilt from
//! the Store on a refresh tick and swapped atomically so in-flight
//! lookups never observe a half-updated list.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Zone, ZoneKind};
use crate::store::Store;

pub struct ZoneIndex {
    restricted: RwLock<Vec<Zone>>,
    safe: RwLock<Vec<Zone>>,
}

impl ZoneIndex {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            restricted: RwLock::new(Vec::new()),
            safe: RwLock::new(Vec::new()),
        })
    }

    pub async fn refresh(&self, store: &Store) {
        let zones = store.active_zones().await;
        let (restricted, safe): (Vec<Zone>, Vec<Zone>) = zones
            .into_iter()
            .partition(|z| z.kind == ZoneKind::Restricted);
        *self.restricted.write().await = restricted;
        *self.safe.write().await = safe;
    }

    pub async fn restricted_snapshot(&self) -> Vec<Zone> {
        self.restricted.read().await.clone()
    }

    pub async fn safe_snapshot(&self) -> Vec<Zone> {
        self.safe.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refresh_partitions_zones_by_kind() {
        let store = Store::new();
        store
            .insert_zone(
                "danger".into(),
                vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
                ZoneKind::Restricted,
                9,
            )
            .await;
        store
            .insert_zone(
                "haven".into(),
                vec![(2.0, 2.0), (3.0, 2.0), (3.0, 3.0), (2.0, 3.0)],
                ZoneKind::Safe,
                8,
            )
            .await;
        let index = ZoneIndex::empty();
        index.refresh(&store).await;
        assert_eq!(index.restricted_snapshot().await.len(), 1);
        assert_eq!(index.safe_snapshot().await.len(), 1);
    }
}
