//! Domain façade over the storage engine.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::StoreError;
use crate::store::db::CatalogDb;
use crate::store::entry::{Category, CatalogEntry};

/// The one type the rest of the crate talks to instead of [`CatalogDb`].
///
/// Holds no state of its own; cloning is cheap and every clone shares the
/// same underlying engine. Constructed explicitly and passed into each
/// session that needs it.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    db: Arc<CatalogDb>,
}

impl CatalogRepository {
    pub fn new(db: Arc<CatalogDb>) -> Self {
        Self { db }
    }

    /// Live stream of every entry, ordered ascending by release date.
    pub fn all_entries(&self) -> watch::Receiver<Vec<CatalogEntry>> {
        self.db.watch_all()
    }

    /// Live stream of entries matching the filters; `None` matches all.
    pub fn entries_filtered(
        &self,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> watch::Receiver<Vec<CatalogEntry>> {
        self.db.watch_filtered(category, watched)
    }

    /// Live count under the same predicate as [`entries_filtered`](Self::entries_filtered).
    pub fn entry_count(
        &self,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> watch::Receiver<i64> {
        self.db.watch_count(category, watched)
    }

    /// Consistent (entries, count) pair for the filters.
    pub async fn snapshot_filtered(
        &self,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> Result<(Vec<CatalogEntry>, i64), StoreError> {
        self.db.snapshot_filtered(category, watched).await
    }

    /// Generation counter stream from the engine; changes after every write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.db.subscribe()
    }

    pub async fn entry(&self, id: i64) -> Result<Option<CatalogEntry>, StoreError> {
        self.db.entry(id).await
    }

    pub async fn insert_entry(&self, entry: &CatalogEntry) -> Result<i64, StoreError> {
        self.db.insert(entry).await
    }

    pub async fn update_entry(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        self.db.update(entry).await
    }

    pub async fn delete_entry(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        self.db.delete(entry.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(title: &str) -> CatalogEntry {
        CatalogEntry {
            id: 0,
            title: title.to_string(),
            release_date: Utc.with_ymd_and_hms(2015, 10, 2, 0, 0, 0).unwrap(),
            category: Category::Film,
            watched: false,
            rating: None,
            comment: None,
            poster_path: None,
        }
    }

    #[tokio::test]
    async fn passthrough_round_trip() {
        let repository = CatalogRepository::new(CatalogDb::open_memory().await.unwrap());

        let id = repository.insert_entry(&entry("The Martian")).await.unwrap();
        let mut stored = repository.entry(id).await.unwrap().unwrap();
        assert_eq!(stored.title, "The Martian");

        stored.watched = true;
        stored.rating = Some(7);
        repository.update_entry(&stored).await.unwrap();

        repository.delete_entry(&stored).await.unwrap();
        assert_eq!(repository.entry(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn live_list_emits_after_insert() {
        let repository = CatalogRepository::new(CatalogDb::open_memory().await.unwrap());
        let mut all = repository.all_entries();

        repository.insert_entry(&entry("Chernobyl")).await.unwrap();
        loop {
            if all.borrow().iter().any(|e| e.title == "Chernobyl") {
                break;
            }
            all.changed().await.unwrap();
        }
    }
}
