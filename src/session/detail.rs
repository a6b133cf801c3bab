//! Read-only view of a single entry.

use tracing::warn;

use crate::store::entry::CatalogEntry;
use crate::store::repository::CatalogRepository;

/// State holder for the read-only detail screen.
pub struct DetailSession {
    repository: CatalogRepository,
    entry_id: i64,
    entry: Option<CatalogEntry>,
    loading: bool,
}

impl DetailSession {
    pub fn new(repository: CatalogRepository, id: i64) -> Self {
        Self {
            repository,
            entry_id: id,
            entry: None,
            loading: true,
        }
    }

    /// Fetch the entry. A storage failure is logged and shows up as
    /// "absent", never as a surfaced error.
    pub async fn load(&mut self) {
        self.loading = true;
        self.entry = match self.repository.entry(self.entry_id).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(id = self.entry_id, "loading entry failed: {err}");
                None
            }
        };
        self.loading = false;
    }

    pub fn entry(&self) -> Option<&CatalogEntry> {
        self.entry.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::CatalogDb;
    use crate::store::entry::Category;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn loads_existing_entry() {
        let repository = CatalogRepository::new(CatalogDb::open_memory().await.unwrap());
        let id = repository
            .insert_entry(&CatalogEntry {
                id: 0,
                title: "Free Solo".to_string(),
                release_date: Utc.with_ymd_and_hms(2018, 9, 28, 0, 0, 0).unwrap(),
                category: Category::Documentary,
                watched: true,
                rating: Some(8),
                comment: None,
                poster_path: None,
            })
            .await
            .unwrap();

        let mut session = DetailSession::new(repository, id);
        assert!(session.is_loading());
        session.load().await;
        assert!(!session.is_loading());
        assert_eq!(session.entry().map(|e| e.title.as_str()), Some("Free Solo"));
    }

    #[tokio::test]
    async fn missing_entry_shows_as_absent() {
        let repository = CatalogRepository::new(CatalogDb::open_memory().await.unwrap());
        let mut session = DetailSession::new(repository, 404);
        session.load().await;
        assert!(!session.is_loading());
        assert!(session.entry().is_none());
    }
}
