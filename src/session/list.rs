//! Filter state and the live filtered list behind the catalog screen.

use std::path::Path;

use tokio::sync::watch;
use tokio::task;
use tracing::warn;

use crate::poster::PosterStore;
use crate::store::entry::{Category, CatalogEntry};
use crate::store::repository::CatalogRepository;

/// Current filter selections; `None` means "show all".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub watched: Option<bool>,
}

/// One atomic recomputation result.
///
/// Carries the filter it was computed under, so a consumer can never pair a
/// fresh list with a stale selection or vice versa.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListSnapshot {
    pub filter: ListFilter,
    pub entries: Vec<CatalogEntry>,
    pub count: i64,
}

/// State holder for the list screen.
///
/// A detached task recomputes the snapshot whenever the filter selection or
/// the stored data changes, and publishes it through a watch channel. It
/// also owns the delete-confirmation flow: `request_delete` marks an entry,
/// `confirm_delete` removes it together with its poster file.
///
/// Must be constructed from within a Tokio runtime.
pub struct ListSession {
    repository: CatalogRepository,
    posters: PosterStore,
    filter: watch::Sender<ListFilter>,
    snapshot: watch::Receiver<ListSnapshot>,
    pending_delete: Option<CatalogEntry>,
}

impl ListSession {
    pub fn new(repository: CatalogRepository, posters: PosterStore) -> Self {
        let (filter_tx, mut filter_rx) = watch::channel(ListFilter::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(ListSnapshot::default());
        let repo = repository.clone();
        task::spawn(async move {
            let mut changes = repo.subscribe();
            loop {
                // Snapshot both inputs, then query; anything that moves
                // while the query runs re-arms the select below.
                let filter = *filter_rx.borrow_and_update();
                let _ = changes.borrow_and_update();
                match repo.snapshot_filtered(filter.category, filter.watched).await {
                    Ok((entries, count)) => {
                        let snapshot = ListSnapshot {
                            filter,
                            entries,
                            count,
                        };
                        if snapshot_tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("list recomputation failed: {err}"),
                }
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = filter_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = snapshot_tx.closed() => break,
                }
            }
        });
        Self {
            repository,
            posters,
            filter: filter_tx,
            snapshot: snapshot_rx,
            pending_delete: None,
        }
    }

    /// The live snapshot stream; clone one receiver per observer.
    pub fn snapshot(&self) -> watch::Receiver<ListSnapshot> {
        self.snapshot.clone()
    }

    pub fn selected_category(&self) -> Option<Category> {
        self.filter.borrow().category
    }

    pub fn selected_watch_status(&self) -> Option<bool> {
        self.filter.borrow().watched
    }

    /// Set the category filter; `None` shows every category.
    ///
    /// Pure state assignment — the recomputation happens asynchronously.
    pub fn set_category(&self, category: Option<Category>) {
        self.filter.send_modify(|filter| filter.category = category);
    }

    /// Set the watch-status filter; `None` shows both.
    pub fn set_watch_status(&self, watched: Option<bool>) {
        self.filter.send_modify(|filter| filter.watched = watched);
    }

    /// Mark an entry for deletion; the UI shows its confirmation dialog
    /// while this is set.
    pub fn request_delete(&mut self, entry: CatalogEntry) {
        self.pending_delete = Some(entry);
    }

    pub fn pending_delete(&self) -> Option<&CatalogEntry> {
        self.pending_delete.as_ref()
    }

    /// Dismiss the confirmation dialog without deleting.
    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Delete the entry marked by [`request_delete`](Self::request_delete),
    /// then its poster file.
    ///
    /// A poster that fails to delete is logged and left behind; the row is
    /// already gone at that point.
    pub async fn confirm_delete(&mut self) {
        let Some(entry) = self.pending_delete.take() else {
            return;
        };
        if let Err(err) = self.repository.delete_entry(&entry).await {
            warn!(id = entry.id, "deleting entry failed: {err}");
            return;
        }
        if let Some(path) = entry.poster_path.as_deref() {
            self.posters.delete(Path::new(path)).await;
        }
    }
}
