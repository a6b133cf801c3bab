//! SQLite persistence for the catalog.
//!
//! [`CatalogDb`] owns the connection and is the single mutation point for
//! the whole process. Every operation runs on the blocking thread pool so
//! callers never block a latency-sensitive thread. Committed writes bump a
//! generation counter that live queries subscribe to; each live query
//! re-runs its statement and re-emits on every bump.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::watch;
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::entry::{Category, CatalogEntry};

/// Current schema version, kept in `PRAGMA user_version`.
///
/// Any mismatch drops and recreates the table. There are no incremental
/// migrations; losing local data on a schema change is accepted.
const SCHEMA_VERSION: i32 = 1;

const CREATE_SQL: &str = "
CREATE TABLE entries (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    title        TEXT NOT NULL,
    release_date INTEGER NOT NULL,
    category     TEXT NOT NULL,
    watched      INTEGER NOT NULL DEFAULT 0,
    rating       INTEGER,
    comment      TEXT,
    poster_path  TEXT
);
CREATE INDEX idx_entries_release_date ON entries(release_date);
CREATE INDEX idx_entries_category ON entries(category);
CREATE INDEX idx_entries_watched ON entries(watched);
";

const SELECT_COLUMNS: &str =
    "id, title, release_date, category, watched, rating, comment, poster_path";

/// The catalog database.
///
/// Construct once via [`CatalogDb::open`] and share the returned `Arc`;
/// the connection mutex serializes all writers.
pub struct CatalogDb {
    conn: Arc<Mutex<Connection>>,
    /// Generation counter, bumped after every committed write.
    changes: watch::Sender<u64>,
}

impl CatalogDb {
    /// Open or create the catalog database at `path`.
    ///
    /// The parent directory is created if needed. On first creation the
    /// sample entries are inserted by a detached task, so this returns
    /// before seeding completes; an early subscriber may briefly observe an
    /// empty table and then the seeded rows through the normal change
    /// notification.
    pub async fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, StoreError> {
        let path = path.as_ref().to_path_buf();
        let (conn, created) =
            task::spawn_blocking(move || -> Result<(Connection, bool), StoreError> {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(&path)?;
                conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
                let created = init_schema(&conn)?;
                info!(path = %path.display(), "catalog database ready");
                Ok((conn, created))
            })
            .await??;

        let db = Arc::new(Self::from_connection(conn));
        if created {
            let seeder = Arc::clone(&db);
            task::spawn(async move {
                if let Err(err) = seeder.seed_if_empty().await {
                    warn!("seeding sample entries failed: {err}");
                }
            });
        }
        Ok(db)
    }

    /// Open an in-memory database with the full schema and no seed data.
    /// Useful for testing.
    pub async fn open_memory() -> Result<Arc<Self>, StoreError> {
        let conn = task::spawn_blocking(|| -> Result<Connection, StoreError> {
            let conn = Connection::open_in_memory()?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await??;
        Ok(Arc::new(Self::from_connection(conn)))
    }

    fn from_connection(conn: Connection) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        }
    }

    /// Default database location under the user's data directory:
    /// - Linux: ~/.local/share/cinelog/catalog.db
    /// - macOS: ~/Library/Application Support/cinelog/catalog.db
    /// - Windows: %APPDATA%\cinelog\catalog.db
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .expect("could not determine user data directory");
        path.push("cinelog");
        path.push("catalog.db");
        path
    }

    /// Subscribe to the write generation counter.
    ///
    /// The value itself carries no meaning; a change means "something was
    /// inserted, updated or deleted since you last looked".
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn.lock().expect("catalog connection mutex poisoned");
            op(&conn)
        })
        .await?
    }

    /// Single-shot lookup by id.
    pub async fn entry(&self, id: i64) -> Result<Option<CatalogEntry>, StoreError> {
        self.with_conn(move |conn| {
            let entry = conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM entries WHERE id = ?1"),
                    [id],
                    row_to_entry,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    /// Insert a new entry and return the assigned id.
    pub async fn insert(&self, entry: &CatalogEntry) -> Result<i64, StoreError> {
        let entry = entry.clone();
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO entries (title, release_date, category, watched, rating, comment, poster_path)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        entry.title,
                        entry.release_date.timestamp_millis(),
                        entry.category,
                        entry.watched,
                        entry.rating,
                        entry.comment,
                        entry.poster_path,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(id, "inserted catalog entry");
        self.notify();
        Ok(id)
    }

    /// Replace the row matching `entry.id` with the given values.
    ///
    /// Fails with [`StoreError::NotFound`] when no such row exists.
    pub async fn update(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE entries
                 SET title = ?1, release_date = ?2, category = ?3, watched = ?4,
                     rating = ?5, comment = ?6, poster_path = ?7
                 WHERE id = ?8",
                params![
                    entry.title,
                    entry.release_date.timestamp_millis(),
                    entry.category,
                    entry.watched,
                    entry.rating,
                    entry.comment,
                    entry.poster_path,
                    entry.id,
                ],
            )?;
            if updated == 0 {
                Err(StoreError::NotFound(entry.id))
            } else {
                Ok(())
            }
        })
        .await?;
        self.notify();
        Ok(())
    }

    /// Remove the row with the given id. Removing an absent id is a no-op.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let removed = self
            .with_conn(move |conn| Ok(conn.execute("DELETE FROM entries WHERE id = ?1", [id])?))
            .await?;
        if removed > 0 {
            debug!(id, "deleted catalog entry");
            self.notify();
        }
        Ok(())
    }

    /// All entries ordered ascending by release date.
    pub async fn list_all(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        self.list_filtered(None, None).await
    }

    /// Entries matching the filters, ordered ascending by release date.
    /// A `None` filter matches everything.
    pub async fn list_filtered(
        &self,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> Result<Vec<CatalogEntry>, StoreError> {
        self.with_conn(move |conn| Ok(list_filtered_sync(conn, category, watched)?))
            .await
    }

    /// Count of entries matching the filters.
    pub async fn count_filtered(
        &self,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> Result<i64, StoreError> {
        self.with_conn(move |conn| Ok(count_filtered_sync(conn, category, watched)?))
            .await
    }

    /// Matching entries and their count read under a single lock hold, so
    /// the pair stays consistent even while writers are active.
    pub async fn snapshot_filtered(
        &self,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> Result<(Vec<CatalogEntry>, i64), StoreError> {
        self.with_conn(move |conn| {
            let entries = list_filtered_sync(conn, category, watched)?;
            let count = count_filtered_sync(conn, category, watched)?;
            Ok((entries, count))
        })
        .await
    }

    /// Live stream of every entry; re-emits after each committed write.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_all(self: &Arc<Self>) -> watch::Receiver<Vec<CatalogEntry>> {
        self.watch_filtered(None, None)
    }

    /// Live stream of the filtered entry list.
    ///
    /// The backing task re-runs the query whenever the generation counter
    /// moves and exits once every receiver is gone. A receiver always holds
    /// a value at least as new as its caller's last completed write.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_filtered(
        self: &Arc<Self>,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> watch::Receiver<Vec<CatalogEntry>> {
        self.spawn_live(Vec::new(), move |conn| {
            list_filtered_sync(conn, category, watched)
        })
    }

    /// Live stream of the filtered entry count.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_count(
        self: &Arc<Self>,
        category: Option<Category>,
        watched: Option<bool>,
    ) -> watch::Receiver<i64> {
        self.spawn_live(0, move |conn| count_filtered_sync(conn, category, watched))
    }

    fn spawn_live<T, Q>(self: &Arc<Self>, initial: T, query: Q) -> watch::Receiver<T>
    where
        T: Send + Sync + 'static,
        Q: Fn(&Connection) -> rusqlite::Result<T> + Send + Sync + 'static,
    {
        let db = Arc::clone(self);
        let (tx, rx) = watch::channel(initial);
        task::spawn(async move {
            let mut changes = db.subscribe();
            let query = Arc::new(query);
            loop {
                // Mark the generation seen before querying, so a write that
                // lands mid-query wakes the loop again immediately.
                let _ = changes.borrow_and_update();
                let run = Arc::clone(&query);
                match db.with_conn(move |conn| Ok(run(conn)?)).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                    // Keep the last good value; the next write retries.
                    Err(err) => warn!("live query failed: {err}"),
                }
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });
        rx
    }

    /// Insert the sample entries when the table is empty.
    ///
    /// Runs inside one transaction and checks the row count first, so a
    /// concurrent or repeated call is harmless.
    pub async fn seed_if_empty(&self) -> Result<(), StoreError> {
        let seeded = self
            .with_conn(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                if count > 0 {
                    return Ok(false);
                }
                let tx = conn.unchecked_transaction()?;
                for entry in sample_entries() {
                    tx.execute(
                        "INSERT INTO entries (title, release_date, category, watched, rating, comment, poster_path)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            entry.title,
                            entry.release_date.timestamp_millis(),
                            entry.category,
                            entry.watched,
                            entry.rating,
                            entry.comment,
                            entry.poster_path,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;
        if seeded {
            info!("seeded sample catalog entries");
            self.notify();
        }
        Ok(())
    }
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("generation", &*self.changes.borrow())
            .finish()
    }
}

/// Create or recreate the schema as needed. Returns whether the table was
/// (re)created.
fn init_schema(conn: &Connection) -> Result<bool, StoreError> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == SCHEMA_VERSION {
        return Ok(false);
    }
    if version != 0 {
        warn!(
            found = version,
            expected = SCHEMA_VERSION,
            "schema version mismatch, recreating table"
        );
    }
    conn.execute_batch("DROP TABLE IF EXISTS entries;")?;
    conn.execute_batch(CREATE_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(true)
}

fn list_filtered_sync(
    conn: &Connection,
    category: Option<Category>,
    watched: Option<bool>,
) -> rusqlite::Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM entries
         WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR watched = ?2)
         ORDER BY release_date ASC"
    ))?;
    let rows = stmt.query_map(params![category, watched], row_to_entry)?;
    rows.collect()
}

fn count_filtered_sync(
    conn: &Connection,
    category: Option<Category>,
    watched: Option<bool>,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM entries
         WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR watched = ?2)",
        params![category, watched],
        |row| row.get(0),
    )
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let millis: i64 = row.get(2)?;
    let release_date = DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, millis))?;
    Ok(CatalogEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        release_date,
        category: row.get(3)?,
        watched: row.get(4)?,
        rating: row.get(5)?,
        comment: row.get(6)?,
        poster_path: row.get(7)?,
    })
}

/// The rows inserted into a freshly created database.
fn sample_entries() -> [CatalogEntry; 5] {
    [
        sample(
            "Inception",
            seed_date(2010, 7, 16),
            Category::Film,
            true,
            Some(9),
            Some("A mind-bending heist through layered dreams."),
        ),
        sample(
            "Game of Thrones",
            seed_date(2011, 4, 17),
            Category::Series,
            true,
            Some(8),
            Some("Epic fantasy adapted from George R. R. Martin's novels."),
        ),
        sample(
            "Planet Earth",
            seed_date(2006, 3, 5),
            Category::Documentary,
            false,
            None,
            None,
        ),
        sample(
            "The Shawshank Redemption",
            seed_date(1994, 9, 23),
            Category::Film,
            true,
            Some(10),
            Some("One of the best films ever made."),
        ),
        sample(
            "Breaking Bad",
            seed_date(2008, 1, 20),
            Category::Series,
            false,
            None,
            None,
        ),
    ]
}

fn sample(
    title: &str,
    release_date: DateTime<Utc>,
    category: Category,
    watched: bool,
    rating: Option<u8>,
    comment: Option<&str>,
) -> CatalogEntry {
    CatalogEntry {
        id: 0,
        title: title.to_string(),
        release_date,
        category,
        watched,
        rating,
        comment: comment.map(str::to_string),
        poster_path: None,
    }
}

fn seed_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid seed date")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        title: &str,
        year: i32,
        category: Category,
        watched: bool,
        rating: Option<u8>,
    ) -> CatalogEntry {
        CatalogEntry {
            id: 0,
            title: title.to_string(),
            release_date: seed_date(year, 6, 1),
            category,
            watched,
            rating,
            comment: None,
            poster_path: None,
        }
    }

    /// Await a live stream until its value satisfies the predicate.
    async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, predicate: F)
    where
        F: Fn(&T) -> bool,
    {
        loop {
            if predicate(&rx.borrow()) {
                return;
            }
            rx.changed().await.expect("live query task ended");
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let db = CatalogDb::open_memory().await.unwrap();
        let mut original = entry("Dune", 2021, Category::Film, true, Some(8));
        original.comment = Some("Part one.".to_string());

        let id = db.insert(&original).await.unwrap();
        assert!(id > 0);

        let stored = db.entry(id).await.unwrap().unwrap();
        original.id = id;
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn missing_id_reads_as_absent() {
        let db = CatalogDb::open_memory().await.unwrap();
        assert_eq!(db.entry(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn filtered_query_matches_manual_filter() {
        let db = CatalogDb::open_memory().await.unwrap();
        db.insert(&entry("A", 2001, Category::Film, true, Some(5)))
            .await
            .unwrap();
        db.insert(&entry("B", 2002, Category::Series, false, None))
            .await
            .unwrap();
        db.insert(&entry("C", 2003, Category::Film, false, None))
            .await
            .unwrap();
        db.insert(&entry("D", 2004, Category::Documentary, true, Some(7)))
            .await
            .unwrap();

        let all = db.list_all().await.unwrap();
        let filters = [
            (None, None),
            (Some(Category::Film), None),
            (None, Some(true)),
            (Some(Category::Film), Some(false)),
            (Some(Category::Documentary), Some(false)),
        ];
        for (category, watched) in filters {
            let filtered = db.list_filtered(category, watched).await.unwrap();
            let expected: Vec<_> = all
                .iter()
                .filter(|e| {
                    category.map_or(true, |c| e.category == c)
                        && watched.map_or(true, |w| e.watched == w)
                })
                .cloned()
                .collect();
            assert_eq!(filtered, expected, "filter {category:?}/{watched:?}");

            let count = db.count_filtered(category, watched).await.unwrap();
            assert_eq!(count as usize, filtered.len());
        }
    }

    #[tokio::test]
    async fn listing_is_ordered_by_release_date() {
        let db = CatalogDb::open_memory().await.unwrap();
        db.insert(&entry("Newest", 2020, Category::Film, false, None))
            .await
            .unwrap();
        db.insert(&entry("Oldest", 1990, Category::Film, false, None))
            .await
            .unwrap();
        db.insert(&entry("Middle", 2005, Category::Film, false, None))
            .await
            .unwrap();

        let titles: Vec<_> = db
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, ["Oldest", "Middle", "Newest"]);
    }

    #[tokio::test]
    async fn update_replaces_fields_and_preserves_id() {
        let db = CatalogDb::open_memory().await.unwrap();
        let id = db
            .insert(&entry("Solaris", 1972, Category::Film, false, None))
            .await
            .unwrap();

        let mut changed = db.entry(id).await.unwrap().unwrap();
        changed.watched = true;
        changed.rating = Some(9);
        db.update(&changed).await.unwrap();

        let stored = db.entry(id).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.title, "Solaris");
        assert!(stored.watched);
        assert_eq!(stored.rating, Some(9));

        // Applying the same update again changes nothing observable.
        db.update(&changed).await.unwrap();
        assert_eq!(db.entry(id).await.unwrap().unwrap(), stored);
        assert_eq!(db.count_filtered(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let db = CatalogDb::open_memory().await.unwrap();
        let mut ghost = entry("Ghost", 2000, Category::Film, false, None);
        ghost.id = 99;
        match db.update(&ghost).await {
            Err(StoreError::NotFound(99)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_removes_row_and_updates_live_streams() {
        let db = CatalogDb::open_memory().await.unwrap();
        let id = db
            .insert(&entry("Alien", 1979, Category::Film, true, Some(9)))
            .await
            .unwrap();

        let mut list = db.watch_all();
        let mut count = db.watch_count(None, None);
        wait_until(&mut list, |entries| entries.len() == 1).await;
        wait_until(&mut count, |count| *count == 1).await;

        db.delete(id).await.unwrap();
        assert_eq!(db.entry(id).await.unwrap(), None);
        wait_until(&mut list, |entries| entries.is_empty()).await;
        wait_until(&mut count, |count| *count == 0).await;
    }

    #[tokio::test]
    async fn live_stream_reflects_completed_writes() {
        let db = CatalogDb::open_memory().await.unwrap();
        let mut films = db.watch_filtered(Some(Category::Film), None);

        db.insert(&entry("Heat", 1995, Category::Film, true, Some(8)))
            .await
            .unwrap();
        db.insert(&entry("The Wire", 2002, Category::Series, true, Some(10)))
            .await
            .unwrap();

        wait_until(&mut films, |entries| {
            entries.len() == 1 && entries[0].title == "Heat"
        })
        .await;
    }

    #[tokio::test]
    async fn seed_populates_expected_rows_once() {
        let db = CatalogDb::open_memory().await.unwrap();
        db.seed_if_empty().await.unwrap();
        db.seed_if_empty().await.unwrap();

        assert_eq!(db.count_filtered(None, None).await.unwrap(), 5);
        let films = db.list_filtered(Some(Category::Film), None).await.unwrap();
        assert_eq!(films.len(), 2);
        assert_eq!(
            db.count_filtered(Some(Category::Film), None).await.unwrap(),
            2
        );
        assert_eq!(db.count_filtered(None, Some(true)).await.unwrap(), 3);
        assert_eq!(db.count_filtered(None, Some(false)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn snapshot_pair_is_consistent() {
        let db = CatalogDb::open_memory().await.unwrap();
        db.seed_if_empty().await.unwrap();
        let (entries, count) = db
            .snapshot_filtered(Some(Category::Series), None)
            .await
            .unwrap();
        assert_eq!(entries.len() as i64, count);
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn version_mismatch_recreates_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");

        {
            let db = CatalogDb::open(&path).await.unwrap();
            let mut count = db.watch_count(None, None);
            wait_until(&mut count, |count| *count == 5).await;
            db.insert(&entry("Extra", 2019, Category::Film, false, None))
                .await
                .unwrap();
            assert_eq!(db.count_filtered(None, None).await.unwrap(), 6);
        }

        // Simulate an app upgrade that changed the schema version.
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 99).unwrap();
        }

        let db = CatalogDb::open(&path).await.unwrap();
        let mut count = db.watch_count(None, None);
        wait_until(&mut count, |count| *count == 5).await;
        let titles: Vec<_> = db
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert!(!titles.contains(&"Extra".to_string()));
    }
}
