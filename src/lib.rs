//! A personal film, series and documentary catalog.
//!
//! This crate is the data layer behind a catalog UI: a SQLite-backed store
//! with live filtered queries, a repository façade, session state holders
//! for the list, add/edit and detail screens, and a poster file helper.
//! Presentation stays outside; a front end drives the sessions and renders
//! whatever they expose.
//!
//! All storage and file work runs off the caller's thread via the blocking
//! pool; results come back as awaited values or `tokio::sync::watch`
//! updates, so everything here expects to live inside a Tokio runtime.
//!
//! ```no_run
//! use cinelog::{CatalogDb, CatalogRepository, ListSession, PosterStore};
//!
//! # async fn run() -> Result<(), cinelog::StoreError> {
//! let db = CatalogDb::open(CatalogDb::default_path()).await?;
//! let repository = CatalogRepository::new(db);
//! let posters = PosterStore::new(PosterStore::default_base());
//!
//! let list = ListSession::new(repository.clone(), posters.clone());
//! let mut snapshots = list.snapshot();
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow().clone();
//!     println!("{} entries match", snapshot.count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod poster;
pub mod session;
pub mod store;

pub use error::StoreError;
pub use poster::PosterStore;
pub use session::detail::DetailSession;
pub use session::editor::{EditorSession, Field, ValidationError};
pub use session::list::{ListFilter, ListSession, ListSnapshot};
pub use session::{Destination, NEW_ENTRY_ID};
pub use store::db::CatalogDb;
pub use store::entry::{CatalogEntry, Category, UnknownCategory};
pub use store::repository::CatalogRepository;
