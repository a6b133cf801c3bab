//! Draft editing and validation for a single add-or-edit interaction.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Months, Utc};
use thiserror::Error;
use tracing::warn;

use crate::poster::PosterStore;
use crate::store::entry::{Category, CatalogEntry};
use crate::store::repository::CatalogRepository;

/// Draft fields that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    ReleaseDate,
    Category,
    Rating,
}

/// User-correctable problems found at save time.
///
/// These are the only errors deliberately surfaced to the user; storage
/// failures are logged instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is required")]
    TitleRequired,
    #[error("release date is more than two years in the future")]
    DateTooFar,
    #[error("a category must be selected")]
    CategoryRequired,
    #[error("a rating is required for watched entries")]
    RatingRequired,
    #[error("rating must be between 1 and 10")]
    RatingOutOfRange,
}

/// Session-scoped draft for adding or editing one entry.
///
/// Field setters only touch their own field and clear that field's error
/// entry when the new value makes the old complaint moot; full validation
/// happens at [`save`](Self::save). The session owns its state exclusively
/// and lives for one add-or-edit interaction.
pub struct EditorSession {
    repository: CatalogRepository,
    posters: PosterStore,
    entry_id: i64,
    title: String,
    release_date: DateTime<Utc>,
    /// Raw category label as entered or picked; parsed at save time.
    category: String,
    watched: bool,
    rating: Option<u8>,
    comment: String,
    poster_path: Option<String>,
    loading: bool,
    errors: HashMap<Field, ValidationError>,
    saved: bool,
}

impl EditorSession {
    /// Create a session for the entry with `id`; 0 starts a blank draft.
    ///
    /// For an existing id the session starts in the loading state; call
    /// [`load`](Self::load) once to populate the fields.
    pub fn new(repository: CatalogRepository, posters: PosterStore, id: i64) -> Self {
        Self {
            repository,
            posters,
            entry_id: id,
            title: String::new(),
            release_date: Utc::now(),
            category: String::new(),
            watched: false,
            rating: None,
            comment: String::new(),
            poster_path: None,
            loading: id > 0,
            errors: HashMap::new(),
            saved: false,
        }
    }

    /// Populate the draft from storage when editing an existing entry.
    ///
    /// An id that is missing from storage leaves the creation defaults in
    /// place, so the session behaves like "add new". No-op for a blank
    /// draft.
    pub async fn load(&mut self) {
        if self.entry_id <= 0 {
            return;
        }
        self.loading = true;
        match self.repository.entry(self.entry_id).await {
            Ok(Some(entry)) => {
                self.title = entry.title;
                self.release_date = entry.release_date;
                self.category = entry.category.as_str().to_string();
                self.watched = entry.watched;
                self.rating = entry.rating;
                self.comment = entry.comment.unwrap_or_default();
                self.poster_path = entry.poster_path;
            }
            Ok(None) => {}
            Err(err) => warn!(id = self.entry_id, "loading entry failed: {err}"),
        }
        self.loading = false;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn release_date(&self) -> DateTime<Utc> {
        self.release_date
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn watched(&self) -> bool {
        self.watched
    }

    pub fn rating(&self) -> Option<u8> {
        self.rating
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn poster_path(&self) -> Option<&str> {
        self.poster_path.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Errors from the most recent failed save attempt, keyed by field.
    pub fn errors(&self) -> &HashMap<Field, ValidationError> {
        &self.errors
    }

    pub fn error(&self, field: Field) -> Option<ValidationError> {
        self.errors.get(&field).copied()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if !title.trim().is_empty() {
            self.errors.remove(&Field::Title);
        }
        self.title = title;
    }

    pub fn set_release_date(&mut self, date: DateTime<Utc>) {
        self.release_date = date;
        self.errors.remove(&Field::ReleaseDate);
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        let category = category.into();
        if !category.trim().is_empty() {
            self.errors.remove(&Field::Category);
        }
        self.category = category;
    }

    pub fn set_watched(&mut self, watched: bool) {
        self.watched = watched;
        // Turning "watched" off retires any stale rating complaint.
        if !watched {
            self.errors.remove(&Field::Rating);
        }
    }

    pub fn set_rating(&mut self, rating: Option<u8>) {
        if rating.is_some() {
            self.errors.remove(&Field::Rating);
        }
        self.rating = rating;
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Copy a picked image into the poster store and point the draft at it.
    ///
    /// On failure the draft keeps its previous poster; the store already
    /// logged the cause.
    pub async fn select_poster(&mut self, source: &Path) {
        if let Some(path) = self.posters.save(source).await {
            self.poster_path = Some(path);
        }
    }

    /// Validate the draft and persist it.
    ///
    /// On validation failure the error map is replaced wholesale and
    /// nothing is written. On success the finalized entry — title trimmed,
    /// blank comment dropped, rating dropped for unwatched — is inserted
    /// (blank draft) or updated (existing id), and the one-shot saved
    /// signal is armed. The loading flag is cleared on every path. Returns
    /// whether the entry was persisted.
    pub async fn save(&mut self) -> bool {
        self.errors = self.validate();
        if !self.errors.is_empty() {
            return false;
        }
        let Ok(category) = self.category.parse::<Category>() else {
            return false;
        };

        self.loading = true;
        let comment = self.comment.trim();
        let entry = CatalogEntry {
            id: if self.entry_id > 0 { self.entry_id } else { 0 },
            title: self.title.trim().to_string(),
            release_date: self.release_date,
            category,
            watched: self.watched,
            rating: if self.watched { self.rating } else { None },
            comment: (!comment.is_empty()).then(|| comment.to_string()),
            poster_path: self.poster_path.clone(),
        };

        let result = if entry.id > 0 {
            self.repository.update_entry(&entry).await
        } else {
            self.repository.insert_entry(&entry).await.map(|_| ())
        };
        self.loading = false;

        match result {
            Ok(()) => {
                self.saved = true;
                true
            }
            Err(err) => {
                warn!(id = entry.id, "saving entry failed: {err}");
                false
            }
        }
    }

    /// One-shot completion signal meant to trigger navigation away;
    /// reading it resets it.
    pub fn take_saved(&mut self) -> bool {
        std::mem::take(&mut self.saved)
    }

    fn validate(&self) -> HashMap<Field, ValidationError> {
        let mut errors = HashMap::new();

        if self.title.trim().is_empty() {
            errors.insert(Field::Title, ValidationError::TitleRequired);
        }

        if self.release_date > Utc::now() + Months::new(24) {
            errors.insert(Field::ReleaseDate, ValidationError::DateTooFar);
        }

        if self.category.trim().is_empty() || self.category.parse::<Category>().is_err() {
            errors.insert(Field::Category, ValidationError::CategoryRequired);
        }

        if self.watched {
            match self.rating {
                None => {
                    errors.insert(Field::Rating, ValidationError::RatingRequired);
                }
                Some(rating) if !(1..=10).contains(&rating) => {
                    errors.insert(Field::Rating, ValidationError::RatingOutOfRange);
                }
                Some(_) => {}
            }
        }

        errors
    }
}
